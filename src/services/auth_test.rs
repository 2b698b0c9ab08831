use super::*;
use crate::provider::{MemoryProvider, ProfileRecord, ProviderError, ProviderSession, UserMetadata};
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Test doubles
// =============================================================================

/// Memory provider with call counters and failure switches.
#[derive(Default)]
struct FlakyProvider {
    inner: MemoryProvider,
    fail_sign_out: bool,
    confirm_after_sign_up: bool,
    sign_in_calls: AtomicUsize,
    current_user_calls: AtomicUsize,
}

impl FlakyProvider {
    fn demo() -> Self {
        Self { inner: MemoryProvider::with_demo_accounts(), ..Self::default() }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FlakyProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_in(email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpOutcome, ProviderError> {
        let outcome = self.inner.sign_up(email, password, metadata).await?;
        if self.confirm_after_sign_up {
            self.inner.confirm_email(email).await;
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.inner.sign_out().await?;
        if self.fail_sign_out {
            return Err(ProviderError::Transport("connection reset".into()));
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<ProviderSession>, ProviderError> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.current_user().await
    }

    async fn update_attributes(&self, attributes: &UserAttributes) -> Result<(), ProviderError> {
        self.inner.update_attributes(attributes).await
    }

    async fn reset_password_for(&self, email: &str) -> Result<(), ProviderError> {
        self.inner.reset_password_for(email).await
    }
}

struct FailingProfiles;

#[async_trait::async_trait]
impl ProfileStore for FailingProfiles {
    async fn upsert(&self, _record: &ProfileRecord) -> Result<(), ProviderError> {
        Err(ProviderError::Transport("profiles table unavailable".into()))
    }

    async fn fetch(&self, _user_id: &str) -> Result<Option<ProfileRecord>, ProviderError> {
        Err(ProviderError::Transport("profiles table unavailable".into()))
    }
}

fn demo_gateway() -> (AuthGateway, Arc<MemoryProvider>) {
    let provider = Arc::new(MemoryProvider::with_demo_accounts());
    (AuthGateway::new(provider.clone(), provider.clone()), provider)
}

fn flaky_gateway(provider: FlakyProvider) -> (AuthGateway, Arc<FlakyProvider>) {
    let provider = Arc::new(provider);
    let profiles = Arc::new(MemoryProvider::new());
    (AuthGateway::new(provider.clone(), profiles), provider)
}

fn new_student() -> Profile {
    Profile {
        email: "aisyah@uts.edu.my".into(),
        first_name: "Aisyah".into(),
        last_name: "Rahman".into(),
        student_id: "20231234".into(),
        avatar_url: String::new(),
    }
}

// =============================================================================
// sign_in
// =============================================================================

#[tokio::test]
async fn sign_in_success_sets_session_and_emits() {
    let (gateway, _) = demo_gateway();
    let mut events = gateway.subscribe();

    assert!(gateway.sign_in("student@uts.edu.my", "password123").await.is_ok());
    assert!(gateway.is_logged_in().await);

    let event = events.try_recv().unwrap();
    assert_eq!(event.sequence, 1);
    let identity = event.session.identity().unwrap();
    assert_eq!(identity.profile.full_name(), "John Doe");
    assert!(identity.active);
}

#[tokio::test]
async fn sign_in_rejected_leaves_session_and_emits_nothing() {
    let (gateway, _) = demo_gateway();
    let mut events = gateway.subscribe();

    assert_eq!(gateway.sign_in("nobody@x.com", "bad").await, Err(AuthFailure));
    assert!(!gateway.is_logged_in().await);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn failed_sign_in_keeps_existing_session() {
    let (gateway, _) = demo_gateway();
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let before = gateway.current_session().await;

    assert!(gateway.sign_in("jane.smith@uts.edu.my", "wrong").await.is_err());
    assert_eq!(gateway.current_session().await, before);
}

#[tokio::test]
async fn empty_credentials_never_reach_provider() {
    let (gateway, provider) = flaky_gateway(FlakyProvider::demo());
    assert!(gateway.sign_in("   ", "password123").await.is_err());
    assert!(gateway.sign_in("student@uts.edu.my", "").await.is_err());
    assert_eq!(provider.sign_in_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sign_in_prefers_stored_profile_record() {
    let (gateway, provider) = demo_gateway();
    let session = provider.sign_in("student@uts.edu.my", "password123").await.unwrap();
    provider.sign_out().await.unwrap();
    let record = Profile { first_name: "Johnny".into(), ..Profile::from_provider_user(&session.user) }
        .to_record(&session.user.id);
    provider.upsert(&record).await.unwrap();

    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let current = gateway.current_session().await;
    assert_eq!(current.identity().unwrap().profile.first_name, "Johnny");
}

#[tokio::test]
async fn sign_in_survives_profile_fetch_failure() {
    let provider = Arc::new(MemoryProvider::with_demo_accounts());
    let gateway = AuthGateway::new(provider, Arc::new(FailingProfiles));
    assert!(gateway.sign_in("student@uts.edu.my", "password123").await.is_ok());
    let current = gateway.current_session().await;
    assert_eq!(current.identity().unwrap().profile.first_name, "John");
}

// =============================================================================
// sign_out
// =============================================================================

#[tokio::test]
async fn sign_out_when_logged_out_is_ok_and_emits_absent() {
    let (gateway, _) = demo_gateway();
    let mut events = gateway.subscribe();

    assert!(gateway.sign_out().await.is_ok());
    assert!(!gateway.is_logged_in().await);
    let event = events.try_recv().unwrap();
    assert_eq!(event.session, Session::Absent);
}

#[tokio::test]
async fn sign_out_clears_session_despite_provider_error() {
    let (gateway, _) = flaky_gateway(FlakyProvider { fail_sign_out: true, ..FlakyProvider::demo() });
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    assert!(gateway.sign_out().await.is_ok());
    assert!(!gateway.is_logged_in().await);
}

#[tokio::test]
async fn logged_in_reflects_last_mutating_operation() {
    enum Op {
        SignIn(&'static str, &'static str),
        SignOut,
    }

    let (gateway, _) = demo_gateway();
    let script = [
        (Op::SignIn("student@uts.edu.my", "password123"), true),
        (Op::SignIn("jane.smith@uts.edu.my", "bad"), true),
        (Op::SignOut, false),
        (Op::SignIn("nobody@x.com", "bad"), false),
        (Op::SignOut, false),
        (Op::SignIn("jane.smith@uts.edu.my", "password456"), true),
    ];
    for (step, (op, expected)) in script.into_iter().enumerate() {
        match op {
            Op::SignIn(email, password) => {
                let _ = gateway.sign_in(email, password).await;
            }
            Op::SignOut => gateway.sign_out().await.unwrap(),
        }
        assert_eq!(gateway.is_logged_in().await, expected, "step {step}");
    }
}

// =============================================================================
// sign_up
// =============================================================================

#[tokio::test]
async fn sign_up_success_signs_in_and_upserts_profile() {
    let (gateway, provider) = demo_gateway();
    let mut events = gateway.subscribe();

    assert!(gateway.sign_up(&new_student(), "secret1").await.is_ok());
    let event = events.try_recv().unwrap();
    let identity = event.session.identity().unwrap();
    assert_eq!(identity.profile.student_id, "20231234");

    let record = provider.fetch(&identity.user_id).await.unwrap().unwrap();
    assert_eq!(record.first_name, "Aisyah");
    assert_eq!(record.email, "aisyah@uts.edu.my");
}

#[tokio::test]
async fn sign_up_existing_email_fails_without_event() {
    let (gateway, _) = demo_gateway();
    let mut events = gateway.subscribe();
    let before = gateway.current_session().await;

    let profile = Profile { email: "student@uts.edu.my".into(), ..new_student() };
    assert_eq!(gateway.sign_up(&profile, "secret1").await, Err(AuthFailure));
    assert!(events.try_recv().is_none());
    assert_eq!(gateway.current_session().await, before);
}

#[tokio::test]
async fn sign_up_rejects_incomplete_or_malformed_profiles() {
    let (gateway, _) = demo_gateway();
    let missing_name = Profile { first_name: " ".into(), ..new_student() };
    assert!(gateway.sign_up(&missing_name, "secret1").await.is_err());
    let bad_email = Profile { email: "aisyah-at-uts".into(), ..new_student() };
    assert!(gateway.sign_up(&bad_email, "secret1").await.is_err());
    assert!(gateway.sign_up(&new_student(), "").await.is_err());
}

#[tokio::test]
async fn sign_up_pending_confirmation_with_failing_fallback_fails() {
    let provider = Arc::new(MemoryProvider::new().require_confirmation(true));
    let gateway = AuthGateway::new(provider.clone(), provider);
    let mut events = gateway.subscribe();

    assert_eq!(gateway.sign_up(&new_student(), "secret1").await, Err(AuthFailure));
    assert!(events.try_recv().is_none());
    assert!(!gateway.is_logged_in().await);
}

#[tokio::test]
async fn sign_up_pending_confirmation_falls_back_to_sign_in() {
    let (gateway, provider) = flaky_gateway(FlakyProvider {
        inner: MemoryProvider::new().require_confirmation(true),
        confirm_after_sign_up: true,
        ..FlakyProvider::default()
    });

    assert!(gateway.sign_up(&new_student(), "secret1").await.is_ok());
    assert!(gateway.is_logged_in().await);
    assert_eq!(provider.sign_in_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sign_up_succeeds_when_profile_upsert_fails() {
    let provider = Arc::new(MemoryProvider::new());
    let gateway = AuthGateway::new(provider, Arc::new(FailingProfiles));
    assert!(gateway.sign_up(&new_student(), "secret1").await.is_ok());
    assert!(gateway.is_logged_in().await);
}

// =============================================================================
// passwords
// =============================================================================

#[tokio::test]
async fn change_password_rejects_short_new_password() {
    let (gateway, _) = demo_gateway();
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    assert!(gateway.change_password("password123", "abc").await.is_err());
}

#[tokio::test]
async fn change_password_requires_session() {
    let (gateway, _) = demo_gateway();
    assert!(gateway.change_password("password123", "newpass1").await.is_err());
}

#[tokio::test]
async fn change_password_wrong_current_fails() {
    let (gateway, _) = demo_gateway();
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    assert!(gateway.change_password("wrong", "newpass1").await.is_err());
}

#[tokio::test]
async fn change_password_success_does_not_touch_session() {
    let (gateway, provider) = demo_gateway();
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let mut events = gateway.subscribe();
    let before = gateway.current_session().await;

    assert!(gateway.change_password("password123", "newpass1").await.is_ok());
    assert!(events.try_recv().is_none());
    assert_eq!(gateway.current_session().await, before);

    provider.sign_out().await.unwrap();
    assert!(provider.sign_in("student@uts.edu.my", "newpass1").await.is_ok());
}

#[tokio::test]
async fn reset_password_outcomes() {
    let (gateway, provider) = demo_gateway();
    assert!(gateway.reset_password("  ").await.is_err());
    assert!(gateway.reset_password("ghost@uts.edu.my").await.is_err());
    assert!(gateway.reset_password(" student@uts.edu.my ").await.is_ok());
    assert_eq!(provider.reset_requests().await, vec!["student@uts.edu.my".to_owned()]);
}

// =============================================================================
// update_profile
// =============================================================================

#[tokio::test]
async fn update_profile_without_provider_session_fails_cleanly() {
    let (gateway, _) = demo_gateway();
    let mut events = gateway.subscribe();
    let before = gateway.current_session().await;

    assert_eq!(gateway.update_profile(new_student()).await, Err(AuthFailure));
    assert!(events.try_recv().is_none());
    assert_eq!(gateway.current_session().await, before);
}

#[tokio::test]
async fn update_profile_replaces_session_and_emits() {
    let (gateway, provider) = demo_gateway();
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let mut events = gateway.subscribe();

    let updated = Profile { first_name: "Jonathan".into(), ..gateway.current_session().await.identity().unwrap().profile.clone() };
    assert!(gateway.update_profile(updated).await.is_ok());

    let event = events.try_recv().unwrap();
    let identity = event.session.identity().unwrap();
    assert_eq!(identity.profile.first_name, "Jonathan");
    assert_eq!(provider.fetch(&identity.user_id).await.unwrap().unwrap().first_name, "Jonathan");
    let remote = provider.current_user().await.unwrap().unwrap();
    assert_eq!(remote.user.metadata.first_name, "Jonathan");
}

#[tokio::test]
async fn update_profile_keeps_account_email() {
    let (gateway, provider) = demo_gateway();
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();

    let renamed = Profile {
        email: "renamed@uts.edu.my".into(),
        first_name: "Jonathan".into(),
        ..gateway.current_session().await.identity().unwrap().profile.clone()
    };
    assert!(gateway.update_profile(renamed).await.is_ok());

    let session = gateway.current_session().await;
    let identity = session.identity().unwrap();
    assert_eq!(identity.profile.first_name, "Jonathan");
    assert_eq!(identity.account_email(), "student@uts.edu.my");
    let record = provider.fetch(&identity.user_id).await.unwrap().unwrap();
    assert_eq!(record.email, "student@uts.edu.my");

    assert!(gateway.change_password("password123", "newpass1").await.is_ok());

    gateway.sign_out().await.unwrap();
    gateway.sign_in("student@uts.edu.my", "newpass1").await.unwrap();
    let session = gateway.current_session().await;
    let identity = session.identity().unwrap();
    assert_eq!(identity.profile.email, "student@uts.edu.my");
    assert_eq!(identity.profile.first_name, "Jonathan");
    assert!(gateway.change_password("newpass1", "password123").await.is_ok());
}

#[tokio::test]
async fn stale_record_email_does_not_replace_account_email() {
    let (gateway, provider) = demo_gateway();
    let session = provider.sign_in("student@uts.edu.my", "password123").await.unwrap();
    provider.sign_out().await.unwrap();
    let record = Profile { email: "old@uts.edu.my".into(), ..Profile::from_provider_user(&session.user) }
        .to_record(&session.user.id);
    provider.upsert(&record).await.unwrap();

    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let current = gateway.current_session().await;
    assert_eq!(current.identity().unwrap().account_email(), "student@uts.edu.my");
    assert!(gateway.change_password("password123", "newpass1").await.is_ok());
}

#[tokio::test]
async fn restore_uses_stored_profile_record() {
    let provider = Arc::new(MemoryProvider::with_demo_accounts());
    let session = provider.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let record = Profile { first_name: "Johnny".into(), ..Profile::from_provider_user(&session.user) }
        .to_record(&session.user.id);
    provider.upsert(&record).await.unwrap();

    let gateway = AuthGateway::new(provider.clone(), provider);
    let current = gateway.current_session().await;
    assert_eq!(current.identity().unwrap().profile.first_name, "Johnny");
}

// =============================================================================
// restore and atomicity
// =============================================================================

#[tokio::test]
async fn restore_happens_once_and_emits_nothing() {
    let flaky = FlakyProvider::demo();
    flaky.inner.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let (gateway, provider) = flaky_gateway(flaky);
    let mut events = gateway.subscribe();

    assert!(gateway.is_logged_in().await);
    assert!(gateway.is_logged_in().await);
    assert!(gateway.current_session().await.is_present());
    assert_eq!(provider.current_user_calls.load(Ordering::SeqCst), 1);
    assert!(events.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_half_applied_profile() {
    let (gateway, _) = demo_gateway();
    let gateway = Arc::new(gateway);
    gateway.sign_in("student@uts.edu.my", "password123").await.unwrap();
    let base = gateway.current_session().await.identity().unwrap().profile.clone();

    let writer = {
        let gateway = Arc::clone(&gateway);
        let base = base.clone();
        tokio::spawn(async move {
            for n in 0..50 {
                let tag = n.to_string();
                let profile = Profile { first_name: tag.clone(), last_name: tag, ..base.clone() };
                gateway.update_profile(profile).await.unwrap();
            }
        })
    };

    let sessions = gateway.sessions();
    let reader = tokio::spawn(async move {
        for _ in 0..500 {
            if let Some(Session::Present(identity)) = sessions.snapshot().await {
                let p = &identity.profile;
                assert!(
                    p.first_name == p.last_name || (p.first_name == "John" && p.last_name == "Doe"),
                    "torn profile: {} {}",
                    p.first_name,
                    p.last_name
                );
            }
            tokio::task::yield_now().await;
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();
}
