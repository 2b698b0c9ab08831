//! Session store: the single record of who is signed in.
//!
//! DESIGN
//! ======
//! The store starts *cold*. The first `current()` call restores once through
//! the identity provider and caches the outcome, a failed restore caching
//! `Absent`. After that every read is a snapshot clone of the cached value;
//! the identity sits behind an `Arc` so snapshots are cheap and can never
//! alias the live slot.
//!
//! Mutation is crate-private and only the auth gateway performs it. Each
//! mutation replaces the whole value under the write lock and emits its
//! `SessionChangeEvent` before the lock is released, which keeps emission
//! order identical to mutation order and means a reader sees either the old
//! or the new session in full.

use std::fmt;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::events::{EventHub, Subscription};
use crate::provider::{IdentityProvider, ProfileRecord, ProfileStore, ProviderSession, ProviderUser, UserMetadata};

// =============================================================================
// PROFILE
// =============================================================================

/// Display profile shown by dependent screens.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Profile {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub avatar_url: String,
}

impl Profile {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }

    #[must_use]
    pub fn from_provider_user(user: &ProviderUser) -> Self {
        Self {
            email: user.email.clone(),
            first_name: user.metadata.first_name.clone(),
            last_name: user.metadata.last_name.clone(),
            student_id: user.metadata.student_id.clone(),
            avatar_url: user.metadata.avatar_url.clone(),
        }
    }

    #[must_use]
    pub fn from_record(record: &ProfileRecord) -> Self {
        Self {
            email: record.email.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            student_id: record.student_id.clone(),
            avatar_url: record.avatar_url.clone(),
        }
    }

    #[must_use]
    pub fn to_record(&self, user_id: &str) -> ProfileRecord {
        ProfileRecord {
            id: user_id.to_owned(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            student_id: self.student_id.clone(),
            avatar_url: self.avatar_url.clone(),
            is_active: Some(true),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> UserMetadata {
        UserMetadata {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            student_id: self.student_id.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

// =============================================================================
// IDENTITY / SESSION
// =============================================================================

/// An authenticated identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Provider-issued opaque user id.
    pub user_id: String,
    /// Bearer token for the provider session, when one was issued.
    pub access_token: Option<String>,
    pub profile: Profile,
    pub active: bool,
    pub last_sign_in_at: Option<OffsetDateTime>,
}

impl Identity {
    #[must_use]
    pub fn from_provider_session(session: &ProviderSession) -> Self {
        Self {
            user_id: session.user.id.clone(),
            access_token: Some(session.access_token.clone()),
            profile: Profile::from_provider_user(&session.user),
            active: true,
            last_sign_in_at: session.user.last_sign_in_at,
        }
    }

    /// Email of the provider account. Profile replacements never change it.
    #[must_use]
    pub fn account_email(&self) -> &str {
        &self.profile.email
    }

    /// Same identity with different display fields. The account email is
    /// kept; the provider owns it.
    #[must_use]
    pub fn with_profile(&self, profile: Profile) -> Self {
        let profile = Profile { email: self.profile.email.clone(), ..profile };
        Self { profile, ..self.clone() }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("profile", &self.profile)
            .field("active", &self.active)
            .field("last_sign_in_at", &self.last_sign_in_at)
            .finish()
    }
}

/// Who is signed in, if anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Present(Arc<Identity>),
    Absent,
}

impl Session {
    #[must_use]
    pub fn present(identity: Identity) -> Self {
        Self::Present(Arc::new(identity))
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Present(identity) => Some(identity),
            Self::Absent => None,
        }
    }
}

/// Emitted on every session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChangeEvent {
    pub session: Session,
    /// Position of this transition in the store's mutation history.
    pub sequence: u64,
}

// =============================================================================
// STORE
// =============================================================================

enum Slot {
    Cold,
    Known(Session),
}

struct Inner {
    slot: Slot,
    sequence: u64,
}

/// Holds the current session and answers identity queries.
pub struct SessionStore {
    inner: RwLock<Inner>,
    restoring: Mutex<()>,
    provider: Arc<dyn IdentityProvider>,
    profiles: Option<Arc<dyn ProfileStore>>,
    events: EventHub<SessionChangeEvent>,
}

impl SessionStore {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            inner: RwLock::new(Inner { slot: Slot::Cold, sequence: 0 }),
            restoring: Mutex::new(()),
            provider,
            profiles: None,
            events: EventHub::new(),
        }
    }

    /// Store whose identities prefer the stored profile record over provider
    /// metadata, both on restore and for fresh sign-ins.
    #[must_use]
    pub fn with_profiles(provider: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles: Some(profiles), ..Self::new(provider) }
    }

    /// Current session, restoring once from the provider while cold.
    pub async fn current(&self) -> Session {
        if let Some(session) = self.snapshot().await {
            return session;
        }

        let _restoring = self.restoring.lock().await;
        if let Some(session) = self.snapshot().await {
            return session;
        }

        let restored = match self.provider.current_user().await {
            Ok(Some(provider_session)) => Session::present(self.resolve_identity(&provider_session).await),
            Ok(None) => Session::Absent,
            Err(e) => {
                warn!(error = %e, "session restore failed");
                Session::Absent
            }
        };

        let mut inner = self.inner.write().await;
        // A sign-in landed while the provider was answering; it wins.
        if let Slot::Known(session) = &inner.slot {
            return session.clone();
        }
        debug!(present = restored.is_present(), "session restored");
        inner.slot = Slot::Known(restored.clone());
        restored
    }

    pub async fn is_logged_in(&self) -> bool {
        self.current().await.is_present()
    }

    /// Cached session without restoring. `None` while still cold.
    pub async fn snapshot(&self) -> Option<Session> {
        match &self.inner.read().await.slot {
            Slot::Known(session) => Some(session.clone()),
            Slot::Cold => None,
        }
    }

    /// Register for session transitions.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<SessionChangeEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    /// Identity for a provider session, taking display fields from the stored
    /// profile record when there is one.
    pub(crate) async fn resolve_identity(&self, provider_session: &ProviderSession) -> Identity {
        let identity = Identity::from_provider_session(provider_session);
        let Some(profiles) = &self.profiles else {
            return identity;
        };
        match profiles.fetch(&identity.user_id).await {
            Ok(Some(record)) => identity.with_profile(Profile::from_record(&record)),
            Ok(None) => identity,
            Err(e) => {
                warn!(error = %e, user_id = %identity.user_id, "profile fetch failed; using provider metadata");
                identity
            }
        }
    }

    /// Install `session` and notify subscribers.
    pub(crate) async fn replace(&self, session: Session) -> SessionChangeEvent {
        let mut inner = self.inner.write().await;
        inner.sequence += 1;
        inner.slot = Slot::Known(session.clone());
        let event = SessionChangeEvent { session, sequence: inner.sequence };
        self.events.emit(&event);
        event
    }

    /// Swap the profile of the present identity. Returns `None` without
    /// touching anything when no session is present.
    pub(crate) async fn replace_profile(&self, profile: Profile) -> Option<SessionChangeEvent> {
        let mut inner = self.inner.write().await;
        let Slot::Known(Session::Present(identity)) = &inner.slot else {
            return None;
        };
        let session = Session::present(identity.with_profile(profile));
        inner.sequence += 1;
        inner.slot = Slot::Known(session.clone());
        let event = SessionChangeEvent { session, sequence: inner.sequence };
        self.events.emit(&event);
        Some(event)
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
