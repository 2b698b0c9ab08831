//! Auth gateway: identity-provider operations and session coherence.
//!
//! ARCHITECTURE
//! ============
//! The gateway is the only writer of the `SessionStore`. Every operation
//! talks to the provider first and touches the store only after the
//! provider succeeded, so a failed call leaves both the session and any
//! navigation state derived from it exactly as they were.
//!
//! ERROR HANDLING
//! ==============
//! Provider errors stop here. Callers get `Result<(), AuthFailure>` with a
//! single opaque failure; the cause is logged. A profile-table write that
//! fails after the session itself succeeded is logged and ignored.

use std::sync::Arc;

use tracing::{info, warn};

use crate::events::Subscription;
use crate::provider::{IdentityProvider, ProfileStore, SignUpOutcome, UserAttributes};
use crate::services::validation;
use crate::session::{Identity, Profile, Session, SessionChangeEvent, SessionStore};

/// An auth operation did not succeed. Causes are intentionally not exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("authentication operation failed")]
pub struct AuthFailure;

pub type AuthResult = Result<(), AuthFailure>;

pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    store: Arc<SessionStore>,
}

impl AuthGateway {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        let store = Arc::new(SessionStore::with_profiles(Arc::clone(&provider), Arc::clone(&profiles)));
        Self { provider, profiles, store }
    }

    /// Read-only handle for dependent screens and the navigation gate.
    #[must_use]
    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription<SessionChangeEvent> {
        self.store.subscribe()
    }

    pub async fn current_session(&self) -> Session {
        self.store.current().await
    }

    pub async fn is_logged_in(&self) -> bool {
        self.store.is_logged_in().await
    }

    // =========================================================================
    // SIGN IN / UP / OUT
    // =========================================================================

    /// # Errors
    ///
    /// Fails on empty input or any provider rejection; the session is untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthFailure);
        }

        let provider_session = self.provider.sign_in(email, password).await.map_err(|e| {
            warn!(error = %e, "sign-in rejected");
            AuthFailure
        })?;

        let identity = self.store.resolve_identity(&provider_session).await;
        info!(user_id = %identity.user_id, "signed in");
        self.store.replace(Session::present(identity)).await;
        Ok(())
    }

    /// Register `profile` with `password`. A confirmation-required answer is
    /// followed by one sign-in attempt with the same credentials; if that
    /// attempt fails the whole sign-up fails.
    ///
    /// # Errors
    ///
    /// Fails on invalid input, duplicate email, or when no session results.
    pub async fn sign_up(&self, profile: &Profile, password: &str) -> AuthResult {
        if !is_complete(profile) || password.is_empty() || !validation::is_valid_email(profile.email.trim()) {
            return Err(AuthFailure);
        }
        let email = profile.email.trim();

        let outcome = self
            .provider
            .sign_up(email, password, &profile.metadata())
            .await
            .map_err(|e| {
                warn!(error = %e, "sign-up rejected");
                AuthFailure
            })?;

        let provider_session = match outcome {
            SignUpOutcome::Active(session) => session,
            SignUpOutcome::ConfirmationRequired(user) => {
                info!(user_id = %user.id, "sign-up needs confirmation; trying sign-in");
                self.provider.sign_in(email, password).await.map_err(|e| {
                    warn!(error = %e, "post sign-up sign-in failed");
                    AuthFailure
                })?
            }
        };

        let identity = Identity::from_provider_session(&provider_session).with_profile(profile.clone());
        let user_id = identity.user_id.clone();
        if let Err(e) = self.profiles.upsert(&identity.profile.to_record(&user_id)).await {
            warn!(error = %e, %user_id, "profile upsert failed after sign-up");
        }

        info!(%user_id, "signed up");
        self.store.replace(Session::present(identity)).await;
        Ok(())
    }

    /// Always clears the local session and emits `Absent`, whatever the
    /// provider says.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` keeps the operation signatures uniform.
    pub async fn sign_out(&self) -> AuthResult {
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "provider sign-out failed; clearing local session anyway");
        }
        self.store.replace(Session::Absent).await;
        info!("signed out");
        Ok(())
    }

    // =========================================================================
    // PASSWORD
    // =========================================================================

    /// Re-verify `current` with the provider, then set `new`.
    ///
    /// # Errors
    ///
    /// Fails when `new` is too short, nobody is signed in, or the provider
    /// refuses either step.
    pub async fn change_password(&self, current: &str, new: &str) -> AuthResult {
        if !validation::is_valid_password(new) {
            return Err(AuthFailure);
        }
        let Session::Present(identity) = self.store.current().await else {
            return Err(AuthFailure);
        };

        self.provider
            .sign_in(identity.account_email(), current)
            .await
            .map_err(|e| {
                warn!(error = %e, "current password check failed");
                AuthFailure
            })?;

        let attributes = UserAttributes { password: Some(new.to_owned()), metadata: None };
        self.provider
            .update_attributes(&attributes)
            .await
            .map_err(|e| {
                warn!(error = %e, "password update failed");
                AuthFailure
            })
    }

    /// # Errors
    ///
    /// Fails on empty input or provider rejection.
    pub async fn reset_password(&self, email: &str) -> AuthResult {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthFailure);
        }
        self.provider.reset_password_for(email).await.map_err(|e| {
            warn!(error = %e, "password reset request failed");
            AuthFailure
        })
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    /// Replace the signed-in user's display fields. The account email is not
    /// one of them and stays as the provider has it.
    ///
    /// # Errors
    ///
    /// Fails without any mutation when the provider has no active session,
    /// the attribute update is refused, or the local session is absent.
    pub async fn update_profile(&self, profile: Profile) -> AuthResult {
        let provider_session = match self.provider.current_user().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!("profile update without active provider session");
                return Err(AuthFailure);
            }
            Err(e) => {
                warn!(error = %e, "provider session lookup failed");
                return Err(AuthFailure);
            }
        };
        if !self.store.current().await.is_present() {
            return Err(AuthFailure);
        }

        let attributes = UserAttributes { password: None, metadata: Some(profile.metadata()) };
        self.provider
            .update_attributes(&attributes)
            .await
            .map_err(|e| {
                warn!(error = %e, "profile attribute update failed");
                AuthFailure
            })?;

        let user_id = &provider_session.user.id;
        let profile = Profile { email: provider_session.user.email.clone(), ..profile };
        if let Err(e) = self.profiles.upsert(&profile.to_record(user_id)).await {
            warn!(error = %e, %user_id, "profile upsert failed");
        }

        match self.store.replace_profile(profile).await {
            Some(_) => Ok(()),
            None => Err(AuthFailure),
        }
    }
}

fn is_complete(profile: &Profile) -> bool {
    [&profile.email, &profile.first_name, &profile.last_name, &profile.student_id]
        .iter()
        .all(|field| !field.trim().is_empty())
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
