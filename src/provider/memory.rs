//! In-process identity provider and profile store.
//!
//! Backs the offline demo and the test suite. Accounts live in memory;
//! `with_demo_accounts()` seeds the two campus test students.

use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    IdentityProvider, ProfileRecord, ProfileStore, ProviderError, ProviderSession, ProviderUser, SignUpOutcome,
    UserAttributes, UserMetadata,
};

pub const DEMO_AVATAR_URL: &str = "https://via.placeholder.com/150";

#[derive(Debug, Clone)]
struct Account {
    id: String,
    email: String,
    password: String,
    metadata: UserMetadata,
    confirmed: bool,
    active: bool,
    last_sign_in_at: Option<OffsetDateTime>,
}

impl Account {
    fn user(&self) -> ProviderUser {
        ProviderUser {
            id: self.id.clone(),
            email: self.email.clone(),
            metadata: self.metadata.clone(),
            last_sign_in_at: self.last_sign_in_at,
        }
    }
}

#[derive(Default)]
struct State {
    accounts: Vec<Account>,
    /// Signed-in account id and its bearer token.
    signed_in: Option<(String, String)>,
    profiles: HashMap<String, ProfileRecord>,
    reset_requests: Vec<String>,
}

impl State {
    fn find_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.email.eq_ignore_ascii_case(email))
    }

    fn session_for(&self, id: &str, token: &str) -> Option<ProviderSession> {
        let account = self.accounts.iter().find(|a| a.id == id)?;
        Some(ProviderSession { access_token: token.to_owned(), refresh_token: None, user: account.user() })
    }
}

/// Identity provider and profile store held entirely in memory.
#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<State>,
    require_confirmation: bool,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider seeded with the campus demo students.
    #[must_use]
    pub fn with_demo_accounts() -> Self {
        let accounts = [
            ("student@uts.edu.my", "password123", "John", "Doe", "12345678"),
            ("jane.smith@uts.edu.my", "password456", "Jane", "Smith", "87654321"),
        ]
        .into_iter()
        .map(|(email, password, first, last, student_id)| Account {
            id: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            password: password.to_owned(),
            metadata: UserMetadata {
                first_name: first.to_owned(),
                last_name: last.to_owned(),
                student_id: student_id.to_owned(),
                avatar_url: DEMO_AVATAR_URL.to_owned(),
            },
            confirmed: true,
            active: true,
            last_sign_in_at: None,
        })
        .collect();

        Self { state: Mutex::new(State { accounts, ..State::default() }), require_confirmation: false }
    }

    /// New sign-ups stay unconfirmed and receive no session.
    #[must_use]
    pub fn require_confirmation(mut self, required: bool) -> Self {
        self.require_confirmation = required;
        self
    }

    /// Add a confirmed account directly. Returns its id.
    pub async fn add_account(&self, email: &str, password: &str, metadata: UserMetadata) -> String {
        let id = Uuid::new_v4().to_string();
        self.state.lock().await.accounts.push(Account {
            id: id.clone(),
            email: email.to_owned(),
            password: password.to_owned(),
            metadata,
            confirmed: true,
            active: true,
            last_sign_in_at: None,
        });
        id
    }

    /// Mark an account's email as confirmed. Returns `false` if unknown.
    pub async fn confirm_email(&self, email: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.accounts.iter_mut().find(|a| a.email.eq_ignore_ascii_case(email)) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Emails for which a reset was requested, oldest first.
    pub async fn reset_requests(&self) -> Vec<String> {
        self.state.lock().await.reset_requests.clone()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MemoryProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.email.eq_ignore_ascii_case(email) && a.password == password && a.active)
            .ok_or(ProviderError::InvalidCredentials)?;
        if !account.confirmed {
            return Err(ProviderError::EmailNotConfirmed);
        }
        account.last_sign_in_at = Some(OffsetDateTime::now_utc());
        let user = account.user();
        let token = Uuid::new_v4().simple().to_string();
        state.signed_in = Some((user.id.clone(), token.clone()));
        Ok(ProviderSession { access_token: token, refresh_token: None, user })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpOutcome, ProviderError> {
        let mut state = self.state.lock().await;
        if state.find_by_email(email).is_some() {
            return Err(ProviderError::AlreadyRegistered(email.to_owned()));
        }
        let account = Account {
            id: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            password: password.to_owned(),
            metadata: metadata.clone(),
            confirmed: !self.require_confirmation,
            active: true,
            last_sign_in_at: None,
        };
        let user = account.user();
        state.accounts.push(account);

        if self.require_confirmation {
            return Ok(SignUpOutcome::ConfirmationRequired(user));
        }
        let token = Uuid::new_v4().simple().to_string();
        state.signed_in = Some((user.id.clone(), token.clone()));
        Ok(SignUpOutcome::Active(ProviderSession { access_token: token, refresh_token: None, user }))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.state.lock().await.signed_in = None;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<ProviderSession>, ProviderError> {
        let state = self.state.lock().await;
        Ok(state.signed_in.as_ref().and_then(|(id, token)| state.session_for(id, token)))
    }

    async fn update_attributes(&self, attributes: &UserAttributes) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        let (id, _) = state.signed_in.clone().ok_or(ProviderError::NoActiveSession)?;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(ProviderError::NoActiveSession)?;
        if let Some(password) = &attributes.password {
            account.password.clone_from(password);
        }
        if let Some(metadata) = &attributes.metadata {
            account.metadata = metadata.clone();
        }
        Ok(())
    }

    async fn reset_password_for(&self, email: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.find_by_email(email).is_none() {
            return Err(ProviderError::UnknownAccount(email.to_owned()));
        }
        state.reset_requests.push(email.to_owned());
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryProvider {
    async fn upsert(&self, record: &ProfileRecord) -> Result<(), ProviderError> {
        self.state
            .lock()
            .await
            .profiles
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<ProfileRecord>, ProviderError> {
        Ok(self.state.lock().await.profiles.get(user_id).cloned())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
