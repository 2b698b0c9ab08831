//! Identity provider: external system of record for credentials.
//!
//! DESIGN
//! ======
//! The auth gateway talks to the provider and the profile table only
//! through the `IdentityProvider` and `ProfileStore` traits, so tests and
//! the offline demo can substitute an in-process implementation. Two
//! implementations ship: `SupabaseProvider` (hosted REST backend) and
//! `MemoryProvider` (seeded campus accounts).

pub mod memory;
pub mod supabase;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use memory::MemoryProvider;
pub use supabase::SupabaseProvider;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by provider and profile-store calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request could not be sent or its body not read.
    #[error("provider request failed: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("provider rejected request: status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The provider response body did not match the expected shape.
    #[error("provider response parse failed: {0}")]
    Parse(String),

    /// The operation requires a signed-in provider session.
    #[error("no active provider session")]
    NoActiveSession,

    /// Credentials were not accepted.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with that email already exists.
    #[error("email already registered: {0}")]
    AlreadyRegistered(String),

    /// The account exists but its email has not been confirmed.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// No account matches the given email.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// Local token persistence failed.
    #[error("session file error: {0}")]
    SessionFile(String),
}

// =============================================================================
// WIRE-NEUTRAL TYPES
// =============================================================================

/// Profile metadata attached to a provider account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Account as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    /// Provider-issued opaque identifier.
    pub id: String,
    pub email: String,
    pub metadata: UserMetadata,
    pub last_sign_in_at: Option<OffsetDateTime>,
}

/// An authenticated provider session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: ProviderUser,
}

/// Result of a sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The account is usable immediately.
    Active(ProviderSession),
    /// The provider created the account but withholds a session until the
    /// email is confirmed.
    ConfirmationRequired(ProviderUser),
}

/// Attribute changes for the signed-in account. `None` fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "data", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UserMetadata>,
}

/// Row in the `profiles` table, keyed by provider user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub avatar_url: String,
    #[serde(default)]
    pub is_active: Option<bool>,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Hosted identity provider. Implementations hold their own client-side
/// session (the bearer token used by `sign_out`, `current_user` and
/// `update_attributes`).
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange email and password for a session.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on rejection or transport failure.
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError>;

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the email is taken or the request fails.
    async fn sign_up(&self, email: &str, password: &str, metadata: &UserMetadata)
    -> Result<SignUpOutcome, ProviderError>;

    /// End the provider session. Must succeed when no session is active.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the remote revoke fails.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Look up an existing valid session, if the provider still holds one.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the lookup itself fails.
    async fn current_user(&self) -> Result<Option<ProviderSession>, ProviderError>;

    /// Update attributes of the signed-in account.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoActiveSession`] when signed out.
    async fn update_attributes(&self, attributes: &UserAttributes) -> Result<(), ProviderError>;

    /// Start the out-of-band password reset flow.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the request fails.
    async fn reset_password_for(&self, email: &str) -> Result<(), ProviderError>;
}

/// Profile table access, keyed by provider user id.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace the record for `record.id`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the write fails.
    async fn upsert(&self, record: &ProfileRecord) -> Result<(), ProviderError>;

    /// Load the record for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the read fails.
    async fn fetch(&self, user_id: &str) -> Result<Option<ProfileRecord>, ProviderError>;
}
