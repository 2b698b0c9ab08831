//! Supabase client: GoTrue auth endpoints and the `profiles` table.
//!
//! Thin HTTP wrapper over `/auth/v1` and `/rest/v1/profiles`. Response
//! parsing lives in pure functions for testability. The bearer token of the
//! signed-in account is held in memory and, when a session file is
//! configured, mirrored to disk so a later run can restore it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    IdentityProvider, ProfileRecord, ProfileStore, ProviderError, ProviderSession, ProviderUser, SignUpOutcome,
    UserAttributes, UserMetadata,
};
use crate::config::SupabaseConfig;

const AUTH_PATH: &str = "/auth/v1";
const PROFILES_PATH: &str = "/rest/v1/profiles";

// =============================================================================
// CLIENT
// =============================================================================

/// Tokens for the signed-in account, as persisted in the session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

pub struct SupabaseProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session_file: Option<PathBuf>,
    tokens: RwLock<Option<StoredTokens>>,
}

impl SupabaseProvider {
    /// Build the client, loading persisted tokens if a session file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))?;

        let tokens = config.session_file.as_deref().and_then(load_tokens);

        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            session_file: config.session_file.clone(),
            tokens: RwLock::new(tokens),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}{AUTH_PATH}{path}", self.base_url)
    }

    async fn bearer(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    async fn set_tokens(&self, tokens: Option<StoredTokens>) {
        if let Some(path) = &self.session_file {
            if let Err(e) = save_tokens(path, tokens.as_ref()).await {
                warn!(error = %e, path = %path.display(), "session file write failed");
            }
        }
        *self.tokens.write().await = tokens;
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
        let response = request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(ProviderError::Rejected { status, message: error_message(&text) });
        }
        Ok(text)
    }

    async fn install_session(&self, session: &ProviderSession) {
        self.set_tokens(Some(StoredTokens {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        }))
        .await;
    }
}

#[async_trait::async_trait]
impl IdentityProvider for SupabaseProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        let request = self
            .http
            .post(self.auth_url("/token?grant_type=password"))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let body = self.send(request).await.map_err(classify_sign_in_error)?;
        let session = parse_session(&body)?;
        self.install_session(&session).await;
        debug!(user_id = %session.user.id, "provider sign-in");
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpOutcome, ProviderError> {
        let request = self
            .http
            .post(self.auth_url("/signup"))
            .json(&serde_json::json!({ "email": email, "password": password, "data": metadata }));
        let body = self
            .send(request)
            .await
            .map_err(|e| classify_sign_up_error(e, email))?;
        let outcome = parse_sign_up(&body)?;
        if let SignUpOutcome::Active(session) = &outcome {
            self.install_session(session).await;
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(token) = self.bearer().await else {
            return Ok(());
        };
        self.set_tokens(None).await;
        let request = self
            .http
            .post(self.auth_url("/logout"))
            .bearer_auth(token);
        self.send(request).await.map(|_| ())
    }

    async fn current_user(&self) -> Result<Option<ProviderSession>, ProviderError> {
        let Some(tokens) = self.tokens.read().await.clone() else {
            return Ok(None);
        };
        let request = self
            .http
            .get(self.auth_url("/user"))
            .bearer_auth(&tokens.access_token);
        match self.send(request).await {
            Ok(body) => {
                let user = parse_user(&body)?;
                Ok(Some(ProviderSession {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    user,
                }))
            }
            Err(ProviderError::Rejected { status: 401 | 403, .. }) => {
                debug!("stored provider token no longer valid");
                self.set_tokens(None).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_attributes(&self, attributes: &UserAttributes) -> Result<(), ProviderError> {
        let token = self.bearer().await.ok_or(ProviderError::NoActiveSession)?;
        let request = self
            .http
            .put(self.auth_url("/user"))
            .bearer_auth(token)
            .json(attributes);
        self.send(request).await.map(|_| ())
    }

    async fn reset_password_for(&self, email: &str) -> Result<(), ProviderError> {
        let request = self
            .http
            .post(self.auth_url("/recover"))
            .json(&serde_json::json!({ "email": email }));
        self.send(request).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl ProfileStore for SupabaseProvider {
    async fn upsert(&self, record: &ProfileRecord) -> Result<(), ProviderError> {
        let token = self.bearer().await.unwrap_or_else(|| self.anon_key.clone());
        let request = self
            .http
            .post(format!("{}{PROFILES_PATH}", self.base_url))
            .bearer_auth(token)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[record]);
        self.send(request).await.map(|_| ())
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<ProfileRecord>, ProviderError> {
        let token = self.bearer().await.unwrap_or_else(|| self.anon_key.clone());
        let request = self
            .http
            .get(format!("{}{PROFILES_PATH}", self.base_url))
            .bearer_auth(token)
            .query(&[("id", format!("eq.{user_id}")), ("select", "*".to_owned())]);
        let body = self.send(request).await?;
        parse_profile_rows(&body)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
    #[serde(default)]
    last_sign_in_at: Option<String>,
}

impl From<WireUser> for ProviderUser {
    fn from(wire: WireUser) -> Self {
        Self {
            id: wire.id,
            email: wire.email.unwrap_or_default(),
            metadata: wire.user_metadata.unwrap_or_default(),
            last_sign_in_at: wire
                .last_sign_in_at
                .as_deref()
                .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok()),
        }
    }
}

#[derive(Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: WireUser,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_session(json: &str) -> Result<ProviderSession, ProviderError> {
    let wire: WireSession = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(ProviderSession {
        access_token: wire.access_token,
        refresh_token: wire.refresh_token,
        user: wire.user.into(),
    })
}

fn parse_user(json: &str) -> Result<ProviderUser, ProviderError> {
    let wire: WireUser = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(wire.into())
}

/// Sign-up answers with a full session when the project auto-confirms and
/// with the bare user object when email confirmation is pending.
fn parse_sign_up(json: &str) -> Result<SignUpOutcome, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if value.get("access_token").is_some_and(|t| !t.is_null()) {
        return parse_session(json).map(SignUpOutcome::Active);
    }
    let user = value.get("user").cloned().unwrap_or(value);
    let wire: WireUser = serde_json::from_value(user).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(SignUpOutcome::ConfirmationRequired(wire.into()))
}

fn parse_profile_rows(json: &str) -> Result<Option<ProfileRecord>, ProviderError> {
    let rows: Vec<ProfileRecord> = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(rows.into_iter().next())
}

/// Best human-readable message from a GoTrue/PostgREST error body.
fn error_message(body: &str) -> String {
    let Ok(wire) = serde_json::from_str::<WireError>(body) else {
        return body.trim().to_owned();
    };
    wire.error_description
        .or(wire.msg)
        .or(wire.message)
        .or(wire.error)
        .unwrap_or_else(|| body.trim().to_owned())
}

fn classify_sign_in_error(err: ProviderError) -> ProviderError {
    match err {
        ProviderError::Rejected { status: 400, message } if message.to_ascii_lowercase().contains("not confirmed") => {
            ProviderError::EmailNotConfirmed
        }
        ProviderError::Rejected { status: 400, message }
            if message.to_ascii_lowercase().contains("invalid login credentials") =>
        {
            ProviderError::InvalidCredentials
        }
        other => other,
    }
}

fn classify_sign_up_error(err: ProviderError, email: &str) -> ProviderError {
    match err {
        ProviderError::Rejected { status: 400 | 422, message }
            if message.to_ascii_lowercase().contains("already registered") =>
        {
            ProviderError::AlreadyRegistered(email.to_owned())
        }
        other => other,
    }
}

// =============================================================================
// SESSION FILE
// =============================================================================

fn load_tokens(path: &Path) -> Option<StoredTokens> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(tokens) => Some(tokens),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "ignoring unreadable session file");
            None
        }
    }
}

async fn save_tokens(path: &Path, tokens: Option<&StoredTokens>) -> Result<(), ProviderError> {
    match tokens {
        Some(tokens) => {
            let json = serde_json::to_string(tokens).map_err(|e| ProviderError::SessionFile(e.to_string()))?;
            tokio::fs::write(path, json)
                .await
                .map_err(|e| ProviderError::SessionFile(e.to_string()))
        }
        None => match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(ProviderError::SessionFile(e.to_string())),
            _ => Ok(()),
        },
    }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
