//! Credential encryption boundary, OAuth2/OAuth1a bridges, and token refresh
//! coalescing for source connections.
//!
//! The secret-encryption primitive is treated as an external collaborator in
//! production (a KMS, a vault, a platform-managed envelope key); [`cipher`]
//! defines the trait boundary the rest of the system consumes and ships one
//! concrete, self-contained implementation suitable for a single-process
//! deployment or tests.

pub mod cipher;
pub mod oauth1;
pub mod oauth2_bridge;
pub mod token;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a Source Connection authenticates, per spec §4.1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Direct,
    OauthBrowser,
    OauthToken,
    OauthByoc,
    AuthProvider,
}

/// OAuth token refresh capability declared by a source's registry entry (§4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OAuthTokenType {
    None,
    AccessOnly,
    WithRefresh,
    WithRotatingRefresh,
}

impl OAuthTokenType {
    pub fn refreshable(&self) -> bool {
        matches!(self, Self::WithRefresh | Self::WithRotatingRefresh)
    }

    pub fn rotates(&self) -> bool {
        matches!(self, Self::WithRotatingRefresh)
    }
}

/// A decrypted OAuth or direct-credential token set, as held in memory by a
/// Token Manager for the lifetime of a sync or request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    /// OAuth1 only: the token secret paired with `access_token`.
    pub token_secret: Option<String>,
}

/// §7 error kinds relevant to this crate's contract surface.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("cipher error: {0}")]
    Cipher(String),
}

pub type AuthResult<T> = Result<T, AuthError>;
