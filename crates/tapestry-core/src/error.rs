//! The abstract error kinds from §7, shared by every crate in the workspace
//! that needs to surface a typed failure rather than an opaque `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    /// The machine-readable `code` half of the §7 user-visible error pair.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Permission(_) => "permission_denied",
            Self::Conflict(_) => "conflict",
            Self::Provider(_) => "provider_error",
            Self::TokenRefresh(_) => "token_refresh_error",
            Self::RateLimit(_) => "rate_limited",
            Self::Cancelled => "cancelled",
        }
    }

    /// The HTTP status class this error kind maps to for an eventual (out of
    /// scope) HTTP boundary layer.
    pub fn status_class(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 422,
            Self::Permission(_) => 403,
            Self::Conflict(_) => 409,
            Self::Provider(_) => 502,
            Self::TokenRefresh(_) => 401,
            Self::RateLimit(_) => 429,
            Self::Cancelled => 499,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
