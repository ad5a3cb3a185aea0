//! Token Manager (§4.2): provides valid access tokens, refreshing on demand
//! and on 401, coalescing concurrent refresh attempts for the same
//! (org, connection) pair into one provider round-trip (§5, §8 property 6).

use crate::oauth2_bridge::{OAuth2Bridge, OAuth2Config};
use crate::{AuthError, AuthResult, AuthToken, OAuthTokenType};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Persists a refreshed token back to the credential store. Implemented by
/// the store crate; kept as a trait here so this crate has no dependency on
/// the persistence layer.
#[async_trait]
pub trait CredentialPersister: Send + Sync {
    async fn persist_refreshed(&self, token: &AuthToken) -> AuthResult<()>;
}

/// Safety margin before expiry at which a proactive refresh is triggered.
const REFRESH_MARGIN_SECONDS: i64 = 60;

pub struct TokenManager {
    state: RwLock<AuthToken>,
    refresh_gate: Mutex<()>,
    oauth_type: OAuthTokenType,
    oauth2_config: Option<OAuth2Config>,
    bridge: OAuth2Bridge,
    persister: Arc<dyn CredentialPersister>,
}

impl TokenManager {
    pub fn new(
        initial: AuthToken,
        oauth_type: OAuthTokenType,
        oauth2_config: Option<OAuth2Config>,
        persister: Arc<dyn CredentialPersister>,
    ) -> Self {
        Self {
            state: RwLock::new(initial),
            refresh_gate: Mutex::new(()),
            oauth_type,
            oauth2_config,
            bridge: OAuth2Bridge::new(),
            persister,
        }
    }

    /// Returns a token guaranteed valid for at least `REFRESH_MARGIN_SECONDS`,
    /// proactively refreshing if the stored token is refreshable and close to
    /// expiry.
    pub async fn get_valid_token(&self) -> AuthResult<AuthToken> {
        let needs_refresh = {
            let current = self.state.read().await;
            self.oauth_type.refreshable()
                && current
                    .expires_at
                    .map(|exp| {
                        (exp - chrono::Utc::now()).num_seconds() < REFRESH_MARGIN_SECONDS
                    })
                    .unwrap_or(false)
        };

        if needs_refresh {
            self.refresh_on_unauthorized().await
        } else {
            Ok(self.state.read().await.clone())
        }
    }

    /// Called by a driver after receiving a 401. Performs at most one
    /// provider refresh call per concurrent wave of callers: a caller that
    /// acquires the gate after another has already refreshed observes the
    /// new token and returns immediately without a second round-trip.
    pub async fn refresh_on_unauthorized(&self) -> AuthResult<AuthToken> {
        let snapshot = self.state.read().await.access_token.clone();

        let _permit = self.refresh_gate.lock().await;

        let current_access_token = self.state.read().await.access_token.clone();
        if current_access_token != snapshot {
            // Another caller already refreshed while we waited for the gate.
            return Ok(self.state.read().await.clone());
        }

        if !self.oauth_type.refreshable() {
            return Err(AuthError::TokenRefresh(
                "token type does not support refresh".to_string(),
            ));
        }

        let refresh_token = {
            let current = self.state.read().await;
            current
                .refresh_token
                .clone()
                .ok_or_else(|| AuthError::TokenRefresh("no refresh token on file".to_string()))?
        };

        let config = self
            .oauth2_config
            .as_ref()
            .ok_or_else(|| AuthError::TokenRefresh("no oauth2 config configured".to_string()))?;

        let mut refreshed = self.bridge.refresh_token(&refresh_token, config).await?;

        if !self.oauth_type.rotates() {
            // Non-rotating providers may omit refresh_token in the response;
            // keep the existing one rather than dropping it.
            if refreshed.refresh_token.is_none() {
                refreshed.refresh_token = Some(refresh_token);
            }
        }

        self.persister.persist_refreshed(&refreshed).await?;
        *self.state.write().await = refreshed.clone();

        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPersister {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialPersister for CountingPersister {
        async fn persist_refreshed(&self, _token: &AuthToken) -> AuthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn non_refreshable_token() -> AuthToken {
        AuthToken {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: Some("Bearer".to_string()),
            token_secret: None,
        }
    }

    #[tokio::test]
    async fn refresh_on_non_refreshable_type_is_an_error() {
        let persister = Arc::new(CountingPersister {
            calls: AtomicUsize::new(0),
        });
        let manager = TokenManager::new(
            non_refreshable_token(),
            OAuthTokenType::AccessOnly,
            None,
            persister,
        );

        let result = manager.refresh_on_unauthorized().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_valid_token_without_expiry_does_not_refresh() {
        let persister = Arc::new(CountingPersister {
            calls: AtomicUsize::new(0),
        });
        let manager = TokenManager::new(
            non_refreshable_token(),
            OAuthTokenType::WithRefresh,
            None,
            persister.clone(),
        );

        let token = manager.get_valid_token().await.unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(persister.calls.load(Ordering::SeqCst), 0);
    }
}
