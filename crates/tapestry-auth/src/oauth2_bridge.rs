//! OAuth2 authorization-code (with optional PKCE) and refresh-token flows,
//! generalized from a single hardcoded four-provider bridge into a
//! per-source-connection configuration so any registry entry declaring
//! `OAuthBrowser`/`OAuthByoc`/`OAuthToken` can drive it.

use crate::{AuthError, AuthResult, AuthToken};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: Option<String>,
    /// Whether the provider supports PKCE (most modern OAuth2 providers do).
    pub supports_pkce: bool,
}

/// The state that must be persisted in a Connection Init Session's
/// `overrides` between generating the authorize URL and handling the
/// callback.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: Option<String>,
}

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

pub struct OAuth2Bridge {
    http_client: Client,
}

impl Default for OAuth2Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuth2Bridge {
    pub fn new() -> Self {
        let http_client = Client::builder()
            .redirect(Policy::none())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http_client }
    }

    pub fn authorize_url(
        &self,
        config: &OAuth2Config,
        scopes: &[&str],
    ) -> AuthResult<PendingAuthorization> {
        let client = build_client(config)?;
        let mut req = client.authorize_url(CsrfToken::new_random);
        for scope in scopes {
            req = req.add_scope(Scope::new(scope.to_string()));
        }

        let pkce_verifier = if config.supports_pkce {
            let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
            req = req.set_pkce_challenge(challenge);
            Some(verifier.secret().to_string())
        } else {
            None
        };

        let (url, csrf) = req.url();
        Ok(PendingAuthorization {
            url: url.to_string(),
            csrf_state: csrf.secret().to_string(),
            pkce_verifier,
        })
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        config: &OAuth2Config,
        pkce_verifier: Option<&str>,
    ) -> AuthResult<AuthToken> {
        let client = build_client(config)?;
        let mut req = client.exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(redirect_uri) = &config.redirect_uri {
            let redirect = RedirectUrl::new(redirect_uri.to_string())
                .map_err(|e| AuthError::Validation(e.to_string()))?;
            req = req.set_redirect_uri(Cow::Owned(redirect));
        }
        if let Some(verifier) = pkce_verifier {
            req = req.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()));
        }

        let token = req
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        Ok(token_response_to_auth_token(&token))
    }

    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        config: &OAuth2Config,
    ) -> AuthResult<AuthToken> {
        let client = build_client(config)?;
        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::TokenRefresh(e.to_string()))?;

        Ok(token_response_to_auth_token(&token))
    }
}

fn token_response_to_auth_token(
    token: &oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
) -> AuthToken {
    let access_token = token.access_token().secret().to_string();
    let refresh_token = token.refresh_token().map(|t| t.secret().to_string());
    let expires_at = token
        .expires_in()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| chrono::Utc::now() + d);
    let scope = token.scopes().map(|scopes| {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });
    let token_type = Some(token.token_type().as_ref().to_string());

    AuthToken {
        access_token,
        refresh_token,
        expires_at,
        scope,
        token_type,
        token_secret: None,
    }
}

fn build_client(config: &OAuth2Config) -> AuthResult<ConfiguredClient> {
    let auth_url =
        AuthUrl::new(config.auth_url.clone()).map_err(|_| AuthError::Validation("invalid auth_url".into()))?;
    let token_url = TokenUrl::new(config.token_url.clone())
        .map_err(|_| AuthError::Validation("invalid token_url".into()))?;
    let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url);
    if let Some(redirect_uri) = &config.redirect_uri {
        let redirect = RedirectUrl::new(redirect_uri.clone())
            .map_err(|e| AuthError::Validation(e.to_string()))?;
        client = client.set_redirect_uri(redirect);
    }
    Ok(client)
}
