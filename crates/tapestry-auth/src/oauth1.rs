//! OAuth1a (HMAC-SHA1) three-leg flow for providers that predate OAuth2
//! (on-premise SharePoint, some legacy connectors). The workspace's existing
//! OAuth bridge only covers OAuth2; this implements RFC 5849 signing
//! directly since it's a small, fully specified algorithm rather than a
//! library surface worth pulling in whole.

use crate::{AuthError, AuthResult, AuthToken};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::RngCore;
use reqwest::Client;
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

/// RFC 5849 §3.6: unreserved characters are not percent-encoded.
const RFC5849_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(input: &str) -> String {
    utf8_percent_encode(input, RFC5849_UNRESERVED).to_string()
}

#[derive(Debug, Clone)]
pub struct OAuth1Config {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub request_token_url: String,
    pub authorize_url: String,
    pub access_token_url: String,
    pub callback_url: String,
}

/// The temporary credentials obtained from leg one, persisted in a
/// Connection Init Session's `overrides` until the callback arrives.
#[derive(Debug, Clone)]
pub struct RequestToken {
    pub token: String,
    pub token_secret: String,
}

pub struct OAuth1Bridge {
    http_client: Client,
}

impl Default for OAuth1Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuth1Bridge {
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    /// Leg one: obtain an unauthorized request token.
    pub async fn obtain_request_token(&self, config: &OAuth1Config) -> AuthResult<RequestToken> {
        let mut params = BTreeMap::new();
        params.insert("oauth_callback".to_string(), config.callback_url.clone());

        let authorization = sign(
            "POST",
            &config.request_token_url,
            &params,
            &config.consumer_key,
            &config.consumer_secret,
            None,
            None,
        );

        let response = self
            .http_client
            .post(&config.request_token_url)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "request token fetch failed: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        let parsed = parse_form_encoded(&body);

        let token = parsed
            .get("oauth_token")
            .cloned()
            .ok_or_else(|| AuthError::Provider("missing oauth_token in response".into()))?;
        let token_secret = parsed
            .get("oauth_token_secret")
            .cloned()
            .ok_or_else(|| AuthError::Provider("missing oauth_token_secret in response".into()))?;

        Ok(RequestToken { token, token_secret })
    }

    /// The URL the user's browser is redirected to for leg two.
    pub fn authorize_url(&self, config: &OAuth1Config, request_token: &str) -> String {
        format!(
            "{}?oauth_token={}",
            config.authorize_url,
            encode(request_token)
        )
    }

    /// Leg three: exchange the verifier returned on callback for an access token.
    pub async fn exchange_verifier(
        &self,
        config: &OAuth1Config,
        request_token: &RequestToken,
        verifier: &str,
    ) -> AuthResult<AuthToken> {
        let mut params = BTreeMap::new();
        params.insert("oauth_token".to_string(), request_token.token.clone());
        params.insert("oauth_verifier".to_string(), verifier.to_string());

        let authorization = sign(
            "POST",
            &config.access_token_url,
            &params,
            &config.consumer_key,
            &config.consumer_secret,
            Some(&request_token.token),
            Some(&request_token.token_secret),
        );

        let response = self
            .http_client
            .post(&config.access_token_url)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "access token exchange failed: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        let parsed = parse_form_encoded(&body);

        let access_token = parsed
            .get("oauth_token")
            .cloned()
            .ok_or_else(|| AuthError::Provider("missing oauth_token in response".into()))?;
        let token_secret = parsed
            .get("oauth_token_secret")
            .cloned()
            .ok_or_else(|| AuthError::Provider("missing oauth_token_secret in response".into()))?;

        Ok(AuthToken {
            access_token,
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: Some("oauth1".to_string()),
            token_secret: Some(token_secret),
        })
    }

    /// Signs an already-formed request for use against the authenticated
    /// resource server, given the stored access token/secret pair.
    pub fn sign_request(
        &self,
        method: &str,
        url: &str,
        consumer_key: &str,
        consumer_secret: &str,
        token: &str,
        token_secret: &str,
        extra_params: &BTreeMap<String, String>,
    ) -> String {
        sign(
            method,
            url,
            extra_params,
            consumer_key,
            consumer_secret,
            Some(token),
            Some(token_secret),
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn sign(
    method: &str,
    url: &str,
    extra_params: &BTreeMap<String, String>,
    consumer_key: &str,
    consumer_secret: &str,
    token: Option<&str>,
    token_secret: Option<&str>,
) -> String {
    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = STANDARD.encode(nonce_bytes);
    let timestamp = chrono::Utc::now().timestamp().to_string();

    let mut all_params: BTreeMap<String, String> = extra_params.clone();
    all_params.insert("oauth_consumer_key".to_string(), consumer_key.to_string());
    all_params.insert("oauth_nonce".to_string(), nonce.clone());
    all_params.insert(
        "oauth_signature_method".to_string(),
        "HMAC-SHA1".to_string(),
    );
    all_params.insert("oauth_timestamp".to_string(), timestamp.clone());
    all_params.insert("oauth_version".to_string(), "1.0".to_string());
    if let Some(t) = token {
        all_params.insert("oauth_token".to_string(), t.to_string());
    }

    let param_string = all_params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        encode(&method.to_uppercase()),
        encode(url),
        encode(&param_string)
    );

    let signing_key = format!(
        "{}&{}",
        encode(consumer_secret),
        encode(token_secret.unwrap_or(""))
    );

    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(base_string.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let mut header_params = vec![
        ("oauth_consumer_key".to_string(), consumer_key.to_string()),
        ("oauth_nonce".to_string(), nonce),
        ("oauth_signature".to_string(), signature),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), timestamp),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];
    if let Some(t) = token {
        header_params.push(("oauth_token".to_string(), t.to_string()));
    }
    for (k, v) in extra_params {
        if k == "oauth_callback" || k == "oauth_verifier" {
            header_params.push((k.clone(), v.clone()));
        }
    }

    let header_body = header_params
        .into_iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(&k), encode(&v)))
        .collect::<Vec<_>>()
        .join(", ");

    format!("OAuth {header_body}")
}

fn parse_form_encoded(body: &str) -> BTreeMap<String, String> {
    body.split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_is_deterministic_given_fixed_nonce_inputs() {
        let mut params = BTreeMap::new();
        params.insert("oauth_callback".to_string(), "https://example.com/cb".to_string());
        let header = sign(
            "POST",
            "https://example.com/request_token",
            &params,
            "key",
            "secret",
            None,
            None,
        );
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature="));
    }

    #[test]
    fn parses_form_encoded_token_response() {
        let body = "oauth_token=abc123&oauth_token_secret=shh&oauth_callback_confirmed=true";
        let parsed = parse_form_encoded(body);
        assert_eq!(parsed.get("oauth_token").unwrap(), "abc123");
        assert_eq!(parsed.get("oauth_token_secret").unwrap(), "shh");
    }
}
