//! §4.3/§4.4: the Source Contract & Registry and the Source Driver trait
//! every per-integration implementation satisfies.
//!
//! Per the REDESIGN FLAGS, dynamic dispatch over driver kinds becomes a
//! registry map from `short_name` to a constructor plus a static metadata
//! record, and async generators become a boxed stream with an explicit
//! error channel (`CoreResult<Entity>` items).

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tapestry_auth::{AuthMethod, OAuthTokenType};

pub type EntityStream = BoxStream<'static, CoreResult<Entity>>;

/// A single membership edge emitted by
/// [`SourceDriver::generate_access_control_memberships`]. Expansion into an
/// effective viewer set is the retrieval engine's concern, not the driver's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlMembership {
    pub member_id: String,
    pub member_type: String,
    pub group_id: String,
    pub group_name: String,
}

/// Per-source opaque progress marker. `data` is read and written exclusively
/// by the owning driver; the rest of the system treats it as an
/// uninterpreted JSON blob persisted between Sync Jobs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Cursor {
    pub data: serde_json::Value,
}

impl Cursor {
    pub fn empty() -> Self {
        Self {
            data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn update(&mut self, key: &str, value: serde_json::Value) {
        if let serde_json::Value::Object(map) = &mut self.data {
            map.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

/// Declarative per-source registry entry (§4.3). One instance per
/// integration, constructed once at registry build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub short_name: String,
    pub display_name: String,
    pub auth_methods: Vec<AuthMethod>,
    pub oauth_token_type: OAuthTokenType,
    pub requires_byoc: bool,
    pub supports_continuous: bool,
    pub federated_search: bool,
    /// Whether this source's entities carry a timestamp payload field the
    /// search pipeline's decay scoring can rank against.
    pub supports_temporal_relevance: bool,
    /// JSON Schema describing the source-specific config dict a Source
    /// Connection validates against.
    pub config_schema: serde_json::Value,
    pub labels: Vec<String>,
}

impl SourceMetadata {
    /// `OAuthBrowser` with both client id/secret present becomes
    /// `OAuthByoc`; plain `OAuthBrowser` is rejected if this source
    /// declares `requires_byoc`.
    pub fn infer_auth_method(
        &self,
        requested: AuthMethod,
        has_client_credentials: bool,
    ) -> CoreResult<AuthMethod> {
        match requested {
            AuthMethod::OauthBrowser if has_client_credentials => Ok(AuthMethod::OauthByoc),
            AuthMethod::OauthBrowser if self.requires_byoc => Err(CoreError::Validation(format!(
                "{} requires bring-your-own-credentials OAuth",
                self.short_name
            ))),
            other => Ok(other),
        }
    }
}

/// Credentials a driver is constructed with: a decrypted access token plus
/// whatever direct-auth fields the source needs (API key, domain, etc).
#[derive(Debug, Clone, Default)]
pub struct DriverCredentials {
    pub access_token: Option<String>,
    pub fields: HashMap<String, String>,
}

/// The capability set every Source Driver implements. `search` and the
/// cursor-interface methods are optional per source; defaults signal
/// unsupported rather than requiring every driver to implement them.
#[async_trait]
pub trait SourceDriver: Send + Sync {
    fn short_name(&self) -> &str;

    /// Low-cost authenticated ping confirming the credentials work.
    async fn validate(&self) -> CoreResult<bool>;

    /// Streams entities starting from the given cursor (`None` on a full
    /// sync). Implementations must not mutate an entity after yielding it.
    fn generate_entities(&self, cursor: Option<Cursor>) -> EntityStream;

    /// Only implemented by sources declaring `federated_search = true`.
    async fn search(&self, _query: &str, _limit: usize) -> CoreResult<Vec<Entity>> {
        Err(CoreError::Provider(format!(
            "{} does not support federated search",
            self.short_name()
        )))
    }

    fn get_default_cursor_field(&self) -> Option<&str> {
        None
    }

    fn validate_cursor_field(&self, _field: &str) -> bool {
        false
    }

    fn get_initial_cursor_value(&self) -> Cursor {
        Cursor::empty()
    }

    /// The cursor to persist once `generate_entities` has been fully
    /// drained. Stateless drivers (full scan every run) keep the default.
    fn current_cursor(&self) -> Cursor {
        Cursor::empty()
    }

    /// Only implemented by sources that expose access-control lists.
    fn generate_access_control_memberships(
        &self,
    ) -> BoxStream<'static, CoreResult<AccessControlMembership>> {
        Box::pin(futures::stream::empty())
    }
}

pub type DriverConstructor =
    Arc<dyn Fn(DriverCredentials, serde_json::Value) -> CoreResult<Box<dyn SourceDriver>> + Send + Sync>;

struct RegistryEntry {
    metadata: SourceMetadata,
    constructor: DriverConstructor,
}

/// Maps a Source Connection's `short_name` to its metadata and an instance
/// factory. Lookups are by `short_name`; a miss is a §7 NotFound error.
#[derive(Default)]
pub struct DriverRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: SourceMetadata, constructor: DriverConstructor) {
        self.entries.insert(
            metadata.short_name.clone(),
            RegistryEntry { metadata, constructor },
        );
    }

    pub fn metadata(&self, short_name: &str) -> CoreResult<&SourceMetadata> {
        self.entries
            .get(short_name)
            .map(|e| &e.metadata)
            .ok_or_else(|| CoreError::NotFound(format!("unknown source: {short_name}")))
    }

    pub fn create(
        &self,
        short_name: &str,
        credentials: DriverCredentials,
        config: serde_json::Value,
    ) -> CoreResult<Box<dyn SourceDriver>> {
        let entry = self
            .entries
            .get(short_name)
            .ok_or_else(|| CoreError::NotFound(format!("unknown source: {short_name}")))?;
        (entry.constructor)(credentials, config)
    }

    pub fn list(&self) -> Vec<&SourceMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata(short_name: &str, requires_byoc: bool) -> SourceMetadata {
        SourceMetadata {
            short_name: short_name.to_string(),
            display_name: short_name.to_string(),
            auth_methods: vec![AuthMethod::OauthBrowser],
            oauth_token_type: OAuthTokenType::WithRefresh,
            requires_byoc,
            supports_continuous: true,
            federated_search: false,
            supports_temporal_relevance: false,
            config_schema: serde_json::json!({}),
            labels: vec![],
        }
    }

    #[test]
    fn unknown_short_name_is_not_found() {
        let registry = DriverRegistry::new();
        let err = registry.metadata("nonexistent").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn oauth_browser_with_client_credentials_becomes_byoc() {
        let meta = sample_metadata("notion", false);
        let result = meta
            .infer_auth_method(AuthMethod::OauthBrowser, true)
            .unwrap();
        assert_eq!(result, AuthMethod::OauthByoc);
    }

    #[test]
    fn plain_oauth_browser_rejected_when_byoc_required() {
        let meta = sample_metadata("sharepoint", true);
        let err = meta
            .infer_auth_method(AuthMethod::OauthBrowser, false)
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn cursor_roundtrips_values() {
        let mut cursor = Cursor::empty();
        cursor.update("page_token", serde_json::json!("abc"));
        assert_eq!(cursor.get("page_token").unwrap(), "abc");
    }
}
