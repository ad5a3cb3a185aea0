//! Wires the built-in drivers into a `DriverRegistry` (§4.3). Each entry's
//! constructor takes the credentials and config the sync runner resolved
//! and returns a boxed driver; metadata is what a client lists/validates
//! against before a Source Connection is created.

use crate::drivers::{confluence, github, linear, notion, slack};
use std::sync::Arc;
use tapestry_auth::{AuthMethod, OAuthTokenType};
use tapestry_core::driver::{DriverRegistry, SourceMetadata};

pub fn register_builtin_drivers(registry: &mut DriverRegistry) {
    registry.register(
        SourceMetadata {
            short_name: "notion".to_string(),
            display_name: "Notion".to_string(),
            auth_methods: vec![AuthMethod::OauthBrowser, AuthMethod::OauthToken],
            oauth_token_type: OAuthTokenType::WithRefresh,
            requires_byoc: false,
            supports_continuous: true,
            federated_search: false,
            supports_temporal_relevance: true,
            config_schema: serde_json::json!({}),
            labels: vec!["Knowledge Base".to_string()],
        },
        Arc::new(|credentials, _config| {
            let token = credentials.access_token.ok_or_else(|| {
                tapestry_core::error::CoreError::Validation("notion requires an access token".to_string())
            })?;
            Ok(Box::new(notion::NotionDriver::new(token)) as Box<dyn tapestry_core::driver::SourceDriver>)
        }),
    );

    registry.register(
        SourceMetadata {
            short_name: "slack".to_string(),
            display_name: "Slack".to_string(),
            auth_methods: vec![AuthMethod::OauthBrowser],
            oauth_token_type: OAuthTokenType::AccessOnly,
            requires_byoc: false,
            supports_continuous: true,
            federated_search: false,
            supports_temporal_relevance: true,
            config_schema: serde_json::json!({}),
            labels: vec!["Messaging".to_string()],
        },
        Arc::new(|credentials, _config| {
            let token = credentials.access_token.ok_or_else(|| {
                tapestry_core::error::CoreError::Validation("slack requires an access token".to_string())
            })?;
            Ok(Box::new(slack::SlackDriver::new(token)) as Box<dyn tapestry_core::driver::SourceDriver>)
        }),
    );

    registry.register(
        SourceMetadata {
            short_name: "github".to_string(),
            display_name: "GitHub".to_string(),
            auth_methods: vec![AuthMethod::OauthBrowser, AuthMethod::OauthToken],
            oauth_token_type: OAuthTokenType::None,
            requires_byoc: false,
            supports_continuous: true,
            federated_search: false,
            supports_temporal_relevance: true,
            config_schema: serde_json::json!({}),
            labels: vec!["Code".to_string()],
        },
        Arc::new(|credentials, _config| {
            let token = credentials.access_token.ok_or_else(|| {
                tapestry_core::error::CoreError::Validation("github requires an access token".to_string())
            })?;
            Ok(Box::new(github::GithubDriver::new(token)) as Box<dyn tapestry_core::driver::SourceDriver>)
        }),
    );

    registry.register(
        SourceMetadata {
            short_name: "linear".to_string(),
            display_name: "Linear".to_string(),
            auth_methods: vec![AuthMethod::OauthBrowser, AuthMethod::OauthToken],
            oauth_token_type: OAuthTokenType::WithRefresh,
            requires_byoc: false,
            supports_continuous: true,
            federated_search: false,
            supports_temporal_relevance: true,
            config_schema: serde_json::json!({}),
            labels: vec!["Project Management".to_string()],
        },
        Arc::new(|credentials, _config| {
            let token = credentials.access_token.ok_or_else(|| {
                tapestry_core::error::CoreError::Validation("linear requires an access token".to_string())
            })?;
            Ok(Box::new(linear::LinearDriver::new(token)) as Box<dyn tapestry_core::driver::SourceDriver>)
        }),
    );

    registry.register(
        SourceMetadata {
            short_name: "confluence".to_string(),
            display_name: "Confluence".to_string(),
            auth_methods: vec![
                AuthMethod::OauthBrowser,
                AuthMethod::OauthToken,
                AuthMethod::AuthProvider,
            ],
            oauth_token_type: OAuthTokenType::WithRefresh,
            requires_byoc: false,
            supports_continuous: false,
            federated_search: false,
            supports_temporal_relevance: true,
            config_schema: serde_json::json!({}),
            labels: vec!["Knowledge Base".to_string(), "Documentation".to_string()],
        },
        Arc::new(|credentials, _config| {
            let token = credentials.access_token.ok_or_else(|| {
                tapestry_core::error::CoreError::Validation("confluence requires an access token".to_string())
            })?;
            Ok(Box::new(confluence::ConfluenceDriver::new(token)) as Box<dyn tapestry_core::driver::SourceDriver>)
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_builtin_short_names() {
        let mut registry = DriverRegistry::new();
        register_builtin_drivers(&mut registry);
        let names: Vec<String> = registry
            .list()
            .into_iter()
            .map(|m| m.short_name.clone())
            .collect();
        for expected in ["notion", "slack", "github", "linear", "confluence"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
