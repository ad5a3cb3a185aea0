//! Linear driver: issues via the GraphQL API, incremental on `updatedAt`.
//! Grounded on the teacher's Linear provider's GraphQL query shape.

use crate::retry::call_with_backoff;
use async_stream::try_stream;
use serde::Deserialize;
use tapestry_core::driver::{Cursor, EntityStream, SourceDriver};
use tapestry_core::entity::{AccessControl, BaseFields, Entity, EntityMetadata};
use tapestry_core::error::CoreError;

const ISSUES_QUERY: &str = r#"
    query Issues($since: DateTimeOrDuration!, $after: String, $first: Int!) {
        issues(filter: { updatedAt: { gte: $since } }, after: $after, first: $first, orderBy: updatedAt) {
            nodes {
                id
                identifier
                title
                description
                createdAt
                updatedAt
                url
            }
            pageInfo { hasNextPage endCursor }
        }
    }
"#;

pub struct LinearDriver {
    access_token: String,
    http_client: reqwest::Client,
}

impl LinearDriver {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl SourceDriver for LinearDriver {
    fn short_name(&self) -> &str {
        "linear"
    }

    async fn validate(&self) -> Result<bool, CoreError> {
        let response = self
            .http_client
            .post("https://api.linear.app/graphql")
            .header("Authorization", &self.access_token)
            .json(&serde_json::json!({ "query": "query { viewer { id } }" }))
            .send()
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        Ok(response.status().is_success())
    }

    fn generate_entities(&self, cursor: Option<Cursor>) -> EntityStream {
        let access_token = self.access_token.clone();
        let http_client = self.http_client.clone();
        let since = cursor
            .as_ref()
            .and_then(|c| c.get("updated_since"))
            .and_then(|v| v.as_str())
            .unwrap_or("1970-01-01T00:00:00Z")
            .to_string();

        let stream = try_stream! {
            let mut after: Option<String> = None;
            loop {
                let response = call_with_backoff("linear", || {
                    http_client
                        .post("https://api.linear.app/graphql")
                        .header("Authorization", &access_token)
                        .json(&serde_json::json!({
                            "query": ISSUES_QUERY,
                            "variables": { "since": since, "after": after, "first": 100 },
                        }))
                })
                .await
                .map_err(|e| CoreError::Provider(e.to_string()))?;

                let parsed: LinearResponse = response
                    .json()
                    .await
                    .map_err(|e| CoreError::Provider(e.to_string()))?;

                for issue in &parsed.data.issues.nodes {
                    yield Entity::Base(BaseFields {
                        entity_id: issue.id.clone(),
                        breadcrumbs: vec![],
                        name: format!("{} {}", issue.identifier, issue.title),
                        created_at: parse_ts(&issue.created_at),
                        updated_at: parse_ts(&issue.updated_at),
                        textual_representation: format!(
                            "{}\n\n{}",
                            issue.title,
                            issue.description.clone().unwrap_or_default()
                        ),
                        metadata: EntityMetadata {
                            source_name: Some("linear".to_string()),
                            entity_type: Some("issue".to_string()),
                            original_entity_id: Some(issue.id.clone()),
                            ..Default::default()
                        },
                        access: AccessControl::default(),
                    });
                }

                if !parsed.data.issues.page_info.has_next_page {
                    break;
                }
                after = parsed.data.issues.page_info.end_cursor;
            }
        };

        Box::pin(stream)
    }

    fn get_default_cursor_field(&self) -> Option<&str> {
        Some("updated_since")
    }

    fn validate_cursor_field(&self, field: &str) -> bool {
        field == "updated_since"
    }
}

fn parse_ts(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[derive(Debug, Deserialize)]
struct LinearResponse {
    data: LinearData,
}

#[derive(Debug, Deserialize)]
struct LinearData {
    issues: LinearIssues,
}

#[derive(Debug, Deserialize)]
struct LinearIssues {
    nodes: Vec<LinearIssue>,
    #[serde(rename = "pageInfo")]
    page_info: LinearPageInfo,
}

#[derive(Debug, Deserialize)]
struct LinearPageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinearIssue {
    id: String,
    identifier: String,
    title: String,
    description: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: String,
    #[serde(rename = "updatedAt")]
    updated_at: String,
}
