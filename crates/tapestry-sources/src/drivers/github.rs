//! GitHub driver: issues and pull requests across a token's accessible
//! repositories, incremental via `updated` timestamp filtering. Grounded on
//! the teacher's GitHub provider for the repo-then-issues fetch shape.

use crate::retry::call_with_backoff;
use async_stream::try_stream;
use serde::Deserialize;
use tapestry_core::driver::{Cursor, EntityStream, SourceDriver};
use tapestry_core::entity::{AccessControl, BaseFields, Breadcrumb, Entity, EntityMetadata};
use tapestry_core::error::CoreError;

pub struct GithubDriver {
    access_token: String,
    http_client: reqwest::Client,
}

impl GithubDriver {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            http_client: reqwest::Client::new(),
        }
    }

    async fn fetch_repos(&self) -> anyhow::Result<Vec<GithubRepo>> {
        let response = call_with_backoff("github", || {
            self.http_client
                .get("https://api.github.com/user/repos")
                .bearer_auth(&self.access_token)
                .header("User-Agent", "tapestry")
                .query(&[("per_page", "100"), ("sort", "updated")])
        })
        .await?;
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl SourceDriver for GithubDriver {
    fn short_name(&self) -> &str {
        "github"
    }

    async fn validate(&self) -> Result<bool, CoreError> {
        let response = self
            .http_client
            .get("https://api.github.com/user")
            .bearer_auth(&self.access_token)
            .header("User-Agent", "tapestry")
            .send()
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        Ok(response.status().is_success())
    }

    fn generate_entities(&self, cursor: Option<Cursor>) -> EntityStream {
        let access_token = self.access_token.clone();
        let http_client = self.http_client.clone();
        let driver = GithubDriver {
            access_token: access_token.clone(),
            http_client: http_client.clone(),
        };
        let since = cursor
            .as_ref()
            .and_then(|c| c.get("updated_since"))
            .and_then(|v| v.as_str())
            .unwrap_or("1970-01-01T00:00:00Z")
            .to_string();

        let stream = try_stream! {
            let repos = driver
                .fetch_repos()
                .await
                .map_err(|e| CoreError::Provider(e.to_string()))?;

            for repo in &repos {
                let breadcrumb = Breadcrumb {
                    entity_id: repo.full_name.clone(),
                    name: repo.full_name.clone(),
                    entity_type: "repository".to_string(),
                };

                let mut page = 1u32;
                loop {
                    let response = call_with_backoff("github", || {
                        http_client
                            .get(format!("https://api.github.com/repos/{}/issues", repo.full_name))
                            .bearer_auth(&access_token)
                            .header("User-Agent", "tapestry")
                            .query(&[
                                ("state", "all"),
                                ("since", since.as_str()),
                                ("per_page", "100"),
                                ("page", &page.to_string()),
                            ])
                    })
                    .await
                    .map_err(|e| CoreError::Provider(e.to_string()))?;

                    let issues: Vec<GithubIssue> = response
                        .json()
                        .await
                        .map_err(|e| CoreError::Provider(e.to_string()))?;
                    if issues.is_empty() {
                        break;
                    }

                    for issue in &issues {
                        let kind = if issue.pull_request.is_some() { "pull_request" } else { "issue" };
                        yield Entity::Base(BaseFields {
                            entity_id: format!("{}#{}", repo.full_name, issue.number),
                            breadcrumbs: vec![breadcrumb.clone()],
                            name: issue.title.clone(),
                            created_at: parse_ts(issue.created_at.as_deref()),
                            updated_at: parse_ts(issue.updated_at.as_deref()),
                            textual_representation: format!(
                                "{}\n\n{}",
                                issue.title,
                                issue.body.clone().unwrap_or_default()
                            ),
                            metadata: EntityMetadata {
                                source_name: Some("github".to_string()),
                                entity_type: Some(kind.to_string()),
                                original_entity_id: Some(format!("{}#{}", repo.full_name, issue.number)),
                                ..Default::default()
                            },
                            access: AccessControl {
                                viewers: vec![],
                                is_public: !repo.private,
                            },
                        });
                    }

                    if issues.len() < 100 {
                        break;
                    }
                    page += 1;
                }
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

fn parse_ts(value: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    value.and_then(|v| {
        chrono::DateTime::parse_from_rfc3339(v)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc))
    })
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    full_name: String,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: u64,
    title: String,
    body: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    pull_request: Option<serde_json::Value>,
}
