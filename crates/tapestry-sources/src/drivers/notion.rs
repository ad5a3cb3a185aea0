//! Notion driver: pages discovered via the search endpoint, content
//! flattened from the block tree. Grounded on the teacher's Notion provider
//! for the search/pagination/backoff shape, generalized from a
//! document-indexing sync loop into an entity-yielding stream.

use crate::retry::call_with_backoff;
use async_stream::try_stream;
use serde::Deserialize;
use tapestry_core::driver::{Cursor, EntityStream, SourceDriver};
use tapestry_core::entity::{AccessControl, BaseFields, Entity, EntityMetadata};
use tapestry_core::error::CoreError;

const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionDriver {
    access_token: String,
    http_client: reqwest::Client,
}

impl NotionDriver {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            http_client: reqwest::Client::new(),
        }
    }

    async fn fetch_page_content(&self, page_id: &str) -> anyhow::Result<String> {
        let response = call_with_backoff("notion", || {
            self.http_client
                .get(format!("https://api.notion.com/v1/blocks/{page_id}/children"))
                .bearer_auth(&self.access_token)
                .header("Notion-Version", NOTION_VERSION)
        })
        .await?;
        let blocks: NotionBlockChildren = response.json().await?;
        Ok(blocks
            .results
            .iter()
            .filter_map(NotionBlock::plain_text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn extract_title(page: &NotionPage) -> String {
        page.properties
            .values()
            .find_map(|p| p.title.as_ref())
            .map(|rich_text| {
                rich_text
                    .iter()
                    .map(|t| t.plain_text.clone())
                    .collect::<String>()
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    }
}

#[async_trait::async_trait]
impl SourceDriver for NotionDriver {
    fn short_name(&self) -> &str {
        "notion"
    }

    async fn validate(&self) -> Result<bool, CoreError> {
        let response = self
            .http_client
            .get("https://api.notion.com/v1/users/me")
            .bearer_auth(&self.access_token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        Ok(response.status().is_success())
    }

    fn generate_entities(&self, cursor: Option<Cursor>) -> EntityStream {
        let access_token = self.access_token.clone();
        let http_client = self.http_client.clone();
        let driver = NotionDriver {
            access_token: access_token.clone(),
            http_client: http_client.clone(),
        };
        let since = cursor
            .as_ref()
            .and_then(|c| c.get("last_edited_time"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let stream = try_stream! {
            let mut start_cursor: Option<String> = None;
            loop {
                let search_body = serde_json::json!({
                    "filter": { "property": "object", "value": "page" },
                    "sort": { "direction": "descending", "timestamp": "last_edited_time" },
                    "start_cursor": start_cursor,
                    "page_size": 100,
                });

                let response = call_with_backoff("notion", || {
                    http_client
                        .post("https://api.notion.com/v1/search")
                        .bearer_auth(&access_token)
                        .header("Notion-Version", NOTION_VERSION)
                        .json(&search_body)
                })
                .await
                .map_err(|e| CoreError::Provider(e.to_string()))?;

                let page: NotionSearchResponse = response
                    .json()
                    .await
                    .map_err(|e| CoreError::Provider(e.to_string()))?;

                let mut reached_since = false;
                for notion_page in &page.results {
                    let last_edited = notion_page.last_edited_time.clone().unwrap_or_default();
                    if !since.is_empty() && last_edited < since {
                        reached_since = true;
                        break;
                    }

                    let content = driver
                        .fetch_page_content(&notion_page.id)
                        .await
                        .unwrap_or_default();
                    let title = NotionDriver::extract_title(notion_page);

                    yield Entity::Base(BaseFields {
                        entity_id: notion_page.id.clone(),
                        breadcrumbs: vec![],
                        name: title.clone(),
                        created_at: notion_page.created_time.as_deref().and_then(parse_ts),
                        updated_at: notion_page.last_edited_time.as_deref().and_then(parse_ts),
                        textual_representation: format!("{title}\n\n{content}"),
                        metadata: EntityMetadata {
                            source_name: Some("notion".to_string()),
                            entity_type: Some("page".to_string()),
                            original_entity_id: Some(notion_page.id.clone()),
                            ..Default::default()
                        },
                        access: AccessControl::default(),
                    });
                }

                if reached_since || !page.has_more || page.next_cursor.is_none() {
                    break;
                }
                start_cursor = page.next_cursor;
            }
        };

        Box::pin(stream)
    }

    fn get_default_cursor_field(&self) -> Option<&str> {
        Some("last_edited_time")
    }

    fn validate_cursor_field(&self, field: &str) -> bool {
        field == "last_edited_time"
    }
}

fn parse_ts(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[derive(Debug, Deserialize)]
struct NotionSearchResponse {
    results: Vec<NotionPage>,
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionPage {
    id: String,
    url: Option<String>,
    created_time: Option<String>,
    last_edited_time: Option<String>,
    #[serde(default)]
    properties: std::collections::HashMap<String, NotionProperty>,
}

#[derive(Debug, Deserialize)]
struct NotionProperty {
    title: Option<Vec<NotionRichText>>,
}

#[derive(Debug, Deserialize, Clone)]
struct NotionRichText {
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct NotionBlockChildren {
    results: Vec<NotionBlock>,
}

#[derive(Debug, Deserialize)]
struct NotionBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(flatten)]
    rest: std::collections::HashMap<String, serde_json::Value>,
}

impl NotionBlock {
    fn plain_text(&self) -> Option<String> {
        let body = self.rest.get(&self.block_type)?;
        let rich_text = body.get("rich_text")?.as_array()?;
        Some(
            rich_text
                .iter()
                .filter_map(|t| t.get("plain_text").and_then(|v| v.as_str()))
                .collect::<Vec<_>>()
                .join(""),
        )
    }
}
