//! Slack driver: messages from channels and DMs the bot/user token can see.
//! Grounded on the teacher's Slack provider for channel listing, history
//! pagination, and the user-directory cache used to resolve author names;
//! generalized into an entity stream with per-channel breadcrumbs.

use crate::retry::call_with_backoff;
use async_stream::try_stream;
use serde::Deserialize;
use std::collections::HashMap;
use tapestry_core::driver::{Cursor, EntityStream, SourceDriver};
use tapestry_core::entity::{AccessControl, BaseFields, Breadcrumb, Entity, EntityMetadata};
use tapestry_core::error::CoreError;

pub struct SlackDriver {
    access_token: String,
    http_client: reqwest::Client,
}

impl SlackDriver {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            http_client: reqwest::Client::new(),
        }
    }

    async fn fetch_channels(&self) -> anyhow::Result<Vec<SlackChannel>> {
        let response = call_with_backoff("slack", || {
            self.http_client
                .get("https://slack.com/api/conversations.list")
                .bearer_auth(&self.access_token)
                .query(&[("types", "public_channel,private_channel,im,mpim"), ("limit", "200")])
        })
        .await?;
        let parsed: SlackListResponse = response.json().await?;
        if !parsed.ok {
            anyhow::bail!("slack conversations.list failed: {:?}", parsed.error);
        }
        Ok(parsed.channels)
    }

    async fn build_user_cache(&self) -> anyhow::Result<HashMap<String, String>> {
        let response = call_with_backoff("slack", || {
            self.http_client
                .get("https://slack.com/api/users.list")
                .bearer_auth(&self.access_token)
        })
        .await?;
        let parsed: SlackUsersResponse = response.json().await?;
        Ok(parsed
            .members
            .into_iter()
            .map(|m| (m.id, m.real_name.or(m.name).unwrap_or_default()))
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceDriver for SlackDriver {
    fn short_name(&self) -> &str {
        "slack"
    }

    async fn validate(&self) -> Result<bool, CoreError> {
        let response = self
            .http_client
            .post("https://slack.com/api/auth.test")
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        let parsed: SlackAuthTest = response
            .json()
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        Ok(parsed.ok)
    }

    fn generate_entities(&self, cursor: Option<Cursor>) -> EntityStream {
        let access_token = self.access_token.clone();
        let http_client = self.http_client.clone();
        let driver = SlackDriver {
            access_token: access_token.clone(),
            http_client: http_client.clone(),
        };
        let oldest = cursor
            .as_ref()
            .and_then(|c| c.get("oldest_ts"))
            .and_then(|v| v.as_str())
            .unwrap_or("0")
            .to_string();

        let stream = try_stream! {
            let channels = driver
                .fetch_channels()
                .await
                .map_err(|e| CoreError::Provider(e.to_string()))?;
            let users = driver
                .build_user_cache()
                .await
                .unwrap_or_default();

            for channel in &channels {
                let breadcrumb = Breadcrumb {
                    entity_id: channel.id.clone(),
                    name: channel.name.clone().unwrap_or_else(|| channel.id.clone()),
                    entity_type: "channel".to_string(),
                };

                let mut cursor_token: Option<String> = None;
                loop {
                    let response = call_with_backoff("slack", || {
                        let mut req = http_client
                            .get("https://slack.com/api/conversations.history")
                            .bearer_auth(&access_token)
                            .query(&[("channel", channel.id.as_str()), ("oldest", oldest.as_str()), ("limit", "200")]);
                        if let Some(ref token) = cursor_token {
                            req = req.query(&[("cursor", token.as_str())]);
                        }
                        req
                    })
                    .await
                    .map_err(|e| CoreError::Provider(e.to_string()))?;

                    let history: SlackHistoryResponse = response
                        .json()
                        .await
                        .map_err(|e| CoreError::Provider(e.to_string()))?;

                    if !history.ok {
                        break;
                    }

                    for message in &history.messages {
                        let author = users
                            .get(message.user.as_deref().unwrap_or(""))
                            .cloned()
                            .unwrap_or_else(|| "unknown".to_string());
                        let ts = message.ts.clone().unwrap_or_default();
                        let text = message.text.clone().unwrap_or_default();

                        yield Entity::Base(BaseFields {
                            entity_id: format!("{}-{}", channel.id, ts),
                            breadcrumbs: vec![breadcrumb.clone()],
                            name: format!("Message in #{}", channel.name.clone().unwrap_or_default()),
                            created_at: parse_slack_ts(&ts),
                            updated_at: parse_slack_ts(&ts),
                            textual_representation: format!("{author}: {text}"),
                            metadata: EntityMetadata {
                                source_name: Some("slack".to_string()),
                                entity_type: Some("message".to_string()),
                                original_entity_id: Some(format!("{}-{}", channel.id, ts)),
                                ..Default::default()
                            },
                            access: AccessControl::default(),
                        });
                    }

                    if !history.has_more {
                        break;
                    }
                    cursor_token = history.response_metadata.and_then(|m| m.next_cursor);
                    if cursor_token.as_deref().unwrap_or("").is_empty() {
                        break;
                    }
                }
            }
        };

        Box::pin(stream)
    }

    fn get_default_cursor_field(&self) -> Option<&str> {
        Some("oldest_ts")
    }

    fn validate_cursor_field(&self, field: &str) -> bool {
        field == "oldest_ts"
    }
}

fn parse_slack_ts(ts: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let seconds: f64 = ts.parse().ok()?;
    chrono::DateTime::from_timestamp(seconds as i64, 0)
}

#[derive(Debug, Deserialize)]
struct SlackAuthTest {
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct SlackListResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default, rename = "channels")]
    channels: Vec<SlackChannel>,
}

#[derive(Debug, Deserialize, Clone)]
struct SlackChannel {
    id: String,
    name: Option<String>,
    #[serde(default)]
    is_im: Option<bool>,
    #[serde(default)]
    is_mpim: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SlackUsersResponse {
    #[serde(default)]
    members: Vec<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    name: Option<String>,
    real_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackHistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    has_more: bool,
    response_metadata: Option<SlackResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct SlackResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackMessage {
    user: Option<String>,
    text: Option<String>,
    ts: Option<String>,
}
