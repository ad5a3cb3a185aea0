//! The result shape the pipeline returns: cleaned payloads tagged by which
//! half of the operation graph produced them, plus the status a degraded
//! (no/low quality) answer falls back to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Success,
    NoResults,
    NoRelevantResults,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchResultSource {
    Vector,
    Federated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub point_id: Uuid,
    pub score: f32,
    pub source: SearchResultSource,
    pub source_name: Option<String>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub answer: Option<String>,
    pub status: SearchStatus,
}
