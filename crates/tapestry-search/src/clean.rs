//! Result cleaning: strips fields too large or sensitive to return to a
//! caller and reparses payload fields that were stored as JSON-string
//! columns back into objects. The always-stripped field list and the
//! relevance threshold below are recovered from the prior implementation's
//! result-cleaning and quality-gating behavior, not invented fresh.

use crate::response::{SearchResultItem, SearchStatus};
use serde_json::Value;

const ALWAYS_STRIPPED_FIELDS: &[&str] = &[
    "vector",
    "download_url",
    "local_path",
    "file_uuid",
    "checksum",
    "sync_id",
    "sync_job_id",
    "embeddable_text",
];

const JSON_STRING_FIELDS: &[&str] = &["metadata", "sync_metadata", "auth_fields", "config_fields"];

/// Minimum score for a hit to count as relevant enough to ground an answer.
pub const RELEVANCE_SCORE_THRESHOLD: f32 = 0.25;

pub const NO_RESULTS_MESSAGE: &str =
    "I couldn't find any relevant information for that query. Try asking about something in your data collection.";
pub const NO_RELEVANT_RESULTS_MESSAGE: &str =
    "Your query didn't match anything meaningful in the collection. Try a different question related to your data.";

/// Strips the always-sensitive fields and reparses JSON-string payload
/// fields back into objects, in place.
pub fn clean_results(items: &mut [SearchResultItem]) {
    for item in items.iter_mut() {
        for field in ALWAYS_STRIPPED_FIELDS {
            remove_nested(&mut item.payload, field);
        }
        for field in JSON_STRING_FIELDS {
            if let Some(Value::String(raw)) = item.payload.get(*field).cloned() {
                if let Ok(parsed) = serde_json::from_str::<Value>(&raw) {
                    item.payload.insert((*field).to_string(), parsed);
                }
            }
        }
    }
}

/// Entities serialize with most fields nested under `base.metadata`; strip
/// both the top-level and that nested location so cleaning holds regardless
/// of which entity variant produced the payload.
fn remove_nested(payload: &mut serde_json::Map<String, Value>, field: &str) {
    payload.remove(field);
    if let Some(Value::Object(base)) = payload.get_mut("base") {
        if let Some(Value::Object(metadata)) = base.get_mut("metadata") {
            metadata.remove(field);
        }
    }
}

/// Degrades to a canned completion when there's nothing, or nothing
/// relevant, to ground an answer in. Returns `None` when the results are
/// good enough to proceed to normal answer generation.
pub fn quality_gate(items: &[SearchResultItem]) -> Option<(SearchStatus, &'static str)> {
    if items.is_empty() {
        return Some((SearchStatus::NoResults, NO_RESULTS_MESSAGE));
    }
    let has_relevant = items.iter().any(|item| item.score > RELEVANCE_SCORE_THRESHOLD);
    if !has_relevant {
        return Some((SearchStatus::NoRelevantResults, NO_RELEVANT_RESULTS_MESSAGE));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::SearchResultSource;
    use uuid::Uuid;

    fn item(score: f32, payload: serde_json::Map<String, Value>) -> SearchResultItem {
        SearchResultItem {
            point_id: Uuid::new_v4(),
            score,
            source: SearchResultSource::Vector,
            source_name: None,
            payload,
        }
    }

    #[test]
    fn strips_sensitive_fields_and_parses_json_strings() {
        let mut payload = serde_json::Map::new();
        payload.insert("vector".to_string(), Value::Array(vec![]));
        payload.insert("sync_id".to_string(), Value::String("x".to_string()));
        payload.insert("metadata".to_string(), Value::String(r#"{"a":1}"#.to_string()));
        let mut items = vec![item(0.9, payload)];

        clean_results(&mut items);

        assert!(!items[0].payload.contains_key("vector"));
        assert!(!items[0].payload.contains_key("sync_id"));
        assert_eq!(items[0].payload["metadata"], serde_json::json!({"a": 1}));
    }

    #[test]
    fn strips_nested_base_metadata_fields_too() {
        let mut payload = serde_json::Map::new();
        let mut metadata = serde_json::Map::new();
        metadata.insert("sync_id".to_string(), Value::String("x".to_string()));
        let mut base = serde_json::Map::new();
        base.insert("metadata".to_string(), Value::Object(metadata));
        payload.insert("base".to_string(), Value::Object(base));
        let mut items = vec![item(0.9, payload)];

        clean_results(&mut items);

        let base = items[0].payload["base"].as_object().unwrap();
        let metadata = base["metadata"].as_object().unwrap();
        assert!(!metadata.contains_key("sync_id"));
    }

    #[test]
    fn empty_results_trigger_no_results_status() {
        let (status, _) = quality_gate(&[]).unwrap();
        assert_eq!(status, SearchStatus::NoResults);
    }

    #[test]
    fn all_low_scores_trigger_no_relevant_results_status() {
        let items = vec![item(0.1, serde_json::Map::new()), item(0.2, serde_json::Map::new())];
        let (status, _) = quality_gate(&items).unwrap();
        assert_eq!(status, SearchStatus::NoRelevantResults);
    }

    #[test]
    fn one_relevant_hit_clears_the_gate() {
        let items = vec![item(0.1, serde_json::Map::new()), item(0.9, serde_json::Map::new())];
        assert!(quality_gate(&items).is_none());
    }
}
