//! The inbound search request shape and the validation/defaulting its
//! fields undergo before a pipeline is built around them.

use serde::{Deserialize, Serialize};
use tapestry_core::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Neural,
    Keyword,
    Hybrid,
}

impl From<RetrievalStrategy> for tapestry_vector::SearchMethod {
    fn from(value: RetrievalStrategy) -> Self {
        match value {
            RetrievalStrategy::Neural => tapestry_vector::SearchMethod::Neural,
            RetrievalStrategy::Keyword => tapestry_vector::SearchMethod::Keyword,
            RetrievalStrategy::Hybrid => tapestry_vector::SearchMethod::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub retrieval_strategy: Option<RetrievalStrategy>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub filter: Option<serde_json::Value>,
    pub expand_query: Option<bool>,
    pub interpret_filters: Option<bool>,
    pub rerank: Option<bool>,
    pub generate_answer: Option<bool>,
    pub temporal_relevance: Option<f64>,
}

/// System defaults a request's absent fields fall back to.
#[derive(Debug, Clone, Copy)]
pub struct SearchDefaults {
    pub retrieval_strategy: RetrievalStrategy,
    pub offset: i64,
    pub limit: i64,
    pub expand_query: bool,
    pub interpret_filters: bool,
    pub rerank: bool,
    pub generate_answer: bool,
    pub temporal_relevance: f64,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            retrieval_strategy: RetrievalStrategy::Hybrid,
            offset: 0,
            limit: 10,
            expand_query: false,
            interpret_filters: false,
            rerank: false,
            generate_answer: false,
            temporal_relevance: 0.0,
        }
    }
}

/// The request with every default applied and every bound checked.
#[derive(Debug, Clone)]
pub struct ResolvedSearchParams {
    pub query: String,
    pub retrieval_strategy: RetrievalStrategy,
    pub offset: i64,
    pub limit: i64,
    pub filter: Option<serde_json::Value>,
    pub expand_query: bool,
    pub interpret_filters: bool,
    pub rerank: bool,
    pub generate_answer: bool,
    pub temporal_relevance: f64,
}

impl SearchRequest {
    /// Validates the query first (before defaults are even looked at), then
    /// applies defaults and validates the remaining bounds. Every rejection
    /// here is a [`CoreError::Validation`], mapping to a 422 at the HTTP
    /// boundary.
    pub fn resolve(&self, defaults: &SearchDefaults) -> CoreResult<ResolvedSearchParams> {
        if self.query.trim().is_empty() {
            return Err(CoreError::Validation("query must not be empty".to_string()));
        }

        let offset = self.offset.unwrap_or(defaults.offset);
        if offset < 0 {
            return Err(CoreError::Validation("offset must be >= 0".to_string()));
        }
        let limit = self.limit.unwrap_or(defaults.limit);
        if limit < 1 {
            return Err(CoreError::Validation("limit must be >= 1".to_string()));
        }
        let temporal_relevance = self.temporal_relevance.unwrap_or(defaults.temporal_relevance);
        if !(0.0..=1.0).contains(&temporal_relevance) {
            return Err(CoreError::Validation(
                "temporal_relevance must be between 0 and 1".to_string(),
            ));
        }

        Ok(ResolvedSearchParams {
            query: self.query.clone(),
            retrieval_strategy: self.retrieval_strategy.unwrap_or(defaults.retrieval_strategy),
            offset,
            limit,
            filter: self.filter.clone(),
            expand_query: self.expand_query.unwrap_or(defaults.expand_query),
            interpret_filters: self.interpret_filters.unwrap_or(defaults.interpret_filters),
            rerank: self.rerank.unwrap_or(defaults.rerank),
            generate_answer: self.generate_answer.unwrap_or(defaults.generate_answer),
            temporal_relevance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> SearchRequest {
        SearchRequest {
            query: "docs about onboarding".to_string(),
            retrieval_strategy: None,
            offset: None,
            limit: None,
            filter: None,
            expand_query: None,
            interpret_filters: None,
            rerank: None,
            generate_answer: None,
            temporal_relevance: None,
        }
    }

    #[test]
    fn empty_query_is_rejected() {
        let request = SearchRequest { query: "   ".to_string(), ..blank() };
        let err = request.resolve(&SearchDefaults::default()).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn negative_offset_is_rejected() {
        let request = SearchRequest { offset: Some(-1), ..blank() };
        assert!(request.resolve(&SearchDefaults::default()).is_err());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let request = SearchRequest { limit: Some(0), ..blank() };
        assert!(request.resolve(&SearchDefaults::default()).is_err());
    }

    #[test]
    fn out_of_range_temporal_relevance_is_rejected() {
        let request = SearchRequest { temporal_relevance: Some(1.5), ..blank() };
        assert!(request.resolve(&SearchDefaults::default()).is_err());
    }

    #[test]
    fn missing_fields_inherit_defaults() {
        let resolved = blank().resolve(&SearchDefaults::default()).unwrap();
        assert_eq!(resolved.limit, 10);
        assert_eq!(resolved.offset, 0);
        assert_eq!(resolved.retrieval_strategy, RetrievalStrategy::Hybrid);
    }
}
