//! The search pipeline (§4.10): classifies a Collection's sources into
//! federated vs vector-backed, builds the subset of operations the request
//! and that classification make meaningful, executes them (fanning out
//! retrieval and federated search concurrently), merges and cleans the
//! results, and optionally grounds an answer in them.
//!
//! Operations whose provider the caller explicitly asked for but that
//! isn't configured fail the whole request with a message naming the
//! missing capability. Operations that are simply inapplicable to this
//! Collection's sources (e.g. filter interpretation against an
//! all-federated collection) are skipped with an event instead.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tapestry_auth::cipher::SecretCipher;
use tapestry_core::driver::{DriverCredentials, DriverRegistry};
use tapestry_core::entity::Entity;
use tapestry_core::error::{CoreError, CoreResult};
use tapestry_core::events::EventEmitter;
use tapestry_core::model::{Collection, SourceConnection};
use tapestry_store::Store;
use tapestry_vector::providers::{
    resolve_dense_provider, AnswerProvider, DenseEmbeddingProvider, PreferenceList, RerankProvider,
    SparseEmbeddingProvider,
};
use tapestry_vector::{DecayConfig, DecayKind, PayloadFilter, SparseEmbedding, VectorStore};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::clean::{clean_results, quality_gate};
use crate::request::{ResolvedSearchParams, SearchDefaults, SearchRequest};
use crate::response::{SearchResponse, SearchResultItem, SearchResultSource, SearchStatus};

const MAX_QUERY_VARIANTS: usize = 3;
const RECENCY_SCALE_SECONDS: f64 = 365.0 * 24.0 * 3600.0;

fn store_err(e: anyhow::Error) -> CoreError {
    CoreError::Provider(e.to_string())
}

fn vector_err(e: anyhow::Error) -> CoreError {
    CoreError::Provider(e.to_string())
}

pub struct SearchPipeline {
    store: Store,
    vector: Arc<VectorStore>,
    registry: Arc<DriverRegistry>,
    cipher: Arc<dyn SecretCipher>,
    dense_providers: Vec<Box<dyn DenseEmbeddingProvider>>,
    sparse_provider: Option<Arc<dyn SparseEmbeddingProvider>>,
    expansion_providers: Option<PreferenceList<dyn AnswerProvider>>,
    interpretation_providers: Option<PreferenceList<dyn AnswerProvider>>,
    federated_keyword_providers: Option<PreferenceList<dyn AnswerProvider>>,
    rerank_providers: Option<PreferenceList<dyn RerankProvider>>,
    answer_providers: Option<PreferenceList<dyn AnswerProvider>>,
    events: Arc<EventEmitter>,
    defaults: SearchDefaults,
}

impl SearchPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        vector: Arc<VectorStore>,
        registry: Arc<DriverRegistry>,
        cipher: Arc<dyn SecretCipher>,
        dense_providers: Vec<Box<dyn DenseEmbeddingProvider>>,
        sparse_provider: Option<Arc<dyn SparseEmbeddingProvider>>,
        expansion_providers: Option<PreferenceList<dyn AnswerProvider>>,
        interpretation_providers: Option<PreferenceList<dyn AnswerProvider>>,
        federated_keyword_providers: Option<PreferenceList<dyn AnswerProvider>>,
        rerank_providers: Option<PreferenceList<dyn RerankProvider>>,
        answer_providers: Option<PreferenceList<dyn AnswerProvider>>,
        events: Arc<EventEmitter>,
        defaults: SearchDefaults,
    ) -> Self {
        Self {
            store,
            vector,
            registry,
            cipher,
            dense_providers,
            sparse_provider,
            expansion_providers,
            interpretation_providers,
            federated_keyword_providers,
            rerank_providers,
            answer_providers,
            events,
            defaults,
        }
    }

    #[instrument(skip(self, request), fields(collection = %collection_readable_id))]
    pub async fn search(
        &self,
        collection_readable_id: &str,
        request: &SearchRequest,
        request_id: Uuid,
    ) -> CoreResult<SearchResponse> {
        self.events.operation_started(request_id, "search");
        let params = request.resolve(&self.defaults)?;

        let collection = self
            .store
            .get_collection_by_readable_id(collection_readable_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("collection {collection_readable_id}")))?;

        let connections = self
            .store
            .list_source_connections_for_collection(&collection.readable_id)
            .await
            .map_err(store_err)?;
        if connections.is_empty() {
            return Err(CoreError::Validation("collection has no sources".to_string()));
        }

        let mut vector_conns = Vec::new();
        let mut federated_conns = Vec::new();
        for conn in connections {
            let metadata = self.registry.metadata(&conn.short_name)?;
            if metadata.federated_search {
                federated_conns.push(conn);
            } else {
                vector_conns.push(conn);
            }
        }
        let has_vector_sources = !vector_conns.is_empty();
        let has_federated_sources = !federated_conns.is_empty();

        let include_interpretation = params.interpret_filters && has_vector_sources;
        if params.interpret_filters && !has_vector_sources {
            self.events.operation_skipped(
                request_id,
                "query_interpretation",
                "all_sources_are_federated",
            );
        }
        let include_user_filter = params.filter.is_some() && has_vector_sources;
        if params.filter.is_some() && !has_vector_sources {
            self.events
                .operation_skipped(request_id, "user_filter", "all_sources_are_federated");
        }

        let temporal_supporters: Vec<&SourceConnection> = vector_conns
            .iter()
            .filter(|c| {
                self.registry
                    .metadata(&c.short_name)
                    .map(|m| m.supports_temporal_relevance)
                    .unwrap_or(false)
            })
            .collect();
        let include_temporal = params.temporal_relevance > 0.0 && !temporal_supporters.is_empty();
        if params.temporal_relevance > 0.0 && temporal_supporters.is_empty() {
            self.events.operation_skipped(
                request_id,
                "temporal_relevance",
                "no_sources_support_temporal_relevance",
            );
        }

        let query_variants = self.run_query_expansion(request_id, &params).await?;
        let combined_filter =
            self.run_filter_construction(request_id, &params, include_interpretation, include_user_filter).await?;

        let (vector_results, federated_results) = tokio::join!(
            self.run_retrieval(
                request_id,
                &collection,
                &params,
                has_vector_sources,
                &query_variants,
                combined_filter.as_ref(),
                include_temporal,
            ),
            self.run_federated_search(request_id, &federated_conns, has_federated_sources, &params),
        );
        let mut results = vector_results?;
        results.extend(federated_results?);

        let merged = merge_by_highest_score(results);
        let mut page: Vec<SearchResultItem> = merged
            .into_iter()
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .collect();

        if params.rerank {
            self.run_reranking(request_id, &params, &mut page).await?;
        }

        clean_results(&mut page);

        let (answer, status) = if params.generate_answer {
            self.run_answer_generation(request_id, &params, &page).await?
        } else {
            (None, SearchStatus::Success)
        };

        self.events.operation_completed(
            request_id,
            "search",
            serde_json::json!({ "result_count": page.len() }),
        );

        Ok(SearchResponse { results: page, answer, status })
    }

    /// Produces up to [`MAX_QUERY_VARIANTS`] query strings, the primary
    /// query always first and verbatim. A requested expansion with no
    /// configured provider is a hard failure, not a silent skip: the
    /// caller explicitly asked for it.
    async fn run_query_expansion(
        &self,
        request_id: Uuid,
        params: &ResolvedSearchParams,
    ) -> CoreResult<Vec<String>> {
        if !params.expand_query {
            return Ok(vec![params.query.clone()]);
        }
        let Some(providers) = &self.expansion_providers else {
            return Err(CoreError::Validation(
                "query expansion was requested but no LLM provider is configured \
                 (set OPENAI_API_KEY or another supported provider)"
                    .to_string(),
            ));
        };

        self.events.operation_started(request_id, "query_expansion");
        let prompt = format!(
            "Produce up to {} alternative phrasings of this search query, one per line, \
             preserving its meaning. Query: {}",
            MAX_QUERY_VARIANTS - 1,
            params.query
        );
        let raw = providers
            .generate_answer(&prompt, "")
            .await
            .map_err(vector_err)?;
        let mut variants = vec![params.query.clone()];
        for line in raw.lines() {
            let line = line.trim().trim_start_matches(['-', '*']).trim();
            if !line.is_empty() && line != params.query {
                variants.push(line.to_string());
            }
            if variants.len() >= MAX_QUERY_VARIANTS {
                break;
            }
        }
        self.events.operation_completed(
            request_id,
            "query_expansion",
            serde_json::json!({ "variant_count": variants.len() }),
        );
        Ok(variants)
    }

    /// Interprets the query into a structured filter (when requested and
    /// applicable) and merges it by AND with the caller-supplied filter.
    /// Both reduce to flat string-equality clauses: [`PayloadFilter`] only
    /// expresses equality conjunctions, so this is a deliberately narrow
    /// slice of full filter expressiveness.
    async fn run_filter_construction(
        &self,
        request_id: Uuid,
        params: &ResolvedSearchParams,
        include_interpretation: bool,
        include_user_filter: bool,
    ) -> CoreResult<Option<PayloadFilter>> {
        let mut filter = PayloadFilter::new();

        if include_interpretation {
            let Some(providers) = &self.interpretation_providers else {
                return Err(CoreError::Validation(
                    "filter interpretation was requested but no LLM provider is configured \
                     (set OPENAI_API_KEY or another supported provider)"
                        .to_string(),
                ));
            };
            self.events.operation_started(request_id, "query_interpretation");
            let prompt = format!(
                "Extract any explicit filter conditions (field = value pairs) implied by this \
                 query as a flat JSON object; respond with {{}} if there are none. Query: {}",
                params.query
            );
            let raw = providers.generate_answer(&prompt, "").await.map_err(vector_err)?;
            if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(&raw) {
                for (key, value) in obj {
                    if let Some(s) = value.as_str() {
                        filter = filter.with_equal(key, s.to_string());
                    }
                }
            }
            self.events.operation_completed(request_id, "query_interpretation", serde_json::json!({}));
        }

        if include_user_filter {
            if let Some(serde_json::Value::Object(obj)) = &params.filter {
                for (key, value) in obj {
                    if let Some(s) = value.as_str() {
                        filter = filter.with_equal(key.clone(), s.to_string());
                    }
                }
            }
        }

        Ok(if filter.must_equal.is_empty() { None } else { Some(filter) })
    }

    /// Embeds every query variant and retrieves against the Collection's
    /// vector-backed sources. Skipped (not failed) entirely when the
    /// Collection has no vector-backed sources at all.
    #[allow(clippy::too_many_arguments)]
    async fn run_retrieval(
        &self,
        request_id: Uuid,
        collection: &Collection,
        params: &ResolvedSearchParams,
        has_vector_sources: bool,
        query_variants: &[String],
        filter: Option<&PayloadFilter>,
        include_temporal: bool,
    ) -> CoreResult<Vec<SearchResultItem>> {
        if !has_vector_sources {
            return Ok(vec![]);
        }

        self.events.operation_started(request_id, "embed_query");
        let dense_provider = resolve_dense_provider(&self.dense_providers, collection.vector_size as u64)
            .map_err(vector_err)?;
        let dense_vectors = dense_provider.embed(query_variants).await.map_err(vector_err)?;
        let sparse_vectors: Option<Vec<SparseEmbedding>> = match &self.sparse_provider {
            Some(provider) if params.retrieval_strategy != crate::request::RetrievalStrategy::Neural => {
                let primary = provider.embed_sparse(&query_variants[..1]).await.map_err(vector_err)?;
                Some(primary)
            }
            _ => None,
        };
        self.events.operation_completed(request_id, "embed_query", serde_json::json!({}));

        let decay = if include_temporal {
            Some(DecayConfig {
                kind: DecayKind::Linear,
                datetime_field: "base.metadata.db_created_at".to_string(),
                target: Utc::now(),
                scale_seconds: RECENCY_SCALE_SECONDS,
                midpoint: 0.5,
                weight: params.temporal_relevance,
            })
        } else {
            None
        };

        self.events.operation_started(request_id, "retrieval");
        let fetch_limit = (params.offset + params.limit) as u64;
        let batches = self
            .vector
            .bulk_search(
                &dense_vectors,
                sparse_vectors.as_deref(),
                fetch_limit,
                params.retrieval_strategy.into(),
                decay.as_ref(),
                filter,
            )
            .await
            .map_err(vector_err)?;

        let mut items = Vec::new();
        for batch in batches {
            for hit in batch {
                items.push(SearchResultItem {
                    point_id: hit.point_id,
                    score: hit.score,
                    source: SearchResultSource::Vector,
                    source_name: hit
                        .payload
                        .get("base")
                        .and_then(|b| b.get("metadata"))
                        .and_then(|m| m.get("source_name"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    payload: hit.payload,
                });
            }
        }
        self.events.operation_completed(
            request_id,
            "retrieval",
            serde_json::json!({ "hit_count": items.len() }),
        );
        Ok(items)
    }

    /// Runs one federated `driver.search` per federated source, tagging
    /// each hit by its source. Federated instantiation failures are not
    /// silently dropped: a federated source that fails to construct fails
    /// the whole request, since its results can't be silently omitted
    /// without misleading the caller about collection coverage.
    async fn run_federated_search(
        &self,
        request_id: Uuid,
        federated_conns: &[SourceConnection],
        has_federated_sources: bool,
        params: &ResolvedSearchParams,
    ) -> CoreResult<Vec<SearchResultItem>> {
        if !has_federated_sources {
            return Ok(vec![]);
        }

        self.events.operation_started(request_id, "federated_search");
        let mut items = Vec::new();
        for conn in federated_conns {
            let keyword_query = self.extract_keyword_query(&params.query).await?;
            let credentials = self.build_driver_credentials(conn).await?;
            let driver = self.registry.create(&conn.short_name, credentials, conn.config_fields.clone())?;
            let entities = driver.search(&keyword_query, params.limit as usize).await.map_err(|e| {
                self.events.operation_failed(request_id, "federated_search", &e.to_string());
                e
            })?;
            for (rank, entity) in entities.into_iter().enumerate() {
                items.push(federated_result_item(entity, &conn.short_name, rank));
            }
        }
        self.events.operation_completed(
            request_id,
            "federated_search",
            serde_json::json!({ "hit_count": items.len() }),
        );
        Ok(items)
    }

    /// Best-effort keyword extraction: falls back to the raw query when no
    /// LLM provider is configured, since federated search's inclusion isn't
    /// gated on provider availability the way expansion/interpretation are.
    async fn extract_keyword_query(&self, query: &str) -> CoreResult<String> {
        let Some(providers) = &self.federated_keyword_providers else {
            return Ok(query.to_string());
        };
        let prompt = format!(
            "Extract a concise keyword search query capturing the intent of: {query}"
        );
        match providers.generate_answer(&prompt, "").await {
            Ok(keywords) if !keywords.trim().is_empty() => Ok(keywords.trim().to_string()),
            _ => {
                warn!("federated keyword extraction failed, falling back to raw query");
                Ok(query.to_string())
            }
        }
    }

    async fn build_driver_credentials(&self, connection: &SourceConnection) -> CoreResult<DriverCredentials> {
        let Some(credential_id) = connection.credential_id else {
            return Ok(DriverCredentials::default());
        };
        let credential = self
            .store
            .get_integration_credential(credential_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("integration credential {credential_id}")))?;
        let fields: HashMap<String, String> = self
            .cipher
            .decrypt(&credential.encrypted_credentials)
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        let access_token = fields.get("access_token").cloned();
        Ok(DriverCredentials { access_token, fields })
    }

    /// Scores every result against the primary query and reorders; a
    /// requested rerank with no configured provider is a hard failure.
    async fn run_reranking(
        &self,
        request_id: Uuid,
        params: &ResolvedSearchParams,
        items: &mut Vec<SearchResultItem>,
    ) -> CoreResult<()> {
        let Some(providers) = &self.rerank_providers else {
            return Err(CoreError::Validation(
                "reranking was requested but no rerank provider is configured".to_string(),
            ));
        };
        if items.is_empty() {
            return Ok(());
        }
        self.events.operation_started(request_id, "reranking");
        let documents: Vec<String> = items
            .iter()
            .map(|item| serde_json::to_string(&item.payload).unwrap_or_default())
            .collect();
        let ranked = providers.rerank(&params.query, &documents).await.map_err(vector_err)?;
        let mut reordered = Vec::with_capacity(items.len());
        for r in ranked {
            if let Some(item) = items.get(r.index) {
                let mut item = item.clone();
                item.score = r.score;
                reordered.push(item);
            }
        }
        reordered.truncate(params.limit as usize);
        *items = reordered;
        self.events.operation_completed(request_id, "reranking", serde_json::json!({}));
        Ok(())
    }

    /// Degrades to a canned completion when the result set is empty or has
    /// nothing above the relevance threshold; otherwise prompts the
    /// configured answer provider with the top results as grounded context.
    async fn run_answer_generation(
        &self,
        request_id: Uuid,
        params: &ResolvedSearchParams,
        items: &[SearchResultItem],
    ) -> CoreResult<(Option<String>, SearchStatus)> {
        if let Some((status, canned)) = quality_gate(items) {
            return Ok((Some(canned.to_string()), status));
        }
        let Some(providers) = &self.answer_providers else {
            return Err(CoreError::Validation(
                "answer generation was requested but no LLM provider is configured \
                 (set OPENAI_API_KEY or another supported provider)"
                    .to_string(),
            ));
        };

        self.events.operation_started(request_id, "generate_answer");
        let context = items
            .iter()
            .map(|item| serde_json::to_string(&item.payload).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let answer = providers.generate_answer(&params.query, &context).await.map_err(vector_err)?;
        self.events.operation_completed(request_id, "generate_answer", serde_json::json!({}));
        Ok((Some(answer), SearchStatus::Success))
    }
}

fn federated_result_item(entity: Entity, short_name: &str, rank: usize) -> SearchResultItem {
    let point_id = Uuid::new_v5(&Uuid::NAMESPACE_URL, entity.entity_id().as_bytes());
    let score = 1.0 / (rank as f32 + 1.0);
    let payload = match serde_json::to_value(&entity) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    SearchResultItem {
        point_id,
        score,
        source: SearchResultSource::Federated,
        source_name: Some(short_name.to_string()),
        payload,
    }
}

/// Dedups by `point_id`, keeping the highest-scoring occurrence, then
/// re-sorts descending. The canonical merge policy for both multi-query-
/// variant merging and federated/vector-backed merging.
fn merge_by_highest_score(items: Vec<SearchResultItem>) -> Vec<SearchResultItem> {
    let mut best: HashMap<Uuid, SearchResultItem> = HashMap::new();
    for item in items {
        best.entry(item.point_id)
            .and_modify(|existing| {
                if item.score > existing.score {
                    *existing = item.clone();
                }
            })
            .or_insert(item);
    }
    let mut merged: Vec<SearchResultItem> = best.into_values().collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: Uuid, score: f32, source: SearchResultSource) -> SearchResultItem {
        SearchResultItem { point_id: id, score, source, source_name: None, payload: serde_json::Map::new() }
    }

    #[test]
    fn merge_keeps_the_highest_score_per_point() {
        let id = Uuid::new_v4();
        let merged = merge_by_highest_score(vec![
            item(id, 0.3, SearchResultSource::Vector),
            item(id, 0.9, SearchResultSource::Federated),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].score, 0.9);
    }

    #[test]
    fn merge_sorts_descending_by_score() {
        let merged = merge_by_highest_score(vec![
            item(Uuid::new_v4(), 0.1, SearchResultSource::Vector),
            item(Uuid::new_v4(), 0.8, SearchResultSource::Vector),
            item(Uuid::new_v4(), 0.5, SearchResultSource::Federated),
        ]);
        let scores: Vec<f32> = merged.iter().map(|i| i.score).collect();
        assert_eq!(scores, vec![0.8, 0.5, 0.1]);
    }
}
