//! Hybrid dense+sparse vector store adapter (§4.6). One Qdrant collection per
//! platform Collection, named `default` for the dense cosine vector and
//! `bm25` for the IDF-modified sparse vector, mirroring the destination this
//! crate replaces.

use crate::decay::{DecayConfig, DecayKind};
use anyhow::{Context, Result};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DatetimeExpression, DatetimeKeyExpression,
    DecayParamsExpression, DeletePointsBuilder, Distance, ExpDecayExpression, Filter, Fusion,
    GaussDecayExpression, LinDecayExpression, MultExpression, NamedVectors, PointStruct,
    PrefetchQueryBuilder, Query, QueryPointsBuilder, ScoredPoint, SparseIndexConfig, SparseVector,
    SparseVectorParams, SparseVectorsConfigBuilder, SumExpression, UpsertPointsBuilder,
    Value as QdrantValue, Vector, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tapestry_core::entity::Entity;
use tracing::{debug, instrument};
use uuid::Uuid;

pub const DENSE_VECTOR_NAME: &str = "default";
pub const SPARSE_VECTOR_NAME: &str = "bm25";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Neural,
    Keyword,
    Hybrid,
}

/// A dense embedding plus its matching sparse (term, weight) pairs, produced
/// by the embedding providers in [`crate::providers`].
#[derive(Debug, Clone)]
pub struct EmbeddedVector {
    pub dense: Vec<f32>,
    pub sparse: Option<SparseEmbedding>,
}

#[derive(Debug, Clone)]
pub struct SparseEmbedding {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

pub struct SearchHit {
    pub point_id: Uuid,
    pub score: f32,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// A conjunction of payload equality clauses applied on top of a query's
/// vector similarity. Restricted to string equality: the caller-supplied
/// filter and the search pipeline's own structured-filter interpretation
/// both reduce to field/value pairs before reaching this layer.
#[derive(Debug, Clone, Default)]
pub struct PayloadFilter {
    pub must_equal: Vec<(String, String)>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equal(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must_equal.push((field.into(), value.into()));
        self
    }

    fn to_qdrant_filter(&self) -> Option<Filter> {
        if self.must_equal.is_empty() {
            return None;
        }
        Some(Filter::must(
            self.must_equal
                .iter()
                .map(|(field, value)| Condition::matches(field.clone(), value.clone()))
                .collect::<Vec<_>>(),
        ))
    }
}

pub struct VectorStore {
    client: Qdrant,
    collection_name: String,
}

impl VectorStore {
    pub fn connect(url: &str, api_key: Option<&str>, collection_id: Uuid) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().context("build qdrant client")?;
        Ok(Self {
            client,
            collection_name: collection_id.to_string(),
        })
    }

    /// Creates the backing collection if it doesn't already exist: one dense
    /// cosine vector sized to the owning Collection's fixed `vector_size`,
    /// one IDF-modified sparse vector for keyword search, plus payload
    /// indexes on the system timestamp fields search ordering relies on.
    #[instrument(skip(self))]
    pub async fn setup_collection(&self, vector_size: u64) -> Result<()> {
        let existing = self.client.collection_exists(&self.collection_name).await?;
        if existing {
            debug!(collection = %self.collection_name, "collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine))
                    .sparse_vectors_config(
                        SparseVectorsConfigBuilder::default().add_named_vector_params(
                            SPARSE_VECTOR_NAME,
                            SparseVectorParams {
                                index: Some(SparseIndexConfig::default()),
                                modifier: Some(qdrant_client::qdrant::Modifier::Idf.into()),
                                ..Default::default()
                            },
                        ),
                    ),
            )
            .await
            .context("create collection")?;

        for field in ["base.metadata.db_updated_at", "base.metadata.db_created_at"] {
            self.client
                .create_field_index(
                    qdrant_client::qdrant::CreateFieldIndexCollectionBuilder::new(
                        &self.collection_name,
                        field,
                        qdrant_client::qdrant::FieldType::Datetime,
                    ),
                )
                .await
                .context("create payload index")?;
        }

        Ok(())
    }

    pub async fn insert(&self, entity: &Entity, vector: EmbeddedVector) -> Result<()> {
        self.bulk_insert(&[(entity.clone(), vector)]).await
    }

    pub async fn bulk_insert(&self, items: &[(Entity, EmbeddedVector)]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(items.len());
        for (entity, vector) in items {
            let base = entity.base();
            let db_entity_id = base
                .metadata
                .db_entity_id
                .context("entity has no db_entity_id assigned yet")?;
            let point_id = entity.point_id(db_entity_id);

            let mut vectors = NamedVectors::default().add_vector(DENSE_VECTOR_NAME, vector.dense.clone());
            if let Some(sparse) = &vector.sparse {
                vectors = vectors.add_vector(
                    SPARSE_VECTOR_NAME,
                    Vector::from(SparseVector {
                        indices: sparse.indices.clone(),
                        values: sparse.values.clone(),
                    }),
                );
            }

            let payload = entity_payload(entity)?;
            points.push(PointStruct::new(point_id.to_string(), vectors, payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await
            .context("upsert points")?;
        Ok(())
    }

    /// Deletes every point belonging to one logical entity (all of its
    /// chunks), keyed by the relational store's `db_entity_id`.
    pub async fn delete(&self, db_entity_id: Uuid) -> Result<()> {
        self.delete_by_filter(Filter::must([Condition::matches(
            "base.metadata.db_entity_id",
            db_entity_id.to_string(),
        )]))
        .await
    }

    pub async fn delete_by_sync_id(&self, sync_id: Uuid) -> Result<()> {
        self.delete_by_filter(Filter::must([Condition::matches(
            "base.metadata.sync_id",
            sync_id.to_string(),
        )]))
        .await
    }

    pub async fn bulk_delete_by_parent_ids(&self, parent_ids: &[String], sync_id: Uuid) -> Result<()> {
        if parent_ids.is_empty() {
            return Ok(());
        }
        self.delete_by_filter(Filter::must([
            Condition::matches("base.metadata.sync_id", sync_id.to_string()),
            Condition::matches("base.breadcrumbs[].entity_id", parent_ids.to_vec()),
        ]))
        .await
    }

    async fn delete_by_filter(&self, filter: Filter) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(filter)
                    .wait(true),
            )
            .await
            .context("delete points")?;
        Ok(())
    }

    /// Runs one query per element of `query_vectors` in a single batch
    /// round-trip and returns their results flattened in order, following
    /// the reference implementation's `bulk_search` contract.
    #[instrument(skip(self, query_vectors, sparse_vectors))]
    pub async fn bulk_search(
        &self,
        query_vectors: &[Vec<f32>],
        sparse_vectors: Option<&[SparseEmbedding]>,
        limit: u64,
        search_method: SearchMethod,
        decay: Option<&DecayConfig>,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<Vec<SearchHit>>> {
        if query_vectors.is_empty() {
            return Ok(vec![]);
        }

        let search_method = if search_method != SearchMethod::Neural && !self.has_sparse_index().await? {
            tracing::warn!("bm25 index missing on collection, falling back to neural search");
            SearchMethod::Neural
        } else {
            search_method
        };
        let qdrant_filter = filter.and_then(PayloadFilter::to_qdrant_filter);

        let mut results = Vec::with_capacity(query_vectors.len());
        for (i, dense) in query_vectors.iter().enumerate() {
            let sparse = sparse_vectors.and_then(|v| v.get(i));
            let query = build_query(dense, sparse, search_method, decay)?;
            let mut builder = QueryPointsBuilder::new(&self.collection_name)
                .query(query.0)
                .limit(limit)
                .with_payload(true)
                .prefetch(query.1);
            if let Some(f) = qdrant_filter.clone() {
                builder = builder.filter(f);
            }
            let response = self.client.query(builder).await.context("query points")?;
            results.push(response.result.into_iter().filter_map(to_hit).collect());
        }
        Ok(results)
    }

    async fn has_sparse_index(&self) -> Result<bool> {
        let info = self.client.collection_info(&self.collection_name).await?;
        Ok(info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .map(|p| p.sparse_vectors_config.contains_key(SPARSE_VECTOR_NAME))
            .unwrap_or(false))
    }
}

fn build_query(
    dense: &[f32],
    sparse: Option<&SparseEmbedding>,
    method: SearchMethod,
    decay: Option<&DecayConfig>,
) -> Result<(Query, Vec<qdrant_client::qdrant::PrefetchQuery>)> {
    match method {
        SearchMethod::Neural => {
            let query = decayed_query(Query::new_nearest(dense.to_vec()), decay);
            Ok((query, vec![]))
        }
        SearchMethod::Keyword => {
            let sparse = sparse.context("keyword search requires a sparse vector")?;
            let vector = SparseVector {
                indices: sparse.indices.clone(),
                values: sparse.values.clone(),
            };
            let query = decayed_query(Query::new_nearest(vector), decay);
            Ok((query, vec![]))
        }
        SearchMethod::Hybrid => {
            let sparse = sparse.context("hybrid search requires a sparse vector")?;
            let prefetch = vec![
                PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(dense.to_vec()))
                    .using(DENSE_VECTOR_NAME)
                    .limit(10_000u64)
                    .build(),
                PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(SparseVector {
                        indices: sparse.indices.clone(),
                        values: sparse.values.clone(),
                    }))
                    .using(SPARSE_VECTOR_NAME)
                    .limit(10_000u64)
                    .build(),
            ];
            let fused = Query::new_fusion(Fusion::Rrf);
            let query = match decay {
                None => fused,
                Some(cfg) if cfg.weight <= 0.0 => fused,
                Some(cfg) => decayed_query(fused, Some(cfg)),
            };
            Ok((query, prefetch))
        }
    }
}

/// Blends a recency-decay formula into a base query the way the reference
/// destination does: `weight=0` keeps the raw score, `weight=1` replaces it
/// outright, and anything in between is `(1-w) + w*decay` multiplied in.
fn decayed_query(base: Query, decay: Option<&DecayConfig>) -> Query {
    let Some(cfg) = decay else {
        return base;
    };
    if cfg.weight <= 0.0 {
        return base;
    }

    let params = DecayParamsExpression {
        x: Some(Box::new(DatetimeKeyExpression {
            datetime_key: cfg.datetime_field.clone(),
        }.into())),
        target: Some(Box::new(DatetimeExpression {
            datetime: Some(cfg.target.to_rfc3339()),
            datetime_key: None,
        }.into())),
        scale: Some(cfg.scale_seconds() as f32),
        midpoint: Some(cfg.midpoint as f32),
    };

    let decay_expr = match cfg.kind {
        DecayKind::Linear => qdrant_client::qdrant::Expression::from(LinDecayExpression {
            lin_decay: Some(Box::new(params)),
        }),
        DecayKind::Exponential => qdrant_client::qdrant::Expression::from(ExpDecayExpression {
            exp_decay: Some(Box::new(params)),
        }),
        DecayKind::Gaussian => qdrant_client::qdrant::Expression::from(GaussDecayExpression {
            gauss_decay: Some(Box::new(params)),
        }),
    };

    if cfg.weight >= 1.0 {
        return Query::new_formula(decay_expr);
    }

    let blended = SumExpression {
        sum: vec![
            qdrant_client::qdrant::Expression::from(1.0 - cfg.weight as f32),
            qdrant_client::qdrant::Expression::from(MultExpression {
                mult: vec![
                    qdrant_client::qdrant::Expression::from(cfg.weight as f32),
                    decay_expr,
                ],
            }),
        ],
    };
    Query::new_formula(MultExpression {
        mult: vec![
            qdrant_client::qdrant::Expression::variable("$score"),
            qdrant_client::qdrant::Expression::from(blended),
        ],
    })
}

fn to_hit(point: ScoredPoint) -> Option<SearchHit> {
    let point_id = match point.id?.point_id_options? {
        qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s) => Uuid::parse_str(&s).ok()?,
        qdrant_client::qdrant::point_id::PointIdOptions::Num(_) => return None,
    };
    let payload = point
        .payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_value_to_json(v)))
        .collect();
    Some(SearchHit {
        point_id,
        score: point.score,
        payload,
    })
}

fn entity_payload(entity: &Entity) -> Result<HashMap<String, QdrantValue>> {
    let json = serde_json::to_value(entity)?;
    let serde_json::Value::Object(map) = json else {
        anyhow::bail!("entity did not serialize to a JSON object");
    };
    Ok(map.into_iter().map(|(k, v)| (k, QdrantValue::from(v))).collect())
}

fn qdrant_value_to_json(value: QdrantValue) -> serde_json::Value {
    serde_json::to_value(&value).unwrap_or(serde_json::Value::Null)
}
