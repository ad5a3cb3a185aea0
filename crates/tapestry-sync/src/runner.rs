//! The Sync Runner (§4.9, C9): drives one Sync Job from a Source
//! Connection's driver to indexed points in a destination Collection.
//!
//! Reconciliation keys on [`tapestry_core::entity::Entity::content_hash`]:
//! an entity re-emitted with the same hash is `kept` untouched, a changed
//! hash is `updated`, a brand new entity id is `inserted`, and an entity
//! previously seen for this sync but absent from this run's stream is
//! `deleted` once the stream drains.

use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tapestry_auth::cipher::SecretCipher;
use tapestry_core::driver::{Cursor, DriverCredentials, DriverRegistry};
use tapestry_core::entity::Entity;
use tapestry_core::error::{CoreError, CoreResult};
use tapestry_core::events::{EventEmitter, EventKind};
use tapestry_core::model::{SourceConnection, SyncJobCounters, SyncJobStatus};
use tapestry_store::{Store, SyncedEntity};
use tapestry_vector::providers::{resolve_dense_provider, DenseEmbeddingProvider, SparseEmbeddingProvider};
use tapestry_vector::{EmbeddedVector, SparseEmbedding, VectorStore};
use tracing::{info, instrument};
use uuid::Uuid;

const EMBED_BATCH_SIZE: usize = 32;

fn store_err(e: anyhow::Error) -> CoreError {
    CoreError::Provider(e.to_string())
}

fn vector_err(e: anyhow::Error) -> CoreError {
    CoreError::Provider(e.to_string())
}

#[derive(Clone, Copy)]
enum Reconciled {
    Insert(Uuid),
    Update(Uuid),
    Keep,
}

/// Drives a single Sync Job to completion. One instance is shared across
/// every job the scheduler fires; all per-job state lives in [`run`]'s
/// locals.
pub struct SyncRunner {
    store: Store,
    vector: Arc<VectorStore>,
    registry: Arc<DriverRegistry>,
    cipher: Arc<dyn SecretCipher>,
    dense_providers: Vec<Box<dyn DenseEmbeddingProvider>>,
    sparse_provider: Option<Arc<dyn SparseEmbeddingProvider>>,
    events: Arc<EventEmitter>,
}

impl SyncRunner {
    pub fn new(
        store: Store,
        vector: Arc<VectorStore>,
        registry: Arc<DriverRegistry>,
        cipher: Arc<dyn SecretCipher>,
        dense_providers: Vec<Box<dyn DenseEmbeddingProvider>>,
        sparse_provider: Option<Arc<dyn SparseEmbeddingProvider>>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            store,
            vector,
            registry,
            cipher,
            dense_providers,
            sparse_provider,
            events,
        }
    }

    /// Runs `sync_job_id` to a terminal status. `cancel` is polled between
    /// entities; flipping it to `true` stops the stream early, flushes
    /// whatever is already embedded, and marks the job `Cancelled` instead
    /// of `Completed`.
    #[instrument(skip(self, cancel), fields(sync_job_id = %sync_job_id))]
    pub async fn run(
        &self,
        sync_job_id: Uuid,
        request_id: Uuid,
        cancel: Arc<AtomicBool>,
    ) -> CoreResult<()> {
        self.events.emit(
            request_id,
            EventKind::SyncPending,
            serde_json::json!({ "sync_job_id": sync_job_id }),
        );

        let outcome = self.run_inner(sync_job_id, request_id, &cancel).await;

        match &outcome {
            Ok(counters) => {
                let status = if cancel.load(Ordering::Relaxed) {
                    SyncJobStatus::Cancelled
                } else {
                    SyncJobStatus::Completed
                };
                self.store
                    .transition_sync_job_status(sync_job_id, status, Utc::now())
                    .await
                    .map_err(store_err)?;
                let kind = if status == SyncJobStatus::Completed {
                    EventKind::SyncCompleted
                } else {
                    EventKind::SyncFailed
                };
                self.events.emit(
                    request_id,
                    kind,
                    serde_json::json!({ "sync_job_id": sync_job_id, "counters": counters_json(counters) }),
                );
            }
            Err(err) => {
                self.store
                    .fail_sync_job(sync_job_id, &err.to_string(), Utc::now())
                    .await
                    .map_err(store_err)?;
                self.events.emit(
                    request_id,
                    EventKind::SyncFailed,
                    serde_json::json!({ "sync_job_id": sync_job_id, "error": err.to_string() }),
                );
            }
        }

        outcome.map(|_| ())
    }

    async fn run_inner(
        &self,
        sync_job_id: Uuid,
        request_id: Uuid,
        cancel: &Arc<AtomicBool>,
    ) -> CoreResult<SyncJobCounters> {
        let job = self
            .store
            .get_sync_job(sync_job_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("sync job {sync_job_id}")))?;
        let sync = self
            .store
            .get_sync(job.sync_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("sync {}", job.sync_id)))?;
        let connection = self
            .store
            .get_source_connection(sync.source_connection_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| {
                CoreError::NotFound(format!("source connection {}", sync.source_connection_id))
            })?;
        let collection = self
            .store
            .get_collection(sync.collection_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("collection {}", sync.collection_id)))?;

        self.store
            .transition_sync_job_status(sync_job_id, SyncJobStatus::Running, Utc::now())
            .await
            .map_err(store_err)?;
        self.events.emit(
            request_id,
            EventKind::SyncStarted,
            serde_json::json!({ "sync_job_id": sync_job_id, "short_name": connection.short_name }),
        );

        let credentials = self.build_driver_credentials(&connection).await?;
        let config = connection.config_fields.clone();
        let driver = self
            .registry
            .create(&connection.short_name, credentials, config)?;

        self.vector
            .setup_collection(collection.vector_size as u64)
            .await
            .map_err(vector_err)?;

        let cursor = if job.force_full_sync {
            None
        } else {
            connection.cursor_data.clone().map(|data| Cursor { data })
        };

        let mut counters = SyncJobCounters::default();
        let mut pending: Vec<(Entity, Uuid)> = Vec::new();
        let mut entities = driver.generate_entities(cursor);
        let mut cancelled = false;

        while let Some(next) = entities.next().await {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let entity = next?;
            let entity_id = entity.entity_id().to_string();
            let content_hash = entity.content_hash();
            let previous = self
                .store
                .get_synced_entity(sync.id, &entity_id)
                .await
                .map_err(store_err)?;

            let reconciled = match &previous {
                Some(p) if p.hash == content_hash => Reconciled::Keep,
                Some(p) => Reconciled::Update(p.db_entity_id),
                None => Reconciled::Insert(Uuid::new_v4()),
            };

            let db_entity_id = match reconciled {
                Reconciled::Insert(id) | Reconciled::Update(id) => id,
                Reconciled::Keep => previous.expect("keep implies a previous row").db_entity_id,
            };

            match reconciled {
                Reconciled::Keep => {
                    counters.kept += 1;
                    self.events
                        .operation_skipped(request_id, "index_entity", "unchanged");
                }
                Reconciled::Insert(_) | Reconciled::Update(_) => {
                    let mut entity = entity;
                    {
                        let base = entity.base_mut();
                        base.metadata.db_entity_id = Some(db_entity_id);
                        base.metadata.hash = Some(content_hash.clone());
                        base.metadata.sync_id = Some(sync.id);
                        base.metadata.sync_job_id = Some(sync_job_id);
                        if base.metadata.source_name.is_none() {
                            base.metadata.source_name = Some(connection.short_name.clone());
                        }
                    }
                    if matches!(reconciled, Reconciled::Insert(_)) {
                        counters.inserted += 1;
                    } else {
                        counters.updated += 1;
                    }
                    pending.push((entity, db_entity_id));
                }
            }

            self.store
                .upsert_synced_entity(&SyncedEntity {
                    sync_id: sync.id,
                    entity_id,
                    db_entity_id,
                    hash: content_hash,
                    last_sync_job_id: sync_job_id,
                })
                .await
                .map_err(store_err)?;

            if pending.len() >= EMBED_BATCH_SIZE {
                self.flush_batch(&mut pending, collection.vector_size as u64)
                    .await?;
                self.events.operation_progress(
                    request_id,
                    "index_entity",
                    serde_json::json!({ "inserted": counters.inserted, "updated": counters.updated }),
                );
            }
        }

        if !pending.is_empty() {
            self.flush_batch(&mut pending, collection.vector_size as u64)
                .await?;
        }

        if !cancelled {
            let stale = self
                .store
                .list_stale_synced_entities(sync.id, sync_job_id)
                .await
                .map_err(store_err)?;
            if !stale.is_empty() {
                let parent_ids: Vec<String> = stale.iter().map(|s| s.entity_id.clone()).collect();
                self.vector
                    .bulk_delete_by_parent_ids(&parent_ids, sync.id)
                    .await
                    .map_err(vector_err)?;
                for row in &stale {
                    self.store
                        .delete_synced_entity(sync.id, &row.entity_id)
                        .await
                        .map_err(store_err)?;
                }
                counters.deleted += stale.len() as u64;
            }

            let updated_cursor = driver.current_cursor();
            self.store
                .update_cursor_data(connection.id, &updated_cursor.data, Utc::now())
                .await
                .map_err(store_err)?;
        } else {
            info!(sync_job_id = %sync_job_id, "sync job cancelled, skipping deletion sweep and cursor persist");
        }

        self.store
            .update_sync_job_counters(sync_job_id, counters.clone())
            .await
            .map_err(store_err)?;

        Ok(counters)
    }

    async fn flush_batch(
        &self,
        pending: &mut Vec<(Entity, Uuid)>,
        collection_vector_size: u64,
    ) -> CoreResult<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = pending
            .iter()
            .map(|(e, _)| e.base().textual_representation.clone())
            .collect();

        let dense_provider = resolve_dense_provider(&self.dense_providers, collection_vector_size)
            .map_err(vector_err)?;
        let dense_vectors = dense_provider.embed(&texts).await.map_err(vector_err)?;

        let sparse_vectors = match &self.sparse_provider {
            Some(provider) => Some(provider.embed_sparse(&texts).await.map_err(vector_err)?),
            None => None,
        };

        let items: Vec<(Entity, EmbeddedVector)> = pending
            .drain(..)
            .enumerate()
            .map(|(i, (entity, _db_entity_id))| {
                let sparse = sparse_vectors
                    .as_ref()
                    .and_then(|v| v.get(i))
                    .map(|s| SparseEmbedding {
                        indices: s.indices.clone(),
                        values: s.values.clone(),
                    });
                (
                    entity,
                    EmbeddedVector {
                        dense: dense_vectors[i].clone(),
                        sparse,
                    },
                )
            })
            .collect();

        self.vector.bulk_insert(&items).await.map_err(vector_err)
    }

    /// Decrypts the connection's stored credential into the fields a driver
    /// constructor expects. Proactive OAuth2 refresh is out of scope here:
    /// the client id/secret a BYOC connection authorized with are not
    /// persisted past its init session, so a driver observing an expired
    /// token is responsible for surfacing that as a provider error.
    async fn build_driver_credentials(
        &self,
        connection: &SourceConnection,
    ) -> CoreResult<DriverCredentials> {
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
}

fn counters_json(counters: &SyncJobCounters) -> serde_json::Value {
    serde_json::json!({
        "inserted": counters.inserted,
        "updated": counters.updated,
        "deleted": counters.deleted,
        "kept": counters.kept,
        "skipped": counters.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_auth::cipher::AesGcmCipher;
    use tapestry_core::model::{AuthenticationMethod, Collection, ConnectionState, Organization, Sync, SyncJob};

    async fn seeded() -> (SyncRunner, Uuid, Store) {
        let store = Store::in_memory().await.unwrap();
        let org_id = Uuid::new_v4();
        store
            .create_organization(&Organization {
                id: org_id,
                name: "Acme".to_string(),
                feature_flags: vec![],
            })
            .await
            .unwrap();
        let collection = Collection {
            id: Uuid::new_v4(),
            readable_id: "acme-docs".to_string(),
            name: "Acme Docs".to_string(),
            vector_size: 384,
            organization_id: org_id,
        };
        store.create_collection(&collection).await.unwrap();
        let now = Utc::now();
        let connection = SourceConnection {
            id: Uuid::new_v4(),
            organization_id: org_id,
            collection_readable_id: collection.readable_id.clone(),
            short_name: "notion".to_string(),
            name: "Acme Notion".to_string(),
            description: None,
            auth_method: AuthenticationMethod::Direct,
            state: ConnectionState::Scheduled,
            is_authenticated: true,
            config_fields: serde_json::json!({}),
            credential_id: None,
            sync_id: None,
            cron_schedule: None,
            cursor_data: None,
            readable_auth_provider_id: None,
            auth_provider_config: None,
            connection_init_session_id: None,
            created_at: now,
            updated_at: now,
        };
        store.create_source_connection(&connection).await.unwrap();
        let sync = Sync {
            id: Uuid::new_v4(),
            source_connection_id: connection.id,
            collection_id: collection.id,
            cron_schedule: None,
            next_scheduled_run: None,
        };
        store.create_sync(&sync).await.unwrap();
        let job = SyncJob::new(sync.id, true);
        store.create_sync_job(&job).await.unwrap();

        let registry = Arc::new(DriverRegistry::new());
        let cipher: Arc<dyn SecretCipher> = Arc::new(AesGcmCipher::new(&[7u8; 32]));
        let vector = Arc::new(
            VectorStore::connect("http://localhost:6334", None, collection.id).unwrap(),
        );
        let runner = SyncRunner::new(
            store.clone(),
            vector,
            registry,
            cipher,
            vec![],
            None,
            Arc::new(EventEmitter::new(16)),
        );
        (runner, job.id, store)
    }

    #[tokio::test]
    async fn unknown_driver_short_name_fails_the_job() {
        let (runner, job_id, store) = seeded().await;
        let cancel = Arc::new(AtomicBool::new(false));
        let result = runner.run(job_id, Uuid::new_v4(), cancel).await;
        assert!(result.is_err());

        let job = store.get_sync_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, SyncJobStatus::Failed);
        assert!(job.error.is_some());
    }
}
