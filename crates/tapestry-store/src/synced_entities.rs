//! Per-sync entity-hash ledger: lets the Sync Runner tell INSERT/UPDATE/KEEP
//! apart across runs, and sweep entities that vanished from the upstream
//! source since the last run (§4.9).

use crate::Store;
use anyhow::{Context, Result};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedEntity {
    pub sync_id: Uuid,
    pub entity_id: String,
    pub db_entity_id: Uuid,
    pub hash: String,
    pub last_sync_job_id: Uuid,
}

impl Store {
    pub async fn upsert_synced_entity(&self, row: &SyncedEntity) -> Result<()> {
        sqlx::query(
            "INSERT INTO synced_entities (sync_id, entity_id, db_entity_id, hash, last_sync_job_id)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(sync_id, entity_id) DO UPDATE SET
                db_entity_id = excluded.db_entity_id,
                hash = excluded.hash,
                last_sync_job_id = excluded.last_sync_job_id",
        )
        .bind(row.sync_id.to_string())
        .bind(&row.entity_id)
        .bind(row.db_entity_id.to_string())
        .bind(&row.hash)
        .bind(row.last_sync_job_id.to_string())
        .execute(&self.pool)
        .await
        .context("upsert synced_entity")?;
        Ok(())
    }

    pub async fn get_synced_entity(
        &self,
        sync_id: Uuid,
        entity_id: &str,
    ) -> Result<Option<SyncedEntity>> {
        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT sync_id, entity_id, db_entity_id, hash, last_sync_job_id
             FROM synced_entities WHERE sync_id = ? AND entity_id = ?",
        )
        .bind(sync_id.to_string())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(synced_entity_from_row).transpose()
    }

    /// Rows untouched by `current_sync_job_id` are entities the driver no
    /// longer yielded this run: candidates for deletion from the
    /// destination Collection.
    pub async fn list_stale_synced_entities(
        &self,
        sync_id: Uuid,
        current_sync_job_id: Uuid,
    ) -> Result<Vec<SyncedEntity>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT sync_id, entity_id, db_entity_id, hash, last_sync_job_id
             FROM synced_entities WHERE sync_id = ? AND last_sync_job_id != ?",
        )
        .bind(sync_id.to_string())
        .bind(current_sync_job_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(synced_entity_from_row).collect()
    }

    pub async fn delete_synced_entity(&self, sync_id: Uuid, entity_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM synced_entities WHERE sync_id = ? AND entity_id = ?")
            .bind(sync_id.to_string())
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .context("delete synced_entity")?;
        Ok(())
    }

    pub async fn delete_synced_entities_for_sync(&self, sync_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM synced_entities WHERE sync_id = ?")
            .bind(sync_id.to_string())
            .execute(&self.pool)
            .await
            .context("delete synced_entities for sync")?;
        Ok(())
    }
}

fn synced_entity_from_row(row: (String, String, String, String, String)) -> Result<SyncedEntity> {
    let (sync_id, entity_id, db_entity_id, hash, last_sync_job_id) = row;
    Ok(SyncedEntity {
        sync_id: Uuid::parse_str(&sync_id)?,
        entity_id,
        db_entity_id: Uuid::parse_str(&db_entity_id)?,
        hash,
        last_sync_job_id: Uuid::parse_str(&last_sync_job_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_core::model::{Collection, Organization, SourceConnection, Sync};

    async fn seeded_sync() -> (Store, Uuid) {
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
            readable_id: "acme-main".to_string(),
            name: "Main".to_string(),
            vector_size: 384,
            organization_id: org_id,
        };
        store.create_collection(&collection).await.unwrap();
        let connection = SourceConnection {
            id: Uuid::new_v4(),
            organization_id: org_id,
            collection_readable_id: collection.readable_id.clone(),
            short_name: "notion".to_string(),
            name: "Notion Connection".to_string(),
            description: None,
            auth_method: tapestry_core::model::AuthenticationMethod::Direct,
            state: tapestry_core::model::ConnectionState::Authenticated,
            is_authenticated: true,
            config_fields: serde_json::json!({}),
            credential_id: None,
            sync_id: None,
            cron_schedule: None,
            cursor_data: None,
            readable_auth_provider_id: None,
            auth_provider_config: None,
            connection_init_session_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
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
        (store, sync.id)
    }

    #[tokio::test]
    async fn stale_rows_are_those_a_later_job_did_not_touch() {
        let (store, sync_id) = seeded_sync().await;
        let job_one = Uuid::new_v4();
        let job_two = Uuid::new_v4();

        store
            .upsert_synced_entity(&SyncedEntity {
                sync_id,
                entity_id: "page-1".to_string(),
                db_entity_id: Uuid::new_v4(),
                hash: "h1".to_string(),
                last_sync_job_id: job_one,
            })
            .await
            .unwrap();
        store
            .upsert_synced_entity(&SyncedEntity {
                sync_id,
                entity_id: "page-2".to_string(),
                db_entity_id: Uuid::new_v4(),
                hash: "h2".to_string(),
                last_sync_job_id: job_one,
            })
            .await
            .unwrap();

        // job_two only re-confirms page-1: page-2 vanished upstream.
        store
            .upsert_synced_entity(&SyncedEntity {
                sync_id,
                entity_id: "page-1".to_string(),
                db_entity_id: Uuid::new_v4(),
                hash: "h1".to_string(),
                last_sync_job_id: job_two,
            })
            .await
            .unwrap();

        let stale = store
            .list_stale_synced_entities(sync_id, job_two)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].entity_id, "page-2");
    }
}
