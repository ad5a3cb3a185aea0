use crate::Store;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tapestry_core::model::{Sync, SyncJob, SyncJobCounters, SyncJobStatus};
use uuid::Uuid;

impl Store {
    pub async fn create_sync(&self, sync: &Sync) -> Result<()> {
        sqlx::query(
            "INSERT INTO syncs (id, source_connection_id, collection_id, cron_schedule, next_scheduled_run)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(sync.id.to_string())
        .bind(sync.source_connection_id.to_string())
        .bind(sync.collection_id.to_string())
        .bind(&sync.cron_schedule)
        .bind(sync.next_scheduled_run.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("insert sync")?;
        Ok(())
    }

    pub async fn get_sync(&self, id: Uuid) -> Result<Option<Sync>> {
        let row: Option<(String, String, String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT id, source_connection_id, collection_id, cron_schedule, next_scheduled_run
             FROM syncs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(sync_from_row).transpose()
    }

    pub async fn update_sync_schedule(
        &self,
        id: Uuid,
        cron_schedule: Option<&str>,
        next_scheduled_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE syncs SET cron_schedule = ?, next_scheduled_run = ? WHERE id = ?")
            .bind(cron_schedule)
            .bind(next_scheduled_run.map(|t| t.to_rfc3339()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("update sync schedule")?;
        Ok(())
    }

    pub async fn delete_sync(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM syncs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("delete sync")?;
        Ok(())
    }

    pub async fn create_sync_job(&self, job: &SyncJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_jobs
             (id, sync_id, status, started_at, completed_at, inserted, updated, deleted, kept,
              skipped, error, force_full_sync)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(job.sync_id.to_string())
        .bind(status_to_str(job.status))
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(job.counters.inserted as i64)
        .bind(job.counters.updated as i64)
        .bind(job.counters.deleted as i64)
        .bind(job.counters.kept as i64)
        .bind(job.counters.skipped as i64)
        .bind(&job.error)
        .bind(job.force_full_sync as i64)
        .execute(&self.pool)
        .await
        .context("insert sync_job")?;
        Ok(())
    }

    pub async fn get_sync_job(&self, id: Uuid) -> Result<Option<SyncJob>> {
        let row: Option<SyncJobRow> = sqlx::query_as(
            "SELECT id, sync_id, status, started_at, completed_at, inserted, updated, deleted,
                    kept, skipped, error, force_full_sync
             FROM sync_jobs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(sync_job_from_row).transpose()
    }

    pub async fn list_sync_jobs_for_sync(&self, sync_id: Uuid) -> Result<Vec<SyncJob>> {
        let rows: Vec<SyncJobRow> = sqlx::query_as(
            "SELECT id, sync_id, status, started_at, completed_at, inserted, updated, deleted,
                    kept, skipped, error, force_full_sync
             FROM sync_jobs WHERE sync_id = ? ORDER BY started_at DESC",
        )
        .bind(sync_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(sync_job_from_row).collect()
    }

    /// Transitions a Sync Job's status, rejecting moves the §8 subsequence
    /// property disallows, and stamps `started_at`/`completed_at` as the
    /// transition crosses into `running` or a terminal state.
    pub async fn transition_sync_job_status(
        &self,
        id: Uuid,
        to: SyncJobStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let current = self
            .get_sync_job(id)
            .await?
            .with_context(|| format!("sync_job {id} not found"))?;
        anyhow::ensure!(
            current.status.can_transition_to(to),
            "illegal sync job transition {:?} -> {:?}",
            current.status,
            to
        );

        let started_at = if to == SyncJobStatus::Running {
            Some(now)
        } else {
            current.started_at
        };
        let completed_at = if to.is_terminal() { Some(now) } else { None };

        sqlx::query(
            "UPDATE sync_jobs SET status = ?, started_at = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status_to_str(to))
        .bind(started_at.map(|t| t.to_rfc3339()))
        .bind(completed_at.map(|t| t.to_rfc3339()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("transition sync_job status")?;
        Ok(())
    }

    pub async fn update_sync_job_counters(
        &self,
        id: Uuid,
        counters: SyncJobCounters,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET inserted = ?, updated = ?, deleted = ?, kept = ?, skipped = ?
             WHERE id = ?",
        )
        .bind(counters.inserted as i64)
        .bind(counters.updated as i64)
        .bind(counters.deleted as i64)
        .bind(counters.kept as i64)
        .bind(counters.skipped as i64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("update sync_job counters")?;
        Ok(())
    }

    pub async fn fail_sync_job(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET status = ?, error = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status_to_str(SyncJobStatus::Failed))
        .bind(error)
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("fail sync_job")?;
        Ok(())
    }
}

type SyncJobRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
    i64,
    i64,
    i64,
    Option<String>,
    i64,
);

fn status_to_str(status: SyncJobStatus) -> &'static str {
    match status {
        SyncJobStatus::Pending => "pending",
        SyncJobStatus::Running => "running",
        SyncJobStatus::Completed => "completed",
        SyncJobStatus::Failed => "failed",
        SyncJobStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Result<SyncJobStatus> {
    Ok(match s {
        "pending" => SyncJobStatus::Pending,
        "running" => SyncJobStatus::Running,
        "completed" => SyncJobStatus::Completed,
        "failed" => SyncJobStatus::Failed,
        "cancelled" => SyncJobStatus::Cancelled,
        other => anyhow::bail!("unknown sync job status {other}"),
    })
}

fn sync_from_row(
    row: (String, String, String, Option<String>, Option<String>),
) -> Result<Sync> {
    let (id, source_connection_id, collection_id, cron_schedule, next_scheduled_run) = row;
    Ok(Sync {
        id: Uuid::parse_str(&id)?,
        source_connection_id: Uuid::parse_str(&source_connection_id)?,
        collection_id: Uuid::parse_str(&collection_id)?,
        cron_schedule,
        next_scheduled_run: next_scheduled_run
            .map(|s| -> Result<DateTime<Utc>> { Ok(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc)) })
            .transpose()?,
    })
}

fn sync_job_from_row(row: SyncJobRow) -> Result<SyncJob> {
    let (id, sync_id, status, started_at, completed_at, inserted, updated, deleted, kept, skipped, error, force_full_sync) =
        row;
    Ok(SyncJob {
        id: Uuid::parse_str(&id)?,
        sync_id: Uuid::parse_str(&sync_id)?,
        status: status_from_str(&status)?,
        started_at: started_at
            .map(|s| -> Result<DateTime<Utc>> { Ok(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc)) })
            .transpose()?,
        completed_at: completed_at
            .map(|s| -> Result<DateTime<Utc>> { Ok(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc)) })
            .transpose()?,
        counters: SyncJobCounters {
            inserted: inserted as u64,
            updated: updated as u64,
            deleted: deleted as u64,
            kept: kept as u64,
            skipped: skipped as u64,
        },
        error,
        force_full_sync: force_full_sync != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_core::model::{AuthenticationMethod, Collection, ConnectionState, Organization, SourceConnection};

    async fn seeded_sync() -> (Store, Sync) {
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
        let conn = SourceConnection {
            id: Uuid::new_v4(),
            organization_id: org_id,
            collection_readable_id: collection.readable_id.clone(),
            short_name: "notion".to_string(),
            name: "Acme Notion".to_string(),
            description: None,
            auth_method: AuthenticationMethod::OauthBrowser,
            state: ConnectionState::Authenticated,
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
        store.create_source_connection(&conn).await.unwrap();

        let sync = Sync {
            id: Uuid::new_v4(),
            source_connection_id: conn.id,
            collection_id: collection.id,
            cron_schedule: Some("0 */6 * * *".to_string()),
            next_scheduled_run: None,
        };
        store.create_sync(&sync).await.unwrap();
        (store, sync)
    }

    #[tokio::test]
    async fn round_trips_a_sync_and_runs_a_job_through_its_lifecycle() {
        let (store, sync) = seeded_sync().await;

        let job = SyncJob::new(sync.id, false);
        store.create_sync_job(&job).await.unwrap();

        store
            .transition_sync_job_status(job.id, SyncJobStatus::Running, Utc::now())
            .await
            .unwrap();
        let running = store.get_sync_job(job.id).await.unwrap().unwrap();
        assert!(running.started_at.is_some());

        store
            .update_sync_job_counters(
                job.id,
                SyncJobCounters {
                    inserted: 3,
                    updated: 1,
                    deleted: 0,
                    kept: 5,
                    skipped: 2,
                },
            )
            .await
            .unwrap();

        store
            .transition_sync_job_status(job.id, SyncJobStatus::Completed, Utc::now())
            .await
            .unwrap();
        let completed = store.get_sync_job(job.id).await.unwrap().unwrap();
        assert_eq!(completed.status, SyncJobStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(completed.counters.inserted, 3);
    }

    #[tokio::test]
    async fn cannot_skip_from_pending_straight_to_completed() {
        let (store, sync) = seeded_sync().await;
        let job = SyncJob::new(sync.id, false);
        store.create_sync_job(&job).await.unwrap();

        let result = store
            .transition_sync_job_status(job.id, SyncJobStatus::Completed, Utc::now())
            .await;
        assert!(result.is_err());
    }
}
