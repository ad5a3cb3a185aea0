//! Connection setup and schema for the relational store. One SQLite
//! database per deployment; the query language itself is an external
//! concern (§1), so this sticks to sqlx's query builder the way the
//! teacher's ingestion engine does rather than introducing an ORM.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str("sqlite:")?
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip_all)]
    async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON;")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                feature_flags TEXT NOT NULL DEFAULT '[]'
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                readable_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                vector_size INTEGER NOT NULL,
                organization_id TEXT NOT NULL REFERENCES organizations(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS integration_credentials (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                integration_short_name TEXT NOT NULL,
                auth_method TEXT NOT NULL,
                oauth_type TEXT,
                encrypted_credentials TEXT NOT NULL,
                auth_config_class TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS source_connections (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                collection_readable_id TEXT NOT NULL,
                short_name TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                auth_method TEXT NOT NULL,
                state TEXT NOT NULL,
                is_authenticated INTEGER NOT NULL DEFAULT 0,
                config_fields TEXT NOT NULL DEFAULT '{}',
                credential_id TEXT REFERENCES integration_credentials(id),
                sync_id TEXT,
                cron_schedule TEXT,
                cursor_data TEXT,
                readable_auth_provider_id TEXT,
                auth_provider_config TEXT,
                connection_init_session_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connection_init_sessions (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                short_name TEXT NOT NULL,
                state TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                overrides TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                redirect_session_id TEXT,
                source_connection_id TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS redirect_sessions (
                code TEXT PRIMARY KEY,
                target_url TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS syncs (
                id TEXT PRIMARY KEY,
                source_connection_id TEXT NOT NULL REFERENCES source_connections(id),
                collection_id TEXT NOT NULL REFERENCES collections(id),
                cron_schedule TEXT,
                next_scheduled_run TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_jobs (
                id TEXT PRIMARY KEY,
                sync_id TEXT NOT NULL REFERENCES syncs(id),
                status TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                inserted INTEGER NOT NULL DEFAULT 0,
                updated INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                kept INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                force_full_sync INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_jobs_sync_id ON sync_jobs(sync_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS synced_entities (
                sync_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                db_entity_id TEXT NOT NULL,
                hash TEXT NOT NULL,
                last_sync_job_id TEXT NOT NULL,
                PRIMARY KEY (sync_id, entity_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_synced_entities_sync_id ON synced_entities(sync_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
