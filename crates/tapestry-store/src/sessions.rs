//! `connection_init_sessions` (30-minute OAuth browser-flow state) and
//! `redirect_sessions` (24-hour short-code proxy) CRUD.

use crate::Store;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tapestry_core::model::{ConnectionInitSession, InitSessionStatus, RedirectSession};
use uuid::Uuid;

impl Store {
    pub async fn create_init_session(&self, session: &ConnectionInitSession) -> Result<()> {
        let overrides = serde_json::to_string(&session.overrides)?;
        sqlx::query(
            "INSERT INTO connection_init_sessions
             (id, organization_id, short_name, state, payload, overrides, status, expires_at,
              redirect_session_id, source_connection_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.organization_id.to_string())
        .bind(&session.short_name)
        .bind(&session.state)
        .bind(session.payload.to_string())
        .bind(overrides)
        .bind(status_to_str(session.status.clone()))
        .bind(session.expires_at.to_rfc3339())
        .bind(&session.redirect_session_id)
        .bind(session.source_connection_id.to_string())
        .execute(&self.pool)
        .await
        .context("insert connection_init_session")?;
        Ok(())
    }

    /// Looks a session up by its correlation `state` token, the only thing
    /// the provider callback gives us back (§4.1).
    pub async fn get_init_session_by_state(
        &self,
        state: &str,
    ) -> Result<Option<ConnectionInitSession>> {
        let row: Option<(
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            String,
        )> = sqlx::query_as(
            "SELECT id, organization_id, short_name, state, payload, overrides, status,
                    expires_at, redirect_session_id, source_connection_id
             FROM connection_init_sessions WHERE state = ?",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;
        row.map(init_session_from_row).transpose()
    }

    pub async fn mark_init_session_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE connection_init_sessions SET status = ? WHERE id = ?")
            .bind(status_to_str(InitSessionStatus::Completed))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("complete init session")?;
        Ok(())
    }

    pub async fn expire_stale_init_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE connection_init_sessions SET status = ?
             WHERE status = ? AND expires_at < ?",
        )
        .bind(status_to_str(InitSessionStatus::Expired))
        .bind(status_to_str(InitSessionStatus::Pending))
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("expire stale init sessions")?;
        Ok(result.rows_affected())
    }

    pub async fn create_redirect_session(&self, session: &RedirectSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO redirect_sessions (code, target_url, expires_at) VALUES (?, ?, ?)",
        )
        .bind(&session.code)
        .bind(&session.target_url)
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("insert redirect_session")?;
        Ok(())
    }

    pub async fn get_redirect_session(&self, code: &str) -> Result<Option<RedirectSession>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT code, target_url, expires_at FROM redirect_sessions WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(code, target_url, expires_at)| {
            Ok(RedirectSession {
                code,
                target_url,
                expires_at: DateTime::parse_from_rfc3339(&expires_at)?.with_timezone(&Utc),
            })
        })
        .transpose()
    }
}

fn status_to_str(status: InitSessionStatus) -> &'static str {
    match status {
        InitSessionStatus::Pending => "pending",
        InitSessionStatus::Completed => "completed",
        InitSessionStatus::Expired => "expired",
    }
}

fn status_from_str(s: &str) -> Result<InitSessionStatus> {
    Ok(match s {
        "pending" => InitSessionStatus::Pending,
        "completed" => InitSessionStatus::Completed,
        "expired" => InitSessionStatus::Expired,
        other => anyhow::bail!("unknown init session status {other}"),
    })
}

#[allow(clippy::type_complexity)]
fn init_session_from_row(
    row: (
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        String,
    ),
) -> Result<ConnectionInitSession> {
    let (
        id,
        organization_id,
        short_name,
        state,
        payload,
        overrides,
        status,
        expires_at,
        redirect_session_id,
        source_connection_id,
    ) = row;
    let overrides: HashMap<String, String> = serde_json::from_str(&overrides)?;
    Ok(ConnectionInitSession {
        id: Uuid::parse_str(&id)?,
        organization_id: Uuid::parse_str(&organization_id)?,
        short_name,
        state,
        payload: serde_json::from_str(&payload)?,
        overrides,
        status: status_from_str(&status)?,
        expires_at: DateTime::parse_from_rfc3339(&expires_at)?.with_timezone(&Utc),
        redirect_session_id,
        source_connection_id: Uuid::parse_str(&source_connection_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_core::model::Organization;

    #[tokio::test]
    async fn looks_up_an_init_session_by_its_state_token() {
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

        let session = ConnectionInitSession {
            id: Uuid::new_v4(),
            organization_id: org_id,
            short_name: "notion".to_string(),
            state: "opaque-state-token".to_string(),
            payload: serde_json::json!({"name": "Acme Notion"}),
            overrides: HashMap::new(),
            status: InitSessionStatus::Pending,
            expires_at: Utc::now() + chrono::Duration::minutes(30),
            redirect_session_id: None,
            source_connection_id: Uuid::new_v4(),
        };
        store.create_init_session(&session).await.unwrap();

        let fetched = store
            .get_init_session_by_state("opaque-state-token")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.short_name, "notion");

        store.mark_init_session_completed(fetched.id).await.unwrap();
        let fetched = store
            .get_init_session_by_state("opaque-state-token")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, InitSessionStatus::Completed);
    }

    #[tokio::test]
    async fn expires_stale_pending_sessions() {
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
        let session = ConnectionInitSession {
            id: Uuid::new_v4(),
            organization_id: org_id,
            short_name: "notion".to_string(),
            state: "expired-token".to_string(),
            payload: serde_json::json!({}),
            overrides: HashMap::new(),
            status: InitSessionStatus::Pending,
            expires_at: Utc::now() - chrono::Duration::minutes(1),
            redirect_session_id: None,
            source_connection_id: Uuid::new_v4(),
        };
        store.create_init_session(&session).await.unwrap();

        let affected = store.expire_stale_init_sessions(Utc::now()).await.unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn round_trips_a_redirect_session() {
        let store = Store::in_memory().await.unwrap();
        let session = RedirectSession {
            code: "abc123".to_string(),
            target_url: "https://provider.example/oauth/authorize?state=abc".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        };
        store.create_redirect_session(&session).await.unwrap();

        let fetched = store.get_redirect_session("abc123").await.unwrap().unwrap();
        assert_eq!(fetched.target_url, session.target_url);
    }
}
