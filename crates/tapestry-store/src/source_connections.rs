use crate::Store;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tapestry_core::model::{AuthenticationMethod, ConnectionState, SourceConnection};
use uuid::Uuid;

type Row = (
    String,         // id
    String,         // organization_id
    String,         // collection_readable_id
    String,         // short_name
    String,         // name
    Option<String>, // description
    String,         // auth_method
    String,         // state
    i64,            // is_authenticated
    String,         // config_fields
    Option<String>, // credential_id
    Option<String>, // sync_id
    Option<String>, // cron_schedule
    Option<String>, // cursor_data
    Option<String>, // readable_auth_provider_id
    Option<String>, // auth_provider_config
    Option<String>, // connection_init_session_id
    String,         // created_at
    String,         // updated_at
);

const SELECT_COLUMNS: &str = "id, organization_id, collection_readable_id, short_name, name,
    description, auth_method, state, is_authenticated, config_fields, credential_id, sync_id,
    cron_schedule, cursor_data, readable_auth_provider_id, auth_provider_config,
    connection_init_session_id, created_at, updated_at";

impl Store {
    pub async fn create_source_connection(&self, conn: &SourceConnection) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO source_connections ({SELECT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(conn.id.to_string())
        .bind(conn.organization_id.to_string())
        .bind(&conn.collection_readable_id)
        .bind(&conn.short_name)
        .bind(&conn.name)
        .bind(&conn.description)
        .bind(auth_method_to_str(conn.auth_method))
        .bind(state_to_str(conn.state))
        .bind(conn.is_authenticated as i64)
        .bind(conn.config_fields.to_string())
        .bind(conn.credential_id.map(|id| id.to_string()))
        .bind(conn.sync_id.map(|id| id.to_string()))
        .bind(&conn.cron_schedule)
        .bind(conn.cursor_data.as_ref().map(|v| v.to_string()))
        .bind(&conn.readable_auth_provider_id)
        .bind(conn.auth_provider_config.as_ref().map(|v| v.to_string()))
        .bind(conn.connection_init_session_id.map(|id| id.to_string()))
        .bind(conn.created_at.to_rfc3339())
        .bind(conn.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("insert source_connection")?;
        Ok(())
    }

    pub async fn get_source_connection(&self, id: Uuid) -> Result<Option<SourceConnection>> {
        let row: Option<Row> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM source_connections WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(source_connection_from_row).transpose()
    }

    pub async fn list_source_connections_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<SourceConnection>> {
        let rows: Vec<Row> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM source_connections WHERE organization_id = ?
             ORDER BY created_at"
        ))
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(source_connection_from_row).collect()
    }

    pub async fn list_source_connections_for_collection(
        &self,
        collection_readable_id: &str,
    ) -> Result<Vec<SourceConnection>> {
        let rows: Vec<Row> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM source_connections WHERE collection_readable_id = ?
             ORDER BY created_at"
        ))
        .bind(collection_readable_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(source_connection_from_row).collect()
    }

    /// Transitions `id` to `to`, rejecting the call outright if the current
    /// state doesn't allow it (§4.1 state machine).
    pub async fn transition_source_connection_state(
        &self,
        id: Uuid,
        to: ConnectionState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let current = self
            .get_source_connection(id)
            .await?
            .with_context(|| format!("source_connection {id} not found"))?;
        anyhow::ensure!(
            current.state.can_transition_to(to),
            "illegal transition {:?} -> {:?}",
            current.state,
            to
        );
        sqlx::query("UPDATE source_connections SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state_to_str(to))
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("update source_connection state")?;
        Ok(())
    }

    pub async fn mark_source_connection_authenticated(
        &self,
        id: Uuid,
        credential_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE source_connections
             SET is_authenticated = 1, credential_id = ?, state = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(credential_id.to_string())
        .bind(state_to_str(ConnectionState::Authenticated))
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("mark source_connection authenticated")?;
        Ok(())
    }

    pub async fn update_cursor_data(
        &self,
        id: Uuid,
        cursor: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE source_connections SET cursor_data = ?, updated_at = ? WHERE id = ?")
            .bind(cursor.to_string())
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("update source_connection cursor")?;
        Ok(())
    }

    pub async fn attach_sync_id(&self, id: Uuid, sync_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE source_connections SET sync_id = ?, updated_at = ? WHERE id = ?")
            .bind(sync_id.to_string())
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("attach sync_id")?;
        Ok(())
    }

    /// Deletes the Source Connection. The caller is responsible for the
    /// delete cascade's remaining steps (provider token revocation, vector
    /// point deletion, sync/job rows) since those span other stores.
    pub async fn delete_source_connection(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM source_connections WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("delete source_connection")?;
        Ok(())
    }
}

fn auth_method_to_str(method: AuthenticationMethod) -> &'static str {
    match method {
        AuthenticationMethod::Direct => "direct",
        AuthenticationMethod::OauthBrowser => "oauth_browser",
        AuthenticationMethod::OauthToken => "oauth_token",
        AuthenticationMethod::OauthByoc => "oauth_byoc",
        AuthenticationMethod::AuthProvider => "auth_provider",
    }
}

fn auth_method_from_str(s: &str) -> Result<AuthenticationMethod> {
    Ok(match s {
        "direct" => AuthenticationMethod::Direct,
        "oauth_browser" => AuthenticationMethod::OauthBrowser,
        "oauth_token" => AuthenticationMethod::OauthToken,
        "oauth_byoc" => AuthenticationMethod::OauthByoc,
        "auth_provider" => AuthenticationMethod::AuthProvider,
        other => anyhow::bail!("unknown auth_method {other}"),
    })
}

fn state_to_str(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Creating => "creating",
        ConnectionState::PendingAuth => "pending_auth",
        ConnectionState::Authenticated => "authenticated",
        ConnectionState::Scheduled => "scheduled",
        ConnectionState::Running => "running",
        ConnectionState::Expired => "expired",
        ConnectionState::Deleted => "deleted",
    }
}

fn state_from_str(s: &str) -> Result<ConnectionState> {
    Ok(match s {
        "creating" => ConnectionState::Creating,
        "pending_auth" => ConnectionState::PendingAuth,
        "authenticated" => ConnectionState::Authenticated,
        "scheduled" => ConnectionState::Scheduled,
        "running" => ConnectionState::Running,
        "expired" => ConnectionState::Expired,
        "deleted" => ConnectionState::Deleted,
        other => anyhow::bail!("unknown connection state {other}"),
    })
}

fn source_connection_from_row(row: Row) -> Result<SourceConnection> {
    let (
        id,
        organization_id,
        collection_readable_id,
        short_name,
        name,
        description,
        auth_method,
        state,
        is_authenticated,
        config_fields,
        credential_id,
        sync_id,
        cron_schedule,
        cursor_data,
        readable_auth_provider_id,
        auth_provider_config,
        connection_init_session_id,
        created_at,
        updated_at,
    ) = row;

    Ok(SourceConnection {
        id: Uuid::parse_str(&id)?,
        organization_id: Uuid::parse_str(&organization_id)?,
        collection_readable_id,
        short_name,
        name,
        description,
        auth_method: auth_method_from_str(&auth_method)?,
        state: state_from_str(&state)?,
        is_authenticated: is_authenticated != 0,
        config_fields: serde_json::from_str(&config_fields)?,
        credential_id: credential_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        sync_id: sync_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        cron_schedule,
        cursor_data: cursor_data.map(|s| serde_json::from_str(&s)).transpose()?,
        readable_auth_provider_id,
        auth_provider_config: auth_provider_config
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
        connection_init_session_id: connection_init_session_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()?,
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_core::model::Organization;

    fn sample(organization_id: Uuid) -> SourceConnection {
        let now = Utc::now();
        SourceConnection {
            id: Uuid::new_v4(),
            organization_id,
            collection_readable_id: "acme-docs".to_string(),
            short_name: "notion".to_string(),
            name: "Acme Notion".to_string(),
            description: None,
            auth_method: AuthenticationMethod::OauthBrowser,
            state: ConnectionState::Creating,
            is_authenticated: false,
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
        }
    }

    #[tokio::test]
    async fn round_trips_and_transitions_state() {
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

        let conn = sample(org_id);
        store.create_source_connection(&conn).await.unwrap();

        let credential_id = Uuid::new_v4();
        store
            .mark_source_connection_authenticated(conn.id, credential_id, Utc::now())
            .await
            .unwrap();

        let fetched = store.get_source_connection(conn.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, ConnectionState::Authenticated);
        assert!(fetched.is_authenticated);
        assert_eq!(fetched.credential_id, Some(credential_id));

        store
            .transition_source_connection_state(conn.id, ConnectionState::Scheduled, Utc::now())
            .await
            .unwrap();
        let fetched = store.get_source_connection(conn.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, ConnectionState::Scheduled);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
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
        let conn = sample(org_id);
        store.create_source_connection(&conn).await.unwrap();

        let result = store
            .transition_source_connection_state(conn.id, ConnectionState::Running, Utc::now())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cursor_data_round_trips() {
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
        let conn = sample(org_id);
        store.create_source_connection(&conn).await.unwrap();

        let cursor = serde_json::json!({"last_edited_time": "2026-01-01T00:00:00Z"});
        store.update_cursor_data(conn.id, &cursor, Utc::now()).await.unwrap();

        let fetched = store.get_source_connection(conn.id).await.unwrap().unwrap();
        assert_eq!(fetched.cursor_data.unwrap(), cursor);
    }

    #[tokio::test]
    async fn lists_only_connections_in_the_collection() {
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
        store.create_source_connection(&sample(org_id)).await.unwrap();
        let mut other = sample(org_id);
        other.id = Uuid::new_v4();
        other.collection_readable_id = "other-docs".to_string();
        store.create_source_connection(&other).await.unwrap();

        let found = store
            .list_source_connections_for_collection("acme-docs")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].collection_readable_id, "acme-docs");
    }
}
