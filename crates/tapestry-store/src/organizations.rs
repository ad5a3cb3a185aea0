use crate::Store;
use anyhow::{Context, Result};
use tapestry_core::model::Organization;
use uuid::Uuid;

impl Store {
    pub async fn create_organization(&self, org: &Organization) -> Result<()> {
        let flags = serde_json::to_string(&org.feature_flags)?;
        sqlx::query("INSERT INTO organizations (id, name, feature_flags) VALUES (?, ?, ?)")
            .bind(org.id.to_string())
            .bind(&org.name)
            .bind(flags)
            .execute(&self.pool)
            .await
            .context("insert organization")?;
        Ok(())
    }

    pub async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, name, feature_flags FROM organizations WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(id, name, flags)| {
            Ok(Organization {
                id: Uuid::parse_str(&id)?,
                name,
                feature_flags: serde_json::from_str(&flags)?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_an_organization() {
        let store = Store::in_memory().await.unwrap();
        let org = Organization {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            feature_flags: vec!["federated_search".to_string()],
        };
        store.create_organization(&org).await.unwrap();

        let fetched = store.get_organization(org.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Acme");
        assert!(fetched.has_flag("federated_search"));
    }

    #[tokio::test]
    async fn missing_organization_is_none() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.get_organization(Uuid::new_v4()).await.unwrap().is_none());
    }
}
