use crate::Store;
use anyhow::{Context, Result};
use tapestry_core::model::Collection;
use uuid::Uuid;

impl Store {
    pub async fn create_collection(&self, collection: &Collection) -> Result<()> {
        sqlx::query(
            "INSERT INTO collections (id, readable_id, name, vector_size, organization_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection.id.to_string())
        .bind(&collection.readable_id)
        .bind(&collection.name)
        .bind(collection.vector_size as i64)
        .bind(collection.organization_id.to_string())
        .execute(&self.pool)
        .await
        .context("insert collection")?;
        Ok(())
    }

    pub async fn get_collection_by_readable_id(
        &self,
        readable_id: &str,
    ) -> Result<Option<Collection>> {
        let row: Option<(String, String, String, i64, String)> = sqlx::query_as(
            "SELECT id, readable_id, name, vector_size, organization_id
             FROM collections WHERE readable_id = ?",
        )
        .bind(readable_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::collection_from_row).transpose()
    }

    pub async fn get_collection(&self, id: Uuid) -> Result<Option<Collection>> {
        let row: Option<(String, String, String, i64, String)> = sqlx::query_as(
            "SELECT id, readable_id, name, vector_size, organization_id
             FROM collections WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::collection_from_row).transpose()
    }

    fn collection_from_row(row: (String, String, String, i64, String)) -> Result<Collection> {
        let (id, readable_id, name, vector_size, organization_id) = row;
        Ok(Collection {
            id: Uuid::parse_str(&id)?,
            readable_id,
            name,
            vector_size: vector_size as u32,
            organization_id: Uuid::parse_str(&organization_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_core::model::Organization;

    async fn seeded_store() -> (Store, Uuid) {
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
        (store, org_id)
    }

    #[tokio::test]
    async fn round_trips_by_readable_id() {
        let (store, org_id) = seeded_store().await;
        let collection = Collection {
            id: Uuid::new_v4(),
            readable_id: "acme-docs".to_string(),
            name: "Acme Docs".to_string(),
            vector_size: 384,
            organization_id: org_id,
        };
        store.create_collection(&collection).await.unwrap();

        let fetched = store
            .get_collection_by_readable_id("acme-docs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.vector_size, 384);
    }
}
