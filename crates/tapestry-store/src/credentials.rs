//! `integration_credentials` CRUD, plus the store-side implementation of
//! `tapestry_auth::token::CredentialPersister` that lets a Token Manager
//! write a refreshed token straight back to its row.

use crate::Store;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tapestry_auth::cipher::SecretCipher;
use tapestry_auth::token::CredentialPersister;
use tapestry_auth::{AuthError, AuthResult, AuthToken, OAuthTokenType};
use tapestry_core::model::{AuthenticationMethod, IntegrationCredential};
use uuid::Uuid;

impl Store {
    pub async fn create_integration_credential(
        &self,
        credential: &IntegrationCredential,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO integration_credentials
             (id, organization_id, integration_short_name, auth_method, oauth_type,
              encrypted_credentials, auth_config_class)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(credential.id.to_string())
        .bind(credential.organization_id.to_string())
        .bind(&credential.integration_short_name)
        .bind(auth_method_to_str(credential.auth_method))
        .bind(credential.oauth_type.map(oauth_type_to_str))
        .bind(&credential.encrypted_credentials)
        .bind(&credential.auth_config_class)
        .execute(&self.pool)
        .await
        .context("insert integration_credential")?;
        Ok(())
    }

    pub async fn get_integration_credential(
        &self,
        id: Uuid,
    ) -> Result<Option<IntegrationCredential>> {
        let row: Option<(String, String, String, String, Option<String>, String, Option<String>)> =
            sqlx::query_as(
                "SELECT id, organization_id, integration_short_name, auth_method, oauth_type,
                        encrypted_credentials, auth_config_class
                 FROM integration_credentials WHERE id = ?",
            )
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(credential_from_row).transpose()
    }

    pub async fn update_encrypted_credentials(&self, id: Uuid, blob: &str) -> Result<()> {
        sqlx::query("UPDATE integration_credentials SET encrypted_credentials = ? WHERE id = ?")
            .bind(blob)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("update integration_credential")?;
        Ok(())
    }

    pub async fn delete_integration_credential(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM integration_credentials WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("delete integration_credential")?;
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

fn oauth_type_to_str(t: OAuthTokenType) -> &'static str {
    match t {
        OAuthTokenType::None => "none",
        OAuthTokenType::AccessOnly => "access_only",
        OAuthTokenType::WithRefresh => "with_refresh",
        OAuthTokenType::WithRotatingRefresh => "with_rotating_refresh",
    }
}

fn credential_from_row(
    row: (String, String, String, String, Option<String>, String, Option<String>),
) -> Result<IntegrationCredential> {
    let (id, organization_id, integration_short_name, auth_method, oauth_type, encrypted, auth_config_class) =
        row;
    Ok(IntegrationCredential {
        id: Uuid::parse_str(&id)?,
        organization_id: Uuid::parse_str(&organization_id)?,
        integration_short_name,
        auth_method: match auth_method.as_str() {
            "direct" => AuthenticationMethod::Direct,
            "oauth_browser" => AuthenticationMethod::OauthBrowser,
            "oauth_token" => AuthenticationMethod::OauthToken,
            "oauth_byoc" => AuthenticationMethod::OauthByoc,
            "auth_provider" => AuthenticationMethod::AuthProvider,
            other => anyhow::bail!("unknown auth_method {other}"),
        },
        oauth_type: oauth_type
            .map(|s| match s.as_str() {
                "none" => Ok(OAuthTokenType::None),
                "access_only" => Ok(OAuthTokenType::AccessOnly),
                "with_refresh" => Ok(OAuthTokenType::WithRefresh),
                "with_rotating_refresh" => Ok(OAuthTokenType::WithRotatingRefresh),
                other => anyhow::bail!("unknown oauth_type {other}"),
            })
            .transpose()?,
        encrypted_credentials: encrypted,
        auth_config_class,
    })
}

/// Binds a Token Manager to one `integration_credentials` row: every refresh
/// it performs is re-encrypted and written back here.
pub struct StoreCredentialPersister {
    store: Store,
    cipher: Arc<dyn SecretCipher>,
    credential_id: Uuid,
}

impl StoreCredentialPersister {
    pub fn new(store: Store, cipher: Arc<dyn SecretCipher>, credential_id: Uuid) -> Self {
        Self {
            store,
            cipher,
            credential_id,
        }
    }
}

#[async_trait]
impl CredentialPersister for StoreCredentialPersister {
    async fn persist_refreshed(&self, token: &AuthToken) -> AuthResult<()> {
        let mut fields = std::collections::HashMap::new();
        fields.insert("access_token".to_string(), token.access_token.clone());
        if let Some(refresh) = &token.refresh_token {
            fields.insert("refresh_token".to_string(), refresh.clone());
        }
        if let Some(expires_at) = token.expires_at {
            fields.insert("expires_at".to_string(), expires_at.to_rfc3339());
        }
        if let Some(secret) = &token.token_secret {
            fields.insert("token_secret".to_string(), secret.clone());
        }

        let blob = self
            .cipher
            .encrypt(&fields)
            .map_err(|e| AuthError::Cipher(e.to_string()))?;

        self.store
            .update_encrypted_credentials(self.credential_id, &blob)
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapestry_auth::cipher::AesGcmCipher;
    use tapestry_core::model::Organization;

    async fn seeded_store() -> (Store, Uuid, Uuid) {
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
        let credential = IntegrationCredential {
            id: Uuid::new_v4(),
            organization_id: org_id,
            integration_short_name: "notion".to_string(),
            auth_method: AuthenticationMethod::OauthBrowser,
            oauth_type: Some(OAuthTokenType::WithRefresh),
            encrypted_credentials: "seed".to_string(),
            auth_config_class: None,
        };
        store.create_integration_credential(&credential).await.unwrap();
        (store, org_id, credential.id)
    }

    #[tokio::test]
    async fn round_trips_a_credential() {
        let (store, _org_id, credential_id) = seeded_store().await;
        let fetched = store
            .get_integration_credential(credential_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.integration_short_name, "notion");
        assert_eq!(fetched.oauth_type, Some(OAuthTokenType::WithRefresh));
    }

    #[tokio::test]
    async fn persister_reencrypts_and_overwrites_the_row() {
        let (store, _org_id, credential_id) = seeded_store().await;
        let cipher: Arc<dyn SecretCipher> = Arc::new(AesGcmCipher::new(&[3u8; 32]));
        let persister = StoreCredentialPersister::new(store.clone(), cipher.clone(), credential_id);

        let refreshed = AuthToken {
            access_token: "new-token".to_string(),
            refresh_token: Some("new-refresh".to_string()),
            expires_at: None,
            scope: None,
            token_type: Some("Bearer".to_string()),
            token_secret: None,
        };
        persister.persist_refreshed(&refreshed).await.unwrap();

        let updated = store
            .get_integration_credential(credential_id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(updated.encrypted_credentials, "seed");
        let decrypted = cipher.decrypt(&updated.encrypted_credentials).unwrap();
        assert_eq!(decrypted.get("access_token").unwrap(), "new-token");
    }
}
