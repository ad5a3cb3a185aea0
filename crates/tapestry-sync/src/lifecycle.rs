//! Source Connection lifecycle (§4.1): the state machine that turns a
//! creation request into a scheduled, periodically running connection, and
//! that cleanly tears one down.
//!
//! Generalizes the grounding source's request/session/callback handshake
//! (`source_connection_service_helpers.py`'s default-cron and
//! auth-method-inference rules, `reconstruct_context_from_session`'s
//! anonymous-callback pattern) into one typed service built over the store,
//! scheduler, and vector adapter crates rather than a single ORM session.

use anyhow::Error as AnyhowError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Timelike, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tapestry_auth::cipher::SecretCipher;
use tapestry_auth::oauth1::{OAuth1Bridge, OAuth1Config};
use tapestry_auth::oauth2_bridge::{OAuth2Bridge, OAuth2Config};
use tapestry_auth::{AuthError, AuthMethod};
use tapestry_core::driver::{DriverRegistry, SourceMetadata};
use tapestry_core::error::{CoreError, CoreResult};
use tapestry_core::model::{
    AuthenticationMethod, ConnectionInitSession, ConnectionState, InitSessionStatus,
    IntegrationCredential, RedirectSession, SourceConnection, Sync,
};
use tapestry_core::scheduler::{Scheduler, TriggerSink};
use tapestry_store::Store;
use tapestry_vector::VectorStore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

fn store_err(err: AnyhowError) -> CoreError {
    CoreError::Provider(err.to_string())
}

fn auth_err(err: AuthError) -> CoreError {
    match err {
        AuthError::Validation(msg) => CoreError::Validation(msg),
        other => CoreError::Provider(other.to_string()),
    }
}

fn random_url_safe_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Matches `_get_default_cron_schedule`: daily, at the current UTC
/// minute/hour, when the caller doesn't supply a schedule.
pub fn default_daily_cron(now: DateTime<Utc>) -> String {
    format!("{} {} * * *", now.minute(), now.hour())
}

fn to_model_auth_method(method: AuthMethod) -> AuthenticationMethod {
    match method {
        AuthMethod::Direct => AuthenticationMethod::Direct,
        AuthMethod::OauthBrowser => AuthenticationMethod::OauthBrowser,
        AuthMethod::OauthToken => AuthenticationMethod::OauthToken,
        AuthMethod::OauthByoc => AuthenticationMethod::OauthByoc,
        AuthMethod::AuthProvider => AuthenticationMethod::AuthProvider,
    }
}

fn overrides_get(overrides: &HashMap<String, String>, key: &str) -> CoreResult<String> {
    overrides
        .get(key)
        .cloned()
        .ok_or_else(|| CoreError::Conflict(format!("init session is missing {key}")))
}

/// A provider's OAuth2 authorize/token endpoints. Config files in
/// production deployments populate one of these per source declaring
/// `OauthBrowser`/`OauthByoc`; this workspace's built-in drivers register a
/// handful directly against the registry's known short names.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub supports_pkce: bool,
}

#[derive(Default)]
pub struct OAuthProviderDirectory {
    oauth2: HashMap<String, OAuthEndpoints>,
    oauth1: HashMap<String, OAuth1Config>,
    default_clients: HashMap<String, (String, String)>,
}

impl OAuthProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_oauth2(&mut self, short_name: &str, endpoints: OAuthEndpoints) {
        self.oauth2.insert(short_name.to_string(), endpoints);
    }

    pub fn register_oauth1(&mut self, short_name: &str, config: OAuth1Config) {
        self.oauth1.insert(short_name.to_string(), config);
    }

    pub fn register_default_client(&mut self, short_name: &str, client_id: &str, client_secret: &str) {
        self.default_clients
            .insert(short_name.to_string(), (client_id.to_string(), client_secret.to_string()));
    }

    fn oauth2_endpoints(&self, short_name: &str) -> CoreResult<&OAuthEndpoints> {
        self.oauth2
            .get(short_name)
            .ok_or_else(|| CoreError::Validation(format!("no OAuth endpoints configured for {short_name}")))
    }

    fn default_client(&self, short_name: &str) -> Option<&(String, String)> {
        self.default_clients.get(short_name)
    }
}

/// One tagged authentication input per §4.1's `authentication` union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthenticationInput {
    Direct {
        credentials: HashMap<String, String>,
    },
    OauthToken {
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },
    OauthBrowser {
        client_id: Option<String>,
        client_secret: Option<String>,
        redirect_url: Option<String>,
    },
    AuthProvider {
        provider_readable_id: String,
        provider_config: Option<serde_json::Value>,
    },
}

impl AuthenticationInput {
    fn requested_method(&self) -> AuthMethod {
        match self {
            Self::Direct { .. } => AuthMethod::Direct,
            Self::OauthToken { .. } => AuthMethod::OauthToken,
            Self::OauthBrowser { .. } => AuthMethod::OauthBrowser,
            Self::AuthProvider { .. } => AuthMethod::AuthProvider,
        }
    }

    fn has_client_credentials(&self) -> bool {
        matches!(
            self,
            Self::OauthBrowser {
                client_id: Some(_),
                client_secret: Some(_),
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSourceConnectionRequest {
    pub name: Option<String>,
    pub short_name: String,
    pub readable_collection_id: String,
    pub config: Option<serde_json::Value>,
    pub schedule: Option<String>,
    pub sync_immediately: Option<bool>,
    pub authentication: AuthenticationInput,
}

pub enum CreateOutcome {
    Authenticated(SourceConnection),
    PendingAuthorization {
        connection: SourceConnection,
        authorize_proxy_url: String,
        expires_at: DateTime<Utc>,
    },
}

/// Implements the §4.1 state machine: creation (direct/token/auth-provider
/// paths complete synchronously, browser/BYOC paths go through a Connection
/// Init Session), the OAuth callback handler, and the delete cascade.
pub struct LifecycleService {
    store: Store,
    registry: Arc<DriverRegistry>,
    cipher: Arc<dyn SecretCipher>,
    scheduler: Arc<dyn Scheduler>,
    vector: Arc<VectorStore>,
    trigger_sink: Arc<dyn TriggerSink>,
    oauth2: OAuth2Bridge,
    oauth1: OAuth1Bridge,
    oauth_providers: OAuthProviderDirectory,
    api_url: String,
}

impl LifecycleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        registry: Arc<DriverRegistry>,
        cipher: Arc<dyn SecretCipher>,
        scheduler: Arc<dyn Scheduler>,
        vector: Arc<VectorStore>,
        trigger_sink: Arc<dyn TriggerSink>,
        oauth_providers: OAuthProviderDirectory,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            cipher,
            scheduler,
            vector,
            trigger_sink,
            oauth2: OAuth2Bridge::new(),
            oauth1: OAuth1Bridge::new(),
            oauth_providers,
            api_url: api_url.into(),
        }
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        organization_id: Uuid,
        request: CreateSourceConnectionRequest,
    ) -> CoreResult<CreateOutcome> {
        let metadata = self.registry.metadata(&request.short_name)?.clone();

        let requested = request.authentication.requested_method();
        let resolved = metadata.infer_auth_method(requested, request.authentication.has_client_credentials())?;

        let mut declared_methods = metadata.auth_methods.clone();
        if declared_methods.contains(&AuthMethod::OauthBrowser) {
            declared_methods.push(AuthMethod::OauthByoc);
        }
        if !declared_methods.contains(&resolved) {
            return Err(CoreError::Validation(format!(
                "{} does not support {:?} authentication",
                request.short_name, resolved
            )));
        }

        let is_browser_flow = matches!(resolved, AuthMethod::OauthBrowser | AuthMethod::OauthByoc);
        let sync_immediately = match request.sync_immediately {
            Some(true) if is_browser_flow => {
                return Err(CoreError::Validation(
                    "sync_immediately cannot be requested true for a browser OAuth flow; \
                     the sync cannot start before authentication completes"
                        .to_string(),
                ));
            }
            Some(explicit) => explicit,
            None => !is_browser_flow,
        };

        let name = request
            .name
            .clone()
            .unwrap_or_else(|| format!("{} Connection", metadata.display_name));

        let now = Utc::now();
        let cron_schedule = if metadata.federated_search {
            None
        } else {
            request.schedule.clone().or_else(|| Some(default_daily_cron(now)))
        };

        let auth_method = to_model_auth_method(resolved);

        if is_browser_flow {
            let (client_id, client_secret, redirect_url) = match &request.authentication {
                AuthenticationInput::OauthBrowser {
                    client_id,
                    client_secret,
                    redirect_url,
                } => (client_id.clone(), client_secret.clone(), redirect_url.clone()),
                _ => (None, None, None),
            };
            self.start_browser_flow(
                organization_id,
                &request,
                auth_method,
                name,
                cron_schedule,
                client_id,
                client_secret,
                redirect_url,
                now,
            )
            .await
        } else {
            self.create_immediately_authenticated(
                organization_id,
                &request,
                &metadata,
                auth_method,
                name,
                cron_schedule,
                sync_immediately,
                now,
            )
            .await
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_immediately_authenticated(
        &self,
        organization_id: Uuid,
        request: &CreateSourceConnectionRequest,
        metadata: &SourceMetadata,
        auth_method: AuthenticationMethod,
        name: String,
        cron_schedule: Option<String>,
        sync_immediately: bool,
        now: DateTime<Utc>,
    ) -> CoreResult<CreateOutcome> {
        let (readable_auth_provider_id, auth_provider_config) = match &request.authentication {
            AuthenticationInput::AuthProvider {
                provider_readable_id,
                provider_config,
            } => (Some(provider_readable_id.clone()), provider_config.clone()),
            _ => (None, None),
        };

        let connection_id = Uuid::new_v4();
        let mut connection = SourceConnection {
            id: connection_id,
            organization_id,
            collection_readable_id: request.readable_collection_id.clone(),
            short_name: request.short_name.clone(),
            name,
            description: None,
            auth_method,
            state: ConnectionState::Creating,
            is_authenticated: false,
            config_fields: request.config.clone().unwrap_or_else(|| serde_json::json!({})),
            credential_id: None,
            sync_id: None,
            cron_schedule: cron_schedule.clone(),
            cursor_data: None,
            readable_auth_provider_id,
            auth_provider_config,
            connection_init_session_id: None,
            created_at: now,
            updated_at: now,
        };

        self.store.create_source_connection(&connection).await.map_err(store_err)?;

        match &request.authentication {
            AuthenticationInput::Direct { credentials } => {
                let blob = self.cipher.encrypt(credentials).map_err(auth_err)?;
                let credential = IntegrationCredential {
                    id: Uuid::new_v4(),
                    organization_id,
                    integration_short_name: request.short_name.clone(),
                    auth_method,
                    oauth_type: None,
                    encrypted_credentials: blob,
                    auth_config_class: None,
                };
                self.store.create_integration_credential(&credential).await.map_err(store_err)?;
                self.store
                    .mark_source_connection_authenticated(connection_id, credential.id, now)
                    .await
                    .map_err(store_err)?;
                connection.credential_id = Some(credential.id);
            }
            AuthenticationInput::OauthToken {
                access_token,
                refresh_token,
                expires_at,
            } => {
                let mut fields = HashMap::new();
                fields.insert("access_token".to_string(), access_token.clone());
                if let Some(refresh) = refresh_token {
                    fields.insert("refresh_token".to_string(), refresh.clone());
                }
                if let Some(exp) = expires_at {
                    fields.insert("expires_at".to_string(), exp.to_rfc3339());
                }
                let blob = self.cipher.encrypt(&fields).map_err(auth_err)?;
                let credential = IntegrationCredential {
                    id: Uuid::new_v4(),
                    organization_id,
                    integration_short_name: request.short_name.clone(),
                    auth_method,
                    oauth_type: Some(metadata.oauth_token_type),
                    encrypted_credentials: blob,
                    auth_config_class: None,
                };
                self.store.create_integration_credential(&credential).await.map_err(store_err)?;
                self.store
                    .mark_source_connection_authenticated(connection_id, credential.id, now)
                    .await
                    .map_err(store_err)?;
                connection.credential_id = Some(credential.id);
            }
            AuthenticationInput::AuthProvider { .. } => {
                self.store
                    .transition_source_connection_state(connection_id, ConnectionState::Authenticated, now)
                    .await
                    .map_err(store_err)?;
            }
            AuthenticationInput::OauthBrowser { .. } => {
                unreachable!("browser flow handled by start_browser_flow")
            }
        }
        connection.is_authenticated = true;
        connection.state = ConnectionState::Authenticated;

        if let Some(cron) = cron_schedule {
            self.provision_sync(&mut connection, cron, sync_immediately, now).await?;
        }

        Ok(CreateOutcome::Authenticated(connection))
    }

    async fn provision_sync(
        &self,
        connection: &mut SourceConnection,
        cron_schedule: String,
        sync_immediately: bool,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let collection = self
            .store
            .get_collection_by_readable_id(&connection.collection_readable_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| {
                CoreError::NotFound(format!("collection {} not found", connection.collection_readable_id))
            })?;

        let sync = Sync {
            id: Uuid::new_v4(),
            source_connection_id: connection.id,
            collection_id: collection.id,
            cron_schedule: Some(cron_schedule.clone()),
            next_scheduled_run: None,
        };
        self.store.create_sync(&sync).await.map_err(store_err)?;
        self.store.attach_sync_id(connection.id, sync.id, now).await.map_err(store_err)?;
        self.store
            .transition_source_connection_state(connection.id, ConnectionState::Scheduled, now)
            .await
            .map_err(store_err)?;
        connection.sync_id = Some(sync.id);
        connection.state = ConnectionState::Scheduled;

        self.scheduler.create_or_update_schedule(sync.id, &cron_schedule).await?;

        if sync_immediately {
            let job_id = self.trigger_sink.trigger(sync.id).await?;
            info!(%job_id, sync_id = %sync.id, "triggered initial sync job");
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn start_browser_flow(
        &self,
        organization_id: Uuid,
        request: &CreateSourceConnectionRequest,
        auth_method: AuthenticationMethod,
        name: String,
        cron_schedule: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
        redirect_url: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<CreateOutcome> {
        let connection_id = Uuid::new_v4();
        let connection = SourceConnection {
            id: connection_id,
            organization_id,
            collection_readable_id: request.readable_collection_id.clone(),
            short_name: request.short_name.clone(),
            name,
            description: None,
            auth_method,
            state: ConnectionState::Creating,
            is_authenticated: false,
            config_fields: request.config.clone().unwrap_or_else(|| serde_json::json!({})),
            credential_id: None,
            sync_id: None,
            cron_schedule: cron_schedule.clone(),
            cursor_data: None,
            readable_auth_provider_id: None,
            auth_provider_config: None,
            connection_init_session_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_source_connection(&connection).await.map_err(store_err)?;
        self.store
            .transition_source_connection_state(connection_id, ConnectionState::PendingAuth, now)
            .await
            .map_err(store_err)?;

        let payload = serde_json::json!({
            "name": connection.name,
            "short_name": request.short_name,
            "readable_collection_id": request.readable_collection_id,
            "config": request.config,
            "cron_schedule": cron_schedule,
        });

        let (state, authorize_target_url, overrides) = if let Some(oauth1_config) =
            self.oauth_providers.oauth1.get(&request.short_name).cloned()
        {
            let request_token = self
                .oauth1
                .obtain_request_token(&oauth1_config)
                .await
                .map_err(auth_err)?;
            let authorize_url = self.oauth1.authorize_url(&oauth1_config, &request_token.token);

            let mut overrides = HashMap::new();
            overrides.insert("flow".to_string(), "oauth1".to_string());
            overrides.insert("consumer_key".to_string(), oauth1_config.consumer_key.clone());
            overrides.insert("consumer_secret".to_string(), oauth1_config.consumer_secret.clone());
            overrides.insert("access_token_url".to_string(), oauth1_config.access_token_url.clone());
            overrides.insert("request_token".to_string(), request_token.token.clone());
            overrides.insert("request_token_secret".to_string(), request_token.token_secret.clone());

            (request_token.token, authorize_url, overrides)
        } else {
            let endpoints = self.oauth_providers.oauth2_endpoints(&request.short_name)?;
            let (resolved_client_id, resolved_client_secret) = match (client_id, client_secret) {
                (Some(id), Some(secret)) => (id, secret),
                _ => self
                    .oauth_providers
                    .default_client(&request.short_name)
                    .cloned()
                    .ok_or_else(|| {
                        CoreError::Validation(format!(
                            "{} has no default OAuth client configured and none was supplied",
                            request.short_name
                        ))
                    })?,
            };
            let redirect_uri =
                redirect_url.unwrap_or_else(|| format!("{}/source-connections/callback", self.api_url));

            let oauth_config = OAuth2Config {
                client_id: resolved_client_id.clone(),
                client_secret: resolved_client_secret.clone(),
                auth_url: endpoints.auth_url.clone(),
                token_url: endpoints.token_url.clone(),
                redirect_uri: Some(redirect_uri.clone()),
                supports_pkce: endpoints.supports_pkce,
            };
            let scopes: Vec<&str> = endpoints.scopes.iter().map(String::as_str).collect();
            let pending = self.oauth2.authorize_url(&oauth_config, &scopes).map_err(auth_err)?;

            let mut overrides = HashMap::new();
            overrides.insert("flow".to_string(), "oauth2".to_string());
            overrides.insert("client_id".to_string(), resolved_client_id);
            overrides.insert("client_secret".to_string(), resolved_client_secret);
            overrides.insert("auth_url".to_string(), endpoints.auth_url.clone());
            overrides.insert("token_url".to_string(), endpoints.token_url.clone());
            overrides.insert("redirect_uri".to_string(), redirect_uri);
            if let Some(verifier) = &pending.pkce_verifier {
                overrides.insert("pkce_verifier".to_string(), verifier.clone());
            }

            (pending.csrf_state, pending.url, overrides)
        };

        let redirect_code = random_url_safe_token(9);
        let redirect_session = RedirectSession {
            code: redirect_code.clone(),
            target_url: authorize_target_url,
            expires_at: now + Duration::hours(24),
        };
        self.store.create_redirect_session(&redirect_session).await.map_err(store_err)?;

        let session = ConnectionInitSession {
            id: Uuid::new_v4(),
            organization_id,
            short_name: request.short_name.clone(),
            state,
            payload,
            overrides,
            status: InitSessionStatus::Pending,
            expires_at: now + Duration::minutes(30),
            redirect_session_id: Some(redirect_code.clone()),
            source_connection_id: connection_id,
        };
        self.store.create_init_session(&session).await.map_err(store_err)?;

        Ok(CreateOutcome::PendingAuthorization {
            connection,
            authorize_proxy_url: format!("/source-connections/authorize/{redirect_code}"),
            expires_at: redirect_session.expires_at,
        })
    }

    /// Completes a pending browser/BYOC flow once the provider redirects
    /// back with `state` and an authorization `code` (OAuth2) or verifier
    /// (OAuth1). Anonymous: the session alone carries everything needed to
    /// resume, matching `reconstruct_context_from_session`.
    #[instrument(skip(self, code))]
    pub async fn complete_oauth_callback(&self, state: &str, code: &str) -> CoreResult<SourceConnection> {
        let session = self
            .store
            .get_init_session_by_state(state)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound("no init session for this state".to_string()))?;

        let now = Utc::now();
        if session.status != InitSessionStatus::Pending {
            return Err(CoreError::Conflict("init session already completed or expired".to_string()));
        }
        if session.is_expired(now) {
            self.store
                .transition_source_connection_state(session.source_connection_id, ConnectionState::Expired, now)
                .await
                .map_err(store_err)?;
            return Err(CoreError::Conflict("init session expired".to_string()));
        }

        let flow = overrides_get(&session.overrides, "flow")?;
        let (access_token, refresh_token, expires_at, token_secret) = if flow == "oauth1" {
            let config = OAuth1Config {
                consumer_key: overrides_get(&session.overrides, "consumer_key")?,
                consumer_secret: overrides_get(&session.overrides, "consumer_secret")?,
                request_token_url: String::new(),
                authorize_url: String::new(),
                access_token_url: overrides_get(&session.overrides, "access_token_url")?,
                callback_url: String::new(),
            };
            let request_token = tapestry_auth::oauth1::RequestToken {
                token: overrides_get(&session.overrides, "request_token")?,
                token_secret: overrides_get(&session.overrides, "request_token_secret")?,
            };
            let token = self
                .oauth1
                .exchange_verifier(&config, &request_token, code)
                .await
                .map_err(auth_err)?;
            (token.access_token, None, None, token.token_secret)
        } else {
            let oauth_config = OAuth2Config {
                client_id: overrides_get(&session.overrides, "client_id")?,
                client_secret: overrides_get(&session.overrides, "client_secret")?,
                auth_url: overrides_get(&session.overrides, "auth_url")?,
                token_url: overrides_get(&session.overrides, "token_url")?,
                redirect_uri: session.overrides.get("redirect_uri").cloned(),
                supports_pkce: session.overrides.contains_key("pkce_verifier"),
            };
            let pkce_verifier = session.overrides.get("pkce_verifier").map(String::as_str);
            let token = self
                .oauth2
                .exchange_code(code, &oauth_config, pkce_verifier)
                .await
                .map_err(auth_err)?;
            (token.access_token, token.refresh_token, token.expires_at, None)
        };

        let oauth_type = self.registry.metadata(&session.short_name)?.oauth_token_type;
        let mut fields = HashMap::new();
        fields.insert("access_token".to_string(), access_token);
        if let Some(refresh) = refresh_token {
            fields.insert("refresh_token".to_string(), refresh);
        }
        if let Some(exp) = expires_at {
            fields.insert("expires_at".to_string(), exp.to_rfc3339());
        }
        if let Some(secret) = token_secret {
            fields.insert("token_secret".to_string(), secret);
        }
        let blob = self.cipher.encrypt(&fields).map_err(auth_err)?;

        let connection = self
            .store
            .get_source_connection(session.source_connection_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound("source connection for this session is gone".to_string()))?;

        let credential = IntegrationCredential {
            id: Uuid::new_v4(),
            organization_id: session.organization_id,
            integration_short_name: session.short_name.clone(),
            auth_method: connection.auth_method,
            oauth_type: Some(oauth_type),
            encrypted_credentials: blob,
            auth_config_class: None,
        };
        self.store.create_integration_credential(&credential).await.map_err(store_err)?;
        self.store
            .mark_source_connection_authenticated(connection.id, credential.id, now)
            .await
            .map_err(store_err)?;

        let mut connection = self
            .store
            .get_source_connection(connection.id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound("source connection disappeared mid-callback".to_string()))?;

        // Browser flows always sync immediately once authenticated.
        if let Some(cron) = connection.cron_schedule.clone() {
            self.provision_sync(&mut connection, cron, true, now).await?;
        }

        self.store.mark_init_session_completed(session.id).await.map_err(store_err)?;

        Ok(connection)
    }

    /// Best-effort ordered delete cascade: vector data, schedule, sync row,
    /// then the Source Connection and its credential. A failure in any step
    /// before the last is logged and does not abort the delete.
    #[instrument(skip(self))]
    pub async fn delete(&self, connection_id: Uuid) -> CoreResult<()> {
        let connection = self
            .store
            .get_source_connection(connection_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("source connection {connection_id} not found")))?;

        if let Some(sync_id) = connection.sync_id {
            if let Err(err) = self.vector.delete_by_sync_id(sync_id).await {
                warn!(%sync_id, error = %err, "failed to delete destination data during delete; proceeding anyway");
            }
            if let Err(err) = self.scheduler.delete_all_schedules_for_sync(sync_id).await {
                warn!(%sync_id, error = %err, "failed to remove schedule during delete; proceeding anyway");
            }
            if let Err(err) = self.store.delete_sync(sync_id).await {
                warn!(%sync_id, error = %err, "failed to delete sync row during delete; proceeding anyway");
            }
            if let Err(err) = self.store.delete_synced_entities_for_sync(sync_id).await {
                warn!(%sync_id, error = %err, "failed to delete synced-entity ledger during delete; proceeding anyway");
            }
        }

        if let Some(credential_id) = connection.credential_id {
            if let Err(err) = self.store.delete_integration_credential(credential_id).await {
                warn!(%credential_id, error = %err, "failed to delete integration credential during delete; proceeding anyway");
            }
        }

        self.store.delete_source_connection(connection_id).await.map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_daily_cron_uses_current_minute_and_hour() {
        let now = Utc::now();
        let cron = default_daily_cron(now);
        let expected = format!("{} {} * * *", now.minute(), now.hour());
        assert_eq!(cron, expected);
    }

    #[test]
    fn browser_request_without_client_credentials_is_not_byoc() {
        let input = AuthenticationInput::OauthBrowser {
            client_id: None,
            client_secret: None,
            redirect_url: None,
        };
        assert!(!input.has_client_credentials());
        assert_eq!(input.requested_method(), AuthMethod::OauthBrowser);
    }

    #[test]
    fn browser_request_with_client_credentials_is_byoc_eligible() {
        let input = AuthenticationInput::OauthBrowser {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_url: None,
        };
        assert!(input.has_client_credentials());
    }
}
