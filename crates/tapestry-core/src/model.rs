//! §3 DATA MODEL: the entities every component reads or writes, with
//! ownership exactly as stated in the spec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Tenant boundary. Owns Collections, Source Connections, Credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub feature_flags: Vec<String>,
}

impl Organization {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.feature_flags.iter().any(|f| f == flag)
    }
}

/// Logical namespace for search. `vector_size` is fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub readable_id: String,
    pub name: String,
    pub vector_size: u32,
    pub organization_id: Uuid,
}

/// How a Source Connection authenticates, as inferred per §4.1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMethod {
    Direct,
    OauthBrowser,
    OauthToken,
    OauthByoc,
    AuthProvider,
}

/// The §4.1 state machine states for a Source Connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Creating,
    PendingAuth,
    Authenticated,
    Scheduled,
    Running,
    Expired,
    Deleted,
}

impl ConnectionState {
    /// Whether `to` is a legal transition from `self`, per the §4.1 diagram.
    pub fn can_transition_to(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Creating, Authenticated)
                | (Creating, PendingAuth)
                | (PendingAuth, Authenticated)
                | (PendingAuth, Expired)
                | (PendingAuth, Deleted)
                | (Authenticated, Scheduled)
                | (Scheduled, Running)
                | (Running, Scheduled)
                | (Scheduled, Deleted)
        )
    }
}

/// Binds a Collection to one external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConnection {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub collection_readable_id: String,
    pub short_name: String,
    pub name: String,
    pub description: Option<String>,
    pub auth_method: AuthenticationMethod,
    pub state: ConnectionState,
    pub is_authenticated: bool,
    pub config_fields: serde_json::Value,
    pub credential_id: Option<Uuid>,
    pub sync_id: Option<Uuid>,
    pub cron_schedule: Option<String>,
    /// Opaque per-source JSON the driver alone reads/writes (§4.4 cursor).
    pub cursor_data: Option<serde_json::Value>,
    pub readable_auth_provider_id: Option<String>,
    pub auth_provider_config: Option<serde_json::Value>,
    pub connection_init_session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Opaque encrypted blob + metadata. Owned by exactly one Source Connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationCredential {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub integration_short_name: String,
    pub auth_method: AuthenticationMethod,
    pub oauth_type: Option<tapestry_auth::OAuthTokenType>,
    /// Opaque to everyone but the credential store's cipher.
    pub encrypted_credentials: String,
    pub auth_config_class: Option<String>,
}

/// Short-lived record for in-progress OAuth browser flows (30 min TTL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitSessionStatus {
    Pending,
    Completed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInitSession {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub short_name: String,
    /// Random URL-safe >=24-byte entropy token, used to correlate the
    /// provider callback to this session.
    pub state: String,
    /// The pending Source Connection create request, minus auth fields.
    pub payload: serde_json::Value,
    /// client_id/secret (BYOC), PKCE verifier, redirect URL, OAuth1 request
    /// token pair — whatever the provider's flow needs between leg one and
    /// the callback.
    pub overrides: HashMap<String, String>,
    pub status: InitSessionStatus,
    pub expires_at: DateTime<Utc>,
    /// The linked [`RedirectSession`]'s short code, not a row id — a redirect
    /// session is keyed by its proxy code, not a UUID.
    pub redirect_session_id: Option<String>,
    pub source_connection_id: Uuid,
}

impl ConnectionInitSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Short-code → URL record proxying the provider's authorize URL through a
/// stable API host. 24h TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectSession {
    pub code: String,
    pub target_url: String,
    pub expires_at: DateTime<Utc>,
}

impl RedirectSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Binds a Source Connection to a destination Collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sync {
    pub id: Uuid,
    pub source_connection_id: Uuid,
    pub collection_id: Uuid,
    pub cron_schedule: Option<String>,
    pub next_scheduled_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncJobStatus {
    /// §8 property 5: the state sequence is a subsequence of
    /// `pending -> running -> {completed|failed|cancelled}`; no revisits.
    pub fn can_transition_to(&self, to: SyncJobStatus) -> bool {
        use SyncJobStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Pending, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncJobCounters {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub kept: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub sync_id: Uuid,
    pub status: SyncJobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counters: SyncJobCounters,
    pub error: Option<String>,
    pub force_full_sync: bool,
}

impl SyncJob {
    pub fn new(sync_id: Uuid, force_full_sync: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_id,
            status: SyncJobStatus::Pending,
            started_at: None,
            completed_at: None,
            counters: SyncJobCounters::default(),
            error: None,
            force_full_sync,
        }
    }
}
