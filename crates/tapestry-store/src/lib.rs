//! Relational persistence for the platform's multi-tenant data model (§3):
//! Organizations, Collections, Source Connections and their credentials,
//! OAuth init/redirect sessions, Syncs, and Sync Jobs. One SQLite database
//! per deployment, queried directly through sqlx rather than an ORM, in the
//! same shape as the ingestion engine this crate replaces.

mod collections;
mod credentials;
mod organizations;
mod sessions;
mod source_connections;
mod store;
mod synced_entities;
mod syncs;

pub use credentials::StoreCredentialPersister;
pub use store::Store;
pub use synced_entities::SyncedEntity;
