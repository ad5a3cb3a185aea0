//! Source Connection lifecycle (§4.1, C8) and the Sync Runner (§4.9, C9):
//! the two components that turn a Source Connection's configuration into
//! indexed, periodically refreshed data in a destination Collection.

pub mod lifecycle;
pub mod runner;

pub use lifecycle::{
    AuthenticationInput, CreateOutcome, CreateSourceConnectionRequest, LifecycleService,
    OAuthEndpoints, OAuthProviderDirectory,
};
pub use runner::SyncRunner;
