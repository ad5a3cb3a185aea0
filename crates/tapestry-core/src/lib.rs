//! Data model, source driver contract, entity identity, event emission,
//! and scheduling shared by every other crate in the workspace.

pub mod access_control;
pub mod driver;
pub mod entity;
pub mod error;
pub mod events;
pub mod model;
pub mod scheduler;

pub use error::{CoreError, CoreResult};
