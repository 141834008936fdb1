pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use error::{EntityKind, StoreError, SyncError};
pub use sync::{Orchestrator, SyncRequest, SyncResult};
