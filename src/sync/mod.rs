pub mod orchestrator;
pub mod reconciler;
pub mod reference;
pub mod status;

pub use orchestrator::{distinct_landlords, primary_branch, Orchestrator, SyncRequest, SyncResult};
pub use reconciler::{Reconciler, RunLinks};
pub use reference::ReferenceCache;
pub use status::{api_key_hash, StatusReporter};
