use async_trait::async_trait;

use crate::catalog::types::SearchFilters;
use crate::error::Result;
use crate::models::{RemoteBranch, RemoteListing, RemoteStaff};

/// Read-only view of one operator's remote catalog.
/// Implementations handle remote pagination internally.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Every branch of the operator.
    async fn fetch_all_branches(&self) -> Result<Vec<RemoteBranch>>;

    /// Every staff member of the operator.
    async fn fetch_all_staff(&self) -> Result<Vec<RemoteStaff>>;

    /// Up to `limit` listings matching `filters`. An empty result is not an error.
    async fn search_listings(
        &self,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<RemoteListing>>;

    /// Name of the remote source, for logs
    fn source_name(&self) -> &'static str;
}

/// Builds a [`CatalogClient`] bound to an operator API key.
pub trait CatalogConnector: Send + Sync {
    type Client: CatalogClient;

    fn connect(&self, api_key: &str) -> Result<Self::Client>;
}
