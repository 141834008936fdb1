pub mod brokerage;
pub mod traits;
pub mod types;

pub use brokerage::{BrokerageClient, BrokerageConnector};
pub use traits::{CatalogClient, CatalogConnector};
pub use types::{clamp_limit, DealType, PropertyKind, SearchFilters, MAX_LISTING_LIMIT};
