use std::str::FromStr;
use std::time::Duration;

use crate::catalog::MAX_LISTING_LIMIT;
use crate::error::{Result, SyncError};

/// Engine configuration loaded from environment variables.
///
/// | Env Var                    | Default                               |
/// |----------------------------|---------------------------------------|
/// | `CATALOG_API_URL`          | `https://www.tokkobroker.com/api/v1`  |
/// | `CATALOG_TIMEOUT_SECS`     | `30`                                  |
/// | `CATALOG_PAGE_SIZE`        | `100`                                 |
/// | `SYNC_BATCH_SIZE`          | `20`                                  |
/// | `SYNC_ENTITY_CONCURRENCY`  | `16`                                  |
/// | `SYNC_LISTING_LIMIT`       | `500`                                 |
/// | `DATABASE_URL`             | unset (in-memory store)               |
/// | `DATABASE_MAX_CONNECTIONS` | `10`                                  |
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    /// Applied to every remote call.
    pub request_timeout: Duration,
    pub page_size: usize,
    /// Listings reconciled concurrently per batch.
    pub batch_size: usize,
    /// Cap on concurrent branch, staff and landlord upserts.
    pub entity_concurrency: usize,
    pub listing_limit: usize,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.tokkobroker.com/api/v1".into(),
            request_timeout: Duration::from_secs(30),
            page_size: 100,
            batch_size: 20,
            entity_concurrency: 16,
            listing_limit: MAX_LISTING_LIMIT,
            database_url: None,
            database_max_connections: 10,
        }
    }
}

impl SyncConfig {
    /// Load from the process environment. Call `dotenvy::dotenv()` first
    /// to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup, so tests need not touch the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_base_url = lookup("CATALOG_API_URL").unwrap_or(defaults.api_base_url);
        let timeout_secs: u64 = parse_or(&lookup, "CATALOG_TIMEOUT_SECS", 30)?;
        let page_size: usize = parse_or(&lookup, "CATALOG_PAGE_SIZE", defaults.page_size)?;
        let batch_size: usize = parse_or(&lookup, "SYNC_BATCH_SIZE", defaults.batch_size)?;
        let entity_concurrency: usize =
            parse_or(&lookup, "SYNC_ENTITY_CONCURRENCY", defaults.entity_concurrency)?;
        let listing_limit: usize =
            parse_or(&lookup, "SYNC_LISTING_LIMIT", defaults.listing_limit)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let database_max_connections: u32 = parse_or(
            &lookup,
            "DATABASE_MAX_CONNECTIONS",
            defaults.database_max_connections,
        )?;

        if batch_size == 0 {
            return Err(SyncError::Config("SYNC_BATCH_SIZE must be at least 1".into()));
        }
        if entity_concurrency == 0 {
            return Err(SyncError::Config(
                "SYNC_ENTITY_CONCURRENCY must be at least 1".into(),
            ));
        }

        Ok(Self {
            api_base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            page_size,
            batch_size,
            entity_concurrency,
            listing_limit,
            database_url,
            database_max_connections,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SyncError::Config(format!("{key} must be a valid number, got {raw:?}"))),
        None => Ok(default),
    }
}
