use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::catalog::traits::{CatalogClient, CatalogConnector};
use crate::catalog::types::{clamp_limit, SearchFilters};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::{RemoteBranch, RemoteListing, RemoteStaff};

/// Paging envelope shared by every collection endpoint.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    meta: PageMeta,
    #[serde(default = "Vec::new")]
    objects: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    next: Option<String>,
    total_count: Option<usize>,
}

/// Creates [`BrokerageClient`]s sharing one HTTP connection pool.
pub struct BrokerageConnector {
    http: Client,
    base_url: String,
    timeout: Duration,
    page_size: usize,
}

impl BrokerageConnector {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("listing-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
            page_size: config.page_size.max(1),
        })
    }
}

impl CatalogConnector for BrokerageConnector {
    type Client = BrokerageClient;

    fn connect(&self, api_key: &str) -> Result<BrokerageClient> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(SyncError::RemoteUnavailable("API key is empty".into()));
        }

        Ok(BrokerageClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: api_key.to_string(),
            timeout: self.timeout,
            page_size: self.page_size,
        })
    }
}

/// Brokerage API client bound to one operator key
pub struct BrokerageClient {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    page_size: usize,
}

impl BrokerageClient {
    /// Fetch one page. Transport failures, rejected keys and timeouts all
    /// surface as `RemoteUnavailable`.
    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Page<T>> {
        let url = format!("{}/{}/", self.base_url, path);
        debug!(%url, ?params, "Fetching page");

        let request = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("format", "json")])
            .query(params);

        let fetch = async {
            let response = request.send().await?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(SyncError::RemoteUnavailable(format!(
                    "{path}: API key rejected ({status})"
                )));
            }
            if !status.is_success() {
                return Err(SyncError::RemoteUnavailable(format!("{path}: {status}")));
            }
            let page = response.json::<Page<T>>().await?;
            Ok::<Page<T>, SyncError>(page)
        };

        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| {
                SyncError::RemoteUnavailable(format!("{path}: timed out after {:?}", self.timeout))
            })?
    }

    /// Walk offset pagination until the remote runs dry or `max_items` is reached.
    async fn fetch_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, String)],
        max_items: Option<usize>,
    ) -> Result<Vec<T>> {
        let mut items: Vec<T> = Vec::new();
        let mut offset = 0usize;

        loop {
            let remaining = max_items.map(|max| max.saturating_sub(items.len()));
            let limit = match remaining {
                Some(0) => break,
                Some(n) => n.min(self.page_size),
                None => self.page_size,
            };

            let mut params = extra.to_vec();
            params.push(("limit", limit.to_string()));
            params.push(("offset", offset.to_string()));

            let page: Page<T> = self.get_page(path, &params).await?;
            let fetched = page.objects.len();
            debug!(path, offset, fetched, total = ?page.meta.total_count, "Page received");

            items.extend(page.objects);
            offset += fetched;

            if fetched == 0 || page.meta.next.is_none() {
                break;
            }
        }

        if let Some(max) = max_items {
            items.truncate(max);
        }
        Ok(items)
    }
}

#[async_trait]
impl CatalogClient for BrokerageClient {
    async fn fetch_all_branches(&self) -> Result<Vec<RemoteBranch>> {
        let branches = self.fetch_paged("branch", &[], None).await?;
        info!(count = branches.len(), "Fetched branches");
        Ok(branches)
    }

    async fn fetch_all_staff(&self) -> Result<Vec<RemoteStaff>> {
        let staff = self.fetch_paged("user", &[], None).await?;
        info!(count = staff.len(), "Fetched staff");
        Ok(staff)
    }

    async fn search_listings(
        &self,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<RemoteListing>> {
        let data = json!({
            "current_localization_id": 0,
            "current_localization_type": "country",
            "price_from": 0,
            "price_to": 999_999_999,
            "operation_types": filters.operation_types,
            "property_types": filters.property_types,
            "currency": "ANY",
            "filters": [],
        });

        let listings = self
            .fetch_paged(
                "property/search",
                &[("data", data.to_string())],
                Some(clamp_limit(limit)),
            )
            .await?;
        info!(count = listings.len(), limit, "Fetched listings");
        Ok(listings)
    }

    fn source_name(&self) -> &'static str {
        "Brokerage"
    }
}
