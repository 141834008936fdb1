#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use listing_sync::catalog::{CatalogClient, CatalogConnector, SearchFilters};
use listing_sync::error::{Result, SyncError};
use listing_sync::models::{ExternalId, Owner, RemoteBranch, RemoteListing, RemoteStaff};
use listing_sync::store::InMemoryStore;
use listing_sync::{Orchestrator, SyncConfig, SyncRequest};
use serde_json::{json, Value};

/// Canned catalog for one operator key.
#[derive(Clone, Default)]
pub struct StaticCatalog {
    pub branches: Vec<RemoteBranch>,
    pub staff: Vec<RemoteStaff>,
    pub listings: Vec<RemoteListing>,
    pub unavailable: bool,
    pub requested_limits: Arc<Mutex<Vec<usize>>>,
}

impl StaticCatalog {
    pub fn with_listings(listings: Vec<RemoteListing>) -> Self {
        Self {
            branches: vec![branch(json!({ "id": 1, "name": "Central", "is_default": true }))],
            staff: vec![staff(json!({ "id": 50, "name": "Ana" }))],
            listings,
            ..Self::default()
        }
    }

    pub fn requested_limits(&self) -> Vec<usize> {
        self.requested_limits.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            return Err(SyncError::RemoteUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn fetch_all_branches(&self) -> Result<Vec<RemoteBranch>> {
        self.check()?;
        Ok(self.branches.clone())
    }

    async fn fetch_all_staff(&self) -> Result<Vec<RemoteStaff>> {
        self.check()?;
        Ok(self.staff.clone())
    }

    async fn search_listings(
        &self,
        limit: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<RemoteListing>> {
        self.check()?;
        self.requested_limits.lock().unwrap().push(limit);
        Ok(self.listings.iter().take(limit).cloned().collect())
    }

    fn source_name(&self) -> &'static str {
        "Static"
    }
}

/// Serves a [`StaticCatalog`] per API key.
#[derive(Clone, Default)]
pub struct StaticConnector {
    pub catalogs: HashMap<String, StaticCatalog>,
}

impl StaticConnector {
    pub fn single(api_key: &str, catalog: StaticCatalog) -> Self {
        let mut catalogs = HashMap::new();
        catalogs.insert(api_key.to_string(), catalog);
        Self { catalogs }
    }
}

impl CatalogConnector for StaticConnector {
    type Client = StaticCatalog;

    fn connect(&self, api_key: &str) -> Result<StaticCatalog> {
        self.catalogs
            .get(api_key)
            .cloned()
            .ok_or_else(|| SyncError::RemoteUnavailable("API key rejected (401)".into()))
    }
}

pub type TestOrchestrator = Orchestrator<Arc<InMemoryStore>, StaticConnector>;

pub fn orchestrator(store: &Arc<InMemoryStore>, connector: StaticConnector) -> TestOrchestrator {
    let config = SyncConfig {
        batch_size: 20,
        entity_concurrency: 4,
        ..SyncConfig::default()
    };
    Orchestrator::new(Arc::clone(store), connector, config)
}

pub fn owner_with_auth(store: &InMemoryStore, auth_id: &str) -> i64 {
    store.add_owner(Owner {
        auth_id: Some(auth_id.to_string()),
        email: Some(format!("{auth_id}@example.test")),
        ..Owner::default()
    })
}

pub fn request(api_key: &str, auth_id: &str) -> SyncRequest {
    SyncRequest {
        api_key: api_key.to_string(),
        listing_limit: 500,
        auth_id: Some(auth_id.to_string()),
        auth_email: None,
    }
}

pub fn branch(value: Value) -> RemoteBranch {
    serde_json::from_value(value).unwrap()
}

pub fn staff(value: Value) -> RemoteStaff {
    serde_json::from_value(value).unwrap()
}

/// A rent listing on apartment type 2, located at `location_id`.
pub fn listing(id: ExternalId, location_id: ExternalId) -> Value {
    json!({
        "id": id,
        "publication_title": format!("Apartment {id}"),
        "address": format!("Calle {id}"),
        "location": {
            "id": location_id,
            "name": "Palermo",
            "parent_division": "/api/v1/location/1/"
        },
        "type": { "id": 2, "name": "Apartment", "code": "AP" },
        "branch": { "id": 1 },
        "producer": { "id": 50 },
        "operations": [{
            "operation_id": 2,
            "operation_type": "Rent",
            "prices": [{ "currency": "USD", "price": 900, "period": 0 }]
        }],
        "photos": [
            { "image": "front.jpg", "order": 0, "is_front_cover": true },
            { "image": "plan.jpg", "order": 1, "is_blueprint": true }
        ],
        "tags": [{ "id": 7, "name": "Pileta", "type": 3 }]
    })
}

pub fn parse(value: Value) -> RemoteListing {
    serde_json::from_value(value).unwrap()
}

/// Listings `1..=n`, all on a location seeded in `store`.
pub fn seeded_listings(store: &InMemoryStore, n: ExternalId) -> Vec<RemoteListing> {
    store.seed_location(1);
    store.seed_location(100);
    (1..=n).map(|id| parse(listing(id, 100))).collect()
}
