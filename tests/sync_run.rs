mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use listing_sync::error::EntityKind;
use listing_sync::models::{NewPriceRecord, Owner, PriceStatus, SyncStatus};
use listing_sync::store::memory::JournalEntry;
use listing_sync::store::InMemoryStore;
use listing_sync::sync::api_key_hash;
use listing_sync::SyncError;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::*;

#[tokio::test]
async fn second_run_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 3);
    let sync = orchestrator(&store, StaticConnector::single("key", StaticCatalog::with_listings(listings)));

    let first = sync.run_sync(&request("key", "auth-1")).await.unwrap();
    let counts = store.counts();
    let ids = store.listing_ids(owner_id);

    let second = sync.run_sync(&request("key", "auth-1")).await.unwrap();

    assert_eq!(first.listings, 3);
    assert_eq!(second.listings, 3);
    assert!(second.errors.is_empty());
    assert_eq!(store.counts(), counts);
    assert_eq!(store.listing_ids(owner_id), ids);
    assert_eq!(counts.prices, 3);
    assert_eq!(counts.photos, 6);
    assert_eq!(counts.tags, 1);
}

#[tokio::test]
async fn owners_sharing_external_ids_get_distinct_rows() {
    let store = Arc::new(InMemoryStore::new());
    let owner_a = owner_with_auth(&store, "auth-a");
    let owner_b = owner_with_auth(&store, "auth-b");
    store.seed_location(1);
    store.seed_location(100);

    let mut connector = StaticConnector::default();
    connector.catalogs.insert(
        "key-a".into(),
        StaticCatalog::with_listings(vec![parse(listing(500, 100))]),
    );
    connector.catalogs.insert(
        "key-b".into(),
        StaticCatalog::with_listings(vec![parse(listing(500, 100))]),
    );
    let sync = orchestrator(&store, connector);

    sync.run_sync(&request("key-a", "auth-a")).await.unwrap();
    sync.run_sync(&request("key-b", "auth-b")).await.unwrap();

    let (id_a, _) = store.listing(owner_a, 500).unwrap();
    let (id_b, _) = store.listing(owner_b, 500).unwrap();
    assert_ne!(id_a, id_b);
    assert_eq!(store.counts().listings, 2);
    assert_eq!(store.counts().branches, 2);
}

#[tokio::test]
async fn only_the_rent_offer_is_priced() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    store.seed_location(1);
    store.seed_location(100);

    let mut value = listing(9, 100);
    value["operations"] = json!([
        { "operation_id": 1, "operation_type": "Sale", "prices": [{ "currency": "USD", "price": 120000 }] },
        { "operation_id": 2, "operation_type": "Rent", "prices": [{ "currency": "USD", "price": 900 }] },
        { "operation_id": 3, "operation_type": "Temporary rent", "prices": [{ "currency": "USD", "price": 60 }] }
    ]);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(vec![parse(value)])),
    );

    sync.run_sync(&request("key", "auth-1")).await.unwrap();

    let (listing_id, record) = store.listing(owner_id, 9).unwrap();
    let prices = store.prices_for(listing_id);
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].deal_type_id, Some(2));
    assert_eq!(prices[0].price, Some(900.0));
    assert_eq!(record.deal_types.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn extra_price_tiers_are_dropped_without_error() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    store.seed_location(1);
    store.seed_location(100);

    let mut value = listing(9, 100);
    value["operations"] = json!([{
        "operation_id": 2,
        "operation_type": "Rent",
        "prices": [
            { "currency": "USD", "price": 900 },
            { "currency": "ARS", "price": 850000 },
            { "currency": "EUR", "price": 820 },
            { "currency": "BRL", "price": 4700 }
        ]
    }]);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(vec![parse(value)])),
    );

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();
    assert!(result.errors.is_empty());

    let (listing_id, _) = store.listing(owner_id, 9).unwrap();
    let prices = store.prices_for(listing_id);
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].currency.as_deref(), Some("USD"));
    assert_eq!(prices[0].secondary_currency.as_deref(), Some("ARS"));
    assert_eq!(prices[0].secondary_price, Some(850000.0));
}

#[tokio::test]
async fn listing_without_offers_gets_cost_placeholder() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    store.seed_location(1);
    store.seed_location(100);

    let mut value = listing(9, 100);
    value["operations"] = json!([]);
    value["expenses"] = json!(15000);
    value["insurance"] = json!("2500");
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(vec![parse(value)])),
    );

    sync.run_sync(&request("key", "auth-1")).await.unwrap();

    let (listing_id, _) = store.listing(owner_id, 9).unwrap();
    let prices = store.prices_for(listing_id);
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].price, None);
    assert_eq!(prices[0].expenses, Some(15000.0));
    assert_eq!(prices[0].insurance, Some(2500.0));
    assert_eq!(prices[0].cleaning_tax, None);
}

#[tokio::test]
async fn missing_location_fails_only_that_listing() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    store.seed_location(1);
    store.seed_location(100);

    let listings = vec![parse(listing(1, 100)), parse(listing(2, 999))];
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();

    assert_eq!(result.listings, 1);
    assert_eq!(result.total_listings, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Property 2:"));
    assert!(result.errors[0].contains("location 999 is missing from reference data"));
    assert!(store.listing(owner_id, 1).is_some());
    assert!(store.listing(owner_id, 2).is_none());

    let owner = store.owner(owner_id).unwrap();
    assert_eq!(owner.sync_status.as_deref(), Some("done"));
}

#[tokio::test]
async fn primary_branch_backfills_owner_profile() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = store.add_owner(Owner {
        auth_id: Some("auth-1".into()),
        display_name: Some("Old name".into()),
        phone: Some("555-0000".into()),
        ..Owner::default()
    });
    let listings = seeded_listings(&store, 1);

    let mut catalog = StaticCatalog::with_listings(listings);
    catalog.branches = vec![
        branch(json!({ "id": 1, "name": "North", "is_default": false, "created_date": "2020-01-01T00:00:00", "phone": "111" })),
        branch(json!({ "id": 2, "name": "Central", "display_name": "Acme Central", "is_default": true, "created_date": "2019-01-01T00:00:00", "logo": "https://cdn.test/acme.png", "email": "central@acme.test" })),
        branch(json!({ "id": 3, "name": "South", "is_default": false, "created_date": "2018-01-01T00:00:00", "phone": "333" })),
    ];
    let sync = orchestrator(&store, StaticConnector::single("key", catalog));

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();
    assert_eq!(result.branches, 3);

    let owner = store.owner(owner_id).unwrap();
    assert_eq!(owner.display_name.as_deref(), Some("Acme Central"));
    assert_eq!(owner.phone.as_deref(), Some("555-0000"));
    assert_eq!(owner.logo_url.as_deref(), Some("https://cdn.test/acme.png"));
    assert_eq!(owner.operator_email.as_deref(), Some("central@acme.test"));
    assert_eq!(owner.api_key_hash, Some(api_key_hash("key")));
    assert!(owner.last_synced_at.is_some());
}

#[tokio::test]
async fn batches_report_progress_in_order() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 45);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();
    assert_eq!(result.listings, 45);

    let progress: Vec<_> = store
        .status_history()
        .into_iter()
        .filter(|u| u.status == SyncStatus::Syncing && u.listing_count.is_some())
        .map(|u| u.listing_count.unwrap())
        .collect();
    assert_eq!(progress, vec![20, 40, 45]);

    // Listings written between consecutive progress updates form one batch.
    let mut batches: Vec<Vec<i64>> = vec![Vec::new()];
    for entry in store.journal() {
        match entry {
            JournalEntry::ListingUpserted { owner_id: o, external_id } => {
                assert_eq!(o, owner_id);
                batches.last_mut().unwrap().push(external_id);
            }
            JournalEntry::Status(u) if u.status == SyncStatus::Syncing && u.listing_count.is_some() => {
                batches.push(Vec::new());
            }
            JournalEntry::Status(_) => {}
        }
    }
    batches.retain(|b| !b.is_empty());
    assert_eq!(batches.len(), 3);
    for (index, batch) in batches.iter_mut().enumerate() {
        batch.sort_unstable();
        let start = index as i64 * 20 + 1;
        let end = (start + 19).min(45);
        assert_eq!(*batch, (start..=end).collect::<Vec<_>>());
    }

    let owner = store.owner(owner_id).unwrap();
    assert_eq!(owner.sync_status.as_deref(), Some("done"));
    assert_eq!(owner.sync_listing_count, Some(45));
}

#[tokio::test]
async fn empty_search_ends_in_error_status() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(Vec::new())),
    );

    let err = sync.run_sync(&request("key", "auth-1")).await.unwrap_err();
    assert_matches!(err, SyncError::NoListings);

    let owner = store.owner(owner_id).unwrap();
    assert_eq!(owner.sync_status.as_deref(), Some("error"));
    assert_eq!(owner.sync_message.as_deref(), Some("no properties found for this API key"));

    let counts = store.counts();
    assert_eq!(counts.branches, 0);
    assert_eq!(counts.staff, 0);
    assert_eq!(counts.listings, 0);
}

#[tokio::test]
async fn unknown_owner_is_never_created() {
    let store = Arc::new(InMemoryStore::new());
    let listings = seeded_listings(&store, 1);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    let err = sync.run_sync(&request("key", "nobody")).await.unwrap_err();
    assert_matches!(err, SyncError::OwnerNotFound);
    assert_eq!(store.counts().listings, 0);
}

#[tokio::test]
async fn owner_resolution_prefers_auth_id_then_email_then_key() {
    let store = Arc::new(InMemoryStore::new());
    let by_auth = owner_with_auth(&store, "auth-1");
    let by_email = store.add_owner(Owner {
        email: Some("ops@acme.test".into()),
        ..Owner::default()
    });
    let listings = seeded_listings(&store, 1);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    let mut req = request("key", "auth-1");
    req.auth_email = Some("OPS@acme.test".into());
    let result = sync.run_sync(&req).await.unwrap();
    assert_eq!(result.owner_id, by_auth);

    req.auth_id = Some("unknown".into());
    let result = sync.run_sync(&req).await.unwrap();
    assert_eq!(result.owner_id, by_email);

    // The key now belongs to the owner that synced with it last.
    assert_eq!(store.owner(by_auth).unwrap().api_key_hash, None);
    req.auth_id = None;
    req.auth_email = None;
    let result = sync.run_sync(&req).await.unwrap();
    assert_eq!(result.owner_id, by_email);
}

#[tokio::test]
async fn reused_key_leaves_previous_owner_status_alone() {
    let store = Arc::new(InMemoryStore::new());
    let first = owner_with_auth(&store, "auth-a");
    let second = owner_with_auth(&store, "auth-b");
    let listings = seeded_listings(&store, 2);

    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );
    sync.run_sync(&request("key", "auth-a")).await.unwrap();

    let empty = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(Vec::new())),
    );
    let err = empty.run_sync(&request("key", "auth-b")).await.unwrap_err();
    assert_matches!(err, SyncError::NoListings);

    let first = store.owner(first).unwrap();
    assert_eq!(first.sync_status.as_deref(), Some("done"));
    assert_eq!(first.api_key_hash, None);
    let second = store.owner(second).unwrap();
    assert_eq!(second.sync_status.as_deref(), Some("error"));
    assert_eq!(second.api_key_hash, Some(api_key_hash("key")));
}

#[tokio::test]
async fn first_status_reaches_a_new_owner() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 1);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    sync.run_sync(&request("key", "auth-1")).await.unwrap();

    let first = store.status_history().into_iter().next().unwrap();
    assert_eq!(first.status, SyncStatus::Syncing);
    assert_eq!(first.message, "Starting sync");
    assert!(store.owner(owner_id).unwrap().api_key_hash.is_some());
}

#[tokio::test]
async fn unreachable_remote_aborts_with_error_status() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let mut catalog = StaticCatalog::with_listings(Vec::new());
    catalog.unavailable = true;
    let sync = orchestrator(&store, StaticConnector::single("key", catalog));

    let err = sync.run_sync(&request("key", "auth-1")).await.unwrap_err();
    assert_matches!(err, SyncError::RemoteUnavailable(_));

    let owner = store.owner(owner_id).unwrap();
    assert_eq!(owner.sync_status.as_deref(), Some("error"));
    assert!(owner
        .sync_message
        .as_deref()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn rejected_key_is_remote_unavailable() {
    let store = Arc::new(InMemoryStore::new());
    owner_with_auth(&store, "auth-1");
    let sync = orchestrator(&store, StaticConnector::default());

    let err = sync.run_sync(&request("bad-key", "auth-1")).await.unwrap_err();
    assert_matches!(err, SyncError::RemoteUnavailable(_));
}

#[tokio::test]
async fn failing_branch_is_collected_not_fatal() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 2);
    store.fail_writes_for(EntityKind::Branch, 1);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();

    assert_eq!(result.branches, 0);
    assert_eq!(result.listings, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Branch 1:"));

    let (_, record) = store.listing(owner_id, 1).unwrap();
    assert_eq!(record.branch_id, None);
    assert!(record.staff_id.is_some());
}

#[tokio::test]
async fn failing_listing_does_not_stop_its_batch() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 25);
    store.fail_writes_for(EntityKind::Property, 3);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();

    assert_eq!(result.listings, 24);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Property 3:"));
    assert_eq!(store.listing_ids(owner_id).len(), 24);
}

#[tokio::test]
async fn cancelled_run_keeps_setup_and_reports_error() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 5);
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(listings)),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = sync
        .run_sync_cancellable(&request("key", "auth-1"), cancel)
        .await
        .unwrap_err();

    assert_matches!(err, SyncError::Cancelled { synced: 0, total: 5 });
    assert_eq!(store.counts().listings, 0);
    assert_eq!(store.counts().branches, 1);
    let owner = store.owner(owner_id).unwrap();
    assert_eq!(owner.sync_status.as_deref(), Some("error"));
}

#[tokio::test]
async fn leased_prices_survive_resync_and_photos_are_replaced() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 1);
    let mut catalog = StaticCatalog::with_listings(listings);
    let sync = orchestrator(&store, StaticConnector::single("key", catalog.clone()));

    sync.run_sync(&request("key", "auth-1")).await.unwrap();
    let (listing_id, _) = store.listing(owner_id, 1).unwrap();
    store.insert_price(NewPriceRecord {
        listing_id,
        deal_type_id: Some(2),
        status: PriceStatus::Leased,
        currency: Some("USD".into()),
        price: Some(700.0),
        period: None,
        secondary_currency: None,
        secondary_price: None,
        expenses: None,
        cleaning_tax: None,
        insurance: None,
        down_payment: None,
    });

    catalog.listings[0].photos.truncate(1);
    catalog.listings[0].operations[0].prices[0].price = Some(950.0);
    let sync = orchestrator(&store, StaticConnector::single("key", catalog));
    sync.run_sync(&request("key", "auth-1")).await.unwrap();

    let prices = store.prices_for(listing_id);
    assert_eq!(prices.len(), 2);
    assert!(prices
        .iter()
        .any(|p| p.status == PriceStatus::Leased && p.price == Some(700.0)));
    assert!(prices
        .iter()
        .any(|p| p.status == PriceStatus::Available && p.price == Some(950.0)));

    let photos = store.photos_for(listing_id);
    assert_eq!(photos.len(), 1);
    assert!(photos[0].is_front_cover);
}

#[tokio::test]
async fn landlords_are_stored_once_and_linked_per_listing() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    store.seed_location(1);
    store.seed_location(100);

    let mut first = listing(1, 100);
    first["internal_data"] = json!({ "property_owners": [{ "id": 70, "name": "Marta" }, { "id": 71, "name": "Raúl" }] });
    let mut second = listing(2, 100);
    second["internal_data"] = json!({ "property_owners": [{ "id": 70, "name": "Marta" }] });
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(vec![parse(first), parse(second)])),
    );

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();
    assert_eq!(result.landlords, 2);

    let counts = store.counts();
    assert_eq!(counts.landlords, 2);
    assert_eq!(counts.landlord_links, 3);

    let (listing_id, _) = store.listing(owner_id, 2).unwrap();
    assert_eq!(store.landlord_links_for(listing_id).len(), 1);
    assert_eq!(store.tag_links_for(listing_id).len(), 1);
}

#[tokio::test]
async fn listing_limit_is_clamped() {
    let store = Arc::new(InMemoryStore::new());
    owner_with_auth(&store, "auth-1");
    let listings = seeded_listings(&store, 3);
    let catalog = StaticCatalog::with_listings(listings);
    let sync = orchestrator(&store, StaticConnector::single("key", catalog.clone()));

    let mut req = request("key", "auth-1");
    req.listing_limit = 10_000;
    sync.run_sync(&req).await.unwrap();
    req.listing_limit = 0;
    let result = sync.run_sync(&req).await.unwrap();

    assert_eq!(catalog.requested_limits(), vec![500, 1]);
    assert_eq!(result.total_listings, 1);
}

#[tokio::test]
async fn listing_links_resolve_to_local_ids() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    let parent = store.seed_location(1);
    let location = store.seed_location(100);
    let sync = orchestrator(
        &store,
        StaticConnector::single(
            "key",
            StaticCatalog::with_listings(vec![parse(listing(8, 100))]),
        ),
    );

    sync.run_sync(&request("key", "auth-1")).await.unwrap();

    let (_, record) = store.listing(owner_id, 8).unwrap();
    let (branch_id, _) = store.branch(owner_id, 1).unwrap();
    assert_eq!(record.location_id, Some(location));
    assert_eq!(record.parent_division_location_id, Some(parent));
    assert_eq!(record.branch_id, Some(branch_id));
    assert!(record.type_id.is_some());
    assert!(record.amenities.pool);
}

#[tokio::test]
async fn failed_landlord_does_not_fail_its_listings() {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = owner_with_auth(&store, "auth-1");
    store.seed_location(1);
    store.seed_location(100);
    store.fail_writes_for(EntityKind::Landlord, 70);

    let mut first = listing(1, 100);
    first["internal_data"] = json!({ "property_owners": [{ "id": 70, "name": "Marta" }, { "id": 71, "name": "Raúl" }] });
    let mut second = listing(2, 100);
    second["internal_data"] = json!({ "property_owners": [{ "id": 70, "name": "Marta" }] });
    let sync = orchestrator(
        &store,
        StaticConnector::single("key", StaticCatalog::with_listings(vec![parse(first), parse(second)])),
    );

    let result = sync.run_sync(&request("key", "auth-1")).await.unwrap();

    assert_eq!(result.listings, 2);
    assert_eq!(result.landlords, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Landlord 70:"));
    assert_eq!(store.listing_ids(owner_id).len(), 2);

    let (first_id, _) = store.listing(owner_id, 1).unwrap();
    let (second_id, _) = store.listing(owner_id, 2).unwrap();
    assert_eq!(store.landlord_links_for(first_id).len(), 1);
    assert!(store.landlord_links_for(second_id).is_empty());
}
