//! Local relational store, behind the [`Repository`] trait.
//!
//! Every write keyed by an external id is an upsert on its natural key
//! (external id plus owner for operator-scoped rows), so concurrent
//! writes to different entities need no extra locking and repeated runs
//! never duplicate rows.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{
    BranchRecord, DealTypeRecord, ExternalId, LandlordRecord, ListingRecord, LocalId,
    NewPriceRecord, Owner, OwnerProfile, PhotoRecord, PropertyTypeRecord, StaffRecord,
    SyncStatusUpdate, TagRecord,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Repository: Send + Sync {
    // Owner

    async fn find_owner_by_auth_id(&self, auth_id: &str) -> StoreResult<Option<Owner>>;
    async fn find_owner_by_email(&self, email: &str) -> StoreResult<Option<Owner>>;
    async fn find_owner_by_api_key_hash(&self, key_hash: &str) -> StoreResult<Option<Owner>>;
    async fn update_owner_profile(&self, owner_id: LocalId, profile: &OwnerProfile)
        -> StoreResult<()>;
    /// Stamp the key hash and sync time on the owner.
    async fn record_owner_sync(
        &self,
        owner_id: LocalId,
        key_hash: &str,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Update status fields of every owner carrying `key_hash`; returns rows touched.
    async fn write_sync_status(&self, key_hash: &str, update: &SyncStatusUpdate)
        -> StoreResult<u64>;

    // Reference data

    /// Read-only lookup of a pre-seeded location.
    async fn find_location(&self, external_id: ExternalId) -> StoreResult<Option<LocalId>>;
    async fn upsert_property_type(&self, record: &PropertyTypeRecord) -> StoreResult<LocalId>;
    async fn upsert_deal_type(&self, record: &DealTypeRecord) -> StoreResult<LocalId>;
    async fn upsert_tag(&self, record: &TagRecord) -> StoreResult<LocalId>;

    // Operator-scoped entities

    async fn upsert_branch(&self, record: &BranchRecord) -> StoreResult<LocalId>;
    async fn upsert_staff(&self, record: &StaffRecord) -> StoreResult<LocalId>;
    async fn upsert_landlord(&self, record: &LandlordRecord) -> StoreResult<LocalId>;
    async fn upsert_listing(&self, record: &ListingRecord) -> StoreResult<LocalId>;

    // Listing children

    /// Delete the listing's `available` price records, then insert `prices`.
    /// Records in any other status are left alone.
    async fn replace_available_prices(
        &self,
        listing_id: LocalId,
        prices: &[NewPriceRecord],
    ) -> StoreResult<()>;
    async fn upsert_tag_links(&self, listing_id: LocalId, tag_ids: &[LocalId]) -> StoreResult<()>;
    /// Delete every photo of the listing, then insert `photos`.
    async fn replace_photos(&self, listing_id: LocalId, photos: &[PhotoRecord]) -> StoreResult<()>;
    async fn link_landlord(&self, listing_id: LocalId, landlord_id: LocalId) -> StoreResult<()>;
}

#[async_trait]
impl<R: Repository + ?Sized> Repository for Arc<R> {
    async fn find_owner_by_auth_id(&self, auth_id: &str) -> StoreResult<Option<Owner>> {
        (**self).find_owner_by_auth_id(auth_id).await
    }

    async fn find_owner_by_email(&self, email: &str) -> StoreResult<Option<Owner>> {
        (**self).find_owner_by_email(email).await
    }

    async fn find_owner_by_api_key_hash(&self, key_hash: &str) -> StoreResult<Option<Owner>> {
        (**self).find_owner_by_api_key_hash(key_hash).await
    }

    async fn update_owner_profile(
        &self,
        owner_id: LocalId,
        profile: &OwnerProfile,
    ) -> StoreResult<()> {
        (**self).update_owner_profile(owner_id, profile).await
    }

    async fn record_owner_sync(
        &self,
        owner_id: LocalId,
        key_hash: &str,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        (**self).record_owner_sync(owner_id, key_hash, synced_at).await
    }

    async fn write_sync_status(
        &self,
        key_hash: &str,
        update: &SyncStatusUpdate,
    ) -> StoreResult<u64> {
        (**self).write_sync_status(key_hash, update).await
    }

    async fn find_location(&self, external_id: ExternalId) -> StoreResult<Option<LocalId>> {
        (**self).find_location(external_id).await
    }

    async fn upsert_property_type(&self, record: &PropertyTypeRecord) -> StoreResult<LocalId> {
        (**self).upsert_property_type(record).await
    }

    async fn upsert_deal_type(&self, record: &DealTypeRecord) -> StoreResult<LocalId> {
        (**self).upsert_deal_type(record).await
    }

    async fn upsert_tag(&self, record: &TagRecord) -> StoreResult<LocalId> {
        (**self).upsert_tag(record).await
    }

    async fn upsert_branch(&self, record: &BranchRecord) -> StoreResult<LocalId> {
        (**self).upsert_branch(record).await
    }

    async fn upsert_staff(&self, record: &StaffRecord) -> StoreResult<LocalId> {
        (**self).upsert_staff(record).await
    }

    async fn upsert_landlord(&self, record: &LandlordRecord) -> StoreResult<LocalId> {
        (**self).upsert_landlord(record).await
    }

    async fn upsert_listing(&self, record: &ListingRecord) -> StoreResult<LocalId> {
        (**self).upsert_listing(record).await
    }

    async fn replace_available_prices(
        &self,
        listing_id: LocalId,
        prices: &[NewPriceRecord],
    ) -> StoreResult<()> {
        (**self).replace_available_prices(listing_id, prices).await
    }

    async fn upsert_tag_links(&self, listing_id: LocalId, tag_ids: &[LocalId]) -> StoreResult<()> {
        (**self).upsert_tag_links(listing_id, tag_ids).await
    }

    async fn replace_photos(&self, listing_id: LocalId, photos: &[PhotoRecord]) -> StoreResult<()> {
        (**self).replace_photos(listing_id, photos).await
    }

    async fn link_landlord(&self, listing_id: LocalId, landlord_id: LocalId) -> StoreResult<()> {
        (**self).link_landlord(listing_id, landlord_id).await
    }
}
