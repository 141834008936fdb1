//! In-memory [`Repository`] used for dry runs and tests.
//!
//! Mirrors the Postgres store's upsert semantics and additionally keeps
//! a journal of listing writes and status updates, so callers can check
//! write ordering after a run.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Repository, StoreResult};
use crate::error::{EntityKind, StoreError};
use crate::models::{
    BranchRecord, DealTypeRecord, ExternalId, LandlordRecord, ListingRecord, LocalId,
    NewPriceRecord, Owner, OwnerProfile, PhotoRecord, PriceStatus, PropertyTypeRecord,
    StaffRecord, SyncStatusUpdate, TagRecord,
};

/// Ordered record of observable writes.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    ListingUpserted { owner_id: LocalId, external_id: ExternalId },
    Status(SyncStatusUpdate),
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub branches: usize,
    pub staff: usize,
    pub landlords: usize,
    pub listings: usize,
    pub prices: usize,
    pub photos: usize,
    pub tags: usize,
    pub tag_links: usize,
    pub landlord_links: usize,
}

type Keyed<T> = HashMap<(ExternalId, LocalId), (LocalId, T)>;

#[derive(Default)]
struct State {
    next_id: LocalId,
    owners: HashMap<LocalId, Owner>,
    locations: HashMap<ExternalId, LocalId>,
    property_types: HashMap<ExternalId, (LocalId, PropertyTypeRecord)>,
    deal_types: HashMap<ExternalId, (LocalId, DealTypeRecord)>,
    tags: HashMap<ExternalId, (LocalId, TagRecord)>,
    branches: Keyed<BranchRecord>,
    staff: Keyed<StaffRecord>,
    landlords: Keyed<LandlordRecord>,
    listings: Keyed<ListingRecord>,
    prices: Vec<NewPriceRecord>,
    photos: Vec<PhotoRecord>,
    tag_links: BTreeSet<(LocalId, LocalId)>,
    landlord_links: BTreeSet<(LocalId, LocalId)>,
    journal: Vec<JournalEntry>,
    failing: HashSet<(EntityKind, ExternalId)>,
}

impl State {
    fn allocate(&mut self) -> LocalId {
        self.next_id += 1;
        self.next_id
    }

    fn check_failure(&self, kind: EntityKind, external_id: ExternalId) -> StoreResult<()> {
        if self.failing.contains(&(kind, external_id)) {
            return Err(StoreError::Injected(format!(
                "write rejected for {kind} {external_id}"
            )));
        }
        Ok(())
    }
}

fn upsert_keyed<K: Eq + Hash, T>(
    next_id: &mut LocalId,
    table: &mut HashMap<K, (LocalId, T)>,
    key: K,
    record: T,
) -> LocalId {
    match table.get_mut(&key) {
        Some(row) => {
            row.1 = record;
            row.0
        }
        None => {
            *next_id += 1;
            table.insert(key, (*next_id, record));
            *next_id
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an owner, assigning a fresh id. Returns the id.
    pub fn add_owner(&self, owner: Owner) -> LocalId {
        let mut state = self.state();
        let id = state.allocate();
        state.owners.insert(id, Owner { id, ..owner });
        id
    }

    /// Seed a reference location the way the out-of-band loader would.
    pub fn seed_location(&self, external_id: ExternalId) -> LocalId {
        let mut state = self.state();
        if let Some(id) = state.locations.get(&external_id) {
            return *id;
        }
        let id = state.allocate();
        state.locations.insert(external_id, id);
        id
    }

    /// Make every upsert of the given entity fail.
    pub fn fail_writes_for(&self, kind: EntityKind, external_id: ExternalId) {
        self.state().failing.insert((kind, external_id));
    }

    /// Insert a price record directly, bypassing sync.
    pub fn insert_price(&self, record: NewPriceRecord) {
        self.state().prices.push(record);
    }

    pub fn owner(&self, id: LocalId) -> Option<Owner> {
        self.state().owners.get(&id).cloned()
    }

    pub fn listing(&self, owner_id: LocalId, external_id: ExternalId) -> Option<(LocalId, ListingRecord)> {
        self.state().listings.get(&(external_id, owner_id)).cloned()
    }

    pub fn branch(&self, owner_id: LocalId, external_id: ExternalId) -> Option<(LocalId, BranchRecord)> {
        self.state().branches.get(&(external_id, owner_id)).cloned()
    }

    /// All listing ids of an owner as `(external id, local id)`, sorted.
    pub fn listing_ids(&self, owner_id: LocalId) -> Vec<(ExternalId, LocalId)> {
        let mut ids: Vec<_> = self
            .state()
            .listings
            .iter()
            .filter(|((_, owner), _)| *owner == owner_id)
            .map(|((external_id, _), (id, _))| (*external_id, *id))
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn prices_for(&self, listing_id: LocalId) -> Vec<NewPriceRecord> {
        self.state()
            .prices
            .iter()
            .filter(|p| p.listing_id == listing_id)
            .cloned()
            .collect()
    }

    pub fn photos_for(&self, listing_id: LocalId) -> Vec<PhotoRecord> {
        let mut photos: Vec<_> = self
            .state()
            .photos
            .iter()
            .filter(|p| p.listing_id == listing_id)
            .cloned()
            .collect();
        photos.sort_by_key(|p| p.position);
        photos
    }

    pub fn tag_links_for(&self, listing_id: LocalId) -> Vec<LocalId> {
        self.state()
            .tag_links
            .iter()
            .filter(|(listing, _)| *listing == listing_id)
            .map(|(_, tag)| *tag)
            .collect()
    }

    pub fn landlord_links_for(&self, listing_id: LocalId) -> Vec<LocalId> {
        self.state()
            .landlord_links
            .iter()
            .filter(|(listing, _)| *listing == listing_id)
            .map(|(_, landlord)| *landlord)
            .collect()
    }

    pub fn counts(&self) -> TableCounts {
        let state = self.state();
        TableCounts {
            branches: state.branches.len(),
            staff: state.staff.len(),
            landlords: state.landlords.len(),
            listings: state.listings.len(),
            prices: state.prices.len(),
            photos: state.photos.len(),
            tags: state.tags.len(),
            tag_links: state.tag_links.len(),
            landlord_links: state.landlord_links.len(),
        }
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state().journal.clone()
    }

    pub fn status_history(&self) -> Vec<SyncStatusUpdate> {
        self.state()
            .journal
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Status(update) => Some(update.clone()),
                JournalEntry::ListingUpserted { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn find_owner_by_auth_id(&self, auth_id: &str) -> StoreResult<Option<Owner>> {
        Ok(self
            .state()
            .owners
            .values()
            .find(|o| o.auth_id.as_deref() == Some(auth_id))
            .cloned())
    }

    async fn find_owner_by_email(&self, email: &str) -> StoreResult<Option<Owner>> {
        Ok(self
            .state()
            .owners
            .values()
            .find(|o| {
                o.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn find_owner_by_api_key_hash(&self, key_hash: &str) -> StoreResult<Option<Owner>> {
        Ok(self
            .state()
            .owners
            .values()
            .find(|o| o.api_key_hash.as_deref() == Some(key_hash))
            .cloned())
    }

    async fn update_owner_profile(
        &self,
        owner_id: LocalId,
        profile: &OwnerProfile,
    ) -> StoreResult<()> {
        let mut state = self.state();
        let owner = state.owners.get_mut(&owner_id).ok_or(StoreError::NotFound {
            entity: "owner",
            id: owner_id,
        })?;
        owner.display_name = profile.display_name.clone();
        owner.phone = profile.phone.clone();
        owner.logo_url = profile.logo_url.clone();
        owner.operator_email = profile.operator_email.clone();
        Ok(())
    }

    async fn record_owner_sync(
        &self,
        owner_id: LocalId,
        key_hash: &str,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state();
        if !state.owners.contains_key(&owner_id) {
            return Err(StoreError::NotFound {
                entity: "owner",
                id: owner_id,
            });
        }

        for owner in state.owners.values_mut() {
            if owner.id == owner_id {
                owner.api_key_hash = Some(key_hash.to_string());
                owner.last_synced_at = Some(synced_at);
            } else if owner.api_key_hash.as_deref() == Some(key_hash) {
                owner.api_key_hash = None;
            }
        }
        Ok(())
    }

    async fn write_sync_status(
        &self,
        key_hash: &str,
        update: &SyncStatusUpdate,
    ) -> StoreResult<u64> {
        let mut state = self.state();
        let mut touched = 0;
        for owner in state
            .owners
            .values_mut()
            .filter(|o| o.api_key_hash.as_deref() == Some(key_hash))
        {
            owner.sync_status = Some(update.status.as_str().to_string());
            owner.sync_message = Some(update.message.clone());
            if let Some(count) = update.listing_count {
                owner.sync_listing_count = Some(count);
            }
            touched += 1;
        }
        state.journal.push(JournalEntry::Status(update.clone()));
        Ok(touched)
    }

    async fn find_location(&self, external_id: ExternalId) -> StoreResult<Option<LocalId>> {
        Ok(self.state().locations.get(&external_id).copied())
    }

    async fn upsert_property_type(&self, record: &PropertyTypeRecord) -> StoreResult<LocalId> {
        let state = &mut *self.state();
        Ok(upsert_keyed(
            &mut state.next_id,
            &mut state.property_types,
            record.external_id,
            record.clone(),
        ))
    }

    async fn upsert_deal_type(&self, record: &DealTypeRecord) -> StoreResult<LocalId> {
        let state = &mut *self.state();
        Ok(upsert_keyed(
            &mut state.next_id,
            &mut state.deal_types,
            record.external_id,
            record.clone(),
        ))
    }

    async fn upsert_tag(&self, record: &TagRecord) -> StoreResult<LocalId> {
        let state = &mut *self.state();
        Ok(upsert_keyed(
            &mut state.next_id,
            &mut state.tags,
            record.external_id,
            record.clone(),
        ))
    }

    async fn upsert_branch(&self, record: &BranchRecord) -> StoreResult<LocalId> {
        let state = &mut *self.state();
        state.check_failure(EntityKind::Branch, record.external_id)?;
        Ok(upsert_keyed(
            &mut state.next_id,
            &mut state.branches,
            (record.external_id, record.owner_id),
            record.clone(),
        ))
    }

    async fn upsert_staff(&self, record: &StaffRecord) -> StoreResult<LocalId> {
        let state = &mut *self.state();
        state.check_failure(EntityKind::Staff, record.external_id)?;
        Ok(upsert_keyed(
            &mut state.next_id,
            &mut state.staff,
            (record.external_id, record.owner_id),
            record.clone(),
        ))
    }

    async fn upsert_landlord(&self, record: &LandlordRecord) -> StoreResult<LocalId> {
        let state = &mut *self.state();
        state.check_failure(EntityKind::Landlord, record.external_id)?;
        Ok(upsert_keyed(
            &mut state.next_id,
            &mut state.landlords,
            (record.external_id, record.owner_id),
            record.clone(),
        ))
    }

    async fn upsert_listing(&self, record: &ListingRecord) -> StoreResult<LocalId> {
        let state = &mut *self.state();
        state.check_failure(EntityKind::Property, record.external_id)?;
        let id = upsert_keyed(
            &mut state.next_id,
            &mut state.listings,
            (record.external_id, record.owner_id),
            record.clone(),
        );
        state.journal.push(JournalEntry::ListingUpserted {
            owner_id: record.owner_id,
            external_id: record.external_id,
        });
        Ok(id)
    }

    async fn replace_available_prices(
        &self,
        listing_id: LocalId,
        prices: &[NewPriceRecord],
    ) -> StoreResult<()> {
        let mut state = self.state();
        state
            .prices
            .retain(|p| !(p.listing_id == listing_id && p.status == PriceStatus::Available));
        state.prices.extend(prices.iter().cloned());
        Ok(())
    }

    async fn upsert_tag_links(&self, listing_id: LocalId, tag_ids: &[LocalId]) -> StoreResult<()> {
        let mut state = self.state();
        state
            .tag_links
            .extend(tag_ids.iter().map(|tag_id| (listing_id, *tag_id)));
        Ok(())
    }

    async fn replace_photos(&self, listing_id: LocalId, photos: &[PhotoRecord]) -> StoreResult<()> {
        let mut state = self.state();
        state.photos.retain(|p| p.listing_id != listing_id);
        state.photos.extend(photos.iter().cloned());
        Ok(())
    }

    async fn link_landlord(&self, listing_id: LocalId, landlord_id: LocalId) -> StoreResult<()> {
        self.state().landlord_links.insert((listing_id, landlord_id));
        Ok(())
    }
}
