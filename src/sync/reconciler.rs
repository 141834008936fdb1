//! Idempotent persistence of one remote entity at a time.
//!
//! Every public operation returns a labelled [`SyncError::Entity`] on
//! failure instead of aborting; the orchestrator decides what is fatal.

use std::collections::{BTreeMap, HashMap};

use futures::future::{join_all, try_join_all};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{EntityKind, Result, SyncError};
use crate::models::{
    Amenities, BranchRecord, DealTypeRecord, ExternalId, LandlordRecord, ListingRecord, LocalId,
    NewPriceRecord, PhotoRecord, PriceStatus, PropertyTypeRecord, RemoteBranch, RemoteLandlord,
    RemoteListing, RemoteOperation, RemotePhoto, RemotePropertyType, RemoteStaff, RemoteTag,
    StaffRecord, TagRecord,
};
use crate::store::Repository;
use crate::sync::reference::ReferenceCache;

/// Price tiers kept per offer; the rest are dropped with a warning.
pub const MAX_PRICE_TIERS: usize = 2;

/// Local ids produced earlier in the run, used to link listings.
#[derive(Debug, Default, Clone)]
pub struct RunLinks {
    pub branches: HashMap<ExternalId, LocalId>,
    pub staff: HashMap<ExternalId, LocalId>,
    pub landlords: HashMap<ExternalId, LocalId>,
    pub property_types: HashMap<ExternalId, LocalId>,
    pub tags: HashMap<ExternalId, LocalId>,
}

/// Local ids a listing row points at.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListingRefs {
    pub branch_id: Option<LocalId>,
    pub staff_id: Option<LocalId>,
    pub location_id: Option<LocalId>,
    pub parent_division_location_id: Option<LocalId>,
    pub type_id: Option<LocalId>,
}

pub struct Reconciler<'a, R: Repository + ?Sized> {
    store: &'a R,
    locations: ReferenceCache<'a, R>,
}

impl<'a, R: Repository + ?Sized> Reconciler<'a, R> {
    /// A reconciler with a fresh reference cache; build one per run.
    pub fn new(store: &'a R) -> Self {
        Self {
            store,
            locations: ReferenceCache::new(store),
        }
    }

    pub fn locations(&self) -> &ReferenceCache<'a, R> {
        &self.locations
    }

    pub async fn upsert_branch(&self, owner_id: LocalId, branch: &RemoteBranch) -> Result<LocalId> {
        let record = BranchRecord {
            owner_id,
            external_id: branch.id,
            name: branch.name.clone(),
            display_name: branch.display_name.clone(),
            email: branch.email.clone(),
            phone: branch.phone.clone(),
            alternative_phone: branch.alternative_phone.clone(),
            address: branch.address.clone(),
            contact_time: branch.contact_time.clone(),
            logo_url: branch.logo.clone(),
            latitude: branch.geo_lat,
            longitude: branch.geo_long,
            is_default: branch.is_default,
            created_at: branch.created_date,
        };
        self.store
            .upsert_branch(&record)
            .await
            .map_err(|e| SyncError::entity(EntityKind::Branch, branch.id, e))
    }

    pub async fn upsert_staff(&self, owner_id: LocalId, staff: &RemoteStaff) -> Result<LocalId> {
        let record = StaffRecord {
            owner_id,
            external_id: staff.id,
            name: staff.name.clone(),
            email: staff.email.clone(),
            phone: staff.phone.clone(),
            cellphone: staff.cellphone.clone(),
            picture_url: staff.picture.clone(),
            position: staff.position.clone(),
        };
        self.store
            .upsert_staff(&record)
            .await
            .map_err(|e| SyncError::entity(EntityKind::Staff, staff.id, e))
    }

    pub async fn upsert_landlord(
        &self,
        owner_id: LocalId,
        landlord: &RemoteLandlord,
    ) -> Result<LocalId> {
        let record = LandlordRecord {
            owner_id,
            external_id: landlord.id,
            name: landlord.name.clone(),
            email: landlord.email.clone(),
            phone: landlord.phone.clone(),
            cellphone: landlord.cellphone.clone(),
            document_number: landlord.document_number.clone(),
            notes: landlord.comment.clone(),
        };
        self.store
            .upsert_landlord(&record)
            .await
            .map_err(|e| SyncError::entity(EntityKind::Landlord, landlord.id, e))
    }

    pub async fn upsert_property_type(&self, kind: &RemotePropertyType) -> Result<LocalId> {
        let record = PropertyTypeRecord {
            external_id: kind.id,
            name: kind.name.clone(),
            code: kind.code.clone(),
        };
        Ok(self.store.upsert_property_type(&record).await?)
    }

    /// Record a deal type as reference metadata, whatever its kind.
    pub async fn upsert_deal_type(&self, operation: &RemoteOperation) -> Result<LocalId> {
        let record = DealTypeRecord {
            external_id: operation.operation_id,
            name: operation.operation_type.clone(),
        };
        Ok(self.store.upsert_deal_type(&record).await?)
    }

    pub async fn upsert_tag(&self, tag: &RemoteTag) -> Result<LocalId> {
        let record = TagRecord {
            external_id: tag.id,
            name: tag.name.clone(),
            kind: tag.kind,
        };
        Ok(self.store.upsert_tag(&record).await?)
    }

    /// Upsert the distinct property types, deal types and tags referenced by
    /// `listings`, once each. Failures are logged; listings retry the missing
    /// entries on demand.
    pub async fn register_vocabulary(&self, listings: &[RemoteListing]) -> RunLinks {
        let mut kinds: BTreeMap<ExternalId, &RemotePropertyType> = BTreeMap::new();
        let mut deals: BTreeMap<ExternalId, &RemoteOperation> = BTreeMap::new();
        let mut tags: BTreeMap<ExternalId, &RemoteTag> = BTreeMap::new();
        for listing in listings {
            if let Some(kind) = &listing.property_type {
                kinds.entry(kind.id).or_insert(kind);
            }
            for op in &listing.operations {
                deals.entry(op.operation_id).or_insert(op);
            }
            for tag in &listing.tags {
                tags.entry(tag.id).or_insert(tag);
            }
        }

        let (kind_ids, deal_results, tag_ids) = tokio::join!(
            join_all(kinds.values().map(|k| async move { (k.id, self.upsert_property_type(k).await) })),
            join_all(deals.values().map(|op| async move { (op.operation_id, self.upsert_deal_type(op).await) })),
            join_all(tags.values().map(|t| async move { (t.id, self.upsert_tag(t).await) })),
        );

        for (id, result) in &deal_results {
            if let Err(e) = result {
                warn!(deal_type = id, error = %e, "Failed to record deal type");
            }
        }

        RunLinks {
            property_types: collect_ids("property type", kind_ids),
            tags: collect_ids("tag", tag_ids),
            ..RunLinks::default()
        }
    }

    /// Full reconciliation of one listing and its children.
    pub async fn reconcile_listing(
        &self,
        owner_id: LocalId,
        listing: &RemoteListing,
        links: &RunLinks,
    ) -> Result<LocalId> {
        self.reconcile_listing_inner(owner_id, listing, links)
            .await
            .map_err(|e| SyncError::entity(EntityKind::Property, listing.id, e))
    }

    async fn reconcile_listing_inner(
        &self,
        owner_id: LocalId,
        listing: &RemoteListing,
        links: &RunLinks,
    ) -> Result<LocalId> {
        let type_id = match &listing.property_type {
            Some(kind) => match links.property_types.get(&kind.id) {
                Some(id) => Some(*id),
                None => Some(self.upsert_property_type(kind).await?),
            },
            None => None,
        };

        let mut tag_ids = Vec::with_capacity(listing.tags.len());
        for tag in &listing.tags {
            match links.tags.get(&tag.id) {
                Some(id) => tag_ids.push(*id),
                None => tag_ids.push(self.upsert_tag(tag).await?),
            }
        }

        let location_id = self
            .locations
            .resolve_opt(listing.location.as_ref().map(|l| l.id))
            .await?;
        let parent_division_location_id = self
            .locations
            .resolve_opt(listing.location.as_ref().and_then(|l| l.parent_division_id()))
            .await?;

        let refs = ListingRefs {
            branch_id: listing
                .branch
                .as_ref()
                .and_then(|b| links.branches.get(&b.id).copied()),
            staff_id: listing
                .producer
                .as_ref()
                .and_then(|p| links.staff.get(&p.id).copied()),
            location_id,
            parent_division_location_id,
            type_id,
        };

        let listing_id = self.upsert_listing(owner_id, listing, refs).await?;

        tokio::try_join!(
            self.reconcile_prices(listing_id, listing),
            self.reconcile_tag_links(listing_id, &tag_ids),
            self.reconcile_photos(listing_id, &listing.photos),
            self.reconcile_landlord_links(listing_id, listing.landlords(), &links.landlords),
        )?;

        debug!(external_id = listing.id, listing_id, "Listing reconciled");
        Ok(listing_id)
    }

    /// Upsert the listing row. Reference data must already be in place.
    pub async fn upsert_listing(
        &self,
        owner_id: LocalId,
        listing: &RemoteListing,
        refs: ListingRefs,
    ) -> Result<LocalId> {
        let record = listing_record(owner_id, listing, refs);
        Ok(self.store.upsert_listing(&record).await?)
    }

    /// Replace the listing's available price records with its rent offers.
    /// Returns the number of records written.
    pub async fn reconcile_prices(&self, listing_id: LocalId, listing: &RemoteListing) -> Result<usize> {
        let (prices, dropped) = price_records(listing_id, listing);
        if dropped > 0 {
            warn!(
                external_id = listing.id,
                dropped,
                "Offer has more than {MAX_PRICE_TIERS} price tiers; extra tiers ignored"
            );
        }
        self.store.replace_available_prices(listing_id, &prices).await?;
        Ok(prices.len())
    }

    pub async fn reconcile_tag_links(&self, listing_id: LocalId, tag_ids: &[LocalId]) -> Result<()> {
        self.store.upsert_tag_links(listing_id, tag_ids).await?;
        Ok(())
    }

    pub async fn reconcile_photos(&self, listing_id: LocalId, photos: &[RemotePhoto]) -> Result<usize> {
        let records = photo_records(listing_id, photos);
        self.store.replace_photos(listing_id, &records).await?;
        Ok(records.len())
    }

    /// Link the listing to every landlord this run has stored. Landlords
    /// whose upsert failed are already reported and stay unlinked.
    pub async fn reconcile_landlord_links(
        &self,
        listing_id: LocalId,
        landlords: &[RemoteLandlord],
        known: &HashMap<ExternalId, LocalId>,
    ) -> Result<usize> {
        let mut landlord_ids = Vec::with_capacity(landlords.len());
        for landlord in landlords {
            match known.get(&landlord.id) {
                Some(id) => landlord_ids.push(*id),
                None => debug!(listing_id, landlord = landlord.id, "Skipping link to unsynced landlord"),
            }
        }

        try_join_all(
            landlord_ids
                .iter()
                .map(|landlord_id| self.store.link_landlord(listing_id, *landlord_id)),
        )
        .await?;
        Ok(landlord_ids.len())
    }
}

fn collect_ids(
    what: &str,
    results: Vec<(ExternalId, Result<LocalId>)>,
) -> HashMap<ExternalId, LocalId> {
    results
        .into_iter()
        .filter_map(|(external_id, result)| match result {
            Ok(id) => Some((external_id, id)),
            Err(e) => {
                warn!(external_id, error = %e, "Failed to register {what}");
                None
            }
        })
        .collect()
}

/// Map a remote listing onto its local row.
pub fn listing_record(owner_id: LocalId, listing: &RemoteListing, refs: ListingRefs) -> ListingRecord {
    let deal_types: Vec<_> = listing
        .operations
        .iter()
        .map(|op| json!({ "id": op.operation_id, "name": op.operation_type }))
        .collect();

    ListingRecord {
        owner_id,
        external_id: listing.id,
        source_flag: true,
        branch_id: refs.branch_id,
        staff_id: refs.staff_id,
        location_id: refs.location_id,
        parent_division_location_id: refs.parent_division_location_id,
        type_id: refs.type_id,
        reference_code: listing.reference_code.clone(),
        title: listing.publication_title.clone(),
        address: listing.address.clone(),
        real_address: listing.real_address.clone(),
        fake_address: listing.fake_address.clone(),
        description: listing.description.clone(),
        rich_description: listing.rich_description.clone(),
        public_url: listing.public_url.clone(),
        latitude: listing.geo_lat,
        longitude: listing.geo_long,
        rooms: listing.room_amount,
        bathrooms: listing.bathroom_amount,
        suites: listing.suite_amount,
        toilets: listing.toilet_amount,
        parking_lots: listing.parking_lot_amount,
        floors: listing.floors_amount,
        age: listing.age,
        surface: listing.surface,
        roofed_surface: listing.roofed_surface,
        semiroofed_surface: listing.semiroofed_surface,
        unroofed_surface: listing.unroofed_surface,
        total_surface: listing.total_surface,
        surface_measurement: listing.surface_measurement.clone(),
        orientation: listing.orientation.clone(),
        disposition: listing.disposition.clone(),
        property_condition: listing.property_condition.clone(),
        situation: listing.situation.clone(),
        remote_status: listing.status,
        expenses: listing.expenses,
        amenities: Amenities::from_tag_names(listing.tags.iter().map(|t| t.name.as_str())),
        deal_types: serde_json::Value::Array(deal_types),
        extra_attributes: listing.extra_attributes.clone(),
        custom_tags: listing.custom_tags.clone(),
        videos: listing.videos.clone(),
    }
}

/// Price records for a listing's rent offers, plus the count of tiers
/// dropped beyond [`MAX_PRICE_TIERS`].
///
/// Without any rent offer a single cost-only placeholder is produced.
pub fn price_records(listing_id: LocalId, listing: &RemoteListing) -> (Vec<NewPriceRecord>, usize) {
    let costs = NewPriceRecord {
        listing_id,
        deal_type_id: None,
        status: PriceStatus::Available,
        currency: None,
        price: None,
        period: None,
        secondary_currency: None,
        secondary_price: None,
        expenses: listing.expenses,
        cleaning_tax: listing.cleaning_tax,
        insurance: listing.insurance,
        down_payment: listing.down_payment,
    };

    let rentals: Vec<&RemoteOperation> = listing.operations.iter().filter(|op| op.is_rental()).collect();
    if rentals.is_empty() {
        return (vec![costs], 0);
    }

    let mut dropped = 0;
    let records: Vec<NewPriceRecord> = rentals
        .into_iter()
        .map(|op| {
            dropped += op.prices.len().saturating_sub(MAX_PRICE_TIERS);
            let mut tiers = op.prices.iter().take(MAX_PRICE_TIERS);
            let first = tiers.next();
            let second = tiers.next();

            NewPriceRecord {
                deal_type_id: Some(op.operation_id),
                currency: first.and_then(|p| p.currency.clone()),
                price: first.and_then(|p| p.price),
                period: first.and_then(|p| p.period),
                secondary_currency: second.and_then(|p| p.currency.clone()),
                secondary_price: second.and_then(|p| p.price),
                ..costs.clone()
            }
        })
        .collect();

    (records, dropped)
}

/// Photo rows in remote display order.
pub fn photo_records(listing_id: LocalId, photos: &[RemotePhoto]) -> Vec<PhotoRecord> {
    let mut ordered: Vec<&RemotePhoto> = photos.iter().collect();
    ordered.sort_by_key(|p| p.order);

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, photo)| PhotoRecord {
            listing_id,
            image_url: photo.image.clone(),
            thumb_url: photo.thumb.clone(),
            original_url: photo.original.clone(),
            description: photo.description.clone(),
            position: position as i32,
            is_blueprint: photo.is_blueprint,
            is_front_cover: photo.is_front_cover,
        })
        .collect()
}
