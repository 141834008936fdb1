//! Rows the engine reads from and writes to the local store.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{ExternalId, LocalId};

/// The platform account on whose behalf a run executes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Owner {
    pub id: LocalId,
    pub auth_id: Option<String>,
    pub email: Option<String>,
    pub api_key_hash: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub operator_email: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_status: Option<String>,
    pub sync_message: Option<String>,
    pub sync_listing_count: Option<i32>,
}

impl Owner {
    /// Contact fields of this owner, for merging with a branch profile.
    pub fn profile(&self) -> OwnerProfile {
        OwnerProfile {
            display_name: self.display_name.clone(),
            phone: self.phone.clone(),
            logo_url: self.logo_url.clone(),
            operator_email: self.operator_email.clone(),
        }
    }
}

/// Contact fields backfilled from the operator's primary branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub operator_email: Option<String>,
}

impl OwnerProfile {
    /// Incoming values win when present; existing values are kept otherwise.
    pub fn merged_over(self, existing: &OwnerProfile) -> OwnerProfile {
        fn pick(incoming: Option<String>, existing: &Option<String>) -> Option<String> {
            incoming
                .filter(|v| !v.trim().is_empty())
                .or_else(|| existing.clone())
        }

        OwnerProfile {
            display_name: pick(self.display_name, &existing.display_name),
            phone: pick(self.phone, &existing.phone),
            logo_url: pick(self.logo_url, &existing.logo_url),
            operator_email: pick(self.operator_email, &existing.operator_email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub owner_id: LocalId,
    pub external_id: ExternalId,
    pub name: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub alternative_phone: Option<String>,
    pub address: Option<String>,
    pub contact_time: Option<String>,
    pub logo_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_default: bool,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffRecord {
    pub owner_id: LocalId,
    pub external_id: ExternalId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cellphone: Option<String>,
    pub picture_url: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandlordRecord {
    pub owner_id: LocalId,
    pub external_id: ExternalId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cellphone: Option<String>,
    pub document_number: Option<String>,
    pub notes: Option<String>,
}

/// Reference vocabulary; shared across owners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTypeRecord {
    pub external_id: ExternalId,
    pub name: String,
    pub code: Option<String>,
}

/// Deal type (sale, rent, temporary rent) kept as reference metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealTypeRecord {
    pub external_id: ExternalId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub external_id: ExternalId,
    pub name: String,
    pub kind: Option<i32>,
}

/// Amenity flags derived from a listing's tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amenities {
    pub pool: bool,
    pub garden: bool,
    pub grill: bool,
    pub laundry: bool,
    pub elevator: bool,
    pub gym: bool,
    pub security: bool,
    pub balcony: bool,
    pub terrace: bool,
    pub furnished: bool,
    pub pets_allowed: bool,
}

impl Amenities {
    pub fn from_tag_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut flags = Amenities::default();
        for name in names {
            let name = name.to_lowercase();
            let has = |needles: &[&str]| needles.iter().any(|n| name.contains(n));

            flags.pool |= has(&["pool", "pileta", "piscina"]);
            flags.garden |= has(&["garden", "jardin", "jardín", "parque"]);
            flags.grill |= has(&["grill", "parrilla", "barbecue"]);
            flags.laundry |= has(&["laundry", "lavadero", "laundromat"]);
            flags.elevator |= has(&["elevator", "ascensor"]);
            flags.gym |= has(&["gym", "gimnasio"]);
            flags.security |= has(&["security", "seguridad", "vigilancia"]);
            flags.balcony |= has(&["balcony", "balcon", "balcón"]);
            flags.terrace |= has(&["terrace", "terraza"]);
            flags.furnished |= has(&["furnished", "amoblado", "amueblado"]);
            flags.pets_allowed |= has(&["pets", "mascotas", "apto mascota"]);
        }
        flags
    }
}

/// Full listing row, keyed by (external id, owner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub owner_id: LocalId,
    pub external_id: ExternalId,
    /// Always true for rows written by the engine.
    pub source_flag: bool,
    pub branch_id: Option<LocalId>,
    pub staff_id: Option<LocalId>,
    pub location_id: Option<LocalId>,
    pub parent_division_location_id: Option<LocalId>,
    pub type_id: Option<LocalId>,

    pub reference_code: Option<String>,
    pub title: Option<String>,
    pub address: Option<String>,
    pub real_address: Option<String>,
    pub fake_address: Option<String>,
    pub description: Option<String>,
    pub rich_description: Option<String>,
    pub public_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub rooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub suites: Option<i32>,
    pub toilets: Option<i32>,
    pub parking_lots: Option<i32>,
    pub floors: Option<i32>,
    pub age: Option<i32>,
    pub surface: Option<f64>,
    pub roofed_surface: Option<f64>,
    pub semiroofed_surface: Option<f64>,
    pub unroofed_surface: Option<f64>,
    pub total_surface: Option<f64>,
    pub surface_measurement: Option<String>,
    pub orientation: Option<String>,
    pub disposition: Option<String>,
    pub property_condition: Option<String>,
    pub situation: Option<String>,
    pub remote_status: Option<i32>,
    pub expenses: Option<f64>,

    pub amenities: Amenities,
    /// Deal types offered remotely (id and name), including non-rental ones.
    pub deal_types: serde_json::Value,
    pub extra_attributes: serde_json::Value,
    pub custom_tags: serde_json::Value,
    pub videos: serde_json::Value,
}

/// Lifecycle state of a price record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceStatus {
    Available,
    Leased,
    Finished,
    Cancelled,
}

impl PriceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceStatus::Available => "available",
            PriceStatus::Leased => "leased",
            PriceStatus::Finished => "finished",
            PriceStatus::Cancelled => "cancelled",
        }
    }
}

/// A rental offer (or cost-only placeholder) on a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPriceRecord {
    pub listing_id: LocalId,
    pub deal_type_id: Option<ExternalId>,
    pub status: PriceStatus,
    pub currency: Option<String>,
    pub price: Option<f64>,
    pub period: Option<i32>,
    pub secondary_currency: Option<String>,
    pub secondary_price: Option<f64>,
    pub expenses: Option<f64>,
    pub cleaning_tax: Option<f64>,
    pub insurance: Option<f64>,
    pub down_payment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub listing_id: LocalId,
    pub image_url: Option<String>,
    pub thumb_url: Option<String>,
    pub original_url: Option<String>,
    pub description: Option<String>,
    pub position: i32,
    pub is_blueprint: bool,
    pub is_front_cover: bool,
}

/// Coarse run status surfaced on the owner row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Syncing,
    Done,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Syncing => "syncing",
            SyncStatus::Done => "done",
            SyncStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusUpdate {
    pub status: SyncStatus,
    pub message: String,
    pub listing_count: Option<i32>,
}
