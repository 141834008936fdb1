//! Wire types returned by the brokerage API.
//!
//! The API is loose about numbers: coordinates and surfaces arrive as
//! strings on some accounts and as numbers on others, and empty strings
//! stand in for missing values. The `lenient` helpers below accept both.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use super::ExternalId;

/// A physical office of the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBranch {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub alternative_phone: Option<String>,
    pub address: Option<String>,
    pub contact_time: Option<String>,
    pub logo: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub geo_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub geo_long: Option<f64>,
    #[serde(default)]
    pub is_default: bool,
    pub created_date: Option<NaiveDateTime>,
}

/// A user of the operator's organization ("producer")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStaff {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cellphone: Option<String>,
    pub picture: Option<String>,
    pub position: Option<String>,
}

/// A property owner tracked by the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLandlord {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cellphone: Option<String>,
    pub document_number: Option<String>,
    pub comment: Option<String>,
}

/// Geographic node attached to a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLocation {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    pub full_location: Option<String>,
    /// URL-shaped reference, e.g. `/api/v1/location/24728/`
    pub parent_division: Option<String>,
}

impl RemoteLocation {
    /// Numeric id embedded in `parent_division`, if any.
    pub fn parent_division_id(&self) -> Option<ExternalId> {
        self.parent_division
            .as_deref()?
            .trim_end_matches('/')
            .rsplit('/')
            .next()?
            .parse()
            .ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePropertyType {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    pub code: Option<String>,
}

/// One price tier of an offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePrice {
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub price: Option<f64>,
    pub period: Option<i32>,
}

/// A commercial offer (sale, rent, temporary rent) on a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOperation {
    pub operation_id: ExternalId,
    #[serde(default)]
    pub operation_type: String,
    #[serde(default)]
    pub prices: Vec<RemotePrice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePhoto {
    pub image: Option<String>,
    pub thumb: Option<String>,
    pub original: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub is_blueprint: bool,
    #[serde(default)]
    pub is_front_cover: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTag {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<i32>,
}

/// Reference to another remote entity by id only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRef {
    pub id: ExternalId,
}

/// Operator-private section of a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InternalData {
    #[serde(default)]
    pub property_owners: Vec<RemoteLandlord>,
}

/// A listing as returned by the property search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteListing {
    pub id: ExternalId,
    pub reference_code: Option<String>,
    pub publication_title: Option<String>,
    pub address: Option<String>,
    pub real_address: Option<String>,
    pub fake_address: Option<String>,
    pub description: Option<String>,
    pub rich_description: Option<String>,
    pub public_url: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub geo_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub geo_long: Option<f64>,

    pub location: Option<RemoteLocation>,
    #[serde(rename = "type")]
    pub property_type: Option<RemotePropertyType>,
    pub branch: Option<RemoteRef>,
    pub producer: Option<RemoteRef>,
    #[serde(default)]
    pub internal_data: Option<InternalData>,

    #[serde(default)]
    pub operations: Vec<RemoteOperation>,
    #[serde(default)]
    pub photos: Vec<RemotePhoto>,
    #[serde(default)]
    pub tags: Vec<RemoteTag>,

    pub room_amount: Option<i32>,
    pub bathroom_amount: Option<i32>,
    pub suite_amount: Option<i32>,
    pub toilet_amount: Option<i32>,
    pub parking_lot_amount: Option<i32>,
    pub floors_amount: Option<i32>,
    pub age: Option<i32>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub surface: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub roofed_surface: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub semiroofed_surface: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub unroofed_surface: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub total_surface: Option<f64>,
    pub surface_measurement: Option<String>,
    pub orientation: Option<String>,
    pub disposition: Option<String>,
    pub property_condition: Option<String>,
    pub situation: Option<String>,
    pub status: Option<i32>,

    #[serde(default, deserialize_with = "lenient::f64")]
    pub expenses: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub cleaning_tax: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub insurance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub down_payment: Option<f64>,

    #[serde(default)]
    pub extra_attributes: serde_json::Value,
    #[serde(default)]
    pub custom_tags: serde_json::Value,
    #[serde(default)]
    pub videos: serde_json::Value,
}

impl RemoteListing {
    /// Landlords attached to this listing, empty when the API key cannot
    /// see internal data.
    pub fn landlords(&self) -> &[RemoteLandlord] {
        self.internal_data
            .as_ref()
            .map(|d| d.property_owners.as_slice())
            .unwrap_or(&[])
    }
}

mod lenient {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    pub fn f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(
            match Option::<NumberOrString>::deserialize(deserializer)? {
                Some(NumberOrString::Number(n)) => Some(n),
                Some(NumberOrString::Text(s)) => parse_decimal(&s),
                None => None,
            },
        )
    }

    /// Parse a localized decimal. With both separators present the last one
    /// is the decimal point; a lone comma is a decimal comma.
    pub fn parse_decimal(raw: &str) -> Option<f64> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        let normalized = match (text.rfind(','), text.rfind('.')) {
            (Some(comma), Some(dot)) if comma > dot => text.replace('.', "").replace(',', "."),
            (Some(_), Some(_)) => text.replace(',', ""),
            (Some(_), None) => text.replace(',', "."),
            _ => text.to_string(),
        };

        let parsed: Option<f64> = normalized.parse().ok();
        if parsed.is_none() {
            tracing::debug!(value = raw, "Ignoring unparseable number");
        }
        parsed
    }
}
