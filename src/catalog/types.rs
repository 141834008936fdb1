use serde::{Deserialize, Serialize};

use crate::models::{ExternalId, RemoteOperation};

/// Upper bound the brokerage accepts for one search.
pub const MAX_LISTING_LIMIT: usize = 500;

/// Deal types known to the brokerage API, by their remote id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealType {
    Sale,
    Rent,
    TemporaryRent,
}

impl DealType {
    pub fn id(&self) -> ExternalId {
        match self {
            DealType::Sale => 1,
            DealType::Rent => 2,
            DealType::TemporaryRent => 3,
        }
    }

    pub fn from_id(id: ExternalId) -> Option<Self> {
        match id {
            1 => Some(DealType::Sale),
            2 => Some(DealType::Rent),
            3 => Some(DealType::TemporaryRent),
            _ => None,
        }
    }
}

impl RemoteOperation {
    pub fn deal_type(&self) -> Option<DealType> {
        DealType::from_id(self.operation_id).or_else(|| {
            match self.operation_type.trim().to_lowercase().as_str() {
                "sale" => Some(DealType::Sale),
                "rent" => Some(DealType::Rent),
                "temporary rent" => Some(DealType::TemporaryRent),
                _ => None,
            }
        })
    }

    /// Only plain rent offers are persisted as price records.
    pub fn is_rental(&self) -> bool {
        self.deal_type() == Some(DealType::Rent)
    }
}

/// Property types the engine syncs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    Apartment,
    House,
    /// Horizontal property unit ("PH")
    Ph,
}

impl PropertyKind {
    pub fn id(&self) -> ExternalId {
        match self {
            PropertyKind::Apartment => 2,
            PropertyKind::House => 3,
            PropertyKind::Ph => 13,
        }
    }
}

/// Filters for the listing search endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub operation_types: Vec<ExternalId>,
    pub property_types: Vec<ExternalId>,
}

impl SearchFilters {
    /// Rent offers on apartments, houses and PH units.
    pub fn rentals() -> Self {
        Self {
            operation_types: vec![DealType::Rent.id()],
            property_types: [PropertyKind::Apartment, PropertyKind::House, PropertyKind::Ph]
                .iter()
                .map(PropertyKind::id)
                .collect(),
        }
    }
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self::rentals()
    }
}

/// Clamp a requested listing limit to `[1, MAX_LISTING_LIMIT]`.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LISTING_LIMIT)
}
