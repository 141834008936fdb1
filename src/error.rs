use std::fmt;

use crate::models::ExternalId;

/// Failures raised by a [`Repository`](crate::store::Repository) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Raised by the in-memory store when a write was set up to fail.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Kind of entity a per-entity error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Branch,
    Staff,
    Landlord,
    Property,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Branch => "Branch",
            EntityKind::Staff => "Staff",
            EntityKind::Landlord => "Landlord",
            EntityKind::Property => "Property",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no owner matches the auth id, email or API key")]
    OwnerNotFound,

    #[error("remote catalog unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("location {0} is missing from reference data; locations must be seeded before syncing")]
    MissingReferenceData(ExternalId),

    #[error("no properties found for this API key")]
    NoListings,

    #[error("sync cancelled after {synced} of {total} properties")]
    Cancelled { synced: usize, total: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A failure scoped to one entity, rendered as `Branch 12: <detail>`.
    #[error("{kind} {external_id}: {source}")]
    Entity {
        kind: EntityKind,
        external_id: ExternalId,
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn entity(kind: EntityKind, external_id: ExternalId, source: impl Into<SyncError>) -> Self {
        SyncError::Entity {
            kind,
            external_id,
            source: Box::new(source.into()),
        }
    }

    /// The innermost error, skipping entity labels.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Entity { source, .. } => source.root(),
            other => other,
        }
    }
}

/// The request URL carries the operator key, so it is stripped.
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::RemoteUnavailable(err.without_url().to_string())
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
