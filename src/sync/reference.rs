use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::models::{ExternalId, LocalId};
use crate::store::Repository;

/// Run-scoped memo of location lookups.
///
/// Locations are seeded out-of-band and never written by the engine, so
/// a resolved id stays valid for the whole run. Misses are not cached:
/// every unresolved id costs one read and fails with
/// [`SyncError::MissingReferenceData`].
pub struct ReferenceCache<'a, R: Repository + ?Sized> {
    store: &'a R,
    resolved: Mutex<HashMap<ExternalId, LocalId>>,
    reads: AtomicUsize,
}

impl<'a, R: Repository + ?Sized> ReferenceCache<'a, R> {
    pub fn new(store: &'a R) -> Self {
        Self {
            store,
            resolved: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    pub async fn resolve(&self, external_id: ExternalId) -> Result<LocalId> {
        if let Some(id) = self.cached(external_id) {
            return Ok(id);
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        match self.store.find_location(external_id).await? {
            Some(id) => {
                self.resolved
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(external_id, id);
                Ok(id)
            }
            None => Err(SyncError::MissingReferenceData(external_id)),
        }
    }

    /// Resolve an optional id; `None` stays `None`.
    pub async fn resolve_opt(&self, external_id: Option<ExternalId>) -> Result<Option<LocalId>> {
        match external_id {
            Some(id) => self.resolve(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Number of store reads issued so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn cached(&self, external_id: ExternalId) -> Option<LocalId> {
        self.resolved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&external_id)
            .copied()
    }
}
