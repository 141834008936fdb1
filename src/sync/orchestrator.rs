//! End-to-end sync run for one operator.
//!
//! Phases run strictly in sequence: owner resolution, remote fetch,
//! branch/staff/landlord reconciliation, then listings in fixed-size
//! batches. Within a phase members run concurrently and fan back in
//! before the next phase starts. Per-entity failures are collected into
//! the result; only setup failures abort the run.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{clamp_limit, CatalogClient, CatalogConnector, SearchFilters};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::{ExternalId, LocalId, Owner, OwnerProfile, RemoteBranch, RemoteLandlord, RemoteListing};
use crate::store::Repository;
use crate::sync::reconciler::{Reconciler, RunLinks};
use crate::sync::status::{api_key_hash, StatusReporter};

/// Inbound trigger for one run.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub api_key: String,
    pub listing_limit: usize,
    pub auth_id: Option<String>,
    pub auth_email: Option<String>,
}

/// Summary of a completed run. A run may finish with entity errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub owner_id: LocalId,
    pub branches: usize,
    pub staff: usize,
    pub landlords: usize,
    pub listings: usize,
    pub total_listings: usize,
    pub errors: Vec<String>,
}

/// Outcome of one concurrent reconciliation group.
#[derive(Debug, Default)]
struct GroupOutcome {
    ids: HashMap<ExternalId, LocalId>,
    errors: Vec<String>,
}

pub struct Orchestrator<R, C> {
    store: R,
    connector: C,
    config: SyncConfig,
}

impl<R, C> Orchestrator<R, C>
where
    R: Repository,
    C: CatalogConnector,
{
    pub fn new(store: R, connector: C, config: SyncConfig) -> Self {
        Self {
            store,
            connector,
            config,
        }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub async fn run_sync(&self, request: &SyncRequest) -> Result<SyncResult> {
        self.run_sync_cancellable(request, CancellationToken::new())
            .await
    }

    /// Like [`run_sync`](Self::run_sync), stopping before the next listing
    /// batch once `cancel` fires. Batches already written stay written.
    pub async fn run_sync_cancellable(
        &self,
        request: &SyncRequest,
        cancel: CancellationToken,
    ) -> Result<SyncResult> {
        let key_hash = api_key_hash(&request.api_key);
        let status = StatusReporter::new(&self.store, key_hash.clone());

        match self.execute(request, &key_hash, &status, &cancel).await {
            Ok(result) => {
                status.done(result.listings, result.total_listings).await;
                info!(
                    owner_id = result.owner_id,
                    listings = result.listings,
                    total = result.total_listings,
                    errors = result.errors.len(),
                    "Sync finished"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Sync failed");
                status.error(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &SyncRequest,
        key_hash: &str,
        status: &StatusReporter<'_, R>,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        let owner = self.resolve_owner(request, key_hash).await?;
        self.store
            .record_owner_sync(owner.id, key_hash, Utc::now())
            .await?;
        info!(owner_id = owner.id, "Owner resolved");
        status.syncing("Starting sync").await;

        let client = self.connector.connect(&request.api_key)?;
        status
            .syncing(format!("Fetching catalog from {}", client.source_name()))
            .await;

        let limit = clamp_limit(request.listing_limit);
        let filters = SearchFilters::rentals();
        let (branches, staff, listings) = tokio::try_join!(
            client.fetch_all_branches(),
            client.fetch_all_staff(),
            client.search_listings(limit, &filters),
        )?;

        if let Some(primary) = primary_branch(&branches) {
            self.backfill_owner(&owner, primary).await;
        }

        if listings.is_empty() {
            return Err(SyncError::NoListings);
        }

        let landlords = distinct_landlords(&listings);
        status
            .syncing(format!(
                "Syncing {} branches, {} staff and {} landlords",
                branches.len(),
                staff.len(),
                landlords.len()
            ))
            .await;

        let reconciler = Reconciler::new(&self.store);
        let concurrency = self.config.entity_concurrency;
        let (branch_group, staff_group, landlord_group, vocabulary) = tokio::join!(
            reconcile_group(&branches, concurrency, |b| b.id, |b| {
                reconciler.upsert_branch(owner.id, b)
            }),
            reconcile_group(&staff, concurrency, |s| s.id, |s| {
                reconciler.upsert_staff(owner.id, s)
            }),
            reconcile_group(&landlords, concurrency, |l| l.id, |l| {
                reconciler.upsert_landlord(owner.id, l)
            }),
            reconciler.register_vocabulary(&listings),
        );

        let mut errors = Vec::new();
        let links = RunLinks {
            branches: branch_group.ids,
            staff: staff_group.ids,
            landlords: landlord_group.ids,
            ..vocabulary
        };
        errors.extend(branch_group.errors);
        errors.extend(staff_group.errors);
        errors.extend(landlord_group.errors);

        let total = listings.len();
        let batch_size = self.config.batch_size.max(1);
        let mut synced = 0usize;

        for (index, batch) in listings.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!(batch = index, synced, total, "Sync cancelled");
                return Err(SyncError::Cancelled { synced, total });
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|listing| reconciler.reconcile_listing(owner.id, listing, &links)),
            )
            .await;

            for result in results {
                match result {
                    Ok(_) => synced += 1,
                    Err(e) => {
                        warn!(error = %e, "Listing failed");
                        errors.push(e.to_string());
                    }
                }
            }

            info!(batch = index + 1, synced, total, "Batch complete");
            status.progress(synced, total).await;
        }

        Ok(SyncResult {
            owner_id: owner.id,
            branches: links.branches.len(),
            staff: links.staff.len(),
            landlords: links.landlords.len(),
            listings: synced,
            total_listings: total,
            errors,
        })
    }

    /// Auth id, then email, then key hash from an earlier run. Never creates
    /// an owner.
    async fn resolve_owner(&self, request: &SyncRequest, key_hash: &str) -> Result<Owner> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(auth_id) = present(&request.auth_id) {
            if let Some(owner) = self.store.find_owner_by_auth_id(&auth_id).await? {
                return Ok(owner);
            }
        }
        if let Some(email) = present(&request.auth_email) {
            if let Some(owner) = self.store.find_owner_by_email(&email).await? {
                return Ok(owner);
            }
        }
        self.store
            .find_owner_by_api_key_hash(key_hash)
            .await?
            .ok_or(SyncError::OwnerNotFound)
    }

    async fn backfill_owner(&self, owner: &Owner, primary: &RemoteBranch) {
        let incoming = OwnerProfile {
            display_name: primary
                .display_name
                .clone()
                .or_else(|| Some(primary.name.clone())),
            phone: primary.phone.clone(),
            logo_url: primary.logo.clone(),
            operator_email: primary.email.clone(),
        };
        let current = owner.profile();
        let merged = incoming.merged_over(&current);
        if merged == current {
            return;
        }

        if let Err(e) = self.store.update_owner_profile(owner.id, &merged).await {
            warn!(owner_id = owner.id, error = %e, "Failed to backfill owner profile");
        }
    }
}

/// The branch flagged default, else the oldest by creation time, else the first.
pub fn primary_branch(branches: &[RemoteBranch]) -> Option<&RemoteBranch> {
    branches
        .iter()
        .find(|b| b.is_default)
        .or_else(|| {
            branches
                .iter()
                .filter(|b| b.created_date.is_some())
                .min_by_key(|b| b.created_date)
        })
        .or_else(|| branches.first())
}

/// Landlords referenced across listings, one per external id.
pub fn distinct_landlords(listings: &[RemoteListing]) -> Vec<RemoteLandlord> {
    let mut seen: BTreeMap<ExternalId, RemoteLandlord> = BTreeMap::new();
    for landlord in listings.iter().flat_map(|l| l.landlords()) {
        seen.entry(landlord.id).or_insert_with(|| landlord.clone());
    }
    seen.into_values().collect()
}

/// Reconcile `items` with at most `concurrency` in flight, collecting ids
/// and labelled errors.
async fn reconcile_group<'b, T, K, F, Fut>(
    items: &'b [T],
    concurrency: usize,
    key: K,
    reconcile: F,
) -> GroupOutcome
where
    K: Fn(&T) -> ExternalId,
    F: Fn(&'b T) -> Fut,
    Fut: Future<Output = Result<LocalId>>,
{
    let results: Vec<(ExternalId, Result<LocalId>)> = stream::iter(items)
        .map(|item| {
            let external_id = key(item);
            let fut = reconcile(item);
            async move { (external_id, fut.await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = GroupOutcome::default();
    for (external_id, result) in results {
        match result {
            Ok(id) => {
                outcome.ids.insert(external_id, id);
            }
            Err(e) => {
                warn!(external_id, error = %e, "Entity failed");
                outcome.errors.push(e.to_string());
            }
        }
    }
    outcome
}
