//! Canonical identity resolution
//!
//! Matching order for a stored [`SourceRecord`]:
//! 1. Crosswalk hit: attach, no further matching
//! 2. Open review for the identity: keep holding, refresh the held record
//! 3. Same normalized name, same (level, state, district), overlapping term,
//!    and no entry from the same provider yet:
//!    - none: new canonical person plus crosswalk entry
//!    - one: crosswalk entry to it
//!    - several: merge nothing, queue a [`PendingReview`]
//!
//! All of it runs under one resolver lock, so two providers reporting the
//! same new person cannot both create it. Lock order is resolver lock, then
//! the reconciler's per-entity lock.

pub mod normalize;

use crate::db::{crosswalk, persons, reviews};
use crate::ingest::reconcile::Reconciler;
use crate::types::{CrosswalkEntry, PendingReview, ReviewStatus, SourceRecord};
use chrono::Utc;
use normalize::normalize_name;
use rollcall_common::events::{EventBus, RollcallEvent};
use rollcall_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Joined an existing canonical person
    Attached(Uuid),
    /// Started a new canonical person
    Created(Uuid),
    /// Ambiguous; held under this review id
    Held(Uuid),
    /// Review closed without attaching
    Dismissed(Uuid),
}

/// Manual decision on a pending review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewAction {
    /// Attach the held record to one of the candidates
    Attach { canonical_id: Uuid },
    /// The record is a different person
    CreateNew,
    /// Drop the review; the identity is matched again on its next fetch
    Dismiss,
}

pub struct IdentityResolver {
    db: SqlitePool,
    lock: Mutex<()>,
    event_bus: EventBus,
}

impl IdentityResolver {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self {
            db,
            lock: Mutex::new(()),
            event_bus,
        }
    }

    /// Resolve an already stored record to a canonical person
    pub async fn resolve(
        &self,
        record: &SourceRecord,
        reconciler: &Reconciler,
    ) -> Result<ResolutionOutcome> {
        let guard = self.lock.lock().await;

        if let Some(entry) = crosswalk::get_entry(&self.db, &record.provider, &record.native_id).await? {
            drop(guard);
            reconciler.reconcile(entry.canonical_id).await?;
            return Ok(ResolutionOutcome::Attached(entry.canonical_id));
        }

        let candidates = self.find_candidates(record).await?;

        if let Some(review) =
            reviews::pending_for_identity(&self.db, &record.provider, &record.native_id).await?
        {
            let candidates = if candidates.len() > 1 { candidates } else { review.candidates.clone() };
            reviews::refresh_pending(&self.db, review.review_id, record.record_id, &candidates).await?;
            debug!(
                provider = %record.provider,
                review_id = %review.review_id,
                "Identity still pending review"
            );
            return Ok(ResolutionOutcome::Held(review.review_id));
        }

        match candidates.as_slice() {
            [] => {
                let canonical_id = Uuid::new_v4();
                self.link(record, canonical_id).await?;
                // Created under the resolver lock so a concurrent match sees the person
                reconciler.reconcile(canonical_id).await?;
                Ok(ResolutionOutcome::Created(canonical_id))
            }
            [only] => {
                let canonical_id = *only;
                self.link(record, canonical_id).await?;
                drop(guard);
                reconciler.reconcile(canonical_id).await?;
                Ok(ResolutionOutcome::Attached(canonical_id))
            }
            several => {
                let review = PendingReview {
                    review_id: Uuid::new_v4(),
                    provider: record.provider.clone(),
                    native_id: record.native_id.clone(),
                    record_id: record.record_id,
                    candidates: several.to_vec(),
                    status: ReviewStatus::Pending,
                    resolution: None,
                    created_at: Utc::now(),
                    resolved_at: None,
                };
                reviews::insert_review(&self.db, &review).await?;
                info!(
                    provider = %record.provider,
                    review_id = %review.review_id,
                    candidates = several.len(),
                    "Ambiguous identity held for review"
                );
                self.event_bus.emit_lossy(RollcallEvent::IdentityReviewQueued {
                    review_id: review.review_id,
                    provider: review.provider.clone(),
                    candidate_count: several.len(),
                    timestamp: review.created_at,
                });
                Ok(ResolutionOutcome::Held(review.review_id))
            }
        }
    }

    /// Apply a manual decision to a pending review
    pub async fn resolve_review(
        &self,
        review_id: Uuid,
        action: ReviewAction,
        reconciler: &Reconciler,
    ) -> Result<ResolutionOutcome> {
        let guard = self.lock.lock().await;

        let review = reviews::get_review(&self.db, review_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Review {}", review_id)))?;
        if review.status != ReviewStatus::Pending {
            return Err(Error::Conflict(format!(
                "Review {} is already {}",
                review_id,
                review.status.as_str()
            )));
        }

        let held = crate::db::records::get_record(&self.db, review.record_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Held record {} missing", review.record_id)))?;

        let now = Utc::now();
        match action {
            ReviewAction::Dismiss => {
                reviews::close_review(&self.db, review_id, ReviewStatus::Dismissed, None, now).await?;
                info!(review_id = %review_id, "Review dismissed");
                Ok(ResolutionOutcome::Dismissed(review_id))
            }
            ReviewAction::CreateNew => {
                let canonical_id = Uuid::new_v4();
                self.link(&held, canonical_id).await?;
                reviews::close_review(&self.db, review_id, ReviewStatus::Resolved, Some(canonical_id), now)
                    .await?;
                reconciler.reconcile(canonical_id).await?;
                info!(review_id = %review_id, canonical_id = %canonical_id, "Review resolved as new person");
                Ok(ResolutionOutcome::Created(canonical_id))
            }
            ReviewAction::Attach { canonical_id } => {
                if !review.candidates.contains(&canonical_id) {
                    return Err(Error::InvalidInput(format!(
                        "{} is not a candidate of review {}",
                        canonical_id, review_id
                    )));
                }
                if crosswalk::has_provider_entry(&self.db, canonical_id, &held.provider).await? {
                    return Err(Error::Conflict(format!(
                        "{} already has an identity from {}",
                        canonical_id, held.provider
                    )));
                }
                self.link(&held, canonical_id).await?;
                reviews::close_review(&self.db, review_id, ReviewStatus::Resolved, Some(canonical_id), now)
                    .await?;
                drop(guard);
                reconciler.reconcile(canonical_id).await?;
                info!(review_id = %review_id, canonical_id = %canonical_id, "Review resolved by attach");
                Ok(ResolutionOutcome::Attached(canonical_id))
            }
        }
    }

    /// Persons the record could be, in creation order
    async fn find_candidates(&self, record: &SourceRecord) -> Result<Vec<Uuid>> {
        let normalized = normalize_name(&record.name);
        let mut candidates = Vec::new();
        for person in
            persons::find_by_name_and_jurisdiction(&self.db, &normalized, &record.jurisdiction).await?
        {
            let overlaps = person
                .view
                .term
                .as_ref()
                .map_or(true, |term| term.value.overlaps(&record.term));
            if !overlaps {
                continue;
            }
            // One entry per provider per person: a second native id is someone else
            if crosswalk::has_provider_entry(&self.db, person.canonical_id, &record.provider).await? {
                continue;
            }
            candidates.push(person.canonical_id);
        }
        Ok(candidates)
    }

    async fn link(&self, record: &SourceRecord, canonical_id: Uuid) -> Result<()> {
        crosswalk::insert_entry(
            &self.db,
            &CrosswalkEntry {
                provider: record.provider.clone(),
                native_id: record.native_id.clone(),
                canonical_id,
                created_at: Utc::now(),
            },
        )
        .await
    }
}
