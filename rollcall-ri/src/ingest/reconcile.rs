//! Reconciliation: the single writer of canonical persons
//!
//! `reconcile(id)` reloads the latest record of every crosswalk entry,
//! merges the eligible ones, rescores when the contributing set changed and
//! writes the result with an optimistic version check. Writes to one person
//! are serialized by a per-entity lock; the version check covers writers
//! outside this process.

use crate::adapters::ProviderProfile;
use crate::db::{districts, persons, records};
use crate::fusion::{record_set_fingerprint, ConflictResolver, QualityScorer};
use crate::scheduler::FetchScheduler;
use crate::types::{CanonicalPerson, ElectoralDistrict, PersonStatus, SourceRecord};
use chrono::{DateTime, Utc};
use rollcall_common::events::{EventBus, RollcallEvent};
use rollcall_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Optimistic write attempts before giving up with [`Error::Conflict`]
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Lock table keyed by canonical id
#[derive(Default)]
pub struct EntityLocks {
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one person
    pub async fn lock(&self, canonical_id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop entries nobody holds or waits on
            if locks.len() > 1024 {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(canonical_id).or_default().clone()
        };
        entry.lock_owned().await
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub canonical_id: Uuid,
    pub quality_score: u8,
    pub status: PersonStatus,
    pub stale: bool,
    /// Whether anything was written
    pub changed: bool,
}

impl ReconcileOutcome {
    fn from_person(person: &CanonicalPerson, changed: bool) -> Self {
        Self {
            canonical_id: person.canonical_id,
            quality_score: person.quality_score,
            status: person.status,
            stale: person.stale,
            changed,
        }
    }
}

pub struct Reconciler {
    db: SqlitePool,
    profiles: HashMap<String, ProviderProfile>,
    scheduler: Arc<dyn FetchScheduler>,
    merger: ConflictResolver,
    scorer: QualityScorer,
    locks: EntityLocks,
    event_bus: EventBus,
}

impl Reconciler {
    pub fn new(
        db: SqlitePool,
        profiles: HashMap<String, ProviderProfile>,
        scheduler: Arc<dyn FetchScheduler>,
        scorer: QualityScorer,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            profiles,
            scheduler,
            merger: ConflictResolver::new(),
            scorer,
            locks: EntityLocks::new(),
            event_bus,
        }
    }

    pub fn profiles(&self) -> &HashMap<String, ProviderProfile> {
        &self.profiles
    }

    /// Recompute and store one canonical person
    ///
    /// Creates the person on first call for a fresh crosswalk entry. Fails
    /// with [`Error::NotFound`] when the id has neither a stored person nor
    /// any contributing record.
    pub async fn reconcile(&self, canonical_id: Uuid) -> Result<ReconcileOutcome> {
        let _guard = self.locks.lock(canonical_id).await;
        let degraded = self.scheduler.degraded_providers().await;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let existing = persons::get_person(&self.db, canonical_id).await?;
            let latest = records::latest_records_for_person(&self.db, canonical_id).await?;
            if latest.is_empty() {
                return match existing {
                    Some(person) => Ok(ReconcileOutcome::from_person(&person, false)),
                    None => Err(Error::NotFound(format!("Canonical person {}", canonical_id))),
                };
            }

            let now = Utc::now();
            let candidate = self.build(canonical_id, existing.as_ref(), &latest, &degraded, now)?;

            match existing {
                Some(previous) => {
                    if unchanged(&previous, &candidate) {
                        return Ok(ReconcileOutcome::from_person(&previous, false));
                    }
                    let next = CanonicalPerson {
                        version: previous.version + 1,
                        created_at: previous.created_at,
                        ..candidate
                    };
                    if persons::update_person(&self.db, &next, previous.version).await? {
                        self.after_write(&next).await;
                        return Ok(ReconcileOutcome::from_person(&next, true));
                    }
                    debug!(canonical_id = %canonical_id, attempt, "Version conflict, reloading");
                }
                None => match persons::insert_person(&self.db, &candidate).await {
                    Ok(()) => {
                        info!(canonical_id = %canonical_id, "Created canonical person");
                        self.after_write(&candidate).await;
                        return Ok(ReconcileOutcome::from_person(&candidate, true));
                    }
                    Err(Error::Conflict(_)) => {
                        debug!(canonical_id = %canonical_id, attempt, "Concurrent create, reloading");
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        warn!(canonical_id = %canonical_id, "Gave up after repeated version conflicts");
        Err(Error::Conflict(format!(
            "Canonical person {} changed concurrently {} times",
            canonical_id, MAX_WRITE_ATTEMPTS
        )))
    }

    /// Candidate state of a person from its latest records
    ///
    /// Version and creation time are placeholders for inserts; updates take
    /// them from the stored row.
    fn build(
        &self,
        canonical_id: Uuid,
        existing: Option<&CanonicalPerson>,
        latest: &[SourceRecord],
        degraded: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<CanonicalPerson> {
        let today = now.date_naive();
        let status = if latest.iter().any(|r| r.is_current(today)) {
            PersonStatus::Active
        } else {
            PersonStatus::Inactive
        };

        if let Some(outcome) = self.merger.merge(latest, &self.profiles, degraded, today) {
            let fingerprint = record_set_fingerprint(&outcome.included);
            let quality_score = match existing {
                Some(previous) if previous.record_set_fingerprint == fingerprint && !previous.stale => {
                    previous.quality_score
                }
                _ => {
                    self.scorer
                        .score(&outcome.view, &outcome.included, &self.profiles, now)
                        .score
                }
            };

            return Ok(CanonicalPerson {
                canonical_id,
                view: outcome.view,
                quality_score,
                contributing: outcome.included.iter().map(SourceRecord::reference).collect(),
                status,
                stale: false,
                version: 1,
                record_set_fingerprint: fingerprint,
                created_at: now,
                last_reconciled_at: now,
            });
        }

        // Every contributor is degraded (or unconfigured): keep the best-known view
        let (view, contributing) = match existing {
            Some(previous) => (previous.view.clone(), previous.contributing.clone()),
            None => {
                let ranked = self.merger.rank(latest, &self.profiles);
                let view = self
                    .merger
                    .merge_ranked(&ranked)
                    .ok_or_else(|| Error::Internal("No records to build a view from".to_string()))?;
                (view, ranked.iter().map(|r| r.reference()).collect())
            }
        };

        Ok(CanonicalPerson {
            canonical_id,
            view,
            quality_score: 0,
            contributing,
            status,
            stale: true,
            version: 1,
            record_set_fingerprint: String::new(),
            created_at: now,
            last_reconciled_at: now,
        })
    }

    async fn after_write(&self, person: &CanonicalPerson) {
        let jurisdiction = &person.view.jurisdiction.value;
        let term = person.view.term.as_ref().map(|t| t.value).unwrap_or_default();
        let district = ElectoralDistrict {
            level: jurisdiction.level,
            state: jurisdiction.state.clone(),
            district: jurisdiction.district.clone(),
            effective_from: term.start,
            effective_to: term.end,
        };
        if let Err(e) = districts::observe_district(&self.db, &district).await {
            warn!(canonical_id = %person.canonical_id, "Failed to record district: {}", e);
        }

        self.event_bus.emit_lossy(RollcallEvent::PersonReconciled {
            canonical_id: person.canonical_id,
            quality_score: person.quality_score,
            stale: person.stale,
            timestamp: person.last_reconciled_at,
        });
    }
}

/// Same stored content, ignoring bookkeeping timestamps
fn unchanged(previous: &CanonicalPerson, candidate: &CanonicalPerson) -> bool {
    previous.view == candidate.view
        && previous.quality_score == candidate.quality_score
        && previous.contributing == candidate.contributing
        && previous.status == candidate.status
        && previous.stale == candidate.stale
        && previous.record_set_fingerprint == candidate.record_set_fingerprint
}
