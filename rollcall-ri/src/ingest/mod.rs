//! Ingestion pipeline
//!
//! One cycle:
//! 1. Every adapter runs concurrently, paging from its persisted cursor
//!    through the fetch scheduler (up to `max_pages_per_cycle` pages)
//! 2. Each record is stored, then resolved (which reconciles its person)
//! 3. Health and cursors are persisted after every page
//! 4. Persons of providers that degraded or recovered are re-reconciled
//! 5. Superseded records and old analytics rows are purged
//!
//! A failing provider ends its own worker only; its cursor stays where the
//! last successful page left it.

pub mod reconcile;

use crate::adapters::{AdapterRegistry, SourceAdapter};
use crate::db::{analytics, crosswalk, provider_state, records, reviews};
use crate::resolver::{IdentityResolver, ResolutionOutcome};
use crate::scheduler::{FetchScheduler, HealthTransition, ScheduledOutcome};
use chrono::{Duration, Utc};
use futures::future::join_all;
use reconcile::Reconciler;
use rollcall_common::config::{IngestConfig, ScoringConfig};
use rollcall_common::events::{EventBus, RollcallEvent};
use rollcall_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Cycle limits
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub max_pages_per_cycle: u32,
    pub retention_days: u32,
}

impl IngestSettings {
    pub fn from_config(ingest: &IngestConfig, scoring: &ScoringConfig) -> Self {
        Self {
            max_pages_per_cycle: ingest.max_pages_per_cycle.max(1),
            retention_days: scoring.retention_days,
        }
    }
}

/// Per-provider share of a cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderReport {
    pub provider: String,
    pub pages: u32,
    pub records: usize,
    pub skipped: usize,
    pub attached: usize,
    pub created: usize,
    pub held: usize,
    /// Records that could not be stored or resolved
    pub failed: usize,
    pub error: Option<String>,
    pub degraded: bool,
    /// Cursor the next cycle resumes from
    pub cursor: Option<String>,
    #[serde(skip)]
    transition: Option<HealthTransition>,
    #[serde(skip)]
    touched: BTreeSet<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub providers: Vec<ProviderReport>,
    pub records: usize,
    pub skipped: usize,
    /// Distinct persons reconciled during the cycle
    pub reconciled: usize,
    pub pending_reviews: usize,
    pub purged_records: u64,
    pub purged_lookups: u64,
}

pub struct IngestPipeline {
    db: SqlitePool,
    registry: AdapterRegistry,
    scheduler: Arc<dyn FetchScheduler>,
    resolver: Arc<IdentityResolver>,
    reconciler: Arc<Reconciler>,
    event_bus: EventBus,
    settings: IngestSettings,
    /// Held for the length of a cycle
    running: Mutex<()>,
}

impl IngestPipeline {
    pub fn new(
        db: SqlitePool,
        registry: AdapterRegistry,
        scheduler: Arc<dyn FetchScheduler>,
        resolver: Arc<IdentityResolver>,
        reconciler: Arc<Reconciler>,
        event_bus: EventBus,
        settings: IngestSettings,
    ) -> Self {
        Self {
            db,
            registry,
            scheduler,
            resolver,
            reconciler,
            event_bus,
            settings,
            running: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Load persisted provider health into the scheduler
    pub async fn restore_health(&self) -> Result<()> {
        let stored = provider_state::load_all(&self.db).await?;
        let known: Vec<_> = stored
            .into_iter()
            .filter(|s| self.registry.get(&s.health.provider).is_some())
            .map(|s| s.health)
            .collect();
        if !known.is_empty() {
            info!(providers = known.len(), "Restored provider health");
        }
        self.scheduler.restore_health(known).await;
        Ok(())
    }

    /// Run one full ingestion cycle
    ///
    /// Fails with [`Error::Conflict`] if a cycle is already running.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| Error::Conflict("Ingestion cycle already running".to_string()))?;

        let cycle_id = Uuid::new_v4();
        let providers = self.registry.names();
        info!(cycle_id = %cycle_id, providers = providers.len(), "Ingestion cycle started");
        self.event_bus.emit_lossy(RollcallEvent::IngestCycleStarted {
            cycle_id,
            providers: providers.clone(),
            timestamp: Utc::now(),
        });

        let reports = join_all(self.registry.adapters().map(|adapter| self.run_provider(adapter.as_ref()))).await;

        let mut touched: BTreeSet<Uuid> = reports.iter().flat_map(|r| r.touched.iter().copied()).collect();

        // Staleness sweep for providers whose standing changed
        let changed: Vec<String> = reports
            .iter()
            .filter(|r| {
                matches!(
                    r.transition,
                    Some(HealthTransition::Degraded) | Some(HealthTransition::Recovered)
                )
            })
            .map(|r| r.provider.clone())
            .collect();
        if !changed.is_empty() {
            let ids = crosswalk::person_ids_for_providers(&self.db, &changed).await?;
            info!(providers = ?changed, persons = ids.len(), "Re-reconciling after health change");
            for id in ids {
                match self.reconciler.reconcile(id).await {
                    Ok(_) => {
                        touched.insert(id);
                    }
                    Err(e) => warn!(canonical_id = %id, "Staleness sweep failed: {}", e),
                }
            }
        }

        let (purged_records, purged_lookups) = self.purge().await;

        let report = CycleReport {
            cycle_id,
            records: reports.iter().map(|r| r.records).sum(),
            skipped: reports.iter().map(|r| r.skipped).sum(),
            reconciled: touched.len(),
            pending_reviews: reviews::count_pending(&self.db).await?.max(0) as usize,
            purged_records,
            purged_lookups,
            providers: reports,
        };

        info!(
            cycle_id = %cycle_id,
            records = report.records,
            skipped = report.skipped,
            reconciled = report.reconciled,
            pending_reviews = report.pending_reviews,
            "Ingestion cycle completed"
        );
        self.event_bus.emit_lossy(RollcallEvent::IngestCycleCompleted {
            cycle_id,
            records: report.records,
            skipped: report.skipped,
            reconciled: report.reconciled,
            pending_reviews: report.pending_reviews,
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    async fn run_provider(&self, adapter: &dyn SourceAdapter) -> ProviderReport {
        let provider = adapter.provider().to_string();
        let mut report = ProviderReport {
            provider: provider.clone(),
            ..ProviderReport::default()
        };

        let mut cursor = match provider_state::get_cursor(&self.db, &provider).await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!(provider = %provider, "Failed to load cursor: {}", e);
                report.error = Some(e.to_string());
                return report;
            }
        };

        while report.pages < self.settings.max_pages_per_cycle {
            match self.scheduler.fetch_page(adapter, cursor.as_deref()).await {
                Ok((page, outcome)) => {
                    self.note_health(&mut report, &outcome).await;
                    report.pages += 1;
                    report.skipped += page.skipped;

                    for record in &page.records {
                        report.records += 1;
                        if let Err(e) = records::insert_record(&self.db, record).await {
                            error!(provider = %provider, native_id = %record.native_id, "Failed to store record: {}", e);
                            report.failed += 1;
                            continue;
                        }
                        match self.resolver.resolve(record, &self.reconciler).await {
                            Ok(ResolutionOutcome::Attached(id)) => {
                                report.attached += 1;
                                report.touched.insert(id);
                            }
                            Ok(ResolutionOutcome::Created(id)) => {
                                report.created += 1;
                                report.touched.insert(id);
                            }
                            Ok(ResolutionOutcome::Held(_)) => report.held += 1,
                            Ok(ResolutionOutcome::Dismissed(_)) => {}
                            Err(e) => {
                                error!(provider = %provider, native_id = %record.native_id, "Failed to resolve record: {}", e);
                                report.failed += 1;
                            }
                        }
                    }

                    cursor = if page.has_more { page.next_cursor } else { None };
                    if let Err(e) = provider_state::save_cursor(&self.db, &provider, cursor.as_deref()).await {
                        warn!(provider = %provider, "Failed to persist cursor: {}", e);
                    }
                    if cursor.is_none() {
                        break;
                    }
                }
                Err((err, outcome)) => {
                    if let Some(outcome) = outcome {
                        self.note_health(&mut report, &outcome).await;
                    }
                    warn!(provider = %provider, "Fetch failed: {}", err);
                    report.error = Some(err.to_string());
                    break;
                }
            }
        }

        report.cursor = cursor;
        self.event_bus.emit_lossy(RollcallEvent::ProviderBatchCompleted {
            provider: provider.clone(),
            records: report.records,
            skipped: report.skipped,
            has_more: report.cursor.is_some(),
            timestamp: Utc::now(),
        });
        report
    }

    /// Persist health and announce transitions
    async fn note_health(&self, report: &mut ProviderReport, outcome: &ScheduledOutcome) {
        report.degraded = outcome.health.degraded;
        if let Err(e) = provider_state::save_health(&self.db, &outcome.health).await {
            warn!(provider = %report.provider, "Failed to persist health: {}", e);
        }

        match outcome.transition {
            HealthTransition::Degraded => {
                report.transition = Some(HealthTransition::Degraded);
                self.event_bus.emit_lossy(RollcallEvent::ProviderDegraded {
                    provider: report.provider.clone(),
                    consecutive_failures: outcome.health.consecutive_failures,
                    timestamp: Utc::now(),
                });
            }
            HealthTransition::Recovered => {
                report.transition = Some(HealthTransition::Recovered);
                self.event_bus.emit_lossy(RollcallEvent::ProviderRecovered {
                    provider: report.provider.clone(),
                    timestamp: Utc::now(),
                });
            }
            HealthTransition::Unchanged => {}
        }
    }

    /// Retention purge; failures are logged, never fatal to the cycle
    async fn purge(&self) -> (u64, u64) {
        let cutoff = Utc::now() - Duration::days(self.settings.retention_days as i64);
        let purged_records = records::purge_superseded(&self.db, cutoff)
            .await
            .unwrap_or_else(|e| {
                warn!("Record purge failed: {}", e);
                0
            });
        let purged_lookups = analytics::purge_before(&self.db, cutoff).await.unwrap_or_else(|e| {
            warn!("Analytics purge failed: {}", e);
            0
        });
        if purged_records > 0 || purged_lookups > 0 {
            info!(purged_records, purged_lookups, "Retention purge");
        }
        (purged_records, purged_lookups)
    }
}
