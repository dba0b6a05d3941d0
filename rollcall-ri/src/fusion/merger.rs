//! Field-wise conflict resolution across contributing source records
//!
//! # Precedence
//! Records are ranked once and every field takes its value from the first
//! ranked record that populates it:
//! 1. Higher provider reliability
//! 2. More recent fetch
//! 3. More populated fields
//! 4. Provider name (total order, so ties never depend on input order)
//!
//! Contacts are unioned instead: every distinct value survives, tagged with
//! the highest-ranked provider reporting it, and the first value per kind is
//! primary.

use crate::adapters::ProviderProfile;
use crate::types::{contact_key, Attributed, ContactEntry, ContactKind, MergedView, SourceRecord};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Merge result for one canonical person
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub view: MergedView,
    /// Records the view (and score) was computed from, in precedence order
    pub included: Vec<SourceRecord>,
    /// Providers whose records were left out because they are degraded
    pub excluded_degraded: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Sort records by merge precedence (best first)
    pub fn rank<'a>(
        &self,
        records: impl IntoIterator<Item = &'a SourceRecord>,
        profiles: &HashMap<String, ProviderProfile>,
    ) -> Vec<&'a SourceRecord> {
        let reliability = |r: &SourceRecord| profiles.get(&r.provider).map_or(0.0, |p| p.reliability);

        let mut ranked: Vec<&SourceRecord> = records.into_iter().collect();
        ranked.sort_by(|a, b| {
            reliability(b)
                .partial_cmp(&reliability(a))
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.fetched_at.cmp(&a.fetched_at))
                .then_with(|| b.populated_fields().cmp(&a.populated_fields()))
                .then_with(|| a.provider.cmp(&b.provider))
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        ranked
    }

    /// Merge the eligible records of one person
    ///
    /// Eligible: the provider is configured and not degraded. When any
    /// eligible record reports a current term only current records merge, so
    /// a retracted source cannot override a serving one; otherwise all
    /// eligible records merge to keep the historical view. Returns `None`
    /// when nothing is eligible.
    pub fn merge(
        &self,
        records: &[SourceRecord],
        profiles: &HashMap<String, ProviderProfile>,
        degraded: &HashSet<String>,
        today: NaiveDate,
    ) -> Option<MergeOutcome> {
        let mut excluded_degraded: Vec<String> = Vec::new();
        let eligible: Vec<&SourceRecord> = records
            .iter()
            .filter(|r| {
                if !profiles.contains_key(&r.provider) {
                    tracing::debug!(provider = %r.provider, "Ignoring record from unconfigured provider");
                    return false;
                }
                if degraded.contains(&r.provider) {
                    excluded_degraded.push(r.provider.clone());
                    return false;
                }
                true
            })
            .collect();

        let current: Vec<&SourceRecord> =
            eligible.iter().copied().filter(|r| r.is_current(today)).collect();
        let pool = if current.is_empty() { eligible } else { current };

        let ranked = self.rank(pool, profiles);
        let view = self.merge_ranked(&ranked)?;

        excluded_degraded.sort();
        excluded_degraded.dedup();

        Some(MergeOutcome {
            view,
            included: ranked.into_iter().cloned().collect(),
            excluded_degraded,
        })
    }

    /// Build the merged view from already-ranked records
    pub fn merge_ranked(&self, ranked: &[&SourceRecord]) -> Option<MergedView> {
        let top = ranked.first()?;

        let office = ranked
            .iter()
            .find_map(|r| r.office.as_ref().map(|v| Attributed::from_record(v.clone(), r)));
        let party = ranked
            .iter()
            .find_map(|r| r.party.as_ref().map(|v| Attributed::from_record(v.clone(), r)));
        let term = ranked
            .iter()
            .find(|r| r.term.is_known())
            .map(|r| Attributed::from_record(r.term, r));

        Some(MergedView {
            name: Attributed::from_record(top.name.clone(), top),
            office,
            jurisdiction: Attributed::from_record(top.jurisdiction.clone(), top),
            party,
            term,
            contacts: self.union_contacts(ranked),
        })
    }

    /// Union contact values across ranked records
    pub fn union_contacts(&self, ranked: &[&SourceRecord]) -> Vec<ContactEntry> {
        let mut entries: Vec<ContactEntry> = Vec::new();
        let mut index: HashMap<(ContactKind, String), usize> = HashMap::new();
        let mut primary_kinds: HashSet<ContactKind> = HashSet::new();

        for record in ranked {
            for (kind, value) in record.contacts.entries() {
                let key = (kind, contact_key(kind, &value));
                if key.1.is_empty() {
                    continue;
                }
                match index.get(&key) {
                    Some(&i) => {
                        let entry = &mut entries[i];
                        if !entry.reported_by.contains(&record.provider) {
                            entry.reported_by.push(record.provider.clone());
                        }
                    }
                    None => {
                        index.insert(key, entries.len());
                        entries.push(ContactEntry {
                            kind,
                            value,
                            source: record.provider.clone(),
                            fetched_at: record.fetched_at,
                            reported_by: vec![record.provider.clone()],
                            primary: primary_kinds.insert(kind),
                        });
                    }
                }
            }
        }

        // Group by kind, keeping precedence order within each kind
        entries.sort_by_key(|e| e.kind);
        entries
    }
}
