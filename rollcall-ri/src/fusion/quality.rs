//! Quality scoring for canonical persons
//!
//! `score = round(100 × completeness × recency × reliability)`
//!
//! - completeness: populated canonical fields / [`CANONICAL_FIELDS`]
//! - recency: reliability-weighted mean of per-record linear decay from 1.0
//!   at fetch time to `recency_floor` at the provider's staleness threshold
//! - reliability: mean provider reliability weighted by populated fields
//!
//! Pure: the same records, profiles and `as_of` always give the same score.

use crate::adapters::ProviderProfile;
use crate::types::{ContactKind, MergedView, SourceRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Fields counted for completeness
pub const CANONICAL_FIELDS: [&str; 10] = [
    "name",
    "office",
    "jurisdiction",
    "district",
    "party",
    "email",
    "phone",
    "website",
    "social",
    "term_start",
];

/// Score with its factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityBreakdown {
    pub completeness: f64,
    pub recency: f64,
    pub reliability: f64,
    pub score: u8,
}

pub struct QualityScorer {
    recency_floor: f64,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self { recency_floor: 0.5 }
    }
}

impl QualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_floor(recency_floor: f64) -> Self {
        Self {
            recency_floor: recency_floor.clamp(0.0, 1.0),
        }
    }

    /// Fraction of [`CANONICAL_FIELDS`] populated in the merged view
    pub fn completeness(&self, view: &MergedView) -> f64 {
        let has_contact = |kind: ContactKind| view.contacts.iter().any(|c| c.kind == kind);

        let populated = [
            !view.name.value.is_empty(),
            view.office.is_some(),
            true,
            view.jurisdiction.value.district.is_some(),
            view.party.is_some(),
            has_contact(ContactKind::Email),
            has_contact(ContactKind::Phone),
            has_contact(ContactKind::Website),
            has_contact(ContactKind::Social),
            view.term.as_ref().is_some_and(|t| t.value.start.is_some()),
        ]
        .iter()
        .filter(|p| **p)
        .count();

        populated as f64 / CANONICAL_FIELDS.len() as f64
    }

    /// Linear decay of one record's freshness
    pub fn record_recency(&self, fetched_at: DateTime<Utc>, staleness: chrono::Duration, as_of: DateTime<Utc>) -> f64 {
        let age = (as_of - fetched_at).num_milliseconds().max(0) as f64;
        let threshold = staleness.num_milliseconds().max(1) as f64;
        let progress = (age / threshold).min(1.0);
        1.0 - (1.0 - self.recency_floor) * progress
    }

    /// Reliability-weighted mean recency of the records
    pub fn recency(
        &self,
        records: &[SourceRecord],
        profiles: &HashMap<String, ProviderProfile>,
        as_of: DateTime<Utc>,
    ) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for record in records {
            let Some(profile) = profiles.get(&record.provider) else {
                continue;
            };
            let weight = profile.reliability.max(f64::EPSILON);
            weighted += weight * self.record_recency(record.fetched_at, profile.staleness, as_of);
            total += weight;
        }
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    /// Mean reliability weighted by each record's populated field count
    pub fn mean_reliability(
        &self,
        records: &[SourceRecord],
        profiles: &HashMap<String, ProviderProfile>,
    ) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for record in records {
            let Some(profile) = profiles.get(&record.provider) else {
                continue;
            };
            let fields = record.populated_fields() as f64;
            weighted += profile.reliability * fields;
            total += fields;
        }
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    pub fn score(
        &self,
        view: &MergedView,
        records: &[SourceRecord],
        profiles: &HashMap<String, ProviderProfile>,
        as_of: DateTime<Utc>,
    ) -> QualityBreakdown {
        let completeness = self.completeness(view);
        let recency = self.recency(records, profiles, as_of);
        let reliability = self.mean_reliability(records, profiles);
        let raw = (100.0 * completeness * recency * reliability).round();

        QualityBreakdown {
            completeness,
            recency,
            reliability,
            score: raw.clamp(0.0, 100.0) as u8,
        }
    }
}

/// Order-independent fingerprint of a contributing record set
pub fn record_set_fingerprint(records: &[SourceRecord]) -> String {
    let mut ids: Vec<String> = records.iter().map(|r| r.record_id.to_string()).collect();
    ids.sort();
    let mut hasher = Sha256::new();
    for id in &ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::merger::ConflictResolver;
    use crate::types::{ContactInfo, Jurisdiction, Level, TermDates};
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    fn profiles() -> HashMap<String, ProviderProfile> {
        let mut map = HashMap::new();
        map.insert("A".to_string(), ProviderProfile { reliability: 0.9, staleness: Duration::days(10) });
        map.insert("B".to_string(), ProviderProfile { reliability: 0.6, staleness: Duration::days(10) });
        map
    }

    fn full_record(provider: &str, fetched_at: DateTime<Utc>) -> SourceRecord {
        SourceRecord {
            record_id: Uuid::new_v4(),
            provider: provider.into(),
            native_id: "1".into(),
            name: "Kim Lee".into(),
            office: Some("Mayor".into()),
            jurisdiction: Jurisdiction::new(Level::Local, "MN", Some("1")),
            party: Some("Independent".into()),
            contacts: ContactInfo {
                email: Some("kim@example.gov".into()),
                phone: Some("612-555-0100".into()),
                website: Some("https://example.gov".into()),
                social: vec!["x:@kimlee".into()],
            },
            term: TermDates { start: NaiveDate::from_ymd_opt(2024, 1, 1), end: None },
            in_office: Some(true),
            fetched_at,
        }
    }

    fn view_of(records: &[SourceRecord]) -> MergedView {
        let resolver = ConflictResolver::new();
        let ranked = resolver.rank(records, &profiles());
        resolver.merge_ranked(&ranked).unwrap()
    }

    #[test]
    fn test_recency_decays_linearly_to_floor() {
        let scorer = QualityScorer::with_floor(0.5);
        let now = Utc::now();
        let staleness = Duration::days(10);
        assert_eq!(scorer.record_recency(now, staleness, now), 1.0);
        assert!((scorer.record_recency(now - Duration::days(5), staleness, now) - 0.75).abs() < 1e-9);
        assert_eq!(scorer.record_recency(now - Duration::days(10), staleness, now), 0.5);
        assert_eq!(scorer.record_recency(now - Duration::days(400), staleness, now), 0.5);
        // Clock skew: a future fetch counts as fresh
        assert_eq!(scorer.record_recency(now + Duration::hours(1), staleness, now), 1.0);
    }

    #[test]
    fn test_fully_populated_fresh_single_source() {
        let now = Utc::now();
        let records = vec![full_record("A", now)];
        let breakdown = QualityScorer::new().score(&view_of(&records), &records, &profiles(), now);
        assert_eq!(breakdown.completeness, 1.0);
        assert_eq!(breakdown.recency, 1.0);
        assert_eq!(breakdown.score, 90);
    }

    #[test]
    fn test_score_is_idempotent_for_unchanged_inputs() {
        let now = Utc::now();
        let records = vec![full_record("A", now - Duration::days(3)), full_record("B", now - Duration::days(8))];
        let view = view_of(&records);
        let scorer = QualityScorer::new();
        let first = scorer.score(&view, &records, &profiles(), now);
        let second = scorer.score(&view, &records, &profiles(), now);
        assert_eq!(first, second);
        assert!(first.score > 0 && first.score < 90);
    }

    #[test]
    fn test_fingerprint_ignores_order_but_not_membership() {
        let now = Utc::now();
        let a = full_record("A", now);
        let b = full_record("B", now);
        assert_eq!(
            record_set_fingerprint(&[a.clone(), b.clone()]),
            record_set_fingerprint(&[b.clone(), a.clone()])
        );
        assert_ne!(record_set_fingerprint(&[a.clone(), b]), record_set_fingerprint(&[a]));
    }

    #[test]
    fn test_no_scorable_records_is_zero() {
        let now = Utc::now();
        let records = vec![full_record("A", now)];
        let view = view_of(&records);
        let breakdown = QualityScorer::new().score(&view, &[], &profiles(), now);
        assert_eq!(breakdown.score, 0);
    }
}
