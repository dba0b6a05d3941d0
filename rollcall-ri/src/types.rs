//! Core domain types for the representative index
//!
//! - [`SourceRecord`]: one provider's immutable view of one person
//! - [`CanonicalPerson`]: the reconciled entity with per-field provenance
//! - [`CrosswalkEntry`] / [`PendingReview`]: identity bookkeeping
//! - [`ElectoralDistrict`]: a (level, state, district) with an effective range
//!
//! Absent provider values are `None` (or an empty `Vec`), never a default.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Jurisdiction
// ============================================================================

/// Level of government; ordering is the result ordering (federal first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Federal,
    State,
    Local,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Federal => "federal",
            Level::State => "state",
            Level::Local => "local",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    /// Accepts the provider vocabularies seen in practice
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "federal" | "national" | "country" | "congress" => Ok(Level::Federal),
            "state" | "administrativearea1" | "legislature" | "upper" | "lower" => Ok(Level::State),
            "local" | "county" | "municipal" | "city" | "locality" | "administrativearea2" => {
                Ok(Level::Local)
            }
            other => Err(format!("Unknown jurisdiction level: {}", other)),
        }
    }
}

/// Where an elected office applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub level: Level,
    /// Two-letter postal code, upper case
    pub state: String,
    /// District code; `None` for statewide offices
    pub district: Option<String>,
}

impl Jurisdiction {
    /// Build a jurisdiction with canonical state and district spelling
    pub fn new(level: Level, state: &str, district: Option<&str>) -> Self {
        Self {
            level,
            state: state.trim().to_ascii_uppercase(),
            district: district.and_then(normalize_district),
        }
    }
}

/// Canonical district code: trimmed, upper case, numeric codes without
/// leading zeros ("07" and "7" compare equal). At-large spellings are `None`.
pub fn normalize_district(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_ascii_uppercase();
    if matches!(upper.as_str(), "AL" | "AT-LARGE" | "AT LARGE" | "STATEWIDE") {
        return None;
    }
    if upper.chars().all(|c| c.is_ascii_digit()) {
        let stripped = upper.trim_start_matches('0');
        return Some(if stripped.is_empty() { "0".to_string() } else { stripped.to_string() });
    }
    Some(upper)
}

// ============================================================================
// Terms and contacts
// ============================================================================

/// Term of office; `end == None` means ongoing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TermDates {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl TermDates {
    pub fn is_known(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Closed-interval overlap; missing bounds are open
    ///
    /// A term with neither bound carries no evidence and overlaps anything.
    pub fn overlaps(&self, other: &TermDates) -> bool {
        let starts_before_other_ends = match (self.start, other.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        };
        let other_starts_before_self_ends = match (other.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_self_ends
    }

    /// start ≤ date ≤ end, null end ongoing, null start already begun
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| start <= date) && self.end.map_or(true, |end| date <= end)
    }
}

/// Kind of contact method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Email,
    Phone,
    Website,
    Social,
}

/// Contact fields as reported by one provider
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    /// Handles such as "twitter:@name"; empty when the provider has none
    #[serde(default)]
    pub social: Vec<String>,
}

impl ContactInfo {
    /// Flatten into (kind, value) pairs
    pub fn entries(&self) -> Vec<(ContactKind, String)> {
        let mut out = Vec::new();
        if let Some(email) = &self.email {
            out.push((ContactKind::Email, email.clone()));
        }
        if let Some(phone) = &self.phone {
            out.push((ContactKind::Phone, phone.clone()));
        }
        if let Some(website) = &self.website {
            out.push((ContactKind::Website, website.clone()));
        }
        for handle in &self.social {
            out.push((ContactKind::Social, handle.clone()));
        }
        out
    }
}

/// Comparison key for a contact value (formatting differences collapse)
pub fn contact_key(kind: ContactKind, value: &str) -> String {
    match kind {
        ContactKind::Phone => value.chars().filter(|c| c.is_ascii_digit()).collect(),
        ContactKind::Website => value
            .trim()
            .trim_end_matches('/')
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.")
            .to_ascii_lowercase(),
        ContactKind::Email | ContactKind::Social => value.trim().to_lowercase(),
    }
}

// ============================================================================
// SourceRecord
// ============================================================================

/// One provider's view of one person at one point in time
///
/// Immutable once stored. A re-fetch produces a new record with a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub record_id: Uuid,
    pub provider: String,
    pub native_id: String,
    pub name: String,
    pub office: Option<String>,
    pub jurisdiction: Jurisdiction,
    pub party: Option<String>,
    pub contacts: ContactInfo,
    pub term: TermDates,
    /// Provider's own "currently serving" flag when it reports one
    pub in_office: Option<bool>,
    pub fetched_at: DateTime<Utc>,
}

/// Number of raw fields a record can populate
pub const SOURCE_FIELD_COUNT: u32 = 11;

impl SourceRecord {
    /// Raw-field completeness count (out of [`SOURCE_FIELD_COUNT`])
    pub fn populated_fields(&self) -> u32 {
        // name, level and state are always present
        let mut count = 3;
        count += self.office.is_some() as u32;
        count += self.jurisdiction.district.is_some() as u32;
        count += self.party.is_some() as u32;
        count += self.contacts.email.is_some() as u32;
        count += self.contacts.phone.is_some() as u32;
        count += self.contacts.website.is_some() as u32;
        count += (!self.contacts.social.is_empty()) as u32;
        count += self.term.start.is_some() as u32;
        count
    }

    /// Whether the provider currently reports this person as serving
    ///
    /// A retraction arrives either as `in_office = false` or as a term end in
    /// the past; both read as "not current" without deleting history.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.in_office.unwrap_or(true) && self.term.is_effective_on(today)
    }

    pub fn reference(&self) -> RecordRef {
        RecordRef {
            record_id: self.record_id,
            provider: self.provider.clone(),
            native_id: self.native_id.clone(),
            fetched_at: self.fetched_at,
        }
    }
}

/// Pointer from a canonical person to a contributing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_id: Uuid,
    pub provider: String,
    pub native_id: String,
    pub fetched_at: DateTime<Utc>,
}

// ============================================================================
// CanonicalPerson
// ============================================================================

/// Merged field value with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributed<T> {
    pub value: T,
    /// Provider that supplied the winning value
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub record_id: Uuid,
}

impl<T> Attributed<T> {
    pub fn from_record(value: T, record: &SourceRecord) -> Self {
        Self {
            value,
            source: record.provider.clone(),
            fetched_at: record.fetched_at,
            record_id: record.record_id,
        }
    }
}

/// One merged contact method; every provider reporting it is listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub kind: ContactKind,
    pub value: String,
    /// Provenance tag: the highest-precedence provider reporting this value
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    /// All providers reporting this value, in precedence order
    pub reported_by: Vec<String>,
    /// Preferred value for its kind
    pub primary: bool,
}

/// Current merged view of a canonical person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedView {
    pub name: Attributed<String>,
    pub office: Option<Attributed<String>>,
    pub jurisdiction: Attributed<Jurisdiction>,
    pub party: Option<Attributed<String>>,
    pub term: Option<Attributed<TermDates>>,
    pub contacts: Vec<ContactEntry>,
}

/// Lifecycle status of a canonical person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonStatus {
    /// At least one contributing source reports a current term
    Active,
    /// No contributing source reports the person as current; kept for history
    Inactive,
}

impl PersonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonStatus::Active => "active",
            PersonStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "inactive" {
            PersonStatus::Inactive
        } else {
            PersonStatus::Active
        }
    }
}

/// The reconciled entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPerson {
    pub canonical_id: Uuid,
    pub view: MergedView,
    pub quality_score: u8,
    pub contributing: Vec<RecordRef>,
    pub status: PersonStatus,
    /// Every contributing provider is degraded; the view is best-known data
    pub stale: bool,
    /// Optimistic concurrency version, bumped on every write
    pub version: i64,
    /// Hash of the record set the score was computed from
    pub record_set_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub last_reconciled_at: DateTime<Utc>,
}

impl CanonicalPerson {
    /// Serving today: active and with an effective term
    pub fn is_serving_on(&self, today: NaiveDate) -> bool {
        if self.status != PersonStatus::Active {
            return false;
        }
        match &self.view.term {
            Some(term) => term.value.is_effective_on(today),
            None => true,
        }
    }
}

// ============================================================================
// Identity bookkeeping
// ============================================================================

/// (provider, native id) → canonical id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosswalkEntry {
    pub provider: String,
    pub native_id: String,
    pub canonical_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// State of a manual identity review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Resolved => "resolved",
            ReviewStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "resolved" => ReviewStatus::Resolved,
            "dismissed" => ReviewStatus::Dismissed,
            _ => ReviewStatus::Pending,
        }
    }
}

/// A held record whose identity matched several canonical persons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub review_id: Uuid,
    pub provider: String,
    pub native_id: String,
    /// Latest held record for the provider identity
    pub record_id: Uuid,
    pub candidates: Vec<Uuid>,
    pub status: ReviewStatus,
    /// Canonical id the record was finally attached to
    pub resolution: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Districts
// ============================================================================

/// A known electoral district with its effective date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectoralDistrict {
    pub level: Level,
    pub state: String,
    pub district: Option<String>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}
