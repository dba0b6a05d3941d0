//! Conflict resolution and quality scoring
//!
//! Both halves are pure; persistence happens in [`crate::ingest::reconcile`].

pub mod merger;
pub mod quality;

pub use merger::{ConflictResolver, MergeOutcome};
pub use quality::{record_set_fingerprint, QualityBreakdown, QualityScorer, CANONICAL_FIELDS};
