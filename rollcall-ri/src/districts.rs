//! Electoral district mapper
//!
//! Maps resolved jurisdiction identifiers to the persons serving them today.
//!
//! - Federal: statewide seats of the state plus the matching district seat.
//!   Without a federal district code, every federal seat of the state.
//! - State: statewide seats plus the matching district seats. When no state
//!   district code is known, or none matches a stored person, every state
//!   legislative seat of the state is returned at `state-only` precision.
//! - Local: statewide seats plus the matching district seats. Local district
//!   seats never fall back; an unmatched address gets none of them.
//!
//! Results are ordered federal, state, local, then by normalized name.

use crate::db::persons::{self, JurisdictionFilter};
use crate::geo::{Precision, ResolvedJurisdiction};
use crate::resolver::normalize::normalize_name;
use crate::types::{CanonicalPerson, Level};
use chrono::NaiveDate;
use rollcall_common::Result;
use sqlx::SqlitePool;

/// A serving representative with the precision it was matched at
#[derive(Debug, Clone)]
pub struct MappedRepresentative {
    pub person: CanonicalPerson,
    pub precision: Precision,
}

#[derive(Debug, Clone, Default)]
pub struct DistrictMapping {
    pub representatives: Vec<MappedRepresentative>,
    /// Levels answered from the state-wide fallback
    pub fallback_levels: Vec<Level>,
}

impl DistrictMapping {
    /// Worst precision among the returned representatives
    pub fn worst_precision(&self) -> Option<Precision> {
        self.representatives.iter().map(|r| r.precision).max()
    }
}

pub struct ElectoralDistrictMapper {
    db: SqlitePool,
}

impl ElectoralDistrictMapper {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Representatives serving `jurisdiction` on `today`, at most `limit`
    pub async fn representatives_for(
        &self,
        jurisdiction: &ResolvedJurisdiction,
        today: NaiveDate,
        limit: Option<usize>,
    ) -> Result<DistrictMapping> {
        let mut mapping = DistrictMapping::default();

        for level in [Level::Federal, Level::State, Level::Local] {
            let serving: Vec<CanonicalPerson> = persons::find_by_jurisdiction(
                &self.db,
                &JurisdictionFilter {
                    level: Some(level),
                    state: Some(jurisdiction.state.clone()),
                    district: None,
                    include_inactive: false,
                },
            )
            .await?
            .into_iter()
            .filter(|p| p.is_serving_on(today))
            .collect();

            if serving.is_empty() {
                continue;
            }

            let codes = jurisdiction.codes_at(level);
            let (selected, fell_back) = select_seats(serving, &codes, level);
            if fell_back {
                tracing::debug!(level = %level, state = %jurisdiction.state, "District fallback to state level");
                mapping.fallback_levels.push(level);
            }

            mapping.representatives.extend(selected.into_iter().map(|person| {
                let precision = if person.stale {
                    Precision::Stale
                } else if fell_back {
                    Precision::StateOnly
                } else {
                    Precision::District
                };
                MappedRepresentative { person, precision }
            }));
        }

        mapping.representatives.sort_by_cached_key(|r| {
            let view = &r.person.view;
            (
                view.jurisdiction.value.level,
                normalize_name(&view.name.value),
                r.person.canonical_id,
            )
        });
        if let Some(limit) = limit {
            mapping.representatives.truncate(limit);
        }

        Ok(mapping)
    }
}

/// Pick seats for one level; returns whether the state-wide fallback applied
fn select_seats(
    serving: Vec<CanonicalPerson>,
    codes: &[&str],
    level: Level,
) -> (Vec<CanonicalPerson>, bool) {
    let district_of = |p: &CanonicalPerson| p.view.jurisdiction.value.district.clone();
    let in_codes = |p: &CanonicalPerson| district_of(p).is_some_and(|d| codes.contains(&d.as_str()));

    // Statewide seats alone are still exact
    let has_district_seats = serving.iter().any(|p| district_of(p).is_some());
    let matched = !codes.is_empty() && serving.iter().any(in_codes);
    match level {
        Level::Federal if codes.is_empty() => return (serving, has_district_seats),
        Level::State if !matched => return (serving, has_district_seats),
        _ => {}
    }

    let selected = serving
        .into_iter()
        .filter(|p| district_of(p).is_none() || in_codes(p))
        .collect();
    (selected, false)
}
