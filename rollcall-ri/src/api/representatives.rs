//! Canonical read endpoints
//!
//! Read by id, by jurisdiction filter, or by a provider identity through the
//! crosswalk. Per-field provenance is included on request.

use crate::db::{crosswalk, persons};
use crate::db::persons::JurisdictionFilter;
use crate::geo::states;
use crate::types::{
    normalize_district, CanonicalPerson, ContactEntry, CrosswalkEntry, Jurisdiction, Level,
    PersonStatus, RecordRef, TermDates,
};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Where one field's value came from
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSource {
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub record_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Field name → winning source
    pub fields: BTreeMap<&'static str, FieldSource>,
    pub contributing: Vec<RecordRef>,
    pub crosswalk: Vec<CrosswalkEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativeDetail {
    pub canonical_id: Uuid,
    pub name: String,
    pub office: Option<String>,
    pub jurisdiction: Jurisdiction,
    pub party: Option<String>,
    pub term: Option<TermDates>,
    pub contacts: Vec<ContactEntry>,
    pub quality_score: u8,
    pub status: PersonStatus,
    pub stale: bool,
    pub version: i64,
    pub last_reconciled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl RepresentativeDetail {
    fn from_person(person: CanonicalPerson) -> Self {
        let view = person.view;
        Self {
            canonical_id: person.canonical_id,
            name: view.name.value,
            office: view.office.map(|o| o.value),
            jurisdiction: view.jurisdiction.value,
            party: view.party.map(|p| p.value),
            term: view.term.map(|t| t.value),
            contacts: view.contacts,
            quality_score: person.quality_score,
            status: person.status,
            stale: person.stale,
            version: person.version,
            last_reconciled_at: person.last_reconciled_at,
            provenance: None,
        }
    }
}

fn provenance_of(person: &CanonicalPerson, crosswalk: Vec<CrosswalkEntry>) -> Provenance {
    let view = &person.view;
    let mut fields = BTreeMap::new();
    let mut note = |field: &'static str, source: &str, fetched_at: DateTime<Utc>, record_id: Uuid| {
        fields.insert(
            field,
            FieldSource {
                source: source.to_string(),
                fetched_at,
                record_id,
            },
        );
    };

    note("name", &view.name.source, view.name.fetched_at, view.name.record_id);
    note(
        "jurisdiction",
        &view.jurisdiction.source,
        view.jurisdiction.fetched_at,
        view.jurisdiction.record_id,
    );
    if let Some(office) = &view.office {
        note("office", &office.source, office.fetched_at, office.record_id);
    }
    if let Some(party) = &view.party {
        note("party", &party.source, party.fetched_at, party.record_id);
    }
    if let Some(term) = &view.term {
        note("term", &term.source, term.fetched_at, term.record_id);
    }

    Provenance {
        fields,
        contributing: person.contributing.clone(),
        crosswalk,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    #[serde(default)]
    pub provenance: bool,
}

/// GET /api/representatives/:id
pub async fn get_representative(
    State(state): State<AppState>,
    Path(canonical_id): Path<Uuid>,
    Query(query): Query<DetailQuery>,
) -> ApiResult<Json<RepresentativeDetail>> {
    let person = persons::get_person(&state.db, canonical_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Representative {}", canonical_id)))?;

    let provenance = if query.provenance {
        let entries = crosswalk::entries_for_person(&state.db, canonical_id).await?;
        Some(provenance_of(&person, entries))
    } else {
        None
    };

    let mut detail = RepresentativeDetail::from_person(person);
    detail.provenance = provenance;
    Ok(Json(detail))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub level: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl ListQuery {
    fn into_filter(self) -> ApiResult<JurisdictionFilter> {
        let level = self
            .level
            .as_deref()
            .map(str::parse::<Level>)
            .transpose()
            .map_err(ApiError::BadRequest)?;
        let state = match self.state.as_deref() {
            Some(raw) => Some(
                states::to_postal_code(raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown state: {}", raw)))?
                    .to_string(),
            ),
            None => None,
        };
        Ok(JurisdictionFilter {
            level,
            state,
            district: self.district.as_deref().and_then(normalize_district),
            include_inactive: self.include_inactive,
        })
    }
}

/// GET /api/representatives?level=&state=&district=&include_inactive=
pub async fn list_representatives(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<RepresentativeDetail>>> {
    let filter = query.into_filter()?;
    let people = persons::find_by_jurisdiction(&state.db, &filter).await?;
    Ok(Json(people.into_iter().map(RepresentativeDetail::from_person).collect()))
}

/// GET /api/crosswalk/:provider/:native_id
pub async fn get_by_crosswalk(
    State(state): State<AppState>,
    Path((provider, native_id)): Path<(String, String)>,
) -> ApiResult<Json<RepresentativeDetail>> {
    let person = persons::find_by_crosswalk(&state.db, &provider, &native_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No canonical person for {}/{}", provider, native_id)))?;
    Ok(Json(RepresentativeDetail::from_person(person)))
}

pub fn representative_routes() -> Router<AppState> {
    Router::new()
        .route("/api/representatives", get(list_representatives))
        .route("/api/representatives/:id", get(get_representative))
        .route("/api/crosswalk/:provider/:native_id", get(get_by_crosswalk))
}
