//! Provider JSON → [`SourceRecord`] normalization
//!
//! Shared by the JSON-based adapters. Field locations come from the provider's
//! [`FieldMapping`]; an empty pointer means the provider has no such field.
//! Required: id, name, level, state. Everything else is optional but, when
//! present, must parse (a garbled date is a malformed record, not `None`).

use super::SourceError;
use crate::geo::states;
use crate::types::{ContactInfo, Jurisdiction, Level, SourceRecord, TermDates};
use chrono::{DateTime, NaiveDate, Utc};
use rollcall_common::config::FieldMapping;
use serde_json::Value;
use uuid::Uuid;

/// Extract the item array from a page payload
pub fn page_items<'a>(
    provider: &str,
    payload: &'a Value,
    mapping: &FieldMapping,
) -> Result<&'a [Value], SourceError> {
    let items = if mapping.records.is_empty() {
        Some(payload)
    } else {
        payload.pointer(&mapping.records)
    };

    match items {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        _ => Err(SourceError::unavailable(
            provider,
            format!("Response has no record array at {}", mapping.records),
        )),
    }
}

/// Extract the next-page cursor from a page payload
pub fn next_cursor(payload: &Value, mapping: &FieldMapping) -> Option<String> {
    if mapping.next_cursor.is_empty() {
        return None;
    }
    payload.pointer(&mapping.next_cursor).and_then(scalar_text)
}

/// Normalize one provider item
pub fn record_from_json(
    provider: &str,
    item: &Value,
    mapping: &FieldMapping,
    fetched_at: DateTime<Utc>,
) -> Result<SourceRecord, SourceError> {
    let native_id = text(item, &mapping.id);
    let malformed = |reason: String| SourceError::Malformed {
        provider: provider.to_string(),
        native_id: native_id.clone(),
        reason,
    };

    let id = native_id
        .clone()
        .ok_or_else(|| malformed("missing provider id".to_string()))?;
    let name = text(item, &mapping.name).ok_or_else(|| malformed("missing name".to_string()))?;

    let level_raw =
        text(item, &mapping.level).ok_or_else(|| malformed("missing level".to_string()))?;
    let level: Level = level_raw.parse().map_err(malformed)?;

    let state_raw =
        text(item, &mapping.state).ok_or_else(|| malformed("missing state".to_string()))?;
    let state = states::to_postal_code(&state_raw)
        .ok_or_else(|| malformed(format!("unknown state: {}", state_raw)))?;

    let district = text(item, &mapping.district);
    let jurisdiction = Jurisdiction::new(level, state, district.as_deref());

    let term = TermDates {
        start: date(item, &mapping.term_start).map_err(&malformed)?,
        end: date(item, &mapping.term_end).map_err(&malformed)?,
    };
    if let (Some(start), Some(end)) = (term.start, term.end) {
        if end < start {
            return Err(malformed(format!("term ends ({}) before it starts ({})", end, start)));
        }
    }

    let contacts = ContactInfo {
        email: text(item, &mapping.email),
        phone: text(item, &mapping.phone),
        website: text(item, &mapping.website),
        social: string_list(item, &mapping.social),
    };

    let in_office = flag(item, &mapping.in_office).map_err(&malformed)?;

    Ok(SourceRecord {
        record_id: Uuid::new_v4(),
        provider: provider.to_string(),
        native_id: id,
        name,
        office: text(item, &mapping.office),
        jurisdiction,
        party: text(item, &mapping.party),
        contacts,
        term,
        in_office,
        fetched_at,
    })
}

/// Normalize every item of a page, skipping and logging malformed ones
pub fn records_from_items(
    provider: &str,
    items: &[Value],
    mapping: &FieldMapping,
    fetched_at: DateTime<Utc>,
) -> (Vec<SourceRecord>, usize) {
    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0;

    for item in items {
        match record_from_json(provider, item, mapping, fetched_at) {
            Ok(record) => records.push(record),
            Err(err) => {
                skipped += 1;
                tracing::warn!(provider, error = %err, "Skipping malformed record");
            }
        }
    }

    (records, skipped)
}

fn lookup<'a>(item: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer.is_empty() {
        return None;
    }
    item.pointer(pointer)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed.is_empty() {
                None
            } else {
                Some(collapsed)
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text(item: &Value, pointer: &str) -> Option<String> {
    lookup(item, pointer).and_then(scalar_text)
}

fn string_list(item: &Value, pointer: &str) -> Vec<String> {
    match lookup(item, pointer) {
        Some(Value::Array(values)) => values.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn date(item: &Value, pointer: &str) -> Result<Option<NaiveDate>, String> {
    let Some(raw) = text(item, pointer) else {
        return Ok(None);
    };
    // Accept bare dates and RFC 3339 timestamps
    let day = raw.get(..10).unwrap_or(raw.as_str());
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| format!("invalid date at {}: {}", pointer, raw))
}

fn flag(item: &Value, pointer: &str) -> Result<Option<bool>, String> {
    match lookup(item, pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "current" | "active" => Ok(Some(true)),
            "false" | "no" | "former" | "inactive" => Ok(Some(false)),
            other => Err(format!("invalid in_office flag: {}", other)),
        },
        Some(other) => Err(format!("invalid in_office flag: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fetched() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_full_item_normalizes() {
        let item = json!({
            "id": 42,
            "name": "  Maria   Cantwell ",
            "office": "U.S. Senator",
            "level": "federal",
            "state": "Washington",
            "party": "Democratic",
            "phone": "202-224-3441",
            "social": ["twitter:@SenatorCantwell"],
            "term_start": "2019-01-03T00:00:00Z",
            "in_office": "current"
        });

        let record = record_from_json("feed", &item, &FieldMapping::default(), fetched()).unwrap();
        assert_eq!(record.native_id, "42");
        assert_eq!(record.name, "Maria Cantwell");
        assert_eq!(record.jurisdiction.state, "WA");
        assert_eq!(record.jurisdiction.district, None);
        assert_eq!(record.contacts.social.len(), 1);
        assert_eq!(record.contacts.email, None);
        assert_eq!(record.term.start, NaiveDate::from_ymd_opt(2019, 1, 3));
        assert_eq!(record.in_office, Some(true));
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let item = json!({ "id": "x1", "level": "state", "state": "OR" });
        let err = record_from_json("feed", &item, &FieldMapping::default(), fetched()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { native_id: Some(ref id), .. } if id == "x1"));
    }

    #[test]
    fn test_garbled_date_is_malformed_not_absent() {
        let item = json!({
            "id": "x2", "name": "A B", "level": "state", "state": "OR",
            "term_start": "last tuesday"
        });
        assert!(record_from_json("feed", &item, &FieldMapping::default(), fetched()).is_err());
    }

    #[test]
    fn test_inverted_term_is_malformed() {
        let item = json!({
            "id": "x3", "name": "A B", "level": "state", "state": "OR",
            "term_start": "2024-01-01", "term_end": "2020-01-01"
        });
        assert!(record_from_json("feed", &item, &FieldMapping::default(), fetched()).is_err());
    }

    #[test]
    fn test_page_skips_bad_items_and_keeps_good_ones() {
        let payload = json!({
            "results": [
                { "id": "1", "name": "Good One", "level": "local", "state": "TX", "district": "4" },
                { "id": "2", "name": "Bad Level", "level": "orbital", "state": "TX" },
                { "name": "No Id", "level": "local", "state": "TX" }
            ],
            "next": "cursor-2"
        });
        let mapping = FieldMapping::default();
        let items = page_items("feed", &payload, &mapping).unwrap();
        let (records, skipped) = records_from_items("feed", items, &mapping, fetched());

        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 2);
        assert_eq!(next_cursor(&payload, &mapping), Some("cursor-2".to_string()));
    }

    #[test]
    fn test_empty_pointer_means_unmapped() {
        let mapping = FieldMapping {
            party: String::new(),
            ..FieldMapping::default()
        };
        let item = json!({ "id": "1", "name": "X Y", "level": "state", "state": "CA", "party": "Green" });
        let record = record_from_json("feed", &item, &mapping, fetched()).unwrap();
        assert_eq!(record.party, None);
    }
}
