//! Work items and field-level merge rules
//!
//! This module handles:
//! - Turning raw records into identity-keyed work items
//! - Legacy field migration on read
//! - Completeness checks and candidate link discovery
//! - Merging extracted fields into an item, and fresh items into stored records

use crate::config::RecordsConfig;
use crate::url::normalize_identity;
use serde_json::{Map, Value};

/// Markers left by upstream sources when a text was cut short
const TRUNCATION_MARKERS: &[&str] = &["...", "…"];

/// Unit of enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Normalized identity key, unique within a job
    pub identity: String,

    /// All known fields, including the identity field itself
    pub record: Map<String, Value>,

    /// Row id when the item comes from the relational store
    pub record_id: Option<i64>,
}

impl WorkItem {
    /// Builds an item from a raw record
    ///
    /// The legacy identity field is migrated first. Records without an identity
    /// cannot be matched against stored state and yield `None`.
    pub fn from_raw(mut record: Map<String, Value>, fields: &RecordsConfig) -> Option<Self> {
        migrate_legacy_field(&mut record, fields);

        let identity = normalize_identity(&value_text(record.get(&fields.identity_field)?));
        if identity.is_empty() {
            return None;
        }

        Some(Self {
            identity,
            record,
            record_id: None,
        })
    }

    /// Builds an item from a relational row
    ///
    /// Stored rows often lack the identity field that enrichment is meant to
    /// fill, so the row id stands in for it until one is known.
    pub fn from_row(id: i64, mut record: Map<String, Value>, fields: &RecordsConfig) -> Self {
        migrate_legacy_field(&mut record, fields);

        let identity = record
            .get(&fields.identity_field)
            .map(|value| normalize_identity(&value_text(value)))
            .filter(|identity| !identity.is_empty())
            .unwrap_or_else(|| format!("row:{}", id));

        Self {
            identity,
            record,
            record_id: Some(id),
        }
    }

    /// Returns a field as text, empty when missing
    pub fn text(&self, field: &str) -> String {
        self.record.get(field).map(value_text).unwrap_or_default()
    }

    /// Whether every required field holds a non-blank value
    pub fn is_complete(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|field| self.record.get(field).map(|v| !is_blank(v)).unwrap_or(false))
    }

    /// Social links pointing at the profile source host, in order
    pub fn candidate_links(&self, fields: &RecordsConfig) -> Vec<String> {
        self.text(&fields.social_field)
            .split(fields.link_separator.as_str())
            .map(str::trim)
            .filter(|link| !link.is_empty() && link.contains(fields.source_host.as_str()))
            .map(str::to_string)
            .collect()
    }

    /// Combines freshly extracted fields with this item
    ///
    /// Ordinary fields adopt the extracted value only when the current one is
    /// blank. The description field follows [`should_replace_description`].
    pub fn merge_extracted(&self, extracted: &Map<String, Value>, description_field: &str) -> WorkItem {
        let mut merged = self.clone();

        for (field, fresh) in extracted {
            let current = self.record.get(field);
            let adopt = if field == description_field {
                should_replace_description(
                    &current.map(value_text).unwrap_or_default(),
                    &value_text(fresh),
                )
            } else {
                current.map(is_blank).unwrap_or(true) && !is_blank(fresh)
            };

            if adopt {
                merged.record.insert(field.clone(), fresh.clone());
            }
        }

        merged
    }
}

/// Moves the legacy identity field to its current name
///
/// An existing non-blank value under the current name wins; the legacy key is
/// dropped either way.
pub fn migrate_legacy_field(record: &mut Map<String, Value>, fields: &RecordsConfig) {
    if let Some(legacy) = record.remove(&fields.legacy_identity_field) {
        let current_blank = record
            .get(&fields.identity_field)
            .map(is_blank)
            .unwrap_or(true);
        if current_blank {
            record.insert(fields.identity_field.clone(), legacy);
        }
    }
}

/// Whether a value counts as empty for merge purposes
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Renders a value as text, `null` as the empty string
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decides whether an extracted description replaces the current one
///
/// The extracted text must be non-blank. It replaces a blank original, or an
/// original whose first truncation marker sits somewhere other than the very
/// end (text was cut at the start or in the middle).
pub fn should_replace_description(original: &str, extracted: &str) -> bool {
    if extracted.trim().is_empty() {
        return false;
    }

    let original = original.trim_end();
    if original.trim().is_empty() {
        return true;
    }

    let first_marker = TRUNCATION_MARKERS
        .iter()
        .filter_map(|marker| original.find(marker).map(|pos| (pos, marker.len())))
        .min_by_key(|(pos, _)| *pos);

    match first_marker {
        Some((pos, len)) => pos + len != original.len(),
        None => false,
    }
}

/// Overlays non-blank values of `fresh` onto `stored`
///
/// Blank fresh values never clear a stored one. Returns whether anything changed.
pub fn overlay_non_blank(stored: &mut Map<String, Value>, fresh: &Map<String, Value>) -> bool {
    let mut changed = false;
    for (field, value) in fresh {
        if is_blank(value) {
            continue;
        }
        if stored.get(field) != Some(value) {
            stored.insert(field.clone(), value.clone());
            changed = true;
        }
    }
    changed
}
