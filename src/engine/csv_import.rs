//! Header-to-attribute mapping and per-cell value conversion for
//! `IMPORT FROM CSV` (spec.md §4.6).

use crate::schema::TableSchema;
use crate::value::{DataType, Value};
use std::collections::{HashMap, HashSet};

const EMPTY_SENTINELS: [&str; 5] = ["", "null", "none", "n/a", "na"];

/// True for cells that should be treated as "no value supplied" rather than a
/// literal to convert — an empty string or one of a handful of conventional
/// null spellings.
pub fn is_empty_cell(raw: &str) -> bool {
    EMPTY_SENTINELS.contains(&raw.trim().to_lowercase().as_str())
}

fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase()
}

/// Maps each CSV header to an attribute index, in three tiers: exact name
/// match, then case-insensitive match, then punctuation-insensitive substring
/// match — each tier only considers attributes not already claimed by an
/// earlier tier, and skips headers already mapped.
pub fn map_columns(headers: &[String], schema: &TableSchema) -> HashMap<usize, usize> {
    let mut mapping = HashMap::new();
    let mut used = HashSet::new();

    for (hi, header) in headers.iter().enumerate() {
        if let Some(ai) = schema.attributes.iter().position(|a| a.name == *header) {
            if used.insert(ai) {
                mapping.insert(hi, ai);
            }
        }
    }

    for (hi, header) in headers.iter().enumerate() {
        if mapping.contains_key(&hi) {
            continue;
        }
        if let Some(ai) = schema
            .attributes
            .iter()
            .position(|a| !used.contains(&schema.attribute_index(&a.name).unwrap()) && a.name.eq_ignore_ascii_case(header))
        {
            used.insert(ai);
            mapping.insert(hi, ai);
        }
    }

    for (hi, header) in headers.iter().enumerate() {
        if mapping.contains_key(&hi) {
            continue;
        }
        let norm_header = normalize(header);
        if norm_header.is_empty() {
            continue;
        }
        if let Some(ai) = schema.attributes.iter().position(|a| {
            let idx = schema.attribute_index(&a.name).unwrap();
            if used.contains(&idx) {
                return false;
            }
            let norm_attr = normalize(&a.name);
            !norm_attr.is_empty() && (norm_attr.contains(&norm_header) || norm_header.contains(&norm_attr))
        }) {
            used.insert(ai);
            mapping.insert(hi, ai);
        }
    }

    mapping
}

/// Converts one CSV cell to a typed value, falling back to the attribute's
/// type default on any parse failure — a single bad cell never fails the row
/// (spec.md §7: row-level failures never abort the remainder).
pub fn convert_cell(raw: &str, data_type: DataType) -> Value {
    Value::parse_as(raw, data_type).unwrap_or_else(|_| data_type.default_value())
}
