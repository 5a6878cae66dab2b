//! Field-name normalization at the storage boundary.
//!
//! The layer stores exactly one canonical casing: snake_case. Ingress
//! collapses camelCase/PascalCase keys to snake_case; egress to the UI
//! converts back to camelCase. Both forms are never stored side by side.

use serde_json::Value;

/// Domain attributes of a record, keyed by canonical snake_case names.
pub type FieldMap = serde_json::Map<String, Value>;

/// Columns owned by the remote store. Clients never write these.
pub const SERVER_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Converts a camelCase or PascalCase key to snake_case. Keys already in
/// snake_case pass through unchanged.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts a snake_case key to camelCase for the UI boundary.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Normalizes every key in a field map to snake_case.
///
/// When a map carries both casings of the same field (the source app's
/// permanent `deliveryDate`/`delivery_date` duplication), the snake_case
/// entry wins regardless of iteration order.
pub fn normalize_fields(fields: &FieldMap) -> FieldMap {
    let mut out = FieldMap::new();
    for (key, value) in fields {
        let canonical = normalize_key(key);
        if *key == canonical || !out.contains_key(&canonical) {
            out.insert(canonical, value.clone());
        }
    }
    out
}

/// Removes server-assigned columns from an outbound field map. Creation
/// timestamps are assigned remotely; a user-chosen business date is an
/// ordinary field and survives this strip.
pub fn strip_server_fields(fields: &mut FieldMap) {
    for name in SERVER_FIELDS {
        fields.remove(*name);
    }
}
