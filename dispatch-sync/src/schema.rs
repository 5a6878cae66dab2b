//! Table schemas and pre-network validation.
//!
//! Validation runs before any network call, so the whole class of
//! missing-not-null-column and wrong-type failures is caught locally with a
//! `Validation` error instead of surfacing as an opaque remote rejection.

use crate::error::{SyncError, SyncResult};
use chrono::DateTime;
use dispatch_types::{FieldMap, RecordStatus};
use serde_json::Value;
use std::collections::HashMap;

/// The value kinds a column can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    /// RFC 3339 timestamp string. Used for user-chosen business dates;
    /// `created_at`/`updated_at` are server-owned and not part of any schema.
    Timestamp,
    /// One of the closed [`RecordStatus`] enum.
    Status,
}

/// One column in a table schema.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Closed schema for one table. Unknown fields are rejected; the remote
/// store would reject them anyway, but later and less legibly.
#[derive(Clone, Debug)]
pub struct TableSchema {
    pub table: String,
    pub fields: Vec<FieldSpec>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            table: table.into(),
            fields,
        }
    }

    fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Insert validation: every required field present and non-null, every
    /// present field well-typed, no unknown fields.
    pub fn validate_insert(&self, fields: &FieldMap) -> SyncResult<()> {
        for spec in self.fields.iter().filter(|f| f.required) {
            match fields.get(&spec.name) {
                None | Some(Value::Null) => {
                    return Err(SyncError::Validation(format!(
                        "{}: missing required field {}",
                        self.table, spec.name
                    )));
                }
                Some(_) => {}
            }
        }
        self.validate_update(fields)
    }

    /// Update validation: present fields only. A partial update need not
    /// carry required fields it does not change.
    pub fn validate_update(&self, fields: &FieldMap) -> SyncResult<()> {
        for (name, value) in fields {
            let Some(spec) = self.spec(name) else {
                return Err(SyncError::Validation(format!(
                    "{}: unknown field {name}",
                    self.table
                )));
            };
            if !value.is_null() && !kind_matches(spec.kind, value) {
                return Err(SyncError::Validation(format!(
                    "{}: field {name} is not a valid {:?}",
                    self.table, spec.kind
                )));
            }
        }
        Ok(())
    }
}

fn kind_matches(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::Text => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Float => value.is_number(),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::Timestamp => value
            .as_str()
            .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
        FieldKind::Status => value
            .as_str()
            .is_some_and(|s| s.parse::<RecordStatus>().is_ok()),
    }
}

/// Registry of table schemas known to the layer.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// The three built-in dashboard tables.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(TableSchema::new(
            "deliveries",
            vec![
                FieldSpec::required("reference", FieldKind::Text),
                FieldSpec::required("status", FieldKind::Status),
                FieldSpec::optional("customer_id", FieldKind::Text),
                FieldSpec::optional("delivery_date", FieldKind::Timestamp),
                FieldSpec::optional("origin", FieldKind::Text),
                FieldSpec::optional("destination", FieldKind::Text),
                FieldSpec::optional("driver_name", FieldKind::Text),
                FieldSpec::optional("amount", FieldKind::Float),
                FieldSpec::optional("notes", FieldKind::Text),
            ],
        ));
        registry.register(TableSchema::new(
            "customers",
            vec![
                FieldSpec::required("name", FieldKind::Text),
                FieldSpec::optional("email", FieldKind::Text),
                FieldSpec::optional("phone", FieldKind::Text),
                FieldSpec::optional("address", FieldKind::Text),
            ],
        ));
        registry.register(TableSchema::new(
            "proof_of_delivery",
            vec![
                FieldSpec::required("delivery_id", FieldKind::Text),
                FieldSpec::required("signer_name", FieldKind::Text),
                FieldSpec::required("signature_data", FieldKind::Text),
                FieldSpec::optional("signed_at", FieldKind::Timestamp),
            ],
        ));
        registry
    }

    pub fn register(&mut self, schema: TableSchema) {
        self.tables.insert(schema.table.clone(), schema);
    }

    pub fn get(&self, table: &str) -> SyncResult<&TableSchema> {
        self.tables
            .get(table)
            .ok_or_else(|| SyncError::Validation(format!("unknown table: {table}")))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn insert_requires_all_required_fields() {
        let registry = SchemaRegistry::builtin();
        let schema = registry.get("deliveries").unwrap();

        let ok = fields(&[("reference", json!("DR-001")), ("status", json!("active"))]);
        assert!(schema.validate_insert(&ok).is_ok());

        let missing = fields(&[("reference", json!("DR-001"))]);
        assert!(matches!(
            schema.validate_insert(&missing),
            Err(SyncError::Validation(_))
        ));

        // Explicit null does not satisfy a required field.
        let null_status = fields(&[("reference", json!("DR-001")), ("status", json!(null))]);
        assert!(schema.validate_insert(&null_status).is_err());
    }

    #[test]
    fn update_allows_partial_but_rejects_unknown_fields() {
        let registry = SchemaRegistry::builtin();
        let schema = registry.get("deliveries").unwrap();

        let partial = fields(&[("notes", json!("left at reception"))]);
        assert!(schema.validate_update(&partial).is_ok());

        let unknown = fields(&[("notez", json!("typo"))]);
        assert!(matches!(
            schema.validate_update(&unknown),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn type_checks_each_kind() {
        let registry = SchemaRegistry::builtin();
        let schema = registry.get("deliveries").unwrap();

        assert!(schema.validate_update(&fields(&[("amount", json!(12.5))])).is_ok());
        assert!(schema.validate_update(&fields(&[("amount", json!("12.5"))])).is_err());
        assert!(schema.validate_update(&fields(&[("status", json!("bogus"))])).is_err());
        assert!(schema
            .validate_update(&fields(&[("delivery_date", json!("2026-09-01T08:00:00Z"))]))
            .is_ok());
        assert!(schema
            .validate_update(&fields(&[("delivery_date", json!("tomorrow"))]))
            .is_err());
    }

    #[test]
    fn unknown_table_is_a_validation_error() {
        let registry = SchemaRegistry::builtin();
        assert!(matches!(
            registry.get("parcels"),
            Err(SyncError::Validation(_))
        ));
    }
}
