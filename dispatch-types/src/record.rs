//! One persisted business entity (delivery, customer, proof-of-delivery).

use crate::fields::{self, FieldMap};
use crate::status::{ParseStatusError, RecordStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A record as the layer sees it: well-known columns split out, everything
/// else in `fields` under canonical snake_case names.
///
/// `id`, `created_at`, and `updated_at` are assigned by the remote store and
/// are `None` until the first successful insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<String>,
    pub status: Option<RecordStatus>,
    pub fields: FieldMap,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Errors decoding a record from its remote wire form.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(String),

    #[error(transparent)]
    BadStatus(#[from] ParseStatusError),

    #[error("field {field} is not a valid timestamp: {value}")]
    BadTimestamp { field: String, value: String },
}

impl Record {
    /// A not-yet-persisted record with the given fields.
    pub fn new(fields: FieldMap) -> Self {
        Self {
            id: None,
            status: None,
            fields: fields::normalize_fields(&fields),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Decodes a record from the remote wire form: a flat JSON object whose
    /// `id`/`status`/`created_at`/`updated_at` columns are split out, with
    /// all remaining keys normalized to snake_case.
    pub fn from_wire(value: &Value) -> Result<Self, WireError> {
        let Some(object) = value.as_object() else {
            return Err(WireError::NotAnObject(value.to_string()));
        };
        let object = fields::normalize_fields(object);

        let mut record = Self {
            id: None,
            status: None,
            fields: FieldMap::new(),
            created_at: None,
            updated_at: None,
        };

        for (key, value) in object {
            match key.as_str() {
                "id" => record.id = Some(stringify_id(&value)),
                "status" if !value.is_null() => {
                    let raw = value.as_str().map(str::to_owned).unwrap_or(value.to_string());
                    record.status = Some(raw.parse()?);
                }
                "created_at" if !value.is_null() => {
                    record.created_at = Some(parse_timestamp("created_at", &value)?);
                }
                "updated_at" if !value.is_null() => {
                    record.updated_at = Some(parse_timestamp("updated_at", &value)?);
                }
                "status" | "created_at" | "updated_at" => {}
                _ => {
                    record.fields.insert(key, value);
                }
            }
        }

        Ok(record)
    }

    /// The outbound field map for a write: domain fields plus `status`,
    /// never the server-assigned columns.
    pub fn to_wire_fields(&self) -> FieldMap {
        let mut out = fields::normalize_fields(&self.fields);
        fields::strip_server_fields(&mut out);
        if let Some(status) = self.status {
            out.insert("status".into(), Value::String(status.as_str().into()));
        }
        out
    }

    /// Egress form for the UI boundary: one flat camelCase object.
    pub fn to_ui_value(&self) -> Value {
        let mut out = serde_json::Map::new();
        if let Some(id) = &self.id {
            out.insert("id".into(), Value::String(id.clone()));
        }
        if let Some(status) = self.status {
            out.insert("status".into(), Value::String(status.as_str().into()));
        }
        for (key, value) in &self.fields {
            out.insert(fields::to_camel_case(key), value.clone());
        }
        if let Some(ts) = self.created_at {
            out.insert("createdAt".into(), Value::String(ts.to_rfc3339()));
        }
        if let Some(ts) = self.updated_at {
            out.insert("updatedAt".into(), Value::String(ts.to_rfc3339()));
        }
        Value::Object(out)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

fn stringify_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_timestamp(field: &str, value: &Value) -> Result<DateTime<Utc>, WireError> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| WireError::BadTimestamp {
            field: field.to_string(),
            value: value.to_string(),
        })
}
