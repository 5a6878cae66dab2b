//! Immutable query descriptions.
//!
//! A [`QueryFilter`] describes one read: table, equality and range
//! predicates, optional limit, and an explicit pagination cursor. Its
//! deterministic serialization doubles as the cache key.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An immutable description of a read operation.
///
/// Predicates live in `BTreeMap`s so that two filters with the same
/// predicates always serialize to the same cache key, regardless of the
/// order the builder calls were made in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    table: String,
    eq: BTreeMap<String, Value>,
    min: BTreeMap<String, Value>,
    max: BTreeMap<String, Value>,
    limit: Option<u32>,
    cursor: Option<u64>,
}

impl QueryFilter {
    /// Starts a filter over one table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            eq: BTreeMap::new(),
            min: BTreeMap::new(),
            max: BTreeMap::new(),
            limit: None,
            cursor: None,
        }
    }

    /// Adds an equality predicate. The field name is normalized to the
    /// canonical casing.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.eq.insert(crate::fields::normalize_key(field), value.into());
        self
    }

    /// Adds an inclusive lower bound on a field.
    pub fn min(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.min.insert(crate::fields::normalize_key(field), value.into());
        self
    }

    /// Adds an inclusive upper bound on a field.
    pub fn max(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.max.insert(crate::fields::normalize_key(field), value.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Pagination cursor: the row offset to resume from. Pagination is
    /// explicit; a query never restarts on its own.
    pub fn cursor(mut self, cursor: u64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn eq_predicates(&self) -> &BTreeMap<String, Value> {
        &self.eq
    }

    pub fn min_predicates(&self) -> &BTreeMap<String, Value> {
        &self.min
    }

    pub fn max_predicates(&self) -> &BTreeMap<String, Value> {
        &self.max
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub fn cursor_value(&self) -> Option<u64> {
        self.cursor
    }

    /// Deterministic cache key. Always begins with [`Self::key_prefix`] for
    /// the filter's table, which is what write-path invalidation matches on.
    pub fn cache_key(&self) -> String {
        let body = serde_json::json!({
            "eq": self.eq,
            "min": self.min,
            "max": self.max,
            "limit": self.limit,
            "cursor": self.cursor,
        });
        format!("{}{}", Self::key_prefix(&self.table), body)
    }

    /// The shared key prefix of every filter over `table`.
    pub fn key_prefix(table: &str) -> String {
        format!("{table}|")
    }

    /// Evaluates the predicates against a record locally. `id` and `status`
    /// resolve to the record's split-out columns; every other field name
    /// resolves into the field map.
    pub fn matches(&self, record: &Record) -> bool {
        self.eq.iter().all(|(field, want)| {
            record_value(record, field).is_some_and(|have| have == *want)
        }) && self.min.iter().all(|(field, bound)| {
            record_value(record, field).is_some_and(|have| cmp_ge(&have, bound))
        }) && self.max.iter().all(|(field, bound)| {
            record_value(record, field).is_some_and(|have| cmp_ge(bound, &have))
        })
    }
}

fn record_value(record: &Record, field: &str) -> Option<Value> {
    match field {
        "id" => record.id.clone().map(Value::String),
        "status" => record.status.map(|s| Value::String(s.as_str().into())),
        _ => record.fields.get(field).cloned(),
    }
}

/// `a >= b` for the value kinds range predicates are used with: numbers
/// compare numerically, strings (including ISO dates) lexicographically.
fn cmp_ge(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a >= b,
        _ => match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        },
    }
}
