//! Change notifications from the remote store.

use crate::record::Record;
use serde::{Deserialize, Serialize};

/// The kind of mutation a change event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One mutation observed on a table, either echoed from the remote change
/// stream or published locally after this client's own write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record_id: String,
    /// The record after the mutation. Absent for deletes.
    pub record: Option<Record>,
}
