//! Shared types for the Dispatch data layer.
//!
//! Pure data: records, statuses, query filters, change events, and the
//! field-name normalization rules applied at the storage boundary. No I/O
//! lives here.

pub mod change;
pub mod fields;
pub mod filter;
pub mod record;
pub mod status;

pub use change::{ChangeEvent, ChangeKind};
pub use fields::FieldMap;
pub use filter::QueryFilter;
pub use record::{Record, WireError};
pub use status::{ParseStatusError, RecordStatus};
