//! Delivery record status and its transition rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status of a status-bearing record (deliveries).
///
/// `Completed` and `Canceled` are terminal: once a record reaches either,
/// no further status change is permitted. All other transitions are free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    InTransit,
    OnSchedule,
    Canceled,
    Completed,
}

/// Returned when a status string on the wire is not part of the closed enum.
#[derive(Debug, Error)]
#[error("unknown record status: {0}")]
pub struct ParseStatusError(pub String);

impl RecordStatus {
    /// Canonical snake_case wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::InTransit => "in_transit",
            Self::OnSchedule => "on_schedule",
            Self::Canceled => "canceled",
            Self::Completed => "completed",
        }
    }

    /// A terminal status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Completed)
    }

    /// Whether a transition to `next` is legal. Writing the current status
    /// back unchanged is always allowed, so that full-record saves of a
    /// completed delivery (e.g. editing its notes) do not trip the check.
    pub fn can_transition_to(self, next: RecordStatus) -> bool {
        self == next || !self.is_terminal()
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = ParseStatusError;

    /// Accepts snake_case, camelCase, and PascalCase spellings. The source
    /// UI emitted all three over its lifetime; ingress collapses them here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "active" => Ok(Self::Active),
            "intransit" => Ok(Self::InTransit),
            "onschedule" => Ok(Self::OnSchedule),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}
