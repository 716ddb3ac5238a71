//! Status, sample and transition types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Health classification of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Up,
    Down,
    Maintenance,
}

impl Status {
    /// Alert text used when an endpoint enters this status
    pub fn alert_message(&self) -> &'static str {
        match self {
            Status::Up => "Endpoint is back online",
            Status::Down => "Endpoint is down",
            Status::Maintenance => "Endpoint is under maintenance",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => write!(f, "up"),
            Status::Down => write!(f, "down"),
            Status::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// One classified probe outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSample {
    pub endpoint_id: String,
    pub timestamp_epoch_ms: u64,
    pub status: Status,
    pub response_time_ms: u64,
}

/// A change between two consecutive statuses of one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusTransition {
    pub endpoint_id: String,
    pub previous: Status,
    pub current: Status,
    pub timestamp_epoch_ms: u64,
}

impl StatusTransition {
    /// Build a transition if `previous` is known and differs from `current`
    pub fn between(
        endpoint_id: &str,
        previous: Option<Status>,
        current: Status,
        timestamp_epoch_ms: u64,
    ) -> Option<Self> {
        match previous {
            Some(previous) if previous != current => Some(Self {
                endpoint_id: endpoint_id.to_string(),
                previous,
                current,
                timestamp_epoch_ms,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.previous, self.current)
    }
}
