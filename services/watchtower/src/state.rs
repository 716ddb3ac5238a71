//! Shared runtime state: per-endpoint status and notification history

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::EndpointConfig;
use crate::notifier::NotificationRecord;
use crate::status::Status;

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Runtime status of a single endpoint. Written only by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub id: String,
    pub name: String,
    pub url: String,
    /// `None` until the first probe completes
    pub status: Option<Status>,
    pub response_time_ms: Option<u64>,
    pub uptime_percent: f64,
    pub last_checked_epoch_ms: Option<u64>,
    pub last_change_epoch_ms: Option<u64>,
    pub consecutive_failures: u32,
}

impl EndpointStatus {
    /// Status of a registered endpoint that has not been probed yet
    pub fn pending(config: &EndpointConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            url: config.url.clone(),
            status: None,
            response_time_ms: None,
            uptime_percent: 0.0,
            last_checked_epoch_ms: None,
            last_change_epoch_ms: None,
            consecutive_failures: 0,
        }
    }
}

/// Endpoint counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub maintenance: usize,
    pub pending: usize,
}

impl StatusSummary {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a EndpointStatus>) -> Self {
        let mut summary = StatusSummary::default();
        for endpoint in statuses {
            summary.total += 1;
            match endpoint.status {
                Some(Status::Up) => summary.up += 1,
                Some(Status::Down) => summary.down += 1,
                Some(Status::Maintenance) => summary.maintenance += 1,
                None => summary.pending += 1,
            }
        }
        summary
    }
}

/// Status filter for endpoint listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Up,
    Down,
    Maintenance,
}

impl StatusFilter {
    pub fn matches(&self, status: Option<Status>) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Up => status == Some(Status::Up),
            StatusFilter::Down => status == Some(Status::Down),
            StatusFilter::Maintenance => status == Some(Status::Maintenance),
        }
    }
}

/// Statuses matching `filter` whose name or url contains `search`
/// (case-insensitive), in input order
pub fn filter_statuses<'a>(
    statuses: impl IntoIterator<Item = &'a EndpointStatus>,
    filter: StatusFilter,
    search: &str,
) -> Vec<EndpointStatus> {
    let needle = search.trim().to_lowercase();
    statuses
        .into_iter()
        .filter(|e| filter.matches(e.status))
        .filter(|e| {
            needle.is_empty()
                || e.name.to_lowercase().contains(&needle)
                || e.url.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Shared state accessible by the scheduler, the dispatcher and queries
#[derive(Debug)]
pub struct SharedState {
    pub endpoints: Vec<EndpointStatus>,
    pub notifications: VecDeque<NotificationRecord>,
    /// Records older than this, relative to the newest, are dropped
    pub notifications_retention_ms: u64,
}

impl SharedState {
    pub fn new(retention_days: u32) -> Self {
        Self {
            endpoints: Vec::new(),
            notifications: VecDeque::new(),
            notifications_retention_ms: u64::from(retention_days) * MS_PER_DAY,
        }
    }

    /// Track an endpoint, refreshing its display fields if already known
    pub fn ensure_endpoint(&mut self, config: &EndpointConfig) {
        match self.endpoints.iter_mut().find(|e| e.id == config.id) {
            Some(status) => {
                if status.name != config.name || status.url != config.url {
                    status.name = config.name.clone();
                    status.url = config.url.clone();
                }
            }
            None => self.endpoints.push(EndpointStatus::pending(config)),
        }
    }

    /// Drop endpoints whose id is not in `ids`, keeping the order of the rest
    pub fn retain_endpoints(&mut self, ids: &[&str]) {
        self.endpoints.retain(|e| ids.contains(&e.id.as_str()));
    }

    pub fn remove_endpoint(&mut self, id: &str) {
        self.endpoints.retain(|e| e.id != id);
    }

    /// Store the measured response time and check timestamp
    pub fn record_check(&mut self, id: &str, response_time_ms: u64, now_ms: u64) {
        if let Some(status) = self.endpoints.iter_mut().find(|e| e.id == id) {
            status.response_time_ms = Some(response_time_ms);
            status.last_checked_epoch_ms = Some(now_ms);
        }
    }

    /// Store a new status, returning true if it changed
    pub fn apply_status(
        &mut self,
        id: &str,
        new_status: Status,
        uptime_percent: f64,
        now_ms: u64,
    ) -> bool {
        let Some(status) = self.endpoints.iter_mut().find(|e| e.id == id) else {
            return false;
        };

        let changed = status.status != Some(new_status);
        status.status = Some(new_status);
        status.uptime_percent = uptime_percent;
        if new_status == Status::Down {
            status.consecutive_failures += 1;
        } else {
            status.consecutive_failures = 0;
        }
        if changed {
            status.last_change_epoch_ms = Some(now_ms);
        }
        changed
    }

    pub fn get_endpoint(&self, id: &str) -> Option<&EndpointStatus> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    /// Current status of an endpoint; `None` if unknown or not yet probed
    pub fn get_status(&self, id: &str) -> Option<Status> {
        self.get_endpoint(id).and_then(|e| e.status)
    }

    /// Add a notification to history, dropping records that fall outside
    /// the retention window of the newest one
    pub fn add_notification(&mut self, record: NotificationRecord) {
        let newest = self
            .notifications
            .iter()
            .map(|n| n.timestamp_epoch_ms)
            .chain(std::iter::once(record.timestamp_epoch_ms))
            .max()
            .unwrap_or(record.timestamp_epoch_ms);
        let cutoff = newest.saturating_sub(self.notifications_retention_ms);

        self.notifications.push_back(record);
        self.notifications.retain(|n| n.timestamp_epoch_ms >= cutoff);
    }

    /// Notifications dispatched at or after `since_ms`, oldest first
    pub fn notifications_since(&self, since_ms: u64) -> Vec<NotificationRecord> {
        self.notifications
            .iter()
            .filter(|n| n.timestamp_epoch_ms >= since_ms)
            .cloned()
            .collect()
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(retention_days: u32) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(retention_days)))
}
