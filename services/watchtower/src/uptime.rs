//! Uptime aggregation over retained status samples

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::status::{Status, StatusSample};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Retained status samples per endpoint
#[derive(Debug)]
pub struct UptimeAggregator {
    retention_ms: u64,
    samples: HashMap<String, VecDeque<StatusSample>>,
}

impl UptimeAggregator {
    pub fn new(retention_days: u32) -> Self {
        Self {
            retention_ms: u64::from(retention_days) * DAY_MS,
            samples: HashMap::new(),
        }
    }

    /// Append a sample, keeping the history time-ordered, and evict samples
    /// that fell out of the retention window.
    pub fn record(&mut self, endpoint_id: &str, sample: StatusSample) {
        let history = self.samples.entry(endpoint_id.to_string()).or_default();

        let position =
            history.partition_point(|s| s.timestamp_epoch_ms <= sample.timestamp_epoch_ms);
        history.insert(position, sample);

        let newest = history.back().map(|s| s.timestamp_epoch_ms).unwrap_or(0);
        let cutoff = newest.saturating_sub(self.retention_ms);
        while history
            .front()
            .is_some_and(|s| s.timestamp_epoch_ms < cutoff)
        {
            history.pop_front();
        }
    }

    /// Percentage of `up` samples in the trailing window, rounded to one
    /// decimal. Zero when the window holds no samples.
    pub fn uptime_percent(&self, endpoint_id: &str, window_days: u32, now_ms: u64) -> f64 {
        let (up, total) = self
            .window(endpoint_id, window_days, now_ms)
            .fold((0u64, 0u64), |(up, total), s| {
                (up + u64::from(s.status == Status::Up), total + 1)
            });

        if total == 0 {
            return 0.0;
        }
        let percent = up as f64 / total as f64 * 100.0;
        (percent * 10.0).round() / 10.0
    }

    /// Snapshot of the trailing window, aggregated per UTC day on iteration
    pub fn history(&self, endpoint_id: &str, window_days: u32, now_ms: u64) -> UptimeHistory {
        UptimeHistory {
            samples: self.window(endpoint_id, window_days, now_ms).cloned().collect(),
            window_days,
            last_day: epoch_ms_to_date(now_ms),
        }
    }

    /// Number of retained samples for an endpoint
    pub fn sample_count(&self, endpoint_id: &str) -> usize {
        self.samples.get(endpoint_id).map_or(0, |h| h.len())
    }

    /// Drop all samples of an endpoint
    pub fn forget(&mut self, endpoint_id: &str) {
        self.samples.remove(endpoint_id);
    }

    /// Evict samples older than the retention window ending at `now_ms`
    /// from every endpoint, including ones no longer recording
    pub fn evict_expired(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        self.samples.retain(|_, history| {
            while history
                .front()
                .is_some_and(|s| s.timestamp_epoch_ms < cutoff)
            {
                history.pop_front();
            }
            !history.is_empty()
        });
    }

    fn window<'a>(
        &'a self,
        endpoint_id: &str,
        window_days: u32,
        now_ms: u64,
    ) -> impl Iterator<Item = &'a StatusSample> + 'a {
        let start = window_start_ms(window_days, now_ms);
        self.samples
            .get(endpoint_id)
            .into_iter()
            .flatten()
            .filter(move |s| {
                window_days > 0 && s.timestamp_epoch_ms >= start && s.timestamp_epoch_ms <= now_ms
            })
    }
}

fn window_start_ms(window_days: u32, now_ms: u64) -> u64 {
    now_ms.saturating_sub(u64::from(window_days) * DAY_MS)
}

fn epoch_ms_to_date(epoch_ms: u64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_default()
        .date_naive()
}

/// Aggregate of one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUptime {
    pub date: NaiveDate,
    /// Fraction of `up` samples (0.0 to 1.0); `None` when the day has no samples
    pub uptime: Option<f64>,
    pub mean_response_time_ms: Option<f64>,
    pub samples: usize,
}

/// Owned snapshot of an endpoint's samples within a window.
///
/// [`UptimeHistory::iter`] computes one [`DailyUptime`] per day lazily and
/// may be called any number of times.
#[derive(Debug, Clone)]
pub struct UptimeHistory {
    samples: Vec<StatusSample>,
    window_days: u32,
    last_day: NaiveDate,
}

impl UptimeHistory {
    pub fn iter(&self) -> DailyUptimeIter<'_> {
        DailyUptimeIter {
            history: self,
            offset: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.window_days as usize
    }

    pub fn is_empty(&self) -> bool {
        self.window_days == 0
    }

    fn aggregate(&self, date: NaiveDate) -> DailyUptime {
        let (up, total, latency_sum) = self
            .samples
            .iter()
            .filter(|s| epoch_ms_to_date(s.timestamp_epoch_ms) == date)
            .fold((0u64, 0u64, 0u64), |(up, total, latency), s| {
                (
                    up + u64::from(s.status == Status::Up),
                    total + 1,
                    latency + s.response_time_ms,
                )
            });

        if total == 0 {
            return DailyUptime {
                date,
                uptime: None,
                mean_response_time_ms: None,
                samples: 0,
            };
        }

        DailyUptime {
            date,
            uptime: Some(up as f64 / total as f64),
            mean_response_time_ms: Some(latency_sum as f64 / total as f64),
            samples: total as usize,
        }
    }
}

impl<'a> IntoIterator for &'a UptimeHistory {
    type Item = DailyUptime;
    type IntoIter = DailyUptimeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the days of an [`UptimeHistory`], oldest first
#[derive(Debug, Clone)]
pub struct DailyUptimeIter<'a> {
    history: &'a UptimeHistory,
    offset: u32,
}

impl Iterator for DailyUptimeIter<'_> {
    type Item = DailyUptime;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.history.window_days {
            return None;
        }
        let days_back = u64::from(self.history.window_days - 1 - self.offset);
        self.offset += 1;
        let date = self.history.last_day.checked_sub_days(Days::new(days_back))?;
        Some(self.history.aggregate(date))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.history.window_days.saturating_sub(self.offset) as usize;
        (remaining, Some(remaining))
    }
}

/// Thread-safe aggregator handle
pub type UptimeHandle = Arc<RwLock<UptimeAggregator>>;

pub fn new_uptime_handle(retention_days: u32) -> UptimeHandle {
    Arc::new(RwLock::new(UptimeAggregator::new(retention_days)))
}
