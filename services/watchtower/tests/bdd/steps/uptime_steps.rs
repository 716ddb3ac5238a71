//! BDD step definitions for uptime aggregation

use chrono::{DateTime, NaiveDate};
use cucumber::{given, then};

use watchtower::uptime::UptimeAggregator;
use watchtower::StatusSample;

use crate::world::{parse_status, split_list, WatchtowerWorld};

const HOUR_MS: u64 = 60 * 60 * 1000;

fn parse_instant(s: &str) -> u64 {
    DateTime::parse_from_rfc3339(s)
        .expect("invalid RFC 3339 timestamp")
        .timestamp_millis() as u64
}

#[given(expr = "an uptime aggregator retaining {int} days")]
fn uptime_aggregator(world: &mut WatchtowerWorld, days: u32) {
    world.aggregator = Some(UptimeAggregator::new(days));
}

#[given(expr = "samples for {string} on {string} with statuses {string}")]
fn samples_on_day(world: &mut WatchtowerWorld, id: String, day: String, statuses: String) {
    let midnight = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
        .expect("invalid date")
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis() as u64;
    let aggregator = world.aggregator.as_mut().expect("aggregator not set");

    for (hour, status) in split_list(&statuses).iter().enumerate() {
        aggregator.record(
            &id,
            StatusSample {
                endpoint_id: id.clone(),
                timestamp_epoch_ms: midnight + hour as u64 * HOUR_MS,
                status: parse_status(status),
                response_time_ms: 100,
            },
        );
    }
}

#[then(expr = "the uptime of {string} over {int} days at {string} is {float} percent")]
fn uptime_at(world: &mut WatchtowerWorld, id: String, days: u32, at: String, expected: f64) {
    let aggregator = world.aggregator.as_ref().expect("aggregator not set");
    let now = parse_instant(&at);
    let first = aggregator.uptime_percent(&id, days, now);
    assert_eq!(first, expected);
    assert_eq!(aggregator.uptime_percent(&id, days, now), first);
}

#[then(expr = "the {int} day history of {string} at {string} is {string}")]
fn history_at(world: &mut WatchtowerWorld, days: u32, id: String, at: String, expected: String) {
    let aggregator = world.aggregator.as_ref().expect("aggregator not set");
    let history = aggregator.history(&id, days, parse_instant(&at));

    let actual: Vec<String> = history
        .iter()
        .map(|day| match day.uptime {
            Some(uptime) => format!("{:.1}", uptime),
            None => "none".to_string(),
        })
        .collect();
    assert_eq!(actual, split_list(&expected));

    // Restartable
    assert_eq!(history.iter().count(), days as usize);
}
