//! BDD test world for watchtower service

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cucumber::World;
use watchtower::config::NotificationConfig;
use watchtower::uptime::UptimeAggregator;
use watchtower::{
    current_epoch_ms, Config, EndpointConfig, NotificationRecord, Notifier, Probe, ProbeResult,
    Status, StatusTransition, Watchtower, WatchtowerBuilder, WatchtowerError,
};

/// Probe that replays queued outcomes per endpoint (success when empty)
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    outcomes: Mutex<HashMap<String, VecDeque<bool>>>,
}

impl ScriptedProbe {
    pub fn queue(&self, endpoint_id: &str, outcomes: impl IntoIterator<Item = bool>) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(endpoint_id.to_string())
            .or_default()
            .extend(outcomes);
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, endpoint: &EndpointConfig) -> ProbeResult {
        let success = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(&endpoint.id)
            .and_then(|q| q.pop_front())
            .unwrap_or(true);

        ProbeResult {
            endpoint_id: endpoint.id.clone(),
            timestamp_epoch_ms: current_epoch_ms(),
            success,
            latency_ms: 25,
            status_code: Some(if success { 200 } else { 503 }),
            error: (!success).then(|| "HTTP 503".to_string()),
        }
    }
}

/// Notifier that records deliveries and fails for selected recipients
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, StatusTransition)>>,
    pub failing: Mutex<HashSet<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn type_name(&self) -> &str {
        "recording"
    }

    async fn send(
        &self,
        recipient: &str,
        _endpoint_name: &str,
        transition: &StatusTransition,
    ) -> watchtower::Result<()> {
        if self.failing.lock().unwrap().contains(recipient) {
            return Err(WatchtowerError::Delivery(format!(
                "{} rejected the message",
                recipient
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), transition.clone()));
        Ok(())
    }
}

#[derive(Debug, Default, World)]
pub struct WatchtowerWorld {
    pub watchtower: Option<Watchtower>,
    pub probe: Arc<ScriptedProbe>,
    pub notifier: Arc<RecordingNotifier>,
    pub last_error: Option<WatchtowerError>,
    pub records: Vec<NotificationRecord>,

    // Uptime testing
    pub aggregator: Option<UptimeAggregator>,
}

impl WatchtowerWorld {
    /// The service under test, built on first use
    pub async fn watchtower(&mut self) -> &Watchtower {
        if self.watchtower.is_none() {
            let config = Config {
                notifications: NotificationConfig {
                    initial_backoff: Duration::from_millis(1),
                    max_backoff: Duration::from_millis(5),
                    ..NotificationConfig::default()
                },
                ..Config::default()
            };
            let watchtower = WatchtowerBuilder::new(config)
                .with_probe(self.probe.clone())
                .with_notifier(self.notifier.clone())
                .build()
                .await
                .expect("watchtower should build");
            self.watchtower = Some(watchtower);
        }
        self.watchtower.as_ref().unwrap()
    }

    pub fn sent(&self) -> Vec<(String, StatusTransition)> {
        self.notifier.sent.lock().unwrap().clone()
    }
}

pub fn parse_status(s: &str) -> Status {
    match s {
        "up" => Status::Up,
        "down" => Status::Down,
        "maintenance" => Status::Maintenance,
        other => panic!("Unknown status: {}", other),
    }
}

pub fn endpoint(id: &str, recipients: &[String]) -> EndpointConfig {
    EndpointConfig {
        id: id.to_string(),
        name: format!("Endpoint {}", id),
        url: format!("https://{}.example.com/health", id),
        check_interval_minutes: 1,
        notifications_enabled: true,
        recipients: recipients.to_vec(),
    }
}

pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
