//! Notification dispatcher: delivers each transition to every recipient once

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{EndpointConfig, NotificationConfig};
use crate::notifier::{NotificationRecord, Notifier};
use crate::state::StateHandle;
use crate::status::{Status, StatusTransition};

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Idempotency key: one delivery per transition per recipient
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeliveryKey {
    endpoint_id: String,
    previous: Status,
    current: Status,
    timestamp_epoch_ms: u64,
    recipient: String,
}

impl DeliveryKey {
    fn new(transition: &StatusTransition, recipient: &str) -> Self {
        Self {
            endpoint_id: transition.endpoint_id.clone(),
            previous: transition.previous,
            current: transition.current,
            timestamp_epoch_ms: transition.timestamp_epoch_ms,
            recipient: recipient.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryState {
    InFlight,
    Delivered,
}

#[derive(Debug, Clone)]
struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    retention_ms: u64,
    ledger: Mutex<HashMap<DeliveryKey, DeliveryState>>,
    state: StateHandle,
}

impl Dispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        config: &NotificationConfig,
        retention_days: u32,
        state: StateHandle,
    ) -> Self {
        Self {
            notifier,
            policy: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                initial_backoff: config.initial_backoff,
                max_backoff: config.max_backoff,
            },
            retention_ms: u64::from(retention_days) * MS_PER_DAY,
            ledger: Mutex::new(HashMap::new()),
            state,
        }
    }

    /// Deliver `transition` to every recipient of `endpoint`.
    ///
    /// Recipients whose delivery for this transition is already claimed or
    /// done are skipped, so repeated calls never notify twice. Returns the
    /// records of the deliveries attempted by this call.
    pub async fn on_transition(
        &self,
        transition: &StatusTransition,
        endpoint: &EndpointConfig,
    ) -> Vec<NotificationRecord> {
        if !endpoint.notifications_enabled {
            debug!(endpoint = %endpoint.id, "notifications disabled, skipping dispatch");
            return Vec::new();
        }
        if endpoint.recipients.is_empty() {
            debug!(endpoint = %endpoint.id, "no recipients configured");
            return Vec::new();
        }

        let claimed = self.claim(transition, &endpoint.recipients);
        if claimed.is_empty() {
            debug!(
                endpoint = %endpoint.id,
                transition = %transition,
                "transition already dispatched"
            );
            return Vec::new();
        }

        info!(
            endpoint = %endpoint.id,
            transition = %transition,
            recipients = claimed.len(),
            notifier = self.notifier.type_name(),
            "dispatching notifications"
        );

        let mut deliveries = JoinSet::new();
        for (index, recipient) in claimed.into_iter().enumerate() {
            let notifier = Arc::clone(&self.notifier);
            let policy = self.policy.clone();
            let transition = transition.clone();
            let endpoint_name = endpoint.name.clone();
            deliveries.spawn(async move {
                let record =
                    deliver(notifier.as_ref(), &policy, &recipient, &endpoint_name, &transition)
                        .await;
                (index, record)
            });
        }

        let mut records = Vec::new();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(entry) => records.push(entry),
                Err(e) => error!("notification task failed: {}", e),
            }
        }
        records.sort_by_key(|(index, _)| *index);
        let records: Vec<NotificationRecord> =
            records.into_iter().map(|(_, record)| record).collect();

        self.settle(transition, &records);

        let mut state = self.state.write().await;
        for record in &records {
            state.add_notification(record.clone());
        }

        records
    }

    /// Claim ledger slots for the recipients not yet claimed or delivered
    fn claim(&self, transition: &StatusTransition, recipients: &[String]) -> Vec<String> {
        let mut ledger = match self.ledger.lock() {
            Ok(ledger) => ledger,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.prune(&mut ledger, transition.timestamp_epoch_ms);

        let mut claimed = Vec::new();
        for recipient in recipients {
            let key = DeliveryKey::new(transition, recipient);
            if ledger.contains_key(&key) {
                continue;
            }
            ledger.insert(key, DeliveryState::InFlight);
            claimed.push(recipient.clone());
        }
        claimed
    }

    /// Mark successful deliveries done and release permanent failures
    fn settle(&self, transition: &StatusTransition, records: &[NotificationRecord]) {
        let mut ledger = match self.ledger.lock() {
            Ok(ledger) => ledger,
            Err(poisoned) => poisoned.into_inner(),
        };
        for record in records {
            let key = DeliveryKey::new(transition, &record.recipient);
            if record.success {
                ledger.insert(key, DeliveryState::Delivered);
            } else {
                ledger.remove(&key);
            }
        }
    }

    fn prune(&self, ledger: &mut HashMap<DeliveryKey, DeliveryState>, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        ledger.retain(|key, state| {
            *state == DeliveryState::InFlight || key.timestamp_epoch_ms >= cutoff
        });
    }

    #[cfg(test)]
    fn ledger_len(&self) -> usize {
        self.ledger.lock().map(|l| l.len()).unwrap_or(0)
    }
}

async fn deliver(
    notifier: &dyn Notifier,
    policy: &RetryPolicy,
    recipient: &str,
    endpoint_name: &str,
    transition: &StatusTransition,
) -> NotificationRecord {
    let mut attempt = 0;
    let mut last_error = None;

    while attempt < policy.max_attempts {
        attempt += 1;
        match notifier.send(recipient, endpoint_name, transition).await {
            Ok(()) => {
                debug!(recipient, attempt, "notification delivered");
                last_error = None;
                break;
            }
            Err(e) => {
                warn!(recipient, attempt, "notification attempt failed: {}", e);
                last_error = Some(e.to_string());
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }

    let success = last_error.is_none();
    if !success {
        error!(
            recipient,
            endpoint = %transition.endpoint_id,
            transition = %transition,
            attempts = attempt,
            permanent = true,
            "notification delivery failed"
        );
    }

    NotificationRecord {
        endpoint_id: transition.endpoint_id.clone(),
        endpoint_name: endpoint_name.to_string(),
        transition: transition.clone(),
        recipient: recipient.to_string(),
        message: transition.current.alert_message().to_string(),
        attempts: attempt,
        success,
        permanent: !success,
        error: last_error,
        timestamp_epoch_ms: crate::current_epoch_ms(),
    }
}
