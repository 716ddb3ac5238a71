//! Scheduler: probes every registered endpoint once per interval

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{EndpointConfig, SchedulerConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, WatchtowerError};
use crate::evaluator::{evaluate, Debouncer};
use crate::probe::{Probe, ProbeResult};
use crate::registry::Registry;
use crate::state::StateHandle;
use crate::status::{Status, StatusSample, StatusTransition};
use crate::uptime::UptimeHandle;

/// Consecutive failures after which a warning is logged
const FAILURE_WARNING_THRESHOLD: u32 = 5;

/// Per-endpoint scheduling state. `probing` is the Idle/Probing flag.
#[derive(Debug)]
struct ProbeSlot {
    probing: bool,
    next_due: Option<Instant>,
    /// Interval `next_due` was computed with
    interval: Duration,
    last_started: Option<Instant>,
    debouncer: Debouncer,
}

impl ProbeSlot {
    fn new(confirmations: u32, interval: Duration) -> Self {
        Self {
            probing: false,
            next_due: None,
            interval,
            last_started: None,
            debouncer: Debouncer::new(confirmations),
        }
    }

    /// Re-base the next due time on the last start when the interval changed
    fn set_interval(&mut self, interval: Duration) {
        if self.interval == interval {
            return;
        }
        self.interval = interval;
        if let Some(started) = self.last_started {
            self.next_due = Some(started + interval);
        }
    }

    fn claim(&mut self, now: Instant) {
        self.probing = true;
        self.last_started = Some(now);
        self.next_due = Some(now + self.interval);
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    registry: Registry,
    probe: Arc<dyn Probe>,
    dispatcher: Arc<Dispatcher>,
    state: StateHandle,
    uptime: UptimeHandle,
    permits: Arc<Semaphore>,
    slots: Arc<Mutex<HashMap<String, ProbeSlot>>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    retention_days: u32,
    confirmations: u32,
}

impl Scheduler {
    pub fn new(
        registry: Registry,
        probe: Arc<dyn Probe>,
        dispatcher: Arc<Dispatcher>,
        state: StateHandle,
        uptime: UptimeHandle,
        config: &SchedulerConfig,
        retention_days: u32,
    ) -> Self {
        let max_concurrent = config.max_concurrent_probes();
        debug!("Scheduler allows {} concurrent probes", max_concurrent);

        Self {
            registry,
            probe,
            dispatcher,
            state,
            uptime,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            slots: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            retention_days,
            confirmations: config.confirmations,
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the scheduling loop
    pub fn start(&self, poll_resolution: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run(poll_resolution).await })
    }

    /// Evaluate the schedule every `poll_resolution` until cancelled, then
    /// wait for in-flight probes to finish.
    pub async fn run(&self, poll_resolution: Duration) {
        info!("Scheduler started (poll resolution {:?})", poll_resolution);

        let mut ticker = tokio::time::interval(poll_resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Scheduler loop cancelled");
                    break;
                }
                _ = ticker.tick() => self.evaluate_schedule().await,
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("Scheduler stopped");
    }

    /// Stop scheduling and wait for in-flight probes to complete
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Claim every due, idle endpoint and spawn its probe. Also prunes
    /// runtime state of endpoints no longer in the registry and expired
    /// uptime samples.
    pub async fn evaluate_schedule(&self) {
        let entries = self.registry.entries().await;
        let ids: Vec<&str> = entries.iter().map(|e| e.config.id.as_str()).collect();

        {
            let mut state = self.state.write().await;
            for entry in &entries {
                state.ensure_endpoint(&entry.config);
            }
            state.retain_endpoints(&ids);
        }
        self.uptime
            .write()
            .await
            .evict_expired(crate::current_epoch_ms());

        let now = Instant::now();
        let due = {
            let mut slots = self.lock_slots();
            slots.retain(|id, slot| slot.probing || ids.contains(&id.as_str()));

            let mut due = Vec::new();
            for entry in &entries {
                let interval = entry.config.check_interval();
                let slot = slots
                    .entry(entry.config.id.clone())
                    .or_insert_with(|| ProbeSlot::new(self.confirmations, interval));
                if slot.interval != interval {
                    debug!(
                        endpoint = %entry.config.id,
                        "check interval changed to {:?}", interval
                    );
                    slot.set_interval(interval);
                }

                let next_due = match slot.next_due {
                    Some(next) if next > now => continue,
                    Some(next) => next,
                    None => now,
                };

                if slot.probing {
                    debug!(
                        endpoint = %entry.config.id,
                        "previous probe still running, skipping this interval"
                    );
                    slot.next_due = Some(next_due + interval);
                    continue;
                }

                slot.claim(now);
                due.push(Arc::clone(&entry.config));
            }
            due
        };

        for config in due {
            self.spawn_probe(config);
        }
    }

    /// Probe an endpoint now and wait for the result to be processed
    pub async fn force_check(&self, id: &str) -> Result<ProbeResult> {
        let entry = self
            .registry
            .entry(id)
            .await
            .ok_or_else(|| WatchtowerError::NotFound(id.to_string()))?;

        {
            let mut slots = self.lock_slots();
            let interval = entry.config.check_interval();
            let slot = slots
                .entry(id.to_string())
                .or_insert_with(|| ProbeSlot::new(self.confirmations, interval));
            if slot.probing {
                return Err(WatchtowerError::ProbeInFlight(id.to_string()));
            }
            slot.set_interval(interval);
            slot.claim(Instant::now());
        }
        self.state.write().await.ensure_endpoint(&entry.config);

        info!(endpoint = %id, "Forced check");

        // Run on the tracker so the slot is released even if the caller
        // drops this future.
        let scheduler = self.clone();
        let config = Arc::clone(&entry.config);
        let handle = self.tracker.spawn(async move {
            let permit = scheduler.permits.clone().acquire_owned().await;
            let result = scheduler.probe.probe(&config).await;
            drop(permit);
            scheduler.complete_probe(&config, result.clone()).await;
            result
        });

        handle
            .await
            .map_err(|e| WatchtowerError::Probe(format!("forced check task failed: {}", e)))
    }

    fn spawn_probe(&self, config: Arc<EndpointConfig>) {
        let scheduler = self.clone();
        self.tracker.spawn(async move {
            let Ok(permit) = scheduler.permits.clone().acquire_owned().await else {
                scheduler.release(&config.id);
                return;
            };

            if scheduler.cancel.is_cancelled() || !scheduler.registry.contains(&config.id).await {
                debug!(endpoint = %config.id, "Probe abandoned before start");
                scheduler.release(&config.id);
                return;
            }

            let result = scheduler.probe.probe(&config).await;
            drop(permit);
            scheduler.complete_probe(&config, result).await;
        });
    }

    /// Process a finished probe: record, evaluate, dispatch, then store
    async fn complete_probe(&self, config: &EndpointConfig, result: ProbeResult) {
        let id = config.id.as_str();
        let ts = result.timestamp_epoch_ms;

        let Some(entry) = self.registry.entry(id).await else {
            // Deleted while probing: keep the sample, drop everything else
            let status = evaluate(None, false, &result);
            self.uptime
                .write()
                .await
                .record(id, sample(&result, status));
            self.discard_if_deleted(id).await;
            return;
        };

        let previous = {
            let mut state = self.state.write().await;
            state.ensure_endpoint(&entry.config);
            state.record_check(id, result.latency_ms, ts);
            state.get_status(id)
        };

        let classified = evaluate(previous, entry.maintenance, &result);
        let status = match self.lock_slots().get_mut(id) {
            Some(slot) => slot.debouncer.observe(previous, classified),
            None => classified,
        };

        let uptime_percent = {
            let mut uptime = self.uptime.write().await;
            uptime.record(id, sample(&result, classified));
            uptime.uptime_percent(id, self.retention_days, ts)
        };

        debug!(
            endpoint = %id,
            success = result.success,
            status_code = ?result.status_code,
            latency_ms = result.latency_ms,
            %status,
            "Probe complete"
        );

        if self.discard_if_deleted(id).await {
            return;
        }

        if let Some(transition) = StatusTransition::between(id, previous, status, ts) {
            if status == Status::Down {
                warn!(endpoint = %id, error = ?result.error, "Status changed: {}", transition);
            } else {
                info!(endpoint = %id, "Status changed: {}", transition);
            }
            self.dispatcher
                .on_transition(&transition, &entry.config)
                .await;
        }

        // Dispatch may take a while; the endpoint can be gone by now
        if self.discard_if_deleted(id).await {
            return;
        }

        {
            let mut state = self.state.write().await;
            state.apply_status(id, status, uptime_percent, ts);
            let failures = state
                .get_endpoint(id)
                .map_or(0, |e| e.consecutive_failures);
            if failures == FAILURE_WARNING_THRESHOLD {
                warn!("Endpoint '{}' has {} consecutive failures", id, failures);
            }
        }

        self.release(id);
    }

    /// Drop the runtime state of an endpoint that is no longer registered.
    /// Returns true if it was dropped.
    async fn discard_if_deleted(&self, id: &str) -> bool {
        if self.registry.contains(id).await {
            return false;
        }
        self.state.write().await.remove_endpoint(id);
        self.lock_slots().remove(id);
        debug!(endpoint = %id, "Discarded result for deleted endpoint");
        true
    }

    fn release(&self, id: &str) {
        if let Some(slot) = self.lock_slots().get_mut(id) {
            slot.probing = false;
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, ProbeSlot>> {
        match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn is_probing(&self, id: &str) -> bool {
        self.lock_slots().get(id).is_some_and(|s| s.probing)
    }
}

fn sample(result: &ProbeResult, status: Status) -> StatusSample {
    StatusSample {
        endpoint_id: result.endpoint_id.clone(),
        timestamp_epoch_ms: result.timestamp_epoch_ms,
        status,
        response_time_ms: result.latency_ms,
    }
}
