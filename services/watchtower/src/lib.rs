//! Watchtower - Endpoint uptime monitoring service
//!
//! Periodically probes registered HTTP endpoints, classifies each probe into
//! a status, keeps rolling uptime history, and notifies recipients exactly
//! once per status transition.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod io;
pub mod notifier;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod uptime;

pub use config::{load_config, Config, EndpointConfig};
pub use error::{Result, WatchtowerError};
pub use notifier::{LogNotifier, NotificationRecord, Notifier};
pub use probe::{HttpProbe, Probe, ProbeResult};
pub use registry::Registry;
pub use scheduler::Scheduler;
pub use state::{EndpointStatus, StatusFilter, StatusSummary};
pub use status::{Status, StatusSample, StatusTransition};
pub use uptime::{DailyUptime, UptimeHistory};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::state::StateHandle;
use crate::uptime::UptimeHandle;

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Milliseconds since the Unix epoch
pub fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Builder for the watchtower service.
///
/// Allows injecting custom HTTP clients, probes, notifiers and a
/// cancellation token (for testing or embedding).
pub struct WatchtowerBuilder {
    config: Config,
    http_client: Option<Arc<dyn HttpClient>>,
    probe: Option<Arc<dyn Probe>>,
    notifier: Option<Arc<dyn Notifier>>,
    cancel: Option<CancellationToken>,
}

impl WatchtowerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http_client: None,
            probe: None,
            notifier: None,
            cancel: None,
        }
    }

    /// HTTP client used by the default [`HttpProbe`]
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Replace the HTTP probe entirely
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate the configuration, open the registry and wire all components
    pub async fn build(self) -> Result<Watchtower> {
        self.config.validate()?;

        let probe: Arc<dyn Probe> = match self.probe {
            Some(probe) => probe,
            None => {
                let http: Arc<dyn HttpClient> = match self.http_client {
                    Some(client) => client,
                    None => Arc::new(ReqwestHttpClient::new()?),
                };
                Arc::new(HttpProbe::new(&self.config.probe, http))
            }
        };
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(LogNotifier),
        };
        let cancel = self.cancel.unwrap_or_default();

        let registry = Registry::open(&self.config.registry, &self.config.endpoints).await?;
        let retention_days = self.config.uptime.retention_days;
        let state = state::new_state_handle(retention_days);
        let uptime = uptime::new_uptime_handle(retention_days);

        let dispatcher = Arc::new(Dispatcher::new(
            notifier,
            &self.config.notifications,
            retention_days,
            Arc::clone(&state),
        ));

        let scheduler = Scheduler::new(
            registry.clone(),
            probe,
            dispatcher,
            Arc::clone(&state),
            Arc::clone(&uptime),
            &self.config.scheduler,
            retention_days,
        )
        .with_cancellation_token(cancel.clone());

        tracing::debug!(
            "Built watchtower with {} endpoints",
            registry.list_endpoints().await.len()
        );

        Ok(Watchtower {
            config: self.config,
            registry,
            scheduler,
            state,
            uptime,
            cancel,
        })
    }
}

/// A fully wired watchtower service
#[derive(Debug, Clone)]
pub struct Watchtower {
    config: Config,
    registry: Registry,
    scheduler: Scheduler,
    state: StateHandle,
    uptime: UptimeHandle,
    cancel: CancellationToken,
}

impl Watchtower {
    /// Run the scheduler until the cancellation token fires
    pub async fn start(&self) -> Result<()> {
        tracing::info!("Watchtower started");
        self.scheduler
            .run(self.config.scheduler.poll_resolution)
            .await;
        tracing::info!("Watchtower stopped");
        Ok(())
    }

    /// Run the scheduler on a background task
    pub fn spawn(&self) -> JoinHandle<()> {
        self.scheduler.start(self.config.scheduler.poll_resolution)
    }

    /// Stop scheduling and wait for in-flight probes
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    // Queries

    /// Runtime status of an endpoint. Endpoints not yet seen by the
    /// scheduler are reported as pending.
    pub async fn current_status(&self, id: &str) -> Result<EndpointStatus> {
        let config = self.registry.get_endpoint(id).await?;
        let state = self.state.read().await;
        Ok(state
            .get_endpoint(id)
            .cloned()
            .unwrap_or_else(|| EndpointStatus::pending(&config)))
    }

    /// Daily uptime for the trailing `window_days`, ending today (UTC)
    pub async fn uptime_history(&self, id: &str, window_days: u32) -> Result<UptimeHistory> {
        self.registry.get_endpoint(id).await?;
        Ok(self
            .uptime
            .read()
            .await
            .history(id, window_days, current_epoch_ms()))
    }

    /// Uptime percentage for the trailing `window_days`
    pub async fn uptime_percent(&self, id: &str, window_days: u32) -> Result<f64> {
        self.registry.get_endpoint(id).await?;
        Ok(self
            .uptime
            .read()
            .await
            .uptime_percent(id, window_days, current_epoch_ms()))
    }

    /// Notification records from the trailing `window_days`, oldest first
    pub async fn recent_notifications(&self, window_days: u32) -> Vec<NotificationRecord> {
        let since = current_epoch_ms().saturating_sub(u64::from(window_days) * MS_PER_DAY);
        self.state.read().await.notifications_since(since)
    }

    pub async fn summary(&self) -> StatusSummary {
        StatusSummary::from_statuses(&self.registered_statuses().await)
    }

    /// Endpoint statuses in registry order, filtered by status and a
    /// case-insensitive name/url search term
    pub async fn list_statuses(&self, filter: StatusFilter, search: &str) -> Vec<EndpointStatus> {
        state::filter_statuses(&self.registered_statuses().await, filter, search)
    }

    // Commands

    pub async fn upsert_endpoint(&self, config: EndpointConfig) -> Result<Arc<EndpointConfig>> {
        self.registry.upsert_endpoint(config).await
    }

    /// Remove an endpoint. An in-flight probe finishes and is discarded;
    /// its uptime samples are kept until they expire or
    /// [`Watchtower::forget`] is called.
    pub async fn delete_endpoint(&self, id: &str) -> Result<()> {
        self.registry.delete_endpoint(id).await
    }

    pub async fn set_maintenance(&self, id: &str, maintenance: bool) -> Result<()> {
        self.registry.set_maintenance(id, maintenance).await
    }

    pub async fn set_notifications(&self, id: &str, enabled: bool) -> Result<()> {
        self.registry.set_notifications(id, enabled).await
    }

    /// Probe an endpoint immediately
    pub async fn force_check(&self, id: &str) -> Result<ProbeResult> {
        self.scheduler.force_check(id).await
    }

    /// Drop the retained uptime samples of a deleted endpoint
    pub async fn forget(&self, id: &str) -> Result<()> {
        if self.registry.contains(id).await {
            return Err(WatchtowerError::Config(format!(
                "endpoint '{}' is still registered",
                id
            )));
        }
        self.uptime.write().await.forget(id);
        Ok(())
    }

    /// One status per registered endpoint, in registry order. Endpoints the
    /// scheduler has not picked up yet are reported as pending.
    async fn registered_statuses(&self) -> Vec<EndpointStatus> {
        let endpoints = self.registry.list_endpoints().await;
        let state = self.state.read().await;
        endpoints
            .iter()
            .map(|config| {
                state
                    .get_endpoint(&config.id)
                    .cloned()
                    .unwrap_or_else(|| EndpointStatus::pending(config))
            })
            .collect()
    }
}
