//! Probe runner: one HTTP health check against one endpoint

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{EndpointConfig, ProbeConfig, StatusRange};
use crate::io::HttpClient;

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub endpoint_id: String,
    pub timestamp_epoch_ms: u64,
    pub success: bool,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Trait for running a health check. Implementations report every failure
/// inside the returned [`ProbeResult`].
#[async_trait]
pub trait Probe: Send + Sync + std::fmt::Debug {
    async fn probe(&self, endpoint: &EndpointConfig) -> ProbeResult;
}

/// Probe that issues an HTTP GET and checks the response status
pub struct HttpProbe {
    timeout: Duration,
    accepted_status: Vec<StatusRange>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe")
            .field("timeout", &self.timeout)
            .field("accepted_status", &self.accepted_status)
            .finish()
    }
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!(
            "Created HttpProbe with timeout {:?} and {} accepted status ranges",
            config.timeout,
            config.accepted_status.len()
        );

        Self {
            timeout: config.timeout,
            accepted_status: config.accepted_status.clone(),
            http,
        }
    }

    fn is_accepted(&self, code: u16) -> bool {
        self.accepted_status.iter().any(|range| range.contains(code))
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, endpoint: &EndpointConfig) -> ProbeResult {
        let timestamp_epoch_ms = crate::current_epoch_ms();
        let started = Instant::now();
        tracing::debug!("Probing '{}' at {}", endpoint.id, endpoint.url);

        let outcome = tokio::time::timeout(self.timeout, self.http.get(&endpoint.url)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (success, status_code, error) = match outcome {
            Ok(Ok(response)) => {
                if self.is_accepted(response.status) {
                    (true, Some(response.status), None)
                } else {
                    tracing::debug!(
                        "Unexpected status from '{}': {}",
                        endpoint.id,
                        response.status
                    );
                    (
                        false,
                        Some(response.status),
                        Some(format!("Unexpected HTTP status {}", response.status)),
                    )
                }
            }
            Ok(Err(e)) => {
                tracing::debug!("Probe of '{}' failed: {}", endpoint.id, e);
                (false, None, Some(e.to_string()))
            }
            Err(_) => {
                tracing::debug!(
                    "Probe of '{}' timed out after {:?}",
                    endpoint.id,
                    self.timeout
                );
                (
                    false,
                    None,
                    Some(format!("Timed out after {:?}", self.timeout)),
                )
            }
        };

        ProbeResult {
            endpoint_id: endpoint.id.clone(),
            timestamp_epoch_ms,
            success,
            latency_ms,
            status_code,
            error,
        }
    }
}
