//! Notifier trait for sending alerts

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::status::StatusTransition;

/// Record of one delivery to one recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub transition: StatusTransition,
    pub recipient: String,
    pub message: String,
    pub attempts: u32,
    pub success: bool,
    /// Set when retries were exhausted
    pub permanent: bool,
    pub error: Option<String>,
    pub timestamp_epoch_ms: u64,
}

/// Trait for delivering an alert about a transition to one recipient
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Get the notifier type name (e.g. "log")
    fn type_name(&self) -> &str;

    async fn send(
        &self,
        recipient: &str,
        endpoint_name: &str,
        transition: &StatusTransition,
    ) -> crate::Result<()>;
}

/// Notifier that writes alerts to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn type_name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        recipient: &str,
        endpoint_name: &str,
        transition: &StatusTransition,
    ) -> crate::Result<()> {
        tracing::info!(
            recipient,
            endpoint = endpoint_name,
            previous = %transition.previous,
            current = %transition.current,
            "{}",
            transition.current.alert_message()
        );
        Ok(())
    }
}
