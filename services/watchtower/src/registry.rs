//! Endpoint registry: the source of truth for endpoint configuration
//!
//! Reads are cheap clones of `Arc`s. Every write validates first, persists
//! the new list, and then swaps it in whole, so a probe holding an older
//! `Arc<EndpointConfig>` never observes a half-applied edit and a failed
//! snapshot write leaves the registry unchanged.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::config::{EndpointConfig, RegistryConfig};
use crate::error::{Result, WatchtowerError};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// An endpoint's configuration plus its administrative flags
#[derive(Debug, Clone)]
pub struct EndpointEntry {
    pub config: Arc<EndpointConfig>,
    pub maintenance: bool,
}

/// On-disk form of a registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(flatten)]
    config: EndpointConfig,
    #[serde(default)]
    maintenance: bool,
}

/// Concurrency-safe, insertion-ordered endpoint store
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<Vec<EndpointEntry>>>,
    snapshot_path: Option<PathBuf>,
}

impl Registry {
    /// Create an in-memory registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the registry described by `config`.
    ///
    /// When a snapshot file exists it is loaded first; `seed` endpoints whose
    /// id is not in the snapshot are appended afterwards.
    pub async fn open(config: &RegistryConfig, seed: &[EndpointConfig]) -> Result<Self> {
        let mut entries = Vec::new();

        if let Some(path) = &config.snapshot_path {
            if tokio::fs::try_exists(path).await? {
                for stored in read_snapshot(path).await? {
                    let config = validate_endpoint(stored.config)?;
                    entries.push(EndpointEntry {
                        config: Arc::new(config),
                        maintenance: stored.maintenance,
                    });
                }
                tracing::info!("Loaded {} endpoints from {:?}", entries.len(), path);
            }
        }

        for endpoint in seed {
            if entries.iter().any(|e| e.config.id == endpoint.id) {
                tracing::debug!("Endpoint '{}' already present in snapshot", endpoint.id);
                continue;
            }
            entries.push(EndpointEntry {
                config: Arc::new(validate_endpoint(endpoint.clone())?),
                maintenance: false,
            });
        }

        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            snapshot_path: config.snapshot_path.clone(),
        })
    }

    /// All endpoint configurations in insertion order
    pub async fn list_endpoints(&self) -> Vec<Arc<EndpointConfig>> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| Arc::clone(&e.config))
            .collect()
    }

    /// All entries, including administrative flags, in insertion order
    pub async fn entries(&self) -> Vec<EndpointEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get_endpoint(&self, id: &str) -> Result<Arc<EndpointConfig>> {
        self.entry(id)
            .await
            .map(|e| e.config)
            .ok_or_else(|| WatchtowerError::NotFound(id.to_string()))
    }

    pub async fn entry(&self, id: &str) -> Option<EndpointEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.config.id == id)
            .cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.iter().any(|e| e.config.id == id)
    }

    /// Validate and insert or replace an endpoint. A replaced endpoint keeps
    /// its position and maintenance flag.
    pub async fn upsert_endpoint(&self, config: EndpointConfig) -> Result<Arc<EndpointConfig>> {
        let config = Arc::new(validate_endpoint(config)?);

        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        let replaced = match updated.iter_mut().find(|e| e.config.id == config.id) {
            Some(entry) => {
                entry.config = Arc::clone(&config);
                true
            }
            None => {
                updated.push(EndpointEntry {
                    config: Arc::clone(&config),
                    maintenance: false,
                });
                false
            }
        };
        self.commit(&mut entries, updated).await?;

        if replaced {
            tracing::info!("Updated endpoint '{}' ({})", config.id, config.url);
        } else {
            tracing::info!("Added endpoint '{}' ({})", config.id, config.url);
        }
        Ok(config)
    }

    pub async fn delete_endpoint(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let position = entries
            .iter()
            .position(|e| e.config.id == id)
            .ok_or_else(|| WatchtowerError::NotFound(id.to_string()))?;
        let mut updated = entries.clone();
        updated.remove(position);
        self.commit(&mut entries, updated).await?;
        tracing::info!("Deleted endpoint '{}'", id);
        Ok(())
    }

    pub async fn set_maintenance(&self, id: &str, maintenance: bool) -> Result<()> {
        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        find_mut(&mut updated, id)?.maintenance = maintenance;
        self.commit(&mut entries, updated).await?;
        tracing::info!(
            "Maintenance {} for endpoint '{}'",
            if maintenance { "enabled" } else { "cleared" },
            id
        );
        Ok(())
    }

    pub async fn set_notifications(&self, id: &str, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        let entry = find_mut(&mut updated, id)?;
        let mut config = (*entry.config).clone();
        config.notifications_enabled = enabled;
        entry.config = Arc::new(config);
        self.commit(&mut entries, updated).await?;
        tracing::info!(
            "Notifications {} for endpoint '{}'",
            if enabled { "enabled" } else { "disabled" },
            id
        );
        Ok(())
    }

    /// Persist `updated` and only then make it visible. On error the
    /// registry keeps its previous contents.
    async fn commit(
        &self,
        entries: &mut RwLockWriteGuard<'_, Vec<EndpointEntry>>,
        updated: Vec<EndpointEntry>,
    ) -> Result<()> {
        self.persist(&updated).await?;
        **entries = updated;
        Ok(())
    }

    /// Write the snapshot to a sibling temp file and rename it into place
    async fn persist(&self, entries: &[EndpointEntry]) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot: Vec<SnapshotEntry> = entries
            .iter()
            .map(|e| SnapshotEntry {
                config: (*e.config).clone(),
                maintenance: e.maintenance,
            })
            .collect();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let temp = temp_path(path);
        tokio::fs::write(&temp, json).await?;
        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tracing::debug!("Wrote registry snapshot to {:?}", path);
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn find_mut<'a>(entries: &'a mut [EndpointEntry], id: &str) -> Result<&'a mut EndpointEntry> {
    entries
        .iter_mut()
        .find(|e| e.config.id == id)
        .ok_or_else(|| WatchtowerError::NotFound(id.to_string()))
}

async fn read_snapshot(path: &Path) -> Result<Vec<SnapshotEntry>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        WatchtowerError::Config(format!("Failed to read registry snapshot {:?}: {}", path, e))
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Check an endpoint configuration and normalize it.
///
/// Recipients are trimmed and de-duplicated case-insensitively, keeping the
/// first occurrence.
pub fn validate_endpoint(mut config: EndpointConfig) -> Result<EndpointConfig> {
    config.id = config.id.trim().to_string();
    config.name = config.name.trim().to_string();
    config.url = config.url.trim().to_string();

    if config.id.is_empty() {
        return Err(invalid("endpoint id is required"));
    }
    if config.name.is_empty() {
        return Err(invalid(format!("endpoint '{}': name is required", config.id)));
    }

    let url = Url::parse(&config.url).map_err(|e| {
        invalid(format!(
            "endpoint '{}': invalid url '{}': {}",
            config.id, config.url, e
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid(format!(
            "endpoint '{}': url must be an absolute http:// or https:// url",
            config.id
        )));
    }

    if config.check_interval_minutes < 1 {
        return Err(invalid(format!(
            "endpoint '{}': check interval must be at least 1 minute",
            config.id
        )));
    }

    let mut recipients: Vec<String> = Vec::with_capacity(config.recipients.len());
    for recipient in &config.recipients {
        let recipient = recipient.trim();
        if !EMAIL_PATTERN.is_match(recipient) {
            return Err(invalid(format!(
                "endpoint '{}': invalid recipient '{}'",
                config.id, recipient
            )));
        }
        if !recipients.iter().any(|r| r.eq_ignore_ascii_case(recipient)) {
            recipients.push(recipient.to_string());
        }
    }
    config.recipients = recipients;

    Ok(config)
}

fn invalid(msg: impl Into<String>) -> WatchtowerError {
    WatchtowerError::Config(msg.into())
}
