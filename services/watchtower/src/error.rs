//! Error types for the watchtower service

/// Errors that can occur in the watchtower service
#[derive(Debug, thiserror::Error)]
pub enum WatchtowerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Endpoint not found: {0}")]
    NotFound(String),

    #[error("Probe already in flight for endpoint {0}")]
    ProbeInFlight(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for watchtower operations
pub type Result<T> = std::result::Result<T, WatchtowerError>;
