//! Error types for the reconciler

use thiserror::Error;

/// Reconciler result type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while syncing target-group membership
#[derive(Error, Debug)]
pub enum SyncError {
    /// HTTP client error talking to the control plane
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Control-plane API returned a non-success status
    #[error("control plane error: {0}")]
    ControlPlane(String),

    /// Load-balancer provider call failed
    #[error("provider error: {0}")]
    Provider(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Create a control-plane error
    pub fn control_plane(msg: impl Into<String>) -> Self {
        Self::ControlPlane(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Convert from a generic AWS SDK error
    ///
    /// The ELBv2 SDK error types are per-operation; we only carry the display
    /// text into failure records, so they all collapse into `Provider`.
    pub fn from_aws<E>(err: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Provider(err.to_string())
    }
}
