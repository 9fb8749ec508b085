//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid agent base URL: {0}")]
    InvalidAgentUrl(String),

    #[error("Invalid agent request timeout")]
    InvalidTimeout,

    #[error("Poll interval must be between {min} and {max} milliseconds")]
    InvalidPollInterval { min: u64, max: u64 },

    #[error("Maximum run duration must be between 1 and {max} seconds")]
    InvalidRunDuration { max: u64 },

    #[error("Session TTL must be positive when set")]
    InvalidSessionTtl,

    #[error("Session sweep interval must be positive")]
    InvalidSweepInterval,

    #[error("Stream channel capacity must be between 1 and {max}")]
    InvalidChannelCapacity { max: usize },

    #[error("Keep-alive interval must be positive")]
    InvalidKeepAlive,
}
