//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `FLEET_CHAT` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use fleet_chat_gateway::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod agent;
mod error;
mod server;
mod sessions;
mod streaming;

pub use agent::{AgentBackendKind, AgentConfig};
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, ServerConfig};
pub use sessions::SessionsConfig;
pub use streaming::StreamingConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, CORS)
    #[serde(default)]
    pub server: ServerConfig,

    /// Hosted agent connection and polling
    #[serde(default)]
    pub agent: AgentConfig,

    /// Conversation session lifetime
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// SSE response buffering
    #[serde(default)]
    pub streaming: StreamingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `FLEET_CHAT` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `FLEET_CHAT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `FLEET_CHAT__AGENT__ASSISTANT_ID=asst_1` -> `agent.assistant_id = "asst_1"`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("FLEET_CHAT")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.agent.validate()?;
        self.sessions.validate()?;
        self.streaming.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
