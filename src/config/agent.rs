//! Hosted agent configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MIN_POLL_INTERVAL_MS: u64 = 50;
const MAX_POLL_INTERVAL_MS: u64 = 10_000;
const MAX_RUN_DURATION_SECS: u64 = 3_600;

/// Hosted agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Which backend implementation to wire
    #[serde(default)]
    pub backend: AgentBackendKind,

    /// Base URL of the agent service, e.g. `https://agents.example.com/v1`
    pub base_url: Option<String>,

    /// API key sent in the `api-key` header
    pub api_key: Option<String>,

    /// Assistant that answers every run
    pub assistant_id: Option<String>,

    /// Optional `api-version` query parameter
    pub api_version: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on retryable failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// Delay between run status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up on a run after this long
    #[serde(default = "default_max_run_duration")]
    pub max_run_duration_secs: u64,
}

/// Agent backend type
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentBackendKind {
    #[default]
    Hosted,
    /// Canned local backend for development without credentials
    Mock,
}

impl AgentConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get maximum run duration as Duration
    pub fn max_run_duration(&self) -> Duration {
        Duration::from_secs(self.max_run_duration_secs)
    }

    /// Check if the hosted backend is fully configured
    pub fn has_credentials(&self) -> bool {
        [&self.base_url, &self.api_key, &self.assistant_id]
            .iter()
            .all(|v| v.as_ref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Validate agent configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == AgentBackendKind::Hosted {
            let base_url = non_empty(&self.base_url)
                .ok_or(ValidationError::MissingRequired("FLEET_CHAT__AGENT__BASE_URL"))?;
            if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
                return Err(ValidationError::InvalidAgentUrl(base_url.to_string()));
            }
            non_empty(&self.api_key)
                .ok_or(ValidationError::MissingRequired("FLEET_CHAT__AGENT__API_KEY"))?;
            non_empty(&self.assistant_id)
                .ok_or(ValidationError::MissingRequired("FLEET_CHAT__AGENT__ASSISTANT_ID"))?;
        }

        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(ValidationError::InvalidPollInterval {
                min: MIN_POLL_INTERVAL_MS,
                max: MAX_POLL_INTERVAL_MS,
            });
        }
        if self.max_run_duration_secs == 0 || self.max_run_duration_secs > MAX_RUN_DURATION_SECS {
            return Err(ValidationError::InvalidRunDuration {
                max: MAX_RUN_DURATION_SECS,
            });
        }

        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: AgentBackendKind::default(),
            base_url: None,
            api_key: None,
            assistant_id: None,
            api_version: None,
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            poll_interval_ms: default_poll_interval(),
            max_run_duration_secs: default_max_run_duration(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    500
}

fn default_max_run_duration() -> u64 {
    300
}
