//! Session registry configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Session registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Idle lifetime of a conversation's backend session; unset keeps
    /// sessions for the life of the process
    pub ttl_secs: Option<u64>,

    /// How often expired sessions are swept
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl SessionsConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ttl_secs == Some(0) {
            return Err(ValidationError::InvalidSessionTtl);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}
