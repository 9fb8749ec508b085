//! Response streaming configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MAX_CHANNEL_CAPACITY: usize = 1_024;

/// Response streaming configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    /// Events buffered per request between producer and consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Interval of SSE keep-alive comments
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl StreamingConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(ValidationError::InvalidChannelCapacity {
                max: MAX_CHANNEL_CAPACITY,
            });
        }
        if self.keep_alive_secs == 0 {
            return Err(ValidationError::InvalidKeepAlive);
        }
        Ok(())
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_channel_capacity() -> usize {
    32
}

fn default_keep_alive() -> u64 {
    15
}
