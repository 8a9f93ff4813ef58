use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch queue settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Queue length past which a warning is logged on every delivery.
    /// Events are never dropped for being over this limit.
    /// Default: 1024
    #[serde(default = "default_queue_soft_limit")]
    pub queue_soft_limit: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            queue_soft_limit: default_queue_soft_limit(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_soft_limit == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.queue_soft_limit must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_queue_soft_limit() -> usize {
    1024
}
