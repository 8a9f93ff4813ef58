use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Request/reply settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Upper bound on the wait for a reply, in milliseconds.
    /// 0 waits forever, which is the protocol's native behaviour.
    /// Default: 0
    #[serde(default)]
    pub request_timeout_in_ms: u64,

    /// Send a DEBUG "print" request when the client starts
    /// Default: false
    #[serde(default)]
    pub announce_on_start: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_in_ms: 0,
            announce_on_start: false,
        }
    }
}

impl ClientConfig {
    /// Reply wait bound, or `None` to wait forever.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_in_ms > 0).then(|| Duration::from_millis(self.request_timeout_in_ms))
    }

    pub fn validate(&self) -> Result<()> {
        // An hour-long bound is almost certainly a unit mix-up
        if self.request_timeout_in_ms > 3_600_000 {
            return Err(Error::Config(ConfigError::Message(format!(
                "client.request_timeout_in_ms {} exceeds one hour",
                self.request_timeout_in_ms
            ))));
        }
        Ok(())
    }
}
