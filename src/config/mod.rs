//! Configuration management for the xenbus client.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file named by `CONFIG_PATH`
//! - Environment variable overrides (`XENBUS__` prefix, `__` separator)
//! - Component-wise validation
mod client;
mod retry;
mod watch;
pub use client::*;
pub use retry::*;
pub use watch::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for overrides, e.g.
/// `XENBUS__CLIENT__REQUEST_TIMEOUT_IN_MS=500`.
pub const ENV_PREFIX: &str = "XENBUS";

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default, Debug)]
pub struct XenbusConfig {
    /// Request/reply behaviour
    #[serde(default)]
    pub client: ClientConfig,
    /// Watch queue behaviour
    #[serde(default)]
    pub watch: WatchConfig,
    /// Retry policies
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl XenbusConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so further overrides can be layered with
    /// [`XenbusConfig::with_override_config`]. Callers must call
    /// [`XenbusConfig::validate`] before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/xenbus.toml");
    /// let cfg = XenbusConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Layers the file at `path` on top of the current values, then the
    /// environment again. Does not validate.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.client.validate()?;
        self.watch.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
