//! Configuration management for the discovery client.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`DISCOVERY__` prefix)
//! - Component-wise validation
mod registry;
mod source;
pub use registry::*;
pub use source::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::constants::ENV_SEPARATOR;
use crate::Result;

/// Main configuration container for the registry and the config source
///
/// Combines all component configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct DiscoveryConfig {
    /// Service registration and discovery settings
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Configuration source settings
    #[serde(default)]
    pub source: SourceConfig,
}

impl Debug for DiscoveryConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DiscoveryConfig")
            .field("registry", &self.registry)
            .field("source", &self.source)
            .finish()
    }
}

impl DiscoveryConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `DISCOVERY__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied via
    /// `with_override_config()`. Call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("DISCOVERY__REGISTRY__PREFIX_PATH", "/services");
    /// let cfg = DiscoveryConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(Self::environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// The source section is only checked when a path is configured; an
    /// unconfigured source is rejected later by
    /// [`ConfigSource::new`](crate::ConfigSource::new).
    pub fn validate(self) -> Result<Self> {
        self.registry.validate()?;
        if !self.source.path.is_empty() {
            self.source.validate()?;
        }
        Ok(self)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .ignore_empty(true)
            .try_parsing(true)
    }
}
