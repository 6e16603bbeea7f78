use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_PREFIX_PATH;
use crate::constants::KEY_SEPARATOR;
use crate::Error;
use crate::Result;

/// Registry key layout settings
///
/// ```toml
/// [registry]
/// prefix_path = "/registry"
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Root path services are registered under.
    ///
    /// Instances are stored at `<prefix_path>/<name>/<id>`.
    /// Default: `/registry`
    #[serde(default = "default_prefix_path")]
    pub prefix_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prefix_path: default_prefix_path(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prefix_path.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "registry.prefix_path cannot be empty".into(),
            )));
        }

        if !self.prefix_path.starts_with(KEY_SEPARATOR) {
            return Err(Error::Config(ConfigError::Message(format!(
                "registry.prefix_path must start with '{}': {}",
                KEY_SEPARATOR, self.prefix_path
            ))));
        }

        if self.prefix_path.ends_with(KEY_SEPARATOR) {
            return Err(Error::Config(ConfigError::Message(format!(
                "registry.prefix_path must not end with '{}': {}",
                KEY_SEPARATOR, self.prefix_path
            ))));
        }

        Ok(())
    }
}

fn default_prefix_path() -> String {
    DEFAULT_PREFIX_PATH.to_string()
}
