use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Location of configuration values in the store
///
/// ```toml
/// [source]
/// path = "/config/app"
/// prefix = true
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SourceConfig {
    /// Key (or key prefix when `prefix` is set) to load
    #[serde(default)]
    pub path: String,

    /// Load every key starting with `path` instead of the single key
    /// Default: false
    #[serde(default)]
    pub prefix: bool,
}

impl SourceConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prefix: false,
        }
    }

    pub fn with_prefix(
        mut self,
        prefix: bool,
    ) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::Config(ConfigError::Message("source.path invalid: empty path".into())));
        }
        Ok(())
    }
}
