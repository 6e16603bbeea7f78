use std::sync::Arc;

use super::Registry;
use crate::RegistryConfig;
use crate::Result;
use crate::StoreClient;

pub struct RegistryBuilder {
    client: Arc<dyn StoreClient>,
    config: RegistryConfig,
}

impl RegistryBuilder {
    /// Create a new builder with default config on top of `client`
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self {
            client,
            config: RegistryConfig::default(),
        }
    }

    /// Set the root path services are registered under (default: `/registry`)
    pub fn prefix_path(
        mut self,
        prefix_path: impl Into<String>,
    ) -> Self {
        self.config.prefix_path = prefix_path.into();
        self
    }

    /// Completely replaces the default configuration
    ///
    /// # Warning: Configuration Override
    /// This discards settings applied earlier through
    /// [`prefix_path`](RegistryBuilder::prefix_path).
    pub fn set_config(
        mut self,
        config: RegistryConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Build the registry with current configuration
    ///
    /// # Errors
    /// [`Error::Config`](crate::Error::Config) if the configuration is invalid
    pub fn build(self) -> Result<Registry> {
        Registry::new(self.client, self.config)
    }
}
