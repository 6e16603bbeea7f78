//! Configuration source backed by the key-value store
//!
//! Loads a single key, or every key under a prefix, as a flat list of
//! [`ConfigKeyValue`]s. Watching never patches incrementally: every change
//! batch triggers a full reload of the configured path.

mod watcher;

pub use watcher::*;


use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Error;
use crate::KeyValue;
use crate::Result;
use crate::SourceConfig;
use crate::StoreClient;

/// One configuration entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Extension of the key without the dot (`app.yaml` -> `yaml`), empty if none
    pub format: String,
}

impl From<KeyValue> for ConfigKeyValue {
    fn from(kv: KeyValue) -> Self {
        let format = Path::new(&kv.key)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            key: kv.key,
            value: kv.value,
            format,
        }
    }
}

#[derive(Clone)]
pub struct ConfigSource {
    client: Arc<dyn StoreClient>,
    config: SourceConfig,
    token: CancellationToken,
}

impl std::fmt::Debug for ConfigSource {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfigSource").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ConfigSource {
    /// # Errors
    /// [`Error::Config`] if `config.path` is empty
    pub fn new(
        client: Arc<dyn StoreClient>,
        config: SourceConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            token: CancellationToken::new(),
        })
    }

    /// Bounds every store call of this source (and its watchers) by `token`
    pub fn with_cancellation(
        mut self,
        token: CancellationToken,
    ) -> Self {
        self.token = token;
        self
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Reads the configured key or prefix.
    ///
    /// All-or-nothing: a store failure fails the whole load. An empty prefix
    /// yields an empty vector.
    ///
    /// # Errors
    /// - [`StoreError::Read`](crate::StoreError::Read) on store failure
    /// - [`Error::Cancelled`] if the source's token fired
    pub async fn load(&self) -> Result<Vec<ConfigKeyValue>> {
        let response = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(Error::Cancelled),
            response = self.client.get(&self.config.path, self.config.prefix) => response?,
        };

        debug!(
            path = %self.config.path,
            prefix = self.config.prefix,
            revision = response.revision,
            keys = response.kvs.len(),
            "Config loaded"
        );
        Ok(response.kvs.into_iter().map(ConfigKeyValue::from).collect())
    }

    /// Opens a watch on the configured path.
    ///
    /// Each change observed after this call makes [`ConfigWatcher::next`]
    /// return a fresh [`load`](ConfigSource::load).
    pub async fn watch(&self) -> Result<ConfigWatcher> {
        let stream = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(Error::Cancelled),
            stream = self.client.watch(&self.config.path, self.config.prefix, None) => stream?,
        };

        debug!(path = %self.config.path, prefix = self.config.prefix, "Config watch started");
        let token = self.token.child_token();
        Ok(ConfigWatcher::new(self.clone(), stream, token))
    }
}
