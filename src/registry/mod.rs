//! Service registry and discovery
//!
//! Provides the components for advertising and discovering service instances:
//! - [`Registry`] - Entry point: register, deregister, read and watch services
//! - [`RegistryBuilder`] - Configurable registry construction
//! - [`Watcher`] - Live subscription keeping one service's cache converged
//! - [`ServiceInstance`] - The record stored for every running instance
//!
//! # Basic Usage
//! ```ignore
//! use std::sync::Arc;
//! use kv_discovery::{Registry, ServiceInstance};
//!
//! let registry = Registry::builder(store).prefix_path("/services").build()?;
//!
//! let me = ServiceInstance::new("pay").with_endpoint("http://10.0.0.1:8080");
//! registry.register(&me).await?;
//!
//! let mut watcher = registry.watch("pay").await?;
//! loop {
//!     let instances = watcher.next().await?;
//!     println!("pay instances: {:?}", instances);
//! }
//! ```

mod builder;
mod codec;
mod instance;
mod service_set;
mod watcher;

pub use builder::*;
pub use instance::*;
pub use watcher::*;


use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use self::service_set::ServiceSet;
use crate::constants::KEY_SEPARATOR;
use crate::RegistryConfig;
use crate::RegistryError;
use crate::Result;
use crate::StoreClient;

/// Write half of the registry: advertising the current process
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()>;

    async fn deregister(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()>;
}

/// Read half of the registry: finding and tracking other services
#[async_trait]
pub trait Discovery: Send + Sync {
    fn service(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceInstance>>;

    async fn watch(
        &self,
        name: &str,
    ) -> Result<Watcher>;
}

/// Service registry backed by a key-value store
///
/// Instances are stored at `<prefix_path>/<name>/<id>`. Reads through
/// [`service`](Registry::service) are served from in-memory caches that only
/// exist for names passed to [`watch`](Registry::watch).
///
/// Dropping the registry (or calling [`shutdown`](Registry::shutdown)) stops
/// every watcher it created.
pub struct Registry {
    client: Arc<dyn StoreClient>,
    config: RegistryConfig,
    services: DashMap<String, Arc<ServiceSet>>,
    next_watcher_id: AtomicU64,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Registry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("services", &self.services.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a configured registry builder
    pub fn builder(client: Arc<dyn StoreClient>) -> RegistryBuilder {
        RegistryBuilder::new(client)
    }

    /// # Errors
    /// [`Error::Config`](crate::Error::Config) if `config` fails validation
    pub fn new(
        client: Arc<dyn StoreClient>,
        config: RegistryConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            services: DashMap::new(),
            next_watcher_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn prefix_path(&self) -> &str {
        &self.config.prefix_path
    }

    /// Storage key of one instance: `<prefix_path>/<name>/<id>`
    pub fn service_key(
        &self,
        name: &str,
        id: &str,
    ) -> String {
        format!(
            "{}{}{}{}{}",
            self.config.prefix_path, KEY_SEPARATOR, name, KEY_SEPARATOR, id
        )
    }

    /// Key prefix enumerating all instances of `name`, trailing separator included
    fn service_prefix(
        &self,
        name: &str,
    ) -> String {
        format!("{}{}{}{}", self.config.prefix_path, KEY_SEPARATOR, name, KEY_SEPARATOR)
    }

    /// Stores `instance` at its deterministic key, replacing any previous value.
    ///
    /// # Errors
    /// - [`RegistryError::InvalidInstance`] if name or id is empty or contains `/`
    /// - [`StoreError::Write`](crate::StoreError::Write) if the put fails. Not retried.
    pub async fn register(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()> {
        instance.validate()?;
        let key = self.service_key(&instance.name, &instance.id);
        let value = codec::encode(instance)?;

        self.client.put(&key, value).await?;
        debug!(service = %instance.name, id = %instance.id, key = %key, "Service registered");
        Ok(())
    }

    /// Removes `instance` from the store. Removing an absent instance succeeds.
    pub async fn deregister(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()> {
        instance.validate()?;
        let key = self.service_key(&instance.name, &instance.id);

        self.client.delete(&key).await?;
        debug!(service = %instance.name, id = %instance.id, key = %key, "Service deregistered");
        Ok(())
    }

    /// Returns the cached instances of `name` without touching the store.
    ///
    /// # Errors
    /// - [`RegistryError::NotWatched`] if `watch(name)` was never called
    /// - [`RegistryError::NotPopulated`] while the initial load is in flight
    pub fn service(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceInstance>> {
        let set = self
            .services
            .get(name)
            .ok_or_else(|| RegistryError::NotWatched(name.to_string()))?;
        let snapshot = set
            .snapshot()
            .ok_or_else(|| RegistryError::NotPopulated(name.to_string()))?;
        Ok(snapshot.as_ref().clone())
    }

    /// Starts tracking `name` and returns the watcher driving its cache.
    ///
    /// Performs the initial prefix scan before returning, so the first
    /// [`Watcher::next`] yields the current instances immediately.
    ///
    /// # Errors
    /// - [`RegistryError::AlreadyWatched`] if a live watcher owns `name`
    /// - store errors from the initial scan or from opening the watch
    pub async fn watch(
        &self,
        name: &str,
    ) -> Result<Watcher> {
        validate_service_name(name)?;
        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);

        // Claim the slot under the map entry lock so a concurrent cleanup
        // below cannot unlink a set that is being attached to.
        let set = {
            let entry = self
                .services
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ServiceSet::new(name)));
            entry.attach_watcher(id)?;
            entry.value().clone()
        };

        let token = self.shutdown.child_token();
        match Watcher::start(id, &set, self.client.clone(), self.service_prefix(name), token).await {
            Ok(watcher) => {
                debug!(service = %name, watcher_id = id, "Service watch started");
                Ok(watcher)
            }
            Err(e) => {
                warn!(service = %name, watcher_id = id, "Service watch failed to start: {}", e);
                self.services.remove_if(name, |_, set| set.is_vacant());
                Err(e)
            }
        }
    }

    /// Stops every watcher created by this registry.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(services = self.services.len(), "Registry shutting down");
            self.shutdown.cancel();
        }
    }

    /// Names with a Service Set, watched now or in the past
    pub fn watched_services(&self) -> Vec<String> {
        self.services.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl Registrar for Registry {
    async fn register(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()> {
        Registry::register(self, instance).await
    }

    async fn deregister(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()> {
        Registry::deregister(self, instance).await
    }
}

#[async_trait]
impl Discovery for Registry {
    fn service(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceInstance>> {
        Registry::service(self, name)
    }

    async fn watch(
        &self,
        name: &str,
    ) -> Result<Watcher> {
        Registry::watch(self, name).await
    }
}

fn validate_service_name(name: &str) -> std::result::Result<(), RegistryError> {
    if name.is_empty() || name.contains(KEY_SEPARATOR) {
        return Err(RegistryError::InvalidServiceName(name.to_string()));
    }
    Ok(())
}
