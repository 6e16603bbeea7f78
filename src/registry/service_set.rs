//! Per-service instance cache
//!
//! One [`ServiceSet`] exists per watched service name. Its snapshot is written
//! by exactly one watch loop and read lock-free by any number of callers: the
//! snapshot is an immutable `Vec` behind an [`ArcSwapOption`], replaced
//! wholesale on every applied batch, so readers observe either the previous
//! or the next snapshot and never a partial update.
//!
//! The watcher slot is the only mutex-guarded field. It is touched when a
//! watcher is attached or torn down, never on the read path.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::debug;

use super::ServiceInstance;
use crate::RegistryError;

pub(crate) type Snapshot = Arc<Vec<ServiceInstance>>;

#[derive(Debug)]
pub(crate) struct ServiceSet {
    name: String,
    services: ArcSwapOption<Vec<ServiceInstance>>,
    /// Id of the owning watcher
    watcher: Mutex<Option<u64>>,
}

impl ServiceSet {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: ArcSwapOption::empty(),
            watcher: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Atomically publishes a new snapshot on behalf of watcher `owner`.
    ///
    /// The slot lock is held across the swap so a watcher that has just been
    /// stopped cannot overwrite the snapshot of its successor. Readers never
    /// take this lock. Returns false if `owner` no longer owns the set.
    pub(crate) fn replace_snapshot(
        &self,
        owner: u64,
        instances: Vec<ServiceInstance>,
    ) -> bool {
        let slot = self.watcher.lock();
        if *slot != Some(owner) {
            return false;
        }
        self.services.store(Some(Arc::new(instances)));
        true
    }

    /// Returns the current snapshot, or `None` before the first write.
    pub(crate) fn snapshot(&self) -> Option<Snapshot> {
        self.services.load_full()
    }

    /// Claims the watcher slot for watcher `id`.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyWatched`] if another watcher owns the set
    pub(crate) fn attach_watcher(
        &self,
        id: u64,
    ) -> std::result::Result<(), RegistryError> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Err(RegistryError::AlreadyWatched(self.name.clone()));
        }
        *slot = Some(id);
        debug!(service = %self.name, watcher_id = id, "Watcher attached");
        Ok(())
    }

    /// Frees the slot if it is still owned by watcher `id`.
    ///
    /// Returns true if the slot was released by this call.
    pub(crate) fn detach_watcher(
        &self,
        id: u64,
    ) -> bool {
        let mut slot = self.watcher.lock();
        match *slot {
            Some(current) if current == id => {
                *slot = None;
                debug!(service = %self.name, watcher_id = id, "Watcher detached");
                true
            }
            _ => false,
        }
    }

    pub(crate) fn watcher_id(&self) -> Option<u64> {
        *self.watcher.lock()
    }

    /// True when no watcher owns the set and nothing was ever published
    pub(crate) fn is_vacant(&self) -> bool {
        self.watcher.lock().is_none() && self.services.load().is_none()
    }
}
