//! Watcher for a single service name
//!
//! A [`Watcher`] keeps one [`ServiceSet`] converged with the store:
//!
//! ```text
//!   Starting ──► Running ──► Cancelled
//!                   │
//!                   └──────► Failed(StoreError)
//! ```
//!
//! - **Starting** runs inline in [`Registry::watch`](crate::Registry::watch):
//!   prefix scan, snapshot publish, watch stream opened at `revision + 1`.
//! - **Running** is a background task applying change batches in delivery
//!   order. Every applied batch publishes a fresh snapshot and then pushes a
//!   notification without blocking: at most one notification is pending, so a
//!   slow consumer only ever sees the latest state.
//! - **Failed** is entered when the stream errors or ends. The set stops
//!   updating and the error is returned by the next call to
//!   [`Watcher::next`]. There is no resubscription: stop the watcher and call
//!   `watch` again.
//! - **Cancelled** is entered on [`Watcher::stop`], drop, or registry
//!   shutdown. The watcher slot of the set is released.

use std::sync::Arc;
use std::sync::Weak;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::codec;
use super::service_set::ServiceSet;
use super::ServiceInstance;
use crate::constants::WATCH_NOTIFY_CAPACITY;
use crate::Error;
use crate::KeyValue;
use crate::RegistryError;
use crate::Result;
use crate::StoreClient;
use crate::StoreError;
use crate::WatchError;
use crate::WatchEvent;
use crate::WatchEventKind;
use crate::WatchStream;

/// Lifecycle of a [`Watcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Running,
    Cancelled,
    Failed(StoreError),
}

impl WatcherState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WatcherState::Cancelled | WatcherState::Failed(_))
    }
}

/// Instances of one service keyed by storage key, in first-seen order
#[derive(Debug, Default)]
pub(crate) struct InstanceTable {
    entries: Vec<(String, ServiceInstance)>,
}

impl InstanceTable {
    /// Builds the table from a prefix scan, skipping records that fail to decode
    pub(crate) fn from_kvs(kvs: &[KeyValue]) -> Self {
        let mut table = Self::default();
        for kv in kvs {
            table.upsert(&kv.key, &kv.value);
        }
        table
    }

    pub(crate) fn apply(
        &mut self,
        event: &WatchEvent,
    ) {
        match event.kind {
            WatchEventKind::Put => self.upsert(&event.key, &event.value),
            WatchEventKind::Delete => self.remove(&event.key),
        }
    }

    pub(crate) fn instances(&self) -> Vec<ServiceInstance> {
        self.entries.iter().map(|(_, instance)| instance.clone()).collect()
    }

    fn upsert(
        &mut self,
        key: &str,
        value: &[u8],
    ) {
        let instance = match codec::decode(key, value) {
            Ok(instance) => instance,
            Err(e) => {
                // The key no longer holds a usable record
                trace!("skip record: {}", e);
                self.remove(key);
                return;
            }
        };

        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = instance,
            None => self.entries.push((key.to_string(), instance)),
        }
    }

    fn remove(
        &mut self,
        key: &str,
    ) {
        self.entries.retain(|(k, _)| k != key);
    }
}

/// Consumer handle of a service watch
///
/// Returned by [`Registry::watch`](crate::Registry::watch). Dropping the
/// handle cancels the watch and frees the service name for a new watcher.
#[derive(Debug)]
pub struct Watcher {
    id: u64,
    service_name: String,
    set: Weak<ServiceSet>,
    token: CancellationToken,
    notify_rx: mpsc::Receiver<()>,
    state: Arc<Mutex<WatcherState>>,
}

impl Watcher {
    /// Runs the Starting phase and spawns the watch loop.
    ///
    /// The caller must already have attached watcher `id` to `set`. On error
    /// the slot is released before returning.
    pub(crate) async fn start(
        id: u64,
        set: &Arc<ServiceSet>,
        client: Arc<dyn StoreClient>,
        key_prefix: String,
        token: CancellationToken,
    ) -> Result<Self> {
        let state = Arc::new(Mutex::new(WatcherState::Starting));
        let (notify_tx, notify_rx) = mpsc::channel(WATCH_NOTIFY_CAPACITY);

        // Dropped on any early return below, which releases the slot
        let watcher = Watcher {
            id,
            service_name: set.name().to_string(),
            set: Arc::downgrade(set),
            token: token.clone(),
            notify_rx,
            state: state.clone(),
        };

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            response = client.get(&key_prefix, true) => response?,
        };

        let table = InstanceTable::from_kvs(&response.kvs);
        if !set.replace_snapshot(id, table.instances()) {
            return Err(WatchError::Stopped(watcher.service_name.clone()).into());
        }
        let _ = notify_tx.try_send(());
        *state.lock() = WatcherState::Running;

        debug!(
            service = %watcher.service_name,
            watcher_id = id,
            revision = response.revision,
            instances = response.kvs.len(),
            "Initial service snapshot loaded"
        );

        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            stream = client.watch(&key_prefix, true, Some(response.revision + 1)) => stream?,
        };

        let watch_loop = WatchLoop {
            id,
            service_name: watcher.service_name.clone(),
            set: Arc::downgrade(set),
            table,
            notify_tx,
            state,
            token,
        };
        tokio::spawn(watch_loop.run(stream));

        Ok(watcher)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn state(&self) -> WatcherState {
        self.state.lock().clone()
    }

    /// Waits for the next change and returns the service's instances.
    ///
    /// The first call returns the initial snapshot immediately. Multiple
    /// changes applied while the consumer was busy are reported once, with
    /// the latest state.
    ///
    /// # Errors
    /// - [`Error::Cancelled`] once the watcher was stopped
    /// - [`WatchError::Failed`] when the store watch stream failed
    pub async fn next(&mut self) -> Result<Vec<ServiceInstance>> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            notified = self.notify_rx.recv() => match notified {
                Some(()) => self.services(),
                None => Err(self.terminal_error()),
            },
        }
    }

    /// Current instances without waiting for a change
    pub fn services(&self) -> Result<Vec<ServiceInstance>> {
        let set = self
            .set
            .upgrade()
            .ok_or_else(|| WatchError::Stopped(self.service_name.clone()))?;
        let snapshot = set
            .snapshot()
            .ok_or_else(|| RegistryError::NotPopulated(self.service_name.clone()))?;
        Ok(snapshot.as_ref().clone())
    }

    /// Cancels the watch loop and frees the service name.
    pub fn stop(&self) {
        self.token.cancel();
        if let Some(set) = self.set.upgrade() {
            set.detach_watcher(self.id);
        }
    }

    fn terminal_error(&self) -> Error {
        match &*self.state.lock() {
            WatcherState::Failed(source) => WatchError::Failed {
                service: self.service_name.clone(),
                source: source.clone(),
            }
            .into(),
            WatcherState::Cancelled => Error::Cancelled,
            _ => WatchError::Stopped(self.service_name.clone()).into(),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
        trace!(service = %self.service_name, watcher_id = self.id, "Watcher dropped");
    }
}

/// Background half of a watcher: sole writer of its service set
struct WatchLoop {
    id: u64,
    service_name: String,
    set: Weak<ServiceSet>,
    table: InstanceTable,
    notify_tx: mpsc::Sender<()>,
    state: Arc<Mutex<WatcherState>>,
    token: CancellationToken,
}

impl WatchLoop {
    async fn run(
        mut self,
        mut stream: WatchStream,
    ) {
        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break WatcherState::Cancelled,
                batch = stream.next() => match batch {
                    Some(Ok(events)) => {
                        if !self.apply_batch(events) {
                            break WatcherState::Cancelled;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(service = %self.service_name, watcher_id = self.id, "Watch stream failed: {}", e);
                        break WatcherState::Failed(e);
                    }
                    None => {
                        warn!(service = %self.service_name, watcher_id = self.id, "Watch stream ended");
                        break WatcherState::Failed(StoreError::ConnectionLost(format!(
                            "watch stream for service {} ended",
                            self.service_name
                        )));
                    }
                }
            }
        };

        drop(stream);
        if outcome == WatcherState::Cancelled {
            if let Some(set) = self.set.upgrade() {
                set.detach_watcher(self.id);
            }
        }
        debug!(service = %self.service_name, watcher_id = self.id, state = ?outcome, "Watch loop stopped");
        *self.state.lock() = outcome;
        // notify_tx drops with self, so the consumer observes the terminal state
    }

    /// Applies one batch and publishes the result.
    ///
    /// Returns false once the set is gone or owned by another watcher.
    fn apply_batch(
        &mut self,
        events: Vec<WatchEvent>,
    ) -> bool {
        let Some(set) = self.set.upgrade() else {
            return false;
        };

        for event in &events {
            trace!(service = %self.service_name, key = %event.key, kind = ?event.kind, revision = event.revision, "Apply watch event");
            self.table.apply(event);
        }

        if !set.replace_snapshot(self.id, self.table.instances()) {
            return false;
        }

        match self.notify_tx.try_send(()) {
            // Full: a notification is already pending and will report this batch too
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                trace!(service = %self.service_name, "Watcher consumer gone");
            }
        }
        true
    }
}
