//! Store client contract
//!
//! The discovery client never talks to a concrete key-value store. It drives
//! any backend implementing [`StoreClient`]: a strongly consistent store with
//! revisioned history, prefix scans and prefix watches (etcd-like semantics).
//!
//! # Watch semantics
//!
//! A watch delivers change batches in store order. Every event carries the
//! revision that produced it; a batch groups the events of a single store
//! transaction. Starting a watch at `from_revision` replays every change with
//! a revision greater than or equal to it, so callers that read at revision `r`
//! and then watch from `r + 1` never miss a change. A stream that can no longer
//! make progress yields one error (for instance [`StoreError::Compacted`]) and
//! then ends.


use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::StoreError;

/// A single stored key with its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Revision of the last modification of this key
    pub mod_revision: u64,
}

/// Result of a Get or prefix scan
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetResponse {
    /// Store revision the read was served at
    pub revision: u64,
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Key was created or updated
    Put,
    /// Key was deleted
    Delete,
}

/// Change notification for a single key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    /// The new value (empty for Delete events)
    pub value: Vec<u8>,
    pub revision: u64,
}

impl WatchEvent {
    pub fn put(
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
        revision: u64,
    ) -> Self {
        Self {
            kind: WatchEventKind::Put,
            key: key.into(),
            value: value.into(),
            revision,
        }
    }

    pub fn delete(
        key: impl Into<String>,
        revision: u64,
    ) -> Self {
        Self {
            kind: WatchEventKind::Delete,
            key: key.into(),
            value: Vec::new(),
            revision,
        }
    }

    /// Returns true if this event touches `key` (or a key under it when `prefix` is set)
    pub fn matches(
        &self,
        key: &str,
        prefix: bool,
    ) -> bool {
        if prefix {
            self.key.starts_with(key)
        } else {
            self.key == key
        }
    }
}

/// Stream of change batches produced by [`StoreClient::watch`]
pub type WatchStream = BoxStream<'static, std::result::Result<Vec<WatchEvent>, StoreError>>;

/// Contract expected of the key-value store client.
///
/// Implementations are shared across every registry, watcher and config
/// source as `Arc<dyn StoreClient>`, so all methods take `&self` and must be
/// safe to call concurrently.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Reads `key`, or every key starting with `key` when `prefix` is set.
    ///
    /// # Errors
    /// [`StoreError::Read`] on any failure. Partial results are never returned.
    async fn get(
        &self,
        key: &str,
        prefix: bool,
    ) -> std::result::Result<GetResponse, StoreError>;

    /// # Errors
    /// [`StoreError::Write`] when the value could not be stored
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> std::result::Result<(), StoreError>;

    /// Deletes `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    /// [`StoreError::Write`] when the delete could not be applied
    async fn delete(
        &self,
        key: &str,
    ) -> std::result::Result<(), StoreError>;

    /// Opens a watch on `key` (or the key space under it when `prefix` is set).
    ///
    /// `from_revision = None` watches changes made after the call.
    async fn watch(
        &self,
        key: &str,
        prefix: bool,
        from_revision: Option<u64>,
    ) -> std::result::Result<WatchStream, StoreError>;
}
