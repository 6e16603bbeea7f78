//! In-memory store with revisioned history and prefix watches.
//!
//! Every write (or transaction) bumps the store revision by one and is
//! recorded as a batch, so watches can replay from any revision still in
//! history. Live batches are fanned out through a broadcast channel that is
//! subscribed to under the same lock as the history read: a watch never
//! misses nor duplicates a batch.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use kv_discovery::GetResponse;
use kv_discovery::KeyValue;
use kv_discovery::StoreClient;
use kv_discovery::StoreError;
use kv_discovery::WatchEvent;
use kv_discovery::WatchEventKind;
use kv_discovery::WatchStream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

const NOTICE_CAPACITY: usize = 1024;

/// One operation of a [`MemStore::txn`]
#[derive(Debug, Clone)]
pub enum Op {
    Put(String, Vec<u8>),
    Delete(String),
}

#[derive(Debug, Clone)]
enum Notice {
    Batch(Arc<Vec<WatchEvent>>),
    Fail(StoreError),
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    compact_revision: u64,
    data: BTreeMap<String, KeyValue>,
    history: Vec<Arc<Vec<WatchEvent>>>,
    unavailable: bool,
}

#[derive(Debug)]
pub struct MemStore {
    inner: Mutex<Inner>,
    notices: broadcast::Sender<Notice>,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            notices,
        })
    }

    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Applies `ops` atomically as a single revision
    pub fn txn(
        &self,
        ops: Vec<Op>,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let revision = inner.revision + 1;
        let mut events = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    inner.data.insert(
                        key.clone(),
                        KeyValue {
                            key: key.clone(),
                            value: value.clone(),
                            mod_revision: revision,
                        },
                    );
                    events.push(WatchEvent::put(key, value, revision));
                }
                Op::Delete(key) => {
                    if inner.data.remove(&key).is_some() {
                        events.push(WatchEvent::delete(key, revision));
                    }
                }
            }
        }

        if events.is_empty() {
            return inner.revision;
        }

        inner.revision = revision;
        let batch = Arc::new(events);
        inner.history.push(batch.clone());
        // No receivers is fine
        let _ = self.notices.send(Notice::Batch(batch));
        revision
    }

    /// Discards history up to and including `revision`
    pub fn compact(
        &self,
        revision: u64,
    ) {
        let mut inner = self.inner.lock();
        inner.compact_revision = revision.min(inner.revision);
        let compact_revision = inner.compact_revision;
        inner.history.retain(|batch| batch_revision(batch) > compact_revision);
        debug!(compact_revision, "Store compacted");
    }

    /// Terminates every open watch stream with a connection loss
    pub fn disconnect_watchers(&self) {
        let _ = self
            .notices
            .send(Notice::Fail(StoreError::ConnectionLost("store connection reset".into())));
    }

    /// Makes reads and writes fail until restored
    pub fn set_unavailable(
        &self,
        unavailable: bool,
    ) {
        self.inner.lock().unavailable = unavailable;
    }
}

fn batch_revision(batch: &[WatchEvent]) -> u64 {
    batch.first().map(|e| e.revision).unwrap_or_default()
}

fn matching(
    batch: &[WatchEvent],
    key: &str,
    prefix: bool,
) -> Vec<WatchEvent> {
    batch.iter().filter(|e| e.matches(key, prefix)).cloned().collect()
}

struct Cursor {
    key: String,
    prefix: bool,
    backlog: VecDeque<Vec<WatchEvent>>,
    rx: broadcast::Receiver<Notice>,
    done: bool,
}

#[async_trait]
impl StoreClient for MemStore {
    async fn get(
        &self,
        key: &str,
        prefix: bool,
    ) -> Result<GetResponse, StoreError> {
        let inner = self.inner.lock();
        if inner.unavailable {
            return Err(StoreError::Read {
                key: key.to_string(),
                reason: "store unavailable".into(),
            });
        }

        let kvs = if prefix {
            inner
                .data
                .range(key.to_string()..)
                .take_while(|(k, _)| k.starts_with(key))
                .map(|(_, kv)| kv.clone())
                .collect()
        } else {
            inner.data.get(key).cloned().into_iter().collect()
        };
        Ok(GetResponse {
            revision: inner.revision,
            kvs,
        })
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), StoreError> {
        if self.inner.lock().unavailable {
            return Err(StoreError::Write {
                key: key.to_string(),
                reason: "store unavailable".into(),
            });
        }
        self.txn(vec![Op::Put(key.to_string(), value)]);
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<(), StoreError> {
        if self.inner.lock().unavailable {
            return Err(StoreError::Write {
                key: key.to_string(),
                reason: "store unavailable".into(),
            });
        }
        self.txn(vec![Op::Delete(key.to_string())]);
        Ok(())
    }

    async fn watch(
        &self,
        key: &str,
        prefix: bool,
        from_revision: Option<u64>,
    ) -> Result<WatchStream, StoreError> {
        let inner = self.inner.lock();

        if let Some(revision) = from_revision {
            if revision <= inner.compact_revision {
                let err = StoreError::Compacted {
                    key: key.to_string(),
                    revision,
                    compact_revision: inner.compact_revision,
                };
                return Ok(stream::iter([Err(err)]).boxed());
            }
        }

        let backlog = match from_revision {
            Some(revision) => inner
                .history
                .iter()
                .filter(|batch| batch_revision(batch) >= revision)
                .map(|batch| matching(batch, key, prefix))
                .filter(|events| !events.is_empty())
                .collect(),
            None => VecDeque::new(),
        };

        let cursor = Cursor {
            key: key.to_string(),
            prefix,
            backlog,
            rx: self.notices.subscribe(),
            done: false,
        };
        drop(inner);

        let stream = stream::unfold(cursor, |mut cursor| async move {
            if cursor.done {
                return None;
            }
            if let Some(events) = cursor.backlog.pop_front() {
                return Some((Ok(events), cursor));
            }
            loop {
                match cursor.rx.recv().await {
                    Ok(Notice::Batch(batch)) => {
                        let events = matching(&batch, &cursor.key, cursor.prefix);
                        if !events.is_empty() {
                            return Some((Ok(events), cursor));
                        }
                    }
                    Ok(Notice::Fail(e)) => {
                        cursor.done = true;
                        return Some((Err(e), cursor));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        cursor.done = true;
                        let e = StoreError::ConnectionLost(format!("watch on {} fell behind", cursor.key));
                        return Some((Err(e), cursor));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Keys touched by a batch, for assertions
pub fn keys_of(events: &[WatchEvent]) -> Vec<(WatchEventKind, String)> {
    events.iter().map(|e| (e.kind, e.key.clone())).collect()
}
