//! Shared fixtures for unit tests.
//!
//! Store interactions are simulated with the [mockall]-generated
//! [`MockStoreClient`]; watch streams are fed by hand through
//! [`watch_channel`] so tests decide exactly when each batch is delivered.
//!
//! [mockall]: https://docs.rs/mockall/latest/mockall/

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::GetResponse;
use crate::KeyValue;
use crate::MockStoreClient;
use crate::ServiceInstance;
use crate::StoreClient;
use crate::StoreError;
use crate::WatchEvent;
use crate::WatchStream;

pub(crate) const PREFIX: &str = "/registry";

/// Upper bound for any single asynchronous expectation in tests
pub(crate) const WAIT: Duration = Duration::from_secs(2);

pub(crate) type BatchSender = mpsc::UnboundedSender<std::result::Result<Vec<WatchEvent>, StoreError>>;

pub(crate) fn instance(
    name: &str,
    id: &str,
    endpoint: &str,
) -> ServiceInstance {
    ServiceInstance::new(name).with_id(id).with_endpoint(endpoint)
}

pub(crate) fn key_of(instance: &ServiceInstance) -> String {
    format!("{}/{}/{}", PREFIX, instance.name, instance.id)
}

pub(crate) fn encoded(instance: &ServiceInstance) -> Vec<u8> {
    serde_json::to_vec(instance).unwrap()
}

pub(crate) fn stored(
    instance: &ServiceInstance,
    mod_revision: u64,
) -> KeyValue {
    KeyValue {
        key: key_of(instance),
        value: encoded(instance),
        mod_revision,
    }
}

pub(crate) fn put_event(
    instance: &ServiceInstance,
    revision: u64,
) -> WatchEvent {
    WatchEvent::put(key_of(instance), encoded(instance), revision)
}

pub(crate) fn delete_event(
    instance: &ServiceInstance,
    revision: u64,
) -> WatchEvent {
    WatchEvent::delete(key_of(instance), revision)
}

/// Watch stream whose batches are pushed by the test
pub(crate) fn watch_channel() -> (BatchSender, WatchStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx).boxed())
}

/// Store mock answering one prefix scan and one watch request for `service`.
///
/// The watch is expected to start right after `revision`.
pub(crate) fn mock_discovery_store(
    service: &str,
    revision: u64,
    kvs: Vec<KeyValue>,
    stream: WatchStream,
) -> Arc<dyn StoreClient> {
    let service_prefix = format!("{}/{}/", PREFIX, service);
    let mut store = MockStoreClient::new();

    let get_prefix = service_prefix.clone();
    store
        .expect_get()
        .withf(move |key, prefix| *key == get_prefix && *prefix)
        .times(1)
        .return_once(move |_, _| Ok(GetResponse { revision, kvs }));

    store
        .expect_watch()
        .withf(move |key, prefix, from_revision| {
            *key == service_prefix && *prefix && *from_revision == Some(revision + 1)
        })
        .times(1)
        .return_once(move |_, _, _| Ok(stream));

    Arc::new(store)
}

/// Polls `condition` until it holds, panicking after [`WAIT`]
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
