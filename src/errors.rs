//! Service Discovery Error Hierarchy
//!
//! Defines the error types surfaced by the registry, its watchers and the
//! configuration source, categorized by the layer that produced them.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid construction (empty paths, malformed prefixes, bad config files)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failures reported by the underlying key-value store
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Misuse of the registry or a race between Watch and Service calls
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Terminal watcher conditions
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Service instance serialization failures
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The operation's cancellation token fired before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors returned by a [`StoreClient`](crate::StoreClient) implementation.
///
/// Every variant carries the key the operation targeted so callers can tell
/// which part of the key space was affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Get or prefix scan failed
    #[error("Store read failed for key {key}: {reason}")]
    Read { key: String, reason: String },

    /// Put or Delete failed
    #[error("Store write failed for key {key}: {reason}")]
    Write { key: String, reason: String },

    /// The requested watch revision is no longer in the store's history
    #[error("Watch on {key} from revision {revision} failed: history compacted up to {compact_revision}")]
    Compacted {
        key: String,
        revision: u64,
        compact_revision: u64,
    },

    /// The store connection was permanently lost
    #[error("Store connection lost: {0}")]
    ConnectionLost(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Service {0} is already being watched")]
    AlreadyWatched(String),

    #[error("Service {0} is not watched in registry")]
    NotWatched(String),

    #[error("Service {0} has not been populated yet")]
    NotPopulated(String),

    #[error("Invalid service instance: {0}")]
    InvalidInstance(String),

    #[error("Invalid service name: {0:?}")]
    InvalidServiceName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// The store watch stream for a service terminated with an error
    #[error("Watch for service {service} failed: {source}")]
    Failed {
        service: String,
        #[source]
        source: StoreError,
    },

    /// The store watch stream ended without reporting an error
    #[error("Watch stream closed by store")]
    StreamClosed,

    /// The service set backing this watcher no longer exists
    #[error("Watcher for service {0} has been stopped")]
    Stopped(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode service instance {id}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed stored record. Skipped by the watch path.
    #[error("Malformed service instance at {key}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Returns the store error when this error originated in the store.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Error::Store(e) => Some(e),
            Error::Watch(WatchError::Failed { source, .. }) => Some(source),
            _ => None,
        }
    }
}
