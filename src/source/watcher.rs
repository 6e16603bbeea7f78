use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::ConfigKeyValue;
use super::ConfigSource;
use crate::Error;
use crate::Result;
use crate::WatchError;
use crate::WatchStream;

/// Reloads a [`ConfigSource`] whenever its path changes
pub struct ConfigWatcher {
    source: ConfigSource,
    stream: WatchStream,
    token: CancellationToken,
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("source", &self.source)
            .field("stopped", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ConfigWatcher {
    pub(super) fn new(
        source: ConfigSource,
        stream: WatchStream,
        token: CancellationToken,
    ) -> Self {
        Self { source, stream, token }
    }

    /// Waits for the next change batch and returns the reloaded values.
    ///
    /// # Errors
    /// - [`Error::Cancelled`] after [`stop`](ConfigWatcher::stop)
    /// - the store error that terminated the watch stream
    /// - [`WatchError::StreamClosed`] if the stream ended
    /// - any [`ConfigSource::load`] error
    pub async fn next(&mut self) -> Result<Vec<ConfigKeyValue>> {
        let batch = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(Error::Cancelled),
            batch = self.stream.next() => batch,
        };

        match batch {
            Some(Ok(events)) => {
                debug!(path = %self.source.config().path, changes = events.len(), "Config changed");
                self.source.load().await
            }
            Some(Err(e)) => {
                warn!(path = %self.source.config().path, "Config watch failed: {}", e);
                Err(e.into())
            }
            None => Err(WatchError::StreamClosed.into()),
        }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}
