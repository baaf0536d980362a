//! Push-style writer backed by a background upload task.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use dropmedia_common::{Error, MediaPath, Result};

use crate::remote::ObjectStats;

use super::coordinator::{UploadCoordinator, UploadOptions};
use super::source::{ChannelSource, SourceEvent};

/// Handle for pushing chunks into a running upload.
///
/// `write` waits while the previous chunk is still being uploaded. Dropping
/// the writer without calling `finish` abandons the upload.
pub struct UploadWriter {
    path: MediaPath,
    tx: mpsc::Sender<SourceEvent>,
    task: JoinHandle<Result<ObjectStats>>,
}

impl UploadWriter {
    /// Start an upload task for `path` and return its writer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(coordinator: UploadCoordinator, path: MediaPath, options: UploadOptions) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let target = path.clone();

        let task = tokio::spawn(async move {
            let mut source = ChannelSource::new(rx);
            coordinator.upload_stream(&mut source, &target, &options).await
        });

        Self { path, tx, task }
    }

    pub fn path(&self) -> &MediaPath {
        &self.path
    }

    /// Push one chunk.
    ///
    /// # Errors
    /// - `Transport` if the upload already terminated; `finish` reports why
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(SourceEvent::Data(chunk.into()))
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "Upload of {} is no longer accepting data",
                    self.path
                ))
            })
    }

    /// Signal the end of data and wait for the object to be committed.
    pub async fn finish(self) -> Result<ObjectStats> {
        // a closed channel means the task already ended; its result says why
        let _ = self.tx.send(SourceEvent::End).await;
        drop(self.tx);
        join(self.task).await
    }

    /// Abandon the upload. Nothing is committed.
    pub async fn abort(self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        debug!("Aborting upload of {}: {}", self.path, reason);

        let _ = self.tx.send(SourceEvent::Error(Error::Source(reason))).await;
        drop(self.tx);
        match join(self.task).await {
            Ok(stats) => Err(Error::Transport(format!(
                "Upload of {} completed before it could be aborted",
                stats.path
            ))),
            Err(Error::Source(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

async fn join(task: JoinHandle<Result<ObjectStats>>) -> Result<ObjectStats> {
    task.await
        .map_err(|e| Error::Transport(format!("Upload task failed: {}", e)))?
}
