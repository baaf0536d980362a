//! Media provider trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use dropmedia_common::{MediaPath, Result};

use crate::remote::{ObjectStats, ReadParams};
use crate::upload::UploadWriter;

/// Byte stream type for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Generic media storage backend.
///
/// Media is addressed by a path-like key such as
/// `/media/2014/9/540a3ff0e30ddfb9e60000be-1409957872680.jpg`.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Get the provider name (e.g., "dropbox", "memory").
    fn name(&self) -> &str;

    /// Retrieve the full content of a media object.
    ///
    /// # Errors
    /// - `NotFound` if nothing is stored at `path`
    async fn get(&self, path: &MediaPath, params: &ReadParams) -> Result<Bytes>;

    /// Retrieve a media object as a stream.
    async fn get_stream(&self, path: &MediaPath, params: &ReadParams) -> Result<ByteStream>;

    /// Store content in a single call.
    ///
    /// # Postconditions
    /// - The object at `path` is created or replaced
    async fn set(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats>;

    /// Store content read from a stream, chunk by chunk.
    async fn set_stream(&self, path: &MediaPath, stream: ByteStream) -> Result<ObjectStats>;

    /// Check if an object exists.
    ///
    /// Only a "not found" answer maps to `false`; other failures propagate.
    async fn exists(&self, path: &MediaPath) -> Result<bool>;

    /// Delete an object.
    async fn delete(&self, path: &MediaPath) -> Result<()>;

    /// Get metadata for an object.
    async fn stat(&self, path: &MediaPath) -> Result<ObjectStats>;

    /// Push-style streaming writes, if this provider supports them.
    fn stream_writer(&self) -> Option<&dyn StreamWriter> {
        None
    }
}

/// Optional capability: open a writer that uploads as data is pushed.
#[async_trait]
pub trait StreamWriter: Send + Sync {
    /// Open a writer targeting `path`.
    ///
    /// Nothing is committed until `UploadWriter::finish` succeeds.
    async fn create_write_stream(&self, path: &MediaPath) -> Result<UploadWriter>;
}
