//! Remote store client capability.
//!
//! A `RemoteStoreClient` is a pre-authenticated handle on one remote account.
//! Clients are handed out by a `ClientFactory`, which owns credential lookup
//! and client construction.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use dropmedia_common::{MediaPath, Result};

/// Opaque continuation token returned by the store after each accepted chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a store-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStats {
    /// Unique identifier for the object (store-specific).
    pub id: String,
    /// Key the object is stored under.
    pub path: MediaPath,
    /// Size in bytes (None for directories).
    pub size: Option<u64>,
    /// Store revision, when the store versions objects.
    pub revision: Option<String>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Whether this is a directory.
    pub is_directory: bool,
}

impl ObjectStats {
    /// Stats for a plain file, modified now.
    pub fn file(id: impl Into<String>, path: MediaPath, size: u64) -> Self {
        Self {
            id: id.into(),
            path,
            size: Some(size),
            revision: None,
            modified: Utc::now(),
            is_directory: false,
        }
    }

    /// Name of the object (last path component).
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or("/")
    }
}

/// Parameters for reading an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadParams {
    /// Read this revision instead of the latest one.
    pub revision: Option<String>,
}

impl ReadParams {
    /// Read a specific revision.
    pub fn at_revision(revision: impl Into<String>) -> Self {
        Self {
            revision: Some(revision.into()),
        }
    }
}

/// Request/response operations of a remote content store.
///
/// Every call may fail with `Error::Transport`; reads and stats report a
/// missing object with `Error::NotFound`, never with an empty result.
#[async_trait]
pub trait RemoteStoreClient: Send + Sync {
    /// Get the backend name (e.g., "dropbox", "memory").
    fn name(&self) -> &str;

    /// Submit one chunk of a resumable upload.
    ///
    /// `cursor` is `None` for the first chunk of a session and otherwise the
    /// cursor returned by the previous call, passed back verbatim.
    async fn upload_chunk(&self, chunk: Bytes, cursor: Option<Cursor>) -> Result<Cursor>;

    /// Commit the accepted chunks as the object at `path`.
    ///
    /// A `None` cursor commits an empty object.
    async fn finalize_upload(&self, path: &MediaPath, cursor: Option<Cursor>)
        -> Result<ObjectStats>;

    /// Read the full content of an object.
    async fn read_object(&self, path: &MediaPath, params: &ReadParams) -> Result<Bytes>;

    /// Write an object in a single call, replacing any existing content.
    async fn write_object(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats>;

    /// Remove an object.
    async fn remove_object(&self, path: &MediaPath) -> Result<()>;

    /// Get metadata for an object.
    async fn stat_object(&self, path: &MediaPath) -> Result<ObjectStats>;
}

/// Produces ready, authenticated clients.
///
/// Credential problems surface here as `Error::Configuration`.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Get a client for the configured account.
    async fn client(&self) -> Result<Arc<dyn RemoteStoreClient>>;
}

/// Factory handing out one pre-built client.
#[derive(Clone)]
pub struct StaticClientFactory {
    client: Arc<dyn RemoteStoreClient>,
}

impl StaticClientFactory {
    /// Wrap an existing client.
    pub fn new(client: Arc<dyn RemoteStoreClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientFactory for StaticClientFactory {
    async fn client(&self) -> Result<Arc<dyn RemoteStoreClient>> {
        Ok(self.client.clone())
    }
}
