//! Media provider backed by a remote store client.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::sync::Arc;
use tracing::debug;

use dropmedia_common::{Error, MediaPath, Result};

use crate::provider::{ByteStream, MediaProvider, StreamWriter};
use crate::remote::{ClientFactory, ObjectStats, ReadParams, RemoteStoreClient};
use crate::upload::{StreamSource, UploadCoordinator, UploadOptions, UploadWriter};

/// Exposes one remote account as a `MediaProvider`.
///
/// A client is requested from the factory for every operation; the factory
/// decides whether that client is shared.
pub struct RemoteMediaProvider {
    name: String,
    factory: Arc<dyn ClientFactory>,
    upload_options: UploadOptions,
}

impl RemoteMediaProvider {
    pub fn new(name: impl Into<String>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
            upload_options: UploadOptions::default(),
        }
    }

    async fn client(&self) -> Result<Arc<dyn RemoteStoreClient>> {
        self.factory.client().await
    }
}

#[async_trait]
impl MediaProvider for RemoteMediaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, path: &MediaPath, params: &ReadParams) -> Result<Bytes> {
        self.client().await?.read_object(path, params).await
    }

    async fn get_stream(&self, path: &MediaPath, params: &ReadParams) -> Result<ByteStream> {
        let data = self.get(path, params).await?;
        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }

    async fn set(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats> {
        debug!("Writing {} ({} bytes)", path, data.len());
        self.client().await?.write_object(path, data).await
    }

    async fn set_stream(&self, path: &MediaPath, stream: ByteStream) -> Result<ObjectStats> {
        let coordinator = UploadCoordinator::new(self.client().await?);
        let mut source = StreamSource::new(stream);
        coordinator
            .upload_stream(&mut source, path, &self.upload_options)
            .await
    }

    async fn exists(&self, path: &MediaPath) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, path: &MediaPath) -> Result<()> {
        debug!("Deleting {}", path);
        self.client().await?.remove_object(path).await
    }

    async fn stat(&self, path: &MediaPath) -> Result<ObjectStats> {
        self.client().await?.stat_object(path).await
    }

    fn stream_writer(&self) -> Option<&dyn StreamWriter> {
        Some(self)
    }
}

#[async_trait]
impl StreamWriter for RemoteMediaProvider {
    async fn create_write_stream(&self, path: &MediaPath) -> Result<UploadWriter> {
        if path.is_root() {
            return Err(Error::InvalidInput(
                "Upload target cannot be the root path".to_string(),
            ));
        }
        let coordinator = UploadCoordinator::new(self.client().await?);
        Ok(UploadWriter::spawn(
            coordinator,
            path.clone(),
            self.upload_options.clone(),
        ))
    }
}
