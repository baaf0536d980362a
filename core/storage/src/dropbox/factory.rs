//! Dropbox client factory and provider constructor.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use dropmedia_common::Result;

use crate::provider::MediaProvider;
use crate::remote::{ClientFactory, RemoteStoreClient};
use crate::remote_provider::RemoteMediaProvider;

use super::client::DropboxClient;
use super::settings::DropboxSettings;

/// Builds the Dropbox client on first use and shares it afterwards.
pub struct DropboxClientFactory {
    settings: DropboxSettings,
    client: OnceCell<Arc<DropboxClient>>,
}

impl DropboxClientFactory {
    /// Create a factory for one account.
    ///
    /// # Errors
    /// - `Configuration` if the settings are invalid
    pub fn new(settings: DropboxSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            client: OnceCell::new(),
        })
    }

    pub fn settings(&self) -> &DropboxSettings {
        &self.settings
    }
}

#[async_trait]
impl ClientFactory for DropboxClientFactory {
    async fn client(&self) -> Result<Arc<dyn RemoteStoreClient>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                info!("Connecting Dropbox client to {}", self.settings.api_url);
                DropboxClient::new(self.settings.clone()).map(Arc::new)
            })
            .await?;
        Ok(client.clone())
    }
}

/// Create a Dropbox-backed provider from JSON settings.
///
/// Expected shape: `{"access_token": "...", "api_url": ..., "content_url": ..., "timeout_secs": ...}`
/// where everything but `access_token` is optional.
pub fn create_dropbox_provider(config: Value) -> Result<Arc<dyn MediaProvider>> {
    let settings = DropboxSettings::from_value(config)?;
    let factory = DropboxClientFactory::new(settings)?;
    Ok(Arc::new(RemoteMediaProvider::new("dropbox", Arc::new(factory))))
}
