//! Dropbox account settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use dropmedia_common::{Error, Result};

/// Dropbox RPC endpoint base.
pub const DEFAULT_API_URL: &str = "https://api.dropboxapi.com/2/";
/// Dropbox content (upload/download) endpoint base.
pub const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com/2/";
/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_content_url() -> String {
    DEFAULT_CONTENT_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Settings for one Dropbox account.
///
/// The access token is wiped from memory when the settings are dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DropboxSettings {
    /// OAuth2 access token for the account.
    pub access_token: String,
    /// Base URL for RPC endpoints.
    #[serde(default = "default_api_url")]
    #[zeroize(skip)]
    pub api_url: String,
    /// Base URL for content endpoints.
    #[serde(default = "default_content_url")]
    #[zeroize(skip)]
    pub content_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    #[zeroize(skip)]
    pub timeout_secs: u64,
}

impl DropboxSettings {
    /// Settings for the public Dropbox endpoints.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            api_url: default_api_url(),
            content_url: default_content_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Parse settings from provider configuration.
    ///
    /// # Errors
    /// - `Configuration` if the value has the wrong shape or fails `validate`
    pub fn from_value(config: serde_json::Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(config)
            .map_err(|e| Error::Configuration(format!("Invalid Dropbox settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Replace the access token.
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token.zeroize();
        self.access_token = access_token.into();
        self
    }

    /// Check that the settings can produce a working client.
    pub fn validate(&self) -> Result<()> {
        let token = self.access_token.trim();
        if token.is_empty() {
            return Err(Error::Configuration(
                "Dropbox access token is missing".to_string(),
            ));
        }
        if token.len() != self.access_token.len() || token.contains(char::is_whitespace) {
            return Err(Error::Configuration(
                "Dropbox access token contains whitespace".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Configuration(
                "Dropbox request timeout must be positive".to_string(),
            ));
        }
        self.api_base()?;
        self.content_base()?;
        Ok(())
    }

    /// RPC base URL, always ending in `/`.
    pub fn api_base(&self) -> Result<Url> {
        base_url(&self.api_url)
    }

    /// Content base URL, always ending in `/`.
    pub fn content_base(&self) -> Result<Url> {
        base_url(&self.content_url)
    }
}

impl fmt::Debug for DropboxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropboxSettings")
            .field("access_token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("content_url", &self.content_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| Error::Configuration(format!("Invalid Dropbox URL '{}': {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::Configuration(format!(
            "Dropbox URL '{}' cannot be used as a base",
            raw
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
