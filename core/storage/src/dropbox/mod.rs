//! Dropbox storage backend.
//!
//! Uploads go through Dropbox upload sessions; the session id and byte
//! offset together form the upload cursor.

mod client;
mod factory;
mod settings;

pub use client::{DeletedMetadata, DropboxClient, EntryMetadata, FileMetadata, FolderMetadata};
pub use factory::{create_dropbox_provider, DropboxClientFactory};
pub use settings::{DropboxSettings, DEFAULT_API_URL, DEFAULT_CONTENT_URL, DEFAULT_TIMEOUT_SECS};
