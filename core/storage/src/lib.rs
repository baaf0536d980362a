//! Media storage for Dropmedia.
//!
//! This crate provides a trait-based interface over remote content stores
//! (Dropbox, in-memory) and the resumable upload machinery that streams
//! content into them chunk by chunk.
//!
//! # Design Principles
//! - Provider isolation: Store-specific wire details stay inside the store client
//! - Async operations: All I/O operations are async
//! - Streaming support: Large files are uploaded in chunks, one at a time
//! - Unified error semantics: Consistent error types across stores

pub mod dropbox;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod remote;
pub mod remote_provider;
pub mod upload;

pub use dropbox::{create_dropbox_provider, DropboxClient, DropboxClientFactory, DropboxSettings};
pub use memory::MemoryStore;
pub use provider::{ByteStream, MediaProvider, StreamWriter};
pub use registry::{create_default_registry, ProviderFactory, ProviderRegistry};
pub use remote::{ClientFactory, Cursor, ObjectStats, ReadParams, RemoteStoreClient, StaticClientFactory};
pub use remote_provider::RemoteMediaProvider;
pub use upload::{
    ChannelSource, ChunkSource, SourceEvent, StreamSource, UploadCoordinator, UploadOptions,
    UploadState, UploadWriter,
};
