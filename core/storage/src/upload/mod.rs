//! Resumable chunked uploads.
//!
//! A content source delivers chunks one at a time; each chunk is submitted
//! to the store against the cursor returned for the previous one, and the
//! object is finalized exactly once after the source ends. The source is
//! paused for the duration of every chunk upload.

pub mod coordinator;
pub mod session;
pub mod source;
pub mod writer;

pub use coordinator::{UploadCoordinator, UploadOptions};
pub use session::{SessionAction, SessionEvent, UploadSession, UploadState};
pub use source::{ChannelSource, ChunkSource, SourceEvent, StreamSource};
pub use writer::UploadWriter;
