//! Upload session state machine.
//!
//! `UploadSession` owns everything one resumable upload knows: target key,
//! current cursor and end-of-source flag. `apply` is the only transition
//! function; it consumes one event and tells the driver what to do next.

use bytes::Bytes;
use tracing::{debug, warn};

use dropmedia_common::{Error, MediaPath, Result};

use crate::remote::{Cursor, ObjectStats};

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// No data received yet.
    Idle,
    /// At least one chunk was received; chunks are being submitted.
    Uploading,
    /// The finalize call has been issued.
    Finishing,
    /// The object was committed.
    Completed,
    /// The session was abandoned after an error.
    Failed,
}

impl UploadState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum SessionEvent {
    /// The source delivered a chunk.
    Data(Bytes),
    /// The source has no more data.
    End,
    /// The source reported an error.
    SourceFailed(Error),
    /// The store accepted the in-flight chunk.
    ChunkAccepted(Cursor),
    /// The store rejected the in-flight chunk.
    ChunkFailed(Error),
    /// The finalize call succeeded.
    Finalized(ObjectStats),
    /// The finalize call failed.
    FinalizeFailed(Error),
}

/// What the driver must do after a transition.
#[derive(Debug)]
pub enum SessionAction {
    /// Nothing to issue; wait for the next event.
    Wait,
    /// Pause the source and submit `chunk` against `cursor`.
    Upload {
        chunk: Bytes,
        cursor: Option<Cursor>,
    },
    /// Issue the single finalize call.
    Finalize {
        path: MediaPath,
        cursor: Option<Cursor>,
    },
    /// The session completed with these stats.
    Complete(ObjectStats),
    /// The session failed with this error.
    Fail(Error),
}

/// One in-flight resumable upload.
#[derive(Debug)]
pub struct UploadSession {
    target_path: MediaPath,
    cursor: Option<Cursor>,
    source_ended: bool,
    chunk_in_flight: Option<u64>,
    state: UploadState,
    chunks_accepted: u64,
    bytes_accepted: u64,
}

impl UploadSession {
    /// Create a session targeting `target_path`.
    ///
    /// # Errors
    /// - The root path is not a valid destination key
    pub fn new(target_path: MediaPath) -> Result<Self> {
        if target_path.is_root() {
            return Err(Error::InvalidInput(
                "Upload target cannot be the root path".to_string(),
            ));
        }

        Ok(Self {
            target_path,
            cursor: None,
            source_ended: false,
            chunk_in_flight: None,
            state: UploadState::Idle,
            chunks_accepted: 0,
            bytes_accepted: 0,
        })
    }

    pub fn target_path(&self) -> &MediaPath {
        &self.target_path
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn source_ended(&self) -> bool {
        self.source_ended
    }

    pub fn chunk_in_flight(&self) -> bool {
        self.chunk_in_flight.is_some()
    }

    pub fn chunks_accepted(&self) -> u64 {
        self.chunks_accepted
    }

    pub fn bytes_accepted(&self) -> u64 {
        self.bytes_accepted
    }

    /// Apply one event and return the next action.
    ///
    /// Events arriving after a terminal state are ignored.
    pub fn apply(&mut self, event: SessionEvent) -> SessionAction {
        if self.state.is_terminal() {
            debug!("Ignoring {:?} for finished upload of {}", event, self.target_path);
            return SessionAction::Wait;
        }

        match event {
            SessionEvent::Data(chunk) => self.on_data(chunk),
            SessionEvent::End => self.on_end(),
            SessionEvent::SourceFailed(err) => self.fail(err),
            SessionEvent::ChunkAccepted(cursor) => self.on_chunk_accepted(cursor),
            SessionEvent::ChunkFailed(err) => self.fail(err),
            SessionEvent::Finalized(stats) => self.on_finalized(stats),
            SessionEvent::FinalizeFailed(err) => self.fail(err),
        }
    }

    fn on_data(&mut self, chunk: Bytes) -> SessionAction {
        if self.source_ended {
            return self.fail(Error::Source(
                "Source delivered data after signalling end".to_string(),
            ));
        }
        if self.chunk_in_flight.is_some() {
            return self.fail(Error::Source(
                "Source delivered data while paused".to_string(),
            ));
        }

        self.state = UploadState::Uploading;
        self.chunk_in_flight = Some(chunk.len() as u64);

        SessionAction::Upload {
            chunk,
            cursor: self.cursor.clone(),
        }
    }

    fn on_end(&mut self) -> SessionAction {
        if self.source_ended {
            debug!("Duplicate end signal for {}", self.target_path);
            return SessionAction::Wait;
        }
        self.source_ended = true;

        if self.chunk_in_flight.is_some() {
            // finalize once the pending chunk is acknowledged
            return SessionAction::Wait;
        }
        self.begin_finish()
    }

    fn on_chunk_accepted(&mut self, cursor: Cursor) -> SessionAction {
        let Some(len) = self.chunk_in_flight.take() else {
            warn!("Chunk acknowledgement with no chunk in flight for {}", self.target_path);
            return SessionAction::Wait;
        };

        self.cursor = Some(cursor);
        self.chunks_accepted += 1;
        self.bytes_accepted += len;

        if self.source_ended {
            self.begin_finish()
        } else {
            SessionAction::Wait
        }
    }

    fn on_finalized(&mut self, stats: ObjectStats) -> SessionAction {
        if self.state != UploadState::Finishing {
            warn!("Finalize result before finalize was issued for {}", self.target_path);
            return SessionAction::Wait;
        }
        self.state = UploadState::Completed;
        SessionAction::Complete(stats)
    }

    fn begin_finish(&mut self) -> SessionAction {
        self.state = UploadState::Finishing;
        SessionAction::Finalize {
            path: self.target_path.clone(),
            cursor: self.cursor.clone(),
        }
    }

    fn fail(&mut self, err: Error) -> SessionAction {
        warn!("Upload of {} failed: {}", self.target_path, err);
        self.state = UploadState::Failed;
        self.chunk_in_flight = None;
        SessionAction::Fail(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UploadSession {
        UploadSession::new(MediaPath::parse("/path/x").unwrap()).unwrap()
    }

    fn expect_upload(action: SessionAction) -> (Bytes, Option<Cursor>) {
        match action {
            SessionAction::Upload { chunk, cursor } => (chunk, cursor),
            other => panic!("expected upload, got {:?}", other),
        }
    }

    fn expect_finalize(action: SessionAction) -> Option<Cursor> {
        match action {
            SessionAction::Finalize { cursor, .. } => cursor,
            other => panic!("expected finalize, got {:?}", other),
        }
    }

    #[test]
    fn test_root_target_rejected() {
        assert!(UploadSession::new(MediaPath::root()).is_err());
    }

    #[test]
    fn test_chunks_chain_cursors() {
        let mut s = session();
        assert_eq!(s.state(), UploadState::Idle);

        let (chunk, cursor) = expect_upload(s.apply(SessionEvent::Data(Bytes::from("AAA"))));
        assert_eq!(chunk, Bytes::from("AAA"));
        assert_eq!(cursor, None);
        assert_eq!(s.state(), UploadState::Uploading);

        assert!(matches!(
            s.apply(SessionEvent::ChunkAccepted(Cursor::new("c1"))),
            SessionAction::Wait
        ));

        let (_, cursor) = expect_upload(s.apply(SessionEvent::Data(Bytes::from("BBB"))));
        assert_eq!(cursor, Some(Cursor::new("c1")));

        s.apply(SessionEvent::ChunkAccepted(Cursor::new("c2")));
        let cursor = expect_finalize(s.apply(SessionEvent::End));
        assert_eq!(cursor, Some(Cursor::new("c2")));
        assert_eq!(s.state(), UploadState::Finishing);
        assert_eq!(s.chunks_accepted(), 2);
        assert_eq!(s.bytes_accepted(), 6);
    }

    #[test]
    fn test_empty_upload_finalizes_with_no_cursor() {
        let mut s = session();
        assert_eq!(expect_finalize(s.apply(SessionEvent::End)), None);
        assert!(s.source_ended());
    }

    #[test]
    fn test_end_during_chunk_defers_finalize() {
        let mut s = session();
        expect_upload(s.apply(SessionEvent::Data(Bytes::from("AAA"))));

        assert!(matches!(s.apply(SessionEvent::End), SessionAction::Wait));
        assert_eq!(s.state(), UploadState::Uploading);

        let cursor = expect_finalize(s.apply(SessionEvent::ChunkAccepted(Cursor::new("c1"))));
        assert_eq!(cursor, Some(Cursor::new("c1")));
    }

    #[test]
    fn test_chunk_failure_is_terminal() {
        let mut s = session();
        expect_upload(s.apply(SessionEvent::Data(Bytes::from("AAA"))));

        let action = s.apply(SessionEvent::ChunkFailed(Error::Transport("boom".to_string())));
        assert!(matches!(action, SessionAction::Fail(Error::Transport(_))));
        assert_eq!(s.state(), UploadState::Failed);

        // later end must not trigger a finalize
        assert!(matches!(s.apply(SessionEvent::End), SessionAction::Wait));
        assert!(!s.source_ended());
    }

    #[test]
    fn test_data_while_chunk_in_flight_fails() {
        let mut s = session();
        expect_upload(s.apply(SessionEvent::Data(Bytes::from("AAA"))));

        let action = s.apply(SessionEvent::Data(Bytes::from("BBB")));
        assert!(matches!(action, SessionAction::Fail(Error::Source(_))));
    }

    #[test]
    fn test_data_after_end_fails() {
        let mut s = session();
        expect_upload(s.apply(SessionEvent::Data(Bytes::from("AAA"))));
        s.apply(SessionEvent::End);

        let action = s.apply(SessionEvent::Data(Bytes::from("BBB")));
        assert!(matches!(action, SessionAction::Fail(Error::Source(_))));
        assert_eq!(s.state(), UploadState::Failed);
    }

    #[test]
    fn test_duplicate_end_is_ignored() {
        let mut s = session();
        expect_upload(s.apply(SessionEvent::Data(Bytes::from("AAA"))));
        s.apply(SessionEvent::End);

        assert!(matches!(s.apply(SessionEvent::End), SessionAction::Wait));
        assert!(s.chunk_in_flight());
    }

    #[test]
    fn test_finalize_outcomes() {
        let mut s = session();
        expect_finalize(s.apply(SessionEvent::End));

        let stats = ObjectStats::file("id", MediaPath::parse("/path/x").unwrap(), 0);
        match s.apply(SessionEvent::Finalized(stats.clone())) {
            SessionAction::Complete(got) => assert_eq!(got, stats),
            other => panic!("expected complete, got {:?}", other),
        }
        assert_eq!(s.state(), UploadState::Completed);

        let mut s = session();
        expect_finalize(s.apply(SessionEvent::End));
        let action = s.apply(SessionEvent::FinalizeFailed(Error::Transport("x".to_string())));
        assert!(matches!(action, SessionAction::Fail(_)));
        assert_eq!(s.state(), UploadState::Failed);
    }

    #[test]
    fn test_source_failure_in_idle() {
        let mut s = session();
        let action = s.apply(SessionEvent::SourceFailed(Error::Source("eof".to_string())));
        assert!(matches!(action, SessionAction::Fail(Error::Source(_))));
        assert!(s.state().is_terminal());
    }

    #[test]
    fn test_unexpected_ack_is_ignored() {
        let mut s = session();
        assert!(matches!(
            s.apply(SessionEvent::ChunkAccepted(Cursor::new("c1"))),
            SessionAction::Wait
        ));
        assert_eq!(s.cursor(), None);
        assert_eq!(s.state(), UploadState::Idle);
    }
}
