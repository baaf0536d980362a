//! Drives an `UploadSession` against a remote store.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

use dropmedia_common::{MediaPath, Result};

use crate::remote::{Cursor, ObjectStats, RemoteStoreClient};

use super::session::{SessionAction, SessionEvent, UploadSession};
use super::source::ChunkSource;

/// Options for a streaming upload.
///
/// No options are recognised yet.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct UploadOptions {}

/// Converts a pausable chunk source into ordered chunk uploads followed by
/// a single finalize call.
///
/// Chunks are never retried: the first failure abandons the session.
#[derive(Clone)]
pub struct UploadCoordinator {
    client: Arc<dyn RemoteStoreClient>,
}

impl UploadCoordinator {
    pub fn new(client: Arc<dyn RemoteStoreClient>) -> Self {
        Self { client }
    }

    /// Upload everything `source` delivers to `target_path`.
    ///
    /// # Postconditions
    /// - On success, exactly one finalize call was made, after the source
    ///   ended and the last chunk was accepted
    /// - On failure, no finalize call follows a failed chunk
    ///
    /// # Errors
    /// - `InvalidInput` for the root path
    /// - `Source` if the source fails or delivers data while paused
    /// - `Transport` (or any store error) from a chunk or finalize call
    pub async fn upload_stream<S>(
        &self,
        source: &mut S,
        target_path: &MediaPath,
        _options: &UploadOptions,
    ) -> Result<ObjectStats>
    where
        S: ChunkSource + ?Sized,
    {
        let mut session = UploadSession::new(target_path.clone())?;
        debug!("Starting upload of {} via {}", target_path, self.client.name());

        let mut action = SessionAction::Wait;
        loop {
            action = match action {
                SessionAction::Wait => {
                    let event = source.next_event().await;
                    session.apply(event.into())
                }
                SessionAction::Upload { chunk, cursor } => {
                    source.pause();
                    self.send_chunk(source, &mut session, chunk, cursor).await
                }
                SessionAction::Finalize { path, cursor } => {
                    debug!(
                        "Finalizing {} after {} chunks ({} bytes)",
                        path,
                        session.chunks_accepted(),
                        session.bytes_accepted()
                    );
                    let event = match self.client.finalize_upload(&path, cursor).await {
                        Ok(stats) => SessionEvent::Finalized(stats),
                        Err(err) => SessionEvent::FinalizeFailed(err),
                    };
                    session.apply(event)
                }
                SessionAction::Complete(stats) => {
                    info!(
                        "Uploaded {} ({} chunks, {} bytes)",
                        target_path,
                        session.chunks_accepted(),
                        session.bytes_accepted()
                    );
                    return Ok(stats);
                }
                SessionAction::Fail(err) => {
                    warn!(
                        "Abandoning upload of {} after {} accepted chunks",
                        target_path,
                        session.chunks_accepted()
                    );
                    return Err(err);
                }
            };
        }
    }

    /// Submit one chunk while the source is paused.
    ///
    /// The paused source is still watched for `End` and `Error` until the
    /// store answers.
    async fn send_chunk<S>(
        &self,
        source: &mut S,
        session: &mut UploadSession,
        chunk: Bytes,
        cursor: Option<Cursor>,
    ) -> SessionAction
    where
        S: ChunkSource + ?Sized,
    {
        debug!(
            "Uploading chunk {} ({} bytes) for {}",
            session.chunks_accepted() + 1,
            chunk.len(),
            session.target_path()
        );
        let mut upload = self.client.upload_chunk(chunk, cursor);

        let result = loop {
            if session.source_ended() {
                break (&mut upload).await;
            }

            tokio::select! {
                biased;
                result = &mut upload => break result,
                event = source.next_event() => {
                    match session.apply(event.into()) {
                        SessionAction::Wait => {}
                        action => return action,
                    }
                }
            }
        };

        match result {
            Ok(next) => {
                source.resume();
                session.apply(SessionEvent::ChunkAccepted(next))
            }
            Err(err) => session.apply(SessionEvent::ChunkFailed(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::remote::ReadParams;
    use crate::upload::source::{SourceEvent, StreamSource};
    use async_trait::async_trait;
    use dropmedia_common::Error;
    use futures::stream;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Recording client with scripted chunk results.
    #[derive(Default)]
    struct MockClient {
        chunk_calls: Mutex<Vec<(Bytes, Option<Cursor>)>>,
        finalize_calls: Mutex<Vec<(MediaPath, Option<Cursor>)>>,
        fail_chunk: Option<usize>,
        finalize_error: bool,
        yield_on_chunk: bool,
    }

    impl MockClient {
        fn chunk_cursors(&self) -> Vec<Option<Cursor>> {
            self.chunk_calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
        }

        fn finalize_count(&self) -> usize {
            self.finalize_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteStoreClient for MockClient {
        fn name(&self) -> &str {
            "mock"
        }

        async fn upload_chunk(&self, chunk: Bytes, cursor: Option<Cursor>) -> Result<Cursor> {
            if self.yield_on_chunk {
                tokio::task::yield_now().await;
            }
            let n = {
                let mut calls = self.chunk_calls.lock().unwrap();
                calls.push((chunk, cursor));
                calls.len()
            };
            if self.fail_chunk == Some(n) {
                return Err(Error::Transport(format!("chunk {} rejected", n)));
            }
            Ok(Cursor::new(format!("c{}", n)))
        }

        async fn finalize_upload(
            &self,
            path: &MediaPath,
            cursor: Option<Cursor>,
        ) -> Result<ObjectStats> {
            self.finalize_calls.lock().unwrap().push((path.clone(), cursor));
            if self.finalize_error {
                return Err(Error::Transport("commit refused".to_string()));
            }
            let size = self
                .chunk_calls
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.len() as u64)
                .sum();
            Ok(ObjectStats::file("id:mock", path.clone(), size))
        }

        async fn read_object(&self, path: &MediaPath, _params: &ReadParams) -> Result<Bytes> {
            Err(Error::NotFound(path.to_string()))
        }

        async fn write_object(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats> {
            Ok(ObjectStats::file("id:mock", path.clone(), data.len() as u64))
        }

        async fn remove_object(&self, _path: &MediaPath) -> Result<()> {
            Ok(())
        }

        async fn stat_object(&self, path: &MediaPath) -> Result<ObjectStats> {
            Err(Error::NotFound(path.to_string()))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Pause,
        Resume,
    }

    /// Source replaying a fixed script.
    ///
    /// While paused it holds back `Data` but still delivers `End`/`Error`.
    struct ScriptedSource {
        events: VecDeque<SourceEvent>,
        paused: bool,
        calls: Vec<Call>,
    }

    impl ScriptedSource {
        fn new(events: Vec<SourceEvent>) -> Self {
            Self {
                events: events.into(),
                paused: false,
                calls: Vec::new(),
            }
        }

        fn chunks(chunks: &[&'static str]) -> Self {
            let mut events: Vec<SourceEvent> = chunks
                .iter()
                .map(|c| SourceEvent::Data(Bytes::from_static(c.as_bytes())))
                .collect();
            events.push(SourceEvent::End);
            Self::new(events)
        }
    }

    #[async_trait]
    impl ChunkSource for ScriptedSource {
        fn pause(&mut self) {
            self.paused = true;
            self.calls.push(Call::Pause);
        }

        fn resume(&mut self) {
            self.paused = false;
            self.calls.push(Call::Resume);
        }

        async fn next_event(&mut self) -> SourceEvent {
            let hold = match self.events.front() {
                None => true,
                Some(SourceEvent::Data(_)) => self.paused,
                Some(_) => false,
            };
            if hold {
                return futures::future::pending().await;
            }
            self.events.pop_front().unwrap_or(SourceEvent::End)
        }
    }

    fn target() -> MediaPath {
        MediaPath::parse("path/x").unwrap()
    }

    async fn run(client: Arc<MockClient>, source: &mut ScriptedSource) -> Result<ObjectStats> {
        UploadCoordinator::new(client)
            .upload_stream(source, &target(), &UploadOptions::default())
            .await
    }

    #[tokio::test]
    async fn test_two_chunks_then_end() {
        let client = Arc::new(MockClient::default());
        let mut source = ScriptedSource::chunks(&["AAA", "BBB"]);

        let stats = run(client.clone(), &mut source).await.unwrap();

        assert_eq!(stats.size, Some(6));
        let chunks: Vec<Bytes> =
            client.chunk_calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(chunks, vec![Bytes::from("AAA"), Bytes::from("BBB")]);
        assert_eq!(client.chunk_cursors(), vec![None, Some(Cursor::new("c1"))]);

        let finalize = client.finalize_calls.lock().unwrap().clone();
        assert_eq!(finalize, vec![(target(), Some(Cursor::new("c2")))]);
    }

    #[tokio::test]
    async fn test_pause_resume_alternate() {
        let client = Arc::new(MockClient::default());
        let mut source = ScriptedSource::chunks(&["a", "b", "c"]);

        run(client, &mut source).await.unwrap();

        assert_eq!(
            source.calls,
            vec![
                Call::Pause,
                Call::Resume,
                Call::Pause,
                Call::Resume,
                Call::Pause,
                Call::Resume
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_source_finalizes_once_without_cursor() {
        let client = Arc::new(MockClient::default());
        let mut source = ScriptedSource::new(vec![SourceEvent::End]);

        let stats = run(client.clone(), &mut source).await.unwrap();

        assert_eq!(stats.size, Some(0));
        assert!(client.chunk_calls.lock().unwrap().is_empty());
        let finalize = client.finalize_calls.lock().unwrap().clone();
        assert_eq!(finalize, vec![(target(), None)]);
        assert!(source.calls.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_error_skips_finalize() {
        let client = Arc::new(MockClient {
            fail_chunk: Some(1),
            ..Default::default()
        });
        let mut source = ScriptedSource::chunks(&["AAA"]);

        let err = run(client.clone(), &mut source).await.unwrap_err();

        assert!(matches!(err, Error::Transport(msg) if msg == "chunk 1 rejected"));
        assert_eq!(client.finalize_count(), 0);
        // paused and never resumed
        assert_eq!(source.calls, vec![Call::Pause]);
    }

    #[tokio::test]
    async fn test_later_chunk_error_stops_consuming() {
        let client = Arc::new(MockClient {
            fail_chunk: Some(2),
            ..Default::default()
        });
        let mut source = ScriptedSource::chunks(&["a", "b", "c"]);

        assert!(run(client.clone(), &mut source).await.is_err());

        assert_eq!(client.chunk_calls.lock().unwrap().len(), 2);
        assert_eq!(client.finalize_count(), 0);
        // "c" and the end signal were never consumed
        assert_eq!(source.events.len(), 2);
    }

    #[tokio::test]
    async fn test_end_while_chunk_in_flight_defers_finalize() {
        let client = Arc::new(MockClient {
            yield_on_chunk: true,
            ..Default::default()
        });
        let mut source = ScriptedSource::chunks(&["AAA"]);

        let stats = run(client.clone(), &mut source).await.unwrap();

        assert_eq!(stats.size, Some(3));
        let finalize = client.finalize_calls.lock().unwrap().clone();
        assert_eq!(finalize, vec![(target(), Some(Cursor::new("c1")))]);
        assert_eq!(source.calls, vec![Call::Pause, Call::Resume]);
    }

    #[tokio::test]
    async fn test_source_error_while_chunk_in_flight() {
        let client = Arc::new(MockClient {
            yield_on_chunk: true,
            ..Default::default()
        });
        let mut source = ScriptedSource::new(vec![
            SourceEvent::Data(Bytes::from("AAA")),
            SourceEvent::Error(Error::Source("producer crashed".to_string())),
        ]);

        let err = run(client.clone(), &mut source).await.unwrap_err();

        assert!(matches!(err, Error::Source(msg) if msg == "producer crashed"));
        assert_eq!(client.finalize_count(), 0);
        assert_eq!(source.calls, vec![Call::Pause]);
    }

    #[tokio::test]
    async fn test_source_error_before_data() {
        let client = Arc::new(MockClient::default());
        let mut source =
            ScriptedSource::new(vec![SourceEvent::Error(Error::Source("closed".to_string()))]);

        assert!(run(client.clone(), &mut source).await.is_err());
        assert!(client.chunk_calls.lock().unwrap().is_empty());
        assert_eq!(client.finalize_count(), 0);
    }

    #[tokio::test]
    async fn test_finalize_error_propagates() {
        let client = Arc::new(MockClient {
            finalize_error: true,
            ..Default::default()
        });
        let mut source = ScriptedSource::chunks(&["AAA"]);

        let err = run(client.clone(), &mut source).await.unwrap_err();

        assert!(matches!(err, Error::Transport(msg) if msg == "commit refused"));
        assert_eq!(client.finalize_count(), 1);
    }

    #[tokio::test]
    async fn test_root_target_rejected_before_any_call() {
        let client = Arc::new(MockClient::default());
        let mut source = ScriptedSource::chunks(&["AAA"]);

        let err = UploadCoordinator::new(client.clone())
            .upload_stream(&mut source, &MediaPath::root(), &UploadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(client.chunk_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_source_against_memory_store() {
        let store = Arc::new(MemoryStore::new());
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from("hello ")),
            Ok(Bytes::from("chunked ")),
            Ok(Bytes::from("world")),
        ];
        let mut source = StreamSource::new(stream::iter(items));
        let path = MediaPath::parse("/media/greeting.txt").unwrap();

        let stats = UploadCoordinator::new(store.clone())
            .upload_stream(&mut source, &path, &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.size, Some(19));
        let content = store.read_object(&path, &ReadParams::default()).await.unwrap();
        assert_eq!(content, Bytes::from("hello chunked world"));
    }

    proptest! {
        #[test]
        fn prop_cursor_chain_is_strict(
            chunks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..16),
                0..12,
            )
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let client = Arc::new(MockClient::default());
            let mut events: Vec<SourceEvent> = chunks
                .iter()
                .map(|c| SourceEvent::Data(Bytes::from(c.clone())))
                .collect();
            events.push(SourceEvent::End);
            let mut source = ScriptedSource::new(events);

            runtime.block_on(run(client.clone(), &mut source)).unwrap();

            let n = chunks.len();
            let expected: Vec<Option<Cursor>> = (0..n)
                .map(|i| if i == 0 { None } else { Some(Cursor::new(format!("c{}", i))) })
                .collect();
            prop_assert_eq!(client.chunk_cursors(), expected);

            let last = if n == 0 { None } else { Some(Cursor::new(format!("c{}", n))) };
            let finalize = client.finalize_calls.lock().unwrap().clone();
            prop_assert_eq!(finalize, vec![(target(), last)]);
        }
    }
}
