//! Pausable chunk sources feeding an upload.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use dropmedia_common::{Error, Result};

use super::session::SessionEvent;

/// One signal from a content source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A chunk of content.
    Data(Bytes),
    /// No more data will follow.
    End,
    /// The producer failed.
    Error(Error),
}

impl From<SourceEvent> for SessionEvent {
    fn from(event: SourceEvent) -> Self {
        match event {
            SourceEvent::Data(chunk) => SessionEvent::Data(chunk),
            SourceEvent::End => SessionEvent::End,
            SourceEvent::Error(err) => SessionEvent::SourceFailed(err),
        }
    }
}

/// A push-style byte source with backpressure.
///
/// While paused a source must not deliver `Data`. It may still deliver `End`
/// or `Error`; the coordinator watches for those while a chunk is in flight.
#[async_trait]
pub trait ChunkSource: Send {
    /// Stop delivering data until `resume`.
    fn pause(&mut self);

    /// Allow data delivery again.
    fn resume(&mut self);

    /// Wait for the next event.
    ///
    /// Must be cancel-safe: dropping the returned future before it completes
    /// must not lose an event.
    async fn next_event(&mut self) -> SourceEvent;
}

/// Adapts a `Stream` of byte chunks into a `ChunkSource`.
///
/// The stream is simply not polled while paused, so it never has to buffer.
/// End and errors are therefore only seen once the source is resumed.
pub struct StreamSource<S> {
    stream: S,
    paused: bool,
    finished: bool,
}

impl<S> StreamSource<S>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            paused: false,
            finished: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[async_trait]
impl<S> ChunkSource for StreamSource<S>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    async fn next_event(&mut self) -> SourceEvent {
        if self.finished {
            return SourceEvent::End;
        }
        if self.paused {
            return futures::future::pending().await;
        }

        match self.stream.next().await {
            Some(Ok(chunk)) => SourceEvent::Data(chunk),
            Some(Err(err)) => SourceEvent::Error(into_source_error(err)),
            None => {
                self.finished = true;
                SourceEvent::End
            }
        }
    }
}

/// Receiving half of an `UploadWriter`.
///
/// While paused the channel is still drained so that `End` and errors reach
/// the coordinator during a chunk upload. At most one chunk is held back
/// until `resume`; nothing further is read while it is held.
pub struct ChannelSource {
    rx: mpsc::Receiver<SourceEvent>,
    paused: bool,
    held: Option<Bytes>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<SourceEvent>) -> Self {
        Self {
            rx,
            paused: false,
            held: None,
        }
    }

    async fn recv(&mut self) -> SourceEvent {
        match self.rx.recv().await {
            Some(event) => event,
            None => SourceEvent::Error(Error::Source(
                "Writer dropped before finishing the upload".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    async fn next_event(&mut self) -> SourceEvent {
        if !self.paused {
            if let Some(chunk) = self.held.take() {
                return SourceEvent::Data(chunk);
            }
            return self.recv().await;
        }

        if self.held.is_none() {
            match self.recv().await {
                SourceEvent::Data(chunk) => self.held = Some(chunk),
                event => return event,
            }
        }
        futures::future::pending().await
    }
}

fn into_source_error(err: Error) -> Error {
    match err {
        Error::Source(_) => err,
        other => Error::Source(other.to_string()),
    }
}
