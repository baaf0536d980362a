//! In-memory remote store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use dropmedia_common::{Error, MediaPath, Result};

use crate::remote::{Cursor, ObjectStats, ReadParams, RemoteStoreClient};

/// One stored object with its revision history (oldest first).
#[derive(Debug, Clone)]
struct Entry {
    revisions: Vec<(String, Bytes)>,
    stats: ObjectStats,
}

/// In-memory remote store.
///
/// Useful for testing and development. Upload sessions behave like a real
/// chunked-upload API: each cursor names a session and the byte offset it
/// expects next, and stale cursors are rejected. All data is lost on drop.
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Entry>>,
    sessions: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn path_to_key(path: &MediaPath) -> String {
        path.to_string_path()
    }

    /// Number of upload sessions started but not finalized.
    pub async fn pending_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn commit(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats> {
        if path.is_root() {
            return Err(Error::InvalidInput("Cannot write to the root path".to_string()));
        }

        let key = Self::path_to_key(path);
        let revision = Uuid::new_v4().simple().to_string();
        let mut objects = self.objects.write().await;

        let entry = objects.entry(key).or_insert_with(|| Entry {
            revisions: Vec::new(),
            stats: ObjectStats::file(format!("id:{}", Uuid::new_v4()), path.clone(), 0),
        });

        entry.stats.size = Some(data.len() as u64);
        entry.stats.revision = Some(revision.clone());
        entry.stats.modified = Utc::now();
        entry.revisions.push((revision, data));

        Ok(entry.stats.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cursor(cursor: &Cursor) -> Result<(&str, u64)> {
    let (session, offset) = cursor
        .as_str()
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidInput(format!("Malformed upload cursor: {}", cursor)))?;
    let offset = offset
        .parse()
        .map_err(|_| Error::InvalidInput(format!("Malformed upload cursor: {}", cursor)))?;
    Ok((session, offset))
}

fn check_offset(buffer: &[u8], offset: u64) -> Result<()> {
    if buffer.len() as u64 != offset {
        return Err(Error::Transport(format!(
            "Stale cursor: session is at offset {}, cursor says {}",
            buffer.len(),
            offset
        )));
    }
    Ok(())
}

#[async_trait]
impl RemoteStoreClient for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upload_chunk(&self, chunk: Bytes, cursor: Option<Cursor>) -> Result<Cursor> {
        let mut sessions = self.sessions.lock().await;

        let Some(cursor) = cursor else {
            let session = Uuid::new_v4().to_string();
            let offset = chunk.len();
            sessions.insert(session.clone(), chunk.to_vec());
            debug!("Opened upload session {}", session);
            return Ok(Cursor::new(format!("{}:{}", session, offset)));
        };

        let (session, offset) = parse_cursor(&cursor)?;
        let buffer = sessions
            .get_mut(session)
            .ok_or_else(|| Error::Transport(format!("Unknown upload session: {}", session)))?;
        check_offset(buffer, offset)?;

        buffer.extend_from_slice(&chunk);
        Ok(Cursor::new(format!("{}:{}", session, buffer.len())))
    }

    async fn finalize_upload(
        &self,
        path: &MediaPath,
        cursor: Option<Cursor>,
    ) -> Result<ObjectStats> {
        let data = match cursor {
            None => Bytes::new(),
            Some(cursor) => {
                let (session, offset) = parse_cursor(&cursor)?;
                let mut sessions = self.sessions.lock().await;
                let buffer = sessions.get(session).ok_or_else(|| {
                    Error::Transport(format!("Unknown upload session: {}", session))
                })?;
                check_offset(buffer, offset)?;
                sessions
                    .remove(session)
                    .map(Bytes::from)
                    .unwrap_or_default()
            }
        };

        self.commit(path, data).await
    }

    async fn read_object(&self, path: &MediaPath, params: &ReadParams) -> Result<Bytes> {
        let key = Self::path_to_key(path);
        let objects = self.objects.read().await;
        let entry = objects
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", path)))?;

        let found = match &params.revision {
            None => entry.revisions.last(),
            Some(rev) => entry.revisions.iter().find(|(r, _)| r == rev),
        };

        found.map(|(_, data)| data.clone()).ok_or_else(|| {
            Error::NotFound(format!(
                "Revision {} of {} not found",
                params.revision.as_deref().unwrap_or("latest"),
                path
            ))
        })
    }

    async fn write_object(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats> {
        self.commit(path, data).await
    }

    async fn remove_object(&self, path: &MediaPath) -> Result<()> {
        let key = Self::path_to_key(path);
        match self.objects.write().await.remove(&key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Object not found: {}", path))),
        }
    }

    async fn stat_object(&self, path: &MediaPath) -> Result<ObjectStats> {
        let key = Self::path_to_key(path);
        self.objects
            .read()
            .await
            .get(&key)
            .map(|entry| entry.stats.clone())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", path)))
    }
}
