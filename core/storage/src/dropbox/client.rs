//! Dropbox HTTP API v2 client.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use dropmedia_common::{Error, MediaPath, Result};

use crate::remote::{Cursor, ObjectStats, ReadParams, RemoteStoreClient};

use super::settings::DropboxSettings;

/// Header carrying JSON arguments for content endpoints.
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Upload session cursor as Dropbox models it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SessionCursor {
    session_id: String,
    offset: u64,
}

impl SessionCursor {
    fn decode(cursor: &Cursor) -> Result<Self> {
        let malformed = || Error::InvalidInput(format!("Malformed Dropbox upload cursor: {}", cursor));
        let (session_id, offset) = cursor.as_str().rsplit_once(':').ok_or_else(malformed)?;
        if session_id.is_empty() {
            return Err(malformed());
        }
        let offset = offset.parse().map_err(|_| malformed())?;
        Ok(Self {
            session_id: session_id.to_string(),
            offset,
        })
    }

    fn encode(&self) -> Cursor {
        Cursor::new(format!("{}:{}", self.session_id, self.offset))
    }

    fn advanced(mut self, by: usize) -> Self {
        self.offset += by as u64;
        self
    }
}

#[derive(Serialize)]
struct StartArg {
    close: bool,
}

#[derive(Deserialize)]
struct StartResult {
    session_id: String,
}

#[derive(Serialize)]
struct AppendArg<'a> {
    cursor: &'a SessionCursor,
    close: bool,
}

#[derive(Serialize)]
struct CommitInfo<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
    mute: bool,
}

impl<'a> CommitInfo<'a> {
    fn overwrite(path: &'a str) -> Self {
        Self {
            path,
            mode: "overwrite",
            autorename: false,
            mute: true,
        }
    }
}

#[derive(Serialize)]
struct FinishArg<'a> {
    cursor: &'a SessionCursor,
    commit: CommitInfo<'a>,
}

#[derive(Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

/// Metadata returned by Dropbox for an entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
pub enum EntryMetadata {
    File(FileMetadata),
    Folder(FolderMetadata),
    Deleted(DeletedMetadata),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
    pub size: u64,
    pub rev: String,
    pub server_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedMetadata {
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
}

#[derive(Deserialize)]
struct DeleteResult {
    #[allow(dead_code)]
    metadata: EntryMetadata,
}

impl FileMetadata {
    fn into_stats(self, requested: &MediaPath) -> ObjectStats {
        ObjectStats {
            id: self.id,
            path: display_path(self.path_display.as_deref(), requested),
            size: Some(self.size),
            revision: Some(self.rev),
            modified: self.server_modified,
            is_directory: false,
        }
    }
}

impl EntryMetadata {
    fn into_stats(self, requested: &MediaPath) -> Result<ObjectStats> {
        match self {
            EntryMetadata::File(file) => Ok(file.into_stats(requested)),
            EntryMetadata::Folder(folder) => Ok(ObjectStats {
                id: folder.id,
                path: display_path(folder.path_display.as_deref(), requested),
                size: None,
                revision: None,
                modified: Utc::now(),
                is_directory: true,
            }),
            EntryMetadata::Deleted(deleted) => Err(Error::NotFound(format!(
                "{} was deleted",
                deleted.path_display.unwrap_or(deleted.name)
            ))),
        }
    }
}

fn display_path(path_display: Option<&str>, requested: &MediaPath) -> MediaPath {
    path_display
        .and_then(|p| MediaPath::parse(p).ok())
        .unwrap_or_else(|| requested.clone())
}

/// Encode an argument for the `Dropbox-API-Arg` header.
///
/// HTTP headers must be ASCII, so non-ASCII characters are written as JSON
/// `\uXXXX` escapes.
fn header_arg<T: Serialize>(arg: &T) -> Result<String> {
    let json = serde_json::to_string(arg)?;
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(out)
}

/// Map a failed Dropbox response to an error kind.
fn api_error(status: StatusCode, what: &str, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => {
            Error::Configuration(format!("Dropbox rejected the access token: {}", body))
        }
        StatusCode::CONFLICT => {
            let summary = serde_json::from_str::<ApiErrorBody>(body)
                .map(|e| e.error_summary)
                .unwrap_or_else(|_| body.to_string());
            if summary.contains("not_found") {
                Error::NotFound(format!("{}: {}", what, summary))
            } else {
                Error::Transport(format!("{} failed: {}", what, summary))
            }
        }
        _ => Error::Transport(format!("{} failed: {} - {}", what, status, body)),
    }
}

/// Dropbox API client bound to one account.
pub struct DropboxClient {
    http: Client,
    settings: DropboxSettings,
    api_base: Url,
    content_base: Url,
}

impl DropboxClient {
    /// Create a new client.
    ///
    /// # Errors
    /// - `Configuration` if the settings are invalid
    pub fn new(settings: DropboxSettings) -> Result<Self> {
        settings.validate()?;

        let http = Client::builder()
            .user_agent(concat!("dropmedia/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: settings.api_base()?,
            content_base: settings.content_base()?,
            settings,
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.settings.access_token)
    }

    fn endpoint(base: &Url, name: &str) -> Result<Url> {
        base.join(name)
            .map_err(|e| Error::Configuration(format!("Invalid endpoint {}: {}", name, e)))
    }

    /// Call a content endpoint: argument in a header, payload in the body.
    async fn content_call<A: Serialize>(
        &self,
        name: &str,
        arg: &A,
        body: Bytes,
    ) -> Result<Response> {
        let url = Self::endpoint(&self.content_base, name)?;
        debug!("POST {} ({} bytes)", name, body.len());

        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, self.auth_header())
            .header(API_ARG_HEADER, header_arg(arg)?)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{} request failed: {}", name, e)))?;

        Self::check(response, name).await
    }

    /// Call an RPC endpoint with a JSON argument and JSON result.
    async fn rpc_call<A: Serialize, T: DeserializeOwned>(&self, name: &str, arg: &A) -> Result<T> {
        let url = Self::endpoint(&self.api_base, name)?;
        debug!("POST {}", name);

        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, self.auth_header())
            .json(arg)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{} request failed: {}", name, e)))?;

        Self::json(Self::check(response, name).await?, name).await
    }

    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, what, &body))
    }

    async fn json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Failed to parse {} response: {}", what, e)))
    }

    /// Single-shot upload used for small writes and empty objects.
    async fn upload(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats> {
        let target = path.to_string_path();
        let response = self
            .content_call("files/upload", &CommitInfo::overwrite(&target), data)
            .await?;
        let file: FileMetadata = Self::json(response, "files/upload").await?;
        Ok(file.into_stats(path))
    }
}

#[async_trait]
impl RemoteStoreClient for DropboxClient {
    fn name(&self) -> &str {
        "dropbox"
    }

    async fn upload_chunk(&self, chunk: Bytes, cursor: Option<Cursor>) -> Result<Cursor> {
        let len = chunk.len();

        let session = match cursor {
            None => {
                let response = self
                    .content_call("files/upload_session/start", &StartArg { close: false }, chunk)
                    .await?;
                let started: StartResult =
                    Self::json(response, "files/upload_session/start").await?;
                debug!("Opened Dropbox upload session {}", started.session_id);
                SessionCursor {
                    session_id: started.session_id,
                    offset: 0,
                }
            }
            Some(cursor) => {
                let session = SessionCursor::decode(&cursor)?;
                let arg = AppendArg {
                    cursor: &session,
                    close: false,
                };
                self.content_call("files/upload_session/append_v2", &arg, chunk)
                    .await?;
                session
            }
        };

        Ok(session.advanced(len).encode())
    }

    async fn finalize_upload(
        &self,
        path: &MediaPath,
        cursor: Option<Cursor>,
    ) -> Result<ObjectStats> {
        let Some(cursor) = cursor else {
            // Dropbox has no empty upload session
            return self.upload(path, Bytes::new()).await;
        };

        let session = SessionCursor::decode(&cursor)?;
        let target = path.to_string_path();
        let arg = FinishArg {
            cursor: &session,
            commit: CommitInfo::overwrite(&target),
        };
        let response = self
            .content_call("files/upload_session/finish", &arg, Bytes::new())
            .await?;
        let file: FileMetadata = Self::json(response, "files/upload_session/finish").await?;
        Ok(file.into_stats(path))
    }

    async fn read_object(&self, path: &MediaPath, params: &ReadParams) -> Result<Bytes> {
        let target = match &params.revision {
            Some(rev) => format!("rev:{}", rev),
            None => path.to_string_path(),
        };
        let response = self
            .content_call("files/download", &PathArg { path: &target }, Bytes::new())
            .await?;

        response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read download of {}: {}", path, e)))
    }

    async fn write_object(&self, path: &MediaPath, data: Bytes) -> Result<ObjectStats> {
        self.upload(path, data).await
    }

    async fn remove_object(&self, path: &MediaPath) -> Result<()> {
        let target = path.to_string_path();
        let _: DeleteResult = self
            .rpc_call("files/delete_v2", &PathArg { path: &target })
            .await?;
        Ok(())
    }

    async fn stat_object(&self, path: &MediaPath) -> Result<ObjectStats> {
        let target = path.to_string_path();
        let entry: EntryMetadata = self
            .rpc_call("files/get_metadata", &PathArg { path: &target })
            .await?;
        entry.into_stats(path)
    }
}
