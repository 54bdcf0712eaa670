//! Dropbox v2 HTTP adapter for [`RemoteStore`].
//!
//! RPC endpoints (`list_folder`) take a JSON body on the API host; content
//! endpoints (`upload`, `upload_session/*`) take raw bytes on the content host
//! with the JSON argument in the `Dropbox-API-Arg` header. Errors come back as
//! HTTP 409 with an `error_summary` such as `path/not_found/..`.

use std::fmt::{self, Write as _};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::store::{RemoteError, RemoteStore, UploadCursor};

/// Default RPC host.
pub const DEFAULT_API_BASE_URL: &str = "https://api.dropboxapi.com";

/// Default content (upload) host.
pub const DEFAULT_CONTENT_BASE_URL: &str = "https://content.dropboxapi.com";

/// Per-request timeout; large session chunks can take minutes.
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Connection settings for [`DropboxStore`].
#[derive(Clone)]
pub struct DropboxConfig {
    pub access_token: String,
    pub api_base_url: String,
    pub content_base_url: String,
    pub timeout: Duration,
}

impl DropboxConfig {
    /// Production endpoints with the default timeout.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            content_base_url: DEFAULT_CONTENT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Points both hosts at `base_url` (used against mock servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        self.api_base_url.clone_from(&base);
        self.content_base_url = base;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for DropboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropboxConfig")
            .field("access_token", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("content_base_url", &self.content_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Error payload of a failed Dropbox call.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: String,
    #[serde(default)]
    error: Value,
}

/// A non-success response, kept raw until the caller maps it.
#[derive(Debug)]
struct ApiFailure {
    endpoint: &'static str,
    status: u16,
    summary: String,
    error: Value,
}

impl ApiFailure {
    fn is(&self, prefix: &str) -> bool {
        self.summary.starts_with(prefix)
    }

    fn mentions(&self, tag: &str) -> bool {
        self.summary.contains(tag)
    }

    /// `correct_offset` from an `incorrect_offset` error, wherever it is nested.
    fn correct_offset(&self) -> Option<u64> {
        find_u64(&self.error, "correct_offset")
    }

    fn into_remote(self) -> RemoteError {
        RemoteError::api(self.endpoint, self.status, self.summary)
    }
}

enum CallError {
    Remote(RemoteError),
    Api(ApiFailure),
}

impl From<RemoteError> for CallError {
    fn from(error: RemoteError) -> Self {
        Self::Remote(error)
    }
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<Entry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SessionStartResult {
    session_id: String,
}

/// [`RemoteStore`] backed by the Dropbox v2 HTTP API.
#[derive(Debug, Clone)]
pub struct DropboxStore {
    client: Client,
    config: DropboxConfig,
}

impl DropboxStore {
    /// Creates a store with its own HTTP client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(config: DropboxConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(crate::download::USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client, config }
    }

    fn rpc(&self, endpoint: &str, body: &Value) -> RequestBuilder {
        self.client
            .post(format!("{}{endpoint}", self.config.api_base_url))
            .bearer_auth(&self.config.access_token)
            .json(body)
    }

    fn content(&self, endpoint: &str, arg: &Value, bytes: Vec<u8>) -> RequestBuilder {
        self.client
            .post(format!("{}{endpoint}", self.config.content_base_url))
            .bearer_auth(&self.config.access_token)
            .header(API_ARG_HEADER, header_safe_json(arg))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, CallError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::transport(endpoint, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::transport(endpoint, e))?;

        if !status.is_success() {
            let (summary, error) = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => (body.error_summary, body.error),
                Err(_) => (text, Value::Null),
            };
            debug!(endpoint, status = status.as_u16(), %summary, "dropbox call failed");
            return Err(CallError::Api(ApiFailure {
                endpoint,
                status: status.as_u16(),
                summary,
                error,
            }));
        }

        // append_v2 answers with `null`; treat an empty body the same way
        let text = if text.trim().is_empty() { "null" } else { &text };
        serde_json::from_str(text)
            .map_err(|e| CallError::Remote(RemoteError::decode(endpoint, e.to_string())))
    }
}

#[async_trait]
impl RemoteStore for DropboxStore {
    #[instrument(skip(self))]
    async fn list_folder(&self, folder: &str) -> Result<Vec<String>, RemoteError> {
        const LIST: &str = "/2/files/list_folder";
        const CONTINUE: &str = "/2/files/list_folder/continue";

        let body = json!({ "path": api_path(folder), "recursive": false });
        let mut page: ListFolderResult = match self.send(LIST, self.rpc(LIST, &body)).await {
            Ok(page) => page,
            Err(CallError::Api(failure)) if failure.is("path/not_found") => {
                return Err(RemoteError::FolderNotFound {
                    path: folder.to_string(),
                });
            }
            Err(CallError::Api(failure)) => return Err(failure.into_remote()),
            Err(CallError::Remote(error)) => return Err(error),
        };

        let mut names = Vec::new();
        loop {
            names.extend(
                page.entries
                    .into_iter()
                    .filter(|entry| entry.tag != "deleted")
                    .map(|entry| entry.name),
            );
            if !page.has_more {
                break;
            }
            let body = json!({ "cursor": page.cursor });
            page = self
                .send(CONTINUE, self.rpc(CONTINUE, &body))
                .await
                .map_err(CallError::into_remote)?;
        }

        debug!(entries = names.len(), "listed remote folder");
        Ok(names)
    }

    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn upload_whole(&self, bytes: Vec<u8>, path: &str) -> Result<(), RemoteError> {
        const UPLOAD: &str = "/2/files/upload";

        let arg = commit_info(path);
        self.send::<Value>(UPLOAD, self.content(UPLOAD, &arg, bytes))
            .await
            .map(drop)
            .map_err(|e| commit_error(e, path))
    }

    #[instrument(skip(self, first_chunk), fields(bytes = first_chunk.len()))]
    async fn start_session(&self, first_chunk: Vec<u8>) -> Result<String, RemoteError> {
        const START: &str = "/2/files/upload_session/start";

        let arg = json!({ "close": false });
        let started: SessionStartResult = self
            .send(START, self.content(START, &arg, first_chunk))
            .await
            .map_err(CallError::into_remote)?;
        Ok(started.session_id)
    }

    #[instrument(skip(self, chunk), fields(bytes = chunk.len(), session = %cursor.session_id, offset = cursor.offset))]
    async fn append_chunk(
        &self,
        chunk: Vec<u8>,
        cursor: &UploadCursor,
    ) -> Result<u64, RemoteError> {
        const APPEND: &str = "/2/files/upload_session/append_v2";

        let len = chunk.len() as u64;
        let arg = json!({ "cursor": cursor_json(cursor), "close": false });
        self.send::<Value>(APPEND, self.content(APPEND, &arg, chunk))
            .await
            .map_err(|e| offset_error(e, cursor))?;
        Ok(cursor.offset + len)
    }

    #[instrument(skip(self, chunk), fields(bytes = chunk.len(), session = %cursor.session_id, offset = cursor.offset))]
    async fn finish_session(
        &self,
        chunk: Vec<u8>,
        cursor: &UploadCursor,
        path: &str,
    ) -> Result<(), RemoteError> {
        const FINISH: &str = "/2/files/upload_session/finish";

        let arg = json!({ "cursor": cursor_json(cursor), "commit": commit_info(path) });
        match self.send::<Value>(FINISH, self.content(FINISH, &arg, chunk)).await {
            Ok(_) => Ok(()),
            Err(CallError::Api(failure)) if failure.mentions("incorrect_offset") => {
                Err(offset_error(CallError::Api(failure), cursor))
            }
            Err(other) => Err(commit_error(other, path)),
        }
    }
}

impl CallError {
    fn into_remote(self) -> RemoteError {
        match self {
            Self::Remote(error) => error,
            Self::Api(failure) => failure.into_remote(),
        }
    }
}

fn commit_error(error: CallError, path: &str) -> RemoteError {
    match error {
        CallError::Api(failure) if failure.mentions("conflict") => RemoteError::CommitRejected {
            path: path.to_string(),
            reason: failure.summary,
        },
        other => other.into_remote(),
    }
}

fn offset_error(error: CallError, cursor: &UploadCursor) -> RemoteError {
    match error {
        CallError::Api(failure) if failure.mentions("incorrect_offset") => {
            match failure.correct_offset() {
                Some(actual) => RemoteError::OffsetMismatch {
                    session_id: cursor.session_id.clone(),
                    expected: cursor.offset,
                    actual,
                },
                None => failure.into_remote(),
            }
        }
        other => other.into_remote(),
    }
}

fn commit_info(path: &str) -> Value {
    json!({ "path": path, "mode": "add", "autorename": false, "mute": false })
}

fn cursor_json(cursor: &UploadCursor) -> Value {
    json!({ "session_id": cursor.session_id, "offset": cursor.offset })
}

/// The API spells the root folder as the empty string.
fn api_path(path: &str) -> &str {
    if path == "/" { "" } else { path }
}

/// Serializes `value` with every non-ASCII character as a `\uXXXX` escape.
///
/// HTTP header values must be ASCII; non-ASCII only occurs inside JSON
/// strings, where the escape is equivalent.
fn header_safe_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

fn find_u64(value: &Value, key: &str) -> Option<u64> {
    match value {
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_u64)
            .or_else(|| map.values().find_map(|v| find_u64(v, key))),
        _ => None,
    }
}
