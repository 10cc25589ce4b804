//! Google Drive API client
//!
//! Thin typed wrapper over `reqwest` for Drive v3 calls. Handles
//! authentication (per-request bearer credential when present, service key
//! otherwise), base-URL construction, and JSON deserialization of the file
//! resource shape. Rate limiting happens here so no caller can bypass it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use drivelens_core::domain::newtypes::{DriveFileId, VersionToken};
use drivelens_core::ports::drive::{DriveError, DriveFile, UserCredential};
use drivelens_limiter::SlidingWindowLimiter;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Base URL for the Drive v3 API
const DRIVE_API_BASE: &str = "https://www.googleapis.com";

/// Fields requested for every file resource
pub(crate) const FILE_FIELDS: &str =
    "id,name,mimeType,thumbnailLink,webViewLink,size,md5Checksum,modifiedTime,version";

// ============================================================================
// Drive API response types
// ============================================================================

/// One file resource from a list or metadata response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileResource {
    pub id: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub thumbnail_link: Option<String>,
    pub web_view_link: Option<String>,
    /// The drive serializes sizes as strings
    pub size: Option<String>,
    pub md5_checksum: Option<String>,
    pub modified_time: Option<DateTime<Utc>>,
    /// Monotonic revision counter, also serialized as a string
    pub version: Option<String>,
}

impl FileResource {
    /// Maps the wire shape to the port DTO. Returns None when the id is
    /// malformed (never observed from the real API; guards test fixtures).
    pub(crate) fn into_drive_file(self) -> Option<DriveFile> {
        let id = DriveFileId::new(self.id).ok()?;
        Some(DriveFile {
            id,
            name: self.name.unwrap_or_default(),
            mime_type: self.mime_type.unwrap_or_default(),
            thumbnail_url: self.thumbnail_link,
            view_url: self.web_view_link,
            size: self.size.and_then(|s| s.parse().ok()),
            checksum: self.md5_checksum,
            modified_at: self.modified_time,
            version_token: self.version.and_then(|v| VersionToken::new(v).ok()),
        })
    }
}

/// One page of a file list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileListPage {
    #[serde(default)]
    pub files: Vec<FileResource>,
    pub next_page_token: Option<String>,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Drive v3 calls
///
/// Holds the service key and the injected drive limiter. A custom base URL
/// points the client at a wiremock server in tests.
pub struct DriveClient {
    http: Client,
    base_url: String,
    service_key: Option<String>,
    limiter: Arc<SlidingWindowLimiter>,
}

impl DriveClient {
    /// Creates a client against the production API
    pub fn new(service_key: Option<String>, limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self::with_base_url(service_key, limiter, DRIVE_API_BASE)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(
        service_key: Option<String>,
        limiter: Arc<SlidingWindowLimiter>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            service_key,
            limiter,
        }
    }

    /// Builds an authenticated GET for an API path, applying either the
    /// per-request bearer credential or the service key
    pub(crate) fn get(
        &self,
        path: &str,
        credential: Option<&UserCredential>,
        timeout: Duration,
    ) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.get(&url).timeout(timeout);
        match credential {
            Some(cred) => builder = builder.bearer_auth(cred.token()),
            None => {
                if let Some(key) = &self.service_key {
                    builder = builder.query(&[("key", key.as_str())]);
                }
            }
        }
        builder
    }

    /// Sends a GET after acquiring the drive limiter
    pub(crate) async fn send(
        &self,
        path: &str,
        credential: Option<&UserCredential>,
        timeout: Duration,
    ) -> Result<Response, DriveError> {
        self.limiter.acquire().await;
        debug!(path, "Drive API request");
        self.get(path, credential, timeout)
            .send()
            .await
            .map_err(|e| classify_send_error(path, &e))
    }

    /// Returns a reference to the underlying HTTP client
    ///
    /// Useful for requests to absolute URLs (e.g. signed thumbnail
    /// links) rather than API paths.
    pub(crate) fn http_client(&self) -> &Client {
        &self.http
    }

    /// Maps a non-success status to the right `DriveError`
    pub(crate) fn check_status(
        response: Response,
        credential: Option<&UserCredential>,
        what: &str,
    ) -> Result<Response, DriveError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(classify_status(status, credential.is_some(), what))
    }
}

/// Transport failures are transient; the queue retry policy handles them.
fn classify_send_error(path: &str, err: &reqwest::Error) -> DriveError {
    if err.is_timeout() {
        DriveError::Transient(format!("request to {path} timed out"))
    } else {
        DriveError::Transient(format!("request to {path} failed: {err}"))
    }
}

/// Maps an HTTP status to a `DriveError`. The two permission-denied
/// messages tell the user whether signing in would help.
pub(crate) fn classify_status(status: StatusCode, had_credential: bool, what: &str) -> DriveError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            let msg = if had_credential {
                format!(
                    "Cannot access {what}: the provided account token lacks access \
                     to this folder or it no longer exists"
                )
            } else {
                format!(
                    "Cannot access {what}: the folder is private. Sign in with an \
                     account that can open it, or share it publicly"
                )
            };
            DriveError::PermissionDenied(msg)
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            DriveError::Transient(format!("{what} returned {s}"))
        }
        s => DriveError::Transient(format!("{what} returned unexpected status {s}")),
    }
}
