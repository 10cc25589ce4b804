//! Drive provider port (cloud storage adapter interface)
//!
//! The production implementation targets the Google Drive v3 API. The
//! trait surface is what the workers and the ingest path need: folder URL
//! parsing, recursive image enumeration, byte download, and thumbnail
//! resolution. Rate limiting is the adapter's responsibility; callers
//! never see a 429.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{DriveFileId, DriveFolderId, VersionToken};

/// A per-request user credential (OAuth bearer token for the drive)
///
/// Threaded explicitly through job payloads rather than held as ambient
/// process state; absent credential means service-key access to public
/// folders only. The Debug impl redacts the token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserCredential(String);

impl UserCredential {
    /// Wrap a bearer token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw bearer token
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserCredential(***)")
    }
}

/// Metadata for one admitted image file, as listed from the drive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveFile {
    /// Drive-assigned file id
    pub id: DriveFileId,
    /// Filename on the drive
    pub name: String,
    /// MIME type (always in the supported set when produced by listing)
    pub mime_type: String,
    /// Short-lived thumbnail URL from file metadata
    pub thumbnail_url: Option<String>,
    /// Human-viewable URL
    pub view_url: Option<String>,
    /// File size in bytes
    pub size: Option<i64>,
    /// Content checksum from drive metadata
    pub checksum: Option<String>,
    /// Last modification time on the drive
    pub modified_at: Option<DateTime<Utc>>,
    /// Revision marker for idempotency keys
    pub version_token: Option<VersionToken>,
}

/// Result of a recursive folder enumeration
#[derive(Debug, Clone, Default)]
pub struct FolderListing {
    /// Name of the root folder, when its metadata was readable
    pub folder_name: Option<String>,
    /// Every admitted image in the folder tree
    pub images: Vec<DriveFile>,
}

/// Errors surfaced by the drive adapter
#[derive(Debug, Error, Clone)]
pub enum DriveError {
    /// The submitted URL is not a recognized drive folder URL
    #[error("Invalid drive folder URL: {0}")]
    InvalidUrl(String),

    /// The drive answered 403/404; message distinguishes whether a user
    /// credential was supplied
    #[error("{0}")]
    PermissionDenied(String),

    /// Download failed after all attempts, including the alternative
    /// endpoint fallback
    #[error("Download failed for {file_id}: {reason}")]
    DownloadFailed {
        /// File that could not be fetched
        file_id: String,
        /// Last error observed
        reason: String,
    },

    /// No thumbnail could be resolved for the file
    #[error("Thumbnail not available for {0}")]
    ThumbnailUnavailable(String),

    /// Network failure, timeout, or 5xx; safe to retry via the queue
    #[error("Transient drive error: {0}")]
    Transient(String),
}

impl DriveError {
    /// Returns true if the queue should retry the enclosing job
    pub fn is_transient(&self) -> bool {
        matches!(self, DriveError::Transient(_) | DriveError::DownloadFailed { .. })
    }
}

/// Port trait for drive operations
#[async_trait::async_trait]
pub trait DriveProvider: Send + Sync {
    /// Extracts the drive folder id from a shared-folder URL
    ///
    /// Accepts `/drive/folders/{id}`, `/drive/u/{n}/folders/{id}` and
    /// `/open?id={id}` on the drive host; rejects everything else.
    fn parse_folder_url(&self, url: &str) -> Result<DriveFolderId, DriveError>;

    /// Walks the folder tree and returns every admitted image
    ///
    /// Traverses subfolders, paginating every level until exhausted.
    /// Files outside the supported MIME set are skipped silently.
    async fn list_images_recursive(
        &self,
        folder_id: &DriveFolderId,
        credential: Option<&UserCredential>,
    ) -> Result<FolderListing, DriveError>;

    /// Downloads the raw bytes of a file
    ///
    /// Retries internally with backoff and jitter; acquires the drive
    /// limiter for every attempt.
    async fn download_bytes(
        &self,
        file_id: &DriveFileId,
        credential: Option<&UserCredential>,
    ) -> Result<Vec<u8>, DriveError>;

    /// Resolves a fresh short-lived thumbnail URL at the requested size
    ///
    /// `size` is clamped to [32, 1600]. Callers must treat the URL as
    /// expiring and re-resolve on fetch failure.
    async fn fresh_thumbnail_url(
        &self,
        file_id: &DriveFileId,
        size: u32,
        credential: Option<&UserCredential>,
    ) -> Result<String, DriveError>;

    /// Fetches thumbnail bytes plus content type, via the adapter's
    /// bounded-TTL cache
    async fn fetch_thumbnail(
        &self,
        file_id: &DriveFileId,
        size: u32,
        credential: Option<&UserCredential>,
    ) -> Result<(Vec<u8>, String), DriveError>;
}
