//! Image domain entity
//!
//! ## State Machine
//!
//! ```text
//!     ┌─────────┐   claimed    ┌────────────┐  caption+embed  ┌───────────┐
//!     │ Pending │ ───────────► │ Processing │ ──────────────► │ Completed │
//!     └─────────┘              └────────────┘                 └───────────┘
//!          ▲                         │                              │
//!          │                         ▼                              │
//!          │                    ┌────────┐        retry / sync      │
//!          └──────────────────  │ Failed │ ◄────── reset ───────────┘
//!                               └────────┘
//! ```
//!
//! The `pending → processing` transition doubles as the row lock: only the
//! worker that takes it may later write `completed` or `failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{DriveFileId, FolderId, ImageId, VersionToken};

/// MIME types admitted into the corpus. Anything else is skipped at
/// listing time and rejected at processing time.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/svg+xml",
];

/// Returns true if the MIME type is in the supported image set
pub fn is_supported_mime(mime: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&mime)
}

/// Processing status of an image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    /// Waiting for a worker
    #[default]
    Pending,
    /// A worker holds the row and is captioning it
    Processing,
    /// Caption, tags and vector persisted
    Completed,
    /// Permanent failure recorded on the row
    Failed,
}

impl ImageStatus {
    /// Returns the status name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Processing => "processing",
            ImageStatus::Completed => "completed",
            ImageStatus::Failed => "failed",
        }
    }

    /// Parse a stored status string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImageStatus::Pending),
            "processing" => Some(ImageStatus::Processing),
            "completed" => Some(ImageStatus::Completed),
            "failed" => Some(ImageStatus::Failed),
            _ => None,
        }
    }

    /// Returns true for the two terminal states
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImageStatus::Completed | ImageStatus::Failed)
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One drive image tracked by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Internal row id
    pub id: ImageId,
    /// Drive-assigned file id, unique across the corpus
    pub drive_file_id: DriveFileId,
    /// Owning folder
    pub folder_id: FolderId,
    /// Display name (filename on the drive)
    pub name: String,
    /// MIME type, one of [`SUPPORTED_MIME_TYPES`]
    pub mime_type: String,
    /// Last known short-lived thumbnail URL
    pub thumbnail_url: Option<String>,
    /// Human-viewable URL on the drive
    pub view_url: Option<String>,
    /// Size in bytes, when the drive reports one
    pub size_bytes: Option<i64>,
    /// Content checksum from drive metadata
    pub checksum: Option<String>,
    /// Last modification time on the drive
    pub modified_at: Option<DateTime<Utc>>,
    /// Revision marker used in job idempotency keys
    pub version_token: Option<VersionToken>,
    /// Processing status
    pub status: ImageStatus,
    /// Generated caption text (plain text, no markup)
    pub caption: Option<String>,
    /// Comma-separated tag string
    pub tags: Option<String>,
    /// Caption embedding of the deployment's fixed dimension
    pub caption_vec: Option<Vec<f32>>,
    /// Failure message when status is `failed`
    pub error: Option<String>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Image {
    /// Tags split back into a vector; empty when none are stored
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|t| t.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Version token string for idempotency keys, with a stable fallback
    /// for files whose drive metadata carries no revision marker.
    pub fn version_key(&self) -> &str {
        self.version_token
            .as_ref()
            .map(VersionToken::as_str)
            .unwrap_or("v0")
    }

    /// Checks the completion invariant: a completed image carries caption,
    /// tags and vector; any other status carries none of the three as a
    /// completed payload.
    pub fn check_completion_invariant(&self) -> Result<(), DomainError> {
        let fully_captioned =
            self.caption.is_some() && self.tags.is_some() && self.caption_vec.is_some();
        match (self.status, fully_captioned) {
            (ImageStatus::Completed, true) => Ok(()),
            (ImageStatus::Completed, false) => Err(DomainError::ValidationFailed(format!(
                "image {} is completed but missing caption, tags, or vector",
                self.id
            ))),
            (_, true) => Err(DomainError::ValidationFailed(format!(
                "image {} carries a full caption payload but is {}",
                self.id, self.status
            ))),
            _ => Ok(()),
        }
    }
}
