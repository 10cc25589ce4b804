//! Folder domain entity
//!
//! A Folder mirrors one drive folder submitted for ingestion. Its two
//! counters carry the processing progress invariant:
//!
//! - `processed_images <= total_images` always
//! - `status == Completed` exactly when `total_images > 0` and
//!   `processed_images == total_images`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::newtypes::{DriveFolderId, FolderId, UserId};

/// Processing status of a folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    /// Submitted, no worker has picked it up yet
    #[default]
    Pending,
    /// A folder job or at least one image job is in flight
    Processing,
    /// Every image in the folder reached a terminal caption
    Completed,
    /// The folder job itself failed (listing, enumeration, fatal error)
    Failed,
}

impl FolderStatus {
    /// Returns the status name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderStatus::Pending => "pending",
            FolderStatus::Processing => "processing",
            FolderStatus::Completed => "completed",
            FolderStatus::Failed => "failed",
        }
    }

    /// Parse a stored status string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FolderStatus::Pending),
            "processing" => Some(FolderStatus::Processing),
            "completed" => Some(FolderStatus::Completed),
            "failed" => Some(FolderStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if work may still be scheduled for this folder
    pub fn is_open(&self) -> bool {
        matches!(self, FolderStatus::Pending | FolderStatus::Processing)
    }
}

impl fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A drive folder registered for ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    /// Internal row id
    pub id: FolderId,
    /// Drive-assigned folder id, unique across the corpus
    pub drive_folder_id: DriveFolderId,
    /// Folder name as discovered from drive metadata (None until discovered)
    pub name: Option<String>,
    /// The URL the folder was originally submitted with
    pub origin_url: String,
    /// Owning user, when the submission was authenticated
    pub user_id: Option<UserId>,
    /// Processing status
    pub status: FolderStatus,
    /// Number of admitted images discovered in the folder tree
    pub total_images: i32,
    /// Number of images that reached `completed`
    pub processed_images: i32,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    /// Returns true if the progress counters satisfy the completion rule
    pub fn counts_complete(&self) -> bool {
        self.total_images > 0 && self.processed_images == self.total_images
    }

    /// Fraction of images processed, in [0, 1]
    pub fn progress_ratio(&self) -> f64 {
        if self.total_images <= 0 {
            return 0.0;
        }
        f64::from(self.processed_images) / f64::from(self.total_images)
    }
}
