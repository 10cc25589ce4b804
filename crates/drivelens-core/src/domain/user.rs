//! User and scan-receipt entities
//!
//! Users are optional: anonymous submissions create folders with no owner.
//! Scan receipts record which user scanned which drive folder so a repeat
//! submission short-circuits to a sync instead of a fresh ingest, and a
//! user can drop a folder from their view without deleting shared rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{DriveFolderId, UserId};

/// An authenticated submitter of folders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal row id
    pub id: UserId,
    /// External authentication id (subject claim of the auth provider)
    pub auth_id: String,
    /// Email, when the auth provider supplies one
    pub email: Option<String>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
}

/// Record of a (user, drive folder) scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReceipt {
    /// Scanning user
    pub user_id: UserId,
    /// Scanned drive folder
    pub drive_folder_id: DriveFolderId,
    /// When the scan happened (updated on re-scan)
    pub scanned_at: DateTime<Utc>,
    /// Set when the user removed the folder from their view
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ScanReceipt {
    /// Returns true if the receipt is still live for the user
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}
