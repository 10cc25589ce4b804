//! Idempotency key construction
//!
//! Key shapes:
//!
//! - folder job: `folder:{driveFolderId}:{enqueueUnixMs}` — the timestamp
//!   suffix allows a deliberate re-enqueue after sync discovers new items
//! - image job: `image:{driveFileId}:{versionToken}` — a mutated file gets
//!   a fresh key, a re-enqueue of the same revision deduplicates
//! - batch job: `batch:{folderId}:{enqueueUnixMs}:{random}`

use chrono::Utc;
use drivelens_core::domain::newtypes::{DriveFileId, DriveFolderId, FolderId};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Key for a folder enumeration job
pub fn folder_job_key(drive_folder_id: &DriveFolderId) -> String {
    format!(
        "folder:{}:{}",
        drive_folder_id.as_str(),
        Utc::now().timestamp_millis()
    )
}

/// Key for a single-image job; `version_key` is the image's revision
/// marker (or its stable fallback)
pub fn image_job_key(drive_file_id: &DriveFileId, version_key: &str) -> String {
    format!("image:{}:{}", drive_file_id.as_str(), version_key)
}

/// Key for an image-batch job
pub fn batch_job_key(folder_id: &FolderId) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "batch:{}:{}:{}",
        folder_id,
        Utc::now().timestamp_millis(),
        random
    )
}
