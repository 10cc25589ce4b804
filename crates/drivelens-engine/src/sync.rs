//! Drive synchronization engine
//!
//! Diffs a drive folder against the local corpus: inserts rows for files
//! the drive gained, deletes rows for files it lost, fixes the counters,
//! and re-queues processing when new work appeared. Rerunning with no
//! drive-side changes is a no-op.

use std::collections::HashSet;

use drivelens_core::domain::folder::FolderStatus;
use drivelens_core::domain::newtypes::{DriveFileId, FolderId};
use drivelens_core::ports::drive::{DriveFile, UserCredential};
use drivelens_core::ports::queue::{JobPayload, QueueName};
use drivelens_core::ports::store::NewImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::{DriveRef, QueueRef, StoreRef};

/// Summary of one synchronization pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    /// Rows inserted for newly discovered drive files
    pub added: usize,
    /// Rows deleted for drive files that disappeared
    pub removed: u64,
    /// Folder status after the pass
    pub status: FolderStatus,
    /// Total image count after the pass
    pub total: i32,
    /// Completed image count after the pass
    pub processed: i32,
}

/// Reconciles folders against the drive
pub struct SyncEngine {
    drive: DriveRef,
    store: StoreRef,
    queue: QueueRef,
    folder_cap: Option<u32>,
}

impl SyncEngine {
    pub fn new(
        drive: DriveRef,
        store: StoreRef,
        queue: QueueRef,
        folder_cap: Option<u32>,
    ) -> Self {
        Self {
            drive,
            store,
            queue,
            folder_cap,
        }
    }

    /// Runs one sync pass for a folder already present in the store
    pub async fn sync_folder(
        &self,
        folder_id: &FolderId,
        credential: Option<&UserCredential>,
    ) -> Result<SyncOutcome, ServiceError> {
        let folder = self.store.get_folder(folder_id).await?;
        let prior_status = folder.status;

        let listing = self
            .drive
            .list_images_recursive(&folder.drive_folder_id, credential)
            .await?;

        let local_ids: HashSet<DriveFileId> = self
            .store
            .list_drive_file_ids(folder_id)
            .await?
            .into_iter()
            .collect();
        let drive_ids: HashSet<DriveFileId> =
            listing.images.iter().map(|f| f.id.clone()).collect();

        let new_files: Vec<&DriveFile> = listing
            .images
            .iter()
            .filter(|f| !local_ids.contains(&f.id))
            .collect();
        let deleted_ids: Vec<DriveFileId> = local_ids
            .iter()
            .filter(|id| !drive_ids.contains(id))
            .cloned()
            .collect();

        // Cap check before any mutation.
        if let Some(cap) = self.folder_cap {
            let projected = local_ids.len() + new_files.len() - deleted_ids.len();
            if projected > cap as usize {
                return Err(ServiceError::FolderCapExceeded {
                    count: projected,
                    cap,
                });
            }
        }

        let inserted = if new_files.is_empty() {
            Vec::new()
        } else {
            let rows: Vec<NewImage> = new_files
                .iter()
                .map(|f| new_image_row(folder_id, f))
                .collect();
            self.store.create_images_bulk(rows).await?
        };

        let removed = self
            .store
            .delete_images_by_drive_ids(folder_id, &deleted_ids)
            .await?;

        if let Some(name) = &listing.folder_name {
            if folder.name.as_deref() != Some(name) {
                self.store.set_folder_name(folder_id, name).await?;
            }
        }

        // Recompute counters; a folder whose outstanding work just
        // disappeared flips to completed inside this same update.
        let refreshed = self.store.refresh_folder_progress(folder_id).await?;

        let mut status = refreshed.status;
        if !inserted.is_empty() {
            self.store
                .set_folder_status(folder_id, FolderStatus::Processing)
                .await?;
            status = FolderStatus::Processing;
            self.enqueue_folder_job(folder_id, &folder.drive_folder_id, credential)
                .await?;
        } else if status != FolderStatus::Completed
            && matches!(prior_status, FolderStatus::Failed | FolderStatus::Pending)
        {
            // Unfinished work with no job in sight: give it another run.
            self.enqueue_folder_job(folder_id, &folder.drive_folder_id, credential)
                .await?;
        }

        let outcome = SyncOutcome {
            added: inserted.len(),
            removed,
            status,
            total: refreshed.total_images,
            processed: refreshed.processed_images,
        };
        if outcome.added == 0 && outcome.removed == 0 {
            debug!(folder = %folder_id, "Sync found no drive-side changes");
        } else {
            info!(
                folder = %folder_id,
                added = outcome.added,
                removed = outcome.removed,
                status = %outcome.status,
                "Sync reconciled folder"
            );
        }
        Ok(outcome)
    }

    async fn enqueue_folder_job(
        &self,
        folder_id: &FolderId,
        drive_folder_id: &drivelens_core::domain::newtypes::DriveFolderId,
        credential: Option<&UserCredential>,
    ) -> Result<(), ServiceError> {
        let payload = JobPayload::Folder {
            folder_id: *folder_id,
            drive_folder_id: drive_folder_id.clone(),
            credential: credential.cloned(),
        };
        self.queue
            .enqueue(
                QueueName::Folders,
                &drivelens_queue::keys::folder_job_key(drive_folder_id),
                &payload,
            )
            .await?;
        Ok(())
    }
}

/// Maps a listed drive file onto a new pending image row
pub(crate) fn new_image_row(folder_id: &FolderId, file: &DriveFile) -> NewImage {
    NewImage {
        drive_file_id: file.id.clone(),
        folder_id: *folder_id,
        name: file.name.clone(),
        mime_type: file.mime_type.clone(),
        thumbnail_url: file.thumbnail_url.clone(),
        view_url: file.view_url.clone(),
        size_bytes: file.size,
        checksum: file.checksum.clone(),
        modified_at: file.modified_at,
        version_token: file.version_token.clone(),
    }
}
