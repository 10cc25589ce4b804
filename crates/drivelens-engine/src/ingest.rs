//! Ingest coordinator — the external entry point
//!
//! Validates a submitted folder URL, creates the folder and its image
//! rows, and bootstraps processing through the queue. Submitting a folder
//! that is already known short-circuits to a sync pass, which makes
//! ingest idempotent: the same URL twice in a row yields the same folder
//! row and an empty diff.

use std::sync::Arc;

use drivelens_core::domain::folder::Folder;
use drivelens_core::ports::drive::UserCredential;
use drivelens_core::ports::queue::{JobPayload, QueueName};
use drivelens_core::ports::store::{NewFolder, NewImage};
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::sync::{new_image_row, SyncEngine};
use crate::{DriveRef, QueueRef, StoreRef};

/// An authenticated submitter, as reported by the (out-of-scope) auth
/// front-end
#[derive(Debug, Clone)]
pub struct Submitter {
    /// Stable auth-provider subject id
    pub auth_id: String,
    /// Email when the provider shares it
    pub email: Option<String>,
}

/// Coordinates new folder submissions
pub struct IngestCoordinator {
    drive: DriveRef,
    store: StoreRef,
    queue: QueueRef,
    sync: Arc<SyncEngine>,
    folder_cap: Option<u32>,
}

impl IngestCoordinator {
    pub fn new(
        drive: DriveRef,
        store: StoreRef,
        queue: QueueRef,
        sync: Arc<SyncEngine>,
        folder_cap: Option<u32>,
    ) -> Self {
        Self {
            drive,
            store,
            queue,
            sync,
            folder_cap,
        }
    }

    /// Handles one submission; returns the folder snapshot
    pub async fn ingest(
        &self,
        folder_url: &str,
        submitter: Option<&Submitter>,
        credential: Option<&UserCredential>,
    ) -> Result<Folder, ServiceError> {
        let drive_folder_id = self.drive.parse_folder_url(folder_url)?;

        let user = match submitter {
            Some(s) => Some(
                self.store
                    .upsert_user(&s.auth_id, s.email.as_deref())
                    .await?,
            ),
            None => None,
        };

        // Known folder: link the user if needed, then reconcile.
        if let Some(existing) = self.store.find_folder_by_drive_id(&drive_folder_id).await? {
            if let Some(user) = &user {
                if existing.user_id.is_none() {
                    self.store.link_folder_user(&existing.id, &user.id).await?;
                }
                self.store
                    .record_scan_receipt(&user.id, &drive_folder_id)
                    .await?;
            }
            info!(folder = %existing.id, drive_folder = %drive_folder_id, "Resubmission; running sync");
            self.sync.sync_folder(&existing.id, credential).await?;
            return Ok(self.store.get_folder(&existing.id).await?);
        }

        // Fresh folder: enumerate, enforce the cap, persist, enqueue.
        let listing = self
            .drive
            .list_images_recursive(&drive_folder_id, credential)
            .await?;

        if let Some(cap) = self.folder_cap {
            if listing.images.len() > cap as usize {
                warn!(
                    drive_folder = %drive_folder_id,
                    images = listing.images.len(),
                    cap,
                    "Folder over cap; refusing ingest"
                );
                return Err(ServiceError::FolderCapExceeded {
                    count: listing.images.len(),
                    cap,
                });
            }
        }
        if listing.images.is_empty() {
            return Err(ServiceError::EmptyFolder);
        }

        let folder = self
            .store
            .create_folder(NewFolder {
                drive_folder_id: drive_folder_id.clone(),
                name: listing.folder_name.clone(),
                origin_url: folder_url.to_string(),
                user_id: user.as_ref().map(|u| u.id),
                total_images: listing.images.len() as i32,
            })
            .await?;

        let rows: Vec<NewImage> = listing
            .images
            .iter()
            .map(|f| new_image_row(&folder.id, f))
            .collect();
        self.store.create_images_bulk(rows).await?;

        if let Some(user) = &user {
            self.store
                .record_scan_receipt(&user.id, &drive_folder_id)
                .await?;
        }

        let payload = JobPayload::Folder {
            folder_id: folder.id,
            drive_folder_id: drive_folder_id.clone(),
            credential: credential.cloned(),
        };
        self.queue
            .enqueue(
                QueueName::Folders,
                &drivelens_queue::keys::folder_job_key(&drive_folder_id),
                &payload,
            )
            .await?;

        info!(
            folder = %folder.id,
            drive_folder = %drive_folder_id,
            images = listing.images.len(),
            "Folder ingested and queued"
        );
        Ok(folder)
    }
}
