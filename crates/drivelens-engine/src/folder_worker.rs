//! Folder worker
//!
//! Consumes folder jobs: marks the folder processing, partitions its
//! pending images into batches, and fans the batches out as image jobs.
//! Enumeration already happened at ingest (or sync) time, so this worker
//! only reads rows; the drive is not consulted again here.

use std::sync::Arc;

use anyhow::Context;
use drivelens_core::domain::folder::FolderStatus;
use drivelens_core::domain::newtypes::FolderId;
use drivelens_core::ports::drive::UserCredential;
use drivelens_core::ports::queue::{JobPayload, QueueName};
use tracing::{error, info};

use crate::progress::FolderProgressMap;
use crate::{QueueRef, StoreRef, BATCH_SIZE};

/// Upper bound on pending rows read per folder job; folders are capped
/// well below this in any sane deployment
const PENDING_READ_LIMIT: i64 = 100_000;

/// Worker for the `folders` queue
pub struct FolderWorker {
    store: StoreRef,
    queue: QueueRef,
    progress: Arc<FolderProgressMap>,
}

impl FolderWorker {
    pub fn new(store: StoreRef, queue: QueueRef, progress: Arc<FolderProgressMap>) -> Self {
        Self {
            store,
            queue,
            progress,
        }
    }

    /// Handles one folder job. An `Err` return tells the queue to apply
    /// its retry policy; the folder row is already marked failed.
    pub async fn process(
        &self,
        folder_id: &FolderId,
        credential: Option<&UserCredential>,
    ) -> anyhow::Result<()> {
        match self.process_inner(folder_id, credential).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(folder = %folder_id, error = %err, "Folder job failed");
                if let Err(mark_err) = self
                    .store
                    .set_folder_status(folder_id, FolderStatus::Failed)
                    .await
                {
                    error!(folder = %folder_id, error = %mark_err, "Could not mark folder failed");
                }
                Err(err)
            }
        }
    }

    async fn process_inner(
        &self,
        folder_id: &FolderId,
        credential: Option<&UserCredential>,
    ) -> anyhow::Result<()> {
        self.store
            .set_folder_status(folder_id, FolderStatus::Processing)
            .await
            .context("marking folder processing")?;

        let pending = self
            .store
            .list_pending_images(folder_id, PENDING_READ_LIMIT)
            .await
            .context("listing pending images")?;

        let folder = self
            .store
            .get_folder(folder_id)
            .await
            .context("reading folder row")?;
        self.progress.start(
            *folder_id,
            i64::from(folder.total_images),
            i64::from(folder.processed_images),
        );

        let batches: Vec<(String, JobPayload)> = pending
            .chunks(BATCH_SIZE)
            .map(|chunk| {
                let payload = JobPayload::ImageBatch {
                    folder_id: *folder_id,
                    image_ids: chunk.iter().map(|img| img.id).collect(),
                    credential: credential.cloned(),
                };
                (drivelens_queue::keys::batch_job_key(folder_id), payload)
            })
            .collect();

        let batch_count = batches.len();
        self.queue
            .enqueue_batch(QueueName::Images, batches)
            .await
            .context("enqueueing image batches")?;

        // The folder may already be done (sync can leave zero pending
        // work); the refresh flips it to completed in that case.
        let refreshed = self
            .store
            .refresh_folder_progress(folder_id)
            .await
            .context("refreshing folder counts")?;
        let counts = self
            .store
            .count_images_by_status(folder_id)
            .await
            .context("counting images by status")?;

        info!(
            folder = %folder_id,
            batches = batch_count,
            pending = counts.pending,
            processing = counts.processing,
            completed = counts.completed,
            failed = counts.failed,
            status = %refreshed.status,
            "Folder job fanned out"
        );
        Ok(())
    }
}
