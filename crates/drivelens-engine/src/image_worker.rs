//! Image worker — the hot path
//!
//! Consumes image (batch) jobs. Each member runs download → caption →
//! embed → persist independently and in parallel; one member's failure is
//! recorded on its row and never fails the batch. The only cross-member
//! coupling is the quota-auth short-circuit: once the captioning service
//! rejects credentials, burning the rest of the batch is pointless, so
//! remaining members go back to `pending` and retry after credentials
//! recover.
//!
//! The `pending → processing` transition taken through the store is the
//! member's row lock; a member that loses that race skips silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use drivelens_core::domain::image::is_supported_mime;
use drivelens_core::domain::newtypes::{FolderId, ImageId};
use drivelens_core::ports::drive::UserCredential;
use drivelens_core::ports::store::ResetFilter;
use drivelens_limiter::SlidingWindowLimiter;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::progress::FolderProgressMap;
use crate::{CaptionerRef, DriveRef, StoreRef};

/// Result of one batch job: every member was executed (or deliberately
/// skipped); the queue treats the job as succeeded either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Members that reached `completed`
    pub processed: usize,
    /// Members recorded as `failed`
    pub failed: usize,
    /// Members returned to `pending` by the quota-auth short-circuit
    pub deferred: usize,
}

/// Outcome of a single member
enum MemberOutcome {
    Completed,
    Failed,
    /// Row lock lost or row gone; nothing written
    Skipped,
    /// Reset to pending because the captioning quota is dead
    Deferred,
}

/// Worker for the `images` queue
pub struct ImageWorker {
    store: StoreRef,
    drive: DriveRef,
    captioner: CaptionerRef,
    caption_limiter: Arc<SlidingWindowLimiter>,
    progress: Arc<FolderProgressMap>,
}

impl ImageWorker {
    pub fn new(
        store: StoreRef,
        drive: DriveRef,
        captioner: CaptionerRef,
        caption_limiter: Arc<SlidingWindowLimiter>,
        progress: Arc<FolderProgressMap>,
    ) -> Self {
        Self {
            store,
            drive,
            captioner,
            caption_limiter,
            progress,
        }
    }

    /// Runs one batch job; members execute in parallel
    pub async fn process_batch(
        &self,
        folder_id: &FolderId,
        image_ids: &[ImageId],
        credential: Option<&UserCredential>,
    ) -> anyhow::Result<BatchResult> {
        let quota_dead = AtomicBool::new(false);

        let outcomes = join_all(
            image_ids
                .iter()
                .map(|id| self.process_one(id, credential, &quota_dead)),
        )
        .await;

        let mut result = BatchResult::default();
        for outcome in outcomes {
            match outcome {
                MemberOutcome::Completed => result.processed += 1,
                MemberOutcome::Failed => result.failed += 1,
                MemberOutcome::Deferred => result.deferred += 1,
                MemberOutcome::Skipped => {}
            }
        }

        // One committed-snapshot recompute for the whole batch; members
        // also refresh individually so progress advances mid-batch.
        let folder = self.store.refresh_folder_progress(folder_id).await?;
        self.progress.update(
            folder_id,
            i64::from(folder.total_images),
            i64::from(folder.processed_images),
        );

        info!(
            folder = %folder_id,
            processed = result.processed,
            failed = result.failed,
            deferred = result.deferred,
            "Image batch finished"
        );
        Ok(result)
    }

    /// Runs one member end to end. Never returns an error: permanent
    /// failures are row writes, and anything the row cannot absorb is a
    /// skip for a later retry pass.
    async fn process_one(
        &self,
        image_id: &ImageId,
        credential: Option<&UserCredential>,
        quota_dead: &AtomicBool,
    ) -> MemberOutcome {
        if quota_dead.load(Ordering::Acquire) {
            return MemberOutcome::Deferred;
        }

        let image = match self.store.get_image(image_id).await {
            Ok(image) => image,
            Err(_) => {
                // Row removed by a concurrent sync; nothing to do.
                debug!(image = %image_id, "Image row gone before processing");
                return MemberOutcome::Skipped;
            }
        };

        // Unsupported MIME never consumes API quota.
        if !is_supported_mime(&image.mime_type) {
            let message = format!("Unsupported MIME type: {}", image.mime_type);
            if self.store.set_image_failed(image_id, &message).await.is_err() {
                return MemberOutcome::Skipped;
            }
            return MemberOutcome::Failed;
        }

        // The pending -> processing transition is the row lock.
        match self.store.set_image_processing(image_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(image = %image_id, "Row already claimed by another worker");
                return MemberOutcome::Skipped;
            }
            Err(err) => {
                warn!(image = %image_id, error = %err, "Could not claim image row");
                return MemberOutcome::Skipped;
            }
        }

        // Caption quota is the scarce resource: wait for it before
        // spending drive quota on the download.
        self.caption_limiter.acquire().await;

        if quota_dead.load(Ordering::Acquire) {
            return self.defer(image_id).await;
        }

        let bytes = match self.drive.download_bytes(&image.drive_file_id, credential).await {
            Ok(bytes) => bytes,
            Err(err) => return self.record_failure(image_id, &err.to_string()).await,
        };

        let caption = match self.captioner.caption(&bytes, &image.mime_type).await {
            Ok(caption) => caption,
            Err(err) if err.is_fatal_to_quota() => {
                warn!(image = %image_id, error = %err, "Captioning quota dead; short-circuiting batch");
                quota_dead.store(true, Ordering::Release);
                return self.defer(image_id).await;
            }
            Err(err) => return self.record_failure(image_id, &err.to_string()).await,
        };

        let vector = match self
            .captioner
            .embed_caption(&caption.caption, &caption.tags)
            .await
        {
            Ok(vector) => vector,
            Err(err) if err.is_fatal_to_quota() => {
                quota_dead.store(true, Ordering::Release);
                return self.defer(image_id).await;
            }
            Err(err) => return self.record_failure(image_id, &err.to_string()).await,
        };

        let tags = caption.tags.join(",");
        if let Err(err) = self
            .store
            .set_image_completed(image_id, &caption.caption, &tags, &vector)
            .await
        {
            warn!(image = %image_id, error = %err, "Completed write failed");
            return self.record_failure(image_id, &err.to_string()).await;
        }

        // Progress reflects a committed snapshot of image rows.
        if let Ok(folder) = self.store.refresh_folder_progress(&image.folder_id).await {
            self.progress.update(
                &image.folder_id,
                i64::from(folder.total_images),
                i64::from(folder.processed_images),
            );
        }

        debug!(image = %image_id, "Image captioned and embedded");
        MemberOutcome::Completed
    }

    /// Returns a claimed row to `pending` for a later retry
    async fn defer(&self, image_id: &ImageId) -> MemberOutcome {
        match self
            .store
            .reset_images_to_pending(ResetFilter::Image(*image_id))
            .await
        {
            Ok(_) => MemberOutcome::Deferred,
            Err(err) => {
                warn!(image = %image_id, error = %err, "Could not defer image");
                MemberOutcome::Skipped
            }
        }
    }

    /// Records a permanent per-row failure
    async fn record_failure(&self, image_id: &ImageId, message: &str) -> MemberOutcome {
        warn!(image = %image_id, error = message, "Image processing failed");
        match self.store.set_image_failed(image_id, message).await {
            Ok(()) => MemberOutcome::Failed,
            Err(err) => {
                warn!(image = %image_id, error = %err, "Could not record failure");
                MemberOutcome::Skipped
            }
        }
    }
}
