//! Recovery supervisor
//!
//! A periodic sweep that unsticks the pipeline: rows stuck in
//! `processing` go back to `pending`, folder counters are reconciled
//! against committed rows, folders with forgotten pending work get fresh
//! jobs, stalled queue jobs are declared failed, and pending images are
//! re-batched when the image queue has gone quiet.
//!
//! Every write uses the same status guards the workers use, so the sweep
//! is safe to run concurrently with them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drivelens_core::domain::folder::FolderStatus;
use drivelens_core::ports::queue::{JobPayload, QueueName};
use drivelens_core::ports::store::ResetFilter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::progress::FolderProgressMap;
use crate::{QueueRef, StoreRef, BATCH_SIZE, STUCK_THRESHOLD_SECS};

/// How often the supervisor sweeps while the process lives
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Jobs active without a heartbeat this long are stalled
const STALL_THRESHOLD_SECS: i64 = 5 * 60;

/// Reason recorded on reclaimed jobs
const STALL_REASON: &str = "worker restart recovery";

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RecoveryReport {
    /// Rows reset from stuck `processing` back to `pending`
    pub reset_images: usize,
    /// Active folders whose counters were reconciled
    pub reconciled_folders: usize,
    /// Folders re-marked `processing` and re-queued
    pub requeued_folders: usize,
    /// Queue jobs declared stalled
    pub stalled_jobs: u64,
    /// Pending images re-batched onto the image queue
    pub requeued_images: usize,
}

/// Periodic pipeline recovery
pub struct RecoverySupervisor {
    store: StoreRef,
    queue: QueueRef,
    progress: Arc<FolderProgressMap>,
}

impl RecoverySupervisor {
    pub fn new(store: StoreRef, queue: QueueRef, progress: Arc<FolderProgressMap>) -> Self {
        Self {
            store,
            queue,
            progress,
        }
    }

    /// One full sweep
    pub async fn run_once(&self) -> Result<RecoveryReport, ServiceError> {
        let mut report = RecoveryReport::default();

        // 1. Reset rows stuck in processing (worker died mid-caption).
        let cutoff = Utc::now() - chrono::Duration::seconds(STUCK_THRESHOLD_SECS);
        let reset = self
            .store
            .reset_images_to_pending(ResetFilter::StuckSince(cutoff))
            .await?;
        report.reset_images = reset.len();

        // 2. Reconcile counters of every active folder against committed
        //    rows; completion flips happen inside the refresh.
        for folder in self.store.list_active_folders().await? {
            let refreshed = self.store.refresh_folder_progress(&folder.id).await?;
            self.progress.update(
                &folder.id,
                i64::from(refreshed.total_images),
                i64::from(refreshed.processed_images),
            );
            report.reconciled_folders += 1;
        }

        // 3. Folders with pending work but nothing driving them.
        let mut pending_folders = Vec::new();
        for folder in self.store.list_folders_with_pending().await? {
            if folder.status != FolderStatus::Processing {
                self.store
                    .set_folder_status(&folder.id, FolderStatus::Processing)
                    .await?;
                self.queue
                    .enqueue(
                        QueueName::Folders,
                        &drivelens_queue::keys::folder_job_key(&folder.drive_folder_id),
                        &JobPayload::Folder {
                            folder_id: folder.id,
                            drive_folder_id: folder.drive_folder_id.clone(),
                            credential: None,
                        },
                    )
                    .await?;
                report.requeued_folders += 1;
            }
            pending_folders.push(folder);
        }

        // 4. Reclaim stalled queue jobs.
        report.stalled_jobs = self
            .queue
            .fail_stalled(chrono::Duration::seconds(STALL_THRESHOLD_SECS), STALL_REASON)
            .await?;

        // 5. Re-batch pending images, but only when the image queue has
        //    gone quiet: batch keys are unique per enqueue, so blindly
        //    re-batching every sweep would duplicate in-flight work.
        let image_stats = self.queue.peek_counts(QueueName::Images).await?;
        if image_stats.queued == 0 && image_stats.active == 0 {
            for folder in &pending_folders {
                let pending = self
                    .store
                    .list_pending_images(&folder.id, i64::MAX)
                    .await?;
                let batches: Vec<(String, JobPayload)> = pending
                    .chunks(BATCH_SIZE)
                    .map(|chunk| {
                        (
                            drivelens_queue::keys::batch_job_key(&folder.id),
                            JobPayload::ImageBatch {
                                folder_id: folder.id,
                                image_ids: chunk.iter().map(|img| img.id).collect(),
                                credential: None,
                            },
                        )
                    })
                    .collect();
                report.requeued_images += pending.len();
                self.queue.enqueue_batch(QueueName::Images, batches).await?;
            }
        }

        if report.reset_images > 0 || report.requeued_folders > 0 || report.stalled_jobs > 0 {
            info!(
                reset = report.reset_images,
                requeued_folders = report.requeued_folders,
                stalled = report.stalled_jobs,
                requeued_images = report.requeued_images,
                "Recovery sweep acted"
            );
        }
        Ok(report)
    }

    /// Sweeps once immediately, then on an interval until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = SWEEP_INTERVAL.as_secs(), "Recovery supervisor starting");

        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Recovery supervisor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        warn!(error = %err, "Recovery sweep failed; will retry next interval");
                    }
                }
            }
        }
    }
}
