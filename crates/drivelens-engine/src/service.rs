//! Transport-agnostic service facade
//!
//! The public API surface of the pipeline: an HTTP front-end, the CLI,
//! or a test harness maps these operations 1:1. Error kinds are stable
//! across transports (see [`ServiceError`]).

use std::sync::Arc;

use drivelens_core::domain::folder::Folder;
use drivelens_core::domain::image::{Image, ImageStatus};
use drivelens_core::domain::newtypes::{DriveFileId, FolderId, ImageId};
use drivelens_core::ports::drive::UserCredential;
use drivelens_core::ports::queue::{JobPayload, QueueName, QueueStats};
use drivelens_core::ports::store::ResetFilter;
use drivelens_caption::clean_caption;
use serde::Serialize;
use tracing::info;

use crate::error::ServiceError;
use crate::ingest::{IngestCoordinator, Submitter};
use crate::search::{SearchEngine, SearchResponse};
use crate::sync::{SyncEngine, SyncOutcome};
use crate::{DriveRef, QueueRef, StoreRef};

/// Folder snapshot plus its image list, captions cleaned for display
#[derive(Debug, Clone, Serialize)]
pub struct FolderDetails {
    pub folder: Folder,
    pub images: Vec<Image>,
}

/// Health probe result
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Store reachability
    pub database: bool,
    /// Queue broker reachability
    pub queue: bool,
    /// Per-queue job counts (present when the queue is reachable)
    pub folder_jobs: Option<QueueStats>,
    pub image_jobs: Option<QueueStats>,
}

impl HealthReport {
    /// True when every dependency answered
    pub fn healthy(&self) -> bool {
        self.database && self.queue
    }
}

/// What a retry request targets; exactly one of the two
#[derive(Debug, Clone)]
pub enum RetryTarget {
    /// One image by id
    Image(ImageId),
    /// Every failed or pending image of a folder
    Folder(FolderId),
}

/// Outcome of a retry request
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetryOutcome {
    /// Image jobs newly enqueued (idempotency keys dedupe re-runs)
    pub queued_count: usize,
}

/// The assembled pipeline service
pub struct PipelineService {
    store: StoreRef,
    queue: QueueRef,
    drive: DriveRef,
    ingest: IngestCoordinator,
    sync: Arc<SyncEngine>,
    search: SearchEngine,
}

impl PipelineService {
    pub fn new(
        store: StoreRef,
        queue: QueueRef,
        drive: DriveRef,
        ingest: IngestCoordinator,
        sync: Arc<SyncEngine>,
        search: SearchEngine,
    ) -> Self {
        Self {
            store,
            queue,
            drive,
            ingest,
            sync,
            search,
        }
    }

    /// Submits a folder URL for ingestion
    pub async fn ingest(
        &self,
        folder_url: &str,
        submitter: Option<&Submitter>,
        credential: Option<&UserCredential>,
    ) -> Result<Folder, ServiceError> {
        self.ingest.ingest(folder_url, submitter, credential).await
    }

    /// Reconciles a known folder against the drive
    pub async fn sync_folder(
        &self,
        folder_id: &FolderId,
        credential: Option<&UserCredential>,
    ) -> Result<SyncOutcome, ServiceError> {
        self.sync.sync_folder(folder_id, credential).await
    }

    /// Folder snapshot plus image list; stored captions are cleaned of
    /// legacy JSON/entity encodings before leaving the service
    pub async fn get_folder(&self, folder_id: &FolderId) -> Result<FolderDetails, ServiceError> {
        let folder = self.store.get_folder(folder_id).await?;
        let mut images = self.store.list_images(folder_id).await?;
        for image in &mut images {
            if let Some(caption) = &image.caption {
                image.caption = Some(clean_caption(caption));
            }
        }
        Ok(FolderDetails { folder, images })
    }

    /// Hybrid search over one folder's corpus
    pub async fn search(
        &self,
        folder_id: &FolderId,
        query: &str,
        top_k: usize,
    ) -> Result<SearchResponse, ServiceError> {
        self.search.search(folder_id, query, top_k).await
    }

    /// Resets failed work to pending and re-queues it
    ///
    /// Enqueues exactly one image job per (file, version-token) pair; the
    /// queue's idempotency key swallows duplicates.
    pub async fn retry(&self, target: RetryTarget) -> Result<RetryOutcome, ServiceError> {
        let reset = match &target {
            RetryTarget::Image(image_id) => {
                // Surface NotFound before mutating anything.
                let image = self.store.get_image(image_id).await?;
                if image.status == ImageStatus::Processing {
                    return Err(ServiceError::BadRequest(format!(
                        "image {image_id} is currently processing"
                    )));
                }
                self.store
                    .reset_images_to_pending(ResetFilter::Image(*image_id))
                    .await?
            }
            RetryTarget::Folder(folder_id) => {
                self.store.get_folder(folder_id).await?;
                self.store
                    .reset_images_to_pending(ResetFilter::FolderRetryable(*folder_id))
                    .await?
            }
        };

        let mut queued = 0;
        for image in &reset {
            let inserted = self
                .queue
                .enqueue(
                    QueueName::Images,
                    &drivelens_queue::keys::image_job_key(
                        &image.drive_file_id,
                        image.version_key(),
                    ),
                    &JobPayload::Image {
                        image_id: image.id,
                        folder_id: image.folder_id,
                        credential: None,
                    },
                )
                .await?;
            if inserted {
                queued += 1;
            }
        }

        // Folders with revived work should read as in-flight again.
        if let RetryTarget::Folder(folder_id) = &target {
            if !reset.is_empty() {
                self.store
                    .set_folder_status(folder_id, drivelens_core::domain::folder::FolderStatus::Processing)
                    .await?;
            }
        }

        info!(reset = reset.len(), queued, "Retry queued");
        Ok(RetryOutcome {
            queued_count: queued,
        })
    }

    /// Dependency health plus queue statistics
    pub async fn health(&self) -> HealthReport {
        let database = self.store.ping().await.is_ok();
        let queue = self.queue.ping().await.is_ok();

        let (folder_jobs, image_jobs) = if queue {
            (
                self.queue.peek_counts(QueueName::Folders).await.ok(),
                self.queue.peek_counts(QueueName::Images).await.ok(),
            )
        } else {
            (None, None)
        };

        HealthReport {
            database,
            queue,
            folder_jobs,
            image_jobs,
        }
    }

    /// Thumbnail bytes + content type, via the drive adapter's cache.
    /// The HTTP front-end adds `Cache-Control: public` with a two-hour
    /// lifetime, matching the adapter's own TTL.
    pub async fn thumbnail(
        &self,
        drive_file_id: &DriveFileId,
        size: u32,
        credential: Option<&UserCredential>,
    ) -> Result<(Vec<u8>, String), ServiceError> {
        self.drive
            .fetch_thumbnail(drive_file_id, size, credential)
            .await
            .map_err(|err| match err {
                drivelens_core::ports::drive::DriveError::ThumbnailUnavailable(id) => {
                    ServiceError::NotFound(format!("thumbnail for {id}"))
                }
                other => other.into(),
            })
    }
}
