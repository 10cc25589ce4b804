//! Deterministic in-memory port implementations for engine tests
//!
//! The fakes replicate the adapter contracts closely enough that the
//! engine cannot tell the difference: the store enforces the row-lock
//! transition and the counter-recompute rule, the queue deduplicates on
//! idempotency keys, the drive filters unsupported MIME types, and the
//! captioner embeds deterministically so normalization-invariance is
//! observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use drivelens_caption::normalize_text;
use drivelens_core::domain::folder::{Folder, FolderStatus};
use drivelens_core::domain::image::{is_supported_mime, Image, ImageStatus};
use drivelens_core::domain::newtypes::{
    DriveFileId, DriveFolderId, FolderId, ImageId, UserId, VersionToken,
};
use drivelens_core::domain::user::User;
use drivelens_core::ports::captioner::{CaptionError, Captioner, ImageCaption};
use drivelens_core::ports::drive::{
    DriveError, DriveFile, DriveProvider, FolderListing, UserCredential,
};
use drivelens_core::ports::queue::{
    Job, JobPayload, JobQueue, JobState, QueueError, QueueName, QueueStats,
};
use drivelens_core::ports::store::{
    FilenameHit, FilenameRank, ImageStore, NewFolder, NewImage, ResetFilter, SimilarityHit,
    StatusCounts, StoreError,
};
use drivelens_engine::{
    FolderProgressMap, FolderWorker, ImageWorker, IngestCoordinator, PipelineService,
    RecoverySupervisor, SearchEngine, SyncEngine,
};
use drivelens_limiter::SlidingWindowLimiter;

// ============================================================================
// MockStore
// ============================================================================

#[derive(Default)]
pub struct MockStore {
    folders: Mutex<HashMap<FolderId, Folder>>,
    images: Mutex<HashMap<ImageId, Image>>,
    users: Mutex<HashMap<String, User>>,
    receipts: Mutex<Vec<(UserId, DriveFolderId)>>,
    /// Flip to false to simulate a deployment without pgvector
    pub vector_available: AtomicBool,
    /// Flip to true to simulate a database outage
    pub unavailable: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            vector_available: AtomicBool::new(true),
            ..Default::default()
        }
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("mock outage".to_string()));
        }
        Ok(())
    }

    fn vectors_on(&self) -> bool {
        self.vector_available.load(Ordering::Relaxed)
    }

    /// Test hook: read one image directly
    pub fn image(&self, id: &ImageId) -> Option<Image> {
        self.images.lock().unwrap().get(id).cloned()
    }

    /// Test hook: read one folder directly
    pub fn folder(&self, id: &FolderId) -> Option<Folder> {
        self.folders.lock().unwrap().get(id).cloned()
    }

    /// Test hook: all images of a folder, name ascending
    pub fn folder_images(&self, id: &FolderId) -> Vec<Image> {
        let mut images: Vec<Image> = self
            .images
            .lock()
            .unwrap()
            .values()
            .filter(|img| img.folder_id == *id)
            .cloned()
            .collect();
        images.sort_by(|a, b| a.name.cmp(&b.name));
        images
    }

    /// Test hook: backdate an image's updated_at (stuck-row scenarios)
    pub fn age_image(&self, id: &ImageId, minutes: i64) {
        let mut images = self.images.lock().unwrap();
        if let Some(img) = images.get_mut(id) {
            img.updated_at = Utc::now() - Duration::minutes(minutes);
        }
    }

    /// Test hook: seed an image row directly
    pub fn insert_image(&self, image: Image) {
        self.images.lock().unwrap().insert(image.id, image);
    }

    /// Test hook: recorded scan receipts
    pub fn receipt_count(&self) -> usize {
        self.receipts.lock().unwrap().len()
    }

    fn recompute_locked(
        folders: &mut HashMap<FolderId, Folder>,
        images: &HashMap<ImageId, Image>,
        id: &FolderId,
    ) -> Result<Folder, StoreError> {
        let folder = folders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))?;
        let rows: Vec<&Image> = images.values().filter(|i| i.folder_id == *id).collect();
        folder.total_images = rows.len() as i32;
        folder.processed_images = rows
            .iter()
            .filter(|i| i.status == ImageStatus::Completed)
            .count() as i32;
        if folder.total_images > 0 && folder.processed_images == folder.total_images {
            folder.status = FolderStatus::Completed;
        } else if folder.status == FolderStatus::Completed {
            // Completed folders that regain outstanding work demote so
            // the completion rule stays a biconditional.
            folder.status = FolderStatus::Processing;
        }
        folder.updated_at = Utc::now();
        Ok(folder.clone())
    }
}

#[async_trait::async_trait]
impl ImageStore for MockStore {
    async fn create_folder(&self, new: NewFolder) -> Result<Folder, StoreError> {
        self.check_up()?;
        let folder = Folder {
            id: FolderId::new(),
            drive_folder_id: new.drive_folder_id,
            name: new.name,
            origin_url: new.origin_url,
            user_id: new.user_id,
            status: FolderStatus::Pending,
            total_images: new.total_images,
            processed_images: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.folders.lock().unwrap().insert(folder.id, folder.clone());
        Ok(folder)
    }

    async fn get_folder(&self, id: &FolderId) -> Result<Folder, StoreError> {
        self.check_up()?;
        self.folder(id)
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))
    }

    async fn find_folder_by_drive_id(
        &self,
        drive_folder_id: &DriveFolderId,
    ) -> Result<Option<Folder>, StoreError> {
        self.check_up()?;
        Ok(self
            .folders
            .lock()
            .unwrap()
            .values()
            .find(|f| f.drive_folder_id == *drive_folder_id)
            .cloned())
    }

    async fn set_folder_status(
        &self,
        id: &FolderId,
        status: FolderStatus,
    ) -> Result<(), StoreError> {
        self.check_up()?;
        let mut folders = self.folders.lock().unwrap();
        let folder = folders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))?;
        folder.status = status;
        folder.updated_at = Utc::now();
        Ok(())
    }

    async fn set_folder_name(&self, id: &FolderId, name: &str) -> Result<(), StoreError> {
        let mut folders = self.folders.lock().unwrap();
        if let Some(folder) = folders.get_mut(id) {
            folder.name = Some(name.to_string());
        }
        Ok(())
    }

    async fn link_folder_user(&self, id: &FolderId, user_id: &UserId) -> Result<(), StoreError> {
        let mut folders = self.folders.lock().unwrap();
        if let Some(folder) = folders.get_mut(id) {
            if folder.user_id.is_none() {
                folder.user_id = Some(*user_id);
            }
        }
        Ok(())
    }

    async fn refresh_folder_progress(&self, id: &FolderId) -> Result<Folder, StoreError> {
        self.check_up()?;
        let mut folders = self.folders.lock().unwrap();
        let images = self.images.lock().unwrap();
        Self::recompute_locked(&mut folders, &images, id)
    }

    async fn list_active_folders(&self) -> Result<Vec<Folder>, StoreError> {
        self.check_up()?;
        Ok(self
            .folders
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.status == FolderStatus::Processing)
            .cloned()
            .collect())
    }

    async fn list_folders_with_pending(&self) -> Result<Vec<Folder>, StoreError> {
        self.check_up()?;
        let images = self.images.lock().unwrap();
        Ok(self
            .folders
            .lock()
            .unwrap()
            .values()
            .filter(|f| {
                f.status != FolderStatus::Completed
                    && images
                        .values()
                        .any(|i| i.folder_id == f.id && i.status == ImageStatus::Pending)
            })
            .cloned()
            .collect())
    }

    async fn create_images_bulk(&self, rows: Vec<NewImage>) -> Result<Vec<Image>, StoreError> {
        self.check_up()?;
        let mut images = self.images.lock().unwrap();
        let mut inserted = Vec::new();
        for new in rows {
            if images
                .values()
                .any(|i| i.drive_file_id == new.drive_file_id)
            {
                continue;
            }
            let image = Image {
                id: ImageId::new(),
                drive_file_id: new.drive_file_id,
                folder_id: new.folder_id,
                name: new.name,
                mime_type: new.mime_type,
                thumbnail_url: new.thumbnail_url,
                view_url: new.view_url,
                size_bytes: new.size_bytes,
                checksum: new.checksum,
                modified_at: new.modified_at,
                version_token: new.version_token,
                status: ImageStatus::Pending,
                caption: None,
                tags: None,
                caption_vec: None,
                error: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            images.insert(image.id, image.clone());
            inserted.push(image);
        }
        Ok(inserted)
    }

    async fn get_image(&self, id: &ImageId) -> Result<Image, StoreError> {
        self.check_up()?;
        self.image(id)
            .ok_or_else(|| StoreError::NotFound(format!("image {id}")))
    }

    async fn list_images(&self, folder_id: &FolderId) -> Result<Vec<Image>, StoreError> {
        self.check_up()?;
        Ok(self.folder_images(folder_id))
    }

    async fn list_pending_images(
        &self,
        folder_id: &FolderId,
        limit: i64,
    ) -> Result<Vec<Image>, StoreError> {
        self.check_up()?;
        let mut pending: Vec<Image> = self
            .images
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.folder_id == *folder_id && i.status == ImageStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|i| i.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn list_drive_file_ids(
        &self,
        folder_id: &FolderId,
    ) -> Result<Vec<DriveFileId>, StoreError> {
        self.check_up()?;
        Ok(self
            .images
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.folder_id == *folder_id)
            .map(|i| i.drive_file_id.clone())
            .collect())
    }

    async fn set_image_processing(&self, id: &ImageId) -> Result<bool, StoreError> {
        self.check_up()?;
        let mut images = self.images.lock().unwrap();
        match images.get_mut(id) {
            Some(image) if image.status == ImageStatus::Pending => {
                image.status = ImageStatus::Processing;
                image.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("image {id}"))),
        }
    }

    async fn set_image_completed(
        &self,
        id: &ImageId,
        caption: &str,
        tags: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        self.check_up()?;
        let vectors_on = self.vectors_on();
        let mut images = self.images.lock().unwrap();
        let image = images
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("image {id}")))?;
        image.status = ImageStatus::Completed;
        image.caption = Some(caption.to_string());
        image.tags = Some(tags.to_string());
        image.caption_vec = vectors_on.then(|| vector.to_vec());
        image.error = None;
        image.updated_at = Utc::now();
        Ok(())
    }

    async fn set_image_failed(&self, id: &ImageId, error: &str) -> Result<(), StoreError> {
        self.check_up()?;
        let mut images = self.images.lock().unwrap();
        let image = images
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("image {id}")))?;
        image.status = ImageStatus::Failed;
        image.error = Some(error.to_string());
        image.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_images_to_pending(
        &self,
        filter: ResetFilter,
    ) -> Result<Vec<Image>, StoreError> {
        self.check_up()?;
        let mut images = self.images.lock().unwrap();
        let matches: Vec<ImageId> = images
            .values()
            .filter(|image| match &filter {
                ResetFilter::Image(id) => image.id == *id,
                ResetFilter::FolderRetryable(folder_id) => {
                    image.folder_id == *folder_id
                        && matches!(image.status, ImageStatus::Failed | ImageStatus::Pending)
                }
                ResetFilter::StuckSince(cutoff) => {
                    image.status == ImageStatus::Processing && image.updated_at < *cutoff
                }
                ResetFilter::Ids(ids) => ids.contains(&image.id),
            })
            .map(|image| image.id)
            .collect();

        let mut reset = Vec::new();
        for id in matches {
            let image = images.get_mut(&id).expect("id came from the map");
            image.status = ImageStatus::Pending;
            image.caption = None;
            image.tags = None;
            image.caption_vec = None;
            image.error = None;
            image.updated_at = Utc::now();
            reset.push(image.clone());
        }
        Ok(reset)
    }

    async fn count_images_by_status(
        &self,
        folder_id: &FolderId,
    ) -> Result<StatusCounts, StoreError> {
        self.check_up()?;
        let images = self.images.lock().unwrap();
        let mut counts = StatusCounts::default();
        for image in images.values().filter(|i| i.folder_id == *folder_id) {
            match image.status {
                ImageStatus::Pending => counts.pending += 1,
                ImageStatus::Processing => counts.processing += 1,
                ImageStatus::Completed => counts.completed += 1,
                ImageStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn delete_images_by_drive_ids(
        &self,
        folder_id: &FolderId,
        drive_file_ids: &[DriveFileId],
    ) -> Result<u64, StoreError> {
        self.check_up()?;
        let mut images = self.images.lock().unwrap();
        let victims: Vec<ImageId> = images
            .values()
            .filter(|i| {
                i.folder_id == *folder_id
                    && drive_file_ids.contains(&i.drive_file_id)
                    && i.status != ImageStatus::Processing
            })
            .map(|i| i.id)
            .collect();
        for id in &victims {
            images.remove(id);
        }
        Ok(victims.len() as u64)
    }

    async fn search_by_filename(
        &self,
        folder_id: &FolderId,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<FilenameHit>, StoreError> {
        self.check_up()?;
        let needle = pattern.to_lowercase();
        let mut hits: Vec<FilenameHit> = self
            .folder_images(folder_id)
            .into_iter()
            .filter_map(|image| {
                let name = image.name.to_lowercase();
                let rank = if name == needle {
                    FilenameRank::Exact
                } else if name.starts_with(&needle) {
                    FilenameRank::Prefix
                } else if name.contains(&needle) {
                    FilenameRank::Substring
                } else {
                    return None;
                };
                Some(FilenameHit { image, rank })
            })
            .collect();
        hits.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.image.name.cmp(&b.image.name)));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn search_by_similarity(
        &self,
        folder_id: &FolderId,
        query_vector: &[f32],
        limit: i64,
    ) -> Result<Vec<SimilarityHit>, StoreError> {
        self.check_up()?;
        if !self.vectors_on() {
            return Err(StoreError::VectorBackendUnavailable(
                "mock vector backend disabled".to_string(),
            ));
        }
        let mut hits: Vec<SimilarityHit> = self
            .folder_images(folder_id)
            .into_iter()
            .filter(|i| i.status == ImageStatus::Completed && i.caption_vec.is_some())
            .map(|image| {
                let stored = image.caption_vec.clone().expect("filtered non-null");
                SimilarityHit {
                    image,
                    distance: 1.0 - cosine(&stored, query_vector),
                }
            })
            .collect();
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).expect("finite"));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn ensure_vector_infra(&self) -> Result<(), StoreError> {
        self.check_up()?;
        if self.vectors_on() {
            Ok(())
        } else {
            Err(StoreError::VectorBackendUnavailable(
                "mock vector backend disabled".to_string(),
            ))
        }
    }

    async fn upsert_user(&self, auth_id: &str, email: Option<&str>) -> Result<User, StoreError> {
        self.check_up()?;
        let mut users = self.users.lock().unwrap();
        let user = users.entry(auth_id.to_string()).or_insert_with(|| User {
            id: UserId::new(),
            auth_id: auth_id.to_string(),
            email: None,
            created_at: Utc::now(),
        });
        if user.email.is_none() {
            user.email = email.map(str::to_string);
        }
        Ok(user.clone())
    }

    async fn record_scan_receipt(
        &self,
        user_id: &UserId,
        drive_folder_id: &DriveFolderId,
    ) -> Result<(), StoreError> {
        let mut receipts = self.receipts.lock().unwrap();
        if !receipts
            .iter()
            .any(|(u, f)| u == user_id && f == drive_folder_id)
        {
            receipts.push((*user_id, drive_folder_id.clone()));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_up()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ============================================================================
// MockQueue
// ============================================================================

#[derive(Default)]
pub struct MockQueue {
    jobs: Mutex<Vec<Job>>,
    next_id: AtomicI64,
    /// Flip to true to simulate a broker outage
    pub unavailable: AtomicBool,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_up(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(QueueError::Unavailable("mock outage".to_string()));
        }
        Ok(())
    }

    /// Test hook: all jobs regardless of state
    pub fn all_jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    /// Test hook: force a job into active with an old heartbeat
    pub fn make_stalled(&self, id: i64, minutes: i64) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.state = JobState::Active;
            job.started_at = Some(Utc::now() - Duration::minutes(minutes));
            job.heartbeat_at = Some(Utc::now() - Duration::minutes(minutes));
        }
    }
}

#[async_trait::async_trait]
impl JobQueue for MockQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: &JobPayload,
    ) -> Result<bool, QueueError> {
        self.check_up()?;
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.iter().any(|j| j.job_id == job_id) {
            return Ok(false);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        jobs.push(Job {
            id,
            queue,
            job_id: job_id.to_string(),
            payload: payload.clone(),
            state: JobState::Queued,
            attempts: 0,
            max_attempts: 3,
            enqueued_at: Utc::now(),
            started_at: None,
            heartbeat_at: None,
            error: None,
        });
        Ok(true)
    }

    async fn enqueue_batch(
        &self,
        queue: QueueName,
        batch: Vec<(String, JobPayload)>,
    ) -> Result<u64, QueueError> {
        let mut inserted = 0;
        for (job_id, payload) in batch {
            if self.enqueue(queue, &job_id, &payload).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn claim(&self, queue: QueueName) -> Result<Option<Job>, QueueError> {
        self.check_up()?;
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .filter(|j| j.queue == queue && j.state == JobState::Queued)
            .min_by_key(|j| (j.enqueued_at, j.id));
        Ok(job.map(|job| {
            job.state = JobState::Active;
            job.attempts += 1;
            job.started_at = Some(Utc::now());
            job.heartbeat_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn heartbeat(&self, id: i64) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;
        job.heartbeat_at = Some(Utc::now());
        Ok(())
    }

    async fn complete(&self, id: i64) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;
        job.state = JobState::Completed;
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str) -> Result<JobState, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;
        job.error = Some(error.to_string());
        job.state = if job.attempts >= job.max_attempts {
            JobState::Failed
        } else {
            JobState::Queued
        };
        Ok(job.state)
    }

    async fn peek_counts(&self, queue: QueueName) -> Result<QueueStats, QueueError> {
        self.check_up()?;
        let jobs = self.jobs.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in jobs.iter().filter(|j| j.queue == queue) {
            match job.state {
                JobState::Queued => stats.queued += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn list_jobs(
        &self,
        queue: QueueName,
        states: &[JobState],
    ) -> Result<Vec<Job>, QueueError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| j.queue == queue && states.contains(&j.state))
            .cloned()
            .collect())
    }

    async fn remove(&self, id: i64) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn purge(&self, queue: QueueName) -> Result<u64, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.queue != queue);
        Ok((before - jobs.len()) as u64)
    }

    async fn fail_stalled(&self, threshold: Duration, reason: &str) -> Result<u64, QueueError> {
        self.check_up()?;
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let mut stalled = 0;
        for job in jobs.iter_mut() {
            if job.is_stalled(now, threshold) {
                job.state = JobState::Failed;
                job.error = Some(reason.to_string());
                stalled += 1;
            }
        }
        Ok(stalled)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check_up()
    }
}

// ============================================================================
// MockDrive
// ============================================================================

#[derive(Default)]
pub struct MockDrive {
    /// drive folder id -> (name, files); files outside the supported MIME
    /// set are filtered at listing time, like the real adapter
    listings: Mutex<HashMap<DriveFolderId, (Option<String>, Vec<DriveFile>)>>,
    /// drive file id -> downloadable bytes
    bytes: Mutex<HashMap<DriveFileId, Vec<u8>>>,
    /// Flip to true to answer PermissionDenied on listing
    pub deny_access: AtomicBool,
}

impl MockDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a folder with files; bytes default to the file name
    pub fn seed_folder(&self, folder_id: &str, name: &str, files: Vec<DriveFile>) {
        let id = DriveFolderId::new(folder_id.to_string()).unwrap();
        let mut bytes = self.bytes.lock().unwrap();
        for file in &files {
            bytes
                .entry(file.id.clone())
                .or_insert_with(|| file.name.clone().into_bytes());
        }
        self.listings
            .lock()
            .unwrap()
            .insert(id, (Some(name.to_string()), files));
    }

    /// Overrides the downloadable bytes for a file
    pub fn seed_bytes(&self, file_id: &DriveFileId, content: &[u8]) {
        self.bytes
            .lock()
            .unwrap()
            .insert(file_id.clone(), content.to_vec());
    }

    /// Drops a file's bytes so downloads fail (listing is unaffected)
    pub fn bytes_remove(&self, file_id: &DriveFileId) {
        self.bytes.lock().unwrap().remove(file_id);
    }

    /// Removes a file from a folder's listing (sync delete scenarios)
    pub fn remove_file(&self, folder_id: &str, file_id: &str) {
        let id = DriveFolderId::new(folder_id.to_string()).unwrap();
        if let Some((_, files)) = self.listings.lock().unwrap().get_mut(&id) {
            files.retain(|f| f.id.as_str() != file_id);
        }
    }

    /// Adds a file to a folder's listing (sync add scenarios)
    pub fn add_file(&self, folder_id: &str, file: DriveFile) {
        let id = DriveFolderId::new(folder_id.to_string()).unwrap();
        self.bytes
            .lock()
            .unwrap()
            .entry(file.id.clone())
            .or_insert_with(|| file.name.clone().into_bytes());
        if let Some((_, files)) = self.listings.lock().unwrap().get_mut(&id) {
            files.push(file);
        }
    }
}

/// Builds a listed drive file fixture
pub fn drive_file(id: &str, name: &str, mime: &str) -> DriveFile {
    DriveFile {
        id: DriveFileId::new(id.to_string()).unwrap(),
        name: name.to_string(),
        mime_type: mime.to_string(),
        thumbnail_url: Some(format!("https://thumbs.example/{id}=s220")),
        view_url: Some(format!("https://drive.google.com/file/d/{id}/view")),
        size: Some(1024),
        checksum: None,
        modified_at: None,
        version_token: Some(VersionToken::new("v1".to_string()).unwrap()),
    }
}

#[async_trait::async_trait]
impl DriveProvider for MockDrive {
    fn parse_folder_url(&self, raw: &str) -> Result<DriveFolderId, DriveError> {
        let prefix = "https://drive.google.com/drive/folders/";
        match raw.strip_prefix(prefix) {
            Some(id) if !id.is_empty() => DriveFolderId::new(id.trim_end_matches('/').to_string())
                .map_err(|e| DriveError::InvalidUrl(e.to_string())),
            _ => Err(DriveError::InvalidUrl(raw.to_string())),
        }
    }

    async fn list_images_recursive(
        &self,
        folder_id: &DriveFolderId,
        credential: Option<&UserCredential>,
    ) -> Result<FolderListing, DriveError> {
        if self.deny_access.load(Ordering::Relaxed) {
            let msg = if credential.is_some() {
                "token lacks access"
            } else {
                "folder is private"
            };
            return Err(DriveError::PermissionDenied(msg.to_string()));
        }
        let listings = self.listings.lock().unwrap();
        let (name, files) = listings
            .get(folder_id)
            .cloned()
            .ok_or_else(|| DriveError::PermissionDenied("folder is private".to_string()))?;
        Ok(FolderListing {
            folder_name: name,
            images: files
                .into_iter()
                .filter(|f| is_supported_mime(&f.mime_type))
                .collect(),
        })
    }

    async fn download_bytes(
        &self,
        file_id: &DriveFileId,
        _credential: Option<&UserCredential>,
    ) -> Result<Vec<u8>, DriveError> {
        self.bytes
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| DriveError::DownloadFailed {
                file_id: file_id.to_string(),
                reason: "no such file".to_string(),
            })
    }

    async fn fresh_thumbnail_url(
        &self,
        file_id: &DriveFileId,
        size: u32,
        _credential: Option<&UserCredential>,
    ) -> Result<String, DriveError> {
        Ok(format!("https://thumbs.example/{file_id}=s{size}"))
    }

    async fn fetch_thumbnail(
        &self,
        file_id: &DriveFileId,
        _size: u32,
        _credential: Option<&UserCredential>,
    ) -> Result<(Vec<u8>, String), DriveError> {
        let bytes = self
            .bytes
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| DriveError::ThumbnailUnavailable(file_id.to_string()))?;
        Ok((bytes, "image/jpeg".to_string()))
    }
}

// ============================================================================
// MockCaptioner
// ============================================================================

/// Deterministic captioner: the caption is the downloaded bytes as text,
/// tags are its first three words, and embeddings are L2-normalized
/// hashed bags of non-stopword tokens — identical normalized text embeds
/// identically, overlapping vocabulary lands near in cosine space.
pub struct MockCaptioner {
    pub dim: usize,
    /// Flip to true to fail every model call with AuthInvalid
    pub auth_broken: AtomicBool,
}

impl MockCaptioner {
    pub fn new() -> Self {
        Self {
            dim: 256,
            auth_broken: AtomicBool::new(false),
        }
    }

    fn check_auth(&self) -> Result<(), CaptionError> {
        if self.auth_broken.load(Ordering::Relaxed) {
            return Err(CaptionError::AuthInvalid("mock key revoked".to_string()));
        }
        Ok(())
    }
}

/// Words the mock embedder ignores, so content words dominate cosine
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "in", "on", "at", "against", "with", "to", "is", "are",
];

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Hashed-bag embedding over normalized text
pub fn mock_embed(text: &str, dim: usize) -> Vec<f32> {
    let normalized = normalize_text(text);
    let mut vector = vec![0.0_f32; dim];
    for token in normalized.split_whitespace() {
        if STOPWORDS.contains(&token) {
            continue;
        }
        let bucket = (fnv1a(token) % dim as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait::async_trait]
impl Captioner for MockCaptioner {
    async fn caption(&self, bytes: &[u8], _mime_type: &str) -> Result<ImageCaption, CaptionError> {
        self.check_auth()?;
        let caption = String::from_utf8_lossy(bytes).to_string();
        let tags: Vec<String> = caption
            .split_whitespace()
            .take(3)
            .map(|w| w.to_lowercase())
            .collect();
        Ok(ImageCaption { caption, tags })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CaptionError> {
        self.check_auth()?;
        Ok(mock_embed(text, self.dim))
    }

    async fn embed_caption(
        &self,
        caption: &str,
        tags: &[String],
    ) -> Result<Vec<f32>, CaptionError> {
        let combined = format!("{caption} {}", tags.join(" "));
        self.embed(&combined).await
    }
}

// ============================================================================
// Harness assembly
// ============================================================================

/// Everything a scenario needs, wired the way the daemon wires production
pub struct Harness {
    pub store: Arc<MockStore>,
    pub queue: Arc<MockQueue>,
    pub drive: Arc<MockDrive>,
    pub captioner: Arc<MockCaptioner>,
    pub progress: Arc<FolderProgressMap>,
    pub service: PipelineService,
    pub folder_worker: FolderWorker,
    pub image_worker: ImageWorker,
    pub recovery: RecoverySupervisor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cap(None)
    }

    pub fn with_cap(folder_cap: Option<u32>) -> Self {
        let store = Arc::new(MockStore::new());
        let queue = Arc::new(MockQueue::new());
        let drive = Arc::new(MockDrive::new());
        let captioner = Arc::new(MockCaptioner::new());
        let progress = Arc::new(FolderProgressMap::new());
        let limiter = Arc::new(SlidingWindowLimiter::unbounded());

        let store_ref: drivelens_engine::StoreRef = store.clone();
        let queue_ref: drivelens_engine::QueueRef = queue.clone();
        let drive_ref: drivelens_engine::DriveRef = drive.clone();
        let captioner_ref: drivelens_engine::CaptionerRef = captioner.clone();

        let sync = Arc::new(SyncEngine::new(
            drive_ref.clone(),
            store_ref.clone(),
            queue_ref.clone(),
            folder_cap,
        ));
        let ingest = IngestCoordinator::new(
            drive_ref.clone(),
            store_ref.clone(),
            queue_ref.clone(),
            sync.clone(),
            folder_cap,
        );
        let search = SearchEngine::new(store_ref.clone(), captioner_ref.clone(), limiter.clone());
        let service = PipelineService::new(
            store_ref.clone(),
            queue_ref.clone(),
            drive_ref.clone(),
            ingest,
            sync,
            search,
        );
        let folder_worker = FolderWorker::new(store_ref.clone(), queue_ref.clone(), progress.clone());
        let image_worker = ImageWorker::new(
            store_ref.clone(),
            drive_ref.clone(),
            captioner_ref,
            limiter,
            progress.clone(),
        );
        let recovery = RecoverySupervisor::new(store_ref, queue_ref, progress.clone());

        Self {
            store,
            queue,
            drive,
            captioner,
            progress,
            service,
            folder_worker,
            image_worker,
            recovery,
        }
    }

    /// Drains both queues, running every claimable job through the
    /// workers, until nothing is left to claim. Returns jobs executed.
    pub async fn drain_queues(&self) -> usize {
        let mut executed = 0;
        loop {
            let mut ran_any = false;

            while let Ok(Some(job)) = self.queue.claim(QueueName::Folders).await {
                ran_any = true;
                executed += 1;
                let outcome = match &job.payload {
                    JobPayload::Folder {
                        folder_id,
                        credential,
                        ..
                    } => self.folder_worker.process(folder_id, credential.as_ref()).await,
                    other => panic!("unexpected payload on folders queue: {other:?}"),
                };
                finish(&*self.queue, job.id, outcome.map(|_| ())).await;
            }

            while let Ok(Some(job)) = self.queue.claim(QueueName::Images).await {
                ran_any = true;
                executed += 1;
                let outcome = match &job.payload {
                    JobPayload::ImageBatch {
                        folder_id,
                        image_ids,
                        credential,
                    } => self
                        .image_worker
                        .process_batch(folder_id, image_ids, credential.as_ref())
                        .await
                        .map(|_| ()),
                    JobPayload::Image {
                        image_id,
                        folder_id,
                        credential,
                    } => self
                        .image_worker
                        .process_batch(folder_id, &[*image_id], credential.as_ref())
                        .await
                        .map(|_| ()),
                    other => panic!("unexpected payload on images queue: {other:?}"),
                };
                finish(&*self.queue, job.id, outcome).await;
            }

            if !ran_any {
                return executed;
            }
        }
    }

    /// Asserts the universal invariants over every folder and image
    pub async fn assert_invariants(&self) {
        for folder in self.store.folders.lock().unwrap().values() {
            assert!(
                folder.processed_images <= folder.total_images,
                "folder {} processed {} > total {}",
                folder.id,
                folder.processed_images,
                folder.total_images
            );
            let counts_complete =
                folder.total_images > 0 && folder.processed_images == folder.total_images;
            if folder.status == FolderStatus::Completed {
                assert!(
                    counts_complete,
                    "folder {} completed with counts {}/{}",
                    folder.id, folder.processed_images, folder.total_images
                );
            }
        }
        for image in self.store.images.lock().unwrap().values() {
            image
                .check_completion_invariant()
                .unwrap_or_else(|e| panic!("{e}"));
            assert!(
                is_supported_mime(&image.mime_type) || image.status == ImageStatus::Failed,
                "unsupported-mime image {} not failed",
                image.id
            );
        }
    }
}

async fn finish(queue: &MockQueue, job_id: i64, outcome: anyhow::Result<()>) {
    match outcome {
        Ok(()) => queue.complete(job_id).await.expect("job exists"),
        Err(err) => {
            queue.fail(job_id, &err.to_string()).await.expect("job exists");
        }
    }
}
