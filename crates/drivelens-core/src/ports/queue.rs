//! Job queue port (durable broker adapter interface)
//!
//! Two logical queues, `folders` and `images`, with client-supplied
//! idempotency keys: a second enqueue of the same key is a no-op. Payloads
//! form a closed variant set dispatched on a serde tag; new job kinds
//! widen the enum rather than duck-typing new shapes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{DriveFolderId, FolderId, ImageId};
use crate::ports::drive::UserCredential;

/// The two logical queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Folder enumeration jobs
    Folders,
    /// Image (batch) captioning jobs
    Images,
}

impl QueueName {
    /// Queue name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Folders => "folders",
            QueueName::Images => "images",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed job payloads — a closed variant set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Enumerate a folder and fan out image batches
    Folder {
        /// Store row of the folder
        folder_id: FolderId,
        /// Drive id, for logging and re-listing
        drive_folder_id: DriveFolderId,
        /// Per-request user credential, threaded through explicitly
        credential: Option<UserCredential>,
    },
    /// Caption one image
    Image {
        /// Store row of the image
        image_id: ImageId,
        /// Owning folder, for progress updates
        folder_id: FolderId,
        /// Per-request user credential
        credential: Option<UserCredential>,
    },
    /// Caption a batch of images in parallel
    ImageBatch {
        /// Owning folder
        folder_id: FolderId,
        /// Batch members
        image_ids: Vec<ImageId>,
        /// Per-request user credential
        credential: Option<UserCredential>,
    },
}

impl JobPayload {
    /// Queue this payload belongs on
    pub fn queue(&self) -> QueueName {
        match self {
            JobPayload::Folder { .. } => QueueName::Folders,
            JobPayload::Image { .. } | JobPayload::ImageBatch { .. } => QueueName::Images,
        }
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting (possibly until a backoff deadline)
    Queued,
    /// Claimed by a worker
    Active,
    /// Finished successfully
    Completed,
    /// Attempts exhausted or explicitly failed
    Failed,
}

impl JobState {
    /// State name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Parse a stored state string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobState::Queued),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

/// One durable job
#[derive(Debug, Clone)]
pub struct Job {
    /// Broker-assigned row id
    pub id: i64,
    /// Queue the job lives on
    pub queue: QueueName,
    /// Client-supplied idempotency key
    pub job_id: String,
    /// Typed payload
    pub payload: JobPayload,
    /// Lifecycle state
    pub state: JobState,
    /// Attempts consumed so far
    pub attempts: i32,
    /// Attempt budget
    pub max_attempts: i32,
    /// When the job was first enqueued
    pub enqueued_at: DateTime<Utc>,
    /// When the current attempt started
    pub started_at: Option<DateTime<Utc>>,
    /// Last worker heartbeat for the current attempt
    pub heartbeat_at: Option<DateTime<Utc>>,
    /// Last recorded error
    pub error: Option<String>,
}

impl Job {
    /// Returns true if the job counts as stalled at `now` given the
    /// heartbeat threshold
    pub fn is_stalled(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.state != JobState::Active {
            return false;
        }
        let last_sign_of_life = self.heartbeat_at.or(self.started_at);
        match last_sign_of_life {
            Some(t) => now - t > threshold,
            None => true,
        }
    }
}

/// Aggregate counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Errors surfaced by the queue adapter
#[derive(Debug, Error)]
pub enum QueueError {
    /// The broker cannot be reached
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// Payload (de)serialization failed
    #[error("Queue payload error: {0}")]
    Serialization(String),

    /// Job lookup found nothing
    #[error("Job not found: {0}")]
    NotFound(i64),

    /// A query failed for a reason other than the above
    #[error("Queue operation failed: {0}")]
    Query(String),
}

/// Port trait for the durable job queue
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues one job. Returns false when the idempotency key already
    /// exists (the enqueue deduplicated to a no-op).
    async fn enqueue(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: &JobPayload,
    ) -> Result<bool, QueueError>;

    /// Enqueues many jobs; returns how many were newly inserted
    async fn enqueue_batch(
        &self,
        queue: QueueName,
        jobs: Vec<(String, JobPayload)>,
    ) -> Result<u64, QueueError>;

    /// Claims the oldest runnable job, moving it to `active`
    async fn claim(&self, queue: QueueName) -> Result<Option<Job>, QueueError>;

    /// Refreshes the heartbeat of an active job
    async fn heartbeat(&self, id: i64) -> Result<(), QueueError>;

    /// Marks an active job completed
    async fn complete(&self, id: i64) -> Result<(), QueueError>;

    /// Records a failed attempt. The job re-queues with backoff while
    /// attempts remain, else moves to `failed`. Returns the resulting
    /// state.
    async fn fail(&self, id: i64, error: &str) -> Result<JobState, QueueError>;

    /// Aggregate counts for one queue
    async fn peek_counts(&self, queue: QueueName) -> Result<QueueStats, QueueError>;

    /// Lists jobs in the given states, oldest first
    async fn list_jobs(
        &self,
        queue: QueueName,
        states: &[JobState],
    ) -> Result<Vec<Job>, QueueError>;

    /// Removes one job outright
    async fn remove(&self, id: i64) -> Result<(), QueueError>;

    /// Deletes every job on a queue; returns the count
    async fn purge(&self, queue: QueueName) -> Result<u64, QueueError>;

    /// Moves active jobs without a heartbeat inside `threshold` to
    /// `failed` with the given reason; returns the count
    async fn fail_stalled(&self, threshold: Duration, reason: &str) -> Result<u64, QueueError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), QueueError>;
}
