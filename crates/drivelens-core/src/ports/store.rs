//! Store port (persistence adapter interface)
//!
//! The production implementation is Postgres with the pgvector extension.
//! Every operation runs in its own transaction. The one cross-row
//! invariant — `processed_images <= total_images` — is maintained by
//! recomputing folder counters from image row counts inside the same
//! transaction as the folder update ([`ImageStore::refresh_folder_progress`]).

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::folder::{Folder, FolderStatus};
use crate::domain::image::Image;
use crate::domain::newtypes::{DriveFileId, DriveFolderId, FolderId, ImageId, UserId, VersionToken};
use crate::domain::user::User;

/// Fields for a new folder row
#[derive(Debug, Clone)]
pub struct NewFolder {
    /// Drive-assigned folder id (unique)
    pub drive_folder_id: DriveFolderId,
    /// Discovered folder name
    pub name: Option<String>,
    /// Submission URL
    pub origin_url: String,
    /// Owning user, when authenticated
    pub user_id: Option<UserId>,
    /// Count of admitted images discovered at ingest
    pub total_images: i32,
}

/// Fields for a new image row (created in `pending`)
#[derive(Debug, Clone)]
pub struct NewImage {
    /// Drive-assigned file id (unique)
    pub drive_file_id: DriveFileId,
    /// Owning folder
    pub folder_id: FolderId,
    /// Filename on the drive
    pub name: String,
    /// MIME type, already validated against the supported set
    pub mime_type: String,
    /// Thumbnail URL from listing metadata
    pub thumbnail_url: Option<String>,
    /// Human-viewable URL
    pub view_url: Option<String>,
    /// Size in bytes
    pub size_bytes: Option<i64>,
    /// Content checksum
    pub checksum: Option<String>,
    /// Last drive-side modification time
    pub modified_at: Option<DateTime<Utc>>,
    /// Revision marker
    pub version_token: Option<VersionToken>,
}

/// Per-status image counts for one folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    /// Total rows across all statuses
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Match quality of a filename search hit, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilenameRank {
    /// Case-insensitive exact equality
    Exact,
    /// Name starts with the pattern
    Prefix,
    /// Pattern occurs anywhere in the name
    Substring,
}

/// One hit from the lexical search path
#[derive(Debug, Clone)]
pub struct FilenameHit {
    /// Matching image row
    pub image: Image,
    /// Match quality
    pub rank: FilenameRank,
}

/// One hit from the vector search path
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    /// Matching image row
    pub image: Image,
    /// Cosine distance to the query vector (ascending = better)
    pub distance: f64,
}

impl SimilarityHit {
    /// Cosine similarity, 1 − distance
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Row selection for [`ImageStore::reset_images_to_pending`]
#[derive(Debug, Clone)]
pub enum ResetFilter {
    /// One image by id
    Image(ImageId),
    /// Every `failed` or `pending` image in a folder (retry-all)
    FolderRetryable(FolderId),
    /// Images stuck in `processing` whose updated-at is older than the
    /// given instant (recovery sweep)
    StuckSince(DateTime<Utc>),
    /// An explicit id list (batch short-circuit)
    Ids(Vec<ImageId>),
}

/// Errors surfaced by the store adapter
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row lookup found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The vector extension or index cannot be provisioned; search
    /// degrades to lexical, ingestion continues without vectors
    #[error("Vector backend unavailable: {0}")]
    VectorBackendUnavailable(String),

    /// The database cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A query failed for a reason other than the above
    #[error("Store query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Returns true when the error means "degrade semantic search"
    pub fn is_vector_unavailable(&self) -> bool {
        matches!(self, StoreError::VectorBackendUnavailable(_))
    }
}

/// Port trait for the persistent corpus
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    // ------------------------------------------------------------------
    // Folders
    // ------------------------------------------------------------------

    /// Inserts a folder row in `pending`
    async fn create_folder(&self, folder: NewFolder) -> Result<Folder, StoreError>;

    /// Fetches a folder by internal id
    async fn get_folder(&self, id: &FolderId) -> Result<Folder, StoreError>;

    /// Looks a folder up by its drive id
    async fn find_folder_by_drive_id(
        &self,
        drive_folder_id: &DriveFolderId,
    ) -> Result<Option<Folder>, StoreError>;

    /// Sets the folder status (and bumps updated-at)
    async fn set_folder_status(&self, id: &FolderId, status: FolderStatus)
        -> Result<(), StoreError>;

    /// Updates the discovered folder name
    async fn set_folder_name(&self, id: &FolderId, name: &str) -> Result<(), StoreError>;

    /// Links an owning user to a folder that has none
    async fn link_folder_user(&self, id: &FolderId, user_id: &UserId) -> Result<(), StoreError>;

    /// Recomputes `total_images` and `processed_images` from image rows
    /// and keeps the completion rule a biconditional: counts complete
    /// flips status to `completed`, a completed folder whose counts stop
    /// being complete demotes to `processing` — all in one transaction.
    /// Returns the updated folder.
    async fn refresh_folder_progress(&self, id: &FolderId) -> Result<Folder, StoreError>;

    /// Folders whose status is `processing`
    async fn list_active_folders(&self) -> Result<Vec<Folder>, StoreError>;

    /// Non-completed folders that still have pending images
    async fn list_folders_with_pending(&self) -> Result<Vec<Folder>, StoreError>;

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Bulk-inserts image rows in `pending`, skipping drive-file-id
    /// conflicts. Returns the rows actually inserted.
    async fn create_images_bulk(&self, images: Vec<NewImage>) -> Result<Vec<Image>, StoreError>;

    /// Fetches an image by internal id
    async fn get_image(&self, id: &ImageId) -> Result<Image, StoreError>;

    /// All images of a folder, name ascending
    async fn list_images(&self, folder_id: &FolderId) -> Result<Vec<Image>, StoreError>;

    /// Pending images of a folder, oldest first, bounded
    async fn list_pending_images(
        &self,
        folder_id: &FolderId,
        limit: i64,
    ) -> Result<Vec<Image>, StoreError>;

    /// Drive file ids currently stored for a folder (sync diff input)
    async fn list_drive_file_ids(
        &self,
        folder_id: &FolderId,
    ) -> Result<Vec<DriveFileId>, StoreError>;

    /// Takes the `pending → processing` transition. Returns false when the
    /// row was not pending — another worker holds it.
    async fn set_image_processing(&self, id: &ImageId) -> Result<bool, StoreError>;

    /// Atomically writes caption, tags, vector, and status `completed`.
    /// The vector is dropped silently when the vector backend is
    /// unavailable; caption and tags persist regardless.
    async fn set_image_completed(
        &self,
        id: &ImageId,
        caption: &str,
        tags: &str,
        vector: &[f32],
    ) -> Result<(), StoreError>;

    /// Records a permanent per-row failure
    async fn set_image_failed(&self, id: &ImageId, error: &str) -> Result<(), StoreError>;

    /// Resets matching rows to `pending`, nulling caption, tags, vector
    /// and error atomically. Returns the rows that were reset.
    async fn reset_images_to_pending(&self, filter: ResetFilter) -> Result<Vec<Image>, StoreError>;

    /// Per-status counts for one folder
    async fn count_images_by_status(&self, folder_id: &FolderId)
        -> Result<StatusCounts, StoreError>;

    /// Deletes rows whose drive files disappeared upstream. Rows currently
    /// `processing` are skipped. Returns the number deleted.
    async fn delete_images_by_drive_ids(
        &self,
        folder_id: &FolderId,
        drive_file_ids: &[DriveFileId],
    ) -> Result<u64, StoreError>;

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Lexical filename search, ranked exact > prefix > substring,
    /// ties broken by name ascending
    async fn search_by_filename(
        &self,
        folder_id: &FolderId,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<FilenameHit>, StoreError>;

    /// Vector similarity search over completed rows with non-null
    /// vectors, ascending cosine distance
    async fn search_by_similarity(
        &self,
        folder_id: &FolderId,
        query_vector: &[f32],
        limit: i64,
    ) -> Result<Vec<SimilarityHit>, StoreError>;

    /// Idempotently provisions the vector extension, column and ANN
    /// index. Memoized per process; a deployment without the extension
    /// yields [`StoreError::VectorBackendUnavailable`] on every call.
    async fn ensure_vector_infra(&self) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Users and receipts
    // ------------------------------------------------------------------

    /// Finds or creates a user by auth id
    async fn upsert_user(&self, auth_id: &str, email: Option<&str>) -> Result<User, StoreError>;

    /// Records (or refreshes) a scan receipt for the pair
    async fn record_scan_receipt(
        &self,
        user_id: &UserId,
        drive_folder_id: &DriveFolderId,
    ) -> Result<(), StoreError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), StoreError>;
}
