//! Service-level error taxonomy
//!
//! The stable, transport-facing error surface. Adapter errors fold into
//! these variants; an HTTP front-end maps them 1:1 onto status codes and
//! a CLI onto exit codes, so the kinds here must not churn.

use drivelens_core::ports::captioner::CaptionError;
use drivelens_core::ports::drive::DriveError;
use drivelens_core::ports::queue::QueueError;
use drivelens_core::ports::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the service facade
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed request parameter (bad topK, empty query, bad size)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The submitted URL is not a recognized drive folder URL
    #[error("Invalid drive folder URL: {0}")]
    InvalidUrl(String),

    /// The drive refused access; message says whether a credential helps
    #[error("{0}")]
    PermissionDenied(String),

    /// A referenced folder or image does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The folder holds more images than the per-folder cap allows
    #[error("Folder has {count} images, exceeding the cap of {cap}")]
    FolderCapExceeded {
        /// Images the folder would hold
        count: usize,
        /// Configured cap
        cap: u32,
    },

    /// The folder tree contains no supported images
    #[error("The folder contains no supported images")]
    EmptyFolder,

    /// The database cannot be reached; ingest and sync fail fast
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The queue broker cannot be reached; ingest and sync fail fast
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Anything else; logged with context, opaque to clients
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Unavailable(msg) => ServiceError::StoreUnavailable(msg),
            // Vector unavailability is handled before this conversion by
            // the search degradation path; reaching here is a bug worth
            // surfacing loudly rather than masking.
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Unavailable(msg) => ServiceError::QueueUnavailable(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<DriveError> for ServiceError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::InvalidUrl(msg) => ServiceError::InvalidUrl(msg),
            DriveError::PermissionDenied(msg) => ServiceError::PermissionDenied(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<CaptionError> for ServiceError {
    fn from(err: CaptionError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
