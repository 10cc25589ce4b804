//! DriveLens processing engine
//!
//! Everything between the adapters: the folder and image workers that
//! drain the queue, the sync engine that reconciles local state with the
//! drive, the search engine with its lexical/semantic dispatch, the
//! ingest coordinator, the recovery supervisor, and the worker runtime
//! that ties them to the queue.
//!
//! All components depend only on the port traits in `drivelens-core`;
//! the composition root wires in the real adapters, tests wire in
//! deterministic in-memory fakes.

pub mod error;
pub mod folder_worker;
pub mod image_worker;
pub mod ingest;
pub mod progress;
pub mod recovery;
pub mod runtime;
pub mod search;
pub mod service;
pub mod sync;

pub use error::ServiceError;
pub use folder_worker::FolderWorker;
pub use image_worker::{BatchResult, ImageWorker};
pub use ingest::{IngestCoordinator, Submitter};
pub use progress::FolderProgressMap;
pub use recovery::{RecoveryReport, RecoverySupervisor};
pub use runtime::WorkerRuntime;
pub use search::{SearchEngine, SearchResponse, SearchType};
pub use service::{FolderDetails, HealthReport, PipelineService, RetryTarget};
pub use sync::{SyncEngine, SyncOutcome};

use std::sync::Arc;

use drivelens_core::ports::captioner::Captioner;
use drivelens_core::ports::drive::DriveProvider;
use drivelens_core::ports::queue::JobQueue;
use drivelens_core::ports::store::ImageStore;

/// Shared handle types used across the engine
pub type StoreRef = Arc<dyn ImageStore>;
pub type QueueRef = Arc<dyn JobQueue>;
pub type DriveRef = Arc<dyn DriveProvider>;
pub type CaptionerRef = Arc<dyn Captioner>;

/// Images are fanned out to the captioning workers in batches of this size
pub const BATCH_SIZE: usize = 5;

/// A row in `processing` with no write for this long is considered stuck
pub const STUCK_THRESHOLD_SECS: i64 = 5 * 60;
