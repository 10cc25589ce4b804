//! In-memory folder progress tracking
//!
//! A monitoring aid only: the persisted counters on the folder row are
//! authoritative, this map just gives cheap ETA math for folders the
//! current process is working on. It is rebuilt lazily after a restart
//! and entries are dropped when a folder completes.

use std::time::Instant;

use dashmap::DashMap;
use drivelens_core::domain::newtypes::FolderId;

/// Progress snapshot for one active folder
#[derive(Debug, Clone)]
pub struct FolderProgress {
    /// When this process started working on the folder
    pub started_at: Instant,
    /// Image count at start
    pub total: i64,
    /// Completed count, updated as members finish
    pub processed: i64,
}

impl FolderProgress {
    /// Estimated seconds until completion, based on observed throughput;
    /// None until at least one image has completed
    pub fn eta_secs(&self) -> Option<f64> {
        if self.processed <= 0 || self.total <= 0 {
            return None;
        }
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let per_image = elapsed / self.processed as f64;
        let remaining = (self.total - self.processed).max(0) as f64;
        Some(per_image * remaining)
    }
}

/// Process-local map of active folder progress
#[derive(Default)]
pub struct FolderProgressMap {
    entries: DashMap<FolderId, FolderProgress>,
}

impl FolderProgressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) tracking a folder
    pub fn start(&self, folder_id: FolderId, total: i64, processed: i64) {
        self.entries.insert(
            folder_id,
            FolderProgress {
                started_at: Instant::now(),
                total,
                processed,
            },
        );
    }

    /// Records the latest processed count; drops the entry once complete
    pub fn update(&self, folder_id: &FolderId, total: i64, processed: i64) {
        if processed >= total && total > 0 {
            self.entries.remove(folder_id);
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(folder_id) {
            entry.total = total;
            entry.processed = processed;
        } else {
            self.start(*folder_id, total, processed);
        }
    }

    /// Current snapshot for a folder, if tracked
    pub fn get(&self, folder_id: &FolderId) -> Option<FolderProgress> {
        self.entries.get(folder_id).map(|e| e.clone())
    }

    /// Stops tracking a folder
    pub fn remove(&self, folder_id: &FolderId) {
        self.entries.remove(folder_id);
    }

    /// Number of folders currently tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no folder is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
