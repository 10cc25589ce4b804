//! DriveLens core domain logic
//!
//! This crate holds everything the rest of the workspace agrees on:
//! domain entities and their invariants, validated identifier newtypes,
//! the port traits implemented by the adapter crates, and typed
//! configuration.
//!
//! It deliberately has no async runtime or I/O dependency; adapters and
//! the engine bring their own.

pub mod config;
pub mod domain;
pub mod ports;

pub use config::Config;
pub use domain::errors::DomainError;
pub use domain::folder::{Folder, FolderStatus};
pub use domain::image::{Image, ImageStatus};
pub use domain::newtypes::{
    DriveFileId, DriveFolderId, FolderId, ImageId, UserId, VersionToken,
};
pub use domain::user::{ScanReceipt, User};
