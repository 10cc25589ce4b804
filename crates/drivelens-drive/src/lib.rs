//! Google Drive adapter
//!
//! Implements the [`DriveProvider`](drivelens_core::ports::DriveProvider)
//! port against the Google Drive v3 API: folder URL parsing, recursive
//! image enumeration with pagination, byte download with backoff and an
//! alternative-endpoint fallback, and thumbnail resolution behind a
//! bounded-TTL cache.
//!
//! Every outbound request passes through the injected drive limiter.

pub mod client;
pub mod download;
pub mod listing;
pub mod provider;
pub mod thumbs;
pub mod url;

pub use client::DriveClient;
pub use provider::GoogleDriveProvider;
pub use thumbs::ThumbnailCache;
pub use url::parse_folder_url;
