//! `DriveProvider` port implementation

use std::sync::Arc;

use drivelens_core::domain::newtypes::{DriveFileId, DriveFolderId};
use drivelens_core::ports::drive::{DriveError, DriveProvider, FolderListing, UserCredential};
use drivelens_limiter::SlidingWindowLimiter;

use crate::client::DriveClient;
use crate::thumbs::ThumbnailCache;
use crate::{download, listing, thumbs, url};

/// Google Drive adapter: client + thumbnail cache behind the port trait
pub struct GoogleDriveProvider {
    client: DriveClient,
    thumbnails: ThumbnailCache,
}

impl GoogleDriveProvider {
    /// Creates a provider against the production API
    pub fn new(service_key: Option<String>, limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self {
            client: DriveClient::new(service_key, limiter),
            thumbnails: ThumbnailCache::default(),
        }
    }

    /// Creates a provider with a custom base URL (useful for testing)
    pub fn with_base_url(
        service_key: Option<String>,
        limiter: Arc<SlidingWindowLimiter>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: DriveClient::with_base_url(service_key, limiter, base_url),
            thumbnails: ThumbnailCache::default(),
        }
    }
}

#[async_trait::async_trait]
impl DriveProvider for GoogleDriveProvider {
    fn parse_folder_url(&self, raw: &str) -> Result<DriveFolderId, DriveError> {
        url::parse_folder_url(raw)
    }

    async fn list_images_recursive(
        &self,
        folder_id: &DriveFolderId,
        credential: Option<&UserCredential>,
    ) -> Result<FolderListing, DriveError> {
        listing::list_images_recursive(&self.client, folder_id, credential).await
    }

    async fn download_bytes(
        &self,
        file_id: &DriveFileId,
        credential: Option<&UserCredential>,
    ) -> Result<Vec<u8>, DriveError> {
        download::download_bytes(&self.client, file_id, credential).await
    }

    async fn fresh_thumbnail_url(
        &self,
        file_id: &DriveFileId,
        size: u32,
        credential: Option<&UserCredential>,
    ) -> Result<String, DriveError> {
        thumbs::fresh_thumbnail_url(&self.client, &self.thumbnails, file_id, size, credential)
            .await
    }

    async fn fetch_thumbnail(
        &self,
        file_id: &DriveFileId,
        size: u32,
        credential: Option<&UserCredential>,
    ) -> Result<(Vec<u8>, String), DriveError> {
        thumbs::fetch_thumbnail(&self.client, &self.thumbnails, file_id, size, credential).await
    }
}
