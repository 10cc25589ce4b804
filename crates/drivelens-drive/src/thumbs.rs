//! Thumbnail resolution and caching
//!
//! Drive thumbnail links are short-lived signed URLs. The cache keeps
//! resolved links for about two hours, capped at roughly ten thousand
//! entries; eviction is opportunistic, running when an insert pushes the
//! map over the cap. A fetch that hits an expired link invalidates the
//! entry and re-resolves once.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use drivelens_core::domain::newtypes::DriveFileId;
use drivelens_core::ports::drive::{DriveError, UserCredential};
use tracing::debug;

use crate::client::{DriveClient, FileResource};

/// How long a resolved thumbnail URL is trusted
const ENTRY_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Soft cap on cached entries
const CAPACITY: usize = 10_000;

/// Thumbnail sizes are clamped to this range
const MIN_SIZE: u32 = 32;
const MAX_SIZE: u32 = 1600;

/// Deadline for fetching thumbnail bytes
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CachedUrl {
    url: String,
    resolved_at: Instant,
}

/// Process-local cache of resolved thumbnail URLs
pub struct ThumbnailCache {
    entries: DashMap<(String, u32), CachedUrl>,
    ttl: Duration,
    capacity: usize,
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new(ENTRY_TTL, CAPACITY)
    }
}

impl ThumbnailCache {
    /// Creates a cache with explicit TTL and capacity (tests shrink both)
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Clamp a requested thumbnail size into the supported range
    pub fn clamp_size(size: u32) -> u32 {
        size.clamp(MIN_SIZE, MAX_SIZE)
    }

    /// Cached URL for the pair, if present and fresh
    fn get(&self, file_id: &DriveFileId, size: u32) -> Option<String> {
        let key = (file_id.to_string(), size);
        let entry = self.entries.get(&key)?;
        if entry.resolved_at.elapsed() < self.ttl {
            Some(entry.url.clone())
        } else {
            drop(entry);
            self.entries.remove(&key);
            None
        }
    }

    fn insert(&self, file_id: &DriveFileId, size: u32, url: String) {
        self.entries.insert(
            (file_id.to_string(), size),
            CachedUrl {
                url,
                resolved_at: Instant::now(),
            },
        );
        if self.entries.len() > self.capacity {
            self.evict();
        }
    }

    fn invalidate(&self, file_id: &DriveFileId, size: u32) {
        self.entries.remove(&(file_id.to_string(), size));
    }

    /// Drops expired entries, then the oldest tenth if still over cap
    fn evict(&self) {
        self.entries
            .retain(|_, v| v.resolved_at.elapsed() < self.ttl);

        if self.entries.len() > self.capacity {
            let mut ages: Vec<((String, u32), Instant)> = self
                .entries
                .iter()
                .map(|e| (e.key().clone(), e.value().resolved_at))
                .collect();
            ages.sort_by_key(|(_, at)| *at);
            let to_drop = self.entries.len() - self.capacity + self.capacity / 10;
            for (key, _) in ages.into_iter().take(to_drop) {
                self.entries.remove(&key);
            }
        }
        debug!(entries = self.entries.len(), "Thumbnail cache evicted");
    }

    /// Entries currently cached (test hook)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves a fresh thumbnail URL at the requested (clamped) size,
/// consulting the cache first
pub async fn fresh_thumbnail_url(
    client: &DriveClient,
    cache: &ThumbnailCache,
    file_id: &DriveFileId,
    size: u32,
    credential: Option<&UserCredential>,
) -> Result<String, DriveError> {
    let size = ThumbnailCache::clamp_size(size);

    if let Some(url) = cache.get(file_id, size) {
        return Ok(url);
    }

    let url = resolve_thumbnail_url(client, file_id, size, credential).await?;
    cache.insert(file_id, size, url.clone());
    Ok(url)
}

/// Fetches thumbnail bytes, re-resolving once when the cached URL has
/// gone stale on the drive side
pub async fn fetch_thumbnail(
    client: &DriveClient,
    cache: &ThumbnailCache,
    file_id: &DriveFileId,
    size: u32,
    credential: Option<&UserCredential>,
) -> Result<(Vec<u8>, String), DriveError> {
    let size = ThumbnailCache::clamp_size(size);
    let url = fresh_thumbnail_url(client, cache, file_id, size, credential).await?;

    match fetch_url(client, &url, file_id).await {
        Ok(result) => Ok(result),
        Err(_) => {
            // The signed URL likely expired; drop it and resolve anew.
            cache.invalidate(file_id, size);
            let url = fresh_thumbnail_url(client, cache, file_id, size, credential).await?;
            fetch_url(client, &url, file_id).await
        }
    }
}

/// Reads the thumbnail link from file metadata and pins the size suffix
async fn resolve_thumbnail_url(
    client: &DriveClient,
    file_id: &DriveFileId,
    size: u32,
    credential: Option<&UserCredential>,
) -> Result<String, DriveError> {
    let path = format!(
        "/drive/v3/files/{}?fields=id,thumbnailLink",
        file_id.as_str()
    );
    let response = client.send(&path, credential, FETCH_TIMEOUT).await?;
    let response = DriveClient::check_status(response, credential, &format!("file {file_id}"))?;

    let resource: FileResource = response
        .json()
        .await
        .map_err(|e| DriveError::Transient(format!("thumbnail metadata parse failed: {e}")))?;

    let link = resource
        .thumbnail_link
        .ok_or_else(|| DriveError::ThumbnailUnavailable(file_id.to_string()))?;

    Ok(rewrite_size(&link, size))
}

/// Drive thumbnail links end in a size directive like `=s220`; replace it
/// (or append one) so the drive renders at the requested size.
fn rewrite_size(link: &str, size: u32) -> String {
    match link.rfind("=s") {
        Some(idx) if link[idx + 2..].chars().all(|c| c.is_ascii_digit()) => {
            format!("{}=s{}", &link[..idx], size)
        }
        _ => format!("{link}=s{size}"),
    }
}

/// Plain GET of the signed URL; no API auth, the signature is the auth
async fn fetch_url(
    client: &DriveClient,
    url: &str,
    file_id: &DriveFileId,
) -> Result<(Vec<u8>, String), DriveError> {
    let response = client
        .http_client()
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| DriveError::Transient(format!("thumbnail fetch failed: {e}")))?;

    if !response.status().is_success() {
        return Err(DriveError::ThumbnailUnavailable(file_id.to_string()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DriveError::Transient(format!("thumbnail body read failed: {e}")))?;

    Ok((bytes.to_vec(), content_type))
}
