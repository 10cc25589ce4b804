//! Hybrid search engine
//!
//! Classifies each query as lexical (filename-ish: contains a dot or
//! shorter than three characters) or semantic, and dispatches to the
//! matching store query. When the vector backend is unavailable the
//! semantic path transparently falls back to lexical on the same query;
//! no exception ever escapes the search surface because of missing
//! vectors.

use std::sync::Arc;
use std::time::Instant;

use drivelens_caption::{clean_caption, normalize_text};
use drivelens_core::domain::image::Image;
use drivelens_core::domain::newtypes::{FolderId, ImageId};
use drivelens_core::ports::store::FilenameRank;
use drivelens_limiter::SlidingWindowLimiter;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::{CaptionerRef, StoreRef};

/// Hard ceiling on requested result counts
const MAX_TOP_K: usize = 50;

/// Pseudo-similarities for the lexical ranking tiers
const SCORE_EXACT: f64 = 1.0;
const SCORE_PREFIX: f64 = 0.8;
const SCORE_SUBSTRING: f64 = 0.6;

/// Which path produced the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Semantic,
    Filename,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Semantic => "semantic",
            SearchType::Filename => "filename",
        }
    }
}

/// One ranked result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: ImageId,
    pub name: String,
    pub thumbnail_url: Option<String>,
    pub view_url: Option<String>,
    /// Caption after legacy-payload cleanup
    pub caption: Option<String>,
    pub tags: Vec<String>,
    /// Similarity in [0, 1], rounded to three decimals
    pub similarity: f64,
}

/// A completed search
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub search_type: SearchType,
    pub elapsed_ms: u64,
}

/// Lexical/semantic search dispatcher
pub struct SearchEngine {
    store: StoreRef,
    captioner: CaptionerRef,
    caption_limiter: Arc<SlidingWindowLimiter>,
}

impl SearchEngine {
    pub fn new(
        store: StoreRef,
        captioner: CaptionerRef,
        caption_limiter: Arc<SlidingWindowLimiter>,
    ) -> Self {
        Self {
            store,
            captioner,
            caption_limiter,
        }
    }

    /// Runs one search
    pub async fn search(
        &self,
        folder_id: &FolderId,
        query: &str,
        top_k: usize,
    ) -> Result<SearchResponse, ServiceError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::BadRequest("query must not be empty".to_string()));
        }
        let limit = top_k.clamp(1, MAX_TOP_K) as i64;
        let started = Instant::now();

        // Folder existence check keeps NotFound distinct from empty hits.
        self.store.get_folder(folder_id).await?;

        let (hits, search_type) = if is_lexical(trimmed) {
            (self.lexical(folder_id, trimmed, limit).await?, SearchType::Filename)
        } else {
            match self.semantic(folder_id, trimmed, limit).await? {
                Some(hits) => (hits, SearchType::Semantic),
                // Vector backend gone: same query, lexical path.
                None => (self.lexical(folder_id, trimmed, limit).await?, SearchType::Filename),
            }
        };

        Ok(SearchResponse {
            hits,
            search_type,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn lexical(
        &self,
        folder_id: &FolderId,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let hits = self.store.search_by_filename(folder_id, query, limit).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let similarity = match hit.rank {
                    FilenameRank::Exact => SCORE_EXACT,
                    FilenameRank::Prefix => SCORE_PREFIX,
                    FilenameRank::Substring => SCORE_SUBSTRING,
                };
                to_hit(hit.image, similarity)
            })
            .collect())
    }

    /// Returns `None` when the vector backend is unavailable and the
    /// caller should fall back to the lexical path.
    async fn semantic(
        &self,
        folder_id: &FolderId,
        query: &str,
        limit: i64,
    ) -> Result<Option<Vec<SearchHit>>, ServiceError> {
        match self.store.ensure_vector_infra().await {
            Ok(()) => {}
            Err(err) if err.is_vector_unavailable() => {
                warn!(error = %err, "Vector backend unavailable; degrading to filename search");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }

        // Identical normalization to the ingest path, then embed.
        let normalized = normalize_text(query);
        self.caption_limiter.acquire().await;
        let vector = self.captioner.embed(&normalized).await?;

        let hits = self
            .store
            .search_by_similarity(folder_id, &vector, limit)
            .await;
        let hits = match hits {
            Ok(hits) => hits,
            Err(err) if err.is_vector_unavailable() => {
                warn!(error = %err, "Similarity query degraded mid-flight");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        debug!(query = normalized, hits = hits.len(), "Semantic search served");
        Ok(Some(
            hits.into_iter()
                .map(|hit| {
                    let similarity = round3(hit.similarity().clamp(-1.0, 1.0));
                    to_hit(hit.image, similarity)
                })
                .collect(),
        ))
    }
}

/// Lexical when the query looks like a filename (has a dot) or is too
/// short to embed meaningfully.
fn is_lexical(trimmed: &str) -> bool {
    trimmed.contains('.') || trimmed.chars().count() < 3
}

fn to_hit(image: Image, similarity: f64) -> SearchHit {
    let tags = image
        .tag_list()
        .into_iter()
        .map(str::to_string)
        .collect();
    SearchHit {
        id: image.id,
        name: image.name,
        thumbnail_url: image.thumbnail_url,
        view_url: image.view_url,
        caption: image.caption.as_deref().map(clean_caption),
        tags,
        similarity,
    }
}

/// Display rounding to three decimals
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
