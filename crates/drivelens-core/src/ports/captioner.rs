//! Captioner port (multimodal model adapter interface)
//!
//! Covers both halves of the model surface: captioning image bytes into
//! structured text, and embedding text into the deployment's fixed-
//! dimension vector space. Text normalization behind `embed` must be
//! identical on the ingest and query paths; the adapter owns it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parsed output of one captioning call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCaption {
    /// Plain-text caption, whitespace-normalized, bounded length
    pub caption: String,
    /// Deduplicated lowercase tags, at most 20
    pub tags: Vec<String>,
}

/// Errors surfaced by the captioning/embedding adapter
#[derive(Debug, Error, Clone)]
pub enum CaptionError {
    /// The model service rejected our credentials. Fatal to the whole
    /// process quota: batch workers short-circuit on this.
    #[error("Captioning service rejected credentials: {0}")]
    AuthInvalid(String),

    /// The embedding response contained no vector
    #[error("Embedding response was empty")]
    EmptyEmbedding,

    /// The returned vector did not match the deployment dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Dimension actually returned
        got: usize,
    },

    /// Network failure, timeout, or 5xx; safe to retry via the queue
    #[error("Transient captioning error: {0}")]
    Transient(String),
}

impl CaptionError {
    /// Returns true if the queue should retry the enclosing job
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptionError::Transient(_))
    }

    /// Returns true if continuing to call the service would burn quota
    /// for nothing (credentials are bad)
    pub fn is_fatal_to_quota(&self) -> bool {
        matches!(self, CaptionError::AuthInvalid(_))
    }
}

/// Port trait for captioning and embedding
#[async_trait::async_trait]
pub trait Captioner: Send + Sync {
    /// Captions image bytes into text + tags
    ///
    /// Always yields a usable caption: when the structured response cannot
    /// be parsed, the adapter falls back to truncated raw text and
    /// word-extracted tags.
    async fn caption(&self, bytes: &[u8], mime_type: &str) -> Result<ImageCaption, CaptionError>;

    /// Embeds text into the fixed-dimension vector space
    ///
    /// The adapter normalizes (trim, lowercase, collapse whitespace)
    /// before submission, so equal-up-to-whitespace-and-case inputs embed
    /// identically.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CaptionError>;

    /// Embeds a caption together with its tags
    async fn embed_caption(
        &self,
        caption: &str,
        tags: &[String],
    ) -> Result<Vec<f32>, CaptionError>;
}
