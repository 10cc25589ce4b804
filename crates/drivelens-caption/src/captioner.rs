//! `Captioner` port implementation

use drivelens_core::ports::captioner::{CaptionError, Captioner, ImageCaption};
use tracing::debug;

use crate::client::ModelClient;
use crate::normalize::normalize_text;
use crate::parse::parse_caption_response;
use crate::prompt::caption_prompt;

/// Captioner backed by the Gemini-style model client
///
/// Rate limiting happens at the call sites (image worker, search engine):
/// the worker must acquire the caption limiter before it even downloads
/// bytes, so gating inside the adapter would double-count.
pub struct GeminiCaptioner {
    client: ModelClient,
    embedding_dim: usize,
}

impl GeminiCaptioner {
    /// Creates a captioner over an already-configured client
    pub fn new(client: ModelClient, embedding_dim: usize) -> Self {
        Self {
            client,
            embedding_dim,
        }
    }
}

#[async_trait::async_trait]
impl Captioner for GeminiCaptioner {
    async fn caption(&self, bytes: &[u8], mime_type: &str) -> Result<ImageCaption, CaptionError> {
        let raw = self
            .client
            .generate_caption(bytes, mime_type, &caption_prompt())
            .await?;

        let parsed = parse_caption_response(&raw);
        debug!(
            caption_chars = parsed.caption.len(),
            tags = parsed.tags.len(),
            "Caption parsed"
        );
        Ok(parsed)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CaptionError> {
        let normalized = normalize_text(text);
        let vector = self.client.embed_text(&normalized).await?;

        if vector.len() != self.embedding_dim {
            return Err(CaptionError::DimensionMismatch {
                expected: self.embedding_dim,
                got: vector.len(),
            });
        }
        Ok(vector)
    }

    async fn embed_caption(
        &self,
        caption: &str,
        tags: &[String],
    ) -> Result<Vec<f32>, CaptionError> {
        let combined = if tags.is_empty() {
            caption.to_string()
        } else {
            format!("{caption} {}", tags.join(" "))
        };
        self.embed(&combined).await
    }
}
