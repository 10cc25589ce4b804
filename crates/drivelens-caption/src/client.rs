//! Multimodal model API client
//!
//! Typed HTTP client for a Gemini-style REST surface. Two endpoints:
//! `models/{model}:generateContent` for captioning (image bytes inline as
//! base64) and `models/{model}:embedContent` for text embeddings.

use std::time::Duration;

use base64::Engine;
use drivelens_core::ports::captioner::CaptionError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Base URL for the production model API
const MODEL_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Deadline for a captioning call; large images take a while
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for an embedding call
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    #[serde(default)]
    values: Vec<f32>,
}

// ============================================================================
// ModelClient
// ============================================================================

/// HTTP client for the captioning/embedding model service
pub struct ModelClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
}

impl ModelClient {
    /// Creates a client against the production API
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self::with_base_url(api_key, model, embedding_model, MODEL_API_BASE)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            embedding_model: embedding_model.into(),
        }
    }

    /// Sends image bytes plus the prompt and returns the raw response text
    pub async fn generate_caption(
        &self,
        bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, CaptionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "inline_data": {
                        "mime_type": mime_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                    }},
                    { "text": prompt },
                ]
            }]
        });

        debug!(model = %self.model, bytes = bytes.len(), "Captioning request");
        let response = self
            .http
            .post(&url)
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response, "generateContent")?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::Transient(format!("caption response parse failed: {e}")))?;

        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(CaptionError::Transient(
                "caption response contained no text".to_string(),
            ));
        }
        Ok(text)
    }

    /// Embeds already-normalized text into the model's vector space
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, CaptionError> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent?key={}",
            self.base_url, self.embedding_model, self.api_key
        );
        let body = json!({
            "content": { "parts": [{ "text": text }] }
        });

        debug!(model = %self.embedding_model, chars = text.len(), "Embedding request");
        let response = self
            .http
            .post(&url)
            .timeout(EMBED_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response, "embedContent")?;
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::Transient(format!("embed response parse failed: {e}")))?;

        let values = parsed.embedding.map(|e| e.values).unwrap_or_default();
        if values.is_empty() {
            return Err(CaptionError::EmptyEmbedding);
        }
        Ok(values)
    }
}

fn transport_error(err: reqwest::Error) -> CaptionError {
    if err.is_timeout() {
        CaptionError::Transient("model request timed out".to_string())
    } else {
        CaptionError::Transient(format!("model request failed: {err}"))
    }
}

/// 401/403 mean the key is bad and every further call burns quota for
/// nothing; everything else non-success is transient.
fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, CaptionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CaptionError::AuthInvalid(
            format!("{what} returned {status}"),
        )),
        s => Err(CaptionError::Transient(format!("{what} returned {s}"))),
    }
}
