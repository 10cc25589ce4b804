//! Text normalization shared by ingest and query paths
//!
//! Embeddings are only comparable when both sides of the similarity
//! query were normalized identically. This is the one normalization.

/// Trim, lowercase, collapse runs of whitespace to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
