//! Vector column provisioning and literal encoding
//!
//! pgvector may be absent on commodity deployments, so everything here is
//! built to fail into a typed [`StoreError::VectorBackendUnavailable`]
//! that the search engine uses to degrade to lexical matching.
//!
//! Driver-level binding of the `vector` type is not available, so vectors
//! cross the wire as serialized literals bound as text and cast with
//! `::vector`. That encoding never leaks past this crate.

use drivelens_core::ports::store::StoreError;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// HNSW construction parameters for the ANN index
const HNSW_M: u32 = 16;
const HNSW_EF_CONSTRUCTION: u32 = 64;

/// Memoized outcome of vector provisioning, one per repository
#[derive(Default)]
pub struct VectorInfra {
    state: OnceCell<Result<(), String>>,
}

impl VectorInfra {
    /// Provisions extension, column and index once; later calls return
    /// the memoized outcome.
    ///
    /// # Errors
    ///
    /// `StoreError::VectorBackendUnavailable` when the extension cannot
    /// be created or the column/index DDL fails.
    pub async fn ensure(&self, pool: &PgPool, dimension: usize) -> Result<(), StoreError> {
        let outcome = self
            .state
            .get_or_init(|| async { provision(pool, dimension).await })
            .await;

        outcome
            .clone()
            .map_err(StoreError::VectorBackendUnavailable)
    }

    /// True when provisioning has already succeeded
    pub async fn is_ready(&self, pool: &PgPool, dimension: usize) -> bool {
        self.ensure(pool, dimension).await.is_ok()
    }
}

async fn provision(pool: &PgPool, dimension: usize) -> Result<(), String> {
    let ddl = format!(
        "CREATE EXTENSION IF NOT EXISTS vector;
         ALTER TABLE images ADD COLUMN IF NOT EXISTS caption_vec vector({dimension});
         CREATE INDEX IF NOT EXISTS idx_images_caption_vec
             ON images USING hnsw (caption_vec vector_cosine_ops)
             WITH (m = {HNSW_M}, ef_construction = {HNSW_EF_CONSTRUCTION});"
    );

    match sqlx::raw_sql(&ddl).execute(pool).await {
        Ok(_) => {
            info!(dimension, "Vector infrastructure provisioned");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Vector backend unavailable; semantic search will degrade");
            Err(e.to_string())
        }
    }
}

/// Serializes a vector as a pgvector literal: `[v0,v1,…]`
pub fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

/// Parses a pgvector literal back into a vector; tolerant of whitespace
pub fn parse_vector_literal(literal: &str) -> Option<Vec<f32>> {
    let inner = literal.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok())
        .collect()
}
