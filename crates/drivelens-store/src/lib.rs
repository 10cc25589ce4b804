//! Postgres persistence for DriveLens
//!
//! Implements the [`ImageStore`](drivelens_core::ports::ImageStore) port
//! over sqlx/Postgres. Vector search relies on the pgvector extension;
//! [`vector`] provisions it idempotently and the whole crate degrades to
//! caption-only storage when the extension is absent.

pub mod pool;
pub mod repository;
pub mod vector;

pub use pool::DatabasePool;
pub use repository::PgImageStore;
