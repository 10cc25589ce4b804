//! Durable job queue for DriveLens
//!
//! Implements the [`JobQueue`](drivelens_core::ports::JobQueue) port over
//! Postgres: a single `jobs` table holds both logical queues, claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never double-pop, and
//! the unique idempotency key makes a second enqueue a no-op.

pub mod keys;
pub mod queue;

pub use queue::{PgJobQueue, QueuePool};
