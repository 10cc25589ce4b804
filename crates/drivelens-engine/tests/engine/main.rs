//! Behavior tests for the DriveLens engine
//!
//! All components run against deterministic in-memory port fakes
//! (see `support`): a hash-bag embedder stands in for the model, a
//! HashMap-backed store and queue stand in for Postgres. Every universal
//! invariant and end-to-end scenario of the pipeline is exercised here.

mod support;

mod test_recovery;
mod test_service;
