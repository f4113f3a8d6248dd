//! Shared utilities.
//!
//! Process bootstrap helpers and retry policies used across the pipeline.

pub mod bootstrap;
pub mod retry;
