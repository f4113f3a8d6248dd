//! Inbound transports feeding batches into the pipeline.
//!
//! The pipeline only sees `RawMessage` batches; each transport owns its own
//! receive and acknowledgement semantics.

#[cfg(feature = "sqs")]
pub mod sqs;

#[cfg(feature = "sqs")]
pub use sqs::{SqsConsumer, SqsError};
