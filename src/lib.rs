//! Webhook fan-out for platform dataset events.
//!
//! Ingests batches of dataset events, looks up each organization's webhook
//! subscriptions through a TTL-bounded cache, and delivers every matching
//! event payload to every subscribed endpoint. Delivery is best-effort:
//! failures are isolated per endpoint, logged, and never fail the batch.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod inbound;
pub mod pipeline;
pub mod registry;
pub mod utils;
