//! Service layer: relay protocol orchestration.
//!
//! [`MessageRouter`] owns the [`crate::domain::ConnectionRegistry`] behind a
//! single lock and turns inbound frames into registry mutations and queued
//! outbound payloads.

pub mod message_router;

pub use message_router::{MessageRouter, RoutingPolicy};
