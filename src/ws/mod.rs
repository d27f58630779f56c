//! WebSocket layer: the transport adapter in front of the router.
//!
//! Each upgraded socket is registered with the
//! [`crate::service::MessageRouter`], feeds it text frames, drains its
//! outbound queue, and reports exactly one close or error on exit.

pub mod connection;
pub mod handler;
pub mod messages;
