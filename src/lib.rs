//! # avatar-relay
//!
//! Real-time WebSocket relay for avatar positions.
//!
//! Connections start unclassified and register once as either an avatar
//! *source*, which publishes its avatar's name and position, or an avatar
//! *consumer*, which receives every source's updates. When a source goes
//! away its avatar is removed and consumers are told.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)          Operators (HTTP)
//!     │                            │
//!     ├── WS transport (ws/)       ├── REST Handlers (api/)
//!     │                            │
//!     ├── MessageRouter (service/) ┘
//!     │
//!     └── ConnectionRegistry + AvatarStore (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
