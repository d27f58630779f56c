//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::MessageRouter;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Protocol router owning the connection registry.
    pub router: Arc<MessageRouter>,
    /// Outbound queue depth given to each new WebSocket connection.
    pub outbound_queue_capacity: usize,
}
