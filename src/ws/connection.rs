//! WebSocket connection loop.
//!
//! Bridges one socket to the [`MessageRouter`]: inbound text frames are
//! routed, the connection's outbound queue is drained into the socket, and
//! the router hears about exactly one close or error when the loop ends.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::domain::Outbound;
use crate::service::MessageRouter;

/// Why the read/write loop stopped.
enum Exit {
    Closed,
    Failed(axum::Error),
}

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Registers the socket as an unclassified connection.
/// - Routes text frames (and UTF-8 binary frames) to the router.
/// - Writes queued outbound payloads to the client.
pub async fn run_connection(socket: WebSocket, router: Arc<MessageRouter>, capacity: usize) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound, mut outbound_rx) = Outbound::channel(capacity);
    let conn = router.on_connect(outbound).await;

    let exit = loop {
        tokio::select! {
            // Incoming frame from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => router.on_message(conn, text.as_str()).await,
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => router.on_message(conn, text).await,
                        Err(_) => tracing::warn!(%conn, "ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => break Exit::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Exit::Failed(err),
                }
            }
            // Payload queued by the router
            payload = outbound_rx.recv() => {
                let Some(payload) = payload else {
                    break Exit::Closed;
                };
                if let Err(err) = ws_tx.send(Message::text(String::from(&*payload))).await {
                    break Exit::Failed(err);
                }
            }
        }
    };

    match exit {
        Exit::Closed => {
            let _ = router.on_disconnect(conn).await;
        }
        Exit::Failed(err) => {
            let _ = router.on_error(conn, &err).await;
            let _ = ws_tx.close().await;
        }
    }

    tracing::debug!(%conn, "ws connection closed");
}
