//! Message router: the relay protocol state machine.
//!
//! [`MessageRouter`] decodes inbound frames, checks them against the
//! sender's role, mutates the [`ConnectionRegistry`] and queues outbound
//! payloads. The registry sits behind one mutex; every mutation and the
//! consumer fan-out that follows it happen under that lock. Enqueueing is
//! a non-blocking `try_send`, so holding the lock across fan-out cannot be
//! stalled by a slow consumer, and consumers observe updates and removals
//! in the order they were applied.

use std::fmt::Display;

use tokio::sync::Mutex;

use crate::domain::{
    Avatar, AvatarMap, ConnectionId, ConnectionRegistry, Outbound, Payload, RegistryCounts,
    RemovedInfo,
};
use crate::error::RelayError;
use crate::ws::messages::{
    AvatarBroadcast, ClientKind, RegisterAck, RegisterRequest, Request, UpdateAvatarRequest,
    encode,
};

/// Behavior switches for the cases where the relay protocol leaves room
/// for a product decision. The default matches the historical behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Broadcast `removeAvatars` when a connection errors, not only when it
    /// closes cleanly.
    pub remove_on_error: bool,
    /// Only let a source publish under the guid it registered with.
    pub strict_source_guid: bool,
}

/// Routes relay traffic between sources and consumers.
///
/// One instance serves every connection. The transport calls
/// [`on_connect`](Self::on_connect) once per socket, then
/// [`on_message`](Self::on_message) per text frame, and finally exactly
/// one of [`on_disconnect`](Self::on_disconnect) or
/// [`on_error`](Self::on_error). Duplicate cleanup calls are no-ops.
#[derive(Debug, Default)]
pub struct MessageRouter {
    registry: Mutex<ConnectionRegistry>,
    policy: RoutingPolicy,
}

impl MessageRouter {
    /// Creates a router with an empty registry.
    #[must_use]
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            registry: Mutex::new(ConnectionRegistry::new()),
            policy,
        }
    }

    /// Registers a new transport session as unclassified.
    pub async fn on_connect(&self, outbound: Outbound) -> ConnectionId {
        let conn = self.registry.lock().await.add_unclassified(outbound);
        tracing::info!(%conn, "new connection");
        conn
    }

    /// Handles one inbound text frame. Errors are logged and swallowed;
    /// they never terminate the connection.
    pub async fn on_message(&self, conn: ConnectionId, text: &str) {
        if let Err(err) = self.handle_message(conn, text).await {
            tracing::warn!(%conn, code = err.error_code(), "request dropped: {err}");
        }
    }

    /// Handles one inbound text frame, reporting why it was refused.
    ///
    /// # Errors
    ///
    /// - [`RelayError::MalformedPayload`] for undecodable frames, frames
    ///   without `method`, or a source registration without `guid`.
    /// - [`RelayError::UnknownClientType`] /
    ///   [`RelayError::InvalidRoleTransition`] for refused registrations
    ///   (a `result: false` ack has already been queued).
    /// - [`RelayError::UnauthorizedUpdate`], [`RelayError::IncompleteUpdate`]
    ///   or [`RelayError::GuidMismatch`] for dropped updates.
    pub async fn handle_message(&self, conn: ConnectionId, text: &str) -> Result<(), RelayError> {
        match Request::parse(text)? {
            Request::Register(req) => self.register(conn, req).await,
            Request::UpdateAvatar(req) => self.update_avatar(conn, req).await,
            Request::Unknown => {
                tracing::debug!(%conn, "ignoring unknown method");
                Ok(())
            }
        }
    }

    async fn register(&self, conn: ConnectionId, req: RegisterRequest) -> Result<(), RelayError> {
        let mut registry = self.registry.lock().await;
        match req.kind {
            ClientKind::AvatarSource => {
                let Some(guid) = req.guid else {
                    return Err(RelayError::MalformedPayload(
                        "AvatarSource registration without guid".to_string(),
                    ));
                };
                let promoted = registry.promote_to_source(conn, guid.as_str());
                reply(&registry, conn, &RegisterAck::register(promoted.is_ok()))?;
                promoted?;
                tracing::info!(%conn, %guid, "registered avatar source");
                Ok(())
            }
            ClientKind::AvatarConsumer => {
                let promoted = registry.promote_to_consumer(conn);
                reply(&registry, conn, &RegisterAck::register(promoted.is_ok()))?;
                promoted?;
                tracing::info!(%conn, "registered avatar consumer");

                // Every consumer is resynchronized, not only the newcomer.
                let snapshot = AvatarBroadcast::send(registry.store().snapshot());
                let delivered = fan_out(&registry, &encode(&snapshot)?);
                tracing::debug!(
                    %conn,
                    consumers = delivered,
                    avatars = snapshot.avatars.len(),
                    "sent snapshot"
                );
                Ok(())
            }
            ClientKind::Unrecognized(kind) => {
                reply(&registry, conn, &RegisterAck::register(false))?;
                Err(RelayError::UnknownClientType(kind))
            }
        }
    }

    async fn update_avatar(
        &self,
        conn: ConnectionId,
        req: UpdateAvatarRequest,
    ) -> Result<(), RelayError> {
        let mut registry = self.registry.lock().await;
        if !registry.is_source(conn) {
            return Err(RelayError::UnauthorizedUpdate(conn));
        }
        let (guid, avatar) = req.into_avatar()?;
        let payload = encode(&AvatarBroadcast::delta(guid.as_str(), avatar.clone()))?;
        registry.publish(conn, &guid, avatar, self.policy.strict_source_guid)?;
        let delivered = fan_out(&registry, &payload);
        tracing::debug!(%conn, %guid, consumers = delivered, "avatar updated");
        Ok(())
    }

    /// Cleans up after a connection closed. Sources' avatars are removed
    /// and announced to every consumer with their last known values.
    ///
    /// Returns what was removed, or `None` if the connection was already
    /// gone.
    pub async fn on_disconnect(&self, conn: ConnectionId) -> Option<RemovedInfo> {
        let removed = self.cleanup(conn, true).await;
        if let Some(info) = &removed {
            tracing::info!(%conn, role = %info.role, "connection has disconnected");
        }
        removed
    }

    /// Cleans up after a transport error. Identical to
    /// [`on_disconnect`](Self::on_disconnect) except that the removal is
    /// only announced when [`RoutingPolicy::remove_on_error`] is set.
    pub async fn on_error(
        &self,
        conn: ConnectionId,
        err: &(dyn Display + Sync),
    ) -> Option<RemovedInfo> {
        tracing::warn!(%conn, "an error has occurred: {err}");
        self.cleanup(conn, self.policy.remove_on_error).await
    }

    async fn cleanup(&self, conn: ConnectionId, announce: bool) -> Option<RemovedInfo> {
        let mut registry = self.registry.lock().await;
        let Some(removed) = registry.remove(conn) else {
            tracing::debug!(%conn, "connection already removed");
            return None;
        };
        if announce && !removed.avatars.is_empty() {
            match encode(&AvatarBroadcast::remove(removed.avatars.clone())) {
                Ok(payload) => {
                    let delivered = fan_out(&registry, &payload);
                    tracing::debug!(%conn, consumers = delivered, "announced avatar removal");
                }
                Err(err) => tracing::error!(%conn, "failed to encode removal: {err}"),
            }
        }
        Some(removed)
    }

    /// Last published value of the avatar under `guid`.
    pub async fn avatar(&self, guid: &str) -> Option<Avatar> {
        self.registry.lock().await.store().get(guid).cloned()
    }

    /// Current avatar snapshot.
    pub async fn snapshot(&self) -> AvatarMap {
        self.registry.lock().await.store().snapshot()
    }

    /// Per-role connection counts.
    pub async fn counts(&self) -> RegistryCounts {
        self.registry.lock().await.counts()
    }

    /// Outbound payloads dropped so far across live connections.
    pub async fn dropped_total(&self) -> u64 {
        self.registry.lock().await.dropped_total()
    }
}

/// Queues a direct reply to `conn`.
fn reply(
    registry: &ConnectionRegistry,
    conn: ConnectionId,
    ack: &RegisterAck,
) -> Result<(), RelayError> {
    let outbound = registry
        .outbound(conn)
        .ok_or(RelayError::ConnectionNotFound(conn))?;
    if !outbound.send(encode(ack)?) {
        tracing::warn!(%conn, "reply dropped, outbound queue full");
    }
    Ok(())
}

/// Queues `payload` for every consumer and returns how many accepted it.
fn fan_out(registry: &ConnectionRegistry, payload: &Payload) -> usize {
    let consumers = registry.consumer_outbounds();
    let total = consumers.len();
    let delivered = consumers
        .iter()
        .filter(|outbound| outbound.send(Payload::clone(payload)))
        .count();
    if delivered < total {
        tracing::warn!(dropped = total - delivered, "broadcast dropped for stalled consumers");
    }
    delivered
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;

    type Inbox = mpsc::Receiver<Payload>;

    async fn connect(router: &MessageRouter) -> (ConnectionId, Inbox) {
        let (outbound, rx) = Outbound::channel(32);
        (router.on_connect(outbound).await, rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            let Ok(value) = serde_json::from_str(&payload) else {
                panic!("outbound payload is not json: {payload}");
            };
            out.push(value);
        }
        out
    }

    fn update(guid: &str, name: &str, x: f64) -> String {
        json!({
            "method": "updateAvatar",
            "guid": guid,
            "name": name,
            "x": x, "y": 2.0, "z": 3.0,
            "mapId": 10, "worldId": 1,
        })
        .to_string()
    }

    fn hero(x: f64) -> Value {
        json!({"name": "Hero", "x": x, "y": 2.0, "z": 3.0, "mapId": 10, "worldId": 1})
    }

    async fn source(router: &MessageRouter, guid: &str) -> (ConnectionId, Inbox) {
        let (conn, mut rx) = connect(router).await;
        let msg = json!({"method": "register", "type": "AvatarSource", "guid": guid});
        assert!(router.handle_message(conn, &msg.to_string()).await.is_ok());
        let _ = drain(&mut rx);
        (conn, rx)
    }

    async fn consumer(router: &MessageRouter) -> (ConnectionId, Inbox) {
        let (conn, mut rx) = connect(router).await;
        let msg = r#"{"method":"register","type":"AvatarConsumer"}"#;
        assert!(router.handle_message(conn, msg).await.is_ok());
        let _ = drain(&mut rx);
        (conn, rx)
    }

    #[tokio::test]
    async fn source_registration_is_acked() {
        let router = MessageRouter::default();
        let (conn, mut rx) = connect(&router).await;
        let msg = r#"{"method":"register","type":"AvatarSource","guid":"g1"}"#;
        assert!(router.handle_message(conn, msg).await.is_ok());

        assert_eq!(drain(&mut rx), vec![json!({"requestedMethod": "register", "result": true})]);
        assert!(router.snapshot().await.is_empty());
        assert_eq!(router.counts().await.sources, 1);
    }

    #[tokio::test]
    async fn source_without_guid_is_malformed_and_not_promoted() {
        let router = MessageRouter::default();
        let (conn, mut rx) = connect(&router).await;
        let result = router
            .handle_message(conn, r#"{"method":"register","type":"AvatarSource"}"#)
            .await;
        assert!(matches!(result, Err(RelayError::MalformedPayload(_))));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(router.counts().await.unclassified, 1);
    }

    #[tokio::test]
    async fn unknown_type_gets_failed_ack_and_stays_unclassified() {
        let router = MessageRouter::default();
        let (conn, mut rx) = connect(&router).await;
        let result = router
            .handle_message(conn, r#"{"method":"register","type":"Spectator"}"#)
            .await;
        assert!(matches!(result, Err(RelayError::UnknownClientType(ref t)) if t == "Spectator"));
        assert_eq!(drain(&mut rx), vec![json!({"requestedMethod": "register", "result": false})]);
        assert_eq!(router.counts().await.unclassified, 1);
    }

    #[tokio::test]
    async fn second_registration_is_refused_and_role_kept() {
        let router = MessageRouter::default();
        let (conn, mut rx) = consumer(&router).await;
        let msg = r#"{"method":"register","type":"AvatarSource","guid":"g1"}"#;
        let result = router.handle_message(conn, msg).await;
        assert!(matches!(result, Err(RelayError::InvalidRoleTransition { .. })));
        assert_eq!(drain(&mut rx), vec![json!({"requestedMethod": "register", "result": false})]);

        let counts = router.counts().await;
        assert_eq!((counts.sources, counts.consumers), (0, 1));
    }

    #[tokio::test]
    async fn update_from_non_source_is_dropped() {
        let router = MessageRouter::default();
        let (_watcher, mut watcher_rx) = consumer(&router).await;
        let (stranger, mut stranger_rx) = connect(&router).await;
        let (other_consumer, _) = consumer(&router).await;
        let _ = drain(&mut watcher_rx);

        for conn in [stranger, other_consumer] {
            let result = router.handle_message(conn, &update("g1", "Hero", 1.0)).await;
            assert!(matches!(result, Err(RelayError::UnauthorizedUpdate(_))));
        }
        assert!(router.snapshot().await.is_empty());
        assert!(drain(&mut watcher_rx).is_empty());
        assert!(drain(&mut stranger_rx).is_empty());
    }

    #[tokio::test]
    async fn update_with_empty_name_is_dropped() {
        let router = MessageRouter::default();
        let (_watcher, mut watcher_rx) = consumer(&router).await;
        let (src, _) = source(&router, "g1").await;

        let result = router.handle_message(src, &update("g1", "", 1.0)).await;
        assert!(matches!(result, Err(RelayError::IncompleteUpdate(_))));
        assert!(router.snapshot().await.is_empty());
        assert!(drain(&mut watcher_rx).is_empty());
    }

    #[tokio::test]
    async fn update_broadcasts_delta_to_every_consumer() {
        let router = MessageRouter::default();
        let mut inboxes = Vec::new();
        for _ in 0..3 {
            inboxes.push(consumer(&router).await.1);
        }
        for rx in &mut inboxes {
            let _ = drain(rx);
        }
        let (src, mut src_rx) = source(&router, "g1").await;

        assert!(router.handle_message(src, &update("g1", "Hero", 1.0)).await.is_ok());

        let expected = json!({"method": "sendAvatars", "avatars": {"g1": hero(1.0)}});
        for rx in &mut inboxes {
            assert_eq!(drain(rx), vec![expected.clone()]);
        }
        assert!(drain(&mut src_rx).is_empty());
    }

    #[tokio::test]
    async fn new_consumer_resyncs_all_consumers() {
        let router = MessageRouter::default();
        let (_old, mut old_rx) = consumer(&router).await;
        let (a, _) = source(&router, "a").await;
        let (b, _) = source(&router, "b").await;
        assert!(router.handle_message(a, &update("a", "Hero", 1.0)).await.is_ok());
        assert!(router.handle_message(b, &update("b", "Hero", 5.0)).await.is_ok());
        let _ = drain(&mut old_rx);

        let (new, mut new_rx) = connect(&router).await;
        let msg = r#"{"method":"register","type":"AvatarConsumer"}"#;
        assert!(router.handle_message(new, msg).await.is_ok());

        let snapshot = json!({
            "method": "sendAvatars",
            "avatars": {"a": hero(1.0), "b": hero(5.0)},
        });
        assert_eq!(
            drain(&mut new_rx),
            vec![json!({"requestedMethod": "register", "result": true}), snapshot.clone()]
        );
        assert_eq!(drain(&mut old_rx), vec![snapshot]);
    }

    #[tokio::test]
    async fn publish_consume_disconnect_scenario() {
        let router = MessageRouter::default();
        let (src, _) = source(&router, "g1").await;
        assert!(router.handle_message(src, &update("g1", "Hero", 1.0)).await.is_ok());
        assert_eq!(router.snapshot().await.len(), 1);

        let (watcher, mut watcher_rx) = connect(&router).await;
        let msg = r#"{"method":"register","type":"AvatarConsumer"}"#;
        assert!(router.handle_message(watcher, msg).await.is_ok());
        let received = drain(&mut watcher_rx);
        assert_eq!(
            received.get(1),
            Some(&json!({"method": "sendAvatars", "avatars": {"g1": hero(1.0)}}))
        );

        let Some(removed) = router.on_disconnect(src).await else {
            panic!("source should have been live");
        };
        assert_eq!(removed.avatars.len(), 1);
        assert_eq!(
            drain(&mut watcher_rx),
            vec![json!({"method": "removeAvatars", "avatars": {"g1": hero(1.0)}})]
        );
        assert!(router.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn removal_carries_last_value() {
        let router = MessageRouter::default();
        let (_watcher, mut watcher_rx) = consumer(&router).await;
        let (src, _) = source(&router, "g1").await;
        assert!(router.handle_message(src, &update("g1", "Hero", 1.0)).await.is_ok());
        assert!(router.handle_message(src, &update("g1", "Hero", 9.0)).await.is_ok());
        let _ = drain(&mut watcher_rx);

        let _ = router.on_disconnect(src).await;
        assert_eq!(
            drain(&mut watcher_rx),
            vec![json!({"method": "removeAvatars", "avatars": {"g1": hero(9.0)}})]
        );
    }

    #[tokio::test]
    async fn duplicate_disconnect_is_noop() {
        let router = MessageRouter::default();
        let (_watcher, mut watcher_rx) = consumer(&router).await;
        let (src, _) = source(&router, "g1").await;
        assert!(router.handle_message(src, &update("g1", "Hero", 1.0)).await.is_ok());
        let _ = drain(&mut watcher_rx);

        assert!(router.on_disconnect(src).await.is_some());
        assert!(router.on_disconnect(src).await.is_none());
        assert!(router.on_error(src, &"reset").await.is_none());
        assert_eq!(drain(&mut watcher_rx).len(), 1);
    }

    #[tokio::test]
    async fn error_cleanup_runs_on_spawned_task() {
        let router = Arc::new(MessageRouter::default());
        let (src, _) = source(&router, "g1").await;
        assert!(router.handle_message(src, &update("g1", "Hero", 1.0)).await.is_ok());

        let err = std::io::Error::other("connection reset");
        let task = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.on_error(src, &err).await })
        };
        let Ok(Some(info)) = task.await else {
            panic!("error cleanup should remove the live source");
        };
        assert_eq!(info.avatars.len(), 1);
        assert!(router.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn error_cleans_up_silently_by_default() {
        let router = MessageRouter::default();
        let (_watcher, mut watcher_rx) = consumer(&router).await;
        let (src, _) = source(&router, "g1").await;
        assert!(router.handle_message(src, &update("g1", "Hero", 1.0)).await.is_ok());
        let _ = drain(&mut watcher_rx);

        assert!(router.on_error(src, &"connection reset").await.is_some());
        assert!(router.snapshot().await.is_empty());
        assert!(drain(&mut watcher_rx).is_empty());
    }

    #[tokio::test]
    async fn error_announces_removal_when_configured() {
        let router = MessageRouter::new(RoutingPolicy {
            remove_on_error: true,
            ..RoutingPolicy::default()
        });
        let (_watcher, mut watcher_rx) = consumer(&router).await;
        let (src, _) = source(&router, "g1").await;
        assert!(router.handle_message(src, &update("g1", "Hero", 1.0)).await.is_ok());
        let _ = drain(&mut watcher_rx);

        let _ = router.on_error(src, &"connection reset").await;
        assert_eq!(
            drain(&mut watcher_rx),
            vec![json!({"method": "removeAvatars", "avatars": {"g1": hero(1.0)}})]
        );
    }

    #[tokio::test]
    async fn source_may_publish_foreign_guid_unless_strict() {
        let router = MessageRouter::default();
        let (src, _) = source(&router, "g1").await;
        assert!(router.handle_message(src, &update("g2", "Hero", 1.0)).await.is_ok());
        assert!(router.snapshot().await.contains_key("g2"));

        let strict = MessageRouter::new(RoutingPolicy {
            strict_source_guid: true,
            ..RoutingPolicy::default()
        });
        let (src, _) = source(&strict, "g1").await;
        let result = strict.handle_message(src, &update("g2", "Hero", 1.0)).await;
        assert!(matches!(result, Err(RelayError::GuidMismatch { .. })));
        assert!(strict.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_leaves_avatar_owned_by_another_source() {
        let router = MessageRouter::default();
        let (_watcher, mut watcher_rx) = consumer(&router).await;
        let (spoofer, _) = source(&router, "g1").await;
        let (owner, _) = source(&router, "g2").await;
        assert!(router.handle_message(owner, &update("g2", "Bob", 1.0)).await.is_ok());
        assert!(router.handle_message(spoofer, &update("g2", "Spoof", 1.0)).await.is_ok());
        assert!(router.handle_message(owner, &update("g2", "Bob", 1.0)).await.is_ok());
        let _ = drain(&mut watcher_rx);

        let Some(removed) = router.on_disconnect(spoofer).await else {
            panic!("spoofing source should have been live");
        };
        assert!(removed.avatars.is_empty());
        assert!(drain(&mut watcher_rx).is_empty());
        let Some(avatar) = router.avatar("g2").await else {
            panic!("owner's avatar should survive");
        };
        assert_eq!(avatar.name, "Bob");
        assert_eq!(router.counts().await.sources, 1);
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_ignored() {
        let router = MessageRouter::default();
        let (conn, mut rx) = connect(&router).await;
        assert!(matches!(
            router.handle_message(conn, "not json").await,
            Err(RelayError::MalformedPayload(_))
        ));
        assert!(matches!(
            router.handle_message(conn, r#"{"guid":"g1"}"#).await,
            Err(RelayError::MalformedPayload(_))
        ));
        assert!(router.handle_message(conn, r#"{"method":"dance"}"#).await.is_ok());
        router.on_message(conn, "still not json").await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(router.counts().await.unclassified, 1);
    }

    #[tokio::test]
    async fn stalled_consumer_does_not_block_others() {
        let router = MessageRouter::default();
        let (stalled_out, _stalled_rx) = Outbound::channel(1);
        let stalled = router.on_connect(stalled_out).await;
        let msg = r#"{"method":"register","type":"AvatarConsumer"}"#;
        assert!(router.handle_message(stalled, msg).await.is_ok());
        let (_healthy, mut healthy_rx) = consumer(&router).await;
        let (src, _) = source(&router, "g1").await;

        for i in 0..10 {
            let x = f64::from(i);
            assert!(router.handle_message(src, &update("g1", "Hero", x)).await.is_ok());
        }
        assert_eq!(drain(&mut healthy_rx).len(), 10);
        assert!(router.dropped_total().await > 0);
    }

    #[tokio::test]
    async fn concurrent_sources_keep_registry_consistent() {
        let router = Arc::new(MessageRouter::default());
        let mut handles = Vec::new();
        for i in 0..32 {
            let router = Arc::clone(&router);
            handles.push(tokio::spawn(async move {
                let guid = format!("g{i}");
                let (src, _rx) = source(&router, &guid).await;
                let _ = router.handle_message(src, &update(&guid, "Hero", 1.0)).await;
                if i % 2 == 0 {
                    let _ = router.on_disconnect(src).await;
                }
            }));
        }
        for handle in handles {
            let Ok(()) = handle.await else {
                panic!("task panicked");
            };
        }

        let counts = router.counts().await;
        assert_eq!(counts.sources, 16);
        assert_eq!(counts.avatars, 16);
        assert_eq!(router.snapshot().await.len(), 16);
    }
}
