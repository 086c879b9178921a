//! Inbound event routing
//!
//! Each connection runs `CONNECTING -> OPEN -> CLOSED`; while open, every
//! inbound frame lands here. The dispatcher matches exhaustively over the
//! closed [`ClientEvent`] sum type, so adding an event kind is a
//! compile-time-checked change. No inbound frame can take the connection
//! down: malformed payloads, unknown kinds and echoed server events are all
//! logged and dropped while the connection stays open.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::envelope::{ClientEvent, EnvelopeError, PresenceStatus, UserId, parse_event};
use crate::presence::broadcast_presence;
use crate::registry::{ConnectionHandle, Registry};
use crate::relay::Relay;

/// Parses inbound frames and dispatches them by event kind
pub struct EventRouter {
    registry: Arc<Registry>,
    relay: Relay,
}

impl EventRouter {
    pub fn new(registry: Arc<Registry>, relay: Relay) -> Self {
        Self { registry, relay }
    }

    /// Handle one inbound frame from `handle`'s connection.
    ///
    /// `identity` is the connection-local binding established by a prior
    /// `online` event; relays are refused until it is set.
    pub async fn dispatch(&self, handle: &ConnectionHandle, identity: &mut Option<UserId>, raw: &[u8]) {
        let event = match parse_event(raw) {
            Ok(event) => event,
            Err(EnvelopeError::UnknownKind(kind)) => {
                warn!(conn_id = handle.conn_id(), kind, "unknown event kind dropped");
                return;
            }
            Err(err) => {
                warn!(conn_id = handle.conn_id(), error = %err, "malformed envelope dropped");
                return;
            }
        };

        match event {
            ClientEvent::Online { user_id } => self.handle_online(handle, identity, user_id),

            // Keepalive only. Must never broadcast, relay or touch the
            // registry; liveness comes from the transport close signal.
            ClientEvent::Ping => {}

            ClientEvent::Chat {
                to,
                message,
                message_id,
            } => {
                let Some(from) = *identity else {
                    debug!(conn_id = handle.conn_id(), "chat from unregistered connection dropped");
                    return;
                };
                self.relay.chat(from, to, message, message_id).await;
            }

            ClientEvent::GameInvitation {
                to,
                from_name,
                invitation_id,
            } => {
                let Some(from) = *identity else {
                    debug!(
                        conn_id = handle.conn_id(),
                        "invitation from unregistered connection dropped"
                    );
                    return;
                };
                self.relay.game_invitation(from, to, from_name, invitation_id).await;
            }

            ClientEvent::GameInvitationResponse {
                to,
                invitation_id,
                response,
            } => {
                let Some(from) = *identity else {
                    debug!(
                        conn_id = handle.conn_id(),
                        "invitation response from unregistered connection dropped"
                    );
                    return;
                };
                self.relay.game_invitation_response(from, to, invitation_id, response);
            }

            ClientEvent::Presence
            | ClientEvent::MessageSent
            | ClientEvent::GameInvitationSent
            | ClientEvent::ChannelUserJoined
            | ClientEvent::ChannelUserKicked
            | ClientEvent::YouWereKicked
            | ClientEvent::ChannelUserMuted
            | ClientEvent::YouWereMuted
            | ClientEvent::ChannelUserUnmuted
            | ClientEvent::YouWereUnmuted
            | ClientEvent::ChannelAdminChanged
            | ClientEvent::ChannelUserLeft => {
                debug!(conn_id = handle.conn_id(), "outbound-only event kind dropped");
            }
        }
    }

    /// Reconnect guard: bind `user_id` to this connection, evicting any
    /// older connection for the same identity, then announce the transition.
    fn handle_online(
        &self,
        handle: &ConnectionHandle,
        identity: &mut Option<UserId>,
        user_id: UserId,
    ) {
        if let Some(previous) = *identity
            && previous != user_id
            && self.registry.remove(previous, handle.conn_id())
        {
            // the connection re-identified as someone else; retire the old
            // binding so the registry never maps two identities to one socket
            broadcast_presence(&self.registry, previous, PresenceStatus::Offline);
        }

        self.registry.admit(user_id, handle.clone());
        *identity = Some(user_id);
        broadcast_presence(&self.registry, user_id, PresenceStatus::Online);
    }

    /// Close-path cleanup: remove the identity if this connection is still
    /// the one on record, and announce the offline transition. A close from
    /// a superseded connection changes nothing and broadcasts nothing.
    pub fn handle_close(&self, handle: &ConnectionHandle, identity: Option<UserId>) {
        if let Some(user_id) = identity
            && self.registry.remove(user_id, handle.conn_id())
        {
            broadcast_presence(&self.registry, user_id, PresenceStatus::Offline);
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Outbound, next_conn_id};
    use crate::store::MemoryBlockStore;
    use tokio::sync::mpsc;

    fn test_handle() -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(next_conn_id(), tx), rx)
    }

    fn test_router() -> (Arc<EventRouter>, Arc<Registry>, Arc<MemoryBlockStore>) {
        let registry = Arc::new(Registry::new());
        let blocks = Arc::new(MemoryBlockStore::new());
        let relay = Relay::new(registry.clone(), blocks.clone());
        (
            Arc::new(EventRouter::new(registry.clone(), relay)),
            registry,
            blocks,
        )
    }

    fn recv_event(rx: &mut mpsc::Receiver<Outbound>) -> serde_json::Value {
        match rx.try_recv() {
            Ok(Outbound::Event(payload)) => serde_json::from_slice(&payload).unwrap(),
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_online_registers_and_broadcasts() {
        let (router, registry, _) = test_router();
        let (peer, mut rx_peer) = test_handle();
        registry.admit(1, peer);

        let (handle, mut rx) = test_handle();
        let mut identity = None;
        router
            .dispatch(&handle, &mut identity, br#"{"type":"online","userId":42}"#)
            .await;

        assert_eq!(identity, Some(42));
        assert!(registry.is_online(42));

        let seen = recv_event(&mut rx_peer);
        assert_eq!(seen["type"], "presence");
        assert_eq!(seen["userId"], 42);
        assert_eq!(seen["status"], "online");

        // the new connection itself hears nothing
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_has_no_observable_effect() {
        let (router, registry, _) = test_router();
        let (peer, mut rx_peer) = test_handle();
        registry.admit(1, peer);

        let (handle, mut rx) = test_handle();
        let mut identity = Some(42u64);
        registry.admit(42, handle.clone());

        router.dispatch(&handle, &mut identity, br#"{"type":"ping"}"#).await;

        assert_eq!(registry.online_count(), 2);
        assert!(rx_peer.try_recv().is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_are_dropped() {
        let (router, registry, _) = test_router();
        let (handle, mut rx) = test_handle();
        let mut identity = None;

        router.dispatch(&handle, &mut identity, b"{oops").await;
        router
            .dispatch(&handle, &mut identity, br#"{"type":"teleport"}"#)
            .await;

        assert_eq!(identity, None);
        assert_eq!(registry.online_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_echoed_server_event_is_dropped() {
        let (router, registry, _) = test_router();
        let (peer, mut rx_peer) = test_handle();
        registry.admit(1, peer);

        let (handle, _rx) = test_handle();
        let mut identity = Some(42u64);
        router
            .dispatch(
                &handle,
                &mut identity,
                br#"{"type":"presence","userId":42,"status":"online"}"#,
            )
            .await;

        assert!(rx_peer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_requires_registration() {
        let (router, registry, _) = test_router();
        let (recipient, mut rx_recipient) = test_handle();
        registry.admit(7, recipient);

        let (handle, _rx) = test_handle();
        let mut identity = None;
        router
            .dispatch(
                &handle,
                &mut identity,
                br#"{"type":"chat","to":7,"message":"hi"}"#,
            )
            .await;

        assert!(rx_recipient.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_round_trip_through_router() {
        let (router, registry, _) = test_router();
        let (sender, mut rx_sender) = test_handle();
        let (recipient, mut rx_recipient) = test_handle();
        registry.admit(42, sender.clone());
        registry.admit(7, recipient);

        let mut identity = Some(42u64);
        router
            .dispatch(
                &sender,
                &mut identity,
                br#"{"type":"chat","to":7,"message":"hi"}"#,
            )
            .await;

        let delivered = recv_event(&mut rx_recipient);
        assert_eq!(delivered["type"], "chat");
        assert_eq!(delivered["from"], 42);
        assert_eq!(delivered["message"], "hi");

        let confirmation = recv_event(&mut rx_sender);
        assert_eq!(confirmation["type"], "message_sent");
    }

    #[tokio::test]
    async fn test_reconnect_then_stale_close() {
        let (router, registry, _) = test_router();
        let (observer, mut rx_observer) = test_handle();
        registry.admit(1, observer);

        // first connection for identity 42
        let (c1, mut rx_c1) = test_handle();
        let mut identity_c1 = None;
        router
            .dispatch(&c1, &mut identity_c1, br#"{"type":"online","userId":42}"#)
            .await;
        let _ = recv_event(&mut rx_observer); // online broadcast

        // second connection for the same identity
        let (c2, _rx_c2) = test_handle();
        let mut identity_c2 = None;
        router
            .dispatch(&c2, &mut identity_c2, br#"{"type":"online","userId":42}"#)
            .await;
        let _ = recv_event(&mut rx_observer); // online broadcast again

        // c1 was told to close
        assert!(matches!(rx_c1.try_recv(), Ok(Outbound::Close)));
        assert_eq!(registry.lookup(42).unwrap().conn_id(), c2.conn_id());

        // the delayed close of c1 neither removes the entry nor emits a
        // duplicate offline broadcast
        router.handle_close(&c1, identity_c1);
        assert!(registry.is_online(42));
        assert!(rx_observer.try_recv().is_err());

        // the real close does both
        router.handle_close(&c2, identity_c2);
        assert!(!registry.is_online(42));
        let seen = recv_event(&mut rx_observer);
        assert_eq!(seen["type"], "presence");
        assert_eq!(seen["userId"], 42);
        assert_eq!(seen["status"], "offline");
        assert!(rx_observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_of_unregistered_connection_is_quiet() {
        let (router, registry, _) = test_router();
        let (peer, mut rx_peer) = test_handle();
        registry.admit(1, peer);

        let (handle, _rx) = test_handle();
        router.handle_close(&handle, None);

        assert_eq!(registry.online_count(), 1);
        assert!(rx_peer.try_recv().is_err());
    }
}
