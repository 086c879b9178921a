//! Presence broadcasting
//!
//! When an identity comes online or goes offline, every *other* registered
//! identity hears about it. Delivery is best-effort per recipient; one slow
//! or dead peer never aborts the fan-out.

use tracing::debug;

use crate::envelope::{PresenceStatus, ServerEvent, UserId, encode};
use crate::registry::Registry;

/// Announce a status change for `user_id` to everyone else
///
/// The transitioning identity never receives its own presence event.
pub fn broadcast_presence(registry: &Registry, user_id: UserId, status: PresenceStatus) {
    let payload = encode(&ServerEvent::Presence { user_id, status });

    let mut notified = 0usize;
    let mut skipped = 0usize;
    registry.for_each_other(user_id, |peer, handle| {
        if handle.send(payload.clone()) {
            notified += 1;
        } else {
            debug!(peer, "presence delivery skipped");
            skipped += 1;
        }
    });

    debug!(user_id, ?status, notified, skipped, "presence broadcast");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionHandle, Outbound, next_conn_id};
    use tokio::sync::mpsc;

    fn test_handle() -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(next_conn_id(), tx), rx)
    }

    fn recv_event(rx: &mut mpsc::Receiver<Outbound>) -> serde_json::Value {
        match rx.try_recv() {
            Ok(Outbound::Event(payload)) => serde_json::from_slice(&payload).unwrap(),
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_reaches_every_other_peer_once() {
        let registry = Registry::new();
        let (a, mut rx_a) = test_handle();
        let (b, mut rx_b) = test_handle();
        let (subject, mut rx_subject) = test_handle();

        registry.admit(1, a);
        registry.admit(2, b);
        registry.admit(5, subject);

        broadcast_presence(&registry, 5, PresenceStatus::Offline);

        for rx in [&mut rx_a, &mut rx_b] {
            let event = recv_event(rx);
            assert_eq!(event["type"], "presence");
            assert_eq!(event["userId"], 5);
            assert_eq!(event["status"], "offline");
            // exactly once each
            assert!(rx.try_recv().is_err());
        }

        // never to the transitioning identity itself
        assert!(rx_subject.try_recv().is_err());
    }

    #[test]
    fn test_dead_peer_does_not_abort_fanout() {
        let registry = Registry::new();
        let (dead, rx_dead) = test_handle();
        let (live, mut rx_live) = test_handle();

        registry.admit(1, dead);
        registry.admit(2, live);
        drop(rx_dead);

        broadcast_presence(&registry, 9, PresenceStatus::Online);

        let event = recv_event(&mut rx_live);
        assert_eq!(event["userId"], 9);
        assert_eq!(event["status"], "online");
    }
}
