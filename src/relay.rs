//! Relay handlers
//!
//! Forwarding between connected identities: direct chat, game invitations
//! and their responses, plus the fan-out primitives the administrative
//! handlers use for moderation notifications.
//!
//! Everything here is best-effort. An offline target, a blocked sender or a
//! full outbound queue is steady state, not an error; nothing is retried and
//! nothing is surfaced to the caller beyond the normal confirmation events.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::envelope::{ServerEvent, UserId, encode};
use crate::registry::Registry;
use crate::store::BlockStore;

/// Relays events between registered identities
pub struct Relay {
    registry: Arc<Registry>,
    blocks: Arc<dyn BlockStore>,
}

impl Relay {
    pub fn new(registry: Arc<Registry>, blocks: Arc<dyn BlockStore>) -> Self {
        Self { registry, blocks }
    }

    /// Relay a direct chat message from `from` to `to`.
    ///
    /// If `to` has blocked `from`, the message vanishes: no delivery, no
    /// confirmation, no error back to the sender. Otherwise the recipient
    /// gets the message if online, and the sender always gets a
    /// `message_sent` confirmation: it certifies "relay attempted", not
    /// "recipient received".
    pub async fn chat(&self, from: UserId, to: UserId, message: String, message_id: Option<String>) {
        if self.blocked(to, from).await {
            debug!(from, to, "chat suppressed by block relation");
            return;
        }

        let message_id = message_id.unwrap_or_else(|| generated_message_id(from, to));

        if let Some(target) = self.registry.lookup(to) {
            target.send(encode(&ServerEvent::Chat {
                from,
                message: message.clone(),
                message_id: message_id.clone(),
            }));
        } else {
            debug!(from, to, "chat target offline");
        }

        if let Some(sender) = self.registry.lookup(from) {
            sender.send(encode(&ServerEvent::MessageSent {
                to,
                message_id,
                message,
            }));
        }
    }

    /// Relay a game invitation. Same block semantics as chat; the inviter is
    /// acknowledged with `game_invitation_sent` whether or not the target is
    /// online.
    pub async fn game_invitation(
        &self,
        from: UserId,
        to: UserId,
        from_name: String,
        invitation_id: String,
    ) {
        if self.blocked(to, from).await {
            debug!(from, to, "invitation suppressed by block relation");
            return;
        }

        if let Some(target) = self.registry.lookup(to) {
            target.send(encode(&ServerEvent::GameInvitation {
                from,
                from_name,
                invitation_id: invitation_id.clone(),
            }));
        } else {
            debug!(from, to, "invitation target offline");
        }

        if let Some(sender) = self.registry.lookup(from) {
            sender.send(encode(&ServerEvent::GameInvitationSent {
                to,
                invitation_id,
            }));
        }
    }

    /// Relay an invitation response back to the inviter.
    ///
    /// No block check: a response can only exist because the invitation
    /// already reached the responder, and blocking was evaluated then.
    pub fn game_invitation_response(
        &self,
        from: UserId,
        to: UserId,
        invitation_id: String,
        response: String,
    ) {
        if let Some(target) = self.registry.lookup(to) {
            target.send(encode(&ServerEvent::GameInvitationResponse {
                from,
                invitation_id,
                response,
            }));
        } else {
            debug!(from, to, "invitation response target offline");
        }
    }

    /// Deliver an event to one identity, silently skipping it if offline
    pub fn notify_one(&self, user_id: UserId, event: &ServerEvent) {
        if let Some(handle) = self.registry.lookup(user_id) {
            handle.send(encode(event));
        }
    }

    /// Deliver an event to a set of identities, silently skipping anyone
    /// offline. Used by the administrative handlers to notify channel
    /// members of kicks, mutes and admin changes.
    pub fn broadcast_to_set(&self, user_ids: &[UserId], event: &ServerEvent) {
        let payload = encode(event);
        let mut notified = 0usize;
        for &user_id in user_ids {
            if let Some(handle) = self.registry.lookup(user_id) {
                if handle.send(payload.clone()) {
                    notified += 1;
                }
            }
        }
        debug!(targets = user_ids.len(), notified, "moderation broadcast");
    }

    async fn blocked(&self, blocker: UserId, blocked: UserId) -> bool {
        match self.blocks.is_blocked(blocker, blocked).await {
            Ok(is_blocked) => is_blocked,
            Err(err) => {
                // fail closed: never deliver past a block we could not read
                warn!(error = %err, "block lookup failed, relay suppressed");
                true
            }
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Fallback message id when the client did not supply one, stable for a
/// given (from, to, timestamp) so clients can de-duplicate
fn generated_message_id(from: UserId, to: UserId) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{from}-{to}-{millis}")
}
