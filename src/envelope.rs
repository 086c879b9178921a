//! Wire protocol for the presence socket
//!
//! One JSON object per WebSocket message, discriminated by a `type` field.
//!
//! ## Client Events
//! - `online`: bind the authenticated identity to this connection
//! - `ping`: keepalive, ignored by the server
//! - `chat`: relay a direct message to another identity
//! - `game_invitation`: relay a game invitation
//! - `game_invitation_response`: relay an accept/decline back to the inviter
//!
//! ## Server Events
//! - `presence`: an identity went online or offline
//! - `chat` / `message_sent`: delivered message and sender-side confirmation
//! - `game_invitation` / `game_invitation_sent` / `game_invitation_response`
//! - `channel_user_*`, `you_were_*`, `channel_admin_changed`: moderation
//!   notifications fanned out by the administrative handlers
//!
//! Server event kinds also appear as unit variants of [`ClientEvent`] so the
//! dispatcher's match stays closed and exhaustive; a client that echoes one
//! back gets it dropped without killing the connection.

use serde::{Deserialize, Serialize};

/// Stable integer identity issued by the external auth service
pub type UserId = u64;

/// Client-to-server events
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Online { user_id: UserId },
    Ping,
    #[serde(rename_all = "camelCase")]
    Chat {
        to: UserId,
        message: String,
        message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GameInvitation {
        to: UserId,
        from_name: String,
        invitation_id: String,
    },
    #[serde(rename_all = "camelCase")]
    GameInvitationResponse {
        to: UserId,
        invitation_id: String,
        response: String,
    },
    // Outbound-only kinds. The server never expects these from a client;
    // payload fields are ignored on receipt.
    Presence,
    MessageSent,
    GameInvitationSent,
    ChannelUserJoined,
    ChannelUserKicked,
    YouWereKicked,
    ChannelUserMuted,
    YouWereMuted,
    ChannelUserUnmuted,
    YouWereUnmuted,
    ChannelAdminChanged,
    ChannelUserLeft,
}

impl ClientEvent {
    /// True for kinds the server only ever sends
    pub fn is_outbound_only(&self) -> bool {
        matches!(
            self,
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
                | ClientEvent::ChannelUserLeft
        )
    }
}

/// Online/offline marker carried by `presence` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Channel member snapshot embedded in `channel_user_joined`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMemberInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_muted: bool,
    pub mute_end_time: Option<String>,
    pub joined_at: String,
}

/// Server-to-client events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Presence {
        user_id: UserId,
        status: PresenceStatus,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        from: UserId,
        message: String,
        message_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageSent {
        to: UserId,
        message_id: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    GameInvitation {
        from: UserId,
        from_name: String,
        invitation_id: String,
    },
    #[serde(rename_all = "camelCase")]
    GameInvitationSent { to: UserId, invitation_id: String },
    #[serde(rename_all = "camelCase")]
    GameInvitationResponse {
        from: UserId,
        invitation_id: String,
        response: String,
    },
    #[serde(rename_all = "camelCase")]
    ChannelUserJoined {
        channel_id: u64,
        member: ChannelMemberInfo,
    },
    #[serde(rename_all = "camelCase")]
    ChannelUserKicked {
        channel_id: u64,
        user_id: UserId,
        display_name: String,
        admin_id: UserId,
        admin_name: String,
    },
    #[serde(rename_all = "camelCase")]
    YouWereKicked {
        channel_id: u64,
        channel_name: String,
        admin_id: UserId,
        admin_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ChannelUserMuted {
        channel_id: u64,
        user_id: UserId,
        display_name: String,
        admin_id: UserId,
        admin_name: String,
        duration: u64,
        mute_end_time: String,
    },
    #[serde(rename_all = "camelCase")]
    YouWereMuted {
        channel_id: u64,
        channel_name: String,
        admin_id: UserId,
        admin_name: String,
        duration: u64,
        mute_end_time: String,
    },
    #[serde(rename_all = "camelCase")]
    ChannelUserUnmuted {
        channel_id: u64,
        user_id: UserId,
        display_name: String,
        admin_id: UserId,
        admin_name: String,
    },
    #[serde(rename_all = "camelCase")]
    YouWereUnmuted {
        channel_id: u64,
        channel_name: String,
        admin_id: UserId,
        admin_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ChannelAdminChanged {
        channel_id: u64,
        user_id: UserId,
        display_name: String,
        is_admin: bool,
        changed_by: String,
    },
    #[serde(rename_all = "camelCase")]
    ChannelUserLeft {
        channel_id: u64,
        user_id: UserId,
        display_name: String,
    },
}

/// Parse a client event from raw bytes
///
/// A payload whose `type` tag is not a kind this hub has ever heard of is
/// reported as [`EnvelopeError::UnknownKind`] so the router can log it apart
/// from plain garbage.
pub fn parse_event(data: &[u8]) -> Result<ClientEvent, EnvelopeError> {
    match serde_json::from_slice::<ClientEvent>(data) {
        Ok(event) => Ok(event),
        Err(err) => {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data)
                && let Some(kind) = value.get("type").and_then(|t| t.as_str())
                && !is_known_kind(kind)
            {
                return Err(EnvelopeError::UnknownKind(kind.to_string()));
            }
            Err(EnvelopeError::Parse(err))
        }
    }
}

/// Encode a server event to bytes
pub fn encode(event: &ServerEvent) -> Vec<u8> {
    serde_json::to_vec(event).unwrap()
}

fn is_known_kind(kind: &str) -> bool {
    matches!(
        kind,
        "online"
            | "ping"
            | "chat"
            | "message_sent"
            | "presence"
            | "game_invitation"
            | "game_invitation_sent"
            | "game_invitation_response"
            | "channel_user_joined"
            | "channel_user_kicked"
            | "you_were_kicked"
            | "channel_user_muted"
            | "you_were_muted"
            | "channel_user_unmuted"
            | "you_were_unmuted"
            | "channel_admin_changed"
            | "channel_user_left"
    )
}

/// Wire protocol errors
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("failed to parse envelope: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}
