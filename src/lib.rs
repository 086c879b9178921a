//! RallyCast - real-time presence and relay hub for the game platform
//!
//! Tracks which users hold a live WebSocket connection, multiplexes chat,
//! game invitations and moderation notifications over that single connection
//! per user, and forwards events between users. Persistence, credentials and
//! rendering live elsewhere; this crate owns the one genuinely concurrent
//! piece - the connection registry and everything that fans out through it.
//!
//! ## Architecture
//!
//! ```text
//! Client (WS) → server → EventRouter → Relay / Registry → peer connections
//! ```
//!
//! Each connection is one tokio task; the [`registry::Registry`] is the only
//! shared mutable state, and every cross-connection send is a bounded
//! non-blocking push into the peer's outbound queue.
//!
//! Administrative handlers (channel kicks, mutes, admin changes) call
//! [`relay::Relay::notify_one`] / [`relay::Relay::broadcast_to_set`] to fan
//! their notifications out through the same registry.

// Compile-time feature validation: exactly one block-store backend required
#[cfg(not(any(feature = "postgres", feature = "memory")))]
compile_error!(
    "RallyCast requires a block-store backend. Enable: --features postgres OR --features memory"
);

// Enforce mutual exclusivity
#[cfg(all(feature = "postgres", feature = "memory"))]
compile_error!("Only one block-store backend can be enabled. Choose postgres OR memory, not both.");

pub mod config;
pub mod envelope;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod store;

pub use config::Config;
pub use envelope::{ClientEvent, PresenceStatus, ServerEvent, UserId};
pub use registry::{ConnectionHandle, Registry};
pub use relay::Relay;
pub use router::EventRouter;
pub use store::BlockStore;

#[cfg(feature = "postgres")]
pub use store::PostgresBlockStore;

#[cfg(feature = "memory")]
pub use store::MemoryBlockStore;
