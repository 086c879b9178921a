//! Block-relation store abstraction
//!
//! The relational store that owns users, friendships and block relations
//! lives outside this hub. The relay handlers only ever ask one question of
//! it, "has `blocker` blocked `blocked`?", answered through this trait.
//!
//! # Features
//!
//! Exactly one backend must be enabled at compile time:
//!
//! - `postgres` - query the platform database directly
//! - `memory` - in-process table for development and tests

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBlockStore;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryBlockStore;

use async_trait::async_trait;

use crate::envelope::UserId;

/// Read-only view of the platform's block relations
///
/// Consulted by the chat and invitation relays before forwarding; never
/// mutated by this hub.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// True when `blocker` has blocked `blocked`
    async fn is_blocked(&self, blocker: UserId, blocked: UserId) -> anyhow::Result<bool>;
}
