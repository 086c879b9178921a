//! In-memory block store
//!
//! Single-process only, no persistence. Used in development and as the test
//! double for the relay handlers.

use async_trait::async_trait;
use dashmap::DashSet;

use crate::envelope::UserId;
use crate::store::BlockStore;

/// In-process table of (blocker, blocked) pairs
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    relations: DashSet<(UserId, UserId)>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `blocker` blocked `blocked`
    pub fn block(&self, blocker: UserId, blocked: UserId) {
        self.relations.insert((blocker, blocked));
    }

    /// Remove a block relation
    pub fn unblock(&self, blocker: UserId, blocked: UserId) {
        self.relations.remove(&(blocker, blocked));
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn is_blocked(&self, blocker: UserId, blocked: UserId) -> anyhow::Result<bool> {
        Ok(self.relations.contains(&(blocker, blocked)))
    }
}
