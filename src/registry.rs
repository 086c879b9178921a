//! Connection registry
//!
//! Authoritative mapping from user identity to its one live connection.
//! The single source of truth for "who is online."
//!
//! Built on [`dashmap::DashMap`]: the per-key entry lock makes admit/remove
//! atomic for a given identity while leaving unrelated identities free to
//! proceed. Invariant: at most one [`RegistryEntry`] per identity at any
//! instant, and the old connection is closed before the new one replaces it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::envelope::UserId;

/// Frames travelling from the hub to a connection's writer task
#[derive(Debug)]
pub enum Outbound {
    /// An encoded server event to deliver
    Event(Vec<u8>),
    /// Tell the writer to close the socket and stop
    Close,
}

/// Allocate a process-unique connection id
pub fn next_conn_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Cheap, cloneable handle to one live connection
///
/// Sends are bounded and non-blocking: a full or closed outbound queue drops
/// the frame. Nothing in the hub ever awaits a peer's socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: u64,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(conn_id: u64, tx: mpsc::Sender<Outbound>) -> Self {
        Self { conn_id, tx }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Whether the connection's writer is still draining its queue
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a frame for delivery. Returns false if the frame was dropped.
    pub fn send(&self, payload: Vec<u8>) -> bool {
        match self.tx.try_send(Outbound::Event(payload)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = self.conn_id, "outbound queue full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = self.conn_id, "connection gone, frame dropped");
                false
            }
        }
    }

    /// Ask the connection to close. Best-effort, never blocks.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }
}

/// One registered identity
#[derive(Debug)]
pub struct RegistryEntry {
    pub handle: ConnectionHandle,
    pub connected_at: Instant,
}

/// Registry of all currently-connected identities
pub struct Registry {
    entries: DashMap<UserId, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Admit a connection for an identity, evicting any stale one.
    ///
    /// The lookup, the close of a superseded connection and the replacement
    /// all happen under the identity's entry lock, so no window exists where
    /// two connections are registered for the same identity. Returns true
    /// when an older connection was evicted.
    pub fn admit(&self, user_id: UserId, handle: ConnectionHandle) -> bool {
        let mut evicted = false;
        let entry = RegistryEntry {
            handle,
            connected_at: Instant::now(),
        };

        match self.entries.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                let current = &occupied.get().handle;
                if current.conn_id() != entry.handle.conn_id() && current.is_open() {
                    current.close();
                    evicted = true;
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }

        debug!(user_id, online = self.entries.len(), evicted, "identity admitted");
        evicted
    }

    /// Remove an identity, but only if `conn_id` is still the connection on
    /// record. A close event from a superseded connection is a no-op here,
    /// which is what keeps a reconnect race from deleting the newer entry.
    pub fn remove(&self, user_id: UserId, conn_id: u64) -> bool {
        let removed = self
            .entries
            .remove_if(&user_id, |_, entry| entry.handle.conn_id() == conn_id)
            .is_some();
        if removed {
            debug!(user_id, online = self.entries.len(), "identity removed");
        }
        removed
    }

    /// Current connection for an identity, if any
    pub fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.entries.get(&user_id).map(|entry| entry.handle.clone())
    }

    /// Whether an identity has an open connection right now
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.lookup(user_id).is_some_and(|handle| handle.is_open())
    }

    /// Visit every registered identity except `user_id`
    pub fn for_each_other(&self, user_id: UserId, mut f: impl FnMut(UserId, &ConnectionHandle)) {
        for entry in self.entries.iter() {
            if *entry.key() != user_id {
                f(*entry.key(), &entry.value().handle);
            }
        }
    }

    /// Number of registered identities
    pub fn online_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("online", &self.entries.len())
            .finish()
    }
}
