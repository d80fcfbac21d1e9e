//! # Session Directory
//!
//! Maps transport-level connection handles to live application sessions.
//!
//! The directory holds weak back references only — it is a lookup aid for
//! inbound dispatch, never an owner. A connection whose session has been torn
//! down simply resolves to `None`, which callers treat as a normal outcome
//! (stray dispatches are dropped silently).

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::trace;

use crate::cache::DeduplicationCache;

/// Identity of one transport-level connection.
pub type ConnectionId = u64;

/// Server-side counterpart of one connected client.
///
/// Owns the per-connection chunk deduplication cache; the cache lives and
/// dies with the session.
#[derive(Debug)]
pub struct Session {
    connection: ConnectionId,
    name: String,
    chunk_cache: DeduplicationCache,
}

impl Session {
    pub fn new(connection: ConnectionId, name: impl Into<String>) -> Self {
        Self {
            connection,
            name: name.into(),
            chunk_cache: DeduplicationCache::new(),
        }
    }

    /// The transport connection this session is bound to.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Display name of the session's player/client.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-session chunk deduplication state.
    pub fn chunk_cache(&self) -> &DeduplicationCache {
        &self.chunk_cache
    }
}

/// Directory of live sessions, keyed by connection identity.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<ConnectionId, Weak<Session>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a session to its connection. Replaces any previous binding for
    /// the same connection.
    pub fn insert(&self, session: &Arc<Session>) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.connection(), Arc::downgrade(session));
    }

    /// Resolve the live session for a connection.
    ///
    /// `None` is a normal outcome: the connection may not have completed
    /// setup, or its session may already be gone.
    pub fn resolve(&self, connection: ConnectionId) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection)
            .and_then(Weak::upgrade)
    }

    /// Drop the binding for a connection.
    pub fn remove(&self, connection: ConnectionId) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&connection);
    }

    /// Sweep bindings whose sessions have been dropped. Returns how many were
    /// removed.
    pub fn prune(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, weak| weak.strong_count() > 0);
        let removed = before - sessions.len();
        if removed > 0 {
            trace!(removed, remaining = sessions.len(), "dead session bindings pruned");
        }
        removed
    }

    /// Number of bindings currently held (live or not yet pruned).
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_live_session() {
        let directory = SessionDirectory::new();
        let session = Arc::new(Session::new(42, "steve"));
        directory.insert(&session);

        let resolved = directory.resolve(42).expect("session resolves");
        assert_eq!(resolved.name(), "steve");
        assert_eq!(resolved.connection(), 42);
    }

    #[test]
    fn test_unknown_connection_resolves_to_none() {
        let directory = SessionDirectory::new();
        assert!(directory.resolve(999).is_none());
    }

    #[test]
    fn test_directory_does_not_own_sessions() {
        let directory = SessionDirectory::new();
        let session = Arc::new(Session::new(1, "alex"));
        directory.insert(&session);

        drop(session);
        // Binding still present, but the session is gone
        assert_eq!(directory.len(), 1);
        assert!(directory.resolve(1).is_none());
    }

    #[test]
    fn test_prune_sweeps_dead_bindings() {
        let directory = SessionDirectory::new();
        let keep = Arc::new(Session::new(1, "keep"));
        let drop_me = Arc::new(Session::new(2, "drop"));
        directory.insert(&keep);
        directory.insert(&drop_me);

        drop(drop_me);
        assert_eq!(directory.prune(), 1);
        assert_eq!(directory.len(), 1);
        assert!(directory.resolve(1).is_some());
    }

    #[test]
    fn test_remove_unbinds_connection() {
        let directory = SessionDirectory::new();
        let session = Arc::new(Session::new(7, "gone"));
        directory.insert(&session);

        directory.remove(7);
        assert!(directory.resolve(7).is_none());
        assert!(directory.is_empty());
    }
}
