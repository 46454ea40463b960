//! Session registry.
//!
//! Trait-based storage abstraction over the live session map, enabling
//! dependency injection for tests. The default implementation uses
//! `DashMap` for lock-free concurrent access and tags each entry with an
//! insertion sequence so listings come back in creation order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::session::PersistentSession;

/// Trait for session registry operations.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks. Removal must be idempotent: lifecycle events can race an
/// explicit close, and both remove the same entry.
pub trait SessionRegistry: Send + Sync {
    /// Insert a session unless the id is already taken. Returns false on
    /// collision.
    fn try_insert(&self, session: Arc<PersistentSession>) -> bool;

    /// Look up a session by id.
    fn get(&self, session_id: &str) -> Option<Arc<PersistentSession>>;

    /// Remove a session by id, returning it if it was present.
    fn remove(&self, session_id: &str) -> Option<Arc<PersistentSession>>;

    /// All sessions in insertion order.
    fn list(&self) -> Vec<Arc<PersistentSession>>;

    fn contains(&self, session_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RegisteredSession {
    seq: u64,
    session: Arc<PersistentSession>,
}

/// DashMap-backed registry implementation.
#[derive(Default)]
pub struct DashMapSessionRegistry {
    next_seq: AtomicU64,
    sessions: DashMap<String, RegisteredSession>,
}

impl DashMapSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRegistry for DashMapSessionRegistry {
    fn try_insert(&self, session: Arc<PersistentSession>) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry = self.sessions.entry(session.id().to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(RegisteredSession { seq, session });
                true
            }
        }
    }

    fn get(&self, session_id: &str) -> Option<Arc<PersistentSession>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.session.clone())
    }

    fn remove(&self, session_id: &str) -> Option<Arc<PersistentSession>> {
        self.sessions
            .remove(session_id)
            .map(|(_, registered)| registered.session)
    }

    fn list(&self) -> Vec<Arc<PersistentSession>> {
        let mut entries: Vec<(u64, Arc<PersistentSession>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.seq, entry.session.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, session)| session).collect()
    }

    fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = DashMapSessionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("missing").is_none());
        assert!(registry.remove("missing").is_none());
        assert!(registry.list().is_empty());
        assert!(!registry.contains("missing"));
    }
}
