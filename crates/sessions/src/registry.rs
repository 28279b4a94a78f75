use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::Session;

/// Concurrency-safe mapping `owner_tg -> Session`, guarded by a single
/// read-write lock: writes are rare (connect/disconnect), reads frequent
/// (every chat command looks a session up).
///
/// Invariant: at most one `Session` per `owner_tg`. A reconnecting Gateway
/// evicts the prior session by cancelling its context before the new one is
/// stored, so any caller still holding a reference to the evicted session
/// observes a cancelled `ctx`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `session` under `owner`. If a session already exists for
    /// that owner, its context is cancelled before it is replaced.
    pub async fn insert(&self, owner: &str, session: Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        if let Some(previous) = sessions.insert(owner.to_string(), session) {
            previous.ctx.cancel();
        }
    }

    pub async fn lookup(&self, owner: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(owner).cloned()
    }

    /// Removes the session stored under `owner`, but only if the stored
    /// pointer is identity-equal to `session` — guards against a race with
    /// a newer reconnect that already replaced it.
    pub async fn remove(&self, owner: &str, session: &Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        let should_remove = sessions.get(owner).is_some_and(|stored| Arc::ptr_eq(stored, session));
        if should_remove {
            sessions.remove(owner);
        }
    }

    /// Debug-only enumeration; not exposed to request handlers.
    #[must_use]
    pub async fn debug_owners(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_session(owner: &str) -> Arc<Session> {
        let (session, _channels) = Session::new(owner.to_string(), "U1".into(), 42, true);
        Arc::new(session)
    }

    #[tokio::test]
    async fn insert_then_lookup_round_trips() {
        let registry = SessionRegistry::new();
        let session = new_session("alice");
        registry.insert("alice", session.clone()).await;

        let found = registry.lookup("alice").await.unwrap();
        assert!(Arc::ptr_eq(&found, &session));
    }

    #[tokio::test]
    async fn reinsert_cancels_the_prior_session() {
        let registry = SessionRegistry::new();
        let first = new_session("alice");
        registry.insert("alice", first.clone()).await;

        let second = new_session("alice");
        registry.insert("alice", second.clone()).await;

        assert!(first.ctx.is_cancelled());
        assert!(!second.ctx.is_cancelled());
        let found = registry.lookup("alice").await.unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[tokio::test]
    async fn remove_guards_against_stale_pointer() {
        let registry = SessionRegistry::new();
        let first = new_session("alice");
        registry.insert("alice", first.clone()).await;

        let second = new_session("alice");
        registry.insert("alice", second.clone()).await;

        // A late remove carrying the evicted session must not touch the
        // newer one.
        registry.remove("alice", &first).await;
        let found = registry.lookup("alice").await.unwrap();
        assert!(Arc::ptr_eq(&found, &second));

        registry.remove("alice", &second).await;
        assert!(registry.lookup("alice").await.is_none());
    }

    #[tokio::test]
    async fn lookup_returns_at_most_one_session_per_owner() {
        let registry = SessionRegistry::new();
        registry.insert("alice", new_session("alice")).await;
        registry.insert("bob", new_session("bob")).await;

        assert_eq!(registry.debug_owners().await.len(), 2);
        assert!(registry.lookup("alice").await.is_some());
        assert!(registry.lookup("bob").await.is_some());
        assert!(registry.lookup("carol").await.is_none());
    }
}
