use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SessionHandle;

/// Keyed storage for active sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Arc<SessionHandle>>;

    /// Records a new session. Returns false, leaving the store untouched, when
    /// the id is already taken.
    async fn put(&self, id: String, handle: Arc<SessionHandle>) -> bool;

    async fn remove(&self, id: &str) -> Option<Arc<SessionHandle>>;

    async fn snapshot(&self) -> Vec<Arc<SessionHandle>>;

    async fn count(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn put(&self, id: String, handle: Arc<SessionHandle>) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return false;
        }
        sessions.insert(id, handle);
        true
    }

    async fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.write().await.remove(id)
    }

    async fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().await.values().cloned().collect()
    }

    async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str) -> Arc<SessionHandle> {
        Arc::new(SessionHandle::new(id, "2025-06-18", None))
    }

    #[tokio::test]
    async fn put_then_get_returns_same_handle() {
        let store = InMemorySessionStore::new();
        let stored = handle("one");
        assert!(store.put("one".to_string(), stored.clone()).await);

        let fetched = store.get("one").await.expect("stored session");
        assert!(Arc::ptr_eq(&stored, &fetched));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn put_never_overwrites_existing_id() {
        let store = InMemorySessionStore::new();
        let first = handle("one");
        assert!(store.put("one".to_string(), first.clone()).await);
        assert!(!store.put("one".to_string(), handle("one")).await);

        let fetched = store.get("one").await.expect("stored session");
        assert!(Arc::ptr_eq(&first, &fetched));
    }

    #[tokio::test]
    async fn remove_happens_once() {
        let store = InMemorySessionStore::new();
        store.put("one".to_string(), handle("one")).await;

        assert!(store.remove("one").await.is_some());
        assert!(store.remove("one").await.is_none());
        assert!(store.get("one").await.is_none());
        assert_eq!(store.count().await, 0);
    }
}
