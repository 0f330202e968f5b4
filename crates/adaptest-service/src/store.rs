//! Attempt registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use adaptest_core::attempt::Attempt;
use adaptest_core::error::{EngineError, EngineResult};

/// An attempt behind its own exclusive lock.
pub type SharedAttempt = Arc<Mutex<Attempt>>;

/// Registry of live attempts.
///
/// Implementations hold their own locks only for the duration of a call;
/// callers lock the returned [`SharedAttempt`] to mutate it.
pub trait AttemptStore: Send + Sync {
    /// Register a new attempt. Fails with `AttemptExists` if the id is live.
    fn insert(&self, attempt: Attempt) -> EngineResult<SharedAttempt>;

    /// Look up a live attempt and mark it as recently used.
    fn get(&self, attempt_id: &str) -> EngineResult<SharedAttempt>;

    fn contains(&self, attempt_id: &str) -> bool;

    /// Remove an attempt, returning it if it was live.
    fn remove(&self, attempt_id: &str) -> Option<SharedAttempt>;

    /// Ids of attempts not used within `ttl`.
    fn idle(&self, ttl: Duration) -> Vec<String>;

    /// Remove an attempt only if it is still idle for `ttl` when the removal
    /// happens.
    fn remove_if_idle(&self, attempt_id: &str, ttl: Duration) -> Option<SharedAttempt>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    attempt: SharedAttempt,
    last_used: Instant,
}

/// In-process [`AttemptStore`].
#[derive(Default)]
pub struct InMemoryAttemptStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptStore for InMemoryAttemptStore {
    fn insert(&self, attempt: Attempt) -> EngineResult<SharedAttempt> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let attempt_id = attempt.attempt_id().to_string();
        if entries.contains_key(&attempt_id) {
            return Err(EngineError::AttemptExists(attempt_id));
        }
        let shared = Arc::new(Mutex::new(attempt));
        entries.insert(
            attempt_id,
            Entry {
                attempt: Arc::clone(&shared),
                last_used: Instant::now(),
            },
        );
        Ok(shared)
    }

    fn get(&self, attempt_id: &str) -> EngineResult<SharedAttempt> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get_mut(attempt_id)
            .ok_or_else(|| EngineError::UnknownAttempt(attempt_id.to_string()))?;
        entry.last_used = Instant::now();
        Ok(Arc::clone(&entry.attempt))
    }

    fn contains(&self, attempt_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(attempt_id)
    }

    fn remove(&self, attempt_id: &str) -> Option<SharedAttempt> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(attempt_id)
            .map(|entry| entry.attempt)
    }

    fn idle(&self, ttl: Duration) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_used) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn remove_if_idle(&self, attempt_id: &str, ttl: Duration) -> Option<SharedAttempt> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let idle = entries
            .get(attempt_id)
            .is_some_and(|entry| Instant::now().duration_since(entry.last_used) >= ttl);
        if !idle {
            return None;
        }
        entries.remove(attempt_id).map(|entry| entry.attempt)
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptest_core::attempt::AttemptConfig;
    use adaptest_core::error::ErrorKind;
    use adaptest_core::estimator::EstimatorConfig;
    use adaptest_core::item::ItemPool;
    use adaptest_core::selector::SelectorConfig;

    fn attempt(id: &str) -> Attempt {
        Attempt::init(
            id,
            vec![ItemPool::empty("Testing")],
            &EstimatorConfig::default(),
            &SelectorConfig::default(),
            AttemptConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let store = InMemoryAttemptStore::new();
        assert!(store.is_empty());
        store.insert(attempt("a")).unwrap();
        assert!(store.contains("a"));

        let shared = store.get("a").unwrap();
        assert_eq!(shared.lock().await.attempt_id(), "a");

        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.get("a").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn duplicate_id_is_a_state_error() {
        let store = InMemoryAttemptStore::new();
        store.insert(attempt("a")).unwrap();
        let err = store.insert(attempt("a")).unwrap_err();
        assert_eq!(err, EngineError::AttemptExists("a".into()));
        assert!(err.is_state_error());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_tracks_last_use() {
        let store = InMemoryAttemptStore::new();
        store.insert(attempt("old")).unwrap();
        store.insert(attempt("fresh")).unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        store.get("fresh").unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(store.idle(Duration::from_secs(30)), vec!["old"]);
        assert_eq!(store.idle(Duration::from_secs(5)), vec!["fresh", "old"]);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_if_idle_rechecks_last_use() {
        let store = InMemoryAttemptStore::new();
        store.insert(attempt("a")).unwrap();
        store.insert(attempt("b")).unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let idle = store.idle(Duration::from_secs(30));
        assert_eq!(idle, vec!["a", "b"]);

        // Used after the idle scan, before the removal.
        store.get("a").unwrap();

        assert!(store
            .remove_if_idle("a", Duration::from_secs(30))
            .is_none());
        assert!(store
            .remove_if_idle("b", Duration::from_secs(30))
            .is_some());
        assert!(store
            .remove_if_idle("missing", Duration::from_secs(30))
            .is_none());
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
    }
}
