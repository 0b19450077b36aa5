//! Session Management
//!
//! Session identifiers, the persistence contract for snapshots, and the
//! per-session turn lock.
//!
//! The engine only produces snapshots. Storage is the caller's concern; the
//! in-memory store here exists for development and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::state::SessionSnapshot;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    /// Save a session snapshot
    fn save(&self, id: &SessionId, snapshot: &SessionSnapshot) -> Result<()>;

    /// Load a session snapshot by ID
    fn load(&self, id: &SessionId) -> Result<Option<SessionSnapshot>>;

    /// Delete a session
    fn delete(&self, id: &SessionId) -> Result<()>;
}

/// In-memory session store (for development/testing)
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionSnapshot>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.read().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::Session("session store lock poisoned".into())
}

impl SessionStore for MemorySessionStore {
    fn save(&self, id: &SessionId, snapshot: &SessionSnapshot) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(id.clone(), snapshot.clone());
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Option<SessionSnapshot>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(id).cloned())
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.remove(id);
        Ok(())
    }
}

/// One async lock per session id
///
/// Callers hold the guard across load → turn → save so two requests for the
/// same session cannot interleave their read-modify-write.
#[derive(Default)]
pub struct TurnLocks {
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a session
    pub async fn acquire(&self, id: &SessionId) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().map_err(poisoned)?;
            // Drop entries nobody is holding or waiting on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(id.clone()).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Number of sessions currently locked or awaited
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .map_or(0, |l| l.values().filter(|a| Arc::strong_count(a) > 1).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;
    use std::time::Duration;

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        let state = SessionState::new(SessionId::new(), 5);
        let id = state.session_id.clone();

        store.save(&id, &state.to_snapshot()).unwrap();

        let loaded = store.load(&id).unwrap();
        assert_eq!(loaded.unwrap().session_id, id);

        store.delete(&id).unwrap();
        assert!(store.load(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_turn_locks_serialize_same_session() {
        let locks = Arc::new(TurnLocks::new());
        let id = SessionId::from_string("same");

        let guard = locks.acquire(&id).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&id).await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_turn_locks_independent_sessions() {
        let locks = TurnLocks::new();
        let _a = locks.acquire(&SessionId::from_string("a")).await.unwrap();
        let _b = locks.acquire(&SessionId::from_string("b")).await.unwrap();
        assert_eq!(locks.active(), 2);
    }
}
