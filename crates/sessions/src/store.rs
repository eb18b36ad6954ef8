//! Keyed session map.
//!
//! Each entry is an `Arc<tokio::sync::Mutex<SessionState>>`: the map shard
//! lock is only held while looking up or inserting the handle, and the
//! per-session mutex serializes every mutation of one session while other
//! sessions proceed in parallel. The async mutex may be held across the
//! completion call.

use std::sync::Arc;

use {
    dashmap::{DashMap, mapref::entry::Entry},
    parley_config::SessionDefaults,
    tokio::sync::Mutex,
    tracing::debug,
};

use crate::state::SessionState;

/// Shared, lockable handle to one session.
pub type SessionHandle = Arc<Mutex<SessionState>>;

pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    defaults: SessionDefaults,
}

impl SessionStore {
    /// `defaults.model` must be a canonical model id.
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            sessions: DashMap::new(),
            defaults,
        }
    }

    /// Return the session for `session_id`, creating it from the defaults
    /// if it has never been seen.
    ///
    /// Concurrent first calls for the same id observe a single
    /// initialization and receive the same handle.
    pub fn get_or_init(&self, session_id: &str) -> SessionHandle {
        if let Some(existing) = self.sessions.get(session_id) {
            return Arc::clone(existing.value());
        }

        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                debug!(session_id, model = %self.defaults.model, "initializing session");
                let state = SessionState::from_defaults(session_id, &self.defaults);
                Arc::clone(vacant.insert(Arc::new(Mutex::new(state))).value())
            },
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Copy of the current state, waiting for any in-flight mutation.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        let handle = self.get(session_id)?;
        let state = handle.lock().await;
        Some(state.clone())
    }

    /// Remove the session entirely. Returns whether it existed.
    ///
    /// A turn already holding the handle finishes against the detached
    /// state; the next event starts from the defaults.
    pub fn reset(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        debug!(session_id, removed, "session reset");
        removed
    }

    /// Empty the history, leaving every other field untouched. Returns
    /// whether the session existed.
    pub async fn clear_history(&self, session_id: &str) -> bool {
        let Some(handle) = self.get(session_id) else {
            return false;
        };
        let mut state = handle.lock().await;
        let dropped = state.chat_history.len();
        state.chat_history.clear();
        debug!(session_id, dropped, "session history cleared");
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
