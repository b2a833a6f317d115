//! In-memory session store.
//!
//! Each session gets its own mutex, so `mutate` calls for one session id are
//! serialized (no lost updates) while different sessions proceed in
//! parallel.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{SessionState, SessionStore};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn init(&self, session_id: &str) -> Result<SessionState, StoreError> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateSession(session_id.to_string())),
            Entry::Vacant(slot) => {
                let state = SessionState::new(session_id);
                slot.insert(Arc::new(Mutex::new(state.clone())));
                Ok(state)
            }
        }
    }

    fn get(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let cell = self
            .sessions
            .get(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        let state = cell.lock().clone();
        Ok(state)
    }

    fn mutate(
        &self,
        session_id: &str,
        f: &mut dyn FnMut(&mut SessionState),
    ) -> Result<SessionState, StoreError> {
        let cell = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(session_id))))
            .clone();

        let mut state = cell.lock();
        f(&mut state);
        Ok(state.clone())
    }

    fn teardown(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.remove(session_id);
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
