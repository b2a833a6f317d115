//! Per-session state: the small mutable record predicates read and the
//! engine writes.
//!
//! Exactly one `SessionState` exists per active session id. SessionStart
//! initializes it, Stop tears it down, and every mutation goes through
//! [`SessionStore::mutate`], which is serialized per session id so events on
//! one timeline never race each other.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::verdict::DelegateMode;

/// Counter keys used by the built-in predicates.
pub mod counters {
    /// Tool calls since the last periodic audit was dispatched.
    pub const TOOL_CALLS_SINCE_AUDIT: &str = "tool_calls_since_audit";
    /// All tool calls seen this session.
    pub const TOOL_CALLS_TOTAL: &str = "tool_calls_total";
    /// Prompts submitted this session.
    pub const PROMPTS: &str = "prompts";
}

/// A standing block recorded against the session, set when a subagent files
/// a violation. Cleared by teardown or an explicit operator reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockFlag {
    pub reason: String,
    /// Which subagent or predicate filed the block.
    pub source: String,
    pub set_at: DateTime<Utc>,
}

/// A delegation issued but not yet resolved by a SubagentStop verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDelegate {
    pub subagent: String,
    /// Name of the predicate that issued the delegate.
    pub predicate: String,
    pub mode: DelegateMode,
    /// Failure policy of the issuing predicate, applied on timeout.
    pub fail_open: bool,
    pub issued_at: DateTime<Utc>,
}

/// One line of bounded recent-session history, fed to context payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub summary: String,
}

/// The per-session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Set at session start; cleared once the prompt-hydration delegate
    /// resolves (or the runtime runs the hydrator itself).
    #[serde(default)]
    pub hydration_pending: bool,
    #[serde(default)]
    pub block_flag: Option<BlockFlag>,
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
    #[serde(default)]
    pub pending_delegates: Vec<PendingDelegate>,
    /// Oldest first; trimmed from the front at the configured cap.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh default state: no flags set, empty counters.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        SessionState {
            session_id: session_id.into(),
            hydration_pending: false,
            block_flag: None,
            counters: BTreeMap::new(),
            pending_delegates: Vec::new(),
            history: Vec::new(),
            created_at: now,
            last_event_at: now,
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Increment and return the new value.
    pub fn bump_counter(&mut self, name: &str) -> u64 {
        let value = self.counters.entry(name.to_string()).or_insert(0);
        *value += 1;
        *value
    }

    pub fn reset_counter(&mut self, name: &str) {
        self.counters.insert(name.to_string(), 0);
    }

    /// Append a history line, dropping the oldest entries past `cap`.
    pub fn push_history(&mut self, at: DateTime<Utc>, summary: impl Into<String>, cap: usize) {
        self.history.push(HistoryEntry {
            at,
            summary: summary.into(),
        });
        if self.history.len() > cap {
            let excess = self.history.len() - cap;
            self.history.drain(..excess);
        }
    }

    /// Record a delegation awaiting its verdict.
    pub fn record_pending_delegate(&mut self, pending: PendingDelegate) {
        self.pending_delegates.push(pending);
    }

    /// Resolve (remove) the oldest pending delegate for a subagent.
    /// Returns it if one was pending.
    pub fn resolve_pending_delegate(&mut self, subagent: &str) -> Option<PendingDelegate> {
        let idx = self
            .pending_delegates
            .iter()
            .position(|p| p.subagent == subagent)?;
        Some(self.pending_delegates.remove(idx))
    }
}

/// Storage for session state, keyed by session id.
///
/// Process-lifetime scoped by default ([`MemoryStore`]); [`SqliteStore`]
/// survives restarts behind the same interface. Either way the store is a
/// constructed, passed-in dependency, never an ambient singleton.
pub trait SessionStore: Send + Sync {
    /// Create fresh state for a session. Fails with
    /// [`StoreError::DuplicateSession`] if the id is still live.
    fn init(&self, session_id: &str) -> Result<SessionState, StoreError>;

    /// Fetch state, failing with [`StoreError::NotFound`] if absent.
    fn get(&self, session_id: &str) -> Result<SessionState, StoreError>;

    /// Atomic read-modify-write, serialized per session id. Missing state
    /// is upserted from a fresh default so a single expired session never
    /// errors the whole chain. Returns the post-mutation state.
    fn mutate(
        &self,
        session_id: &str,
        f: &mut dyn FnMut(&mut SessionState),
    ) -> Result<SessionState, StoreError>;

    /// Remove all state for a session. Idempotent: tearing down a session
    /// that is already gone is a no-op.
    fn teardown(&self, session_id: &str) -> Result<(), StoreError>;

    /// Live session ids, for operator inspection.
    fn list_sessions(&self) -> Result<Vec<String>, StoreError>;

    /// The accessor predicates use: missing or unreadable state degrades to
    /// a fresh default instead of failing the pipeline.
    fn get_or_default(&self, session_id: &str) -> SessionState {
        match self.get(session_id) {
            Ok(state) => state,
            Err(StoreError::NotFound(_)) => SessionState::new(session_id),
            Err(err) => {
                tracing::warn!(session_id, error = %err, "session state unreadable, using defaults");
                SessionState::new(session_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_flags() {
        let state = SessionState::new("s1");
        assert!(!state.hydration_pending);
        assert!(state.block_flag.is_none());
        assert!(state.counters.is_empty());
        assert!(state.pending_delegates.is_empty());
    }

    #[test]
    fn counters_bump_and_reset() {
        let mut state = SessionState::new("s1");
        assert_eq!(state.counter(counters::TOOL_CALLS_SINCE_AUDIT), 0);
        assert_eq!(state.bump_counter(counters::TOOL_CALLS_SINCE_AUDIT), 1);
        assert_eq!(state.bump_counter(counters::TOOL_CALLS_SINCE_AUDIT), 2);
        state.reset_counter(counters::TOOL_CALLS_SINCE_AUDIT);
        assert_eq!(state.counter(counters::TOOL_CALLS_SINCE_AUDIT), 0);
    }

    #[test]
    fn history_drops_oldest_past_cap() {
        let mut state = SessionState::new("s1");
        for i in 0..5 {
            state.push_history(Utc::now(), format!("entry {i}"), 3);
        }
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[0].summary, "entry 2");
        assert_eq!(state.history[2].summary, "entry 4");
    }

    #[test]
    fn pending_delegates_resolve_oldest_first() {
        let mut state = SessionState::new("s1");
        for predicate in ["first", "second"] {
            state.record_pending_delegate(PendingDelegate {
                subagent: "custodiet".to_string(),
                predicate: predicate.to_string(),
                mode: DelegateMode::Async,
                fail_open: true,
                issued_at: Utc::now(),
            });
        }

        let resolved = state.resolve_pending_delegate("custodiet").unwrap();
        assert_eq!(resolved.predicate, "first");
        assert_eq!(state.pending_delegates.len(), 1);
        assert!(state.resolve_pending_delegate("hydrator").is_none());
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = SessionState::new("s1");
        state.hydration_pending = true;
        state.bump_counter(counters::PROMPTS);
        state.push_history(Utc::now(), "UserPromptSubmit", 10);

        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
