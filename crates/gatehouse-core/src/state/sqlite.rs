//! SQLite-backed session store.
//!
//! State is stored as one JSON document per session. All access goes
//! through a single connection behind a mutex, and read-modify-write runs
//! inside an IMMEDIATE transaction, which serializes mutations per session
//! across processes as well as threads.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use super::{SessionState, SessionStore};
use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gate_sessions (
    session_id TEXT PRIMARY KEY,
    state      TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    /// Ephemeral store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_row(
        tx: &rusqlite::Transaction<'_>,
        session_id: &str,
    ) -> Result<Option<SessionState>, StoreError> {
        let json: Option<String> = tx
            .query_row(
                "SELECT state FROM gate_sessions WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn store_row(
        tx: &rusqlite::Transaction<'_>,
        state: &SessionState,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        tx.execute(
            "INSERT INTO gate_sessions (session_id, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET state = ?2, updated_at = ?4",
            params![
                state.session_id,
                json,
                state.created_at.to_rfc3339(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

impl SessionStore for SqliteStore {
    fn init(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if Self::load_row(&tx, session_id)?.is_some() {
            return Err(StoreError::DuplicateSession(session_id.to_string()));
        }
        let state = SessionState::new(session_id);
        Self::store_row(&tx, &state)?;
        tx.commit()?;
        Ok(state)
    }

    fn get(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT state FROM gate_sessions WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StoreError::NotFound(session_id.to_string())),
        }
    }

    fn mutate(
        &self,
        session_id: &str,
        f: &mut dyn FnMut(&mut SessionState),
    ) -> Result<SessionState, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut state =
            Self::load_row(&tx, session_id)?.unwrap_or_else(|| SessionState::new(session_id));
        f(&mut state);
        Self::store_row(&tx, &state)?;
        tx.commit()?;
        Ok(state)
    }

    fn teardown(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM gate_sessions WHERE session_id = ?1",
            [session_id],
        )?;
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT session_id FROM gate_sessions ORDER BY session_id")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        ids.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
