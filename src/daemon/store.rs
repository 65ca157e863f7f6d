//! Durable session snapshots and the append-only event log (SQLite).

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::clock::now_ms;
use crate::core::StateDocument;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
  id TEXT PRIMARY KEY,
  state_json TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  session_id TEXT NOT NULL,
  kind TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  ts INTEGER NOT NULL
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of the append-only event log. Never mutated, never deleted;
/// this table is the audit and replay surface.
#[derive(Clone, Debug, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub session_id: String,
    pub kind: String,
    pub payload: Value,
    pub ts: u64,
}

/// Listing row for operational visibility.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub updated_at: u64,
    pub state: StateDocument,
}

/// Snapshot store plus event log, backed by a single SQLite database.
///
/// The connection sits behind a mutex. Callers hold it only for short,
/// synchronous critical sections; nothing awaits while the guard is live.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a session with the default state document, generating an id
    /// when the caller supplies none. Overwrites any prior snapshot under
    /// the same id, matching the create endpoint's reset semantics.
    pub fn create_session(
        &self,
        id: Option<String>,
    ) -> Result<(String, StateDocument), StoreError> {
        let id = id.unwrap_or_else(generate_session_id);
        let state = StateDocument::default();
        self.save_state(&id, &state)?;
        Ok((id, state))
    }

    pub fn get_state(&self, session_id: &str) -> Result<Option<StateDocument>, StoreError> {
        let row: Option<String> = self
            .conn()
            .query_row(
                "SELECT state_json FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match row {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Idempotent upsert. Last write wins per session; the engine guarantees
    /// a single writer per session so there is no lost-update window.
    pub fn save_state(&self, session_id: &str, state: &StateDocument) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        self.conn().execute(
            "INSERT INTO sessions (id, state_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
               state_json = excluded.state_json,
               updated_at = excluded.updated_at",
            params![session_id, json, now_ms() as i64],
        )?;
        Ok(())
    }

    /// Append one event to the log. Append-only and ordered by rowid; a
    /// failure here must abort the enclosing transition.
    pub fn append_event(
        &self,
        session_id: &str,
        kind: &str,
        payload: &Value,
        ts: u64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO events (session_id, kind, payload_json, ts)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, kind, payload.to_string(), ts as i64],
        )?;
        Ok(())
    }

    /// Most recently updated sessions first.
    pub fn list_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, updated_at, state_json FROM sessions
             ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (session_id, updated_at, state_json) = row?;
            sessions.push(SessionSummary {
                session_id,
                updated_at: updated_at as u64,
                state: serde_json::from_str(&state_json)?,
            });
        }
        Ok(sessions)
    }

    /// Full event history for one session, in append order.
    pub fn events_for_session(&self, session_id: &str) -> Result<Vec<EventRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, kind, payload_json, ts FROM events
             WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, kind, payload_json, ts) = row?;
            events.push(EventRecord {
                id,
                session_id,
                kind,
                payload: serde_json::from_str(&payload_json)?,
                ts: ts as u64,
            });
        }
        Ok(events)
    }
}

fn generate_session_id() -> String {
    format!("S{:06x}", rand::random::<u32>() & 0x00ff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_session_generates_prefixed_id() {
        let store = Store::open_in_memory().unwrap();
        let (id, state) = store.create_session(None).unwrap();

        assert!(id.starts_with('S'));
        assert_eq!(id.len(), 7);
        assert_eq!(state, StateDocument::default());
        assert!(store.get_state(&id).unwrap().is_some());
    }

    #[test]
    fn create_session_honors_supplied_id() {
        let store = Store::open_in_memory().unwrap();
        let (id, _) = store.create_session(Some("S-game-night".into())).unwrap();
        assert_eq!(id, "S-game-night");
    }

    #[test]
    fn get_state_for_unknown_session_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_state("nope").unwrap().is_none());
    }

    #[test]
    fn save_state_is_an_upsert() {
        let store = Store::open_in_memory().unwrap();
        let (id, mut state) = store.create_session(None).unwrap();

        state.puzzles.pa.stage = 3;
        store.save_state(&id, &state).unwrap();
        store.save_state(&id, &state).unwrap();

        let loaded = store.get_state(&id).unwrap().unwrap();
        assert_eq!(loaded.puzzles.pa.stage, 3);
        assert_eq!(store.list_sessions(10).unwrap().len(), 1);
    }

    #[test]
    fn events_come_back_in_append_order() {
        let store = Store::open_in_memory().unwrap();
        let (id, _) = store.create_session(None).unwrap();

        store
            .append_event(&id, "ARTIFACT_SELECTED", &json!({"artifact": "watch"}), 1)
            .unwrap();
        store.append_event(&id, "PR_SET_NEXT_YEAR", &json!({}), 2).unwrap();
        store.append_event(&id, "PA_ANSWER_CORRECT", &json!({}), 3).unwrap();

        let events = store.events_for_session(&id).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(
            kinds,
            ["ARTIFACT_SELECTED", "PR_SET_NEXT_YEAR", "PA_ANSWER_CORRECT"]
        );
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn listing_orders_by_recency() {
        let store = Store::open_in_memory().unwrap();
        let (older, _) = store.create_session(Some("S-old".into())).unwrap();
        let (newer, _) = store.create_session(Some("S-new".into())).unwrap();

        // Pin timestamps directly; two upserts can land in the same millisecond.
        store
            .conn()
            .execute("UPDATE sessions SET updated_at = 100 WHERE id = ?1", params![older])
            .unwrap();
        store
            .conn()
            .execute("UPDATE sessions SET updated_at = 200 WHERE id = ?1", params![newer])
            .unwrap();

        let listed = store.list_sessions(10).unwrap();
        assert_eq!(listed[0].session_id, "S-new");
        assert_eq!(listed[1].session_id, "S-old");

        assert_eq!(store.list_sessions(1).unwrap().len(), 1);
    }
}
