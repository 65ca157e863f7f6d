//! The synchronization engine.
//!
//! One serialized submit pipeline per session: validate, append to the
//! event log, apply the state machine to a private copy, persist the new
//! snapshot, broadcast it, then dispatch any actuator side effect. This is
//! the serialization point; nothing else mutates session state.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::clock::now_ms;
use super::obs::ObsHandle;
use super::rooms::{RoomRegistry, ServerMessage, Subscriber};
use super::store::{SessionSummary, Store, StoreError};
use crate::core::{ApplyError, EventKind, StateDocument, apply_event};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("missing event kind")]
    MissingEventKind,

    #[error(transparent)]
    InvalidEvent(#[from] ApplyError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub struct Engine {
    store: Store,
    rooms: RoomRegistry,
    obs: ObsHandle,
    /// Per-session critical sections. Entries are never removed; sessions
    /// are retained for audit, so the map is bounded by session count.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(store: Store, obs: ObsHandle) -> Self {
        Self {
            store,
            rooms: RoomRegistry::new(),
            obs,
            locks: DashMap::new(),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        // Clone out of the entry so the shard guard drops before any await.
        let entry = self.locks.entry(session_id.to_string()).or_default();
        Arc::clone(entry.value())
    }

    pub fn create_session(
        &self,
        id: Option<String>,
    ) -> Result<(String, StateDocument), EngineError> {
        let (session_id, state) = self.store.create_session(id)?;
        debug!(%session_id, "session created");
        Ok((session_id, state))
    }

    pub fn get_state(&self, session_id: &str) -> Result<Option<StateDocument>, EngineError> {
        Ok(self.store.get_state(session_id)?)
    }

    pub fn list_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>, EngineError> {
        Ok(self.store.list_sessions(limit)?)
    }

    /// Submit one gameplay event and return the resulting snapshot.
    ///
    /// Load-apply-save-broadcast is atomic per session; submissions for
    /// unrelated sessions never contend.
    #[instrument(skip(self, payload))]
    pub async fn submit_event(
        &self,
        session_id: &str,
        kind: Option<&str>,
        payload: Value,
    ) -> Result<StateDocument, EngineError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(mut state) = self.store.get_state(session_id)? else {
            return Err(EngineError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        };
        let kind = kind.ok_or(EngineError::MissingEventKind)?;

        // Log first: the snapshot must never advance past an event that
        // failed to reach the audit trail.
        let ts = now_ms();
        self.store.append_event(session_id, kind, &payload, ts)?;

        // `state` is our private copy; the durable snapshot is untouched
        // until save_state commits the new one.
        apply_event(&mut state, kind, &payload, ts)?;
        self.store.save_state(session_id, &state)?;

        self.rooms.broadcast(
            session_id,
            &ServerMessage::StateUpdated {
                state: state.clone(),
            },
        );

        if EventKind::parse(kind).is_some_and(EventKind::triggers_actuator) {
            self.obs.fire_default_scene();
        }

        debug!(session_id, kind, "event applied");
        Ok(state)
    }

    /// Register a live subscriber, delivering the current snapshot into its
    /// channel first.
    ///
    /// Runs under the session's submit lock, so a late joiner sees snapshot
    /// N followed by updates N+1, N+2, ... with no gap and no duplicate.
    pub async fn attach(&self, session_id: &str, subscriber: Subscriber) -> Result<u64, EngineError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        if let Some(state) = self.store.get_state(session_id)? {
            subscriber.send(ServerMessage::StateUpdated { state });
        }
        Ok(self.rooms.subscribe(session_id, subscriber))
    }

    pub fn detach(&self, session_id: &str, subscriber_id: u64) {
        self.rooms.unsubscribe(session_id, subscriber_id);
    }

    /// Audit surface: the full ordered event history for a session.
    pub fn events_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<super::store::EventRecord>, EngineError> {
        Ok(self.store.events_for_session(session_id)?)
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }
}
