//! Live-update rooms: per-session subscriber sets and broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::StateDocument;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Messages pushed to live subscribers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "HELLO")]
    Hello {
        session_id: String,
        device: String,
        ts: u64,
    },
    #[serde(rename = "STATE_UPDATED")]
    StateUpdated { state: StateDocument },
}

/// Handle for one connected device.
///
/// The sender feeds the connection's writer task, which drains it to the
/// socket in FIFO order; enqueue order is therefore delivery order.
#[derive(Clone, Debug)]
pub struct Subscriber {
    id: u64,
    device: String,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Subscriber {
    pub fn new(device: impl Into<String>, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id: NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed),
            device: device.into(),
            tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Best-effort enqueue. False means the connection is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// In-memory registry of session rooms.
///
/// Rooms exist only while they have subscribers; durable state lives in the
/// store, so dropping an empty room loses nothing.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, HashMap<u64, Subscriber>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, creating the room on first use. Returns the
    /// subscriber id used for later removal.
    pub fn subscribe(&self, session_id: &str, subscriber: Subscriber) -> u64 {
        let id = subscriber.id();
        debug!(session_id, subscriber = id, device = subscriber.device(), "subscribe");
        self.rooms
            .entry(session_id.to_string())
            .or_default()
            .insert(id, subscriber);
        id
    }

    /// Remove a subscriber; the room is dropped when it empties.
    pub fn unsubscribe(&self, session_id: &str, subscriber_id: u64) {
        if let Some(mut room) = self.rooms.get_mut(session_id) {
            room.remove(&subscriber_id);
            let empty = room.is_empty();
            drop(room);
            if empty {
                self.rooms.remove_if(session_id, |_, room| room.is_empty());
            }
        }
        debug!(session_id, subscriber = subscriber_id, "unsubscribe");
    }

    /// Deliver `message` to every live subscriber in the session's room.
    ///
    /// Delivery is best effort per subscriber: a closed connection is pruned
    /// and never blocks or fails the rest of the fan-out.
    pub fn broadcast(&self, session_id: &str, message: &ServerMessage) {
        let Some(mut room) = self.rooms.get_mut(session_id) else {
            return;
        };
        room.retain(|_, subscriber| subscriber.send(message.clone()));
        let empty = room.is_empty();
        drop(room);
        if empty {
            self.rooms.remove_if(session_id, |_, room| room.is_empty());
        }
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.rooms.get(session_id).map_or(0, |room| room.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
