//! Daemon module - the timeloom service.
//!
//! Provides:
//! - SQLite-backed session snapshots and the append-only event log
//! - Per-session serialized event submission (the synchronization engine)
//! - Live-update rooms over WebSocket
//! - Fire-and-forget stage-control actuator bridge
//! - The HTTP/WS surface and server bootstrap

pub mod clock;
pub mod engine;
pub mod http;
pub mod obs;
pub mod rooms;
pub mod run;
pub mod store;
pub mod ws;

pub use engine::{Engine, EngineError};
pub use obs::{ObsError, ObsHandle};
pub use rooms::{RoomRegistry, ServerMessage, Subscriber};
pub use run::run;
pub use store::{EventRecord, SessionSummary, Store, StoreError};
