#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    ApplyError, Artifact, EventKind, InboxEntry, LastEvent, Puzzles, StateDocument, Timeline,
    apply_event,
};
