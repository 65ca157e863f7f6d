//! Core domain types: the session state document and its pure transitions.
//!
//! Everything in here is IO-free and deterministic; the daemon layer owns
//! persistence, rooms, and side effects.

pub mod apply;
pub mod artifact;
pub mod event;
pub mod state;

pub use apply::{ApplyError, DEFAULT_FUTURE_MESSAGE, apply_event};
pub use artifact::{Artifact, Timeline};
pub use event::{ArtifactSelectedPayload, EventKind};
pub use state::{
    FuturePuzzle, InboxEntry, LastEvent, PastPuzzle, PresentPuzzle, Puzzles, StateDocument,
};
