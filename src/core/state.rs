//! The per-session state document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::artifact::{Artifact, Timeline};

/// Sub-state for the "present" device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentPuzzle {
    pub stage: u32,
    /// Marker left behind by the most recent scene-switch event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_obs_scene: Option<String>,
}

/// Sub-state for the "past" device: stage counter plus the inbox that the
/// future device writes into.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PastPuzzle {
    pub stage: u32,
    pub inbox: Vec<InboxEntry>,
}

/// Sub-state for the "future" device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FuturePuzzle {
    pub stage: u32,
}

/// One message delivered from the future device to the past device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: String,
    pub message: String,
}

/// Role-specific puzzle sub-states, keyed by device role.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Puzzles {
    pub pr: PresentPuzzle,
    pub pa: PastPuzzle,
    pub f: FuturePuzzle,
}

/// The most recently applied event. Observability only, never authoritative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastEvent {
    pub kind: String,
    pub payload: Value,
    pub ts: u64,
}

/// The authoritative progress snapshot for one session.
///
/// INVARIANT: once a path exists, `timeline_open == path[sequence_index]`
/// after every transition, and `sequence_index` stays within the path and
/// never decreases except through artifact re-selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub artifact: Option<Artifact>,
    pub path: Vec<Timeline>,
    pub sequence_index: usize,
    pub timeline_open: Timeline,
    pub puzzles: Puzzles,
    pub last_event: Option<LastEvent>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            artifact: None,
            path: Vec::new(),
            sequence_index: 0,
            timeline_open: Timeline::Present,
            puzzles: Puzzles::default(),
            last_event: None,
        }
    }
}
