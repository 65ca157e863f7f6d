//! Artifact and timeline-location enumerations.

use serde::{Deserialize, Serialize};

/// Timeline location token: which era's device currently holds the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeline {
    #[serde(rename = "PR")]
    Present,
    #[serde(rename = "PA")]
    Past,
    #[serde(rename = "F")]
    Future,
}

/// The artifact chosen at the start of a playthrough.
///
/// Selecting an artifact fixes the seven-step timeline path for the rest of
/// the playthrough; re-selecting one mid-game restarts progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Watch,
    Compass,
    Letter,
}

impl Artifact {
    /// Fixed artifact-to-path table. Every path has seven steps.
    pub fn path(self) -> Vec<Timeline> {
        use Timeline::{Future, Past, Present};
        match self {
            Artifact::Watch => vec![Present, Past, Present, Future, Present, Past, Future],
            Artifact::Compass => vec![Present, Future, Present, Past, Present, Future, Past],
            Artifact::Letter => vec![Present, Past, Future, Present, Future, Past, Present],
        }
    }
}
