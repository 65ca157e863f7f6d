//! Deterministic event application onto a state document.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::event::{ArtifactSelectedPayload, EventKind};
use super::state::{InboxEntry, LastEvent, StateDocument};

/// Inbox text used when the future device sends an empty message.
pub const DEFAULT_FUTURE_MESSAGE: &str = "Message from the future…";

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("invalid artifact payload: {reason}")]
    InvalidArtifact { reason: String },
}

/// Apply one event to `state` in place.
///
/// Validation happens before any field is touched, so on `Err` the document
/// is exactly as the caller passed it. Every accepted event, including
/// unknown kinds, records itself as `last_event`.
pub fn apply_event(
    state: &mut StateDocument,
    kind: &str,
    payload: &Value,
    now_ms: u64,
) -> Result<(), ApplyError> {
    match EventKind::parse(kind) {
        Some(EventKind::ArtifactSelected) => {
            let selected: ArtifactSelectedPayload = serde_json::from_value(payload.clone())
                .map_err(|err| ApplyError::InvalidArtifact {
                    reason: err.to_string(),
                })?;
            let artifact = selected.artifact;
            state.artifact = Some(artifact);
            state.path = artifact.path();
            state.sequence_index = 0;
            state.timeline_open = state.path.first().copied().unwrap_or(state.timeline_open);
        }
        Some(EventKind::PrSetNextYear) => {
            advance(state);
        }
        Some(EventKind::PaAnswerCorrect) => {
            state.puzzles.pa.stage += 1;
            advance(state);
        }
        Some(EventKind::FutureSentMessageToPast) => {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_FUTURE_MESSAGE);
            state.puzzles.pa.inbox.push(InboxEntry {
                id: format!("msg_{}", Uuid::new_v4().simple()),
                message: message.to_string(),
            });
        }
        Some(EventKind::ObsSwitchScene2) => {
            state.puzzles.pr.last_obs_scene = Some("Scene2".to_string());
        }
        // Unrecognized kinds pass through untouched. Deliberate leniency:
        // devices in the field send vendor-specific noise events.
        None => {}
    }

    state.last_event = Some(LastEvent {
        kind: kind.to_string(),
        payload: payload.clone(),
        ts: now_ms,
    });
    Ok(())
}

/// Step one position along the path, clamped to the final step.
///
/// With no artifact selected the path is empty and advancing is a no-op.
fn advance(state: &mut StateDocument) {
    if state.path.is_empty() {
        return;
    }
    state.sequence_index = (state.sequence_index + 1).min(state.path.len() - 1);
    state.timeline_open = state.path[state.sequence_index];
}
