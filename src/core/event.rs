//! Gameplay event kinds and payload shapes.

use serde::Deserialize;

use super::artifact::Artifact;

/// The fixed set of gameplay event kinds the state machine understands.
///
/// Wire kinds outside this set are handled leniently upstream (logged and
/// broadcast, no state effect), so parsing returns `None` instead of failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    ArtifactSelected,
    PrSetNextYear,
    PaAnswerCorrect,
    FutureSentMessageToPast,
    ObsSwitchScene2,
}

impl EventKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "ARTIFACT_SELECTED" => Some(Self::ArtifactSelected),
            "PR_SET_NEXT_YEAR" => Some(Self::PrSetNextYear),
            "PA_ANSWER_CORRECT" => Some(Self::PaAnswerCorrect),
            "FUTURE_SENT_MESSAGE_TO_PAST" => Some(Self::FutureSentMessageToPast),
            "OBS_SWITCH_SCENE2" => Some(Self::ObsSwitchScene2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArtifactSelected => "ARTIFACT_SELECTED",
            Self::PrSetNextYear => "PR_SET_NEXT_YEAR",
            Self::PaAnswerCorrect => "PA_ANSWER_CORRECT",
            Self::FutureSentMessageToPast => "FUTURE_SENT_MESSAGE_TO_PAST",
            Self::ObsSwitchScene2 => "OBS_SWITCH_SCENE2",
        }
    }

    /// Whether accepting this event must also dispatch a stage-control scene
    /// effect. The dispatch itself happens in the engine, outside the state
    /// machine.
    pub fn triggers_actuator(self) -> bool {
        matches!(self, Self::ObsSwitchScene2)
    }
}

/// Payload of `ARTIFACT_SELECTED`.
#[derive(Debug, Deserialize)]
pub struct ArtifactSelectedPayload {
    pub artifact: Artifact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_known_kinds() {
        for kind in [
            EventKind::ArtifactSelected,
            EventKind::PrSetNextYear,
            EventKind::PaAnswerCorrect,
            EventKind::FutureSentMessageToPast,
            EventKind::ObsSwitchScene2,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_kind_parses_to_none() {
        assert_eq!(EventKind::parse("NOT_A_KIND"), None);
        assert_eq!(EventKind::parse(""), None);
    }

    #[test]
    fn only_the_scene_switch_triggers_the_actuator() {
        assert!(EventKind::ObsSwitchScene2.triggers_actuator());
        assert!(!EventKind::PrSetNextYear.triggers_actuator());
        assert!(!EventKind::ArtifactSelected.triggers_actuator());
    }
}
