//! Synchronization engine tests: the submit pipeline end to end against a
//! real store.

use std::sync::Arc;

use serde_json::json;
use timeloom::config::ObsConfig;
use timeloom::core::Timeline;
use timeloom::daemon::{Engine, EngineError, Store, obs};

fn test_engine() -> Engine {
    let store = Store::open_in_memory().unwrap();
    let bridge = obs::spawn(ObsConfig {
        // Nothing listens on the discard port; actuator calls fail fast.
        port: 9,
        connect_timeout_ms: 100,
        request_timeout_ms: 100,
        backoff_base_ms: 10,
        backoff_max_ms: 20,
        ..ObsConfig::default()
    });
    Engine::new(store, bridge)
}

#[tokio::test]
async fn submit_to_unknown_session_is_rejected() {
    let engine = test_engine();
    let err = engine
        .submit_event("S-missing", Some("PR_SET_NEXT_YEAR"), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound { .. }));
}

#[tokio::test]
async fn missing_kind_writes_nothing() {
    let engine = test_engine();
    let (id, _) = engine.create_session(None).unwrap();

    let err = engine.submit_event(&id, None, json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingEventKind));

    assert!(engine.events_for_session(&id).unwrap().is_empty());
    let state = engine.get_state(&id).unwrap().unwrap();
    assert!(state.last_event.is_none());
}

#[tokio::test]
async fn accepted_event_logs_once_and_snapshots_once() {
    let engine = test_engine();
    let (id, _) = engine.create_session(None).unwrap();

    let returned = engine
        .submit_event(&id, Some("ARTIFACT_SELECTED"), json!({"artifact": "watch"}))
        .await
        .unwrap();

    let events = engine.events_for_session(&id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "ARTIFACT_SELECTED");
    assert_eq!(events[0].payload, json!({"artifact": "watch"}));

    let stored = engine.get_state(&id).unwrap().unwrap();
    assert_eq!(stored, returned);
    assert_eq!(stored.sequence_index, 0);
    assert_eq!(stored.timeline_open, Timeline::Present);
}

#[tokio::test]
async fn rejected_event_keeps_snapshot_but_log_row_stays_for_audit() {
    let engine = test_engine();
    let (id, initial) = engine.create_session(None).unwrap();

    let err = engine
        .submit_event(&id, Some("ARTIFACT_SELECTED"), json!({"artifact": "sword"}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidEvent(_)));

    // The log is written before the transition runs, so the divergence is
    // visible to audit tooling while the snapshot stays put.
    assert_eq!(engine.events_for_session(&id).unwrap().len(), 1);
    assert_eq!(engine.get_state(&id).unwrap().unwrap(), initial);
}

#[tokio::test]
async fn watch_walkthrough() {
    let engine = test_engine();
    let (id, _) = engine.create_session(None).unwrap();

    let state = engine
        .submit_event(&id, Some("ARTIFACT_SELECTED"), json!({"artifact": "watch"}))
        .await
        .unwrap();
    assert_eq!(state.timeline_open, Timeline::Present);
    assert_eq!(state.sequence_index, 0);

    let state = engine
        .submit_event(&id, Some("PR_SET_NEXT_YEAR"), json!({}))
        .await
        .unwrap();
    assert_eq!(state.sequence_index, 1);
    assert_eq!(state.timeline_open, Timeline::Past);

    let state = engine
        .submit_event(&id, Some("PA_ANSWER_CORRECT"), json!({}))
        .await
        .unwrap();
    assert_eq!(state.puzzles.pa.stage, 1);
    assert_eq!(state.sequence_index, 2);
    assert_eq!(state.timeline_open, Timeline::Present);

    assert_eq!(engine.events_for_session(&id).unwrap().len(), 3);
}

#[tokio::test]
async fn future_message_reaches_the_past_inbox() {
    let engine = test_engine();
    let (id, _) = engine.create_session(None).unwrap();
    engine
        .submit_event(&id, Some("ARTIFACT_SELECTED"), json!({"artifact": "letter"}))
        .await
        .unwrap();

    let before = engine.get_state(&id).unwrap().unwrap().sequence_index;
    let state = engine
        .submit_event(
            &id,
            Some("FUTURE_SENT_MESSAGE_TO_PAST"),
            json!({"message": "hi"}),
        )
        .await
        .unwrap();

    assert_eq!(state.puzzles.pa.inbox.len(), 1);
    assert_eq!(state.puzzles.pa.inbox[0].message, "hi");
    assert_eq!(state.sequence_index, before);
}

#[tokio::test]
async fn unknown_kind_is_accepted_and_logged() {
    let engine = test_engine();
    let (id, _) = engine.create_session(None).unwrap();

    let state = engine
        .submit_event(&id, Some("LIGHTING_CUE_7"), json!({"cue": 7}))
        .await
        .unwrap();

    let last = state.last_event.clone().unwrap();
    assert_eq!(last.kind, "LIGHTING_CUE_7");
    assert_eq!(engine.events_for_session(&id).unwrap().len(), 1);
    assert!(state.artifact.is_none());
}

#[tokio::test]
async fn scene_switch_event_succeeds_with_actuator_down() {
    let engine = test_engine();
    let (id, _) = engine.create_session(None).unwrap();

    // The actuator is unreachable in tests; submission must not care.
    let state = engine
        .submit_event(&id, Some("OBS_SWITCH_SCENE2"), json!({}))
        .await
        .unwrap();
    assert_eq!(state.puzzles.pr.last_obs_scene.as_deref(), Some("Scene2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_drop_an_event() {
    let engine = Arc::new(test_engine());
    let (id, _) = engine.create_session(None).unwrap();
    engine
        .submit_event(&id, Some("ARTIFACT_SELECTED"), json!({"artifact": "watch"}))
        .await
        .unwrap();

    let a = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(
            async move { engine.submit_event(&id, Some("PA_ANSWER_CORRECT"), json!({})).await },
        )
    };
    let b = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(
            async move { engine.submit_event(&id, Some("PA_ANSWER_CORRECT"), json!({})).await },
        )
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let state = engine.get_state(&id).unwrap().unwrap();
    assert_eq!(state.puzzles.pa.stage, 2);
    assert_eq!(state.sequence_index, 2);
    // One log row per accepted event: select + two answers.
    assert_eq!(engine.events_for_session(&id).unwrap().len(), 3);
}

#[tokio::test]
async fn store_survives_reopen_on_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("game.db");

    let id = {
        let store = Store::open(&path).unwrap();
        let bridge = obs::spawn(ObsConfig::default());
        let engine = Engine::new(store, bridge);
        let (id, _) = engine.create_session(None).unwrap();
        engine
            .submit_event(&id, Some("ARTIFACT_SELECTED"), json!({"artifact": "compass"}))
            .await
            .unwrap();
        id
    };

    let store = Store::open(&path).unwrap();
    let state = store.get_state(&id).unwrap().unwrap();
    assert_eq!(state.path.len(), 7);
    assert_eq!(store.events_for_session(&id).unwrap().len(), 1);
}
