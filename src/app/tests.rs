use super::frame_loop::FrameLoop;
use super::*;
use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, ClassifierError};
use crate::events::EventBus;
use crate::frame::FEATURE_DIM;
use crate::input::{parse_line, ReplayClock};
use crate::keyboard_input::ControlCommand;
use crate::recognizer::{CentroidClassifier, CentroidModel, GestureClassifier, GestureSession};

use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn static_model() -> CentroidModel {
    CentroidModel {
        labels: vec!["open_palm".to_string(), "fist".to_string()],
        feature_dim: FEATURE_DIM,
        frames: 1,
        mean: None,
        scale: None,
        centroids: vec![vec![1.0; FEATURE_DIM], vec![-1.0; FEATURE_DIM]],
        temperature: 1.0,
    }
}

fn write_model(dir: &Path) -> String {
    let path = dir.join("static.json");
    std::fs::write(&path, serde_json::to_string(&static_model()).unwrap()).unwrap();
    path.to_str().unwrap().to_string()
}

/// A still open palm at 30fps for `seconds`, plus one voice action
fn write_input(dir: &Path, seconds: f64) -> String {
    let path = dir.join("input.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();

    let frames = (seconds * 30.0) as usize;
    for i in 0..frames {
        let record = json!({
            "kind": "frame",
            "t": i as f64 / 30.0,
            "pose": {
                "static_features": vec![1.0; FEATURE_DIM],
                "dynamic_features": vec![0.0; FEATURE_DIM],
                "anchor": {"x": 0.5, "y": 0.5},
            }
        });
        writeln!(file, "{}", record).unwrap();
        if i == 15 {
            writeln!(file, r#"{{"kind":"voice","t":0.5,"action":"temp_up"}}"#).unwrap();
        }
    }
    path.to_str().unwrap().to_string()
}

fn create_test_config(dir: &Path) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.models.static_model = Some(write_model(dir));
    config.models.dynamic_model = None;
    config.input.source = write_input(dir, 3.0);
    config.input.realtime = false;
    config
}

#[tokio::test]
async fn test_orchestrator_requires_a_classifier() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.models.static_model = Some(dir.path().join("missing.json").display().to_string());

    match BridgeOrchestrator::new(config, RunOptions::default()).await {
        Err(BridgeError::Classifier(ClassifierError::Unavailable { .. })) => {}
        Err(e) => panic!("Unexpected error: {}", e),
        Ok(_) => panic!("Orchestrator started without any classifier"),
    }
}

#[tokio::test]
async fn test_component_state_management() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator =
        BridgeOrchestrator::new(create_test_config(dir.path()), RunOptions::default())
            .await
            .unwrap();

    assert!(orchestrator.get_all_component_states().await.is_empty());

    orchestrator.initialize().await.unwrap();
    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 3);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
    assert!(!states.contains_key("keyboard"));

    orchestrator
        .set_component_state("dispatch", ComponentState::Failed)
        .await;
    assert_eq!(
        orchestrator.get_component_state("dispatch").await,
        Some(ComponentState::Failed)
    );
    assert_eq!(orchestrator.get_component_state("camera").await, None);
}

#[tokio::test]
async fn test_replay_runs_to_end_of_input() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator =
        BridgeOrchestrator::new(create_test_config(dir.path()), RunOptions::default())
            .await
            .unwrap();

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let exit_code = tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .expect("run did not finish")
        .unwrap();
    assert_eq!(exit_code, 0);

    let metrics = orchestrator.metrics();
    // The dynamic model was not configured
    assert_eq!(metrics.count("classifier_unavailable"), 1);
    assert!(metrics.count("gesture_recognized") >= 1);
    assert_eq!(metrics.count("voice_command"), 1);
    // One gesture send (repeats fall inside the resend interval) and one voice send
    assert_eq!(metrics.count("dispatch_sent"), 2);
    assert_eq!(metrics.count("shutdown_requested"), 1);

    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
}

#[tokio::test]
async fn test_keyboard_shutdown_stops_run() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    // Long input paced in real time, so it will not run out first
    config.input.source = write_input(dir.path(), 60.0);
    config.input.realtime = true;

    let mut orchestrator = BridgeOrchestrator::new(config, RunOptions::default())
        .await
        .unwrap();
    orchestrator.start().await.unwrap();

    orchestrator.control().send(ControlCommand::Shutdown).unwrap();

    let exit_code = tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .expect("run did not finish")
        .unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn test_start_fails_on_missing_input() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.input.source = dir.path().join("nope.jsonl").display().to_string();

    let mut orchestrator = BridgeOrchestrator::new(config, RunOptions::default())
        .await
        .unwrap();

    assert!(matches!(
        orchestrator.start().await,
        Err(BridgeError::Input(_))
    ));
    assert!(matches!(orchestrator.start().await, Err(BridgeError::System { .. })));

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_trigger_fires_once() {
    let (trigger, receiver) = ShutdownTrigger::new();

    assert!(trigger.clone().fire(ShutdownReason::InputExhausted).await);
    assert!(!trigger.fire(ShutdownReason::UserRequest).await);
    assert_eq!(receiver.await.unwrap(), ShutdownReason::InputExhausted);
}

fn frame_loop(config: &BridgeConfig, origin: Instant) -> (FrameLoop, mpsc::Receiver<crate::dispatch::DispatchRequest>) {
    let classifier: Box<dyn GestureClassifier> =
        Box::new(CentroidClassifier::from_model(static_model()).unwrap());
    let session = GestureSession::new(config, Some(classifier), None, origin);
    let event_bus = EventBus::new(64);
    let (tx, rx) = mpsc::channel(8);
    let dispatcher = Dispatcher::new(&config.dispatch, tx, event_bus.clone());

    (
        FrameLoop::new(
            config,
            session,
            dispatcher,
            event_bus,
            ReplayClock::new(origin, false),
        ),
        rx,
    )
}

fn palm_record(t: f64) -> crate::input::InputRecord {
    let line = json!({
        "kind": "frame",
        "t": t,
        "pose": {
            "static_features": vec![1.0; FEATURE_DIM],
            "dynamic_features": vec![0.0; FEATURE_DIM],
            "anchor": {"x": 0.5, "y": 0.5},
        }
    })
    .to_string();
    parse_line(&line, 1).unwrap().unwrap()
}

#[tokio::test]
async fn test_frame_loop_dispatches_recognitions() {
    let config = BridgeConfig::default();
    let origin = Instant::now();
    let (mut frame_loop, mut queue) = frame_loop(&config, origin);

    for i in 0..40 {
        let t = i as f64 / 30.0;
        frame_loop.handle_record(palm_record(t), origin + Duration::from_secs_f64(t));
    }

    let request = queue.try_recv().unwrap();
    assert_eq!(request.value, "open_palm");
    assert!(!request.resend);
    assert_eq!(frame_loop.dispatcher().stats().sent, 1);
    assert!(frame_loop.session().stats().recognitions >= 1);
}

#[tokio::test]
async fn test_voice_is_ignored_when_disabled() {
    let mut config = BridgeConfig::default();
    config.voice.enabled = false;
    let origin = Instant::now();
    let (mut frame_loop, mut queue) = frame_loop(&config, origin);

    let voice = parse_line(r#"{"kind":"voice","t":0.0,"action":"fan_timer"}"#, 1)
        .unwrap()
        .unwrap();
    frame_loop.handle_record(voice, origin);

    assert!(queue.try_recv().is_err());
    assert_eq!(frame_loop.dispatcher().stats().offered, 0);
}

#[tokio::test]
async fn test_control_commands() {
    let config = BridgeConfig::default();
    let origin = Instant::now();
    let (mut frame_loop, _queue) = frame_loop(&config, origin);

    for i in 0..10 {
        let t = i as f64 / 30.0;
        frame_loop.handle_record(palm_record(t), origin + Duration::from_secs_f64(t));
    }
    assert!(frame_loop.session().static_len() > 0);

    assert!(frame_loop.handle_control(ControlCommand::Reset));
    assert_eq!(frame_loop.session().static_len(), 0);

    assert!(frame_loop.handle_control(ControlCommand::ToggleDiagnostics));
    assert!(!frame_loop.handle_control(ControlCommand::Shutdown));
}
