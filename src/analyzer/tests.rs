use super::*;
use crate::config::MotionConfig;
use crate::frame::AnchorPoint;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(10);

fn create_test_config() -> MotionConfig {
    MotionConfig {
        movement_threshold: 0.02,
        movement_duration_threshold: 0.5,
        static_stability_time: 0.3,
        history_size: 15,
        min_history: 5,
        trail_size: 50,
        episode_expiry: 3.0,
    }
}

/// Drives a detector and a mode machine with a synthetic fingertip path
struct Driver {
    motion: MotionDetector,
    mode: ModeStateMachine,
    now: Instant,
    x: f32,
}

impl Driver {
    fn new() -> Self {
        let config = create_test_config();
        let now = Instant::now();
        Self {
            mode: ModeStateMachine::new(config.stability(), now),
            motion: MotionDetector::new(config),
            now,
            x: 0.2,
        }
    }

    fn step(&mut self, dx: f32, pending: bool) -> (MotionUpdate, Option<ModeTransition>) {
        self.now += FRAME;
        self.x += dx;
        let update = self
            .motion
            .observe(Some(AnchorPoint::new(self.x, 0.5)), self.now);
        let transition = self.mode.observe(&update, pending, self.now);
        (update, transition)
    }

    fn run(&mut self, dx: f32, duration: Duration, pending: bool) -> Vec<ModeTransition> {
        let frames = (duration.as_millis() / FRAME.as_millis()) as usize;
        (0..frames)
            .filter_map(|_| self.step(dx, pending).1)
            .collect()
    }
}

#[test]
fn test_sub_threshold_motion_stays_static() {
    let mut driver = Driver::new();

    let transitions = driver.run(0.01, Duration::from_secs(2), false);

    assert!(transitions.is_empty());
    assert_eq!(driver.mode.mode(), Mode::Static);
    assert!(!driver.motion.is_moving());
    assert!(driver.motion.episode().is_none());
}

#[test]
fn test_history_needs_minimum_samples() {
    let mut driver = Driver::new();

    // Four displacement samples are not enough to evaluate, however large
    for _ in 0..5 {
        let (update, _) = driver.step(0.2, false);
        assert!(!update.is_moving);
    }
    let (update, _) = driver.step(0.2, false);
    assert!(update.is_moving);
    assert!(update.started);
}

#[test]
fn test_single_spike_counts_as_movement() {
    let mut driver = Driver::new();
    driver.run(0.0, Duration::from_millis(100), false);

    // One jump above 1.2x threshold trips the short max test
    let (update, _) = driver.step(0.03, false);
    assert!(update.is_moving);
}

#[test]
fn test_sustained_motion_enters_dynamic() {
    let mut driver = Driver::new();

    let transitions = driver.run(0.05, Duration::from_millis(700), false);

    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].to, Mode::Dynamic);
    assert_eq!(transitions[0].reason, TransitionReason::SustainedMovement);
    assert_eq!(driver.mode.mode(), Mode::Dynamic);
    assert!(driver.motion.has_qualified_episode());
    assert!(driver.mode.dynamic_elapsed(driver.now).is_some());
}

#[test]
fn test_short_motion_does_not_qualify() {
    let mut driver = Driver::new();

    driver.run(0.05, Duration::from_millis(200), false);
    driver.run(0.0, Duration::from_millis(200), false);

    assert_eq!(driver.mode.mode(), Mode::Static);
    let episode = driver.motion.episode().copied().unwrap();
    assert!(!episode.qualified);
    assert!(episode.stopped_at.is_some());
}

#[test]
fn test_dynamic_returns_to_static_after_stillness() {
    let mut driver = Driver::new();
    driver.run(0.05, Duration::from_millis(700), false);
    assert_eq!(driver.mode.mode(), Mode::Dynamic);

    // Movement takes a few frames to clear the smoothing window, then
    // 0.3s of stillness is needed
    let transitions = driver.run(0.0, Duration::from_millis(250), false);
    assert!(transitions.is_empty());
    assert_eq!(driver.mode.mode(), Mode::Dynamic);

    let transitions = driver.run(0.0, Duration::from_millis(200), false);
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].reason, TransitionReason::Stillness);
    assert_eq!(driver.mode.mode(), Mode::Static);
}

#[test]
fn test_pending_dynamic_prediction_keeps_dynamic() {
    let mut driver = Driver::new();
    driver.run(0.05, Duration::from_millis(700), true);

    let transitions = driver.run(0.0, Duration::from_secs(1), true);
    assert!(transitions.is_empty());
    assert_eq!(driver.mode.mode(), Mode::Dynamic);

    // Once nothing is pending, stillness already exceeds the stability time
    let (_, transition) = driver.step(0.0, false);
    assert_eq!(transition.map(|t| t.to), Some(Mode::Static));
}

#[test]
fn test_missing_anchor_keeps_movement_window() {
    let mut driver = Driver::new();
    driver.run(0.05, Duration::from_millis(300), false);
    assert!(driver.motion.is_moving());
    let history = driver.motion.history_len();

    for _ in 0..10 {
        driver.now += FRAME;
        let update = driver.motion.observe(None, driver.now);
        assert!(update.is_moving);
    }

    assert_eq!(driver.motion.history_len(), history);
    // Movement keeps accumulating across the dropout and still reaches Dynamic
    let transitions = driver.run(0.05, Duration::from_millis(200), false);
    assert_eq!(transitions.len(), 1);
    assert_eq!(driver.mode.mode(), Mode::Dynamic);
}

#[test]
fn test_episode_expires_after_long_stillness() {
    let mut driver = Driver::new();
    driver.run(0.05, Duration::from_millis(700), true);
    driver.run(0.0, Duration::from_secs(1), true);
    assert!(driver.motion.has_qualified_episode());

    driver.run(0.0, Duration::from_millis(2500), true);
    assert!(!driver.motion.has_qualified_episode());
    assert!(driver.motion.episode().is_none());
}

#[test]
fn test_stop_in_static_restarts_hold_clock() {
    let mut driver = Driver::new();
    driver.run(0.0, Duration::from_secs(2), false);
    assert!(driver.mode.static_held(driver.now) >= Duration::from_secs(2));

    driver.run(0.05, Duration::from_millis(200), false);
    driver.run(0.0, Duration::from_millis(200), false);

    assert_eq!(driver.mode.mode(), Mode::Static);
    assert!(driver.mode.static_held(driver.now) < Duration::from_millis(200));
}

#[test]
fn test_force_static() {
    let mut driver = Driver::new();
    driver.run(0.05, Duration::from_millis(700), false);

    let transition = driver
        .mode
        .force_static(TransitionReason::HandLost, driver.now)
        .unwrap();
    assert_eq!(transition.from, Mode::Dynamic);
    assert_eq!(transition.reason, TransitionReason::HandLost);
    assert_eq!(driver.mode.dynamic_elapsed(driver.now), None);
    assert_eq!(driver.mode.transition_count(), 2);

    // Already static: no transition, hold clock restarted
    driver.now += Duration::from_secs(1);
    assert!(driver
        .mode
        .force_static(TransitionReason::Reset, driver.now)
        .is_none());
    assert_eq!(driver.mode.static_held(driver.now), Duration::ZERO);
}

#[test]
fn test_settle_and_reset() {
    let mut driver = Driver::new();
    driver.run(0.05, Duration::from_millis(700), false);
    assert!(driver.motion.trail().count() > 0);

    driver.motion.settle(driver.now);
    assert!(!driver.motion.is_moving());
    assert_eq!(driver.motion.history_len(), 0);
    assert_eq!(driver.motion.trail().count(), 0);
    assert_eq!(driver.motion.still_for(driver.now), Some(Duration::ZERO));

    driver.run(0.05, Duration::from_millis(100), false);
    driver.motion.reset();
    assert_eq!(driver.motion.still_for(driver.now), None);
    assert!(driver.motion.episode().is_none());
    assert_eq!(driver.motion.continuous_movement(driver.now), Duration::ZERO);
}

#[test]
fn test_trail_is_bounded() {
    let mut driver = Driver::new();
    driver.run(0.001, Duration::from_secs(1), false);
    assert_eq!(driver.motion.trail().count(), 50);
}
