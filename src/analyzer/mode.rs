use super::motion::MotionUpdate;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Which classifier the recognizer is currently geared towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Static,
    Dynamic,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Static => write!(f, "static"),
            Mode::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Why the mode changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    /// Continuous movement reached the duration threshold
    SustainedMovement,
    /// The hand stayed still long enough with nothing left to recognize
    Stillness,
    /// A dynamic gesture was accepted
    DynamicRecognized,
    /// No hand in the frame
    HandLost,
    /// Operator reset
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    pub reason: TransitionReason,
    pub at: Instant,
}

/// Static / Dynamic mode plus the clocks the gates read
pub struct ModeStateMachine {
    mode: Mode,
    stability: Duration,
    /// Start of the current static hold
    static_since: Instant,
    /// When Dynamic mode was entered, while in it
    dynamic_since: Option<Instant>,
    transitions: u64,
}

impl ModeStateMachine {
    pub fn new(stability: Duration, now: Instant) -> Self {
        Self {
            mode: Mode::Static,
            stability,
            static_since: now,
            dynamic_since: None,
            transitions: 0,
        }
    }

    /// Apply this frame's motion signal
    ///
    /// `dynamic_pending` keeps the machine in Dynamic while a qualifying
    /// movement is still waiting for its completion window.
    pub fn observe(
        &mut self,
        motion: &MotionUpdate,
        dynamic_pending: bool,
        now: Instant,
    ) -> Option<ModeTransition> {
        match self.mode {
            Mode::Static => {
                if motion.sustained {
                    return self.transition(Mode::Dynamic, TransitionReason::SustainedMovement, now);
                }
                if motion.stopped {
                    debug!("Movement ceased in static mode, restarting hold clock");
                    self.static_since = now;
                }
                None
            }
            Mode::Dynamic => {
                let settled = !motion.is_moving
                    && motion
                        .still_for
                        .map(|still| still >= self.stability)
                        .unwrap_or(false);
                if settled && !dynamic_pending {
                    return self.transition(Mode::Static, TransitionReason::Stillness, now);
                }
                None
            }
        }
    }

    /// Return to Static regardless of timers
    ///
    /// Restarts the static hold clock even when already Static.
    pub fn force_static(&mut self, reason: TransitionReason, now: Instant) -> Option<ModeTransition> {
        if self.mode == Mode::Static {
            self.restart_hold(now);
            return None;
        }
        self.transition(Mode::Static, reason, now)
    }

    /// Start the static hold clock over
    pub fn restart_hold(&mut self, now: Instant) {
        self.static_since = now;
    }

    fn transition(&mut self, to: Mode, reason: TransitionReason, now: Instant) -> Option<ModeTransition> {
        let from = self.mode;
        if from == to {
            return None;
        }

        self.mode = to;
        self.transitions += 1;
        match to {
            Mode::Static => {
                self.static_since = now;
                self.dynamic_since = None;
            }
            Mode::Dynamic => {
                self.dynamic_since = Some(now);
            }
        }

        info!("Mode {} -> {} ({:?})", from, to, reason);
        Some(ModeTransition {
            from,
            to,
            reason,
            at: now,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Time since the static hold clock last started
    pub fn static_held(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.static_since)
    }

    /// Time spent in Dynamic mode, `None` while Static
    pub fn dynamic_elapsed(&self, now: Instant) -> Option<Duration> {
        self.dynamic_since
            .map(|since| now.saturating_duration_since(since))
    }

    pub fn dynamic_since(&self) -> Option<Instant> {
        self.dynamic_since
    }

    pub fn transition_count(&self) -> u64 {
        self.transitions
    }
}
