//! Per-tick gating of the static and dynamic classifiers.
//!
//! Every clause of the two gates is its own predicate over a [`GateContext`]
//! snapshot, so each one can be checked in isolation.

use super::classifier::Prediction;
use crate::analyzer::Mode;
use crate::config::{secs, RecognitionConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Which classifier produced a recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecognitionSource {
    Static,
    Dynamic,
}

impl fmt::Display for RecognitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionSource::Static => write!(f, "static"),
            RecognitionSource::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// An accepted prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionEvent {
    pub source: RecognitionSource,
    pub class_id: usize,
    pub gesture_name: String,
    pub confidence: f32,
    pub timestamp: SystemTime,
}

/// Timing and threshold parameters of the gates
#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub static_min_samples: usize,
    pub static_hold: Duration,
    pub cooldown: Duration,
    pub dynamic_cooldown_multiplier: f64,
    pub sequence_time: Duration,
    pub completion_wait: Duration,
    pub stillness: Duration,
    pub static_confidence: f32,
    pub dynamic_confidence: f32,
}

impl GatePolicy {
    pub fn from_config(config: &RecognitionConfig, static_min_samples: usize) -> Self {
        Self {
            static_min_samples,
            static_hold: secs(config.static_hold_time),
            cooldown: secs(config.prediction_cooldown),
            dynamic_cooldown_multiplier: config.dynamic_cooldown_multiplier,
            sequence_time: secs(config.dynamic_sequence_time),
            completion_wait: secs(config.dynamic_completion_wait),
            stillness: secs(config.dynamic_stillness_time),
            static_confidence: config.static_confidence_threshold,
            dynamic_confidence: config.dynamic_confidence_threshold,
        }
    }

    /// Confidence needed to accept a prediction from `source`
    pub fn threshold(&self, source: RecognitionSource) -> f32 {
        match source {
            RecognitionSource::Static => self.static_confidence,
            RecognitionSource::Dynamic => self.dynamic_confidence,
        }
    }
}

/// Snapshot of session state taken once per tick
#[derive(Debug, Clone, Copy)]
pub struct GateContext {
    pub mode: Mode,
    pub is_moving: bool,
    pub static_len: usize,
    /// Time since the static hold clock started
    pub static_held: Duration,
    pub sequence_len: usize,
    pub sequence_required: usize,
    /// Time the sequence buffer has been filling since it was last empty
    pub sequence_filling: Duration,
    /// Time since movement ceased, `None` while moving
    pub still_for: Option<Duration>,
    /// Time spent in Dynamic mode, `None` while Static
    pub dynamic_elapsed: Option<Duration>,
    pub qualified_episode: bool,
    /// The dynamic classifier already rejected the current movement
    pub dynamic_attempted: bool,
    /// Time since the last accepted prediction
    pub since_acceptance: Option<Duration>,
    pub last_source: Option<RecognitionSource>,
    pub static_available: bool,
    pub dynamic_available: bool,
}

pub fn has_static_data(ctx: &GateContext, policy: &GatePolicy) -> bool {
    ctx.static_len >= policy.static_min_samples
}

pub fn held_long_enough(ctx: &GateContext, policy: &GatePolicy) -> bool {
    ctx.static_held >= policy.static_hold
}

pub fn cooldown_elapsed(ctx: &GateContext, policy: &GatePolicy) -> bool {
    ctx.since_acceptance
        .map(|since| since >= policy.cooldown)
        .unwrap_or(true)
}

/// Cooldown for the dynamic gate, stretched after a dynamic acceptance so one
/// long motion does not fire twice
pub fn dynamic_cooldown_elapsed(ctx: &GateContext, policy: &GatePolicy) -> bool {
    let cooldown = if ctx.last_source == Some(RecognitionSource::Dynamic) {
        policy.cooldown.mul_f64(policy.dynamic_cooldown_multiplier)
    } else {
        policy.cooldown
    };
    ctx.since_acceptance
        .map(|since| since >= cooldown)
        .unwrap_or(true)
}

pub fn motion_qualifies(ctx: &GateContext) -> bool {
    ctx.mode == Mode::Dynamic || ctx.qualified_episode
}

/// Each movement gets one dynamic attempt
pub fn movement_unattempted(ctx: &GateContext) -> bool {
    !ctx.dynamic_attempted
}

pub fn sequence_full(ctx: &GateContext) -> bool {
    ctx.sequence_len >= ctx.sequence_required
}

pub fn movement_pattern_complete(ctx: &GateContext, policy: &GatePolicy) -> bool {
    let settled = !ctx.is_moving
        && ctx
            .still_for
            .map(|still| still >= policy.stillness)
            .unwrap_or(false);
    let waited = ctx
        .dynamic_elapsed
        .map(|elapsed| elapsed >= policy.completion_wait)
        .unwrap_or(false);
    settled || waited
}

pub fn sequence_time_elapsed(ctx: &GateContext, policy: &GatePolicy) -> bool {
    ctx.sequence_filling >= policy.sequence_time
}

pub fn should_predict_static(ctx: &GateContext, policy: &GatePolicy) -> bool {
    ctx.static_available
        && ctx.mode == Mode::Static
        && has_static_data(ctx, policy)
        && !ctx.is_moving
        && held_long_enough(ctx, policy)
        && cooldown_elapsed(ctx, policy)
}

pub fn should_predict_dynamic(ctx: &GateContext, policy: &GatePolicy) -> bool {
    ctx.dynamic_available
        && motion_qualifies(ctx)
        && movement_unattempted(ctx)
        && sequence_full(ctx)
        && movement_pattern_complete(ctx, policy)
        && sequence_time_elapsed(ctx, policy)
        && dynamic_cooldown_elapsed(ctx, policy)
}

/// Whether a prediction clears the confidence threshold for its source
pub fn accept(prediction: &Prediction, source: RecognitionSource, policy: &GatePolicy) -> bool {
    prediction.confidence >= policy.threshold(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> GatePolicy {
        GatePolicy::from_config(&RecognitionConfig::default(), 5)
    }

    fn ready_static() -> GateContext {
        GateContext {
            mode: Mode::Static,
            is_moving: false,
            static_len: 6,
            static_held: Duration::from_millis(1200),
            sequence_len: 60,
            sequence_required: 60,
            sequence_filling: Duration::from_secs(2),
            still_for: None,
            dynamic_elapsed: None,
            qualified_episode: false,
            dynamic_attempted: false,
            since_acceptance: None,
            last_source: None,
            static_available: true,
            dynamic_available: true,
        }
    }

    fn ready_dynamic() -> GateContext {
        GateContext {
            mode: Mode::Dynamic,
            still_for: Some(Duration::from_millis(1100)),
            dynamic_elapsed: Some(Duration::from_millis(1300)),
            qualified_episode: true,
            ..ready_static()
        }
    }

    #[test]
    fn test_static_gate_passes_when_all_clauses_hold() {
        assert!(should_predict_static(&ready_static(), &policy()));
    }

    #[test]
    fn test_static_gate_clauses() {
        let policy = policy();

        let ctx = GateContext { static_len: 4, ..ready_static() };
        assert!(!has_static_data(&ctx, &policy));
        assert!(!should_predict_static(&ctx, &policy));

        let ctx = GateContext { is_moving: true, ..ready_static() };
        assert!(!should_predict_static(&ctx, &policy));

        let ctx = GateContext { static_held: Duration::from_millis(900), ..ready_static() };
        assert!(!held_long_enough(&ctx, &policy));
        assert!(!should_predict_static(&ctx, &policy));

        let ctx = GateContext { since_acceptance: Some(Duration::from_millis(500)), ..ready_static() };
        assert!(!cooldown_elapsed(&ctx, &policy));
        assert!(!should_predict_static(&ctx, &policy));

        let ctx = GateContext { mode: Mode::Dynamic, ..ready_static() };
        assert!(!should_predict_static(&ctx, &policy));

        let ctx = GateContext { static_available: false, ..ready_static() };
        assert!(!should_predict_static(&ctx, &policy));
    }

    #[test]
    fn test_dynamic_gate_passes_when_all_clauses_hold() {
        assert!(should_predict_dynamic(&ready_dynamic(), &policy()));
    }

    #[test]
    fn test_dynamic_gate_accepts_recent_episode_outside_dynamic_mode() {
        let ctx = GateContext {
            mode: Mode::Static,
            dynamic_elapsed: None,
            ..ready_dynamic()
        };
        assert!(motion_qualifies(&ctx));
        assert!(should_predict_dynamic(&ctx, &policy()));

        let ctx = GateContext { qualified_episode: false, ..ctx };
        assert!(!motion_qualifies(&ctx));
        assert!(!should_predict_dynamic(&ctx, &policy()));
    }

    #[test]
    fn test_dynamic_gate_needs_full_sequence() {
        let ctx = GateContext { sequence_len: 59, ..ready_dynamic() };
        assert!(!sequence_full(&ctx));
        assert!(!should_predict_dynamic(&ctx, &policy()));
    }

    #[test]
    fn test_movement_pattern_complete() {
        let policy = policy();

        // Neither enough stillness nor enough time in Dynamic
        let ctx = GateContext {
            still_for: Some(Duration::from_millis(800)),
            dynamic_elapsed: Some(Duration::from_millis(1400)),
            ..ready_dynamic()
        };
        assert!(!movement_pattern_complete(&ctx, &policy));

        // Completion wait alone is enough, even while moving
        let ctx = GateContext {
            is_moving: true,
            still_for: None,
            dynamic_elapsed: Some(Duration::from_millis(1500)),
            ..ready_dynamic()
        };
        assert!(movement_pattern_complete(&ctx, &policy));

        // Stillness alone is enough
        let ctx = GateContext {
            still_for: Some(Duration::from_secs(1)),
            dynamic_elapsed: None,
            ..ready_dynamic()
        };
        assert!(movement_pattern_complete(&ctx, &policy));
    }

    #[test]
    fn test_dynamic_gate_skips_attempted_movement() {
        let ctx = GateContext {
            is_moving: true,
            still_for: None,
            dynamic_elapsed: Some(Duration::from_secs(2)),
            dynamic_attempted: true,
            ..ready_dynamic()
        };
        assert!(!movement_unattempted(&ctx));
        assert!(!should_predict_dynamic(&ctx, &policy()));

        let ctx = GateContext { dynamic_attempted: false, ..ctx };
        assert!(should_predict_dynamic(&ctx, &policy()));
    }

    #[test]
    fn test_sequence_time() {
        let ctx = GateContext { sequence_filling: Duration::from_millis(990), ..ready_dynamic() };
        assert!(!sequence_time_elapsed(&ctx, &policy()));
        assert!(!should_predict_dynamic(&ctx, &policy()));
    }

    #[test]
    fn test_dynamic_cooldown_is_tripled_after_dynamic() {
        let policy = policy();

        let after_static = GateContext {
            since_acceptance: Some(Duration::from_secs(2)),
            last_source: Some(RecognitionSource::Static),
            ..ready_dynamic()
        };
        assert!(dynamic_cooldown_elapsed(&after_static, &policy));

        let after_dynamic = GateContext {
            last_source: Some(RecognitionSource::Dynamic),
            ..after_static
        };
        assert!(!dynamic_cooldown_elapsed(&after_dynamic, &policy));
        assert!(!should_predict_dynamic(&after_dynamic, &policy));

        let later = GateContext {
            since_acceptance: Some(Duration::from_secs(3)),
            ..after_dynamic
        };
        assert!(dynamic_cooldown_elapsed(&later, &policy));
    }

    #[test]
    fn test_acceptance_thresholds() {
        let policy = policy();
        let prediction = Prediction {
            class_id: 0,
            confidence: 0.65,
        };

        assert!(!accept(&prediction, RecognitionSource::Static, &policy));
        assert!(accept(&prediction, RecognitionSource::Dynamic, &policy));
        assert!(accept(
            &Prediction {
                class_id: 0,
                confidence: 0.7
            },
            RecognitionSource::Static,
            &policy
        ));
    }
}
