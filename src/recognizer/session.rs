use super::arbiter::{
    accept, should_predict_dynamic, should_predict_static, GateContext, GatePolicy,
    RecognitionEvent, RecognitionSource,
};
use super::classifier::{GestureClassifier, LabelMap, Prediction};
use crate::analyzer::{Mode, ModeStateMachine, ModeTransition, MotionDetector, TransitionReason};
use crate::config::{secs, BridgeConfig};
use crate::error::ClassifierError;
use crate::frame::{AnchorPoint, FeatureVector, PoseFrame};
use crate::ring_buffer::BoundedBuffer;

use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Everything a single tick produced
#[derive(Debug, Default)]
pub struct FrameOutcome {
    pub recognition: Option<RecognitionEvent>,
    pub transitions: Vec<ModeTransition>,
    /// Hand tracking state change worth reporting
    pub tracking: Option<bool>,
    /// A classifier that was disabled during this tick
    pub disabled: Option<(RecognitionSource, String)>,
}

/// Human-readable session state for status lines
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub mode: Mode,
    pub detail: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    pub frames: u64,
    pub hand_lost_frames: u64,
    pub malformed_frames: u64,
    pub static_attempts: u64,
    pub dynamic_attempts: u64,
    pub recognitions: u64,
}

/// One recognizer session: buffers, motion tracking, mode and the classifiers
///
/// Driven from a single frame loop. All time is passed in, so the session
/// never reads the clock for its decisions.
pub struct GestureSession {
    policy: GatePolicy,
    feature_dim: usize,
    sequence_required: usize,
    display_time: Duration,
    hand_loss_report: Duration,
    noop_value: String,

    motion: MotionDetector,
    mode: ModeStateMachine,
    static_buffer: BoundedBuffer<FeatureVector>,
    sequence: BoundedBuffer<FeatureVector>,

    static_classifier: Option<Box<dyn GestureClassifier>>,
    dynamic_classifier: Option<Box<dyn GestureClassifier>>,
    static_labels: LabelMap,
    dynamic_labels: LabelMap,

    last_acceptance: Option<(Instant, RecognitionSource)>,
    /// Set when the dynamic classifier rejects the current movement
    dynamic_attempted: bool,
    last_recognition: Option<(Instant, RecognitionEvent)>,

    hand_present: bool,
    hand_missing_since: Option<Instant>,
    hand_reported_lost: bool,

    diagnostics: bool,
    stats: SessionStats,
}

impl GestureSession {
    pub fn new(
        config: &BridgeConfig,
        static_classifier: Option<Box<dyn GestureClassifier>>,
        dynamic_classifier: Option<Box<dyn GestureClassifier>>,
        now: Instant,
    ) -> Self {
        let sequence_required = match &dynamic_classifier {
            Some(classifier) if classifier.input_frames() != config.buffers.sequence_length => {
                warn!(
                    "Dynamic model takes {} frames, overriding configured sequence length {}",
                    classifier.input_frames(),
                    config.buffers.sequence_length
                );
                classifier.input_frames()
            }
            _ => config.buffers.sequence_length,
        };

        let labels = |source, classifier: &Option<Box<dyn GestureClassifier>>| {
            LabelMap::new(
                source,
                classifier
                    .as_ref()
                    .map(|c| c.labels().to_vec())
                    .unwrap_or_default(),
            )
        };

        Self {
            policy: GatePolicy::from_config(&config.recognition, config.buffers.static_min_samples),
            feature_dim: config.buffers.feature_dim,
            sequence_required,
            display_time: secs(config.recognition.display_time),
            hand_loss_report: secs(config.recognition.hand_loss_report_time),
            noop_value: config.dispatch.noop_value.clone(),
            motion: MotionDetector::new(config.motion.clone()),
            mode: ModeStateMachine::new(config.motion.stability(), now),
            static_buffer: BoundedBuffer::new(config.buffers.static_capacity),
            sequence: BoundedBuffer::new(sequence_required),
            static_labels: labels(RecognitionSource::Static, &static_classifier),
            dynamic_labels: labels(RecognitionSource::Dynamic, &dynamic_classifier),
            static_classifier,
            dynamic_classifier,
            last_acceptance: None,
            dynamic_attempted: false,
            last_recognition: None,
            hand_present: false,
            hand_missing_since: Some(now),
            hand_reported_lost: false,
            diagnostics: false,
            stats: SessionStats::default(),
        }
    }

    /// Run one tick. `None` means no hand was detected in this frame.
    pub fn process_frame(&mut self, frame: Option<&PoseFrame>, now: Instant) -> FrameOutcome {
        self.stats.frames += 1;
        let mut outcome = FrameOutcome::default();

        let pose = match frame {
            Some(pose) => pose,
            None => {
                self.hand_lost(now, &mut outcome);
                return outcome;
            }
        };
        self.hand_seen(now, &mut outcome);

        let vectors = pose
            .static_vector(self.feature_dim)
            .and_then(|s| pose.dynamic_vector(self.feature_dim).map(|d| (s, d)));
        let (static_vector, dynamic_vector) = match vectors {
            Ok(vectors) => vectors,
            Err(e) => {
                self.stats.malformed_frames += 1;
                debug!("Skipping malformed frame: {}", e);
                return outcome;
            }
        };

        let motion = self.motion.observe(pose.anchor(), now);
        if motion.started {
            self.dynamic_attempted = false;
        }
        self.sequence.push(dynamic_vector, now);
        if !motion.is_moving {
            self.static_buffer.push(static_vector, now);
        }

        let pending = self.dynamic_pending();
        if let Some(transition) = self.mode.observe(&motion, pending, now) {
            outcome.transitions.push(transition);
        }

        let ctx = self.gate_context(now);
        if self.diagnostics {
            debug!(
                mode = %ctx.mode,
                moving = ctx.is_moving,
                static_len = ctx.static_len,
                held_ms = ctx.static_held.as_millis() as u64,
                sequence_len = ctx.sequence_len,
                filling_ms = ctx.sequence_filling.as_millis() as u64,
                still_ms = ctx.still_for.map(|d| d.as_millis() as u64),
                dynamic_ms = ctx.dynamic_elapsed.map(|d| d.as_millis() as u64),
                episode = ctx.qualified_episode,
                attempted = ctx.dynamic_attempted,
                static_gate = should_predict_static(&ctx, &self.policy),
                dynamic_gate = should_predict_dynamic(&ctx, &self.policy),
                "Gate state"
            );
        }

        if should_predict_static(&ctx, &self.policy) {
            if let Some(event) = self.run_static(now, &mut outcome) {
                outcome.recognition = Some(event);
                return outcome;
            }
        }

        if should_predict_dynamic(&ctx, &self.policy) {
            outcome.recognition = self.run_dynamic(now, &mut outcome);
        }

        outcome
    }

    fn run_static(&mut self, now: Instant, outcome: &mut FrameOutcome) -> Option<RecognitionEvent> {
        let input = FeatureVector::mean(self.static_buffer.iter())?;
        let result = self
            .static_classifier
            .as_mut()?
            .classify(std::slice::from_ref(&input));
        self.stats.static_attempts += 1;

        let prediction = match result {
            Ok(prediction) => prediction,
            Err(e) => {
                self.classifier_failed(RecognitionSource::Static, e, outcome);
                return None;
            }
        };

        if !accept(&prediction, RecognitionSource::Static, &self.policy) {
            trace!(
                "Static prediction {} below threshold ({:.2})",
                prediction.class_id,
                prediction.confidence
            );
            return None;
        }

        self.static_buffer.clear();
        Some(self.accepted(RecognitionSource::Static, prediction, now))
    }

    fn run_dynamic(&mut self, now: Instant, outcome: &mut FrameOutcome) -> Option<RecognitionEvent> {
        let input = self.sequence.latest_vec(self.sequence_required);
        let result = self.dynamic_classifier.as_mut()?.classify(&input);
        self.stats.dynamic_attempts += 1;

        let prediction = match result {
            Ok(prediction) => prediction,
            Err(e) => {
                self.classifier_failed(RecognitionSource::Dynamic, e, outcome);
                return None;
            }
        };

        if !accept(&prediction, RecognitionSource::Dynamic, &self.policy) {
            trace!(
                "Dynamic prediction {} below threshold ({:.2})",
                prediction.class_id,
                prediction.confidence
            );
            // One attempt per movement; the next needs fresh movement
            self.motion.retire_episode();
            self.dynamic_attempted = true;
            return None;
        }

        self.sequence.clear();
        self.motion.settle(now);
        if let Some(transition) = self.mode.force_static(TransitionReason::DynamicRecognized, now) {
            outcome.transitions.push(transition);
        }
        Some(self.accepted(RecognitionSource::Dynamic, prediction, now))
    }

    fn accepted(
        &mut self,
        source: RecognitionSource,
        prediction: Prediction,
        now: Instant,
    ) -> RecognitionEvent {
        let labels = match source {
            RecognitionSource::Static => &self.static_labels,
            RecognitionSource::Dynamic => &self.dynamic_labels,
        };
        let event = RecognitionEvent {
            source,
            class_id: prediction.class_id,
            gesture_name: labels.name(prediction.class_id),
            confidence: prediction.confidence,
            timestamp: SystemTime::now(),
        };

        info!(
            "Recognized {} gesture '{}' ({:.2})",
            source, event.gesture_name, event.confidence
        );

        self.stats.recognitions += 1;
        self.last_acceptance = Some((now, source));
        self.last_recognition = Some((now, event.clone()));
        event
    }

    fn classifier_failed(
        &mut self,
        source: RecognitionSource,
        error: ClassifierError,
        outcome: &mut FrameOutcome,
    ) {
        match error {
            ClassifierError::Unavailable { .. } => {
                warn!("Disabling {} gate for this session: {}", source, error);
                match source {
                    RecognitionSource::Static => self.static_classifier = None,
                    RecognitionSource::Dynamic => self.dynamic_classifier = None,
                }
                outcome.disabled = Some((source, error.to_string()));
            }
            other => warn!("{} classifier failed, skipping tick: {}", source, other),
        }
    }

    fn hand_lost(&mut self, now: Instant, outcome: &mut FrameOutcome) {
        self.stats.hand_lost_frames += 1;

        if self.hand_present {
            debug!("Hand lost, clearing buffers and motion state");
            self.hand_present = false;
            self.hand_missing_since = Some(now);
            self.static_buffer.clear();
            self.sequence.clear();
            self.motion.reset();
            self.dynamic_attempted = false;
            if let Some(transition) = self.mode.force_static(TransitionReason::HandLost, now) {
                outcome.transitions.push(transition);
            }
        }

        let missing_for = self
            .hand_missing_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        if !self.hand_reported_lost && missing_for >= self.hand_loss_report {
            self.hand_reported_lost = true;
            outcome.tracking = Some(false);
        }
    }

    fn hand_seen(&mut self, now: Instant, outcome: &mut FrameOutcome) {
        if self.hand_present {
            return;
        }
        self.hand_present = true;
        self.hand_missing_since = None;
        self.mode.restart_hold(now);
        if self.hand_reported_lost {
            self.hand_reported_lost = false;
            outcome.tracking = Some(true);
        }
    }

    /// A qualifying movement is waiting for the dynamic classifier
    fn dynamic_pending(&self) -> bool {
        self.dynamic_classifier.is_some() && self.motion.has_qualified_episode()
    }

    /// Snapshot of everything the gates look at
    pub fn gate_context(&self, now: Instant) -> GateContext {
        let since_acceptance = self
            .last_acceptance
            .map(|(at, _)| now.saturating_duration_since(at));

        GateContext {
            mode: self.mode.mode(),
            is_moving: self.motion.is_moving(),
            static_len: self.static_buffer.len(),
            static_held: self.mode.static_held(now),
            sequence_len: self.sequence.len(),
            sequence_required: self.sequence_required,
            sequence_filling: self.sequence.filling_for(now),
            still_for: self.motion.still_for(now),
            dynamic_elapsed: self.mode.dynamic_elapsed(now),
            qualified_episode: self.motion.has_qualified_episode(),
            dynamic_attempted: self.dynamic_attempted,
            since_acceptance,
            last_source: self.last_acceptance.map(|(_, source)| source),
            static_available: self.static_classifier.is_some(),
            dynamic_available: self.dynamic_classifier.is_some(),
        }
    }

    /// Clear buffers, motion, cooldown and the last recognition
    pub fn reset(&mut self, now: Instant) -> Option<ModeTransition> {
        info!("Resetting recognizer session");
        self.static_buffer.clear();
        self.sequence.clear();
        self.motion.reset();
        self.last_acceptance = None;
        self.dynamic_attempted = false;
        self.last_recognition = None;
        self.mode.force_static(TransitionReason::Reset, now)
    }

    pub fn status(&self, now: Instant) -> SessionStatus {
        let mode = self.mode.mode();
        let detail = match mode {
            Mode::Dynamic if self.motion.is_moving() => format!(
                "Movement: {:.1}s",
                self.motion.continuous_movement(now).as_secs_f32()
            ),
            Mode::Dynamic => format!(
                "Processing: {:.1}s",
                self.mode
                    .dynamic_elapsed(now)
                    .unwrap_or_default()
                    .as_secs_f32()
            ),
            Mode::Static => {
                let held = self.mode.static_held(now);
                if self.hand_present && held < self.policy.static_hold {
                    format!("Held: {:.1}s", held.as_secs_f32())
                } else {
                    "Ready for gesture".to_string()
                }
            }
        };
        SessionStatus { mode, detail }
    }

    /// The last recognition, while it is still fresh enough to show
    pub fn display_recognition(&self, now: Instant) -> Option<&RecognitionEvent> {
        self.last_recognition
            .as_ref()
            .filter(|(at, event)| {
                now.saturating_duration_since(*at) < self.display_time
                    && !event.gesture_name.eq_ignore_ascii_case(&self.noop_value)
            })
            .map(|(_, event)| event)
    }

    pub fn buffer_report(&self) -> String {
        format!(
            "static {}/{}, dynamic {}/{}",
            self.static_buffer.len(),
            self.static_buffer.capacity(),
            self.sequence.len(),
            self.sequence.capacity()
        )
    }

    pub fn trail(&self) -> impl Iterator<Item = &AnchorPoint> {
        self.motion.trail()
    }

    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_moving()
    }

    pub fn static_len(&self) -> usize {
        self.static_buffer.len()
    }

    pub fn sequence_len(&self) -> usize {
        self.sequence.len()
    }

    pub fn sequence_required(&self) -> usize {
        self.sequence_required
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub fn has_classifier(&self, source: RecognitionSource) -> bool {
        match source {
            RecognitionSource::Static => self.static_classifier.is_some(),
            RecognitionSource::Dynamic => self.dynamic_classifier.is_some(),
        }
    }

    pub fn set_diagnostics(&mut self, enabled: bool) {
        if enabled != self.diagnostics {
            info!("Gate diagnostics {}", if enabled { "enabled" } else { "disabled" });
        }
        self.diagnostics = enabled;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}
