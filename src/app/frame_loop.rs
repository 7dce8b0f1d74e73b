use super::types::{ShutdownReason, ShutdownTrigger};
use crate::analyzer::ModeTransition;
use crate::config::{secs, BridgeConfig};
use crate::dispatch::{Channel, DispatchStats, Dispatcher, VoiceCommandMapper};
use crate::events::{BridgeEvent, EventBus};
use crate::frame::PoseFrame;
use crate::input::{InputReader, InputRecord, ReplayClock};
use crate::keyboard_input::ControlCommand;
use crate::recognizer::{FrameOutcome, GestureSession, SessionStats};

use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What the frame loop did over its lifetime
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopSummary {
    pub records: u64,
    pub skipped_lines: u64,
    pub session: SessionStats,
    pub dispatch: DispatchStats,
}

impl LoopSummary {
    pub fn log(&self) {
        info!("Frame loop summary:");
        info!(
            "  Records: {} ({} malformed lines skipped)",
            self.records, self.skipped_lines
        );
        info!(
            "  Frames: {} ({} without a hand, {} malformed)",
            self.session.frames, self.session.hand_lost_frames, self.session.malformed_frames
        );
        info!(
            "  Predictions: {} static, {} dynamic, {} accepted",
            self.session.static_attempts, self.session.dynamic_attempts, self.session.recognitions
        );
        info!(
            "  Dispatch: {} sent, {} resent, {} suppressed, {} dropped",
            self.dispatch.sent, self.dispatch.resent, self.dispatch.suppressed, self.dispatch.dropped
        );
    }
}

/// The single writer of recognizer and debounce state
pub(super) struct FrameLoop {
    session: GestureSession,
    dispatcher: Dispatcher,
    voice: Option<VoiceCommandMapper>,
    event_bus: EventBus,
    clock: ReplayClock,
    status_interval: Duration,
    last_status: Option<Instant>,
    diagnostics: bool,
    records: u64,
}

impl FrameLoop {
    pub(super) fn new(
        config: &BridgeConfig,
        session: GestureSession,
        dispatcher: Dispatcher,
        event_bus: EventBus,
        clock: ReplayClock,
    ) -> Self {
        let voice = config
            .voice
            .enabled
            .then(|| VoiceCommandMapper::new(&config.voice.aliases));

        Self {
            session,
            dispatcher,
            voice,
            event_bus,
            clock,
            status_interval: secs(config.system.status_interval),
            last_status: None,
            diagnostics: false,
            records: 0,
        }
    }

    /// Drive the session from `reader` until input ends, shutdown is
    /// requested, or `cancel` fires
    pub(super) async fn run(
        mut self,
        mut reader: InputReader,
        mut control: mpsc::UnboundedReceiver<ControlCommand>,
        cancel: CancellationToken,
        shutdown: ShutdownTrigger,
    ) -> LoopSummary {
        info!("Frame loop started");

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break None,
                Some(command) = control.recv() => {
                    if !self.handle_control(command) {
                        break Some(ShutdownReason::UserRequest);
                    }
                }
                record = reader.next_record() => match record {
                    Ok(Some(record)) => {
                        let now = tokio::select! {
                            _ = cancel.cancelled() => break None,
                            now = self.clock.instant_for(record.t()) => now,
                        };
                        self.handle_record(record, now);
                    }
                    Ok(None) => {
                        info!("Input exhausted after {} records", self.records);
                        break Some(ShutdownReason::InputExhausted);
                    }
                    Err(e) => {
                        error!("Input failed: {}", e);
                        self.publish(BridgeEvent::SystemError {
                            component: "input".to_string(),
                            error: e.to_string(),
                        });
                        break Some(ShutdownReason::Error(e.to_string()));
                    }
                },
            }
        };

        if let Some(reason) = reason {
            shutdown.fire(reason).await;
        }

        debug!("Frame loop stopped");
        LoopSummary {
            records: self.records,
            skipped_lines: reader.skipped(),
            session: self.session.stats(),
            dispatch: self.dispatcher.stats(),
        }
    }

    pub(super) fn handle_record(&mut self, record: InputRecord, now: Instant) {
        self.records += 1;
        match record {
            InputRecord::Frame { pose, .. } => self.handle_frame(pose.as_ref(), now),
            InputRecord::Voice { action, .. } => self.handle_voice(&action, now),
        }
        self.log_status(now);
    }

    fn handle_frame(&mut self, pose: Option<&PoseFrame>, now: Instant) {
        let FrameOutcome {
            recognition,
            transitions,
            tracking,
            disabled,
        } = self.session.process_frame(pose, now);

        for transition in transitions {
            self.publish_transition(transition);
        }

        if let Some(tracked) = tracking {
            self.publish(BridgeEvent::HandTrackingChanged {
                tracked,
                timestamp: SystemTime::now(),
            });
        }

        if let Some((source, reason)) = disabled {
            self.publish(BridgeEvent::ClassifierUnavailable { source, reason });
        }

        if let Some(recognition) = recognition {
            self.publish(BridgeEvent::GestureRecognized {
                source: recognition.source,
                class_id: recognition.class_id,
                gesture: recognition.gesture_name.clone(),
                confidence: recognition.confidence,
                timestamp: recognition.timestamp,
            });
            self.dispatcher
                .offer(Channel::Gesture, &recognition.gesture_name, now);
        }
    }

    fn handle_voice(&mut self, action: &str, now: Instant) {
        let Some(mapper) = &self.voice else {
            debug!("Voice disabled, ignoring '{}'", action);
            return;
        };
        let Some(command) = mapper.map(action) else {
            return;
        };

        info!("Voice '{}' -> '{}'", action, command);
        self.publish(BridgeEvent::VoiceCommand {
            action: action.to_string(),
            command: command.clone(),
            timestamp: SystemTime::now(),
        });
        self.dispatcher.offer(Channel::Voice, &command, now);
    }

    /// Returns `false` when the command ends the loop
    pub(super) fn handle_control(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Reset => {
                if let Some(transition) = self.session.reset(self.clock.last()) {
                    self.publish_transition(transition);
                }
                true
            }
            ControlCommand::ToggleDiagnostics => {
                self.diagnostics = !self.diagnostics;
                self.session.set_diagnostics(self.diagnostics);
                true
            }
            ControlCommand::Shutdown => false,
        }
    }

    fn log_status(&mut self, now: Instant) {
        if self.status_interval.is_zero() {
            return;
        }
        let due = self
            .last_status
            .map_or(true, |at| now.saturating_duration_since(at) >= self.status_interval);
        if !due {
            return;
        }
        self.last_status = Some(now);

        let status = self.session.status(now);
        match self.session.display_recognition(now) {
            Some(shown) => info!(
                "[{}] {} | {} | showing {} ({:.0}%)",
                status.mode,
                status.detail,
                self.session.buffer_report(),
                shown.gesture_name,
                shown.confidence * 100.0
            ),
            None => info!(
                "[{}] {} | {}",
                status.mode,
                status.detail,
                self.session.buffer_report()
            ),
        }
    }

    fn publish_transition(&self, transition: ModeTransition) {
        self.publish(BridgeEvent::ModeChanged {
            from: transition.from,
            to: transition.to,
            reason: transition.reason,
            timestamp: SystemTime::now(),
        });
    }

    fn publish(&self, event: BridgeEvent) {
        // No subscribers is not an error for the frame loop
        let _ = self.event_bus.publish(event);
    }

    #[cfg(test)]
    pub(super) fn session(&self) -> &GestureSession {
        &self.session
    }

    #[cfg(test)]
    pub(super) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
