use crate::analyzer::{Mode, TransitionReason};
use crate::dispatch::Channel;
use crate::error::EventBusError;
use crate::recognizer::RecognitionSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Events that flow between the bridge components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgeEvent {
    /// A classifier prediction passed its gate and confidence threshold
    GestureRecognized {
        source: RecognitionSource,
        class_id: usize,
        gesture: String,
        confidence: f32,
        timestamp: SystemTime,
    },
    /// The recognizer switched between static and dynamic mode
    ModeChanged {
        from: Mode,
        to: Mode,
        reason: TransitionReason,
        timestamp: SystemTime,
    },
    /// The pose provider started or stopped reporting a hand
    HandTrackingChanged {
        tracked: bool,
        timestamp: SystemTime,
    },
    /// A voice action arrived and was mapped to a channel command
    VoiceCommand {
        action: String,
        command: String,
        timestamp: SystemTime,
    },
    /// An actuator accepted a dispatched command
    DispatchSent {
        request_id: String,
        channel: Channel,
        value: String,
        resend: bool,
        latency_ms: u64,
    },
    /// Sending a command failed
    DispatchFailed {
        request_id: String,
        channel: Channel,
        value: String,
        error: String,
    },
    /// A command passed debouncing but the send queue was full
    DispatchDropped {
        channel: Channel,
        value: String,
        timestamp: SystemTime,
    },
    /// A classifier could not be loaded; its gate is disabled for the session
    ClassifierUnavailable { source: RecognitionSource, reason: String },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl BridgeEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            BridgeEvent::GestureRecognized { timestamp, .. } => *timestamp,
            BridgeEvent::ModeChanged { timestamp, .. } => *timestamp,
            BridgeEvent::HandTrackingChanged { timestamp, .. } => *timestamp,
            BridgeEvent::VoiceCommand { timestamp, .. } => *timestamp,
            BridgeEvent::DispatchDropped { timestamp, .. } => *timestamp,
            BridgeEvent::ShutdownRequested { timestamp, .. } => *timestamp,
            BridgeEvent::DispatchSent { .. }
            | BridgeEvent::DispatchFailed { .. }
            | BridgeEvent::ClassifierUnavailable { .. }
            | BridgeEvent::SystemError { .. } => SystemTime::now(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            BridgeEvent::GestureRecognized {
                source,
                gesture,
                confidence,
                ..
            } => {
                format!("{} gesture '{}' ({:.2})", source, gesture, confidence)
            }
            BridgeEvent::ModeChanged {
                from, to, reason, ..
            } => {
                format!("Mode {} -> {} ({:?})", from, to, reason)
            }
            BridgeEvent::HandTrackingChanged { tracked, .. } => {
                format!(
                    "Hand {}",
                    if *tracked { "tracked" } else { "lost" }
                )
            }
            BridgeEvent::VoiceCommand {
                action, command, ..
            } => {
                format!("Voice '{}' -> '{}'", action, command)
            }
            BridgeEvent::DispatchSent {
                channel,
                value,
                resend,
                latency_ms,
                ..
            } => {
                format!(
                    "{} '{}' {} in {}ms",
                    channel,
                    value,
                    if *resend { "re-sent" } else { "sent" },
                    latency_ms
                )
            }
            BridgeEvent::DispatchFailed {
                channel,
                value,
                error,
                ..
            } => {
                format!("{} '{}' failed: {}", channel, value, error)
            }
            BridgeEvent::DispatchDropped { channel, value, .. } => {
                format!("{} '{}' dropped before reaching the send queue", channel, value)
            }
            BridgeEvent::ClassifierUnavailable { source, reason } => {
                format!("{} classifier unavailable: {}", source, reason)
            }
            BridgeEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            BridgeEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            BridgeEvent::GestureRecognized { .. } => "gesture_recognized",
            BridgeEvent::ModeChanged { .. } => "mode_changed",
            BridgeEvent::HandTrackingChanged { .. } => "hand_tracking_changed",
            BridgeEvent::VoiceCommand { .. } => "voice_command",
            BridgeEvent::DispatchSent { .. } => "dispatch_sent",
            BridgeEvent::DispatchFailed { .. } => "dispatch_failed",
            BridgeEvent::DispatchDropped { .. } => "dispatch_dropped",
            BridgeEvent::ClassifierUnavailable { .. } => "classifier_unavailable",
            BridgeEvent::SystemError { .. } => "system_error",
            BridgeEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }

    /// Whether the event describes a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            BridgeEvent::DispatchFailed { .. }
                | BridgeEvent::DispatchDropped { .. }
                | BridgeEvent::ClassifierUnavailable { .. }
                | BridgeEvent::SystemError { .. }
        )
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter attached
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    ///
    /// Publishing never blocks; with no subscribers the event is dropped and an
    /// error is returned that callers on the hot path are free to ignore.
    pub fn publish(&self, event: BridgeEvent) -> Result<usize, EventBusError> {
        trace!("Publishing event: {}", event.description());

        match &event {
            BridgeEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            BridgeEvent::ClassifierUnavailable { source, reason } => {
                warn!("{} classifier unavailable: {}", source, reason);
            }
            BridgeEvent::HandTrackingChanged { tracked, .. } => {
                if *tracked {
                    info!("Hand tracking resumed");
                } else {
                    warn!("Hand tracking lost");
                }
            }
            BridgeEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept only failures
    Errors,
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &BridgeEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Errors => event.is_error(),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<BridgeEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<BridgeEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    ///
    /// Lagging is logged and skipped; only a closed bus ends the stream.
    pub async fn recv(&mut self) -> Result<BridgeEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<BridgeEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Event counters for the shutdown summary
#[derive(Debug, Default, Clone)]
pub struct EventMetrics {
    pub total_events: u64,
    pub events_by_type: HashMap<&'static str, u64>,
    pub errors: u64,
    pub last_event_time: Option<SystemTime>,
}

impl EventMetrics {
    /// Record an event
    pub fn record_event(&mut self, event: &BridgeEvent) {
        self.total_events += 1;
        *self.events_by_type.entry(event.event_type()).or_insert(0) += 1;
        if event.is_error() {
            self.errors += 1;
        }
        self.last_event_time = Some(event.timestamp());
    }

    /// Count for a single event type
    pub fn count(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }

    /// Log a summary of everything recorded
    pub fn log_summary(&self) {
        info!("Event summary:");
        info!("  Total events: {}", self.total_events);
        info!("  Errors: {}", self.errors);

        let mut types: Vec<_> = self.events_by_type.iter().collect();
        types.sort();
        for (event_type, count) in types {
            info!("  {}: {}", event_type, count);
        }
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        self.total_events = 0;
        self.events_by_type.clear();
        self.errors = 0;
        self.last_event_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn recognized(gesture: &str) -> BridgeEvent {
        BridgeEvent::GestureRecognized {
            source: RecognitionSource::Static,
            class_id: 3,
            gesture: gesture.to_string(),
            confidence: 0.91,
            timestamp: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus.publish(recognized("fist")).unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            BridgeEvent::GestureRecognized {
                gesture, class_id, ..
            } => {
                assert_eq!(gesture, "fist");
                assert_eq!(class_id, 3);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_an_error() {
        let event_bus = EventBus::new(4);
        assert!(!event_bus.has_subscribers());
        assert!(event_bus.publish(recognized("fist")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus
            .publish(BridgeEvent::HandTrackingChanged {
                tracked: false,
                timestamp: SystemTime::now(),
            })
            .unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::EventTypes(vec!["gesture_recognized"]);
        let dropped = BridgeEvent::DispatchDropped {
            channel: Channel::Gesture,
            value: "fist".to_string(),
            timestamp: SystemTime::now(),
        };

        assert!(filter.matches(&recognized("ok")));
        assert!(!filter.matches(&dropped));
        assert!(EventFilter::Errors.matches(&dropped));
        assert!(!EventFilter::Errors.matches(&recognized("ok")));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered = event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["voice_command"]),
            "test",
        );

        event_bus.publish(recognized("fist")).unwrap();
        event_bus
            .publish(BridgeEvent::VoiceCommand {
                action: "temp_up".to_string(),
                command: "small_heart".to_string(),
                timestamp: SystemTime::now(),
            })
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        match received {
            BridgeEvent::VoiceCommand { command, .. } => assert_eq!(command, "small_heart"),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(filtered.try_recv().unwrap().map(|e| e.event_type()), None);
    }

    #[test]
    fn test_event_metrics() {
        let mut metrics = EventMetrics::default();
        metrics.record_event(&recognized("fist"));
        metrics.record_event(&recognized("palm"));
        metrics.record_event(&BridgeEvent::SystemError {
            component: "dispatch".to_string(),
            error: "boom".to_string(),
        });

        assert_eq!(metrics.total_events, 3);
        assert_eq!(metrics.count("gesture_recognized"), 2);
        assert_eq!(metrics.errors, 1);

        metrics.reset();
        assert_eq!(metrics.total_events, 0);
        assert!(metrics.last_event_time.is_none());
    }

    #[test]
    fn test_event_properties() {
        let event = recognized("thumbs_up");
        assert_eq!(event.event_type(), "gesture_recognized");
        assert!(event.description().contains("thumbs_up"));
        assert!(event.description().contains("0.91"));
    }
}
