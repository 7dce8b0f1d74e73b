mod debouncer;
mod transport;
mod voice;
mod worker;


pub use debouncer::{ChannelDebouncer, DispatchDecision, DispatchState};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{build_transport, request_body, DispatchTransport, LogTransport};
pub use voice::VoiceCommandMapper;
pub use worker::{deliver, SenderPool};

use crate::config::DispatchConfig;
use crate::events::{BridgeEvent, EventBus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Logical actuation channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Gesture,
    Voice,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Gesture => write!(f, "gesture"),
            Channel::Voice => write!(f, "voice"),
        }
    }
}

/// A command handed to the transport boundary
///
/// A snapshot taken at trigger time; senders never touch debounce state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub id: Uuid,
    pub channel: Channel,
    pub value: String,
    pub resend: bool,
    pub issued_at: DateTime<Utc>,
}

impl DispatchRequest {
    pub fn new(channel: Channel, value: &str, resend: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            value: value.to_string(),
            resend,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub offered: u64,
    pub sent: u64,
    pub resent: u64,
    pub suppressed: u64,
    pub noop: u64,
    pub dropped: u64,
}

/// Debounces both channels and queues accepted sends without blocking
///
/// Owned by the frame loop, which makes it the only writer of the debounce
/// state.
pub struct Dispatcher {
    gesture: ChannelDebouncer,
    voice: ChannelDebouncer,
    queue: mpsc::Sender<DispatchRequest>,
    event_bus: EventBus,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        config: &DispatchConfig,
        queue: mpsc::Sender<DispatchRequest>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            gesture: ChannelDebouncer::new(Channel::Gesture, &config.gesture, &config.noop_value),
            voice: ChannelDebouncer::new(Channel::Voice, &config.voice, &config.noop_value),
            queue,
            event_bus,
            stats: DispatchStats::default(),
        }
    }

    /// Offer a value on a channel; queues a request if the debouncer lets it through
    pub fn offer(&mut self, channel: Channel, value: &str, now: Instant) -> DispatchDecision {
        self.stats.offered += 1;

        let decision = match channel {
            Channel::Gesture => self.gesture.offer(value, now),
            Channel::Voice => self.voice.offer(value, now),
        };

        match decision {
            DispatchDecision::Send => self.stats.sent += 1,
            DispatchDecision::Resend => self.stats.resent += 1,
            DispatchDecision::Suppressed => {
                self.stats.suppressed += 1;
                debug!("Suppressed {} '{}'", channel, value);
            }
            DispatchDecision::NoOp => self.stats.noop += 1,
        }

        if decision.is_send() {
            self.enqueue(DispatchRequest::new(
                channel,
                value,
                decision == DispatchDecision::Resend,
            ));
        }

        decision
    }

    fn enqueue(&mut self, request: DispatchRequest) {
        match self.queue.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(request)) => self.drop_request(request, "full"),
            Err(mpsc::error::TrySendError::Closed(request)) => {
                self.drop_request(request, "closed")
            }
        }
    }

    fn drop_request(&mut self, request: DispatchRequest, queue_state: &str) {
        self.stats.dropped += 1;
        warn!(
            "Dispatch queue {}, dropping {} '{}'",
            queue_state, request.channel, request.value
        );
        let _ = self.event_bus.publish(BridgeEvent::DispatchDropped {
            channel: request.channel,
            value: request.value,
            timestamp: SystemTime::now(),
        });
    }

    pub fn state(&self, channel: Channel) -> DispatchState {
        match channel {
            Channel::Gesture => self.gesture.state(),
            Channel::Voice => self.voice.state(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}
