use super::Channel;
use crate::config::ChannelConfig;

use std::time::{Duration, Instant};
use tracing::trace;

/// What the debouncer decided for one offered value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    /// A new value, sent
    Send,
    /// The unchanged value, re-asserted after the resend interval
    Resend,
    /// Too soon after the last send
    Suppressed,
    /// The no-op sentinel, never sent
    NoOp,
}

impl DispatchDecision {
    pub fn is_send(&self) -> bool {
        matches!(self, DispatchDecision::Send | DispatchDecision::Resend)
    }
}

/// Snapshot of a channel's dispatch state
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchState {
    pub last_value: Option<String>,
    pub last_send: Option<Instant>,
}

/// Per-channel dedup with a minimum delay between values and periodic re-assertion
///
/// State changes happen synchronously in [`offer`](Self::offer), before the
/// send is handed off, so a slow send never lets a duplicate through.
#[derive(Debug)]
pub struct ChannelDebouncer {
    channel: Channel,
    delay: Duration,
    resend_interval: Duration,
    noop_value: String,
    last_value: Option<String>,
    last_send: Option<Instant>,
}

impl ChannelDebouncer {
    pub fn new(channel: Channel, config: &ChannelConfig, noop_value: &str) -> Self {
        Self {
            channel,
            delay: config.delay(),
            resend_interval: config.resend_interval(),
            noop_value: noop_value.to_string(),
            last_value: None,
            last_send: None,
        }
    }

    pub fn offer(&mut self, value: &str, now: Instant) -> DispatchDecision {
        if value.eq_ignore_ascii_case(&self.noop_value) {
            return DispatchDecision::NoOp;
        }

        let since_send = self
            .last_send
            .map(|sent| now.saturating_duration_since(sent));

        let decision = if self.last_value.as_deref() == Some(value) {
            match since_send {
                Some(elapsed) if elapsed < self.resend_interval => DispatchDecision::Suppressed,
                _ => {
                    self.last_send = Some(now);
                    DispatchDecision::Resend
                }
            }
        } else {
            match since_send {
                Some(elapsed) if elapsed < self.delay => DispatchDecision::Suppressed,
                _ => {
                    self.last_value = Some(value.to_string());
                    self.last_send = Some(now);
                    DispatchDecision::Send
                }
            }
        };

        trace!("{} '{}': {:?}", self.channel, value, decision);
        decision
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn state(&self) -> DispatchState {
        DispatchState {
            last_value: self.last_value.clone(),
            last_send: self.last_send,
        }
    }
}
