use crate::config::MotionConfig;
use crate::frame::AnchorPoint;
use crate::ring_buffer::BoundedBuffer;

use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Window used for the long-run mean test
const LONG_WINDOW: usize = 8;
/// Window used for the short max and mean tests
const SHORT_WINDOW: usize = 3;

/// A continuous stretch of significant movement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementEpisode {
    pub started_at: Instant,
    pub stopped_at: Option<Instant>,
    /// Continuous movement lasted at least the movement duration threshold
    pub qualified: bool,
}

/// Motion state after observing one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionUpdate {
    pub is_moving: bool,
    /// Significant movement began on this frame
    pub started: bool,
    /// Movement ceased on this frame
    pub stopped: bool,
    /// Continuous movement has reached the movement duration threshold
    pub sustained: bool,
    /// Time spent moving without interruption
    pub continuous: Duration,
    /// Time since movement last ceased, `None` while moving or before any movement
    pub still_for: Option<Duration>,
}

/// Tracks fingertip displacement and turns it into a smoothed moving / still signal
pub struct MotionDetector {
    config: MotionConfig,
    history: BoundedBuffer<f32>,
    trail: BoundedBuffer<AnchorPoint>,
    previous_anchor: Option<AnchorPoint>,
    is_moving: bool,
    movement_started: Option<Instant>,
    last_stable: Option<Instant>,
    episode: Option<MovementEpisode>,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            history: BoundedBuffer::new(config.history_size),
            trail: BoundedBuffer::new(config.trail_size),
            config,
            previous_anchor: None,
            is_moving: false,
            movement_started: None,
            last_stable: None,
            episode: None,
        }
    }

    /// Observe the anchor of a frame in which a hand is present
    ///
    /// A missing anchor leaves the movement window untouched, so a brief
    /// landmark dropout does not cancel an in-progress movement.
    pub fn observe(&mut self, anchor: Option<AnchorPoint>, now: Instant) -> MotionUpdate {
        let mut started = false;
        let mut stopped = false;

        if let Some(anchor) = anchor {
            self.trail.push(anchor, now);
            if let Some(previous) = self.previous_anchor {
                self.history.push(anchor.distance(&previous), now);
            }
            self.previous_anchor = Some(anchor);

            let significant = self.significant_movement();

            if significant && !self.is_moving {
                self.is_moving = true;
                self.movement_started = Some(now);
                self.episode = Some(MovementEpisode {
                    started_at: now,
                    stopped_at: None,
                    qualified: false,
                });
                started = true;
                debug!("Movement started");
            } else if !significant && self.is_moving {
                self.is_moving = false;
                self.last_stable = Some(now);
                if let Some(episode) = self.episode.as_mut() {
                    episode.stopped_at = Some(now);
                }
                stopped = true;
                debug!(
                    "Movement stopped after {:.2}s",
                    self.movement_started
                        .map(|s| now.saturating_duration_since(s).as_secs_f32())
                        .unwrap_or_default()
                );
            }
        } else {
            trace!("Anchor missing, keeping movement window");
        }

        let continuous = self.continuous_movement(now);
        let sustained = self.is_moving && continuous >= self.config.movement_duration();
        if sustained {
            if let Some(episode) = self.episode.as_mut() {
                episode.qualified = true;
            }
        }

        self.expire_episode(now);

        MotionUpdate {
            is_moving: self.is_moving,
            started,
            stopped,
            sustained,
            continuous,
            still_for: self.still_for(now),
        }
    }

    fn significant_movement(&self) -> bool {
        if self.history.len() < self.config.min_history {
            return false;
        }

        let threshold = self.config.movement_threshold;
        let long_mean = self.history.recent_mean(LONG_WINDOW);
        let short_max = self.history.recent_max(SHORT_WINDOW);
        let short_mean = self.history.recent_mean(SHORT_WINDOW);

        trace!(
            "Motion history: mean8={:.4} max3={:.4} mean3={:.4}",
            long_mean,
            short_max,
            short_mean
        );

        long_mean > threshold || short_max > threshold * 1.2 || short_mean > threshold * 0.8
    }

    fn expire_episode(&mut self, now: Instant) {
        let expired = matches!(
            self.episode,
            Some(MovementEpisode { stopped_at: Some(stopped), .. })
                if now.saturating_duration_since(stopped) >= self.config.episode_expiry()
        );
        if expired {
            trace!("Movement episode expired");
            self.episode = None;
        }
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    /// Time spent moving without interruption (zero while still)
    pub fn continuous_movement(&self, now: Instant) -> Duration {
        match (self.is_moving, self.movement_started) {
            (true, Some(started)) => now.saturating_duration_since(started),
            _ => Duration::ZERO,
        }
    }

    /// Time since movement last ceased
    pub fn still_for(&self, now: Instant) -> Option<Duration> {
        if self.is_moving {
            return None;
        }
        self.last_stable
            .map(|stable| now.saturating_duration_since(stable))
    }

    /// The most recent movement episode, if it has not expired
    pub fn episode(&self) -> Option<&MovementEpisode> {
        self.episode.as_ref()
    }

    /// Whether a live episode reached the movement duration threshold
    pub fn has_qualified_episode(&self) -> bool {
        self.episode.map(|e| e.qualified).unwrap_or(false)
    }

    /// Forget the current episode without touching the movement window
    pub fn retire_episode(&mut self) {
        self.episode = None;
    }

    /// Anchor trail, oldest first
    pub fn trail(&self) -> impl Iterator<Item = &AnchorPoint> {
        self.trail.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Reset after a dynamic gesture was accepted
    ///
    /// The hand is treated as stable from `now`.
    pub fn settle(&mut self, now: Instant) {
        self.history.clear();
        self.trail.clear();
        self.episode = None;
        self.is_moving = false;
        self.movement_started = None;
        self.last_stable = Some(now);
    }

    /// Full reset after hand loss
    pub fn reset(&mut self) {
        self.history.clear();
        self.trail.clear();
        self.previous_anchor = None;
        self.is_moving = false;
        self.movement_started = None;
        self.last_stable = None;
        self.episode = None;
    }
}
