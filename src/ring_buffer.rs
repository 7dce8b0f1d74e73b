use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::trace;

/// Bounded FIFO that silently evicts the oldest entry when full
///
/// Used for the static and sequence feature buffers as well as the motion
/// history and trail windows. Owned by a single session, so no locking.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    /// When the buffer last went from empty to non-empty
    filling_since: Option<Instant>,
    stats: BufferStats,
}

/// Counters for buffer activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Total items pushed
    pub pushed: u64,
    /// Items evicted to make room
    pub evicted: u64,
    /// Number of explicit clears
    pub clears: u64,
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            filling_since: None,
            stats: BufferStats::default(),
        }
    }

    /// Append an item, evicting the oldest one if the buffer is full
    pub fn push(&mut self, item: T, now: Instant) {
        if self.items.is_empty() {
            self.filling_since = Some(now);
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
            self.stats.evicted += 1;
            trace!("Bounded buffer full at {}, evicted oldest", self.capacity);
        }
        self.items.push_back(item);
        self.stats.pushed += 1;
    }

    /// Remove everything and restart the fill clock
    pub fn clear(&mut self) {
        self.items.clear();
        self.filling_since = None;
        self.stats.clears += 1;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    /// The most recent `n` items, oldest first
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }

    /// How long the buffer has been accumulating since it was last empty
    pub fn filling_for(&self, now: Instant) -> Duration {
        self.filling_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default()
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Copy of the most recent `n` items, oldest first
    pub fn latest_vec(&self, n: usize) -> Vec<T> {
        self.latest(n).cloned().collect()
    }
}

impl BoundedBuffer<f32> {
    /// Mean of the most recent `n` values (fewer if the buffer is shorter)
    pub fn recent_mean(&self, n: usize) -> f32 {
        let count = n.min(self.items.len());
        if count == 0 {
            return 0.0;
        }
        self.latest(n).sum::<f32>() / count as f32
    }

    /// Max of the most recent `n` values
    pub fn recent_max(&self, n: usize) -> f32 {
        self.latest(n).copied().fold(0.0, f32::max)
    }
}
