//! Bounded store of past transitions.
//!
//! Entries are kept oldest first. Besides plain capacity eviction, the buffer
//! rebalances its composition: once it holds more than half its capacity and
//! more than [`MAX_TERMINAL_FRACTION`] of the entries are terminal, the oldest
//! quarter of the terminal entries is dropped. Inserts are never refused.

use std::collections::VecDeque;

use qtris_engine::PieceRotation;
use qtris_evaluator::state_vector::StateVector;
use rand::Rng;

pub const BUFFER_CAPACITY: usize = 10_000;
/// Share of terminal entries above which a rebalancing pass runs.
pub const MAX_TERMINAL_FRACTION: f32 = 0.3;

/// One recorded transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub state: StateVector,
    pub rotation: PieceRotation,
    pub column: i8,
    pub reward: f32,
    pub next_state: StateVector,
    /// The game ended with this transition.
    pub terminal: bool,
}

#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    entries: VecDeque<Experience>,
    capacity: usize,
    terminal_count: usize,
}

impl ReplayBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be positive");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            terminal_count: 0,
        }
    }

    /// Appends an experience, evicting as needed. Returns how many entries were
    /// removed.
    pub fn push(&mut self, experience: Experience) -> usize {
        let mut evicted = 0;
        if self.entries.len() == self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                self.forget(&oldest);
                evicted += 1;
            }
        }
        if experience.terminal {
            self.terminal_count += 1;
        }
        self.entries.push_back(experience);
        evicted + self.rebalance()
    }

    #[expect(clippy::cast_precision_loss)]
    fn rebalance(&mut self) -> usize {
        let len = self.entries.len();
        if len <= self.capacity / 2
            || self.terminal_count as f32 <= MAX_TERMINAL_FRACTION * len as f32
        {
            return 0;
        }

        let to_remove = (self.terminal_count / 4).max(1);
        let mut removed = 0;
        self.entries.retain(|e| {
            if e.terminal && removed < to_remove {
                removed += 1;
                false
            } else {
                true
            }
        });
        self.terminal_count -= removed;
        tracing::debug!(removed, len = self.entries.len(), "rebalanced replay buffer");
        removed
    }

    fn forget(&mut self, experience: &Experience) {
        if experience.terminal {
            self.terminal_count -= 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.terminal_count
    }

    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn terminal_fraction(&self) -> f32 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.terminal_count as f32 / self.entries.len() as f32
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Experience> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Experience> + '_ {
        self.entries.iter()
    }

    /// Draws `count` indices uniformly, with replacement.
    ///
    /// Empty when the buffer is empty.
    pub fn sample_indices<R>(&self, count: usize, rng: &mut R) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        if self.entries.is_empty() {
            return vec![];
        }
        (0..count)
            .map(|_| rng.random_range(0..self.entries.len()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.terminal_count = 0;
    }
}
