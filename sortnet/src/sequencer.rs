//! Stage sequencing for the bitonic network
//!
//! The [`Sequencer`] walks the classical bitonic schedule one stage at a
//! time: a flip at height `h`, followed by disperses at `h / 2, h / 4, ..., 2`,
//! then a flip at `2h`, until the block height reaches `2N`.
use crate::{config::SortConfig, stage::Stage};

/// Steppable state machine producing the stages of a full sort
#[derive(Clone, Debug)]
pub struct Sequencer {
    len: usize,

    /// Most recently executed stage
    current: Option<Stage>,

    /// Stage to execute next, or `None` once the sort is complete
    next: Option<Stage>,

    /// Largest flip height started so far (doubled after each merge)
    highest_block_height: usize,

    /// Number of stages executed since the last reset
    executed: usize,
}

impl Sequencer {
    /// Builds a sequencer in its initial state for the configured length
    pub fn new(config: &SortConfig) -> Self {
        Self::for_len(config.len())
    }

    fn for_len(len: usize) -> Self {
        debug_assert!(len.is_power_of_two() && len >= SortConfig::MIN_LEN);
        Self {
            len,
            current: None,
            next: Some(Stage::flip(2)),
            highest_block_height: 2,
            executed: 0,
        }
    }

    /// Returns to the initial state, discarding all progress
    pub fn reset(&mut self) {
        *self = Self::for_len(self.len);
    }

    /// Resets for a new length
    pub fn resize(&mut self, config: &SortConfig) {
        *self = Self::new(config);
    }

    /// Returns the array length this sequencer is scheduling for
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the most recently executed stage
    pub fn current(&self) -> Option<Stage> {
        self.current
    }

    /// Returns the stage that will run next
    pub fn next_stage(&self) -> Option<Stage> {
        self.next
    }

    /// Returns the highest block height reached so far
    pub fn highest_block_height(&self) -> usize {
        self.highest_block_height
    }

    /// Returns the number of stages executed since the last reset
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Checks whether every stage of the network has been executed
    pub fn is_complete(&self) -> bool {
        self.highest_block_height == 2 * self.len
    }

    /// Marks the next stage as executed and returns it
    ///
    /// Returns `None` (without changing state) once the sort is complete.
    pub fn advance(&mut self) -> Option<Stage> {
        let stage = self.next?;
        self.current = Some(stage);
        self.executed += 1;
        self.next = if stage.block_height > 2 {
            Some(Stage::disperse(stage.block_height / 2))
        } else {
            self.highest_block_height *= 2;
            if self.highest_block_height == 2 * self.len {
                None
            } else {
                Some(Stage::flip(self.highest_block_height))
            }
        };
        debug_assert!(
            self.next.is_none_or(|s| s.block_height <= self.len),
            "stage {:?} exceeds length {}",
            self.next,
            self.len
        );
        Some(stage)
    }

    /// Returns an iterator over the stages that remain
    pub fn remaining(&self) -> Schedule {
        Schedule(self.clone())
    }
}

/// Iterator over the remaining stages of a [`Sequencer`]
#[derive(Clone, Debug)]
pub struct Schedule(Sequencer);

impl Iterator for Schedule {
    type Item = Stage;
    fn next(&mut self) -> Option<Stage> {
        self.0.advance()
    }
}

/// Returns the full stage schedule for an array of the given length
pub fn schedule(config: &SortConfig) -> Schedule {
    Sequencer::new(config).remaining()
}

/// Returns the number of stages in a full sort of `len` elements
///
/// This is `k * (k + 1) / 2`, where `k = log2(len)`.
pub fn stage_count(len: usize) -> usize {
    let k = len.ilog2() as usize;
    k * (k + 1) / 2
}
