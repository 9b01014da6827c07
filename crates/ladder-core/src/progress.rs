use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::player::Direction;
use crate::puzzle::Puzzle;

/// A team's progress through its ladder.
///
/// `revealed_steps` only grows until the lobby's puzzle is reset, and
/// `is_completed` is true exactly when it covers every index of the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamProgress {
    pub revealed_steps: BTreeSet<usize>,
    pub is_completed: bool,
    /// Unix epoch milliseconds of the last accepted change.
    pub last_updated_at: u64,
}

impl TeamProgress {
    /// Initial progress for a fresh game: both ends revealed.
    pub fn seeded(puzzle: &Puzzle, now: u64) -> Self {
        let revealed_steps: BTreeSet<usize> = [0, puzzle.last_index()].into_iter().collect();
        let is_completed = covers_ladder(&revealed_steps, puzzle.len());
        Self {
            revealed_steps,
            is_completed,
            last_updated_at: now,
        }
    }

    pub fn is_revealed(&self, index: usize) -> bool {
        self.revealed_steps.contains(&index)
    }

    /// A copy of this progress with `index` revealed and completion recomputed.
    pub fn with_revealed(&self, index: usize, ladder_len: usize, now: u64) -> Self {
        let mut revealed_steps = self.revealed_steps.clone();
        revealed_steps.insert(index);
        let is_completed = covers_ladder(&revealed_steps, ladder_len);
        Self {
            revealed_steps,
            is_completed,
            last_updated_at: now,
        }
    }

    /// Revealed indices in ascending order, as carried on the wire.
    pub fn revealed_vec(&self) -> Vec<usize> {
        self.revealed_steps.iter().copied().collect()
    }

    /// Fraction of the ladder revealed, in `[0, 1]`.
    pub fn completion_ratio(&self, ladder_len: usize) -> f64 {
        if ladder_len == 0 {
            return 0.0;
        }
        let revealed = self
            .revealed_steps
            .iter()
            .filter(|&&i| i < ladder_len)
            .count();
        revealed as f64 / ladder_len as f64
    }

    /// The step presented as "being solved" to a viewer working in `direction`.
    pub fn active_step(&self, direction: Direction, ladder_len: usize) -> usize {
        next_unrevealed_index(self, ladder_len, direction.from_start())
    }
}

fn covers_ladder(revealed: &BTreeSet<usize>, ladder_len: usize) -> bool {
    ladder_len > 0 && (0..ladder_len).all(|i| revealed.contains(&i))
}

/// First intermediate index not yet revealed, scanning from the start end
/// (`from_start`) or from the far end.
///
/// When every intermediate step is revealed the scan falls back to `len - 2`
/// from the start and to `1` from the end.
pub fn next_unrevealed_index(progress: &TeamProgress, ladder_len: usize, from_start: bool) -> usize {
    let last_inner = ladder_len.saturating_sub(2);
    if from_start {
        (1..=last_inner)
            .find(|i| !progress.is_revealed(*i))
            .unwrap_or(last_inner)
    } else {
        (1..=last_inner)
            .rev()
            .find(|i| !progress.is_revealed(*i))
            .unwrap_or(1)
    }
}
