//! Guess resolution for a single team.
//!
//! `resolve_guess` is a pure state transition: it never mutates the progress it
//! is given and returns the next snapshot on acceptance. Callers must hold the
//! team's exclusivity guarantee while resolving and persisting, so that two
//! correct guesses for the same step cannot both be accepted.

use crate::progress::TeamProgress;
use crate::puzzle::Puzzle;

/// Why a guess was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessError {
    /// Index out of range, or an end that is not revealed.
    InvalidStep,
    /// A teammate revealed this step first. No mutation happened.
    AlreadySolved,
    /// Wrong word.
    Incorrect,
}

impl std::fmt::Display for GuessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStep => write!(f, "invalid step"),
            Self::AlreadySolved => write!(f, "step already solved"),
            Self::Incorrect => write!(f, "incorrect guess"),
        }
    }
}

impl std::error::Error for GuessError {}

/// An accepted guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessOutcome {
    pub word_index: usize,
    pub progress: TeamProgress,
    /// True only on the guess that completed the ladder.
    pub team_completed: bool,
}

/// Decide a guess for `word_index` against the team's current progress.
pub fn resolve_guess(
    puzzle: &Puzzle,
    progress: &TeamProgress,
    word_index: i64,
    guess: &str,
    now: u64,
) -> Result<GuessOutcome, GuessError> {
    let index = usize::try_from(word_index).map_err(|_| GuessError::InvalidStep)?;
    if index >= puzzle.len() {
        return Err(GuessError::InvalidStep);
    }
    if progress.is_revealed(index) {
        return Err(GuessError::AlreadySolved);
    }
    if puzzle.is_end(index) {
        return Err(GuessError::InvalidStep);
    }
    if !puzzle.word_matches(index, guess) {
        return Err(GuessError::Incorrect);
    }

    let next = progress.with_revealed(index, puzzle.len(), now);
    let team_completed = next.is_completed && !progress.is_completed;
    Ok(GuessOutcome {
        word_index: index,
        progress: next,
        team_completed,
    })
}
