pub mod lobby;
pub mod net;
pub mod player;
pub mod progress;
pub mod puzzle;
pub mod resolver;
pub mod scoring;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::progress::TeamProgress;
    use crate::puzzle::{Puzzle, PuzzleMeta, Step};

    /// Words of the four-step ladder used throughout the tests.
    pub const SCENARIO_WORDS: [&str; 4] = ["START", "STARE", "SHARE", "FINAL"];

    /// The `START -> FINAL` ladder with clues on the hidden steps.
    pub fn scenario_puzzle() -> Puzzle {
        let mut ladder: Vec<Step> = SCENARIO_WORDS.iter().map(|w| Step::new(*w)).collect();
        ladder[1].clue = Some("Look fixedly".to_string());
        ladder[1].transform = Some("T -> E".to_string());
        ladder[2].clue = Some("Portion".to_string());
        ladder[2].transform = Some("T -> H".to_string());
        let meta = PuzzleMeta {
            title: "Start to Final".to_string(),
            author: Some("tests".to_string()),
            difficulty: Some("easy".to_string()),
        };
        Puzzle { meta, ladder }
    }

    /// A ladder of `len` steps whose words are `WORD0`, `WORD1`, ...
    pub fn numbered_puzzle(len: usize) -> Puzzle {
        let ladder = (0..len).map(|i| Step::new(format!("WORD{i}"))).collect();
        Puzzle {
            meta: PuzzleMeta {
                title: format!("Numbered {len}"),
                ..PuzzleMeta::default()
            },
            ladder,
        }
    }

    /// Progress with exactly `revealed` known and completion derived from `len`.
    pub fn progress_with(revealed: &[usize], len: usize) -> TeamProgress {
        let revealed_steps: std::collections::BTreeSet<usize> = revealed.iter().copied().collect();
        let is_completed = len > 0 && (0..len).all(|i| revealed_steps.contains(&i));
        TeamProgress {
            revealed_steps,
            is_completed,
            last_updated_at: 0,
        }
    }

    /// The puzzle in the JSON shape the store seeds accept.
    pub fn scenario_puzzle_json() -> String {
        serde_json::to_string(&scenario_puzzle()).unwrap_or_default()
    }
}
