use serde::{Deserialize, Serialize};

/// Shortest ladder that still has two distinct ends.
pub const MIN_LADDER_LEN: usize = 2;

/// One rung of a word ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub word: String,
    #[serde(default)]
    pub clue: Option<String>,
    #[serde(default)]
    pub transform: Option<String>,
}

impl Step {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            clue: None,
            transform: None,
        }
    }
}

/// Descriptive metadata shown to players.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PuzzleMeta {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// An immutable word ladder. Index 0 and `len - 1` are the ends; everything in
/// between is revealed by guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
    #[serde(default)]
    pub meta: PuzzleMeta,
    pub ladder: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuzzleError {
    TooShort(usize),
    EmptyWord(usize),
    UnknownDifficulty(String),
    Malformed(String),
}

impl std::fmt::Display for PuzzleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => {
                write!(f, "ladder has {len} steps (min {MIN_LADDER_LEN})")
            },
            Self::EmptyWord(index) => write!(f, "step {index} has an empty word"),
            Self::UnknownDifficulty(d) => {
                write!(f, "difficulty must be easy, medium or hard, got {d}")
            },
            Self::Malformed(e) => write!(f, "malformed puzzle: {e}"),
        }
    }
}

impl std::error::Error for PuzzleError {}

impl Puzzle {
    /// Build a validated puzzle.
    pub fn new(meta: PuzzleMeta, ladder: Vec<Step>) -> Result<Self, PuzzleError> {
        let mut puzzle = Self { meta, ladder };
        puzzle.validate()?;
        Ok(puzzle)
    }

    /// Parse and validate a puzzle from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, PuzzleError> {
        let mut puzzle: Puzzle =
            serde_json::from_str(json).map_err(|e| PuzzleError::Malformed(e.to_string()))?;
        puzzle.validate()?;
        Ok(puzzle)
    }

    /// Check ladder invariants and normalize the difficulty label.
    pub fn validate(&mut self) -> Result<(), PuzzleError> {
        if self.ladder.len() < MIN_LADDER_LEN {
            return Err(PuzzleError::TooShort(self.ladder.len()));
        }
        if let Some(index) = self
            .ladder
            .iter()
            .position(|s| normalize_word(&s.word).is_empty())
        {
            return Err(PuzzleError::EmptyWord(index));
        }
        if let Some(ref d) = self.meta.difficulty {
            let lower = d.to_lowercase();
            if !matches!(lower.as_str(), "easy" | "medium" | "hard") {
                return Err(PuzzleError::UnknownDifficulty(d.clone()));
            }
            self.meta.difficulty = Some(lower);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ladder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ladder.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.ladder.len().saturating_sub(1)
    }

    pub fn is_end(&self, index: usize) -> bool {
        index == 0 || index == self.last_index()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.ladder.get(index)
    }

    /// Whether `guess` names the word at `index`, ignoring case and whitespace.
    pub fn word_matches(&self, index: usize, guess: &str) -> bool {
        self.ladder
            .get(index)
            .is_some_and(|s| normalize_word(&s.word) == normalize_word(guess))
    }
}

/// Canonical comparison form of a word: whitespace removed, uppercased.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(words: &[&str]) -> Vec<Step> {
        words.iter().map(|w| Step::new(*w)).collect()
    }

    #[test]
    fn rejects_single_step_ladder() {
        let err = Puzzle::new(PuzzleMeta::default(), ladder(&["ONLY"])).unwrap_err();
        assert_eq!(err, PuzzleError::TooShort(1));
    }

    #[test]
    fn rejects_blank_word() {
        let err = Puzzle::new(PuzzleMeta::default(), ladder(&["A", "  ", "B"])).unwrap_err();
        assert_eq!(err, PuzzleError::EmptyWord(1));
    }

    #[test]
    fn normalizes_difficulty() {
        let meta = PuzzleMeta {
            title: "t".into(),
            author: None,
            difficulty: Some("HARD".into()),
        };
        let p = Puzzle::new(meta, ladder(&["A", "B"])).unwrap();
        assert_eq!(p.meta.difficulty.as_deref(), Some("hard"));
    }

    #[test]
    fn rejects_unknown_difficulty() {
        let meta = PuzzleMeta {
            title: "t".into(),
            author: None,
            difficulty: Some("brutal".into()),
        };
        assert!(matches!(
            Puzzle::new(meta, ladder(&["A", "B"])),
            Err(PuzzleError::UnknownDifficulty(_))
        ));
    }

    #[test]
    fn parses_json_with_optional_fields() {
        let json = r#"{
            "meta": {"title": "Cold to Warm"},
            "ladder": [
                {"word": "COLD", "clue": "not hot", "transform": "C->W"},
                {"word": "WORD"},
                {"word": "WARM", "clue": null}
            ]
        }"#;
        let p = Puzzle::from_json(json).unwrap();
        assert_eq!(p.meta.title, "Cold to Warm");
        assert_eq!(p.len(), 3);
        assert_eq!(p.ladder[0].clue.as_deref(), Some("not hot"));
        assert!(p.ladder[1].transform.is_none());
    }

    #[test]
    fn malformed_json_reported() {
        assert!(matches!(
            Puzzle::from_json("{\"ladder\": 5}"),
            Err(PuzzleError::Malformed(_))
        ));
    }

    #[test]
    fn word_match_ignores_case_and_whitespace() {
        let p = Puzzle::new(PuzzleMeta::default(), ladder(&["ICE CREAM", "x", "END"])).unwrap();
        assert!(p.word_matches(0, "icecream"));
        assert!(p.word_matches(0, "  Ice\tCream "));
        assert!(!p.word_matches(0, "ice creams"));
        assert!(!p.word_matches(9, "icecream"));
    }

    #[test]
    fn ends_identified() {
        let p = Puzzle::new(PuzzleMeta::default(), ladder(&["A", "B", "C", "D"])).unwrap();
        assert!(p.is_end(0));
        assert!(p.is_end(3));
        assert!(!p.is_end(1));
        assert_eq!(p.last_index(), 3);
    }
}
