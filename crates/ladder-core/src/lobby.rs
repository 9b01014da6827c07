use serde::{Deserialize, Serialize};

/// Identifier of a lobby in the persistent store.
pub type LobbyId = u64;

/// Identifier of a team in the persistent store. Team ids are unique across lobbies.
pub type TeamId = u64;

/// Lifecycle of a lobby's game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyPhase {
    /// Players are joining and being split into teams.
    Forming,
    /// Teams are solving; guesses are accepted.
    InProgress,
    /// The game ended (every team completed, or an admin forced the end).
    Completed,
}

impl LobbyPhase {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Any phase may return to `Forming` (puzzle reset); otherwise the lobby
    /// only moves forward.
    pub fn can_transition_to(self, next: LobbyPhase) -> bool {
        matches!(
            (self, next),
            (LobbyPhase::Forming, LobbyPhase::InProgress)
                | (LobbyPhase::InProgress, LobbyPhase::Completed)
                | (_, LobbyPhase::Forming)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LobbyPhase::Forming => "forming",
            LobbyPhase::InProgress => "in_progress",
            LobbyPhase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for LobbyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(LobbyPhase::Forming.can_transition_to(LobbyPhase::InProgress));
        assert!(LobbyPhase::InProgress.can_transition_to(LobbyPhase::Completed));
    }

    #[test]
    fn reset_allowed_from_any_phase() {
        assert!(LobbyPhase::Forming.can_transition_to(LobbyPhase::Forming));
        assert!(LobbyPhase::InProgress.can_transition_to(LobbyPhase::Forming));
        assert!(LobbyPhase::Completed.can_transition_to(LobbyPhase::Forming));
    }

    #[test]
    fn skipping_or_reversing_rejected() {
        assert!(!LobbyPhase::Forming.can_transition_to(LobbyPhase::Completed));
        assert!(!LobbyPhase::Completed.can_transition_to(LobbyPhase::InProgress));
        assert!(!LobbyPhase::InProgress.can_transition_to(LobbyPhase::InProgress));
    }
}
