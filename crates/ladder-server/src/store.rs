//! Persistence collaborator.
//!
//! The coordinator only talks to storage through [`LobbyStore`].
//! [`MemoryStore`] is the in-process implementation used by the binary and
//! the tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;

use ladder_core::lobby::{LobbyId, TeamId};
use ladder_core::progress::TeamProgress;
use ladder_core::puzzle::Puzzle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyRecord {
    pub id: LobbyId,
    pub name: String,
    pub puzzle: Puzzle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub id: TeamId,
    pub lobby_id: LobbyId,
    pub name: String,
    pub progress: Option<TeamProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub session_id: String,
    pub lobby_id: LobbyId,
    pub team_id: Option<TeamId>,
    pub name: String,
}

pub trait LobbyStore: Send + Sync {
    fn find_lobby(&self, lobby_id: LobbyId) -> Result<LobbyRecord, StoreError>;
    fn load_puzzle(&self, lobby_id: LobbyId) -> Result<Puzzle, StoreError>;
    fn delete_lobby(&self, lobby_id: LobbyId) -> Result<(), StoreError>;

    fn find_team(&self, team_id: TeamId) -> Result<TeamRecord, StoreError>;
    fn list_teams(&self, lobby_id: LobbyId) -> Result<Vec<TeamRecord>, StoreError>;
    fn create_team(&self, lobby_id: LobbyId, name: &str) -> Result<TeamRecord, StoreError>;
    fn list_team_members(&self, team_id: TeamId) -> Result<Vec<PlayerRecord>, StoreError>;

    fn load_team_progress(&self, team_id: TeamId) -> Result<Option<TeamProgress>, StoreError>;
    fn save_team_progress(&self, team_id: TeamId, progress: &TeamProgress)
    -> Result<(), StoreError>;
    fn clear_team_progress(&self, team_id: TeamId) -> Result<(), StoreError>;

    fn find_player(&self, session_id: &str) -> Result<PlayerRecord, StoreError>;
    fn list_lobby_players(&self, lobby_id: LobbyId) -> Result<Vec<PlayerRecord>, StoreError>;
    fn set_player_team(&self, session_id: &str, team_id: Option<TeamId>)
    -> Result<(), StoreError>;
    fn remove_player(&self, session_id: &str) -> Result<PlayerRecord, StoreError>;
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    lobbies: Vec<SeedLobby>,
}

#[derive(Debug, Deserialize)]
struct SeedLobby {
    id: LobbyId,
    name: String,
    /// Inline puzzle; exactly one of this and `puzzle_file` is set.
    #[serde(default)]
    puzzle: Option<Puzzle>,
    /// Puzzle JSON file, relative to the seed file's directory.
    #[serde(default)]
    puzzle_file: Option<PathBuf>,
    #[serde(default)]
    teams: Vec<SeedTeam>,
    #[serde(default)]
    players: Vec<SeedPlayer>,
}

#[derive(Debug, Deserialize)]
struct SeedTeam {
    id: TeamId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SeedPlayer {
    session_id: String,
    name: String,
    #[serde(default)]
    team_id: Option<TeamId>,
}

fn seed_puzzle(lobby: &SeedLobby, base_dir: &Path) -> Result<Puzzle, String> {
    match (&lobby.puzzle, &lobby.puzzle_file) {
        (Some(puzzle), None) => {
            let mut puzzle = puzzle.clone();
            puzzle.validate().map_err(|e| e.to_string())?;
            Ok(puzzle)
        },
        (None, Some(file)) => {
            let path = base_dir.join(file);
            let json = std::fs::read_to_string(&path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            Puzzle::from_json(&json).map_err(|e| format!("{}: {e}", path.display()))
        },
        (Some(_), Some(_)) => Err("both puzzle and puzzle_file given".to_string()),
        (None, None) => Err("no puzzle or puzzle_file given".to_string()),
    }
}

#[derive(Default)]
struct Tables {
    lobbies: BTreeMap<LobbyId, LobbyRecord>,
    teams: BTreeMap<TeamId, TeamRecord>,
    players: HashMap<String, PlayerRecord>,
    next_team_id: TeamId,
}

/// Lobbies, teams and players held in process memory.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_team_id: 1,
                ..Tables::default()
            }),
        }
    }

    /// Build a store from the JSON seed format:
    /// `{"lobbies": [{"id", "name", "puzzle" | "puzzle_file", "teams": [..], "players": [..]}]}`.
    /// A `puzzle_file` here is resolved against the working directory.
    pub fn from_seed_json(json: &str) -> Result<Self, StoreError> {
        Self::from_seed(json, Path::new("."))
    }

    /// Load a seed file; its `puzzle_file` entries are relative to it.
    pub fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::from_seed(&json, path.parent().unwrap_or(Path::new(".")))
    }

    fn from_seed(json: &str, base_dir: &Path) -> Result<Self, StoreError> {
        let seed: SeedFile = serde_json::from_str(json)
            .map_err(|e| StoreError::Unavailable(format!("invalid seed: {e}")))?;
        let store = Self::new();
        for lobby in seed.lobbies {
            let puzzle = seed_puzzle(&lobby, base_dir)
                .map_err(|e| StoreError::Unavailable(format!("lobby {}: {e}", lobby.id)))?;
            store.insert_lobby(lobby.id, &lobby.name, puzzle)?;
            for team in lobby.teams {
                store.insert_team(team.id, lobby.id, &team.name)?;
            }
            for player in lobby.players {
                store.insert_player(&player.session_id, lobby.id, player.team_id, &player.name)?;
            }
        }
        Ok(store)
    }

    pub fn insert_lobby(&self, id: LobbyId, name: &str, puzzle: Puzzle) -> Result<(), StoreError> {
        self.write()?.lobbies.insert(
            id,
            LobbyRecord {
                id,
                name: name.to_string(),
                puzzle,
            },
        );
        Ok(())
    }

    pub fn insert_team(&self, id: TeamId, lobby_id: LobbyId, name: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.lobbies.contains_key(&lobby_id) {
            return Err(StoreError::NotFound(format!("lobby {lobby_id}")));
        }
        tables.teams.insert(
            id,
            TeamRecord {
                id,
                lobby_id,
                name: name.to_string(),
                progress: None,
            },
        );
        tables.next_team_id = tables.next_team_id.max(id + 1);
        Ok(())
    }

    pub fn insert_player(
        &self,
        session_id: &str,
        lobby_id: LobbyId,
        team_id: Option<TeamId>,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.lobbies.contains_key(&lobby_id) {
            return Err(StoreError::NotFound(format!("lobby {lobby_id}")));
        }
        if let Some(team_id) = team_id
            && tables.teams.get(&team_id).map(|t| t.lobby_id) != Some(lobby_id)
        {
            return Err(StoreError::NotFound(format!("team {team_id}")));
        }
        tables.players.insert(
            session_id.to_string(),
            PlayerRecord {
                session_id: session_id.to_string(),
                lobby_id,
                team_id,
                name: name.to_string(),
            },
        );
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

fn team_not_found(team_id: TeamId) -> StoreError {
    StoreError::NotFound(format!("team {team_id}"))
}

fn lobby_not_found(lobby_id: LobbyId) -> StoreError {
    StoreError::NotFound(format!("lobby {lobby_id}"))
}

fn player_not_found(session_id: &str) -> StoreError {
    StoreError::NotFound(format!("player {session_id}"))
}

impl LobbyStore for MemoryStore {
    fn find_lobby(&self, lobby_id: LobbyId) -> Result<LobbyRecord, StoreError> {
        self.read()?
            .lobbies
            .get(&lobby_id)
            .cloned()
            .ok_or_else(|| lobby_not_found(lobby_id))
    }

    fn load_puzzle(&self, lobby_id: LobbyId) -> Result<Puzzle, StoreError> {
        self.find_lobby(lobby_id).map(|l| l.puzzle)
    }

    fn delete_lobby(&self, lobby_id: LobbyId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.lobbies.remove(&lobby_id).is_none() {
            return Err(lobby_not_found(lobby_id));
        }
        tables.teams.retain(|_, t| t.lobby_id != lobby_id);
        tables.players.retain(|_, p| p.lobby_id != lobby_id);
        Ok(())
    }

    fn find_team(&self, team_id: TeamId) -> Result<TeamRecord, StoreError> {
        self.read()?
            .teams
            .get(&team_id)
            .cloned()
            .ok_or_else(|| team_not_found(team_id))
    }

    fn list_teams(&self, lobby_id: LobbyId) -> Result<Vec<TeamRecord>, StoreError> {
        Ok(self
            .read()?
            .teams
            .values()
            .filter(|t| t.lobby_id == lobby_id)
            .cloned()
            .collect())
    }

    fn create_team(&self, lobby_id: LobbyId, name: &str) -> Result<TeamRecord, StoreError> {
        let mut tables = self.write()?;
        if !tables.lobbies.contains_key(&lobby_id) {
            return Err(lobby_not_found(lobby_id));
        }
        let id = tables.next_team_id;
        tables.next_team_id += 1;
        let record = TeamRecord {
            id,
            lobby_id,
            name: name.to_string(),
            progress: None,
        };
        tables.teams.insert(id, record.clone());
        Ok(record)
    }

    fn list_team_members(&self, team_id: TeamId) -> Result<Vec<PlayerRecord>, StoreError> {
        let tables = self.read()?;
        if !tables.teams.contains_key(&team_id) {
            return Err(team_not_found(team_id));
        }
        let mut members: Vec<PlayerRecord> = tables
            .players
            .values()
            .filter(|p| p.team_id == Some(team_id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(members)
    }

    fn load_team_progress(&self, team_id: TeamId) -> Result<Option<TeamProgress>, StoreError> {
        self.read()?
            .teams
            .get(&team_id)
            .map(|t| t.progress.clone())
            .ok_or_else(|| team_not_found(team_id))
    }

    fn save_team_progress(
        &self,
        team_id: TeamId,
        progress: &TeamProgress,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let team = tables
            .teams
            .get_mut(&team_id)
            .ok_or_else(|| team_not_found(team_id))?;
        team.progress = Some(progress.clone());
        Ok(())
    }

    fn clear_team_progress(&self, team_id: TeamId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let team = tables
            .teams
            .get_mut(&team_id)
            .ok_or_else(|| team_not_found(team_id))?;
        team.progress = None;
        Ok(())
    }

    fn find_player(&self, session_id: &str) -> Result<PlayerRecord, StoreError> {
        self.read()?
            .players
            .get(session_id)
            .cloned()
            .ok_or_else(|| player_not_found(session_id))
    }

    fn list_lobby_players(&self, lobby_id: LobbyId) -> Result<Vec<PlayerRecord>, StoreError> {
        let mut players: Vec<PlayerRecord> = self
            .read()?
            .players
            .values()
            .filter(|p| p.lobby_id == lobby_id)
            .cloned()
            .collect();
        players.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(players)
    }

    fn set_player_team(
        &self,
        session_id: &str,
        team_id: Option<TeamId>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let lobby_id = tables
            .players
            .get(session_id)
            .map(|p| p.lobby_id)
            .ok_or_else(|| player_not_found(session_id))?;
        if let Some(team_id) = team_id
            && tables.teams.get(&team_id).map(|t| t.lobby_id) != Some(lobby_id)
        {
            return Err(team_not_found(team_id));
        }
        if let Some(player) = tables.players.get_mut(session_id) {
            player.team_id = team_id;
        }
        Ok(())
    }

    fn remove_player(&self, session_id: &str) -> Result<PlayerRecord, StoreError> {
        self.write()?
            .players
            .remove(session_id)
            .ok_or_else(|| player_not_found(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladder_core::test_helpers::{scenario_puzzle, scenario_puzzle_json};

    fn seeded() -> MemoryStore {
        let json = format!(
            r#"{{"lobbies": [{{
                "id": 1,
                "name": "Friday",
                "puzzle": {},
                "teams": [{{"id": 10, "name": "Red"}}, {{"id": 11, "name": "Blue"}}],
                "players": [
                    {{"session_id": "p1", "name": "Ann", "team_id": 10}},
                    {{"session_id": "p2", "name": "Ben", "team_id": 11}},
                    {{"session_id": "p3", "name": "Cat"}}
                ]
            }}]}}"#,
            scenario_puzzle_json()
        );
        MemoryStore::from_seed_json(&json).unwrap()
    }

    #[test]
    fn seed_loads_lobby_teams_and_players() {
        let store = seeded();
        assert_eq!(store.load_puzzle(1).unwrap(), scenario_puzzle());
        assert_eq!(store.list_teams(1).unwrap().len(), 2);
        assert_eq!(store.list_lobby_players(1).unwrap().len(), 3);
        assert_eq!(store.find_player("p3").unwrap().team_id, None);
    }

    #[test]
    fn seed_rejects_invalid_puzzle() {
        let json = r#"{"lobbies": [{"id": 1, "name": "x", "puzzle": {"ladder": [{"word": "A"}]}}]}"#;
        assert!(matches!(
            MemoryStore::from_seed_json(json),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn seed_file_resolves_puzzle_file_beside_it() {
        let dir = std::env::temp_dir().join(format!("ladder-seed-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("puzzles")).unwrap();
        std::fs::write(dir.join("puzzles/start.json"), scenario_puzzle_json()).unwrap();
        let seed_path = dir.join("seed.json");
        std::fs::write(
            &seed_path,
            r#"{"lobbies": [
                {"id": 1, "name": "Friday", "puzzle_file": "puzzles/start.json"},
                {"id": 2, "name": "Broken", "puzzle_file": "puzzles/missing.json"}
            ]}"#,
        )
        .unwrap();
        let err = MemoryStore::from_seed_file(&seed_path).err().unwrap();
        assert!(err.to_string().contains("lobby 2"));

        std::fs::write(
            &seed_path,
            r#"{"lobbies": [{"id": 1, "name": "Friday", "puzzle_file": "puzzles/start.json"}]}"#,
        )
        .unwrap();
        let store = MemoryStore::from_seed_file(&seed_path).unwrap();
        assert_eq!(store.load_puzzle(1).unwrap(), scenario_puzzle());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn seed_lobby_needs_exactly_one_puzzle_source() {
        let none = r#"{"lobbies": [{"id": 1, "name": "x"}]}"#;
        assert!(matches!(
            MemoryStore::from_seed_json(none),
            Err(StoreError::Unavailable(_))
        ));
        let both = format!(
            r#"{{"lobbies": [{{"id": 1, "name": "x", "puzzle": {}, "puzzle_file": "p.json"}}]}}"#,
            scenario_puzzle_json()
        );
        let err = MemoryStore::from_seed_json(&both).err().unwrap();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn created_team_ids_follow_seeded_ones() {
        let store = seeded();
        let team = store.create_team(1, "Green").unwrap();
        assert_eq!(team.id, 12);
    }

    #[test]
    fn progress_save_load_clear() {
        let store = seeded();
        assert_eq!(store.load_team_progress(10).unwrap(), None);
        let progress = TeamProgress::seeded(&scenario_puzzle(), 5);
        store.save_team_progress(10, &progress).unwrap();
        assert_eq!(store.load_team_progress(10).unwrap(), Some(progress));
        store.clear_team_progress(10).unwrap();
        assert_eq!(store.load_team_progress(10).unwrap(), None);
    }

    #[test]
    fn team_members_follow_assignment() {
        let store = seeded();
        store.set_player_team("p3", Some(10)).unwrap();
        let ids: Vec<String> = store
            .list_team_members(10)
            .unwrap()
            .into_iter()
            .map(|p| p.session_id)
            .collect();
        assert_eq!(ids, vec!["p1", "p3"]);
    }

    #[test]
    fn set_player_team_rejects_foreign_team() {
        let store = seeded();
        store.insert_lobby(2, "Other", scenario_puzzle()).unwrap();
        store.insert_team(20, 2, "Elsewhere").unwrap();
        assert!(matches!(
            store.set_player_team("p1", Some(20)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_lobby_cascades() {
        let store = seeded();
        store.delete_lobby(1).unwrap();
        assert!(store.find_lobby(1).is_err());
        assert!(store.find_team(10).is_err());
        assert!(store.find_player("p1").is_err());
    }

    #[test]
    fn remove_player_then_not_found() {
        let store = seeded();
        let removed = store.remove_player("p2").unwrap();
        assert_eq!(removed.team_id, Some(11));
        assert!(matches!(
            store.find_player("p2"),
            Err(StoreError::NotFound(_))
        ));
    }
}
