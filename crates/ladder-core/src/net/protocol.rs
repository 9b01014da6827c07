use serde::{Deserialize, Serialize};

use super::messages::{
    AlreadySolvedMsg, ClientMessage, ConnectionConfirmedMsg, ConnectionRejectedMsg, GameEndedMsg,
    GameResetMsg, GameStartedMsg, GameWonMsg, GuessRejectedMsg, JoinLobbyMsg, LobbyDeletedMsg,
    MessageType, PlayerConnectedMsg, PlayerDisconnectedMsg, PlayerKickedMsg, RequestStateMsg,
    ServerErrorMsg, ServerMessage, SetDirectionMsg, StateSnapshotMsg, StateUpdateMsg,
    SubmitGuessMsg, TeamChangedMsg, TeamCompletedMsg, TeamPlacedMsg, TeamsAssignedMsg,
    TimerExpiredMsg, WatchLobbyMsg,
};

/// Current protocol version. Clients sending `0` are treated as unversioned.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum frame size in bytes, type prefix included.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Whether a client announcing `version` may talk to this server.
pub fn version_compatible(version: u8) -> bool {
    version == 0 || version == PROTOCOL_VERSION
}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    let msg_type = msg.message_type();
    match msg {
        ClientMessage::JoinLobby(m) => encode_message(msg_type, m),
        ClientMessage::WatchLobby(m) => encode_message(msg_type, m),
        ClientMessage::SubmitGuess(m) => encode_message(msg_type, m),
        ClientMessage::RequestState(m) => encode_message(msg_type, m),
        ClientMessage::SetDirection(m) => encode_message(msg_type, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    let msg_type = msg.message_type();
    match msg {
        ServerMessage::ConnectionConfirmed(m) => encode_message(msg_type, m),
        ServerMessage::ConnectionRejected(m) => encode_message(msg_type, m),
        ServerMessage::StateSnapshot(m) => encode_message(msg_type, m),
        ServerMessage::StateUpdate(m) => encode_message(msg_type, m),
        ServerMessage::AlreadySolved(m) => encode_message(msg_type, m),
        ServerMessage::GuessRejected(m) => encode_message(msg_type, m),
        ServerMessage::TeamCompleted(m) => encode_message(msg_type, m),
        ServerMessage::TeamPlaced(m) => encode_message(msg_type, m),
        ServerMessage::GameStarted(m) => encode_message(msg_type, m),
        ServerMessage::GameWon(m) => encode_message(msg_type, m),
        ServerMessage::GameEnded(m) => encode_message(msg_type, m),
        ServerMessage::GameReset(m) => encode_message(msg_type, m),
        ServerMessage::TimerExpired(m) => encode_message(msg_type, m),
        ServerMessage::PlayerKicked(m) => encode_message(msg_type, m),
        ServerMessage::TeamChanged(m) => encode_message(msg_type, m),
        ServerMessage::TeamsAssigned(m) => encode_message(msg_type, m),
        ServerMessage::PlayerConnected(m) => encode_message(msg_type, m),
        ServerMessage::PlayerDisconnected(m) => encode_message(msg_type, m),
        ServerMessage::LobbyDeleted(m) => encode_message(msg_type, m),
        ServerMessage::ServerError(m) => encode_message(msg_type, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::EmptyMessage);
    };
    MessageType::from_byte(first).ok_or(ProtocolError::UnknownMessageType(first))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::JoinLobby => Ok(ClientMessage::JoinLobby(decode_payload::<JoinLobbyMsg>(
            data,
        )?)),
        MessageType::WatchLobby => Ok(ClientMessage::WatchLobby(
            decode_payload::<WatchLobbyMsg>(data)?,
        )),
        MessageType::SubmitGuess => Ok(ClientMessage::SubmitGuess(decode_payload::<
            SubmitGuessMsg,
        >(data)?)),
        MessageType::RequestState => Ok(ClientMessage::RequestState(decode_payload::<
            RequestStateMsg,
        >(data)?)),
        MessageType::SetDirection => Ok(ClientMessage::SetDirection(decode_payload::<
            SetDirectionMsg,
        >(data)?)),
        other => Err(ProtocolError::UnknownMessageType(other as u8)),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    let msg = match msg_type {
        MessageType::ConnectionConfirmed => {
            ServerMessage::ConnectionConfirmed(decode_payload::<ConnectionConfirmedMsg>(data)?)
        },
        MessageType::ConnectionRejected => {
            ServerMessage::ConnectionRejected(decode_payload::<ConnectionRejectedMsg>(data)?)
        },
        MessageType::StateSnapshot => {
            ServerMessage::StateSnapshot(Box::new(decode_payload::<StateSnapshotMsg>(data)?))
        },
        MessageType::StateUpdate => {
            ServerMessage::StateUpdate(decode_payload::<StateUpdateMsg>(data)?)
        },
        MessageType::AlreadySolved => {
            ServerMessage::AlreadySolved(decode_payload::<AlreadySolvedMsg>(data)?)
        },
        MessageType::GuessRejected => {
            ServerMessage::GuessRejected(decode_payload::<GuessRejectedMsg>(data)?)
        },
        MessageType::TeamCompleted => {
            ServerMessage::TeamCompleted(decode_payload::<TeamCompletedMsg>(data)?)
        },
        MessageType::TeamPlaced => {
            ServerMessage::TeamPlaced(decode_payload::<TeamPlacedMsg>(data)?)
        },
        MessageType::GameStarted => {
            ServerMessage::GameStarted(decode_payload::<GameStartedMsg>(data)?)
        },
        MessageType::GameWon => ServerMessage::GameWon(decode_payload::<GameWonMsg>(data)?),
        MessageType::GameEnded => ServerMessage::GameEnded(decode_payload::<GameEndedMsg>(data)?),
        MessageType::GameReset => ServerMessage::GameReset(decode_payload::<GameResetMsg>(data)?),
        MessageType::TimerExpired => {
            ServerMessage::TimerExpired(decode_payload::<TimerExpiredMsg>(data)?)
        },
        MessageType::PlayerKicked => {
            ServerMessage::PlayerKicked(decode_payload::<PlayerKickedMsg>(data)?)
        },
        MessageType::TeamChanged => {
            ServerMessage::TeamChanged(decode_payload::<TeamChangedMsg>(data)?)
        },
        MessageType::TeamsAssigned => {
            ServerMessage::TeamsAssigned(decode_payload::<TeamsAssignedMsg>(data)?)
        },
        MessageType::PlayerConnected => {
            ServerMessage::PlayerConnected(decode_payload::<PlayerConnectedMsg>(data)?)
        },
        MessageType::PlayerDisconnected => {
            ServerMessage::PlayerDisconnected(decode_payload::<PlayerDisconnectedMsg>(data)?)
        },
        MessageType::LobbyDeleted => {
            ServerMessage::LobbyDeleted(decode_payload::<LobbyDeletedMsg>(data)?)
        },
        MessageType::ServerError => {
            ServerMessage::ServerError(decode_payload::<ServerErrorMsg>(data)?)
        },
        other => return Err(ProtocolError::UnknownMessageType(other as u8)),
    };
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::LobbyPhase;
    use crate::net::messages::{RejectReason, StepView, TeamMember, TeamView};
    use crate::player::Direction;

    #[test]
    fn join_lobby_roundtrip() {
        let msg = ClientMessage::JoinLobby(JoinLobbyMsg {
            player_session_id: "sess-abc".to_string(),
            protocol_version: PROTOCOL_VERSION,
        });
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(encoded[0], MessageType::JoinLobby as u8);
        assert_eq!(decode_client_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn negative_word_index_survives_decoding() {
        let msg = ClientMessage::SubmitGuess(SubmitGuessMsg {
            word_index: -3,
            guess: "stare".to_string(),
        });
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(decode_client_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn decode_submit_guess_from_js_encoding() {
        // Browser clients encode payloads as named maps.
        #[derive(Serialize)]
        struct JsGuess<'a> {
            word_index: i64,
            guess: &'a str,
        }
        let payload = rmp_serde::to_vec_named(&JsGuess {
            word_index: 2,
            guess: "SHARE",
        })
        .unwrap();
        let mut data = vec![MessageType::SubmitGuess as u8];
        data.extend_from_slice(&payload);

        match decode_client_message(&data).unwrap() {
            ClientMessage::SubmitGuess(m) => {
                assert_eq!(m.word_index, 2);
                assert_eq!(m.guess, "SHARE");
            },
            other => panic!("expected SubmitGuess, got {other:?}"),
        }
    }

    #[test]
    fn set_direction_roundtrip() {
        let msg = ClientMessage::SetDirection(SetDirectionMsg {
            direction: Direction::Up,
        });
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(decode_client_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn snapshot_with_hidden_words_roundtrip() {
        let team = TeamView {
            team_id: 7,
            team_name: "Team Alpha".to_string(),
            puzzle_title: "Start to Final".to_string(),
            steps: vec![
                StepView {
                    index: 0,
                    word: Some("START".to_string()),
                    clue: None,
                    transform: None,
                },
                StepView {
                    index: 1,
                    word: None,
                    clue: Some("look hard".to_string()),
                    transform: Some("T->E".to_string()),
                },
            ],
            revealed_steps: vec![0],
            is_completed: false,
            last_updated_at: 1_700_000_000_000,
            active_step: 1,
            placement: None,
            members: vec![TeamMember {
                player_session_id: "p1".to_string(),
                name: "Ann".to_string(),
                connected: true,
            }],
        };
        let msg = ServerMessage::StateSnapshot(Box::new(StateSnapshotMsg {
            lobby_id: 3,
            phase: LobbyPhase::InProgress,
            winning_team_id: None,
            winning_team_name: None,
            team: Some(team),
            teams: vec![],
            timer_ends_at: Some(1_700_000_060_000),
            results: vec![],
        }));
        let encoded = encode_server_message(&msg).unwrap();
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn guess_rejected_carries_reason() {
        let msg = ServerMessage::GuessRejected(GuessRejectedMsg {
            word_index: 9,
            reason: RejectReason::GameNotActive,
        });
        let encoded = encode_server_message(&msg).unwrap();
        match decode_server_message(&encoded).unwrap() {
            ServerMessage::GuessRejected(m) => assert_eq!(m.reason, RejectReason::GameNotActive),
            other => panic!("expected GuessRejected, got {other:?}"),
        }
    }

    #[test]
    fn decode_empty_message_fails() {
        assert!(matches!(
            decode_client_message(&[]),
            Err(ProtocolError::EmptyMessage)
        ));
    }

    #[test]
    fn decode_unknown_type_fails() {
        assert!(matches!(
            decode_server_message(&[0xFF, 0x90]),
            Err(ProtocolError::UnknownMessageType(0xFF))
        ));
    }

    #[test]
    fn decode_client_msg_with_server_type_fails() {
        let encoded = encode_server_message(&ServerMessage::GameReset(GameResetMsg {
            lobby_id: 1,
        }))
        .unwrap();
        assert!(matches!(
            decode_client_message(&encoded),
            Err(ProtocolError::UnknownMessageType(0x1B))
        ));
    }

    #[test]
    fn decode_server_msg_with_client_type_fails() {
        let encoded =
            encode_client_message(&ClientMessage::RequestState(RequestStateMsg {})).unwrap();
        assert!(decode_server_message(&encoded).is_err());
    }

    #[test]
    fn garbage_payload_is_deserialize_error() {
        assert!(matches!(
            decode_client_message(&[MessageType::SubmitGuess as u8, 0xC1]),
            Err(ProtocolError::DeserializeError(_))
        ));
    }

    #[test]
    fn message_type_from_byte_matches_discriminant() {
        for b in 0u8..=0xFF {
            if let Some(t) = MessageType::from_byte(b) {
                assert_eq!(t as u8, b);
                assert_eq!(t.is_client_message(), b < 0x10);
            }
        }
        assert!(MessageType::from_byte(0x00).is_none());
        assert!(MessageType::from_byte(0x06).is_none());
    }

    #[test]
    fn wire_names_are_unique() {
        let names: std::collections::HashSet<&str> = (0u8..=0xFF)
            .filter_map(MessageType::from_byte)
            .map(MessageType::wire_name)
            .collect();
        let count = (0u8..=0xFF).filter_map(MessageType::from_byte).count();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn payload_too_large_rejected() {
        let big = ServerErrorMsg {
            message: "x".repeat(MAX_MESSAGE_SIZE),
        };
        assert!(matches!(
            encode_message(MessageType::ServerError, &big),
            Err(ProtocolError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn version_zero_is_accepted() {
        assert!(version_compatible(0));
        assert!(version_compatible(PROTOCOL_VERSION));
        assert!(!version_compatible(PROTOCOL_VERSION + 1));
    }

    #[test]
    fn protocol_error_display() {
        assert_eq!(ProtocolError::EmptyMessage.to_string(), "empty message");
        assert_eq!(
            ProtocolError::UnknownMessageType(0xAB).to_string(),
            "unknown message type: 0xab"
        );
    }
}
