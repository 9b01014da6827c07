use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use ladder_core::lobby::LobbyId;
use ladder_core::net::messages::{
    ClientMessage, ConnectionConfirmedMsg, JoinLobbyMsg, ServerMessage, StateSnapshotMsg,
    SubmitGuessMsg, WatchLobbyMsg,
};
use ladder_core::net::protocol::{PROTOCOL_VERSION, decode_server_message, encode_client_message};
use ladder_core::test_helpers::scenario_puzzle;

use ladder_server::build_app;
use ladder_server::config::{AuthFileConfig, ServerConfig};
use ladder_server::state::AppState;
use ladder_server::store::{LobbyStore, MemoryStore};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lobby 1 plays `START -> FINAL` with Red (10: a1, a2), Blue (11: b1) and
/// unassigned u1. Lobby 2 has Green (20: x1).
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_lobby(1, "Friday", scenario_puzzle()).unwrap();
    store.insert_team(10, 1, "Red").unwrap();
    store.insert_team(11, 1, "Blue").unwrap();
    store.insert_player("a1", 1, Some(10), "Ann").unwrap();
    store.insert_player("a2", 1, Some(10), "Abe").unwrap();
    store.insert_player("b1", 1, Some(11), "Ben").unwrap();
    store.insert_player("u1", 1, None, "Uma").unwrap();
    store.insert_lobby(2, "Saturday", scenario_puzzle()).unwrap();
    store.insert_team(20, 2, "Green").unwrap();
    store.insert_player("x1", 2, Some(20), "Xia").unwrap();
    store
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with no admin token.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Start a test server whose admin surfaces require `token`.
    pub async fn with_admin_token(token: &str) -> Self {
        let config = ServerConfig {
            auth: AuthFileConfig {
                admin_token: Some(token.to_string()),
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let store = Arc::new(seeded_store());
        let dyn_store: Arc<dyn LobbyStore> = Arc::clone(&store) as Arc<dyn LobbyStore>;
        let (app, state) = build_app(config, dyn_store);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            store,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}/api/v1/admin{path}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Start a lobby's game directly through the coordinator.
    pub async fn start_lobby(&self, lobby_id: LobbyId) {
        self.state.coordinator.start_game(lobby_id, None).await.unwrap();
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a ClientMessage from a WS stream.
pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

pub async fn ws_send_join(stream: &mut WsStream, player_session_id: &str, protocol_version: u8) {
    let msg = ClientMessage::JoinLobby(JoinLobbyMsg {
        player_session_id: player_session_id.to_string(),
        protocol_version,
    });
    ws_send_client_msg(stream, &msg).await;
}

/// Connect and join as a player. Returns the stream after the initial
/// snapshot has been read.
pub async fn ws_join_player(
    server: &TestServer,
    player_session_id: &str,
) -> (WsStream, ConnectionConfirmedMsg, StateSnapshotMsg) {
    let mut stream = ws_connect(&server.ws_url()).await;
    ws_send_join(&mut stream, player_session_id, PROTOCOL_VERSION).await;
    let (confirmed, snapshot) = ws_read_admission(&mut stream).await;
    (stream, confirmed, snapshot)
}

/// Connect and watch a lobby as an admin.
pub async fn ws_watch_lobby(
    server: &TestServer,
    admin_token: &str,
    lobby_id: LobbyId,
) -> (WsStream, ConnectionConfirmedMsg, StateSnapshotMsg) {
    let mut stream = ws_connect(&server.ws_url()).await;
    let msg = ClientMessage::WatchLobby(WatchLobbyMsg {
        admin_token: admin_token.to_string(),
        lobby_id,
        protocol_version: PROTOCOL_VERSION,
    });
    ws_send_client_msg(&mut stream, &msg).await;
    let (confirmed, snapshot) = ws_read_admission(&mut stream).await;
    (stream, confirmed, snapshot)
}

/// `connection_confirmed` first, then anything up to the first snapshot.
async fn ws_read_admission(stream: &mut WsStream) -> (ConnectionConfirmedMsg, StateSnapshotMsg) {
    let confirmed = match ws_read_server_msg(stream).await {
        ServerMessage::ConnectionConfirmed(c) => c,
        other => panic!("Expected ConnectionConfirmed, got: {other:?}"),
    };
    let snapshot = match ws_read_until(stream, "state_snapshot").await {
        ServerMessage::StateSnapshot(s) => *s,
        other => panic!("Expected StateSnapshot, got: {other:?}"),
    };
    (confirmed, snapshot)
}

pub async fn ws_submit_guess(stream: &mut WsStream, word_index: i64, guess: &str) {
    let msg = ClientMessage::SubmitGuess(SubmitGuessMsg {
        word_index,
        guess: guess.to_string(),
    });
    ws_send_client_msg(stream, &msg).await;
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Try to read raw binary data, returning None on timeout.
pub async fn ws_try_read_raw(stream: &mut WsStream, timeout_ms: u64) -> Option<Vec<u8>> {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Read the next ServerMessage from a WebSocket stream (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Skip messages until one with the given wire name arrives.
pub async fn ws_read_until(stream: &mut WsStream, wire_name: &str) -> ServerMessage {
    loop {
        let msg = ws_read_server_msg(stream).await;
        if msg.wire_name() == wire_name {
            return msg;
        }
    }
}

/// Everything that arrives before `quiet_ms` of silence.
pub async fn ws_collect(stream: &mut WsStream, quiet_ms: u64) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Some(data) = ws_try_read_raw(stream, quiet_ms).await {
        out.push(decode_server_message(&data).unwrap());
    }
    out
}

/// Read until the server closes the socket, returning the messages seen first.
pub async fn ws_read_until_closed(stream: &mut WsStream) -> Vec<ServerMessage> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        let mut seen = Vec::new();
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    seen.push(decode_server_message(&data).unwrap());
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return seen,
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for the server to close the socket")
}
