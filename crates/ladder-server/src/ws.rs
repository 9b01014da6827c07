use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::FromRequest;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use ladder_core::net::messages::{
    ClientMessage, ConnectionConfirmedMsg, ConnectionRejectedMsg, ServerErrorMsg, ServerMessage,
};
use ladder_core::net::protocol::{
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, decode_client_message, encode_server_message,
    version_compatible,
};
use ladder_core::player::Affiliation;

use crate::auth::{AuthError, authenticate_admin, authenticate_player};
use crate::registry::{ConnectionHandle, ConnectionId};
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let ws = WebSocketUpgrade::from_request(request, &state)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(affiliation) = admit(&mut ws_sender, &mut ws_receiver, &state).await else {
        return;
    };

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.connection_buffer);
    // The confirmation is queued before any broadcast can reach the connection
    let handle = state
        .registry
        .register_with_greeting(&affiliation, tx, |connection_id| {
            confirmation(&affiliation, connection_id)
        })
        .await;
    let coordinator = &state.coordinator;
    spawn_writer(ws_sender, rx);

    tracing::info!(
        lobby_id = affiliation.lobby_id,
        team_id = ?affiliation.team_id,
        player_session_id = %affiliation.player_session_id,
        connection_id = handle.connection_id,
        role = ?affiliation.role,
        "Connection admitted"
    );

    coordinator.on_connected(&handle).await;
    send_snapshot(&state, &handle).await;

    read_loop(&mut ws_receiver, &state, &handle).await;

    // A retired handle (superseded, kicked, dropped) already left silently
    if let Some(departure) = state.registry.unregister(&handle).await {
        coordinator.on_disconnected(&departure).await;
    }
    tracing::debug!(
        lobby_id = handle.lobby_id,
        connection_id = handle.connection_id,
        "Connection closed"
    );
}

fn confirmation(affiliation: &Affiliation, connection_id: ConnectionId) -> Option<Bytes> {
    let confirmed = ServerMessage::ConnectionConfirmed(ConnectionConfirmedMsg {
        connection_id,
        player_session_id: affiliation.player_session_id.clone(),
        lobby_id: affiliation.lobby_id,
        team_id: affiliation.team_id,
        role: affiliation.role,
    });
    match encode_server_message(&confirmed) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            tracing::error!(connection_id, error = %e, "Failed to encode connection_confirmed");
            None
        },
    }
}

/// Read the first frame and turn its credential into an affiliation.
/// Anything else is answered with `connection_rejected` and the socket closes.
async fn admit(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    ws_receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Option<Affiliation> {
    let timeout = Duration::from_secs(state.config.limits.join_timeout_secs);
    let first_msg = match tokio::time::timeout(timeout, ws_receiver.next()).await {
        Ok(Some(Ok(Message::Binary(data)))) => data,
        Ok(_) => return None,
        Err(_) => {
            tracing::debug!("No join frame before timeout");
            send_rejection(ws_sender, "Join timeout").await;
            return None;
        },
    };

    if first_msg.len() > MAX_MESSAGE_SIZE {
        send_rejection(ws_sender, "Join frame too large").await;
        return None;
    }

    let client_msg = match decode_client_message(&first_msg) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed join frame");
            send_rejection(ws_sender, "Malformed join frame").await;
            return None;
        },
    };

    let (version, result) = match client_msg {
        ClientMessage::JoinLobby(join) => (
            join.protocol_version,
            authenticate_player(state.store.as_ref(), &join.player_session_id),
        ),
        ClientMessage::WatchLobby(watch) => (
            watch.protocol_version,
            authenticate_admin(
                &state.auth,
                state.store.as_ref(),
                &watch.admin_token,
                watch.lobby_id,
            ),
        ),
        other => {
            tracing::debug!(
                message = other.message_type().wire_name(),
                "Expected join_lobby or watch_lobby"
            );
            send_rejection(ws_sender, "Expected join_lobby or watch_lobby").await;
            return None;
        },
    };

    if !version_compatible(version) {
        send_rejection(
            ws_sender,
            &format!("Protocol version mismatch: client={version}, server={PROTOCOL_VERSION}"),
        )
        .await;
        return None;
    }

    match result {
        Ok(affiliation) => Some(affiliation),
        Err(e) => {
            match e {
                AuthError::Unavailable(ref cause) => {
                    tracing::error!(error = %cause, "Authentication backend unavailable");
                },
                _ => tracing::info!(error = %e, "Connection rejected"),
            }
            send_rejection(ws_sender, &e.to_string()).await;
            None
        },
    }
}

async fn send_rejection(ws_sender: &mut SplitSink<WebSocket, Message>, error: &str) {
    let msg = ServerMessage::ConnectionRejected(ConnectionRejectedMsg {
        error: error.to_string(),
    });
    match encode_server_message(&msg) {
        Ok(data) => {
            if let Err(e) = ws_sender.send(Message::Binary(data.into())).await {
                tracing::warn!(error = %e, "Failed to send connection rejection");
                return;
            }
        },
        Err(e) => tracing::warn!(error = %e, "Failed to encode connection rejection"),
    }
    let _ = ws_sender.send(Message::Close(None)).await;
}

/// Drain the outbound queue onto the socket. When the registry drops the
/// sender the queue ends and the socket is closed.
fn spawn_writer(mut ws_sender: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Bytes>) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
    handle: &ConnectionHandle,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);
    let connection_id = handle.connection_id;

    loop {
        let next = tokio::select! {
            _ = handle.cancel.cancelled() => {
                tracing::debug!(connection_id, "Connection retired, stopping reader");
                break;
            },
            next = ws_receiver.next() => next,
        };

        let data = match next {
            Some(Ok(Message::Binary(d))) => d,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(connection_id, "Rate limited");
            continue;
        }

        if data.len() > MAX_MESSAGE_SIZE {
            tracing::warn!(connection_id, size = data.len(), "Oversized frame dropped");
            continue;
        }

        let msg = match decode_client_message(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(connection_id, error = %e, "Undecodable client frame");
                continue;
            },
        };

        dispatch(state, handle, msg).await;
    }
}

async fn dispatch(state: &AppState, handle: &ConnectionHandle, msg: ClientMessage) {
    let coordinator = &state.coordinator;
    match msg {
        ClientMessage::SubmitGuess(guess) => {
            // Failures were already reported to the submitter and logged
            let _ = coordinator
                .submit_guess(handle, guess.word_index, &guess.guess)
                .await;
        },
        ClientMessage::RequestState(_) => send_snapshot(state, handle).await,
        ClientMessage::SetDirection(set) => {
            if state.registry.set_direction(handle, set.direction).await {
                send_snapshot(state, handle).await;
            }
        },
        ClientMessage::JoinLobby(_) | ClientMessage::WatchLobby(_) => {
            tracing::debug!(
                connection_id = handle.connection_id,
                "Ignoring repeated join on admitted connection"
            );
        },
    }
}

async fn send_snapshot(state: &AppState, handle: &ConnectionHandle) {
    let coordinator = &state.coordinator;
    if let Err(e) = coordinator.resync(handle).await {
        tracing::warn!(
            lobby_id = handle.lobby_id,
            connection_id = handle.connection_id,
            error = %e,
            "Resync failed"
        );
        let msg = ServerMessage::ServerError(ServerErrorMsg {
            message: e.to_string(),
        });
        coordinator.router().send_to_connection(handle, &msg).await;
    }
}
