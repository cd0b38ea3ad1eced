use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use maze_chase_server::config::ServerConfig;
use maze_chase_server::constants::{KEEPALIVE_INTERVAL_SECS, ROLE_CLAIM_GRACE_MS};
use maze_chase_server::engine::{now_ms, GameEngine, GameEngineOptions, MoveOutcome};
use maze_chase_server::error::EngineError;
use maze_chase_server::lobby::Lobby;
use maze_chase_server::server_protocol::{
    game_error_message, game_state_message, lobby_error_message, lobby_view_message,
    parse_game_message, parse_lobby_message, ping_message, start_game_message, GameClientMessage,
    LobbyClientMessage,
};
use maze_chase_server::types::{RoundPhase, SessionId};
use maze_chase_server::world::MazeLayout;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tower_http::services::ServeFile;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const CLIENT_QUEUE_CAPACITY: usize = 256;
const POLICY_VIOLATION: u16 = 1008;

type SharedState = Arc<Mutex<ServerState>>;
type ClientMap = HashMap<String, ClientContext>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    session_id: SessionId,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    engine: GameEngine,
    lobby: Lobby,
    game_clients: ClientMap,
    lobby_clients: ClientMap,
}

impl ServerState {
    fn new(engine: GameEngine) -> Self {
        Self {
            engine,
            lobby: Lobby::new(),
            game_clients: HashMap::new(),
            lobby_clients: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GameQuery {
    session_id: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maze_chase_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::parse();
    let seed = config.seed.unwrap_or_else(|| now_ms() as u32);
    let engine = GameEngine::new(
        MazeLayout::classic(),
        GameEngineOptions {
            seed,
            ..GameEngineOptions::default()
        },
        now_ms(),
    )
    .expect("built-in maze layout is valid");

    let state = Arc::new(Mutex::new(ServerState::new(engine)));
    start_tick_loop(state.clone(), config.tick_ms());

    if !config.index_file.is_file() {
        warn!(path = %config.index_file.display(), "client page not found");
    }
    let app = Router::new()
        .route_service("/", ServeFile::new(&config.index_file))
        .route("/healthz", get(healthz))
        .route("/ws", get(game_ws_handler))
        .route("/lobby", get(lobby_ws_handler))
        .with_state(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!(port = config.port, seed, tick_ms = config.tick_ms(), "listening");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn game_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<GameQuery>,
) -> impl IntoResponse {
    let session_id = query.session_id.map(SessionId::new);
    ws.on_upgrade(move |socket| handle_game_socket(state, socket, session_id))
}

async fn lobby_ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_lobby_socket(state, socket))
}

async fn handle_game_socket(state: SharedState, socket: WebSocket, session_id: Option<SessionId>) {
    let client_id = make_id("game");
    let (tx, rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);
    let (ws_sender, mut ws_receiver) = socket.split();
    let writer = spawn_writer(ws_sender, rx);

    let session_id = {
        let mut guard = state.lock().await;
        attach_game_client(&mut guard, &client_id, tx.clone(), session_id)
    };
    let Some(session_id) = session_id else {
        drop(tx);
        let _ = writer.await;
        return;
    };
    let keepalive = spawn_keepalive(tx.clone());

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_game_message(&state, &session_id, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = std::str::from_utf8(&raw) {
                    handle_game_message(&state, &session_id, text).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    keepalive.abort();
    {
        let mut guard = state.lock().await;
        detach_game_client(&mut guard, &client_id, &session_id);
    }
    drop(tx);
    let _ = writer.await;
}

/// Binds a game connection to the entity its lobby role describes. On any
/// handshake failure the client gets an error followed by a close frame. A
/// join the engine refuses for capacity also releases the lobby role.
fn attach_game_client(
    state: &mut ServerState,
    client_id: &str,
    tx: mpsc::Sender<OutboundMessage>,
    session_id: Option<SessionId>,
) -> Option<SessionId> {
    let Some(session_id) = session_id else {
        reject_game_client(&tx, "missing session_id");
        return None;
    };
    let Some(role) = state.lobby.role_of(&session_id) else {
        reject_game_client(&tx, "unknown session or no role selected");
        return None;
    };

    let now = now_ms();
    match state.engine.join(session_id.clone(), role, now) {
        Ok(glyph) => {
            info!(client_id, session = %session_id, %glyph, "game client attached");
            state.game_clients.insert(
                client_id.to_string(),
                ClientContext {
                    tx,
                    session_id: session_id.clone(),
                },
            );
            broadcast_state(state, now);
            Some(session_id)
        }
        Err(err @ EngineError::DuplicateSession(_)) => {
            warn!(client_id, %err, "second game connection for a session");
            reject_game_client(&tx, &err.to_string());
            None
        }
        Err(err) => {
            warn!(client_id, session = %session_id, %err, "engine rejected join");
            reject_game_client(&tx, &err.to_string());
            state.lobby.remove(&session_id);
            broadcast_lobby(state);
            None
        }
    }
}

fn reject_game_client(tx: &mpsc::Sender<OutboundMessage>, reason: &str) {
    let _ = tx.try_send(OutboundMessage::Text(game_error_message(reason).to_string()));
    let _ = tx.try_send(OutboundMessage::Close {
        code: POLICY_VIOLATION,
        reason: reason.to_string(),
    });
}

fn detach_game_client(state: &mut ServerState, client_id: &str, session_id: &SessionId) {
    state.game_clients.remove(client_id);
    if state.engine.leave(session_id) {
        info!(client_id, session = %session_id, "game client detached");
    }
    state.lobby.remove(session_id);
    broadcast_state(state, now_ms());
    broadcast_lobby(state);
}

async fn handle_game_message(state: &SharedState, session_id: &SessionId, raw: &str) {
    let Some(message) = parse_game_message(raw) else {
        debug!(session = %session_id, "ignored game message");
        return;
    };

    let mut guard = state.lock().await;
    let now = now_ms();
    match message {
        GameClientMessage::Move { direction } => {
            match guard.engine.attempt_move(session_id, direction, now) {
                Ok(MoveOutcome::Moved) => broadcast_state(&mut guard, now),
                Ok(outcome) => debug!(session = %session_id, ?outcome, "move not applied"),
                Err(err) => error!(%err, "move for unmapped session"),
            }
        }
        GameClientMessage::Restart => {
            if guard.engine.restart(now) {
                broadcast_state(&mut guard, now);
            } else {
                debug!(session = %session_id, "restart ignored while round is running");
            }
        }
    }
}

async fn handle_lobby_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("lobby");
    let session_id = SessionId::new(make_session_token());
    let (tx, rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);
    let (ws_sender, mut ws_receiver) = socket.split();
    let writer = spawn_writer(ws_sender, rx);

    {
        let mut guard = state.lock().await;
        guard.lobby.register(session_id.clone());
        guard.lobby_clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                session_id: session_id.clone(),
            },
        );
        broadcast_lobby(&mut guard);
    }

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                let mut guard = state.lock().await;
                handle_lobby_message(&mut guard, &client_id, &session_id, raw.as_str());
            }
            Message::Binary(raw) => {
                let text = String::from_utf8_lossy(&raw).into_owned();
                let mut guard = state.lock().await;
                handle_lobby_message(&mut guard, &client_id, &session_id, &text);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        detach_lobby_client(&mut guard, &client_id, &session_id);
    }
    drop(tx);
    let _ = writer.await;
}

fn handle_lobby_message(state: &mut ServerState, client_id: &str, session_id: &SessionId, raw: &str) {
    let Some(LobbyClientMessage::SelectRole { role }) = parse_lobby_message(raw) else {
        send_to_client(
            &mut state.lobby_clients,
            client_id,
            &lobby_error_message("expected {\"role\": \"Pac-Man\" | \"Ghost\"}"),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    };

    match state.lobby.select_role(session_id, role, now_ms()) {
        Ok(()) => {
            send_to_client(
                &mut state.lobby_clients,
                client_id,
                &start_game_message(session_id),
                QueuePolicy::DisconnectOnFull,
            );
            broadcast_lobby(state);
        }
        Err(err) => {
            debug!(session = %session_id, %err, "role rejected");
            send_to_client(
                &mut state.lobby_clients,
                client_id,
                &lobby_error_message(&err.to_string()),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

/// A session that already picked a role stays registered so its game
/// connection can still attach after the lobby page closes. `sweep_lobby`
/// releases it if that connection never arrives.
fn detach_lobby_client(state: &mut ServerState, client_id: &str, session_id: &SessionId) {
    state.lobby_clients.remove(client_id);
    if state.lobby.role_of(session_id).is_none() {
        state.lobby.remove(session_id);
    }
    broadcast_lobby(state);
}

fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    })
}

fn spawn_keepalive(tx: mpsc::Sender<OutboundMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(KEEPALIVE_INTERVAL_SECS);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let payload = ping_message().to_string();
        loop {
            interval.tick().await;
            if let Err(TrySendError::Closed(_)) = tx.try_send(OutboundMessage::Text(payload.clone())) {
                break;
            }
        }
    })
}

fn start_tick_loop(state: SharedState, tick_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_game(&mut guard);
        }
    });
}

fn tick_game(state: &mut ServerState) {
    let now = now_ms();
    sweep_lobby(state, now);
    if state.engine.phase() != RoundPhase::InProgress {
        return;
    }
    state.engine.tick(now);
    broadcast_state(state, now);
}

/// Releases roles held past the grace period by sessions with neither an
/// engine entity nor an open lobby socket.
fn sweep_lobby(state: &mut ServerState, now: u64) {
    let engine = &state.engine;
    let lobby_clients = &state.lobby_clients;
    let expired = state.lobby.expire_unclaimed(now, ROLE_CLAIM_GRACE_MS, |session| {
        engine.player(session).is_some()
            || lobby_clients
                .values()
                .any(|client| &client.session_id == session)
    });
    if !expired.is_empty() {
        broadcast_lobby(state);
    }
}

fn broadcast_state(state: &mut ServerState, now: u64) {
    if state.game_clients.is_empty() {
        return;
    }
    let payload = game_state_message(&state.engine.build_snapshot(now)).to_string();
    fan_out(
        &mut state.game_clients,
        |_| payload.clone(),
        QueuePolicy::DropOnFull,
    );
}

fn broadcast_lobby(state: &mut ServerState) {
    let lobby = &state.lobby;
    fan_out(
        &mut state.lobby_clients,
        |client| lobby_view_message(&lobby.view_for(&client.session_id)).to_string(),
        QueuePolicy::DisconnectOnFull,
    );
}

fn fan_out(
    clients: &mut ClientMap,
    mut payload_for: impl FnMut(&ClientContext) -> String,
    policy: QueuePolicy,
) {
    let mut failed_clients = Vec::new();
    for (client_id, client) in clients.iter() {
        if client
            .tx
            .try_send(OutboundMessage::Text(payload_for(client)))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        drop_client(clients, &client_id);
    }
}

fn send_to_client(clients: &mut ClientMap, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = clients
        .get(client_id)
        .map(|client| {
            client
                .tx
                .try_send(OutboundMessage::Text(message.to_string()))
                .is_err()
        })
        .unwrap_or(false);
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        drop_client(clients, client_id);
    }
}

fn drop_client(clients: &mut ClientMap, client_id: &str) {
    if clients.remove(client_id).is_some() {
        warn!(client_id, "dropping client with a full send queue");
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn make_session_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}
