use serde_json::{json, Value};

use crate::lobby::LobbyView;
use crate::types::{Direction, GameSnapshot, Role, SessionId};

#[derive(Debug, PartialEq, Eq)]
pub enum GameClientMessage {
    Move { direction: Direction },
    Restart,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LobbyClientMessage {
    SelectRole { role: Role },
}

/// Accepts `{type:"move", direction}`, `{type:"restart"}` and the bare text
/// forms `up`, `down`, `left`, `right`, `restart`.
pub fn parse_game_message(raw: &str) -> Option<GameClientMessage> {
    let trimmed = raw.trim();
    if let Some(message) = parse_bare_command(trimmed) {
        return Some(message);
    }

    let value: Value = serde_json::from_str(trimmed).ok()?;
    let object = value.as_object()?;
    match object.get("type")?.as_str()? {
        "move" => {
            let direction = Direction::parse_move(object.get("direction")?.as_str()?)?;
            Some(GameClientMessage::Move { direction })
        }
        "restart" => Some(GameClientMessage::Restart),
        _ => None,
    }
}

fn parse_bare_command(raw: &str) -> Option<GameClientMessage> {
    if raw == "restart" {
        return Some(GameClientMessage::Restart);
    }
    Direction::parse_move(raw).map(|direction| GameClientMessage::Move { direction })
}

pub fn parse_lobby_message(raw: &str) -> Option<LobbyClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let role = Role::parse(value.as_object()?.get("role")?.as_str()?)?;
    Some(LobbyClientMessage::SelectRole { role })
}

pub fn game_state_message(snapshot: &GameSnapshot) -> Value {
    json!({
        "type": "game_state",
        "board": snapshot.board,
        "scores": snapshot.scores,
        "info": snapshot.info,
        "power_status": snapshot.power_status,
        "game_over": snapshot.game_over,
    })
}

pub fn ping_message() -> Value {
    json!({ "type": "ping" })
}

pub fn game_error_message(message: &str) -> Value {
    json!({
        "type": "error",
        "message": message,
    })
}

pub fn lobby_view_message(view: &LobbyView) -> Value {
    serde_json::to_value(view).unwrap_or_else(|_| json!({}))
}

pub fn start_game_message(session_id: &SessionId) -> Value {
    json!({
        "start_game": true,
        "session_id": session_id,
    })
}

pub fn lobby_error_message(message: &str) -> Value {
    json!({ "error": message })
}
