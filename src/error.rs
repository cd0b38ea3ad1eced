//! Error types for layout loading, engine bookkeeping and lobby negotiation.

use thiserror::Error;

use crate::types::{Role, SessionId, Vec2};

/// Raised while validating a maze layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("maze layout has no rows")]
    Empty,

    #[error("row {row} has width {found}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown cell symbol {symbol:?} at ({x}, {y})")]
    UnknownSymbol { symbol: char, x: i32, y: i32 },

    #[error("{what} at ({}, {}) is not walkable", at.x, at.y)]
    BlockedAnchor { what: &'static str, at: Vec2 },

    #[error("layout defines no {0}")]
    MissingAnchors(&'static str),
}

/// Invariant violations between the connection layer and the engine. These
/// point at a broken session mapping, never at bad client input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("session {0} has no entity in the engine")]
    UnknownSession(SessionId),

    #[error("session {0} already controls an entity")]
    DuplicateSession(SessionId),

    #[error("all {0} player glyphs are in use")]
    RosterFull(usize),
}

/// Rejections answered on the lobby channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LobbyError {
    #[error("session {0} is not registered in the lobby")]
    UnknownSession(SessionId),

    #[error("{0} is not available right now")]
    RoleUnavailable(Role),

    #[error("role already chosen as {0}")]
    RoleAlreadyChosen(Role),
}
