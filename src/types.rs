use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Role {
    #[serde(rename = "Pac-Man")]
    PacMan,
    #[serde(rename = "Ghost")]
    Ghost,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pac-Man" => Some(Self::PacMan),
            "Ghost" => Some(Self::Ghost),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::PacMan => "Pac-Man",
            Role::Ghost => "Ghost",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostBehavior {
    Chase,
    Ambush,
    Random,
    Patrol,
}

impl GhostBehavior {
    pub const ROTATION: [GhostBehavior; 4] = [
        GhostBehavior::Chase,
        GhostBehavior::Ambush,
        GhostBehavior::Random,
        GhostBehavior::Patrol,
    ];

    pub fn for_roster_index(index: usize) -> Self {
        Self::ROTATION[index % Self::ROTATION.len()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostMode {
    Scatter,
    Chase,
}

impl GhostMode {
    pub fn flipped(self) -> Self {
        match self {
            GhostMode::Scatter => GhostMode::Chase,
            GhostMode::Chase => GhostMode::Scatter,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FruitKind {
    Cherry,
    Strawberry,
    Orange,
    Apple,
    Melon,
}

impl FruitKind {
    pub const ALL: [FruitKind; 5] = [
        FruitKind::Cherry,
        FruitKind::Strawberry,
        FruitKind::Orange,
        FruitKind::Apple,
        FruitKind::Melon,
    ];

    pub fn points(self) -> u32 {
        match self {
            FruitKind::Cherry => 100,
            FruitKind::Strawberry => 300,
            FruitKind::Orange => 500,
            FruitKind::Apple => 700,
            FruitKind::Melon => 1_000,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            FruitKind::Cherry => '%',
            FruitKind::Strawberry => '$',
            FruitKind::Orange => '&',
            FruitKind::Apple => '*',
            FruitKind::Melon => '+',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FruitKind::Cherry => "cherry",
            FruitKind::Strawberry => "strawberry",
            FruitKind::Orange => "orange",
            FruitKind::Apple => "apple",
            FruitKind::Melon => "melon",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    LobbyFilling,
    InProgress,
    Over,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Vec2) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Opaque per-connection handle issued by the lobby.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PowerStatus {
    pub powered: bool,
    pub time_left: u64,
    pub flashing: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameSnapshot {
    pub board: String,
    pub scores: String,
    pub info: String,
    pub power_status: BTreeMap<String, PowerStatus>,
    pub game_over: bool,
}
