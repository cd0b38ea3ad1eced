use crate::types::{FruitKind, Role};

pub const DEFAULT_PORT: u16 = 8000;
pub const AI_TICK_MS: u64 = 250;
pub const KEEPALIVE_INTERVAL_SECS: u64 = 15;

pub const PACMAN_MOVE_INTERVAL_MS: u64 = 150;
pub const GHOST_MOVE_INTERVAL_MS: u64 = 180;
pub const GHOST_FRIGHTENED_MOVE_INTERVAL_MS: u64 = 300;
pub const GHOST_TUNNEL_MOVE_INTERVAL_MS: u64 = 360;

pub const PELLET_POINTS: u32 = 10;
pub const POWER_PELLET_POINTS: u32 = 50;
pub const POWER_DURATION_MS: u64 = 8_000;
pub const POWER_FLASH_WINDOW_MS: u64 = 2_000;
pub const GHOST_COMBO_POINTS: [u32; 3] = [200, 400, 800];

pub const STARTING_LIVES: i32 = 3;

pub const FRUIT_PELLET_THRESHOLD: u32 = 70;
pub const FRUIT_LIFETIME_MS: u64 = 10_000;

pub const MODE_PERIOD_MS: u64 = 10_000;
pub const AI_GHOST_COUNT: usize = 4;
/// One glyph per AI ghost; the roster never grows past this set.
pub const AI_GHOST_GLYPHS: &str = "123456789";
pub const AMBUSH_OFFSET: (i32, i32) = (4, 0);

pub const GHOSTS_PER_PACMAN: usize = 4;
pub const MAX_PLAYERS: usize = 26;
pub const PLAYER_GLYPHS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// How long a lobby session may hold a role without a game connection or an
/// open lobby socket before the role is released.
pub const ROLE_CLAIM_GRACE_MS: u64 = 30_000;

/// Minimum gap between two accepted moves for a given role and context.
pub fn move_interval_ms(role: Role, in_tunnel: bool, frightened: bool) -> u64 {
    match role {
        Role::PacMan => PACMAN_MOVE_INTERVAL_MS,
        Role::Ghost if in_tunnel => GHOST_TUNNEL_MOVE_INTERVAL_MS,
        Role::Ghost if frightened => GHOST_FRIGHTENED_MOVE_INTERVAL_MS,
        Role::Ghost => GHOST_MOVE_INTERVAL_MS,
    }
}

pub fn ghost_combo_bonus(kills_this_window: u32) -> u32 {
    let idx = (kills_this_window as usize).min(GHOST_COMBO_POINTS.len() - 1);
    GHOST_COMBO_POINTS[idx]
}

pub fn fruit_for_level(level: u32) -> FruitKind {
    let idx = level.saturating_sub(1) as usize;
    FruitKind::ALL[idx.min(FruitKind::ALL.len() - 1)]
}
