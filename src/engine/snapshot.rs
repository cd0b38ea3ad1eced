use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use super::*;

use crate::constants::{FRUIT_LIFETIME_MS, POWER_FLASH_WINDOW_MS};
use crate::types::{GameSnapshot, PowerStatus};

impl GameEngine {
    pub fn build_snapshot(&self, now_ms: u64) -> GameSnapshot {
        GameSnapshot {
            board: self.render_board(),
            scores: self.render_scores(),
            info: self.render_info(now_ms),
            power_status: self.power_status(now_ms),
            game_over: self.is_game_over(),
        }
    }

    /// Grid first, then fruits, AI ghosts, player ghosts and finally living
    /// Pac-Men on top.
    fn render_board(&self) -> String {
        let mut rows = self.world.render_rows();
        let mut stamp = |pos: Vec2, glyph: char| {
            if !self.world.in_bounds(pos.x, pos.y) {
                return;
            }
            rows[pos.y as usize][pos.x as usize] = glyph;
        };

        for fruit in &self.fruits {
            stamp(fruit.pos, fruit.kind.glyph());
        }
        for ghost in &self.ai_ghosts {
            stamp(ghost.pos, ghost.glyph);
        }
        for player in self.players.iter().filter(|p| p.is_living(Role::Ghost)) {
            stamp(player.pos, player.glyph);
        }
        for player in self.players.iter().filter(|p| p.is_living(Role::PacMan)) {
            stamp(player.pos, player.glyph);
        }

        rows.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_scores(&self) -> String {
        if self.players.is_empty() {
            return "No players connected".to_string();
        }
        let mut ranked: Vec<&Player> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));

        ranked
            .iter()
            .map(|player| {
                let mut line = format!("{} {:<7} {:>6}", player.glyph, player.role.label(), player.score);
                if player.role == Role::PacMan {
                    if player.alive {
                        let _ = write!(line, "  lives {}", player.lives);
                    } else {
                        line.push_str("  out");
                    }
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_info(&self, now_ms: u64) -> String {
        let mut lines = Vec::new();
        match self.round.phase {
            RoundPhase::LobbyFilling => lines.push("Waiting for players".to_string()),
            RoundPhase::InProgress | RoundPhase::Over => {
                lines.push(format!("Level {}", self.round.level));
                let mode = match self.round.mode {
                    GhostMode::Scatter => "scatter",
                    GhostMode::Chase => "chase",
                };
                if self.any_pacman_powered(now_ms) {
                    lines.push(format!("Ghosts: {mode}, frightened"));
                } else {
                    lines.push(format!("Ghosts: {mode}"));
                }
                lines.push(format!(
                    "Pellets left: {}",
                    self.world.count_remaining_pellets()
                ));
                for fruit in &self.fruits {
                    let left_ms = (fruit.spawned_at + FRUIT_LIFETIME_MS).saturating_sub(now_ms);
                    lines.push(format!(
                        "Fruit: {} ({} pts) for {}s",
                        fruit.kind.name(),
                        fruit.points,
                        left_ms.div_ceil(1_000)
                    ));
                }
                if let Some(started) = DateTime::<Utc>::from_timestamp_millis(self.round.started_at_ms as i64) {
                    lines.push(format!("Round started {}", started.format("%H:%M:%S UTC")));
                }
            }
        }

        if self.round.phase == RoundPhase::Over {
            lines.push(self.winner_line());
            lines.push("Send restart to play again".to_string());
        }
        lines.join("\n")
    }

    fn winner_line(&self) -> String {
        let Some(session) = self.round.winner.as_ref() else {
            return "GAME OVER - no winner".to_string();
        };
        match self.player(session) {
            Some(winner) => format!(
                "GAME OVER - winner {} ({}, {} pts)",
                winner.glyph, winner.role, winner.score
            ),
            None => "GAME OVER - the winner has left".to_string(),
        }
    }

    fn power_status(&self, now_ms: u64) -> BTreeMap<String, PowerStatus> {
        self.players
            .iter()
            .filter(|player| player.role == Role::PacMan)
            .map(|player| {
                let powered = player.is_powered(now_ms);
                let left_ms = if powered {
                    player.power_until - now_ms
                } else {
                    0
                };
                let status = PowerStatus {
                    powered,
                    time_left: left_ms.div_ceil(1_000),
                    flashing: powered && left_ms <= POWER_FLASH_WINDOW_MS,
                };
                (player.glyph.to_string(), status)
            })
            .collect()
    }
}
