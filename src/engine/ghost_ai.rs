use super::*;

use super::utils::offset;
use crate::constants::{AMBUSH_OFFSET, MODE_PERIOD_MS};

impl GameEngine {
    pub(super) fn update_ghost_mode(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.round.mode_started_ms) < MODE_PERIOD_MS {
            return;
        }
        self.round.mode = self.round.mode.flipped();
        self.round.mode_started_ms = now_ms;
        debug!(mode = ?self.round.mode, "ghost mode flipped");
    }

    /// Moves every AI ghost at most one cell. Frightened ghosts wander,
    /// everyone else walks greedily toward a target.
    pub(super) fn step_ai_ghosts(&mut self, now_ms: u64) {
        let frightened = self.any_pacman_powered(now_ms);
        for ghost_idx in 0..self.ai_ghosts.len() {
            let from = self.ai_ghosts[ghost_idx].pos;
            let next = if frightened {
                self.frightened_step(from)
            } else {
                let target = self.choose_target(ghost_idx);
                self.greedy_step(from, target)
            };
            let Some(next) = next else {
                continue;
            };

            let leaves_pen = !self.world.is_pen_cell(next.x, next.y);
            let ghost = &mut self.ai_ghosts[ghost_idx];
            ghost.pos = next;
            if ghost.in_pen && leaves_pen {
                ghost.in_pen = false;
            }
        }
    }

    pub(super) fn choose_target(&mut self, ghost_idx: usize) -> Vec2 {
        let ghost = &self.ai_ghosts[ghost_idx];
        if ghost.in_pen {
            return self.layout.pen_exit;
        }
        if self.round.mode == GhostMode::Scatter {
            let corners = &self.layout.scatter_corners;
            return corners[ghost.roster_index % corners.len()];
        }

        let (pos, behavior, roster_index) = (ghost.pos, ghost.behavior, ghost.roster_index);
        match behavior {
            GhostBehavior::Chase => self
                .nearest_pacman(pos)
                .unwrap_or_else(|| self.random_cell()),
            GhostBehavior::Ambush => match self.nearest_pacman(pos) {
                Some(pacman) => Vec2::new(pacman.x + AMBUSH_OFFSET.0, pacman.y + AMBUSH_OFFSET.1),
                None => self.random_cell(),
            },
            GhostBehavior::Patrol => {
                let waypoints = &self.layout.patrol_waypoints;
                waypoints[roster_index % waypoints.len()]
            }
            GhostBehavior::Random => self.random_cell(),
        }
    }

    /// Walkable neighbor closest to `target` by manhattan distance. Ties keep
    /// the first direction in up, down, left, right order.
    pub(super) fn greedy_step(&self, from: Vec2, target: Vec2) -> Option<Vec2> {
        Direction::ALL
            .iter()
            .map(|dir| offset(from, *dir))
            .filter(|next| self.world.in_bounds(next.x, next.y) && !self.world.is_wall(next.x, next.y))
            .min_by_key(|next| next.manhattan(target))
    }

    fn frightened_step(&mut self, from: Vec2) -> Option<Vec2> {
        let mut dirs = Direction::ALL;
        self.rng.shuffle(&mut dirs);
        dirs.iter()
            .map(|dir| offset(from, *dir))
            .find(|next| !self.world.is_wall(next.x, next.y))
    }

    fn nearest_pacman(&self, from: Vec2) -> Option<Vec2> {
        self.players
            .iter()
            .filter(|player| player.is_living(Role::PacMan))
            .map(|player| player.pos)
            .min_by_key(|pos| pos.manhattan(from))
    }

    fn random_cell(&mut self) -> Vec2 {
        let x = self.rng.int(0, self.world.width() - 1);
        let y = self.rng.int(0, self.world.height() - 1);
        Vec2::new(x, y)
    }
}
