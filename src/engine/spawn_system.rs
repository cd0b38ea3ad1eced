use super::*;

use tracing::warn;

use crate::constants::{
    fruit_for_level, AI_GHOST_GLYPHS, FRUIT_LIFETIME_MS, MAX_PLAYERS, PLAYER_GLYPHS,
};

impl GameEngine {
    /// Each AI ghost takes the next glyph of `AI_GHOST_GLYPHS`; a larger
    /// request is capped so no two ghosts share a glyph.
    pub(super) fn spawn_ai_roster(&mut self, count: usize) {
        let available = AI_GHOST_GLYPHS.chars().count();
        if count > available {
            warn!(requested = count, spawned = available, "AI ghost count capped");
        }
        for (roster_index, glyph) in AI_GHOST_GLYPHS.chars().take(count).enumerate() {
            let pos = self.pen_spawn_for(roster_index);
            self.ai_ghosts.push(AiGhost {
                pos,
                glyph,
                behavior: GhostBehavior::for_roster_index(roster_index),
                in_pen: true,
                roster_index,
            });
        }
    }

    pub(super) fn send_ai_ghost_home(&mut self, ghost_idx: usize) {
        if ghost_idx >= self.ai_ghosts.len() {
            return;
        }
        let pos = self.pen_spawn_for(self.ai_ghosts[ghost_idx].roster_index);
        let ghost = &mut self.ai_ghosts[ghost_idx];
        ghost.pos = pos;
        ghost.in_pen = true;
    }

    /// Spawn slots are handed out round-robin per role.
    pub(super) fn next_spawn_slot(&mut self, role: Role) -> Vec2 {
        let slots = match role {
            Role::PacMan => &self.layout.pacman_spawns,
            Role::Ghost => &self.layout.ghost_spawns,
        };
        let counter = self.spawn_rotation.entry(role).or_insert(0);
        let slot = slots[*counter % slots.len()];
        *counter += 1;
        slot
    }

    pub(super) fn next_free_glyph(&self) -> Result<char, EngineError> {
        PLAYER_GLYPHS
            .chars()
            .find(|glyph| self.players.iter().all(|player| player.glyph != *glyph))
            .ok_or(EngineError::RosterFull(MAX_PLAYERS))
    }

    /// Drops the level's fruit on the fruit cell, replacing one already there.
    pub(super) fn spawn_fruit(&mut self, now_ms: u64) {
        let pos = self.layout.fruit_spawn;
        let kind = fruit_for_level(self.round.level);
        self.fruits.retain(|fruit| fruit.pos != pos);
        self.fruits.push(Fruit {
            pos,
            kind,
            points: kind.points(),
            spawned_at: now_ms,
        });
        info!(fruit = kind.name(), x = pos.x, y = pos.y, "fruit spawned");
    }

    pub(super) fn expire_fruits(&mut self, now_ms: u64) {
        let before = self.fruits.len();
        self.fruits
            .retain(|fruit| now_ms.saturating_sub(fruit.spawned_at) < FRUIT_LIFETIME_MS);
        if self.fruits.len() < before {
            debug!(expired = before - self.fruits.len(), "fruit expired");
        }
    }

    fn pen_spawn_for(&self, roster_index: usize) -> Vec2 {
        let spawns = &self.layout.pen_spawns;
        spawns[roster_index % spawns.len()]
    }
}
