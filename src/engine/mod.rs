use std::collections::HashMap;

use tracing::{debug, info};

use crate::constants::{
    ghost_combo_bonus, move_interval_ms, AI_GHOST_COUNT, FRUIT_PELLET_THRESHOLD,
    PELLET_POINTS, POWER_DURATION_MS, POWER_PELLET_POINTS, STARTING_LIVES,
};
use crate::error::{EngineError, WorldError};
use crate::rng::Rng;
use crate::types::{
    Direction, FruitKind, GhostBehavior, GhostMode, Role, RoundPhase, SessionId, Vec2,
};
use crate::world::{Cell, MazeLayout, World};

mod ghost_ai;
mod snapshot;
mod spawn_system;
mod utils;

pub use self::utils::now_ms;

#[derive(Clone, Debug)]
pub struct Player {
    pub session: SessionId,
    pub role: Role,
    pub pos: Vec2,
    pub glyph: char,
    pub score: u32,
    pub lives: i32,
    pub alive: bool,
    pub power_until: u64,
    pub ghosts_eaten: u32,
    pub last_move_ms: Option<u64>,
    pub spawn: Vec2,
}

impl Player {
    pub fn is_powered(&self, now_ms: u64) -> bool {
        self.role == Role::PacMan && now_ms < self.power_until
    }

    fn is_living(&self, role: Role) -> bool {
        self.alive && self.role == role
    }
}

#[derive(Clone, Debug)]
pub struct AiGhost {
    pub pos: Vec2,
    pub glyph: char,
    pub behavior: GhostBehavior,
    pub in_pen: bool,
    pub roster_index: usize,
}

#[derive(Clone, Debug)]
pub struct Fruit {
    pub pos: Vec2,
    pub kind: FruitKind,
    pub points: u32,
    pub spawned_at: u64,
}

#[derive(Clone, Debug)]
pub struct RoundState {
    pub level: u32,
    pub phase: RoundPhase,
    pub winner: Option<SessionId>,
    pub mode: GhostMode,
    pub mode_started_ms: u64,
    pub pellets_since_fruit: u32,
    pub started_at_ms: u64,
    pub cleared_board: bool,
}

impl RoundState {
    fn new(level: u32, phase: RoundPhase, now_ms: u64) -> Self {
        Self {
            level,
            phase,
            winner: None,
            mode: GhostMode::Scatter,
            mode_started_ms: now_ms,
            pellets_since_fruit: 0,
            started_at_ms: now_ms,
            cleared_board: false,
        }
    }
}

/// Result of a move intent. Everything except `Moved` leaves state untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    NotAlive,
    Throttled,
    Blocked,
    RoundOver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Occupant {
    AiGhost(usize),
    Player(usize),
}

#[derive(Clone, Debug)]
pub struct GameEngineOptions {
    pub ai_ghost_count: usize,
    pub seed: u32,
}

impl Default for GameEngineOptions {
    fn default() -> Self {
        Self {
            ai_ghost_count: AI_GHOST_COUNT,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GameEngine {
    layout: MazeLayout,
    world: World,
    players: Vec<Player>,
    ai_ghosts: Vec<AiGhost>,
    fruits: Vec<Fruit>,
    round: RoundState,
    rng: Rng,
    spawn_rotation: HashMap<Role, usize>,
}

impl GameEngine {
    pub fn new(
        layout: MazeLayout,
        options: GameEngineOptions,
        now_ms: u64,
    ) -> Result<Self, WorldError> {
        let world = layout.build_world()?;
        let mut engine = Self {
            layout,
            world,
            players: Vec::new(),
            ai_ghosts: Vec::new(),
            fruits: Vec::new(),
            round: RoundState::new(1, RoundPhase::LobbyFilling, now_ms),
            rng: Rng::new(options.seed),
            spawn_rotation: HashMap::new(),
        };
        engine.spawn_ai_roster(options.ai_ghost_count);
        Ok(engine)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, session: &SessionId) -> Option<&Player> {
        self.players.iter().find(|player| &player.session == session)
    }

    pub fn ai_ghosts(&self) -> &[AiGhost] {
        &self.ai_ghosts
    }

    pub fn fruits(&self) -> &[Fruit] {
        &self.fruits
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn phase(&self) -> RoundPhase {
        self.round.phase
    }

    pub fn is_game_over(&self) -> bool {
        self.round.phase == RoundPhase::Over
    }

    pub fn winner(&self) -> Option<&SessionId> {
        self.round.winner.as_ref()
    }

    /// Places a new entity for `session` and returns its glyph.
    pub fn join(&mut self, session: SessionId, role: Role, now_ms: u64) -> Result<char, EngineError> {
        if self.player(&session).is_some() {
            return Err(EngineError::DuplicateSession(session));
        }
        let glyph = self.next_free_glyph()?;
        let spawn = self.next_spawn_slot(role);
        self.players.push(Player {
            session: session.clone(),
            role,
            pos: spawn,
            glyph,
            score: 0,
            lives: STARTING_LIVES,
            alive: true,
            power_until: 0,
            ghosts_eaten: 0,
            last_move_ms: None,
            spawn,
        });
        info!(%session, %role, %glyph, "player joined");

        if self.round.phase == RoundPhase::LobbyFilling {
            self.round = RoundState::new(self.round.level, RoundPhase::InProgress, now_ms);
            info!(level = self.round.level, "round started");
        }
        Ok(glyph)
    }

    pub fn leave(&mut self, session: &SessionId) -> bool {
        let Some(idx) = self.player_index(session) else {
            return false;
        };
        let player = self.players.remove(idx);
        info!(%session, role = %player.role, glyph = %player.glyph, "player left");
        true
    }

    pub fn attempt_move(
        &mut self,
        session: &SessionId,
        dir: Direction,
        now_ms: u64,
    ) -> Result<MoveOutcome, EngineError> {
        let idx = self
            .player_index(session)
            .ok_or_else(|| EngineError::UnknownSession(session.clone()))?;
        if self.round.phase == RoundPhase::Over {
            return Ok(MoveOutcome::RoundOver);
        }

        let player = &self.players[idx];
        if !player.alive {
            return Ok(MoveOutcome::NotAlive);
        }

        let in_tunnel = self.world.is_tunnel_cell(player.pos.x, player.pos.y);
        let frightened = self.any_pacman_powered(now_ms);
        let required = move_interval_ms(player.role, in_tunnel, frightened);
        if let Some(last) = player.last_move_ms {
            if now_ms.saturating_sub(last) < required {
                return Ok(MoveOutcome::Throttled);
            }
        }

        let (dx, dy) = dir.delta();
        let (nx, ny) = self
            .world
            .wrap_coordinate(player.pos.x + dx, player.pos.y + dy);
        if self.world.is_wall(nx, ny)
            || (player.role == Role::PacMan && self.world.is_pen_cell(nx, ny))
        {
            return Ok(MoveOutcome::Blocked);
        }

        let player = &mut self.players[idx];
        player.pos = Vec2::new(nx, ny);
        player.last_move_ms = Some(now_ms);
        if player.role == Role::PacMan {
            self.apply_pacman_pickups(idx, now_ms);
        }
        self.resolve_collisions(now_ms);
        Ok(MoveOutcome::Moved)
    }

    /// One pass over every alive Pac-Man against the ghosts sharing its cell.
    pub fn resolve_collisions(&mut self, now_ms: u64) {
        if self.round.phase != RoundPhase::InProgress {
            return;
        }

        let mut occupants: HashMap<Vec2, Occupant> = HashMap::new();
        for (idx, ghost) in self.ai_ghosts.iter().enumerate() {
            occupants.insert(ghost.pos, Occupant::AiGhost(idx));
        }
        for (idx, player) in self.players.iter().enumerate() {
            if player.is_living(Role::Ghost) {
                occupants.insert(player.pos, Occupant::Player(idx));
            }
        }

        for pac_idx in 0..self.players.len() {
            if self.round.phase != RoundPhase::InProgress {
                break;
            }
            if !self.players[pac_idx].is_living(Role::PacMan) {
                continue;
            }
            let pos = self.players[pac_idx].pos;
            let Some(&occupant) = occupants.get(&pos) else {
                continue;
            };

            if self.players[pac_idx].is_powered(now_ms) {
                let pacman = &mut self.players[pac_idx];
                let bonus = ghost_combo_bonus(pacman.ghosts_eaten);
                pacman.score += bonus;
                pacman.ghosts_eaten += 1;
                debug!(glyph = %pacman.glyph, bonus, combo = pacman.ghosts_eaten, "ghost eaten");
                occupants.remove(&pos);
                self.reset_occupant(occupant);
            } else {
                self.capture_pacman(pac_idx);
            }
        }
    }

    /// Periodic controller step: mode timer, AI movement, fruit expiry and a
    /// collision sweep.
    pub fn tick(&mut self, now_ms: u64) {
        if self.round.phase != RoundPhase::InProgress {
            return;
        }
        self.update_ghost_mode(now_ms);
        self.step_ai_ghosts(now_ms);
        self.expire_fruits(now_ms);
        self.resolve_collisions(now_ms);
    }

    /// Starts a new round after game over. Ignored while a round is running.
    pub fn restart(&mut self, now_ms: u64) -> bool {
        if self.round.phase != RoundPhase::Over {
            return false;
        }
        let level = if self.round.cleared_board {
            self.round.level + 1
        } else {
            1
        };

        self.world.reset();
        self.fruits.clear();
        self.round = RoundState::new(level, RoundPhase::InProgress, now_ms);
        for player in &mut self.players {
            player.pos = player.spawn;
            player.score = 0;
            player.lives = STARTING_LIVES;
            player.alive = true;
            player.power_until = 0;
            player.ghosts_eaten = 0;
            player.last_move_ms = None;
        }
        for idx in 0..self.ai_ghosts.len() {
            self.send_ai_ghost_home(idx);
        }
        info!(level, "round restarted");
        true
    }

    fn apply_pacman_pickups(&mut self, idx: usize, now_ms: u64) {
        let pos = self.players[idx].pos;

        let eaten = self.world.consume(pos.x, pos.y);
        if let Some(cell) = eaten {
            let pacman = &mut self.players[idx];
            if cell == Cell::PowerPellet {
                pacman.score += POWER_PELLET_POINTS;
                pacman.power_until = now_ms + POWER_DURATION_MS;
                pacman.ghosts_eaten = 0;
                debug!(glyph = %pacman.glyph, "power pellet eaten");
            } else {
                pacman.score += PELLET_POINTS;
            }
        }

        if let Some(fruit_idx) = self.fruits.iter().position(|fruit| fruit.pos == pos) {
            let fruit = self.fruits.remove(fruit_idx);
            self.players[idx].score += fruit.points;
            info!(glyph = %self.players[idx].glyph, fruit = fruit.kind.name(), "fruit eaten");
        }

        if eaten.is_none() {
            return;
        }
        self.round.pellets_since_fruit += 1;
        if self.round.pellets_since_fruit >= FRUIT_PELLET_THRESHOLD {
            self.spawn_fruit(now_ms);
            self.round.pellets_since_fruit = 0;
        }

        if self.world.count_remaining_pellets() == 0 {
            let winner = self.top_scorer(|_| true);
            self.finish_round(winner, true);
        }
    }

    fn capture_pacman(&mut self, pac_idx: usize) {
        let pacman = &mut self.players[pac_idx];
        pacman.lives -= 1;
        pacman.power_until = 0;
        info!(glyph = %pacman.glyph, lives = pacman.lives, "pac-man captured");

        if pacman.lives > 0 {
            pacman.pos = pacman.spawn;
            return;
        }

        pacman.alive = false;
        let any_left = self
            .players
            .iter()
            .any(|player| player.is_living(Role::PacMan));
        if !any_left {
            let winner = self.top_scorer(|player| player.is_living(Role::Ghost));
            self.finish_round(winner, false);
        }
    }

    fn reset_occupant(&mut self, occupant: Occupant) {
        match occupant {
            Occupant::AiGhost(idx) => self.send_ai_ghost_home(idx),
            Occupant::Player(idx) => {
                let ghost = &mut self.players[idx];
                ghost.pos = ghost.spawn;
            }
        }
    }

    fn finish_round(&mut self, winner: Option<SessionId>, cleared_board: bool) {
        self.round.phase = RoundPhase::Over;
        self.round.cleared_board = cleared_board;
        self.round.winner = winner;
        match self.round.winner.as_ref() {
            Some(session) => info!(%session, cleared_board, "round over"),
            None => info!(cleared_board, "round over without winner"),
        }
    }

    /// Highest score among eligible players; ties go to the earliest joiner.
    fn top_scorer(&self, eligible: impl Fn(&Player) -> bool) -> Option<SessionId> {
        let mut best: Option<&Player> = None;
        for player in self.players.iter().filter(|player| eligible(player)) {
            if best.is_none_or(|current| player.score > current.score) {
                best = Some(player);
            }
        }
        best.map(|player| player.session.clone())
    }

    fn any_pacman_powered(&self, now_ms: u64) -> bool {
        self.players
            .iter()
            .any(|player| player.alive && player.is_powered(now_ms))
    }

    fn player_index(&self, session: &SessionId) -> Option<usize> {
        self.players
            .iter()
            .position(|player| &player.session == session)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::corridor_layout;
    use super::*;
    use crate::constants::{FRUIT_LIFETIME_MS, GHOST_FRIGHTENED_MOVE_INTERVAL_MS, PACMAN_MOVE_INTERVAL_MS};
    use crate::world::MazeLayout;

    const T0: u64 = 1_000_000;

    fn engine_without_ai() -> GameEngine {
        GameEngine::new(
            corridor_layout(),
            GameEngineOptions {
                ai_ghost_count: 0,
                seed: 11,
            },
            T0,
        )
        .expect("corridor layout is valid")
    }

    fn sid(raw: &str) -> SessionId {
        SessionId::new(raw)
    }

    fn place(engine: &mut GameEngine, session: &str, x: i32, y: i32) {
        let idx = engine.player_index(&sid(session)).expect("player exists");
        engine.players[idx].pos = Vec2::new(x, y);
    }

    fn pos_of(engine: &GameEngine, session: &str) -> Vec2 {
        engine.player(&sid(session)).expect("player exists").pos
    }

    fn score_of(engine: &GameEngine, session: &str) -> u32 {
        engine.player(&sid(session)).expect("player exists").score
    }

    #[test]
    fn first_join_starts_the_round() {
        let mut engine = engine_without_ai();
        assert_eq!(engine.phase(), RoundPhase::LobbyFilling);
        let glyph = engine
            .join(sid("pac"), Role::PacMan, T0 + 5)
            .expect("join succeeds");
        assert_eq!(glyph, 'A');
        assert_eq!(engine.phase(), RoundPhase::InProgress);
        assert_eq!(engine.round().started_at_ms, T0 + 5);
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(1, 3));
    }

    #[test]
    fn join_rejects_duplicate_session_and_rotates_spawns() {
        let mut engine = engine_without_ai();
        engine.join(sid("a"), Role::PacMan, T0).expect("join a");
        engine.join(sid("b"), Role::PacMan, T0).expect("join b");
        engine.join(sid("c"), Role::PacMan, T0).expect("join c");
        assert_eq!(pos_of(&engine, "a"), Vec2::new(1, 3));
        assert_eq!(pos_of(&engine, "b"), Vec2::new(7, 3));
        assert_eq!(pos_of(&engine, "c"), Vec2::new(1, 3));
        assert_eq!(
            engine.join(sid("a"), Role::Ghost, T0),
            Err(EngineError::DuplicateSession(sid("a")))
        );
    }

    #[test]
    fn glyphs_are_reused_after_leave() {
        let mut engine = engine_without_ai();
        engine.join(sid("a"), Role::PacMan, T0).expect("join a");
        engine.join(sid("b"), Role::Ghost, T0).expect("join b");
        assert!(engine.leave(&sid("a")));
        assert!(!engine.leave(&sid("a")));
        let glyph = engine.join(sid("c"), Role::Ghost, T0).expect("join c");
        assert_eq!(glyph, 'A');
    }

    #[test]
    fn moving_unknown_session_is_an_invariant_error() {
        let mut engine = engine_without_ai();
        assert_eq!(
            engine.attempt_move(&sid("ghost-of-nobody"), Direction::Up, T0),
            Err(EngineError::UnknownSession(sid("ghost-of-nobody")))
        );
    }

    #[test]
    fn throttle_allows_one_move_per_interval() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");

        let first = engine.attempt_move(&sid("pac"), Direction::Right, T0);
        let second = engine.attempt_move(&sid("pac"), Direction::Right, T0 + PACMAN_MOVE_INTERVAL_MS - 1);
        assert_eq!(first, Ok(MoveOutcome::Moved));
        assert_eq!(second, Ok(MoveOutcome::Throttled));
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(2, 3));

        let third = engine.attempt_move(&sid("pac"), Direction::Right, T0 + PACMAN_MOVE_INTERVAL_MS);
        assert_eq!(third, Ok(MoveOutcome::Moved));
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(3, 3));
    }

    #[test]
    fn ghost_is_slower_while_pacman_is_powered() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        engine.players[0].power_until = T0 + 10_000;

        assert_eq!(
            engine.attempt_move(&sid("ghost"), Direction::Up, T0),
            Ok(MoveOutcome::Moved)
        );
        assert_eq!(
            engine.attempt_move(&sid("ghost"), Direction::Right, T0 + 200),
            Ok(MoveOutcome::Throttled)
        );
        assert_eq!(
            engine.attempt_move(
                &sid("ghost"),
                Direction::Right,
                T0 + GHOST_FRIGHTENED_MOVE_INTERVAL_MS
            ),
            Ok(MoveOutcome::Moved)
        );
    }

    #[test]
    fn tunnel_wraps_both_ways() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");

        place(&mut engine, "pac", 0, 1);
        assert_eq!(
            engine.attempt_move(&sid("pac"), Direction::Left, T0),
            Ok(MoveOutcome::Moved)
        );
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(8, 1));

        assert_eq!(
            engine.attempt_move(&sid("pac"), Direction::Right, T0 + 1_000),
            Ok(MoveOutcome::Moved)
        );
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(0, 1));
    }

    #[test]
    fn walled_rows_never_wrap() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        place(&mut engine, "pac", 1, 3);
        assert_eq!(
            engine.attempt_move(&sid("pac"), Direction::Left, T0),
            Ok(MoveOutcome::Blocked)
        );
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(1, 3));
        place(&mut engine, "pac", 7, 3);
        assert_eq!(
            engine.attempt_move(&sid("pac"), Direction::Right, T0),
            Ok(MoveOutcome::Blocked)
        );
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(7, 3));
    }

    #[test]
    fn pen_blocks_pacman_but_not_ghosts() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        place(&mut engine, "pac", 4, 1);
        assert_eq!(
            engine.attempt_move(&sid("pac"), Direction::Down, T0),
            Ok(MoveOutcome::Blocked)
        );

        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(4, 2));
        place(&mut engine, "ghost", 4, 3);
        assert_eq!(
            engine.attempt_move(&sid("ghost"), Direction::Up, T0),
            Ok(MoveOutcome::Moved)
        );
        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(4, 2));
    }

    #[test]
    fn pellets_score_once() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        let before = engine.world().count_remaining_pellets();

        engine
            .attempt_move(&sid("pac"), Direction::Right, T0)
            .expect("move");
        assert_eq!(score_of(&engine, "pac"), PELLET_POINTS);
        assert_eq!(engine.world().count_remaining_pellets(), before - 1);

        engine
            .attempt_move(&sid("pac"), Direction::Left, T0 + 200)
            .expect("move");
        engine
            .attempt_move(&sid("pac"), Direction::Right, T0 + 400)
            .expect("move");
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(2, 3));
        assert_eq!(score_of(&engine, "pac"), 2 * PELLET_POINTS);
        assert_eq!(engine.world().count_remaining_pellets(), before - 2);
    }

    #[test]
    fn ghosts_do_not_eat_pellets() {
        let mut engine = engine_without_ai();
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join");
        let before = engine.world().count_remaining_pellets();
        engine
            .attempt_move(&sid("ghost"), Direction::Down, T0)
            .expect("move");
        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(4, 3));
        assert_eq!(engine.world().count_remaining_pellets(), before);
        assert_eq!(score_of(&engine, "ghost"), 0);
    }

    #[test]
    fn power_pellet_grants_power_and_resets_combo() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        engine.players[0].ghosts_eaten = 2;
        place(&mut engine, "pac", 2, 1);
        engine
            .attempt_move(&sid("pac"), Direction::Right, T0)
            .expect("move");

        let pacman = engine.player(&sid("pac")).expect("pac");
        assert_eq!(pacman.score, POWER_PELLET_POINTS);
        assert_eq!(pacman.power_until, T0 + POWER_DURATION_MS);
        assert_eq!(pacman.ghosts_eaten, 0);
        assert!(pacman.is_powered(T0 + POWER_DURATION_MS - 1));
        assert!(!pacman.is_powered(T0 + POWER_DURATION_MS));
    }

    #[test]
    fn combo_bonus_escalates_and_clamps() {
        let mut engine = GameEngine::new(
            corridor_layout(),
            GameEngineOptions {
                ai_ghost_count: 4,
                seed: 3,
            },
            T0,
        )
        .expect("layout");
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        engine.players[0].power_until = T0 + POWER_DURATION_MS;
        place(&mut engine, "pac", 6, 3);

        let mut awarded = Vec::new();
        for ghost_idx in 0..4 {
            let before = score_of(&engine, "pac");
            engine.ai_ghosts[ghost_idx].pos = Vec2::new(6, 3);
            engine.ai_ghosts[ghost_idx].in_pen = false;
            engine.resolve_collisions(T0 + 100);
            awarded.push(score_of(&engine, "pac") - before);
            assert_eq!(engine.ai_ghosts[ghost_idx].pos, Vec2::new(4, 2));
            assert!(engine.ai_ghosts[ghost_idx].in_pen);
        }
        assert_eq!(awarded, vec![200, 400, 800, 800]);
        assert_eq!(engine.players[0].ghosts_eaten, 4);
    }

    #[test]
    fn capture_costs_one_life_and_respawns() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        engine.players[0].power_until = T0 - 1;

        place(&mut engine, "pac", 5, 3);
        place(&mut engine, "ghost", 5, 3);
        engine.resolve_collisions(T0);

        let pacman = engine.player(&sid("pac")).expect("pac");
        assert_eq!(pacman.lives, STARTING_LIVES - 1);
        assert!(pacman.alive);
        assert_eq!(pacman.pos, Vec2::new(1, 3));
        assert_eq!(pacman.power_until, 0);
        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(5, 3));
        assert_eq!(engine.phase(), RoundPhase::InProgress);

        engine.resolve_collisions(T0 + 1);
        assert_eq!(
            engine.player(&sid("pac")).expect("pac").lives,
            STARTING_LIVES - 1
        );
    }

    #[test]
    fn last_life_ends_round_with_ghost_winner() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        engine.join(sid("ghost2"), Role::Ghost, T0).expect("join ghost2");
        engine.players[2].score = 5;

        for _ in 0..STARTING_LIVES {
            place(&mut engine, "pac", 6, 3);
            place(&mut engine, "ghost", 6, 3);
            engine.resolve_collisions(T0);
        }

        let pacman = engine.player(&sid("pac")).expect("pac");
        assert_eq!(pacman.lives, 0);
        assert!(!pacman.alive);
        assert_eq!(pacman.pos, Vec2::new(6, 3));
        assert!(engine.is_game_over());
        assert_eq!(engine.winner(), Some(&sid("ghost2")));
        assert!(!engine.round().cleared_board);
    }

    #[test]
    fn losing_one_of_two_pacmen_keeps_round_running() {
        let mut engine = engine_without_ai();
        engine.join(sid("a"), Role::PacMan, T0).expect("join a");
        engine.join(sid("b"), Role::PacMan, T0).expect("join b");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        engine.players[0].lives = 1;

        place(&mut engine, "a", 3, 3);
        place(&mut engine, "ghost", 3, 3);
        engine.resolve_collisions(T0);

        assert!(!engine.player(&sid("a")).expect("a").alive);
        assert_eq!(engine.phase(), RoundPhase::InProgress);
        assert_eq!(
            engine.attempt_move(&sid("a"), Direction::Right, T0 + 1_000),
            Ok(MoveOutcome::NotAlive)
        );
    }

    #[test]
    fn last_pacman_lost_without_ghost_players_has_no_winner() {
        let mut engine = GameEngine::new(
            corridor_layout(),
            GameEngineOptions {
                ai_ghost_count: 1,
                seed: 5,
            },
            T0,
        )
        .expect("layout");
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        engine.players[0].lives = 1;
        place(&mut engine, "pac", 2, 3);
        engine.ai_ghosts[0].pos = Vec2::new(2, 3);
        engine.resolve_collisions(T0);
        assert!(engine.is_game_over());
        assert_eq!(engine.winner(), None);
    }

    #[test]
    fn eating_last_pellet_ends_round_with_top_scorer_of_any_role() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        engine.players[1].score = 10_000;

        let world = engine.world.clone();
        for y in 0..world.height() {
            for x in 0..world.width() {
                if (x, y) != (2, 3) {
                    engine.world.consume(x, y);
                }
            }
        }
        assert_eq!(engine.world().count_remaining_pellets(), 1);

        engine
            .attempt_move(&sid("pac"), Direction::Right, T0)
            .expect("move");
        assert_eq!(engine.world().count_remaining_pellets(), 0);
        assert!(engine.is_game_over());
        assert!(engine.round().cleared_board);
        assert_eq!(engine.winner(), Some(&sid("ghost")));
    }

    #[test]
    fn moves_are_dropped_while_round_is_over() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        engine.finish_round(None, false);
        assert_eq!(
            engine.attempt_move(&sid("pac"), Direction::Right, T0),
            Ok(MoveOutcome::RoundOver)
        );
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(1, 3));
    }

    #[test]
    fn fruit_spawns_at_threshold_and_is_eaten() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        engine.round.pellets_since_fruit = FRUIT_PELLET_THRESHOLD - 1;

        engine
            .attempt_move(&sid("pac"), Direction::Right, T0)
            .expect("move");
        assert_eq!(engine.round().pellets_since_fruit, 0);
        assert_eq!(engine.fruits().len(), 1);
        let fruit = engine.fruits()[0].clone();
        assert_eq!(fruit.kind, FruitKind::Cherry);
        assert_eq!(fruit.pos, Vec2::new(5, 3));

        place(&mut engine, "pac", 4, 3);
        let before = score_of(&engine, "pac");
        engine
            .attempt_move(&sid("pac"), Direction::Right, T0 + 1_000)
            .expect("move");
        assert!(engine.fruits().is_empty());
        assert_eq!(score_of(&engine, "pac") - before, PELLET_POINTS + fruit.points);
    }

    #[test]
    fn fruit_expires_on_tick() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        engine.spawn_fruit(T0);
        engine.tick(T0 + FRUIT_LIFETIME_MS - 1);
        assert_eq!(engine.fruits().len(), 1);
        engine.tick(T0 + FRUIT_LIFETIME_MS);
        assert!(engine.fruits().is_empty());
    }

    #[test]
    fn power_pellet_then_ghost_scores_250_and_resets_ghost() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");

        let pac = sid("pac");
        let steps = [Direction::Up, Direction::Up, Direction::Right];
        for (i, dir) in steps.into_iter().enumerate() {
            let outcome = engine.attempt_move(&pac, dir, T0 + i as u64 * 200);
            assert_eq!(outcome, Ok(MoveOutcome::Moved));
        }
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(2, 1));
        let before = score_of(&engine, "pac");

        engine
            .attempt_move(&pac, Direction::Right, T0 + 600)
            .expect("power pellet move");
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(3, 1));

        engine
            .attempt_move(&sid("ghost"), Direction::Up, T0 + 700)
            .expect("ghost leaves pen");
        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(4, 1));

        let outcome = engine.attempt_move(
            &sid("ghost"),
            Direction::Left,
            T0 + 700 + GHOST_FRIGHTENED_MOVE_INTERVAL_MS,
        );
        assert_eq!(outcome, Ok(MoveOutcome::Moved));
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(3, 1));
        assert_eq!(score_of(&engine, "pac") - before, 50 + 200);
        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(4, 2));
        assert_eq!(engine.phase(), RoundPhase::InProgress);
    }

    #[test]
    fn powered_pacman_walking_into_idle_ghost_eats_it() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        assert_eq!(engine.world.consume(4, 1), Some(Cell::Pellet));

        engine
            .attempt_move(&sid("ghost"), Direction::Up, T0)
            .expect("ghost leaves pen");
        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(4, 1));

        let pac = sid("pac");
        let steps = [Direction::Up, Direction::Up, Direction::Right];
        for (i, dir) in steps.into_iter().enumerate() {
            let outcome = engine.attempt_move(&pac, dir, T0 + (i as u64 + 1) * 200);
            assert_eq!(outcome, Ok(MoveOutcome::Moved));
        }
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(2, 1));

        let before_power = score_of(&engine, "pac");
        engine
            .attempt_move(&pac, Direction::Right, T0 + 800)
            .expect("power pellet move");
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(3, 1));
        assert_eq!(score_of(&engine, "pac") - before_power, 50);
        assert!(engine.player(&pac).is_some_and(|player| player.is_powered(T0 + 800)));

        let before_ghost = score_of(&engine, "pac");
        let outcome = engine.attempt_move(&pac, Direction::Right, T0 + 1_000);
        assert_eq!(outcome, Ok(MoveOutcome::Moved));
        assert_eq!(pos_of(&engine, "pac"), Vec2::new(4, 1));
        assert_eq!(score_of(&engine, "pac") - before_ghost, 200);
        assert_eq!(pos_of(&engine, "ghost"), Vec2::new(4, 2));
        assert!(engine.player(&pac).is_some_and(|player| player.alive));
        assert_eq!(engine.phase(), RoundPhase::InProgress);
    }

    #[test]
    fn restart_restores_a_fresh_round() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join pac");
        engine.join(sid("ghost"), Role::Ghost, T0).expect("join ghost");
        let full = engine.world().count_remaining_pellets();

        assert!(!engine.restart(T0));

        engine
            .attempt_move(&sid("pac"), Direction::Right, T0)
            .expect("move");
        engine.spawn_fruit(T0);
        engine.players[0].lives = 1;
        place(&mut engine, "ghost", 2, 3);
        engine.resolve_collisions(T0 + 10);
        assert!(engine.is_game_over());

        assert!(engine.restart(T0 + 5_000));
        assert_eq!(engine.phase(), RoundPhase::InProgress);
        assert_eq!(engine.winner(), None);
        assert_eq!(engine.world().count_remaining_pellets(), full);
        assert!(engine.fruits().is_empty());
        assert_eq!(engine.round().level, 1);
        for player in engine.players() {
            assert_eq!(player.score, 0);
            assert_eq!(player.lives, STARTING_LIVES);
            assert!(player.alive);
            assert_eq!(player.pos, player.spawn);
            assert_eq!(player.last_move_ms, None);
        }
    }

    #[test]
    fn restart_after_board_clear_advances_level() {
        let mut engine = engine_without_ai();
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");
        engine.finish_round(Some(sid("pac")), true);
        assert!(engine.restart(T0));
        assert_eq!(engine.round().level, 2);
    }

    #[test]
    fn random_walk_never_regrows_pellets() {
        let mut engine = GameEngine::new(
            MazeLayout::classic(),
            GameEngineOptions {
                ai_ghost_count: 0,
                seed: 77,
            },
            T0,
        )
        .expect("classic layout");
        engine.join(sid("pac"), Role::PacMan, T0).expect("join");

        let mut rng = Rng::new(2024);
        let mut remaining = engine.world().count_remaining_pellets();
        for step in 0..20_000u64 {
            let dir = Direction::ALL[rng.int(0, 3) as usize];
            let _ = engine.attempt_move(&sid("pac"), dir, T0 + step * PACMAN_MOVE_INTERVAL_MS);
            let now_remaining = engine.world().count_remaining_pellets();
            assert!(now_remaining <= remaining);
            assert_eq!(engine.is_game_over(), now_remaining == 0);
            remaining = now_remaining;
            if engine.is_game_over() {
                break;
            }
        }
    }
}
