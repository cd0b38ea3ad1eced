use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use maze_chase_server::constants::{AI_GHOST_COUNT, AI_TICK_MS};
use maze_chase_server::engine::{GameEngine, GameEngineOptions, MoveOutcome};
use maze_chase_server::error::{EngineError, WorldError};
use maze_chase_server::rng::Rng;
use maze_chase_server::types::{Direction, Role, SessionId};
use maze_chase_server::world::MazeLayout;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SIM_START_MS: u64 = 1_000_000;

/// Runs rounds headlessly with random-walking players and reports a JSON
/// summary per round.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 1)]
    seed: u32,
    #[arg(long, default_value_t = 1)]
    pacmen: usize,
    #[arg(long, default_value_t = 1)]
    ghosts: usize,
    #[arg(long, default_value_t = AI_GHOST_COUNT)]
    ai_ghosts: usize,
    #[arg(long, default_value_t = 2_000)]
    ticks: u64,
    #[arg(long, default_value_t = AI_TICK_MS)]
    tick_ms: u64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum SimError {
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Clone, Debug, Serialize)]
struct PlayerLine {
    glyph: char,
    role: Role,
    score: u32,
    lives: i32,
    alive: bool,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    seed: u32,
    ticks_run: u64,
    game_over: bool,
    winner: Option<char>,
    level: u32,
    pellets_remaining: usize,
    moves_applied: u64,
    players: Vec<PlayerLine>,
    anomalies: Vec<String>,
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maze_chase_server=warn,simulate=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let summary = match run(&cli) {
        Ok(summary) => summary,
        Err(err) => {
            error!(%err, "simulation aborted");
            std::process::exit(2);
        }
    };

    match serde_json::to_string(&summary) {
        Ok(line) => println!("{line}"),
        Err(err) => error!(%err, "summary did not serialize"),
    }
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(path = %path.display(), %err, "summary write failed");
            std::process::exit(2);
        }
    }
    info!(ticks = summary.ticks_run, game_over = summary.game_over, "run finished");

    if !summary.anomalies.is_empty() {
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<RunSummary, SimError> {
    let mut engine = GameEngine::new(
        MazeLayout::classic(),
        GameEngineOptions {
            ai_ghost_count: cli.ai_ghosts,
            seed: cli.seed,
        },
        SIM_START_MS,
    )?;

    let mut sessions = Vec::new();
    let roles = std::iter::repeat_n(Role::PacMan, cli.pacmen)
        .chain(std::iter::repeat_n(Role::Ghost, cli.ghosts));
    for (idx, role) in roles.enumerate() {
        let session = SessionId::new(format!("sim_{}", idx + 1));
        engine.join(session.clone(), role, SIM_START_MS)?;
        sessions.push(session);
    }

    let mut rng = Rng::new(cli.seed ^ 0x5eed);
    let mut anomalies = Vec::new();
    let mut pellets = engine.world().count_remaining_pellets();
    let mut moves_applied = 0u64;
    let mut ticks_run = 0u64;

    for tick in 1..=cli.ticks {
        let now = SIM_START_MS + tick * cli.tick_ms.max(1);
        for session in &sessions {
            let dir = Direction::ALL[rng.int(0, 3) as usize];
            if engine.attempt_move(session, dir, now)? == MoveOutcome::Moved {
                moves_applied += 1;
            }
        }
        engine.tick(now);
        ticks_run = tick;

        let remaining = engine.world().count_remaining_pellets();
        if remaining > pellets {
            record_anomaly(&mut anomalies, tick, "pellet count increased");
        }
        pellets = remaining;
        for player in engine.players() {
            if engine.world().is_wall(player.pos.x, player.pos.y) {
                record_anomaly(&mut anomalies, tick, &format!("{} stands in a wall", player.glyph));
            }
            if player.lives < 0 {
                record_anomaly(&mut anomalies, tick, &format!("{} has negative lives", player.glyph));
            }
        }
        for ghost in engine.ai_ghosts() {
            if engine.world().is_wall(ghost.pos.x, ghost.pos.y) {
                record_anomaly(&mut anomalies, tick, &format!("{} stands in a wall", ghost.glyph));
            }
        }

        if engine.is_game_over() {
            break;
        }
    }

    let winner = engine
        .winner()
        .and_then(|session| engine.player(session))
        .map(|player| player.glyph);
    let players = engine
        .players()
        .iter()
        .map(|player| PlayerLine {
            glyph: player.glyph,
            role: player.role,
            score: player.score,
            lives: player.lives,
            alive: player.alive,
        })
        .collect();

    Ok(RunSummary {
        seed: cli.seed,
        ticks_run,
        game_over: engine.is_game_over(),
        winner,
        level: engine.round().level,
        pellets_remaining: pellets,
        moves_applied,
        players,
        anomalies,
    })
}

fn record_anomaly(anomalies: &mut Vec<String>, tick: u64, message: &str) {
    let line = format!("tick {tick}: {message}");
    if !anomalies.contains(&line) {
        warn!(tick, message, "anomaly detected");
        anomalies.push(line);
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let payload = serde_json::to_vec_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, payload)
}
