use std::path::PathBuf;

use clap::Parser;

use crate::constants::{AI_TICK_MS, DEFAULT_PORT};

/// Process configuration for the game server. Every flag falls back to an
/// environment variable.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Client page served on `GET /`.
    #[arg(long, env = "INDEX_FILE", default_value = "static/index.html")]
    pub index_file: PathBuf,

    /// AI controller period in milliseconds.
    #[arg(long, env = "AI_TICK_MS", default_value_t = AI_TICK_MS)]
    pub tick_ms: u64,

    /// Seed for ghost AI randomness. Taken from the clock when absent.
    #[arg(long, env = "MAZE_SEED")]
    pub seed: Option<u32>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms.max(1)
    }
}
