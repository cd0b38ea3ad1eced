pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod lobby;
pub mod rng;
pub mod server_protocol;
pub mod types;
pub mod world;
