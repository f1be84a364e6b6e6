//! Game Server Module
//!
//! Runs the kart-racing physics core in Rust for optimal performance.
//! Communicates with the JS frontend via Tauri commands.

pub mod particle;
pub mod race;
pub mod simulation;
pub mod spring;
pub mod track;

pub use particle::{Controls, Particle, ParticleKind};
pub use race::{Race, RaceConfig, RaceStatus};
pub use simulation::{GameServer, GameState};
