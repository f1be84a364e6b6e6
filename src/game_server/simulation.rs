//! Simulation - Main game server and loop
//!
//! Manages the game server state, handles tick updates, and
//! provides the interface for Tauri commands.

use std::sync::{Arc, RwLock};
use std::time::Instant;
use serde::{Deserialize, Serialize};
use crate::game_server::particle::Controls;
use crate::game_server::race::{Race, RaceConfig, RaceResult, RaceSnapshot, RaceStatus};

/// Game state for the local single-player mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    Idle,
    Loading,
    Ready,
    Racing,
    Results,
}

/// Server statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub tick_rate: f32,
    pub avg_tick_time_ms: f32,
    pub car_count: u32,
    pub game_state: GameState,
}

/// Main game server
pub struct GameServer {
    /// Current game state
    state: GameState,
    /// Active race (if any)
    race: Option<Race>,
    /// Target tick rate (ticks per second)
    tick_rate: f32,
    /// Last tick timestamp
    last_tick: Instant,
    /// Accumulated tick time for averaging
    tick_times: Vec<f32>,
    /// Whether the server is running
    running: bool,
}

impl GameServer {
    /// Create a new game server
    pub fn new() -> Self {
        Self {
            state: GameState::Idle,
            race: None,
            tick_rate: 60.0,
            last_tick: Instant::now(),
            tick_times: Vec::with_capacity(60),
            running: false,
        }
    }

    /// Initialize a new race with given config
    pub fn init_race(&mut self, config: RaceConfig) {
        self.state = GameState::Loading;
        self.race = Some(Race::new(config));
        self.state = GameState::Ready;
    }

    /// Start the race countdown
    pub fn start_race(&mut self) {
        if let Some(race) = &mut self.race {
            race.start_countdown();
            self.state = GameState::Racing;
            self.running = true;
            self.last_tick = Instant::now();
        }
    }

    /// Update the player's input flags for subsequent ticks
    pub fn set_controls(&mut self, controls: Controls) {
        if let Some(race) = &mut self.race {
            race.set_controls(controls);
        }
    }

    /// Perform a single simulation tick
    pub fn tick(&mut self) -> Option<RaceSnapshot> {
        if !self.running {
            return self.race.as_ref().map(|r| r.get_snapshot());
        }

        let now = Instant::now();
        let delta = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;

        // Track tick timing
        let tick_start = Instant::now();

        // Update race
        if let Some(race) = &mut self.race {
            race.advance(delta);

            // Keep ticking through Finished so straggler cars roll on
            // while the results screen is up.
            if race.status == RaceStatus::Finished {
                self.state = GameState::Results;
            }
        }

        // Record tick time
        let tick_time = tick_start.elapsed().as_secs_f32() * 1000.0;
        self.tick_times.push(tick_time);
        if self.tick_times.len() > 60 {
            self.tick_times.remove(0);
        }

        self.race.as_ref().map(|r| r.get_snapshot())
    }

    /// Get current race snapshot
    pub fn get_snapshot(&self) -> Option<RaceSnapshot> {
        self.race.as_ref().map(|r| r.get_snapshot())
    }

    /// Get race results
    pub fn get_results(&self) -> Option<Vec<RaceResult>> {
        self.race.as_ref().map(|r| r.leaderboard.clone())
    }

    /// Get server statistics
    pub fn get_stats(&self) -> ServerStats {
        let avg_tick_time = if self.tick_times.is_empty() {
            0.0
        } else {
            self.tick_times.iter().sum::<f32>() / self.tick_times.len() as f32
        };

        ServerStats {
            tick_rate: self.tick_rate,
            avg_tick_time_ms: avg_tick_time,
            car_count: self.race.as_ref().map(|r| r.config.car_count).unwrap_or(0),
            game_state: self.state,
        }
    }

    /// Get current game state
    pub fn get_state(&self) -> GameState {
        self.state
    }

    /// Reset to idle state
    pub fn reset(&mut self) {
        self.state = GameState::Idle;
        self.race = None;
        self.running = false;
        self.tick_times.clear();
    }

    /// Pause the simulation
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume the simulation
    pub fn resume(&mut self) {
        if self.state == GameState::Racing {
            self.running = true;
            self.last_tick = Instant::now();
        }
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for GameServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe game server wrapper for use with Tauri state
pub type SharedGameServer = Arc<RwLock<GameServer>>;

/// Create a new shared game server
pub fn create_shared_server() -> SharedGameServer {
    Arc::new(RwLock::new(GameServer::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_walks_the_state_machine() {
        let mut server = GameServer::new();
        assert_eq!(server.get_state(), GameState::Idle);
        assert!(server.get_snapshot().is_none());

        server.init_race(RaceConfig::default());
        assert_eq!(server.get_state(), GameState::Ready);
        assert!(!server.is_running());

        server.start_race();
        assert_eq!(server.get_state(), GameState::Racing);
        assert!(server.is_running());

        let snapshot = server.tick().unwrap();
        assert_eq!(snapshot.status, RaceStatus::Countdown);

        server.reset();
        assert_eq!(server.get_state(), GameState::Idle);
        assert!(server.get_snapshot().is_none());
    }

    #[test]
    fn paused_server_still_serves_snapshots_without_advancing() {
        let mut server = GameServer::new();
        server.init_race(RaceConfig::default());
        server.start_race();
        server.pause();

        let before = server.get_snapshot().unwrap().elapsed_time;
        let after = server.tick().unwrap().elapsed_time;
        assert_eq!(before, after, "paused tick must not advance the race clock");
    }

    #[test]
    fn controls_reach_the_active_race() {
        let mut server = GameServer::new();
        server.init_race(RaceConfig::default());
        server.set_controls(Controls { accelerate: true, ..Default::default() });
        assert!(server.race.as_ref().unwrap().controls.accelerate);
    }

    #[test]
    fn stats_report_car_count_and_state() {
        let mut server = GameServer::new();
        let stats = server.get_stats();
        assert_eq!(stats.car_count, 0);
        assert_eq!(stats.game_state, GameState::Idle);

        server.init_race(RaceConfig::default());
        let stats = server.get_stats();
        assert_eq!(stats.car_count, 4);
        assert_eq!(stats.tick_rate, 60.0);
    }
}
