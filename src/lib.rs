//! Kart Circuit - Tauri Backend
//!
//! Runs the racing physics core and exposes commands for frontend
//! communication.

mod game_server;

use game_server::particle::Controls;
use game_server::race::{RaceConfig, RaceResult, RaceSnapshot};
use game_server::simulation::{GameServer, GameState, ServerStats};
use std::sync::Mutex;
use tauri::State;

/// Initialize a new race with the given configuration
#[tauri::command]
fn init_race(
    server: State<'_, Mutex<GameServer>>,
    car_count: Option<u32>,
    item_count: Option<u32>,
    lap_goal: Option<i32>,
) -> Result<(), String> {
    let mut server = server.lock().map_err(|e| e.to_string())?;

    let defaults = RaceConfig::default();
    let config = RaceConfig {
        car_count: car_count.unwrap_or(defaults.car_count),
        item_count: item_count.unwrap_or(defaults.item_count),
        lap_goal: lap_goal.unwrap_or(defaults.lap_goal),
        ..defaults
    };

    let (cars, laps) = (config.car_count, config.lap_goal);
    server.init_race(config);
    log::info!("Race initialized with {} cars over {} laps", cars, laps);
    Ok(())
}

/// Start the race countdown
#[tauri::command]
fn start_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
    let mut server = server.lock().map_err(|e| e.to_string())?;
    server.start_race();
    log::info!("Race started");
    Ok(())
}

/// Update the player's input flags
#[tauri::command]
fn set_controls(
    server: State<'_, Mutex<GameServer>>,
    accelerate: bool,
    brake: bool,
    left: bool,
    right: bool,
) -> Result<(), String> {
    let mut server = server.lock().map_err(|e| e.to_string())?;
    server.set_controls(Controls { accelerate, brake, left, right });
    Ok(())
}

/// Perform a simulation tick and return the current state
#[tauri::command]
fn tick(server: State<'_, Mutex<GameServer>>) -> Result<Option<RaceSnapshot>, String> {
    let mut server = server.lock().map_err(|e| e.to_string())?;
    Ok(server.tick())
}

/// Get current race snapshot without advancing simulation
#[tauri::command]
fn get_snapshot(server: State<'_, Mutex<GameServer>>) -> Result<Option<RaceSnapshot>, String> {
    let server = server.lock().map_err(|e| e.to_string())?;
    Ok(server.get_snapshot())
}

/// Get race results
#[tauri::command]
fn get_results(server: State<'_, Mutex<GameServer>>) -> Result<Option<Vec<RaceResult>>, String> {
    let server = server.lock().map_err(|e| e.to_string())?;
    Ok(server.get_results())
}

/// Get server statistics
#[tauri::command]
fn get_stats(server: State<'_, Mutex<GameServer>>) -> Result<ServerStats, String> {
    let server = server.lock().map_err(|e| e.to_string())?;
    Ok(server.get_stats())
}

/// Get current game state
#[tauri::command]
fn get_game_state(server: State<'_, Mutex<GameServer>>) -> Result<GameState, String> {
    let server = server.lock().map_err(|e| e.to_string())?;
    Ok(server.get_state())
}

/// Pause the simulation
#[tauri::command]
fn pause_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
    let mut server = server.lock().map_err(|e| e.to_string())?;
    server.pause();
    log::info!("Race paused");
    Ok(())
}

/// Resume the simulation
#[tauri::command]
fn resume_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
    let mut server = server.lock().map_err(|e| e.to_string())?;
    server.resume();
    log::info!("Race resumed");
    Ok(())
}

/// Reset to idle state
#[tauri::command]
fn reset_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
    let mut server = server.lock().map_err(|e| e.to_string())?;
    server.reset();
    log::info!("Race reset");
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .manage(Mutex::new(GameServer::new()))
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }
            log::info!("Kart Circuit game server initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            init_race,
            start_race,
            set_controls,
            tick,
            get_snapshot,
            get_results,
            get_stats,
            get_game_state,
            pause_race,
            resume_race,
            reset_race,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
