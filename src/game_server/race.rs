//! Race - Track layout, race state, and the fixed-substep loop
//!
//! Owns every particle and spring in a race, runs the five-phase
//! physics tick, and tracks the countdown gate, lap goal, and finish
//! order.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game_server::particle::{
    finish_line_angle, resolve_contacts, CarState, Controls, ItemEffect, Particle, ParticleKind,
    PolicyContext,
};
use crate::game_server::spring::Spring;
use crate::game_server::track::{check_walls, HermiteSpline, WallCheck};

/// Outer frames longer than this are clamped before substepping, so a
/// render hitch cannot trigger a huge burst of catch-up physics.
const MAX_FRAME_DELTA: f32 = 1.0 / 30.0;

/// Half-extent of the square track loop.
const TRACK_EXTENT: f32 = 15.0;
/// Tangent magnitude shaping the loop's rounded corners.
const TRACK_TANGENT: f32 = 100.0;
/// Road surface thickness; the centerline sits this far below y = 0.
const TRACK_HEIGHT: f32 = 0.1;

/// Item bob tether: anchor height above the item and spring constants.
const ITEM_ANCHOR_HEIGHT: f32 = 0.15;
const ITEM_SPRING_KS: f32 = 50.0;
const ITEM_SPRING_KD: f32 = 0.0;

const CAR_COLORS: [[f32; 4]; 4] = [
    [0.0, 0.0, 1.0, 1.0], // player blue
    [0.7, 1.0, 0.0, 1.0], // yellow
    [1.0, 0.0, 0.0, 1.0], // red
    [0.5, 0.0, 0.5, 1.0], // purple
];
const BOOST_COLOR: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const SLOW_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

/// Race configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Gravitational acceleration (only enters through friction's
    /// normal-force estimate; nothing falls).
    pub gravity: Vec3,
    /// Ground contact spring stiffness (reserved for uneven terrain).
    pub ground_spring_k: f32,
    /// Ground contact damping (reserved for uneven terrain).
    pub ground_damping_k: f32,
    /// Wall penalty spring stiffness.
    pub wall_spring_k: f32,
    /// Wall penalty damping.
    pub wall_damping_k: f32,
    /// Inner physics timestep (seconds).
    pub timestep: f32,
    /// Static friction coefficient (lateral grip while steering).
    pub static_friction: f32,
    /// Kinetic friction coefficient (rolling drag).
    pub kinetic_friction: f32,
    /// Laps required to finish.
    pub lap_goal: i32,
    /// Road width between the wall centerlines.
    pub track_width: f32,
    /// Wall thickness.
    pub wall_width: f32,
    /// Wall height (rendering only; physics is horizontal).
    pub wall_height: f32,
    /// Total cars including the player.
    pub car_count: u32,
    /// Items scattered on the track.
    pub item_count: u32,
    /// Countdown before the race starts (seconds).
    pub countdown: f32,
    /// Car visual scale; collision radius equals this.
    pub car_scale: f32,
    /// Item visual scale; collision radius equals this.
    pub item_scale: f32,
    pub player_max_speed: f32,
    pub ai_max_speed: f32,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            ground_spring_k: 5000.0,
            ground_damping_k: 10.0,
            wall_spring_k: 500.0,
            wall_damping_k: 50.0,
            timestep: 0.001,
            static_friction: 0.6,
            kinetic_friction: 0.8,
            lap_goal: 5,
            track_width: 10.0,
            wall_width: 0.8,
            wall_height: 0.4,
            car_count: 4,
            item_count: 6,
            countdown: 3.0,
            car_scale: 0.4,
            item_scale: 0.2,
            player_max_speed: 19.0,
            ai_max_speed: 20.0,
        }
    }
}

/// Race status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    NotStarted,
    Countdown,
    Racing,
    Finished,
}

/// One leaderboard entry, appended the tick a car finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    pub car_id: u32,
    pub finish_time: f32,
    pub position: u32,
}

/// Complete race state
pub struct Race {
    pub config: RaceConfig,
    pub status: RaceStatus,
    /// Track centerline loop.
    pub track: HermiteSpline,
    /// Finish line point on the centerline.
    pub finish_line: Vec3,
    /// Slope (x/z) of the finish line's through-origin line, for the
    /// which-side test in lap tracking.
    pub finish_line_slope: f32,
    /// All particles; index 0 is always the player's car.
    pub particles: Vec<Particle>,
    /// Item bob tethers.
    pub springs: Vec<Spring>,
    /// One wall check registered per car.
    pub wall_checks: Vec<WallCheck>,
    /// Shared input flags, set externally before each tick batch.
    pub controls: Controls,
    /// Race clock; negative during the countdown.
    pub elapsed_time: f32,
    /// Finish order, append-only.
    pub leaderboard: Vec<RaceResult>,
}

impl Race {
    /// Create a race on the default square loop with the given config.
    pub fn new(config: RaceConfig) -> Self {
        let (track, tangents) = Self::build_track_loop();
        let finish_line = track.points[0];
        let finish_line_slope = finish_line.x / finish_line.z;

        let mut race = Self {
            config,
            status: RaceStatus::NotStarted,
            track,
            finish_line,
            finish_line_slope,
            particles: Vec::new(),
            springs: Vec::new(),
            wall_checks: Vec::new(),
            controls: Controls::default(),
            elapsed_time: 0.0,
            leaderboard: Vec::new(),
        };
        race.spawn_cars(&tangents);
        race.spawn_items();
        race
    }

    /// The square Hermite loop every race runs on: four rounded corners
    /// at +-TRACK_EXTENT, closed by repeating the first point.
    fn build_track_loop() -> (HermiteSpline, Vec<Vec3>) {
        let e = TRACK_EXTENT;
        let t = TRACK_TANGENT;
        let y = -TRACK_HEIGHT;
        let points = vec![
            Vec3::new(-e, y, -e),
            Vec3::new(-e, y, e),
            Vec3::new(e, y, e),
            Vec3::new(e, y, -e),
            Vec3::new(-e, y, -e),
        ];
        let tangents = vec![
            Vec3::new(-t, 0.0, t),
            Vec3::new(t, 0.0, t),
            Vec3::new(t, 0.0, -t),
            Vec3::new(-t, 0.0, -t),
            Vec3::new(-t, 0.0, t),
        ];
        (HermiteSpline::new(points, tangents.clone()), tangents)
    }

    /// Diagonal grid offset for starting slot `i`, spread across the
    /// middle half of the road.
    fn start_offset(&self, i: u32) -> f32 {
        let lanes = (self.config.car_count - 1).max(1) as f32;
        let spacing = self.config.track_width * 0.5 / lanes;
        -0.25 * self.config.track_width + i as f32 * spacing
    }

    /// Lateral scatter bound keeping randomized points clear of the
    /// walls.
    fn scatter_width(&self) -> f32 {
        self.config.track_width - self.config.car_scale * 10.0
    }

    fn spawn_cars(&mut self, tangents: &[Vec3]) {
        let start = self.track.points[0];
        let forward = tangents[0].normalize();
        let corridor = self.config.track_width - self.config.wall_width / 2.0;

        for i in 0..self.config.car_count {
            let offset = self.start_offset(i);
            let state = CarState::new(i + 1, forward);
            let kind = if i == 0 {
                ParticleKind::Player(state)
            } else {
                ParticleKind::Ai(state, self.build_racing_line(offset, tangents))
            };

            let mut car = Particle::new(kind);
            car.mass = 1.0;
            car.pos = Vec3::new(start.x + offset, self.config.car_scale, start.z + offset);
            car.valid = true;
            car.radius = self.config.car_scale;
            car.max_speed = if i == 0 {
                self.config.player_max_speed
            } else {
                self.config.ai_max_speed
            };
            car.color = CAR_COLORS[i as usize % CAR_COLORS.len()];

            self.wall_checks.push(WallCheck {
                particle: self.particles.len(),
                track_width: corridor,
                car_width: 2.0 * self.config.car_scale,
            });
            self.particles.push(car);
        }
    }

    /// A private racing line for one AI car: the track loop with its
    /// interior control points scattered laterally, sharing the track's
    /// tangents so the line stays parallel to the road.
    fn build_racing_line(&self, start_offset: f32, tangents: &[Vec3]) -> HermiteSpline {
        let scatter = self.scatter_width();
        let start_shift = Vec3::new(start_offset, 0.0, start_offset);

        let n = self.track.points.len();
        let points = self
            .track
            .points
            .iter()
            .enumerate()
            .map(|(k, &p)| {
                if k == 0 || k == n - 1 {
                    p + start_shift
                } else {
                    let jitter = |s: f32| (rand::random::<f32>() - 0.5) * s;
                    p + Vec3::new(jitter(scatter), 0.0, jitter(scatter))
                }
            })
            .collect();
        HermiteSpline::new(points, tangents.to_vec())
    }

    fn spawn_items(&mut self) {
        for i in 0..self.config.item_count {
            let t = rand::random::<f32>() * 0.75 + 0.15;
            let scatter = self.scatter_width();
            let on_track = self.track.position_at(t)
                + Vec3::new(
                    (rand::random::<f32>() - 0.5) * scatter,
                    0.0,
                    (rand::random::<f32>() - 0.5) * scatter,
                );

            let boost = i < self.config.item_count / 2;
            let effect = if boost { ItemEffect::SpeedBoost } else { ItemEffect::SlowDown };

            let mut item = Particle::new(ParticleKind::Item(effect));
            item.mass = 1.0;
            item.pos = Vec3::new(on_track.x, self.config.item_scale, on_track.z);
            item.valid = true;
            item.radius = self.config.item_scale;
            item.color = if boost { BOOST_COLOR } else { SLOW_COLOR };

            let mut anchor = Particle::new(ParticleKind::Anchor);
            anchor.pos = item.pos + Vec3::new(0.0, ITEM_ANCHOR_HEIGHT, 0.0);

            let item_index = self.particles.len();
            self.particles.push(item);
            self.particles.push(anchor);
            self.springs.push(Spring {
                a: item_index,
                b: item_index + 1,
                ks: ITEM_SPRING_KS,
                kd: ITEM_SPRING_KD,
                rest_length: 0.0,
            });
        }
    }

    /// Arm the countdown: the race clock starts negative and physics
    /// stays frozen until it crosses zero.
    pub fn start_countdown(&mut self) {
        self.status = RaceStatus::Countdown;
        self.elapsed_time = -self.config.countdown;
    }

    /// Replace the shared input flags for the coming tick batch.
    pub fn set_controls(&mut self, controls: Controls) {
        self.controls = controls;
    }

    /// Advance simulation by one rendered frame, running fixed inner
    /// substeps until the frame is covered.
    pub fn advance(&mut self, frame_dt: f32) {
        if self.status == RaceStatus::NotStarted {
            return;
        }

        let dt = self.config.timestep;
        let mut remaining = frame_dt.min(MAX_FRAME_DELTA);
        while remaining > 0.0 {
            self.elapsed_time += dt;
            self.step(dt);
            remaining -= dt;
        }

        if self.status == RaceStatus::Countdown && self.elapsed_time >= 0.0 {
            self.status = RaceStatus::Racing;
            log::info!("Countdown over, race is live");
        }
        if self.status == RaceStatus::Racing
            && self.leaderboard.len() == self.config.car_count as usize
        {
            self.status = RaceStatus::Finished;
            log::info!("Race finished after {:.2}s", self.elapsed_time);
        }
    }

    /// One inner physics tick. Strict phase order: input policies,
    /// car contacts, wall checks, springs, integration.
    ///
    /// During the countdown (negative race clock) this is a full
    /// freeze: no forces are built and nothing integrates, so the grid
    /// holds bit-identical across countdown ticks.
    fn step(&mut self, dt: f32) {
        if self.elapsed_time < 0.0 {
            return;
        }

        let ctx = PolicyContext {
            gravity: self.config.gravity,
            static_friction: self.config.static_friction,
            kinetic_friction: self.config.kinetic_friction,
            controls: self.controls,
        };
        for p in &mut self.particles {
            if p.valid {
                p.apply_input_policy(&ctx);
            }
        }

        resolve_contacts(&mut self.particles);

        check_walls(
            &self.wall_checks,
            &self.track,
            &mut self.particles,
            self.config.wall_spring_k,
            self.config.wall_damping_k,
        );

        for spring in &self.springs {
            if self.particles[spring.a].valid {
                spring.apply(&mut self.particles);
            }
        }

        for p in &mut self.particles {
            if !p.valid {
                continue;
            }
            p.integrate(dt);
            p.update_heading(self.controls);

            let pos = p.pos;
            if let Some(car) = p.car_state_mut() {
                if car.finished {
                    continue;
                }
                let angle = finish_line_angle(pos, self.finish_line, self.finish_line_slope);
                if car.advance_laps(angle, self.config.lap_goal) {
                    self.leaderboard.push(RaceResult {
                        car_id: car.id,
                        finish_time: self.elapsed_time,
                        position: self.leaderboard.len() as u32 + 1,
                    });
                }
            }
        }
    }

    /// Get compact snapshot for IPC transfer
    pub fn get_snapshot(&self) -> RaceSnapshot {
        let cars = self
            .particles
            .iter()
            .filter_map(|p| {
                let car = p.car_state()?;
                Some(CarSnapshot {
                    id: car.id,
                    position: p.pos.to_array(),
                    rotation: p.rotation(),
                    speed: p.vel.length(),
                    laps: car.laps,
                    finished: car.finished,
                    valid: p.valid,
                    color: p.color,
                })
            })
            .collect();

        let items = self
            .particles
            .iter()
            .filter_map(|p| match &p.kind {
                ParticleKind::Item(effect) => Some(ItemSnapshot {
                    position: p.pos.to_array(),
                    effect: *effect,
                    valid: p.valid,
                    color: p.color,
                }),
                _ => None,
            })
            .collect();

        RaceSnapshot {
            status: self.status,
            elapsed_time: self.elapsed_time,
            countdown: (-self.elapsed_time).max(0.0),
            lap_goal: self.config.lap_goal,
            cars,
            items,
            leaderboard: self.leaderboard.clone(),
            finisher_count: self.leaderboard.len() as u32,
        }
    }
}

/// Compact car state for IPC transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarSnapshot {
    pub id: u32,
    pub position: [f32; 3],
    /// Heading angle from the +x axis in the zx plane, [0, 2*PI).
    pub rotation: f32,
    pub speed: f32,
    pub laps: i32,
    pub finished: bool,
    pub valid: bool,
    pub color: [f32; 4],
}

/// Compact item state for IPC transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub position: [f32; 3],
    pub effect: ItemEffect,
    pub valid: bool,
    pub color: [f32; 4],
}

/// Compact race snapshot for network/IPC transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub status: RaceStatus,
    pub elapsed_time: f32,
    pub countdown: f32,
    pub lap_goal: i32,
    pub cars: Vec<CarSnapshot>,
    pub items: Vec<ItemSnapshot>,
    pub leaderboard: Vec<RaceResult>,
    pub finisher_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_race() -> Race {
        let mut race = Race::new(RaceConfig::default());
        race.start_countdown();
        race
    }

    /// Jump the clock past the countdown without simulating it.
    fn skip_countdown(race: &mut Race) {
        race.elapsed_time = 0.0;
        race.status = RaceStatus::Racing;
    }

    #[test]
    fn setup_places_player_first_and_registers_walls() {
        let race = Race::new(RaceConfig::default());
        assert!(matches!(race.particles[0].kind, ParticleKind::Player(_)));

        let cars = race.particles.iter().filter(|p| p.is_car()).count();
        assert_eq!(cars, 4);
        assert_eq!(race.wall_checks.len(), 4, "one wall check per car");

        let items = race
            .particles
            .iter()
            .filter(|p| matches!(p.kind, ParticleKind::Item(_)))
            .count();
        assert_eq!(items, 6);
        assert_eq!(race.springs.len(), 6, "one bob tether per item");

        let boosts = race
            .particles
            .iter()
            .filter(|p| matches!(p.kind, ParticleKind::Item(ItemEffect::SpeedBoost)))
            .count();
        assert_eq!(boosts, 3, "half the items boost, half slow");
    }

    #[test]
    fn anchors_are_never_simulated() {
        let race = Race::new(RaceConfig::default());
        for p in &race.particles {
            if matches!(p.kind, ParticleKind::Anchor) {
                assert!(!p.valid);
            }
            if p.valid {
                assert!(p.mass > 0.0, "valid particles must carry positive mass");
            }
        }
    }

    #[test]
    fn countdown_freezes_all_physics() {
        let mut race = started_race();
        // Queue inputs that would normally push the player hard.
        race.set_controls(Controls { accelerate: true, left: true, ..Default::default() });

        let before: Vec<_> = race.particles.iter().map(|p| (p.pos, p.vel)).collect();
        race.advance(0.02);

        assert!(race.elapsed_time < 0.0);
        assert_eq!(race.status, RaceStatus::Countdown);
        for (p, (pos, vel)) in race.particles.iter().zip(before) {
            assert_eq!(p.pos, pos, "countdown must freeze positions exactly");
            assert_eq!(p.vel, vel, "countdown must freeze velocities exactly");
        }
    }

    #[test]
    fn countdown_transitions_to_racing_when_clock_crosses_zero() {
        let mut race = Race::new(RaceConfig { countdown: 0.01, ..Default::default() });
        race.start_countdown();

        race.advance(0.02);
        assert!(race.elapsed_time >= 0.0);
        assert_eq!(race.status, RaceStatus::Racing);
    }

    #[test]
    fn advance_covers_the_frame_in_fixed_substeps() {
        let mut race = started_race();
        let start = race.elapsed_time;
        race.advance(0.0035);
        // ceil(0.0035 / 0.001) = 4 substeps.
        assert!((race.elapsed_time - (start + 0.004)).abs() < 1e-6);
    }

    #[test]
    fn ai_cars_get_moving_once_the_race_is_live() {
        let mut race = started_race();
        skip_countdown(&mut race);

        let before = race.particles[1].pos;
        for _ in 0..10 {
            race.advance(1.0 / 60.0);
        }
        let after = &race.particles[1];
        assert!((after.pos - before).length() > 0.01, "AI car should drive off the line");
        assert!(after.vel.length() > 0.0);
    }

    #[test]
    fn player_sits_still_without_input() {
        let mut race = started_race();
        skip_countdown(&mut race);

        let before = race.particles[0].pos;
        for _ in 0..5 {
            race.advance(1.0 / 60.0);
        }
        assert!(
            (race.particles[0].pos - before).length() < 1e-4,
            "an idle player car must not creep"
        );
    }

    #[test]
    fn leaderboard_entries_append_exactly_once() {
        let mut race = started_race();
        skip_countdown(&mut race);
        race.elapsed_time = 12.5;

        // Park the player on the finish direction with its last lap
        // one wrap away.
        let goal = race.config.lap_goal;
        {
            let player = &mut race.particles[0];
            player.pos = Vec3::new(-1.5, 0.4, -1.5);
            player.vel = Vec3::ZERO;
            let car = player.car_state_mut().unwrap();
            car.laps = goal - 1;
            car.angle_from_finish = 6.2;
        }

        race.advance(race.config.timestep);
        assert_eq!(race.leaderboard.len(), 1);
        let entry = &race.leaderboard[0];
        assert_eq!(entry.car_id, 1);
        assert_eq!(entry.position, 1);
        assert!(entry.finish_time >= 12.5);

        // Finished cars never append again.
        for _ in 0..20 {
            race.advance(1.0 / 60.0);
        }
        assert_eq!(race.leaderboard.len(), 1);
        assert!(race.particles[0].car_state().unwrap().finished);
    }

    #[test]
    fn snapshot_reports_cars_items_and_finish_order() {
        let mut race = started_race();
        let snapshot = race.get_snapshot();
        assert_eq!(snapshot.cars.len(), 4);
        assert_eq!(snapshot.items.len(), 6);
        assert_eq!(snapshot.finisher_count, 0);
        assert_eq!(snapshot.lap_goal, 5);
        assert!(snapshot.countdown > 0.0);
        assert_eq!(snapshot.cars[0].id, 1, "player car leads the snapshot");

        skip_countdown(&mut race);
        race.advance(1.0 / 60.0);
        let snapshot = race.get_snapshot();
        assert_eq!(snapshot.status, RaceStatus::Racing);
        assert!(snapshot.countdown.abs() < 1e-6);
    }
}
