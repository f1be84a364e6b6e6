//! Particle - Point-mass simulation state and per-kind behavior
//!
//! Every simulated object is a `Particle`: a point mass with a force
//! accumulator rebuilt each tick. A kind tag carries the per-variant
//! payload (player car, AI car with a private racing line, pickup item,
//! or a fixed spring anchor) and selects the input policy, collision
//! response, and lap tracking applied to it.

use std::f32::consts::TAU;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::game_server::track::HermiteSpline;

/// Extra reach added to the collision radius sum, so contacts register
/// just before the hulls visually touch.
pub const SAFE_EDGE: f32 = 0.1;
/// Displacement below this is treated as standing still, which gates the
/// friction direction (no flutter at near-zero speed) and the idle
/// velocity snap.
pub const DISPLACEMENT_EPS: f32 = 1e-5;
/// Forward thrust, shared by player acceleration and AI drive.
pub const THRUST_FORWARD: f32 = 12.0;
/// Braking thrust against the forward direction.
pub const THRUST_BRAKE: f32 = 10.0;
/// Divisor in the lateral grip estimate `|N| * mu_s * v^2 / LATERAL_REF`.
pub const LATERAL_REF: f32 = 50.0;
/// Heading rotation per substep while steering (2 rad/s at the 1 ms
/// timestep).
pub const TURN_STEP: f32 = 2.0e-3;
/// AI lateral pull strength toward its racing line, scaled by speed.
pub const AI_CENTERING_GAIN: f32 = 1.2;
/// A single-tick finish-angle jump past this magnitude is a wraparound
/// through the finish line, not real angular motion. Normal racing moves
/// well under 0.1 rad per substep (max speed ~20 at radius ~15 over
/// 1 ms), while a wrap lands near 2*PI; anything between those bounds
/// works, and the margin must be retuned if timestep or speeds change.
pub const LAP_WRAP_THRESHOLD: f32 = 6.0;

/// Pressed-control flags, set by the frontend input layer before each
/// tick batch and shared by every update within it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Controls {
    pub accelerate: bool,
    pub brake: bool,
    pub left: bool,
    pub right: bool,
}

impl Controls {
    pub fn any(&self) -> bool {
        self.accelerate || self.brake || self.left || self.right
    }
}

/// Environment read by the input policies each substep.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext {
    pub gravity: Vec3,
    pub static_friction: f32,
    pub kinetic_friction: f32,
    pub controls: Controls,
}

/// What touching an item does to a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEffect {
    /// +1 max speed, permanently.
    SpeedBoost,
    /// -1 max speed, permanently.
    SlowDown,
}

/// Race-progress state shared by player and AI cars.
#[derive(Debug, Clone)]
pub struct CarState {
    pub id: u32,
    /// Completed laps; can go negative when driving backward across the
    /// finish line.
    pub laps: i32,
    /// Displacement over the last substep.
    pub delta_pos: Vec3,
    /// Terminal once set; lap tracking short-circuits afterward.
    pub finished: bool,
    /// Signed angle from the finish line last substep, in [0, 2*PI).
    pub angle_from_finish: f32,
    /// Unit heading vector.
    pub forward: Vec3,
}

impl CarState {
    pub fn new(id: u32, forward: Vec3) -> Self {
        Self {
            id,
            laps: 0,
            delta_pos: Vec3::ZERO,
            finished: false,
            angle_from_finish: 0.0,
            forward,
        }
    }

    /// Fold a freshly measured finish-line angle into the lap count.
    ///
    /// A drop past the wrap threshold is a completed forward revolution,
    /// a rise past it is a backward wraparound. Returns true on the one
    /// tick the car reaches the lap goal.
    pub fn advance_laps(&mut self, angle: f32, lap_goal: i32) -> bool {
        if self.finished {
            return false;
        }
        let delta_angle = angle - self.angle_from_finish;
        self.angle_from_finish = angle;

        if delta_angle < -LAP_WRAP_THRESHOLD {
            self.laps += 1;
        }
        if self.laps == lap_goal {
            self.finished = true;
            return true;
        }
        if delta_angle > LAP_WRAP_THRESHOLD {
            self.laps -= 1;
        }
        false
    }
}

/// Variant payload selecting a particle's behavior.
#[derive(Debug, Clone)]
pub enum ParticleKind {
    /// Fixed spring endpoint; never simulated or collided with.
    Anchor,
    /// The keyboard-driven car (always particle 0 in a race).
    Player(CarState),
    /// An AI car following its private racing line.
    Ai(CarState, HermiteSpline),
    /// A single-use pickup.
    Item(ItemEffect),
}

/// A point mass in the simulation.
#[derive(Debug, Clone)]
pub struct Particle {
    pub mass: f32,
    pub pos: Vec3,
    pub vel: Vec3,
    /// Derived each substep from the accumulated force.
    pub acc: Vec3,
    /// External force accumulator, rebuilt every substep.
    pub ext_force: Vec3,
    /// Speed clamp applied to cars after velocity integration.
    pub max_speed: f32,
    /// Alive flag; false removes the particle from simulation without
    /// removing it from storage (consumed items, anchors).
    pub valid: bool,
    /// Collision radius in the x/z plane (half the visual scale).
    pub radius: f32,
    /// RGBA tint forwarded to the renderer.
    pub color: [f32; 4],
    pub kind: ParticleKind,
}

impl Particle {
    pub fn new(kind: ParticleKind) -> Self {
        Self {
            mass: 0.0,
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            acc: Vec3::ZERO,
            ext_force: Vec3::ZERO,
            max_speed: 0.0,
            valid: false,
            radius: 0.0,
            color: [1.0, 1.0, 1.0, 1.0],
            kind,
        }
    }

    pub fn is_car(&self) -> bool {
        matches!(self.kind, ParticleKind::Player(_) | ParticleKind::Ai(..))
    }

    pub fn car_state(&self) -> Option<&CarState> {
        match &self.kind {
            ParticleKind::Player(car) | ParticleKind::Ai(car, _) => Some(car),
            _ => None,
        }
    }

    pub fn car_state_mut(&mut self) -> Option<&mut CarState> {
        match &mut self.kind {
            ParticleKind::Player(car) | ParticleKind::Ai(car, _) => Some(car),
            _ => None,
        }
    }

    /// Phase 1: zero the force accumulator and rebuild it from this
    /// particle's input policy.
    pub fn apply_input_policy(&mut self, ctx: &PolicyContext) {
        self.ext_force = Vec3::ZERO;
        match self.kind {
            ParticleKind::Anchor | ParticleKind::Item(_) => {}
            ParticleKind::Player(_) => {
                self.apply_kinetic_friction(ctx);
                self.apply_player_controls(ctx);
            }
            ParticleKind::Ai(..) => {
                self.apply_kinetic_friction(ctx);
                self.apply_ai_steering();
            }
        }
    }

    /// Kinetic friction opposing the velocity direction, gated on actual
    /// displacement last substep.
    fn apply_kinetic_friction(&mut self, ctx: &PolicyContext) {
        let Some(car) = self.car_state() else { return };
        if car.delta_pos.length() <= DISPLACEMENT_EPS {
            return;
        }
        let normal_force = ctx.gravity * -self.mass;
        let friction = normal_force.length() * ctx.kinetic_friction;
        self.ext_force += self.vel.normalize_or_zero() * -friction;
    }

    /// Keyboard policy: thrust/brake along the heading, lateral grip
    /// force while turning, and a velocity snap to zero when idle so the
    /// car cannot creep.
    fn apply_player_controls(&mut self, ctx: &PolicyContext) {
        let ParticleKind::Player(car) = &self.kind else { return };
        let forward = car.forward;
        let standing = car.delta_pos.length() < DISPLACEMENT_EPS;

        if !ctx.controls.any() {
            if standing {
                self.vel = Vec3::ZERO;
            }
            return;
        }

        let normal_force = ctx.gravity * -self.mass;
        let grip = normal_force.length() * ctx.static_friction * self.vel.length_squared()
            / LATERAL_REF;
        let lateral = forward.cross(Vec3::Y);

        if ctx.controls.accelerate {
            self.ext_force += forward * THRUST_FORWARD;
        }
        if ctx.controls.brake {
            self.ext_force -= forward * THRUST_BRAKE;
        }
        if ctx.controls.right {
            self.ext_force += lateral * grip;
        }
        if ctx.controls.left {
            self.ext_force -= lateral * grip;
        }
    }

    /// AI policy: constant drive along the private path's tangent plus a
    /// speed-proportional pull toward the nearest path point, projected
    /// onto the path's horizontal axis. The pull has no damping term, so
    /// fast cars can oscillate around their line.
    fn apply_ai_steering(&mut self) {
        let ParticleKind::Ai(_, path) = &self.kind else { return };
        let frame = path.frame_at(self.pos);

        let mut force = frame.tangent * THRUST_FORWARD;
        let pos_to_spline = frame.nearest - self.pos;
        let centering = frame.horizontal * pos_to_spline.dot(frame.horizontal);
        if centering.length() > 0.0 {
            force += centering.normalize() * (self.vel.length() * AI_CENTERING_GAIN);
        }
        self.ext_force += force;
    }

    /// Phase 5: Newtonian integration with a per-car speed clamp.
    pub fn integrate(&mut self, dt: f32) {
        if !self.valid {
            return;
        }
        debug_assert!(self.mass > 0.0, "valid particles must carry positive mass");

        let old_pos = self.pos;
        self.acc = self.ext_force / self.mass;
        self.vel += self.acc * dt;
        if self.is_car() && self.vel.length() > self.max_speed {
            self.vel = self.vel.normalize() * self.max_speed;
        }
        self.pos += self.vel * dt;

        let delta = self.pos - old_pos;
        if let Some(car) = self.car_state_mut() {
            car.delta_pos = delta;
        }
    }

    /// Heading control, decoupled from the translational forces: players
    /// rotate their heading a fixed step per substep, AI headings follow
    /// actual motion.
    pub fn update_heading(&mut self, controls: Controls) {
        let vel = self.vel;
        match &mut self.kind {
            ParticleKind::Player(car) => {
                if controls.left {
                    car.forward = Quat::from_rotation_y(TURN_STEP) * car.forward;
                }
                if controls.right {
                    car.forward = Quat::from_rotation_y(-TURN_STEP) * car.forward;
                }
            }
            ParticleKind::Ai(car, _) => {
                if vel.length() != 0.0 {
                    car.forward = vel.normalize();
                }
            }
            _ => {}
        }
    }

    /// Heading angle relative to the +x axis in the zx plane, mirrored
    /// into [0, 2*PI) when the heading points toward -z.
    pub fn rotation(&self) -> f32 {
        let Some(car) = self.car_state() else { return 0.0 };
        let mut theta = car.forward.dot(Vec3::X).clamp(-1.0, 1.0).acos();
        if car.forward.z < 0.0 {
            theta = TAU - theta;
        }
        theta
    }
}

/// Horizontal-plane overlap test used by car-vs-car and car-vs-item
/// contacts.
pub fn are_colliding(a: &Particle, b: &Particle) -> bool {
    let a_zx = Vec3::new(a.pos.x, 0.0, a.pos.z);
    let b_zx = Vec3::new(b.pos.x, 0.0, b.pos.z);
    (a_zx - b_zx).length() <= a.radius + b.radius + SAFE_EDGE
}

/// Phase 2: pairwise contact resolution, run for cars only.
///
/// Car-vs-car applies equal/opposite horizontal repulsion scaled by the
/// square of the combined velocity magnitude (zero at rest, even when
/// overlapping). Car-vs-item applies the item's effect to the car's max
/// speed and consumes the item. O(n^2) over a handful of particles.
pub fn resolve_contacts(particles: &mut [Particle]) {
    for i in 0..particles.len() {
        if !particles[i].valid || !particles[i].is_car() {
            continue;
        }
        for j in 0..particles.len() {
            if i == j || !particles[j].valid {
                continue;
            }
            if !are_colliding(&particles[i], &particles[j]) {
                continue;
            }
            if particles[j].is_car() {
                let total_vel = (particles[i].vel + particles[j].vel).length();
                let mut axis = particles[j].pos - particles[i].pos;
                axis.y = 0.0;
                let push = axis.normalize_or_zero() * (total_vel * total_vel);
                particles[i].ext_force -= push;
                particles[j].ext_force += push;
            } else if let ParticleKind::Item(effect) = &particles[j].kind {
                match effect {
                    ItemEffect::SpeedBoost => particles[i].max_speed += 1.0,
                    ItemEffect::SlowDown => particles[i].max_speed -= 1.0,
                }
                particles[j].valid = false;
            }
        }
    }
}

/// Signed angle between a position and the finish line in the zx plane,
/// in [0, 2*PI). Cars travel counterclockwise, so the angle decreases
/// toward zero as a car approaches the line from behind.
///
/// The arccos argument is clamped against floating-point drift; the
/// mirror test uses which side of the finish line's through-origin line
/// (slope = x/z) the car sits on, combined with the line's z sign.
pub fn finish_line_angle(pos: Vec3, finish_line: Vec3, finish_slope: f32) -> f32 {
    let pos_zx = Vec3::new(pos.x, 0.0, pos.z).normalize_or_zero();
    let finish_zx = Vec3::new(finish_line.x, 0.0, finish_line.z).normalize_or_zero();
    let cos_pf = pos_zx.dot(finish_zx).clamp(-1.0, 1.0);
    let mut angle = cos_pf.acos();

    if finish_line.z > 0.0 && pos.x < finish_slope * pos.z {
        angle = TAU - angle;
    } else if finish_line.z < 0.0 && pos.x > finish_slope * pos.z {
        angle = TAU - angle;
    }
    angle
}
