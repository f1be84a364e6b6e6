//! Track - Centerline spline evaluation and wall collision
//!
//! The track is a rectangular-profile ribbon swept along a closed
//! piecewise-Hermite loop. Physics only ever needs the centerline: the
//! local frame at a car's position drives both AI steering and the
//! penalty force that keeps cars inside the walled corridor. Mesh
//! generation from the same curve lives in the frontend.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game_server::particle::Particle;
use crate::game_server::spring::{damping_force, spring_force};

/// Finite-difference step for tangent estimation.
const TINY_STEP: f32 = 1e-3;
/// Samples scanned by the nearest-parameter search. Accuracy of the
/// projection is bounded by 1/SCAN_POINTS; fine enough because track
/// curvature is gentle and cars move a tiny fraction of the loop per
/// tick.
const SCAN_POINTS: u32 = 128;

/// A piecewise cubic Hermite curve through ordered control points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HermiteSpline {
    pub points: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
}

impl HermiteSpline {
    /// Build a spline from control points and matching tangents.
    ///
    /// Mismatched lengths are a setup bug.
    pub fn new(points: Vec<Vec3>, tangents: Vec<Vec3>) -> Self {
        assert_eq!(
            points.len(),
            tangents.len(),
            "control points and tangents must share the same length"
        );
        assert!(points.len() >= 2, "a spline needs at least two control points");
        Self { points, tangents }
    }

    /// Evaluate the curve at parameter `t`, clamped to [0, 1].
    pub fn position_at(&self, t: f32) -> Vec3 {
        let t = t.clamp(0.0, 1.0);
        let n = self.points.len();
        let x = |k: usize| k as f32 / (n - 1) as f32;

        // Segment whose parametric sub-range contains t.
        let mut k = 0;
        while k + 2 < n && x(k + 1) < t {
            k += 1;
        }

        let width = x(k + 1) - x(k);
        let u = (t - x(k)) / width;
        let (u2, u3) = (u * u, u * u * u);

        let h00 = 2.0 * u3 - 3.0 * u2 + 1.0;
        let h10 = u3 - 2.0 * u2 + u;
        let h01 = -2.0 * u3 + 3.0 * u2;
        let h11 = u3 - u2;

        self.points[k] * h00
            + self.tangents[k] * (h10 * width)
            + self.points[k + 1] * h01
            + self.tangents[k + 1] * (h11 * width)
    }

    /// Coarse discrete projection: the parameter among `SCAN_POINTS`
    /// uniform samples whose curve point lies closest to `point`.
    pub fn nearest_t(&self, point: Vec3) -> f32 {
        let step = |i: u32| i as f32 / SCAN_POINTS as f32;
        let mut best_t = 0.0;
        let mut best_dist = f32::INFINITY;
        for i in 0..=SCAN_POINTS {
            let t = step(i);
            let dist = (point - self.position_at(t)).length();
            if dist < best_dist {
                best_dist = dist;
                best_t = t;
            }
        }
        best_t
    }

    /// Local moving frame at the curve point nearest to `point`.
    pub fn frame_at(&self, point: Vec3) -> Frame {
        let t = self.nearest_t(point);
        let nearest = self.position_at(t);
        let tangent = ((self.position_at(t + TINY_STEP) - nearest) / TINY_STEP)
            .normalize_or_zero();
        let horizontal = tangent.cross(Vec3::Y).normalize_or_zero();
        let normal = horizontal.cross(tangent).normalize_or_zero();
        Frame { tangent, normal, horizontal, nearest }
    }
}

/// Orthonormal basis at a point on the track: forward tangent, up-biased
/// normal, rightward horizontal, plus the nearest centerline point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Frame {
    pub tangent: Vec3,
    pub normal: Vec3,
    pub horizontal: Vec3,
    pub nearest: Vec3,
}

/// Per-car wall-collision registration: which particle to test and the
/// corridor/car dimensions its check closes over.
#[derive(Debug, Clone, Copy)]
pub struct WallCheck {
    /// Index of the car particle in the race's particle list.
    pub particle: usize,
    /// Full corridor width between the inner wall faces.
    pub track_width: f32,
    /// Car collision diameter.
    pub car_width: f32,
}

/// A detected wall contact, ready for penalty-force response.
#[derive(Debug, Clone, Copy)]
pub struct WallContact {
    /// Point on the wall at the car's longitudinal position.
    pub wall_point: Vec3,
    /// Horizontal unit vector from track center toward the touched wall.
    pub outward: Vec3,
}

/// Test a car position against the corridor walls.
///
/// Detection compares the car's horizontal distance from the centerline
/// against half the corridor width; contact is flagged when the gap to
/// the wall shrinks below the car's radius.
pub fn detect_wall_contact(
    spline: &HermiteSpline,
    pos: Vec3,
    track_width: f32,
    car_width: f32,
) -> Option<WallContact> {
    let frame = spline.frame_at(pos);

    let mut center_to_pos = pos - frame.nearest;
    center_to_pos.y = 0.0;
    let half_width = track_width / 2.0;
    let distance = (half_width - center_to_pos.length()).abs();

    if distance > car_width / 2.0 {
        return None;
    }

    // Which side of the centerline the car sits on, judged in the
    // horizontal plane.
    let direction = (pos - frame.nearest).normalize_or_zero();
    let horizontal_2d = Vec3::new(frame.horizontal.x, 0.0, frame.horizontal.z);
    let direction_2d = Vec3::new(direction.x, 0.0, direction.z);
    let side = if direction_2d.dot(horizontal_2d) < 0.0 { -1.0 } else { 1.0 };

    let wall_pos = frame.nearest + horizontal_2d * (half_width * side);
    Some(WallContact {
        wall_point: Vec3::new(wall_pos.x, pos.y, wall_pos.z),
        outward: horizontal_2d * side,
    })
}

/// Run every registered wall check, pushing penalty forces into the
/// contacting cars' force accumulators.
///
/// Purely additive: integration happens later in the same tick. Wall
/// forces are horizontal-only, so the vertical component is zeroed
/// after the spring+damper contribution.
pub fn check_walls(
    checks: &[WallCheck],
    spline: &HermiteSpline,
    particles: &mut [Particle],
    wall_spring_k: f32,
    wall_damping_k: f32,
) {
    for check in checks {
        let car = &particles[check.particle];
        if !car.valid {
            continue;
        }
        let Some(contact) =
            detect_wall_contact(spline, car.pos, check.track_width, check.car_width)
        else {
            continue;
        };

        // Contact point on the car hull, offset outward by its radius.
        let car_point = car.pos + contact.outward * (check.car_width / 2.0);

        let fs = spring_force(car_point, contact.wall_point, wall_spring_k, 0.0);
        let fd = damping_force(car_point, contact.wall_point, car.vel, Vec3::ZERO, wall_damping_k);

        let car = &mut particles[check.particle];
        car.ext_force += fs + fd;
        car.ext_force.y = 0.0;
    }
}
