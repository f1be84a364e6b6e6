//! Spring - Spring/damper force primitives and particle connectors
//!
//! Stateless penalty-force math shared by the item tethers and the
//! track-wall response, plus the `Spring` connector that couples two
//! particles in the simulation.

use glam::Vec3;

use crate::game_server::particle::Particle;

/// Spring force on a point at `xi` pulled toward `xj`.
///
/// Zero separation is a defined edge case: the direction falls back to
/// the zero vector, so the returned force is zero.
pub fn spring_force(xi: Vec3, xj: Vec3, ks: f32, rest_length: f32) -> Vec3 {
    let d_vec = xj - xi;
    let d = d_vec.length();
    let d_hat = d_vec.normalize_or_zero();
    d_hat * (ks * (d - rest_length))
}

/// Damping force on a point at `xi` moving with `vi`, relative to a
/// point at `xj` moving with `vj`, projected along the separation axis.
pub fn damping_force(xi: Vec3, xj: Vec3, vi: Vec3, vj: Vec3, kd: f32) -> Vec3 {
    let d_hat = (xj - xi).normalize_or_zero();
    let v_vec = vj - vi;
    d_hat * (kd * v_vec.dot(d_hat))
}

/// A persistent spring/damper between two particles, addressed by index
/// into the race's particle list.
#[derive(Debug, Clone, Copy)]
pub struct Spring {
    /// Index of the first endpoint.
    pub a: usize,
    /// Index of the second endpoint.
    pub b: usize,
    /// Spring stiffness.
    pub ks: f32,
    /// Damping coefficient.
    pub kd: f32,
    /// Rest length.
    pub rest_length: f32,
}

impl Spring {
    /// Apply equal and opposite spring+damper forces to both endpoints.
    ///
    /// Indices out of range are a setup bug and panic.
    pub fn apply(&self, particles: &mut [Particle]) {
        let (xa, va) = (particles[self.a].pos, particles[self.a].vel);
        let (xb, vb) = (particles[self.b].pos, particles[self.b].vel);

        let fs = spring_force(xa, xb, self.ks, self.rest_length);
        let fd = damping_force(xa, xb, va, vb, self.kd);
        let fe = fs + fd;

        particles[self.a].ext_force += fe;
        particles[self.b].ext_force -= fe;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_server::particle::{Particle, ParticleKind};

    const EPS: f32 = 1e-5;

    fn anchor_at(pos: Vec3) -> Particle {
        let mut p = Particle::new(ParticleKind::Anchor);
        p.pos = pos;
        p
    }

    #[test]
    fn spring_force_points_toward_other_end() {
        let f = spring_force(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0), 50.0, 0.0);
        assert!((f - Vec3::new(0.0, 100.0, 0.0)).length() < EPS);
    }

    #[test]
    fn spring_force_respects_rest_length() {
        let f = spring_force(Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), 10.0, 3.0);
        assert!(f.length() < EPS);
    }

    #[test]
    fn zero_separation_yields_zero_force() {
        let x = Vec3::new(1.0, 2.0, 3.0);
        let fs = spring_force(x, x, 500.0, 0.0);
        let fd = damping_force(x, x, Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 50.0);
        assert!(fs.length() < EPS);
        assert!(fd.length() < EPS);
    }

    #[test]
    fn damping_force_opposes_separation_velocity() {
        // xj receding along +x at 2 units/s: damper pulls xi forward.
        let f = damping_force(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
            50.0,
        );
        assert!((f - Vec3::new(100.0, 0.0, 0.0)).length() < EPS);
    }

    #[test]
    fn connector_applies_equal_and_opposite_forces() {
        let mut particles = vec![
            anchor_at(Vec3::ZERO),
            anchor_at(Vec3::new(0.0, 0.15, 0.0)),
        ];
        let spring = Spring { a: 0, b: 1, ks: 50.0, kd: 0.0, rest_length: 0.0 };
        spring.apply(&mut particles);

        let fa = particles[0].ext_force;
        let fb = particles[1].ext_force;
        assert!((fa + fb).length() < EPS);
        assert!(fa.y > 0.0, "first endpoint pulled up toward the anchor");
    }
}
