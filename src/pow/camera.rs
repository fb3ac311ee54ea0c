//! Projection of galaxy stars onto the plane orthogonal to a target vector.

use std::sync::Arc;

use super::galaxy::{to_coordinate, Galaxy, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedStar {
    pub id: u32,
    pub u: f64,
    pub v: f64,
}

/// One camera looking into a shared galaxy. Cameras carry distinct ids and
/// each is owned by exactly one worker.
pub struct Camera {
    galaxy: Arc<Galaxy>,
    id: usize,
    target: Vec3,
    window: f64,
}

/// An orthonormal basis of the plane orthogonal to `target`.
fn plane_basis(target: Vec3) -> (Vec3, Vec3) {
    let auxiliary = if target.z.abs() < 0.9 {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        Vec3::new(1.0, 0.0, 0.0)
    };
    let u_axis = target.cross(auxiliary).normalized();
    let v_axis = target.cross(u_axis);
    (u_axis, v_axis)
}

impl Camera {
    pub(crate) fn new(galaxy: Arc<Galaxy>, id: usize, window: f64) -> Self {
        Self {
            galaxy,
            id,
            target: Vec3::new(0.0, 0.0, 1.0),
            window,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target.normalized();
    }

    /// Derives the target direction from a `(proof_num, index)` pair via the
    /// galaxy's keyed PRF.
    pub fn set_target_from(&mut self, proof_num: u64, index: u64) {
        let keys = self.galaxy.keys();
        let direction = Vec3::new(
            to_coordinate(keys.prf_pair(proof_num, index, 0)),
            to_coordinate(keys.prf_pair(proof_num, index, 1)),
            to_coordinate(keys.prf_pair(proof_num, index, 2)),
        );
        self.target = direction.normalized();
    }

    /// Projects the stars in the buckets around the target onto the target
    /// plane, keeping those inside the focal window.
    pub fn take_picture(&self, out: &mut Vec<ProjectedStar>) {
        out.clear();
        let (u_axis, v_axis) = plane_basis(self.target);

        for bucket in self.galaxy.buckets_near(self.target) {
            for &id in bucket {
                let position = self.galaxy.star(id).position;
                if position.dot(self.target) <= 0.0 {
                    continue;
                }
                let u = position.dot(u_axis);
                let v = position.dot(v_axis);
                if u.abs() <= self.window && v.abs() <= self.window {
                    out.push(ProjectedStar { id, u, v });
                }
            }
        }
    }
}
