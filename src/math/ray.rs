//! Ray type and operations

use crate::core::types::Vec3;
use super::aabb::Aabb;
use super::range::ValueRange;

/// A ray defined by origin and direction
///
/// The direction is not required to be normalized; ray parameters `t` are
/// measured in units of the direction length, as supplied by the caller.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Precomputed 1/direction for fast AABB intersection
    pub inv_direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: Vec3::new(
                1.0 / direction.x,
                1.0 / direction.y,
                1.0 / direction.z,
            ),
        }
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray-AABB intersection using slab method, clipped to `t_range`
    ///
    /// Returns the overlap of the ray's parameter span inside the box with
    /// `t_range`, or an empty range if there is none.
    pub fn clip(&self, aabb: &Aabb, t_range: ValueRange) -> ValueRange {
        if aabb.is_empty() {
            return ValueRange::EMPTY;
        }
        let mut t_near = t_range.lower;
        let mut t_far = t_range.upper;
        for axis in 0..3 {
            let o = self.origin[axis];
            if self.direction[axis] == 0.0 {
                // Parallel to this slab pair: either always inside or never
                if o < aabb.min[axis] || o > aabb.max[axis] {
                    return ValueRange::EMPTY;
                }
                continue;
            }
            let inv = self.inv_direction[axis];
            let t0 = (aabb.min[axis] - o) * inv;
            let t1 = (aabb.max[axis] - o) * inv;
            t_near = t_near.max(t0.min(t1));
            t_far = t_far.min(t0.max(t1));
        }

        ValueRange::new(t_near, t_far)
    }
}
