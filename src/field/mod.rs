//! Field evaluation boundary
//!
//! Acceleration structures only ever need two things from the numeric
//! kernel: a point evaluation and (for shading consumers) a gradient. Both
//! are expressed through [`FieldSampler`], which every committed volume
//! family implements and which build code uses to estimate value ranges.

use serde::{Deserialize, Serialize};

use crate::core::types::Vec3;

/// Reconstruction filter used when evaluating between voxel samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Nearest,
    #[default]
    Trilinear,
}

/// Trait for anything that can be evaluated as a scalar field in object space.
///
/// `time` is in `[0, 1]`; time-invariant fields ignore it. Points outside the
/// field's domain evaluate to NaN.
pub trait FieldSampler: Send + Sync {
    /// Evaluate `attribute` at `point`
    fn evaluate(&self, point: Vec3, attribute: usize, time: f32) -> f32;

    /// Gradient by central differences with step `gradient_step`
    fn gradient(&self, point: Vec3, attribute: usize, time: f32) -> Vec3 {
        let h = self.gradient_step();
        let dx = Vec3::new(h.x, 0.0, 0.0);
        let dy = Vec3::new(0.0, h.y, 0.0);
        let dz = Vec3::new(0.0, 0.0, h.z);
        Vec3::new(
            self.evaluate(point + dx, attribute, time) - self.evaluate(point - dx, attribute, time),
            self.evaluate(point + dy, attribute, time) - self.evaluate(point - dy, attribute, time),
            self.evaluate(point + dz, attribute, time) - self.evaluate(point - dz, attribute, time),
        ) / (2.0 * h)
    }

    /// Batch evaluation; `out` must be at least as long as `points`.
    ///
    /// The scalar loop is the reference behavior; implementations may
    /// vectorize as long as results match.
    fn evaluate_batch(&self, points: &[Vec3], attribute: usize, time: f32, out: &mut [f32]) {
        debug_assert!(out.len() >= points.len());
        for (p, o) in points.iter().zip(out.iter_mut()) {
            *o = self.evaluate(*p, attribute, time);
        }
    }

    /// Finite-difference step per axis used by [`FieldSampler::gradient`]
    fn gradient_step(&self) -> Vec3 {
        Vec3::splat(1e-3)
    }
}

/// Closure-backed field, mostly useful for tests and procedural inputs
pub struct FnField<F> {
    func: F,
}

impl<F> FnField<F>
where
    F: Fn(Vec3) -> f32 + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> FieldSampler for FnField<F>
where
    F: Fn(Vec3) -> f32 + Send + Sync,
{
    fn evaluate(&self, point: Vec3, _attribute: usize, _time: f32) -> f32 {
        (self.func)(point)
    }
}

/// Linear blend used by every trilinear/temporal reconstruction
#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_field_gradient() {
        let field = FnField::new(|p: Vec3| 2.0 * p.x + 3.0 * p.y - p.z);
        let g = field.gradient(Vec3::new(1.0, 2.0, 3.0), 0, 0.0);
        assert!((g - Vec3::new(2.0, 3.0, -1.0)).length() < 1e-2);
    }

    #[test]
    fn test_batch_matches_scalar() {
        let field = FnField::new(|p: Vec3| p.length());
        let points = [Vec3::ZERO, Vec3::X, Vec3::new(3.0, 4.0, 0.0)];
        let mut out = [0.0; 3];
        field.evaluate_batch(&points, 0, 0.0, &mut out);
        assert_eq!(out, [0.0, 1.0, 5.0]);
    }
}
