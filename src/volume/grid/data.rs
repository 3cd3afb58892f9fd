//! Dense voxel grid input and reconstruction

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3};
use crate::field::{lerp, Filter};
use crate::math::Aabb;

/// How index space maps to object space
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridGeometry {
    /// `object = grid_origin + index * grid_spacing`
    #[default]
    Regular,
    /// Index axes are (radius, inclination, azimuth) in radians;
    /// `grid_origin`/`grid_spacing` are given in those units
    Spherical,
}

/// Dense grid of per-voxel samples, one array per attribute
///
/// Voxel data is laid out with x varying fastest, then y, then z.
#[derive(Clone, Debug)]
pub struct StructuredGrid {
    pub dimensions: UVec3,
    pub grid_origin: Vec3,
    pub grid_spacing: Vec3,
    pub geometry: GridGeometry,
    pub attributes: Vec<Vec<f32>>,
}

impl StructuredGrid {
    /// Regular grid with unit spacing at the origin
    pub fn regular(dimensions: UVec3, attributes: Vec<Vec<f32>>) -> Self {
        Self {
            dimensions,
            grid_origin: Vec3::ZERO,
            grid_spacing: Vec3::ONE,
            geometry: GridGeometry::Regular,
            attributes,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.x as usize * self.dimensions.y as usize * self.dimensions.z as usize
    }

    /// Check dimensions, data lengths and geometry parameters
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.min_element() < 2 {
            return Err(Error::validation(format!(
                "grid dimensions must be at least 2 on every axis, got {:?}",
                self.dimensions
            )));
        }
        if self.attributes.is_empty() {
            return Err(Error::validation("grid has no attribute data"));
        }
        let expected = self.voxel_count();
        for (i, data) in self.attributes.iter().enumerate() {
            if data.len() != expected {
                return Err(Error::validation(format!(
                    "attribute {} has {} voxels, expected {}",
                    i,
                    data.len(),
                    expected
                )));
            }
        }
        if !(self.grid_spacing.min_element() > 0.0) || !self.grid_origin.is_finite() {
            return Err(Error::validation("grid spacing must be positive and origin finite"));
        }
        if self.geometry == GridGeometry::Spherical {
            let extent = self.index_extent_max();
            let last = self.grid_origin + self.grid_spacing * extent;
            if self.grid_origin.x < 0.0
                || self.grid_origin.y < 0.0
                || last.y > PI + 1e-4
                || self.grid_origin.z < -2.0 * PI - 1e-4
                || last.z - self.grid_origin.z > 2.0 * PI + 1e-4
            {
                return Err(Error::validation(
                    "spherical grid must have radius >= 0, inclination in [0, pi] and azimuth span <= 2pi",
                ));
            }
        }
        Ok(())
    }

    /// Largest valid index coordinate on each axis
    pub fn index_extent_max(&self) -> Vec3 {
        (self.dimensions - UVec3::ONE).as_vec3()
    }

    /// Linear voxel index for integer coordinates
    #[inline]
    pub fn linear_index(&self, x: u32, y: u32, z: u32) -> usize {
        x as usize
            + self.dimensions.x as usize * (y as usize + self.dimensions.y as usize * z as usize)
    }

    #[inline]
    pub fn voxel(&self, attribute: usize, x: u32, y: u32, z: u32) -> f32 {
        self.attributes[attribute][self.linear_index(x, y, z)]
    }

    /// Object-space bounding box of the grid domain
    pub fn bounds(&self) -> Aabb {
        match self.geometry {
            GridGeometry::Regular => Aabb::new(
                self.grid_origin,
                self.grid_origin + self.grid_spacing * self.index_extent_max(),
            ),
            GridGeometry::Spherical => {
                let r = self.grid_origin.x + self.grid_spacing.x * self.index_extent_max().x;
                Aabb::new(Vec3::splat(-r), Vec3::splat(r))
            }
        }
    }

    /// Map an object-space point to continuous index coordinates
    pub fn object_to_index(&self, p: Vec3) -> Vec3 {
        match self.geometry {
            GridGeometry::Regular => (p - self.grid_origin) / self.grid_spacing,
            GridGeometry::Spherical => {
                let r = p.length();
                let inclination = if r > 0.0 { (p.z / r).clamp(-1.0, 1.0).acos() } else { 0.0 };
                let mut azimuth = p.y.atan2(p.x);
                if azimuth < self.grid_origin.z {
                    azimuth += 2.0 * PI;
                }
                (Vec3::new(r, inclination, azimuth) - self.grid_origin) / self.grid_spacing
            }
        }
    }

    /// Map index coordinates to an object-space point
    pub fn index_to_object(&self, i: Vec3) -> Vec3 {
        let c = self.grid_origin + i * self.grid_spacing;
        match self.geometry {
            GridGeometry::Regular => c,
            GridGeometry::Spherical => {
                let (r, inclination, azimuth) = (c.x, c.y, c.z);
                Vec3::new(
                    r * inclination.sin() * azimuth.cos(),
                    r * inclination.sin() * azimuth.sin(),
                    r * inclination.cos(),
                )
            }
        }
    }

    /// Reconstruct `attribute` at an object-space point; NaN outside the grid
    pub fn sample(&self, filter: Filter, point: Vec3, attribute: usize) -> f32 {
        let ic = self.object_to_index(point);
        self.sample_index(filter, ic, attribute)
    }

    /// Reconstruct at continuous index coordinates
    pub fn sample_index(&self, filter: Filter, ic: Vec3, attribute: usize) -> f32 {
        let upper = self.index_extent_max();
        let eps = 1e-4;
        if ic.cmplt(Vec3::splat(-eps)).any() || ic.cmpgt(upper + eps).any() || ic.is_nan() {
            return f32::NAN;
        }
        let ic = ic.clamp(Vec3::ZERO, upper);
        match filter {
            Filter::Nearest => {
                let n = (ic + 0.5).floor().min(upper).as_uvec3();
                self.voxel(attribute, n.x, n.y, n.z)
            }
            Filter::Trilinear => {
                // Lower corner clamped so the +1 neighbor stays inside
                let i0 = ic.floor().min(upper - Vec3::ONE).as_uvec3();
                let f = ic - i0.as_vec3();
                let v = |dx: u32, dy: u32, dz: u32| self.voxel(attribute, i0.x + dx, i0.y + dy, i0.z + dz);
                let c00 = lerp(v(0, 0, 0), v(1, 0, 0), f.x);
                let c10 = lerp(v(0, 1, 0), v(1, 1, 0), f.x);
                let c01 = lerp(v(0, 0, 1), v(1, 0, 1), f.x);
                let c11 = lerp(v(0, 1, 1), v(1, 1, 1), f.x);
                lerp(lerp(c00, c10, f.y), lerp(c01, c11, f.y), f.z)
            }
        }
    }
}
