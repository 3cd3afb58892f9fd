//! Dense structured grids and their macrocell acceleration structure

pub mod data;
pub mod accelerator;
pub mod iterator;

pub use data::{GridGeometry, StructuredGrid};
pub use accelerator::GridAccelerator;
pub use iterator::GridIntervalIterator;

use crate::core::types::{Result, Vec3};
use crate::field::{FieldSampler, Filter};
use crate::math::{Aabb, ValueRange};
use super::config::GridConfig;

/// Committed dense grid: the raw data plus its macrocell value ranges
#[derive(Debug)]
pub struct GridVolume {
    grid: StructuredGrid,
    accelerator: GridAccelerator,
}

impl GridVolume {
    /// Validate the grid and build its accelerator
    pub fn build(grid: StructuredGrid, config: &GridConfig) -> Result<Self> {
        grid.validate()?;
        let accelerator = GridAccelerator::build(&grid, config.macrocell_width)?;
        Ok(Self { grid, accelerator })
    }

    pub fn grid(&self) -> &StructuredGrid {
        &self.grid
    }

    pub fn accelerator(&self) -> &GridAccelerator {
        &self.accelerator
    }

    pub fn bounds(&self) -> Aabb {
        self.grid.bounds()
    }

    pub fn attribute_count(&self) -> usize {
        self.grid.attributes.len()
    }

    pub fn value_range(&self, attribute: usize) -> ValueRange {
        self.accelerator.volume_range(attribute)
    }

    pub fn sample(&self, filter: Filter, point: Vec3, attribute: usize) -> f32 {
        self.grid.sample(filter, point, attribute)
    }

    /// Finite-difference step of one voxel
    pub fn gradient_step(&self) -> Vec3 {
        match self.grid.geometry {
            GridGeometry::Regular => self.grid.grid_spacing,
            GridGeometry::Spherical => Vec3::splat(self.grid.grid_spacing.x),
        }
    }
}

impl FieldSampler for GridVolume {
    fn evaluate(&self, point: Vec3, attribute: usize, _time: f32) -> f32 {
        self.grid.sample(Filter::Trilinear, point, attribute)
    }

    fn gradient_step(&self) -> Vec3 {
        GridVolume::gradient_step(self)
    }
}
