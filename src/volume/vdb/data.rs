//! Sparse tree input: leaf descriptors and their payloads

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{IVec3, Result, Vec3};
use crate::field::lerp;
use crate::math::{range::range_of, ValueRange};
use super::levels::{total_res, voxels_per_node, LEAF_LEVEL, NUM_LEVELS};

/// Storage of a leaf's payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafFormat {
    /// One constant value over the node's whole extent (any level >= 1)
    Tile,
    /// One value per voxel (leaf level only)
    Dense,
}

/// How a leaf's payload varies over time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalFormat {
    Constant,
    /// `time_steps` equidistant samples over `[0, 1]`
    Structured { time_steps: u32 },
}

impl TemporalFormat {
    pub fn time_steps(&self) -> usize {
        match self {
            TemporalFormat::Constant => 1,
            TemporalFormat::Structured { time_steps } => *time_steps as usize,
        }
    }
}

/// One node descriptor handed to the tree builder
///
/// `origin` is in absolute index coordinates and must be aligned to the
/// extent of a node at `level`. `data` holds one array per attribute with
/// voxels x-fastest and time as the slowest axis.
#[derive(Clone, Debug)]
pub struct VdbLeaf {
    pub level: u32,
    pub origin: IVec3,
    pub format: LeafFormat,
    pub temporal: TemporalFormat,
    pub data: Vec<Vec<f32>>,
}

impl VdbLeaf {
    /// Constant tile covering one node at `level`
    pub fn tile(level: u32, origin: IVec3, values: Vec<f32>) -> Self {
        Self {
            level,
            origin,
            format: LeafFormat::Tile,
            temporal: TemporalFormat::Constant,
            data: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    /// Dense single-attribute leaf at the deepest level
    pub fn dense(origin: IVec3, voxels: Vec<f32>) -> Self {
        Self {
            level: LEAF_LEVEL as u32,
            origin,
            format: LeafFormat::Dense,
            temporal: TemporalFormat::Constant,
            data: vec![voxels],
        }
    }

    /// Per-axis extent in voxels
    pub fn extent(&self) -> u32 {
        total_res(self.level as usize)
    }

    fn values_per_step(&self) -> usize {
        match self.format {
            LeafFormat::Tile => 1,
            LeafFormat::Dense => voxels_per_node(LEAF_LEVEL),
        }
    }

    /// Check level, alignment, format and payload sizes
    pub fn validate(&self, attribute_count: usize) -> Result<()> {
        let level = self.level as usize;
        if level == 0 || level >= NUM_LEVELS {
            return Err(Error::validation(format!(
                "leaf level must be in 1..{}, got {}",
                NUM_LEVELS, self.level
            )));
        }
        if self.format == LeafFormat::Dense && level != LEAF_LEVEL {
            return Err(Error::validation(format!(
                "dense leaves are only allowed at level {}, got {}",
                LEAF_LEVEL, level
            )));
        }
        let extent = self.extent() as i32;
        let misaligned = self.origin.x.rem_euclid(extent) != 0
            || self.origin.y.rem_euclid(extent) != 0
            || self.origin.z.rem_euclid(extent) != 0;
        if misaligned {
            return Err(Error::validation(format!(
                "leaf origin {:?} is not aligned to its level-{} extent {}",
                self.origin, level, extent
            )));
        }
        if let TemporalFormat::Structured { time_steps } = self.temporal {
            if time_steps < 2 {
                return Err(Error::validation("structured temporal format needs at least 2 time steps"));
            }
        }
        if self.data.len() != attribute_count {
            return Err(Error::validation(format!(
                "leaf at {:?} has {} attributes, expected {}",
                self.origin,
                self.data.len(),
                attribute_count
            )));
        }
        let expected = self.values_per_step() * self.temporal.time_steps();
        if let Some(bad) = self.data.iter().find(|d| d.len() != expected) {
            return Err(Error::validation(format!(
                "leaf at {:?} has {} values for an attribute, expected {}",
                self.origin,
                bad.len(),
                expected
            )));
        }
        Ok(())
    }

    /// Range of `attribute` over all voxels and time steps
    pub fn value_range(&self, attribute: usize) -> ValueRange {
        range_of(&self.data[attribute])
    }

    /// Range of one voxel (0 for tiles) over all time steps
    pub fn voxel_range(&self, attribute: usize, index: usize) -> ValueRange {
        let mut r = ValueRange::EMPTY;
        for v in self.data[attribute].iter().skip(index).step_by(self.values_per_step()) {
            r.extend(*v);
        }
        r
    }

    /// Value of voxel `index` (0 for tiles) at `time`
    #[inline]
    pub fn value(&self, attribute: usize, index: usize, time: f32) -> f32 {
        let data = &self.data[attribute];
        match self.temporal {
            TemporalFormat::Constant => data[index],
            TemporalFormat::Structured { time_steps } => {
                let stride = self.values_per_step();
                let last = (time_steps - 1) as usize;
                let t = time.clamp(0.0, 1.0) * last as f32;
                let i0 = (t.floor() as usize).min(last.saturating_sub(1));
                let f = t - i0 as f32;
                lerp(data[i0 * stride + index], data[(i0 + 1) * stride + index], f)
            }
        }
    }
}

/// Complete sparse tree input
#[derive(Clone, Debug)]
pub struct VdbData {
    pub grid_origin: Vec3,
    pub grid_spacing: Vec3,
    pub attribute_count: usize,
    pub leaves: Vec<VdbLeaf>,
}

impl VdbData {
    pub fn new(attribute_count: usize, leaves: Vec<VdbLeaf>) -> Self {
        Self {
            grid_origin: Vec3::ZERO,
            grid_spacing: Vec3::ONE,
            attribute_count,
            leaves,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.attribute_count == 0 {
            return Err(Error::validation("sparse tree needs at least one attribute"));
        }
        if !(self.grid_spacing.min_element() > 0.0) || !self.grid_origin.is_finite() {
            return Err(Error::validation("grid spacing must be positive and origin finite"));
        }
        self.leaves.iter().try_for_each(|leaf| leaf.validate(self.attribute_count))
    }
}
