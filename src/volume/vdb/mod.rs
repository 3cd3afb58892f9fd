//! Sparse hierarchical voxel tree (four levels, VDB-style)

pub mod levels;
pub mod data;
pub mod node;
pub mod tree;
pub mod builder;
pub mod iterator;

pub use data::{LeafFormat, TemporalFormat, VdbData, VdbLeaf};
pub use node::{InnerNode, VoxelRef};
pub use tree::{LeafLocation, VdbTree};
pub use iterator::VdbIntervalIterator;

use crate::core::types::{Result, Vec3};
use crate::field::{FieldSampler, Filter};
use crate::math::{Aabb, ValueRange};
use super::config::VdbConfig;

/// Committed sparse tree plus its index-to-object transform
#[derive(Debug)]
pub struct VdbVolume {
    tree: VdbTree,
    grid_origin: Vec3,
    grid_spacing: Vec3,
    background: f32,
    bounds: Aabb,
}

impl VdbVolume {
    pub fn build(data: VdbData, config: &VdbConfig) -> Result<Self> {
        let grid_origin = data.grid_origin;
        let grid_spacing = data.grid_spacing;
        let tree = builder::build_tree(data, config.background_value())?;
        let bounds = builder::object_bounds(&tree, grid_origin, grid_spacing);
        log::debug!(
            "Sparse tree: {} leaves, nodes per level {:?}, tiles: {}",
            tree.leaf_count(),
            (0..levels::LEAF_LEVEL).map(|l| tree.node_count(l)).collect::<Vec<_>>(),
            tree.has_tiles()
        );
        Ok(Self {
            tree,
            grid_origin,
            grid_spacing,
            background: config.background_value(),
            bounds,
        })
    }

    pub fn tree(&self) -> &VdbTree {
        &self.tree
    }

    pub fn grid_origin(&self) -> Vec3 {
        self.grid_origin
    }

    pub fn grid_spacing(&self) -> Vec3 {
        self.grid_spacing
    }

    pub fn background(&self) -> f32 {
        self.background
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn attribute_count(&self) -> usize {
        self.tree.attribute_count()
    }

    pub fn value_range(&self, attribute: usize) -> ValueRange {
        self.tree.value_range(attribute)
    }

    pub fn has_tiles(&self) -> bool {
        self.tree.has_tiles()
    }

    /// Sample at an object-space point
    pub fn sample(&self, filter: Filter, point: Vec3, attribute: usize, time: f32) -> f32 {
        let ic = (point - self.grid_origin) / self.grid_spacing;
        self.tree.sample_index(filter, ic, attribute, time, self.background)
    }
}

impl FieldSampler for VdbVolume {
    fn evaluate(&self, point: Vec3, attribute: usize, time: f32) -> f32 {
        self.sample(Filter::Trilinear, point, attribute, time)
    }

    fn gradient_step(&self) -> Vec3 {
        self.grid_spacing
    }
}
