//! Sparse tree inner nodes

use crate::core::types::UVec3;
use crate::math::ValueRange;
use super::data::{LeafFormat, TemporalFormat};
use super::levels::voxels_per_node;

/// Content of one voxel of an inner node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoxelRef {
    #[default]
    Empty,
    /// Index of a node in the next level's node array
    Child(u32),
    /// Index into the tree's leaf array
    Leaf {
        leaf: u32,
        format: LeafFormat,
        temporal: TemporalFormat,
    },
}

impl VoxelRef {
    pub fn is_empty(&self) -> bool {
        matches!(self, VoxelRef::Empty)
    }
}

/// Inner node at some level `0..LEAF_LEVEL`
///
/// Each voxel carries one value range per attribute covering everything
/// reachable beneath it.
#[derive(Clone, Debug)]
pub struct InnerNode {
    /// Offset of the node's lower corner relative to the root origin
    pub origin: UVec3,
    pub voxels: Vec<VoxelRef>,
    /// Ranges stored `[voxel][attribute]`
    pub ranges: Vec<ValueRange>,
}

impl InnerNode {
    pub fn new(origin: UVec3, level: usize, attribute_count: usize) -> Self {
        let count = voxels_per_node(level);
        Self {
            origin,
            voxels: vec![VoxelRef::Empty; count],
            ranges: vec![ValueRange::EMPTY; count * attribute_count],
        }
    }

    #[inline]
    pub fn range(&self, voxel: usize, attribute: usize, attribute_count: usize) -> ValueRange {
        self.ranges[voxel * attribute_count + attribute]
    }

    /// Union of every voxel's range for `attribute`
    pub fn node_range(&self, attribute: usize, attribute_count: usize) -> ValueRange {
        let mut r = ValueRange::EMPTY;
        for v in 0..self.voxels.len() {
            r.extend_range(&self.range(v, attribute, attribute_count));
        }
        r
    }
}
