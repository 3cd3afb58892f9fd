//! Committed sparse tree and point lookup

use crate::core::types::{IVec3, UVec3, Vec3};
use crate::field::{lerp, Filter};
use crate::math::{Aabb, ValueRange};
use super::data::{LeafFormat, VdbLeaf};
use super::levels::{linear_index, node_origin, total_res, voxel_index, LEAF_LEVEL};
use super::node::{InnerNode, VoxelRef};

/// Where a lookup ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafLocation {
    /// Level of the leaf (one deeper than the node whose voxel references it)
    pub level: usize,
    pub leaf: u32,
}

/// Sparse tree built by [`super::builder::build_tree`]
#[derive(Debug)]
pub struct VdbTree {
    /// Absolute index of the root node's lower corner
    pub(super) root_origin: IVec3,
    /// Inner nodes per level `0..LEAF_LEVEL`; level 0 holds only the root
    pub(super) levels: Vec<Vec<InnerNode>>,
    pub(super) leaves: Vec<VdbLeaf>,
    pub(super) attribute_count: usize,
    /// Union of leaf extents relative to `root_origin`
    pub(super) offset_bounds: Aabb,
    pub(super) ranges: Vec<ValueRange>,
    pub(super) has_tiles: bool,
}

impl VdbTree {
    pub fn root_origin(&self) -> IVec3 {
        self.root_origin
    }

    pub fn root(&self) -> &InnerNode {
        &self.levels[0][0]
    }

    pub fn node(&self, level: usize, index: u32) -> &InnerNode {
        &self.levels[level][index as usize]
    }

    /// Inner node count at `level`
    pub fn node_count(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf(&self, index: u32) -> &VdbLeaf {
        &self.leaves[index as usize]
    }

    pub fn attribute_count(&self) -> usize {
        self.attribute_count
    }

    /// True if any leaf is a constant tile
    pub fn has_tiles(&self) -> bool {
        self.has_tiles
    }

    /// Union of all leaf ranges for `attribute`
    pub fn value_range(&self, attribute: usize) -> ValueRange {
        self.ranges.get(attribute).copied().unwrap_or(ValueRange::EMPTY)
    }

    /// Occupied region relative to the root origin
    pub fn offset_bounds(&self) -> Aabb {
        self.offset_bounds
    }

    fn to_offset(&self, ijk: IVec3) -> Option<UVec3> {
        let offset = ijk.as_i64vec3() - self.root_origin.as_i64vec3();
        let limit = total_res(0) as i64;
        if offset.min_element() < 0 || offset.max_element() >= limit {
            return None;
        }
        Some(offset.as_uvec3())
    }

    /// Descend from the root to the leaf covering absolute voxel `ijk`
    pub fn locate(&self, ijk: IVec3) -> Option<LeafLocation> {
        let offset = self.to_offset(ijk)?;
        let mut node = self.root();
        for level in 0..LEAF_LEVEL {
            match node.voxels[voxel_index(offset, node.origin, level)] {
                VoxelRef::Empty => return None,
                VoxelRef::Child(child) => node = self.node(level + 1, child),
                VoxelRef::Leaf { leaf, .. } => return Some(LeafLocation { level: level + 1, leaf }),
            }
        }
        None
    }

    /// Value of absolute voxel `ijk`, or `background` in unoccupied space
    pub fn voxel_value(&self, attribute: usize, ijk: IVec3, time: f32, background: f32) -> f32 {
        let Some(offset) = self.to_offset(ijk) else {
            return background;
        };
        let Some(location) = self.locate(ijk) else {
            return background;
        };
        let leaf = &self.leaves[location.leaf as usize];
        match leaf.format {
            LeafFormat::Tile => leaf.value(attribute, 0, time),
            LeafFormat::Dense => {
                let leaf_origin = node_origin(offset, LEAF_LEVEL);
                let local = offset - leaf_origin;
                leaf.value(attribute, linear_index(local, total_res(LEAF_LEVEL)), time)
            }
        }
    }

    /// Reconstruct at continuous index coordinates
    ///
    /// Voxel `i` covers `[i, i + 1)`; trilinear interpolation blends the
    /// eight voxels whose centers surround the point.
    pub fn sample_index(&self, filter: Filter, ic: Vec3, attribute: usize, time: f32, background: f32) -> f32 {
        match filter {
            Filter::Nearest => {
                self.voxel_value(attribute, ic.floor().as_ivec3(), time, background)
            }
            Filter::Trilinear => {
                let c = ic - Vec3::splat(0.5);
                let i0 = c.floor().as_ivec3();
                let f = c - i0.as_vec3();
                let v = |d: IVec3| self.voxel_value(attribute, i0.saturating_add(d), time, background);
                let c00 = lerp(v(IVec3::new(0, 0, 0)), v(IVec3::new(1, 0, 0)), f.x);
                let c10 = lerp(v(IVec3::new(0, 1, 0)), v(IVec3::new(1, 1, 0)), f.x);
                let c01 = lerp(v(IVec3::new(0, 0, 1)), v(IVec3::new(1, 0, 1)), f.x);
                let c11 = lerp(v(IVec3::new(0, 1, 1)), v(IVec3::new(1, 1, 1)), f.x);
                lerp(lerp(c00, c10, f.y), lerp(c01, c11, f.y), f.z)
            }
        }
    }
}
