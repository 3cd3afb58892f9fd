//! Sparse tree level layout constants and utilities.
//!
//! Defines the four-level hierarchy:
//! - Level 0: root node, 64^3 voxels
//! - Level 1: 32^3 voxels per node
//! - Level 2: 16^3 voxels per node
//! - Level 3: dense leaf, 8^3 voxels
//!
//! A voxel of a level-l node covers exactly one level-(l+1) node.

use crate::core::types::UVec3;

/// Number of levels including the dense leaf level
pub const NUM_LEVELS: usize = 4;

/// Deepest level; the only level that may hold dense leaves
pub const LEAF_LEVEL: usize = NUM_LEVELS - 1;

/// log2 of the per-axis voxel count stored in a node of each level
pub const LOG_STORAGE_RES: [u32; NUM_LEVELS] = [6, 5, 4, 3];

/// Per-axis voxel count stored in a node at `level`
pub const fn storage_res(level: usize) -> u32 {
    1 << LOG_STORAGE_RES[level]
}

/// Voxels stored in a node at `level`
pub const fn voxels_per_node(level: usize) -> usize {
    let r = storage_res(level) as usize;
    r * r * r
}

/// log2 of the per-axis extent (in leaf voxels) covered by a node at `level`
pub const fn total_log_res(level: usize) -> u32 {
    let mut sum = 0;
    let mut l = level;
    while l < NUM_LEVELS {
        sum += LOG_STORAGE_RES[l];
        l += 1;
    }
    sum
}

/// Per-axis extent (in leaf voxels) covered by a node at `level`
pub const fn total_res(level: usize) -> u32 {
    1 << total_log_res(level)
}

/// Round an offset down to the origin of its enclosing level-`level` node
#[inline]
pub fn node_origin(offset: UVec3, level: usize) -> UVec3 {
    offset & UVec3::splat(!(total_res(level) - 1))
}

/// Linear voxel index within a level-`level` node for an offset inside it
///
/// x varies fastest. Any bijection would do as long as insertion and
/// traversal agree; both go through this function.
#[inline]
pub fn voxel_index(offset: UVec3, node_origin: UVec3, level: usize) -> usize {
    let local = (offset - node_origin) >> total_log_res(level + 1);
    linear_index(local, storage_res(level))
}

#[inline]
pub fn linear_index(local: UVec3, res: u32) -> usize {
    let res = res as usize;
    local.x as usize + res * (local.y as usize + res * local.z as usize)
}
