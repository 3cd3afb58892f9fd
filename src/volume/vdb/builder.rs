//! Bottom-up sparse tree construction
//!
//! Phases, each fully collected before the next begins:
//! 1. bound all leaf extents and snap the root origin
//! 2. allocate inner nodes level by level from the deepest up
//! 3. compute voxel writes for every leaf in parallel, then apply them
//! 4. compute leaf value ranges in parallel, then extend every ancestor voxel

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{I64Vec3, Result, UVec3, Vec3};
use crate::math::{Aabb, ValueRange};
use super::data::{LeafFormat, VdbData};
use super::levels::{linear_index, node_origin, total_res, voxel_index, LEAF_LEVEL};
use super::node::{InnerNode, VoxelRef};
use super::tree::VdbTree;

/// One pending voxel assignment produced by the insertion phase
#[derive(Clone, Copy, Debug)]
struct VoxelWrite {
    level: usize,
    node: u32,
    voxel: usize,
    value: VoxelRef,
}

/// Build a tree from validated leaf descriptors
///
/// `background` is the value of unoccupied space; it takes part in the
/// ranges of leaves that border empty voxels.
pub fn build_tree(data: VdbData, background: f32) -> Result<VdbTree> {
    data.validate()?;
    let start = std::time::Instant::now();
    let VdbData { attribute_count, leaves, .. } = data;

    // Phase 1: bounds and root origin, in i64 so far-apart origins cannot wrap
    let mut lower = I64Vec3::MAX;
    let mut upper = I64Vec3::MIN;
    for leaf in &leaves {
        let origin = leaf.origin.as_i64vec3();
        lower = lower.min(origin);
        upper = upper.max(origin + I64Vec3::splat(leaf.extent() as i64));
    }
    let root_res = total_res(0) as i64;
    let root_origin = if leaves.is_empty() {
        I64Vec3::ZERO
    } else {
        I64Vec3::new(
            lower.x.div_euclid(root_res),
            lower.y.div_euclid(root_res),
            lower.z.div_euclid(root_res),
        ) * root_res
    };
    if !leaves.is_empty() && (upper - root_origin).max_element() > root_res {
        return Err(Error::structural(format!(
            "leaf bounds {:?}..{:?} do not fit in a single root node of extent {}",
            lower, upper, root_res
        )));
    }
    // Every origin lies in [root_origin, root_origin + root_res), so the
    // differences below fit in u32 and the root origin itself in i32
    let leaf_offsets: Vec<UVec3> = leaves
        .iter()
        .map(|l| (l.origin.as_i64vec3() - root_origin).as_uvec3())
        .collect();
    let offset_bounds = if leaves.is_empty() {
        Aabb::EMPTY
    } else {
        Aabb::new((lower - root_origin).as_vec3(), (upper - root_origin).as_vec3())
    };
    let root_origin = root_origin.as_ivec3();

    // Phase 2: allocate inner nodes, deepest level first
    let mut origins: Vec<Vec<UVec3>> = vec![Vec::new(); LEAF_LEVEL];
    for level in (0..LEAF_LEVEL).rev() {
        let mut required: Vec<UVec3> = leaves
            .par_iter()
            .zip(leaf_offsets.par_iter())
            .filter(|(leaf, _)| leaf.level as usize > level)
            .map(|(_, offset)| node_origin(*offset, level))
            .collect();
        if level + 1 < LEAF_LEVEL {
            required.extend(origins[level + 1].iter().map(|o| node_origin(*o, level)));
        }
        if level == 0 {
            required.push(UVec3::ZERO);
        }
        required.par_sort_unstable_by_key(|o| (o.z, o.y, o.x));
        required.dedup();
        origins[level] = required;
    }
    let mut levels: Vec<Vec<InnerNode>> = origins
        .iter()
        .enumerate()
        .map(|(level, level_origins)| {
            level_origins
                .par_iter()
                .map(|o| InnerNode::new(*o, level, attribute_count))
                .collect()
        })
        .collect();
    log::debug!(
        "VDB allocation: {} / {} / {} inner nodes per level",
        levels[0].len(), levels[1].len(), levels[2].len()
    );

    // Phase 3: insertion
    let writes: Vec<Vec<VoxelWrite>> = leaves
        .par_iter()
        .zip(leaf_offsets.par_iter())
        .enumerate()
        .map(|(leaf_index, (leaf, offset))| {
            let leaf_level = leaf.level as usize;
            let mut path = Vec::with_capacity(leaf_level);
            let mut node = 0u32;
            for level in 0..leaf_level {
                let voxel = voxel_index(*offset, origins[level][node as usize], level);
                let value = if level + 1 == leaf_level {
                    VoxelRef::Leaf {
                        leaf: leaf_index as u32,
                        format: leaf.format,
                        temporal: leaf.temporal,
                    }
                } else {
                    VoxelRef::Child(find_node(&origins[level + 1], node_origin(*offset, level + 1)))
                };
                path.push(VoxelWrite { level, node, voxel, value });
                if let VoxelRef::Child(child) = value {
                    node = child;
                }
            }
            path
        })
        .collect();

    for write in writes.iter().flatten() {
        let slot = &mut levels[write.level][write.node as usize].voxels[write.voxel];
        match (*slot, write.value) {
            (VoxelRef::Empty, value) => *slot = value,
            (VoxelRef::Child(a), VoxelRef::Child(b)) if a == b => {}
            (existing, value) => {
                return Err(Error::structural(format!(
                    "incompatible insertion at level {} voxel {}: {:?} over {:?}",
                    write.level, write.voxel, value, existing
                )));
            }
        }
    }

    let has_tiles = leaves.iter().any(|l| l.format == LeafFormat::Tile);
    let mut tree = VdbTree {
        root_origin,
        levels,
        leaves,
        attribute_count,
        offset_bounds,
        ranges: vec![ValueRange::EMPTY; attribute_count],
        has_tiles,
    };

    // Phase 4: value ranges, including the one-voxel shell that trilinear
    // reconstruction blends into each leaf's domain
    let leaf_ranges: Vec<Vec<ValueRange>> = (0..tree.leaves.len())
        .into_par_iter()
        .map(|leaf| {
            (0..attribute_count)
                .map(|a| support_range(&tree, leaf, a, background))
                .collect()
        })
        .collect();
    let mut ranges = vec![ValueRange::EMPTY; attribute_count];
    for (path, leaf_range) in writes.iter().zip(&leaf_ranges) {
        for write in path {
            let node = &mut tree.levels[write.level][write.node as usize];
            for (attribute, r) in leaf_range.iter().enumerate() {
                node.ranges[write.voxel * attribute_count + attribute].extend_range(r);
            }
        }
        for (attribute, r) in leaf_range.iter().enumerate() {
            ranges[attribute].extend_range(r);
        }
    }
    tree.ranges = ranges;

    log::info!(
        "Built sparse tree: {} leaves, {} inner nodes, root origin {:?} in {:.2}ms",
        tree.leaves.len(),
        tree.levels.iter().map(Vec::len).sum::<usize>(),
        root_origin,
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(tree)
}

/// Range of `attribute` over a leaf's own values and every voxel within one
/// voxel of its extent
///
/// Trilinear reconstruction anywhere in the leaf's domain is a convex blend
/// of these voxels, so the result bounds every reconstructed value. The
/// shell is visited one leaf-level block at a time; a block always lies
/// entirely inside one leaf or entirely in empty space.
fn support_range(tree: &VdbTree, leaf_index: usize, attribute: usize, background: f32) -> ValueRange {
    let leaf = &tree.leaves[leaf_index];
    let mut range = leaf.value_range(attribute);

    let block = total_res(LEAF_LEVEL) as i64;
    let origin = leaf.origin.as_i64vec3();
    let extent = leaf.extent() as i64;
    let shell_lo = origin - I64Vec3::ONE;
    let shell_hi = origin + I64Vec3::splat(extent);
    let block_of = |v: I64Vec3| I64Vec3::new(v.x.div_euclid(block), v.y.div_euclid(block), v.z.div_euclid(block));
    let b_lo = block_of(shell_lo);
    let b_hi = block_of(shell_hi);
    let inner_lo = block_of(origin);
    let inner_hi = block_of(shell_hi - I64Vec3::ONE);
    let inside = |b: i64, axis: usize| inner_lo[axis] <= b && b <= inner_hi[axis];

    let mut visit = |b: I64Vec3| {
        let block_origin = b * block;
        let located = if block_origin.min_element() >= i32::MIN as i64
            && (block_origin + I64Vec3::splat(block - 1)).max_element() <= i32::MAX as i64
        {
            tree.locate(block_origin.as_ivec3())
        } else {
            None
        };
        let Some(location) = located else {
            range.extend(background);
            return;
        };
        let neighbour = &tree.leaves[location.leaf as usize];
        match neighbour.format {
            LeafFormat::Tile => range.extend_range(&neighbour.value_range(attribute)),
            LeafFormat::Dense => {
                let lo = block_origin.max(shell_lo);
                let hi = (block_origin + I64Vec3::splat(block - 1)).min(shell_hi);
                for z in lo.z..=hi.z {
                    for y in lo.y..=hi.y {
                        for x in lo.x..=hi.x {
                            let local = (I64Vec3::new(x, y, z) - block_origin).as_uvec3();
                            let index = linear_index(local, block as u32);
                            range.extend_range(&neighbour.voxel_range(attribute, index));
                        }
                    }
                }
            }
        }
    };

    for bz in b_lo.z..=b_hi.z {
        for by in b_lo.y..=b_hi.y {
            if inside(by, 1) && inside(bz, 2) {
                // Only the two end blocks of this row are outside the leaf
                visit(I64Vec3::new(b_lo.x, by, bz));
                visit(I64Vec3::new(b_hi.x, by, bz));
            } else {
                for bx in b_lo.x..=b_hi.x {
                    visit(I64Vec3::new(bx, by, bz));
                }
            }
        }
    }
    range
}

/// Index of the node with `origin` in a level's sorted origin list
///
/// Every origin looked up here was inserted during allocation.
fn find_node(origins: &[UVec3], origin: UVec3) -> u32 {
    let key = (origin.z, origin.y, origin.x);
    origins
        .binary_search_by_key(&key, |o| (o.z, o.y, o.x))
        .unwrap_or_else(|i| i) as u32
}

/// Object-space bounds of a tree given its index transform
pub fn object_bounds(tree: &VdbTree, grid_origin: Vec3, grid_spacing: Vec3) -> Aabb {
    let b = tree.offset_bounds();
    if b.is_empty() {
        return Aabb::EMPTY;
    }
    let root = tree.root_origin().as_vec3();
    Aabb::new(
        grid_origin + (b.min + root) * grid_spacing,
        grid_origin + (b.max + root) * grid_spacing,
    )
}
