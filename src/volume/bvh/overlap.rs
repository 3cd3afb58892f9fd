//! Same-level overlap extension of BVH node metadata
//!
//! Sibling subtrees of a BVH may cover the same space, so the range stored
//! on one node does not bound the field where another node's primitives
//! also contribute. Each node is extended by the pre-pass ranges and
//! nominal lengths of every other node on its level whose bounds overlap it.
//! Levels run root-first with a barrier between them; within a level all
//! reads complete before any write lands.

use rayon::prelude::*;

use crate::core::types::Vec3;
use crate::math::ValueRange;
use super::node::{Bvh, NodeKind, TRAVERSAL_STACK};

struct Extension {
    node: u32,
    ranges: Vec<ValueRange>,
    nominal_length: Vec3,
}

/// Extend every node's ranges and nominal length by its overlapping
/// same-level neighbours; never shrinks anything
pub fn propagate_overlap(bvh: &mut Bvh) {
    let start = std::time::Instant::now();
    let mut extended = 0usize;

    for level in 0..=bvh.depth() {
        let updates: Vec<Extension> = {
            let snapshot: &Bvh = bvh;
            snapshot
                .level_nodes(level)
                .into_par_iter()
                .filter_map(|node| extension_for(snapshot, node))
                .collect()
        };
        extended += updates.len();

        let count = bvh.attribute_count;
        for update in updates {
            let start = update.node as usize * count;
            bvh.ranges[start..start + count].copy_from_slice(&update.ranges);
            bvh.nodes[update.node as usize].nominal_length = update.nominal_length;
        }
    }

    log::debug!("BVH overlap pass extended {} nodes in {:?}", extended, start.elapsed());
}

fn extension_for(bvh: &Bvh, target: u32) -> Option<Extension> {
    let node = bvh.node(target);
    let level = node.level;
    let bounds = node.bounds;
    let mut ranges = bvh.node_ranges(target).to_vec();
    let mut length = node.nominal_length.abs();
    let mut changed = false;

    let mut stack = [0u32; TRAVERSAL_STACK];
    let mut top = 1;
    while top > 0 {
        top -= 1;
        let index = stack[top];
        let other = bvh.node(index);
        if !other.bounds.overlaps(&bounds) {
            continue;
        }
        if other.level == level {
            if index != target {
                for (range, other_range) in ranges.iter_mut().zip(bvh.node_ranges(index)) {
                    let merged = range.union(other_range);
                    changed |= merged != *range;
                    *range = merged;
                }
                let merged = length.min(other.nominal_length.abs());
                changed |= merged != length;
                length = merged;
            }
            continue;
        }
        if let NodeKind::Inner { children } = other.kind {
            for child in children {
                stack[top] = child;
                top += 1;
            }
        }
    }

    if !changed {
        return None;
    }
    let nominal_length = if node.is_leaf() {
        Vec3::new(-length.x.max(f32::MIN_POSITIVE), length.y, length.z)
    } else {
        length
    };
    Some(Extension { node: target, ranges, nominal_length })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::volume::bvh::builder::{BinnedBuilder, BuildCallbacks, NodeSummary};
    use crate::volume::config::BvhConfig;

    /// Primitive `i` carries value `values[i]` and nominal length `lengths[i]`
    struct Tagged {
        values: Vec<f32>,
        lengths: Vec<f32>,
    }

    impl BuildCallbacks for Tagged {
        fn attribute_count(&self) -> usize {
            1
        }

        fn create_leaf(&self, primitives: &[u32], _bounds: &Aabb) -> NodeSummary {
            let mut range = ValueRange::EMPTY;
            let mut length = f32::INFINITY;
            for &p in primitives {
                range.extend(self.values[p as usize]);
                length = length.min(self.lengths[p as usize]);
            }
            NodeSummary { ranges: vec![range], nominal_length: Vec3::splat(length) }
        }
    }

    fn cube(min: f32, size: f32) -> Aabb {
        Aabb::new(Vec3::splat(min), Vec3::splat(min + size))
    }

    #[test]
    fn test_disjoint_leaves_unchanged() {
        let bounds = [cube(0.0, 1.0), cube(5.0, 1.0)];
        let callbacks = Tagged { values: vec![1.0, 2.0], lengths: vec![0.5, 0.25] };
        let mut bvh = BinnedBuilder::new(BvhConfig::default()).build(&bounds, &callbacks).unwrap();
        let before: Vec<_> = (0..bvh.node_count() as u32).map(|n| (bvh.range(n, 0), bvh.node(n).nominal_length)).collect();

        propagate_overlap(&mut bvh);
        let after: Vec<_> = (0..bvh.node_count() as u32).map(|n| (bvh.range(n, 0), bvh.node(n).nominal_length)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_overlapping_leaves_extend_each_other() {
        let bounds = [cube(0.0, 2.0), cube(1.0, 2.0), cube(10.0, 1.0)];
        let callbacks = Tagged { values: vec![1.0, 3.0, 7.0], lengths: vec![0.5, 0.25, 1.0] };
        let mut bvh = BinnedBuilder::new(BvhConfig::default()).build(&bounds, &callbacks).unwrap();
        let before: Vec<_> = (0..bvh.node_count() as u32).map(|n| bvh.range(n, 0)).collect();
        let lengths_before: Vec<_> = bvh.nodes().iter().map(|n| n.nominal_length).collect();

        propagate_overlap(&mut bvh);
        bvh.assert_consistent();

        for n in 0..bvh.node_count() as u32 {
            assert!(bvh.range(n, 0).contains_range(&before[n as usize]));
            let now = bvh.node(n).nominal_length.abs();
            assert!(now.cmple(lengths_before[n as usize].abs()).all());
            assert_eq!(bvh.node(n).is_leaf(), lengths_before[n as usize].x < 0.0);
        }

        let leaf_of = |p: u32| {
            (0..bvh.node_count() as u32)
                .find(|&n| bvh.leaf_primitives(n).contains(&p))
                .unwrap()
        };
        let (a, b, c) = (leaf_of(0), leaf_of(1), leaf_of(2));
        if bvh.node(a).level == bvh.node(b).level {
            assert_eq!(bvh.range(a, 0), ValueRange::new(1.0, 3.0));
            assert_eq!(bvh.range(b, 0), ValueRange::new(1.0, 3.0));
            assert_eq!(bvh.node(a).nominal_length.abs(), Vec3::splat(0.25));
        }
        assert_eq!(bvh.range(c, 0), ValueRange::point(7.0));
    }
}
