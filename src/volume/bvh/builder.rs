//! Binned-SAH bottom-up BVH construction
//!
//! The builder only handles topology and bounds. What a leaf or inner node
//! means for the field (value ranges, nominal length) comes from the
//! [`BuildCallbacks`] of the primitive family being indexed.

use std::collections::VecDeque;

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::math::{Aabb, ValueRange};
use crate::volume::config::BvhConfig;
use super::node::{inner_nominal_length, leaf_nominal_length, Bvh, BvhNode, NodeKind, MAX_TREE_DEPTH, NO_PARENT};

/// Field metadata attached to a node during construction
#[derive(Clone, Debug)]
pub struct NodeSummary {
    /// One range per attribute
    pub ranges: Vec<ValueRange>,
    pub nominal_length: Vec3,
}

/// Per-family node creation hooks
pub trait BuildCallbacks: Sync {
    fn attribute_count(&self) -> usize;

    /// Summarize the primitives of a new leaf
    fn create_leaf(&self, primitives: &[u32], bounds: &Aabb) -> NodeSummary;

    /// Summarize an inner node from its two children
    fn create_inner(&self, left: &NodeSummary, right: &NodeSummary) -> NodeSummary {
        NodeSummary {
            ranges: left.ranges.iter().zip(&right.ranges).map(|(a, b)| a.union(b)).collect(),
            nominal_length: inner_nominal_length(left.nominal_length, right.nominal_length),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PrimRef {
    index: u32,
    bounds: Aabb,
    centroid: Vec3,
}

enum BuildNode {
    Leaf {
        bounds: Aabb,
        first: u32,
        count: u32,
        summary: NodeSummary,
    },
    Inner {
        bounds: Aabb,
        children: Box<[BuildNode; 2]>,
        summary: NodeSummary,
    },
}

impl BuildNode {
    fn summary(&self) -> &NodeSummary {
        match self {
            BuildNode::Leaf { summary, .. } | BuildNode::Inner { summary, .. } => summary,
        }
    }

    fn bounds(&self) -> Aabb {
        match self {
            BuildNode::Leaf { bounds, .. } | BuildNode::Inner { bounds, .. } => *bounds,
        }
    }
}

#[derive(Clone, Copy)]
struct Bin {
    bounds: Aabb,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Self { bounds: Aabb::EMPTY, count: 0 }
    }
}

/// Top-down binned SAH builder; subtrees above the parallel threshold are
/// split across rayon tasks
pub struct BinnedBuilder {
    config: BvhConfig,
}

impl BinnedBuilder {
    pub fn new(config: BvhConfig) -> Self {
        Self { config }
    }

    /// Build a tree over `primitive_bounds`; primitive ids are indices into it
    pub fn build<C: BuildCallbacks>(&self, primitive_bounds: &[Aabb], callbacks: &C) -> Result<Bvh> {
        if primitive_bounds.is_empty() {
            return Err(Error::BuildFailure("no primitives to index".into()));
        }
        if primitive_bounds.len() > u32::MAX as usize {
            return Err(Error::BuildFailure(format!("{} primitives exceed the index range", primitive_bounds.len())));
        }
        if let Some(bad) = primitive_bounds.iter().position(|b| b.is_empty() || !b.is_finite()) {
            return Err(Error::BuildFailure(format!(
                "primitive {} has invalid bounds {:?}",
                bad, primitive_bounds[bad]
            )));
        }

        let start = std::time::Instant::now();
        let mut refs: Vec<PrimRef> = primitive_bounds
            .iter()
            .enumerate()
            .map(|(i, b)| PrimRef { index: i as u32, bounds: *b, centroid: b.center() })
            .collect();

        let root = self.build_range(&mut refs, 0, 0, callbacks);
        let primitives: Vec<u32> = refs.iter().map(|r| r.index).collect();
        let bvh = flatten(root, primitives, callbacks.attribute_count());

        log::debug!(
            "BVH built: {} primitives, {} nodes, depth {} in {:?}",
            primitive_bounds.len(),
            bvh.node_count(),
            bvh.depth(),
            start.elapsed()
        );
        Ok(bvh)
    }

    fn build_range<C: BuildCallbacks>(&self, refs: &mut [PrimRef], offset: usize, depth: usize, callbacks: &C) -> BuildNode {
        let bounds = refs.iter().fold(Aabb::EMPTY, |acc, r| acc.merged(&r.bounds));
        let max_leaf_size = self.config.max_leaf_size.max(1);
        if refs.len() <= max_leaf_size || depth >= MAX_TREE_DEPTH {
            return make_leaf(refs, offset, bounds, callbacks);
        }

        let parallel = refs.len() >= self.config.parallel_threshold;
        let mid = self.partition(refs);
        let (left, right) = refs.split_at_mut(mid);
        let (l, r) = if parallel {
            rayon::join(
                || self.build_range(left, offset, depth + 1, callbacks),
                || self.build_range(right, offset + mid, depth + 1, callbacks),
            )
        } else {
            (
                self.build_range(left, offset, depth + 1, callbacks),
                self.build_range(right, offset + mid, depth + 1, callbacks),
            )
        };
        let summary = callbacks.create_inner(l.summary(), r.summary());
        BuildNode::Inner {
            bounds,
            children: Box::new([l, r]),
            summary,
        }
    }

    /// Reorder `refs` around the cheapest SAH bin boundary; returns the split
    /// index, always in `1..refs.len()`
    fn partition(&self, refs: &mut [PrimRef]) -> usize {
        let centroid_bounds = Aabb::from_points(refs.iter().map(|r| r.centroid));
        let axis = centroid_bounds.longest_axis();
        let lo = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - lo;

        if extent > 0.0 {
            let bin_count = self.config.bin_count.clamp(2, 256);
            let scale = bin_count as f32 / extent;
            let bin_of = |r: &PrimRef| (((r.centroid[axis] - lo) * scale) as usize).min(bin_count - 1);

            let mut bins = vec![Bin::default(); bin_count];
            for r in refs.iter() {
                let bin = &mut bins[bin_of(r)];
                bin.bounds = bin.bounds.merged(&r.bounds);
                bin.count += 1;
            }

            // Sweep from the right to get suffix areas, then from the left
            let mut right_cost = vec![0.0f32; bin_count];
            let mut acc = Bin::default();
            for i in (1..bin_count).rev() {
                acc.bounds = acc.bounds.merged(&bins[i].bounds);
                acc.count += bins[i].count;
                right_cost[i] = acc.bounds.surface_area() * acc.count as f32;
            }
            let mut best = (f32::INFINITY, 0);
            let mut acc = Bin::default();
            for split in 1..bin_count {
                acc.bounds = acc.bounds.merged(&bins[split - 1].bounds);
                acc.count += bins[split - 1].count;
                let cost = acc.bounds.surface_area() * acc.count as f32 + right_cost[split];
                if cost < best.0 {
                    best = (cost, split);
                }
            }

            let split = best.1;
            let mut mid = 0;
            for i in 0..refs.len() {
                if bin_of(&refs[i]) < split {
                    refs.swap(i, mid);
                    mid += 1;
                }
            }
            if mid > 0 && mid < refs.len() {
                return mid;
            }
        }

        // Coincident centroids: median split
        refs.sort_unstable_by(|a, b| a.centroid[axis].total_cmp(&b.centroid[axis]));
        refs.len() / 2
    }
}

fn make_leaf<C: BuildCallbacks>(refs: &[PrimRef], offset: usize, bounds: Aabb, callbacks: &C) -> BuildNode {
    let ids: Vec<u32> = refs.iter().map(|r| r.index).collect();
    let mut summary = callbacks.create_leaf(&ids, &bounds);
    summary.nominal_length = leaf_nominal_length(summary.nominal_length);
    BuildNode::Leaf {
        bounds,
        first: offset as u32,
        count: refs.len() as u32,
        summary,
    }
}

/// Lay the tree out breadth-first, assigning parent links and levels
fn flatten(root: BuildNode, primitives: Vec<u32>, attribute_count: usize) -> Bvh {
    let mut nodes: Vec<BvhNode> = Vec::new();
    let mut ranges: Vec<ValueRange> = Vec::new();
    let mut level_starts = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back((root, NO_PARENT, 0u32, 0usize));

    while let Some((build, parent, level, slot)) = queue.pop_front() {
        let index = nodes.len() as u32;
        if level_starts.len() == level as usize {
            level_starts.push(index);
        }
        if parent != NO_PARENT {
            if let NodeKind::Inner { children } = &mut nodes[parent as usize].kind {
                children[slot] = index;
            }
        }

        let bounds = build.bounds();
        let (kind, summary) = match build {
            BuildNode::Leaf { first, count, summary, .. } => (NodeKind::Leaf { first, count }, summary),
            BuildNode::Inner { children, summary, .. } => {
                let [left, right] = *children;
                queue.push_back((left, index, level + 1, 0));
                queue.push_back((right, index, level + 1, 1));
                (NodeKind::Inner { children: [NO_PARENT; 2] }, summary)
            }
        };
        let mut node_ranges = summary.ranges;
        node_ranges.resize(attribute_count, ValueRange::EMPTY);
        ranges.extend(node_ranges);
        nodes.push(BvhNode {
            bounds,
            kind,
            parent,
            level,
            nominal_length: summary.nominal_length,
        });
    }
    level_starts.push(nodes.len() as u32);

    Bvh {
        nodes,
        ranges,
        attribute_count,
        primitives,
        level_starts,
    }
}
