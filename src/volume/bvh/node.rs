//! Arena-addressed BVH storage

use crate::core::types::Vec3;
use crate::math::{Aabb, ValueRange};

/// Parent index of the root
pub const NO_PARENT: u32 = u32::MAX;

/// Deepest level the builder will produce; bounds every traversal stack
pub const MAX_TREE_DEPTH: usize = 64;

/// Fixed traversal stack capacity for a tree no deeper than [`MAX_TREE_DEPTH`]
pub const TRAVERSAL_STACK: usize = MAX_TREE_DEPTH + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Primitives `primitives[first..first + count]`
    Leaf { first: u32, count: u32 },
    Inner { children: [u32; 2] },
}

#[derive(Clone, Debug)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub kind: NodeKind,
    pub parent: u32,
    /// Distance from the root (root = 0)
    pub level: u32,
    /// Characteristic feature size; a negative x marks a leaf
    pub nominal_length: Vec3,
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        self.nominal_length.x < 0.0
    }

    pub fn children(&self) -> Option<[u32; 2]> {
        match self.kind {
            NodeKind::Inner { children } => Some(children),
            NodeKind::Leaf { .. } => None,
        }
    }
}

/// Leaf nominal length with the sign sentinel applied
pub(crate) fn leaf_nominal_length(length: Vec3) -> Vec3 {
    let length = length.abs();
    Vec3::new(-length.x.max(f32::MIN_POSITIVE), length.y, length.z)
}

/// Inner nominal length: componentwise min of the children's magnitudes
pub(crate) fn inner_nominal_length(a: Vec3, b: Vec3) -> Vec3 {
    a.abs().min(b.abs())
}

/// Binary BVH stored breadth-first, so every level is a contiguous index run
#[derive(Clone, Debug)]
pub struct Bvh {
    pub(super) nodes: Vec<BvhNode>,
    /// `ranges[node * attribute_count + attribute]`
    pub(super) ranges: Vec<ValueRange>,
    pub(super) attribute_count: usize,
    /// Primitive ids in leaf order
    pub(super) primitives: Vec<u32>,
    /// Start index of each level plus a final end marker
    pub(super) level_starts: Vec<u32>,
}

impl Bvh {
    pub fn root(&self) -> &BvhNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: u32) -> &BvhNode {
        &self.nodes[index as usize]
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn attribute_count(&self) -> usize {
        self.attribute_count
    }

    /// Deepest level in the tree (a single-leaf tree has depth 0)
    pub fn depth(&self) -> u32 {
        (self.level_starts.len() as u32).saturating_sub(2)
    }

    /// Node indices at `level`
    pub fn level_nodes(&self, level: u32) -> std::ops::Range<u32> {
        let level = level as usize;
        self.level_starts[level]..self.level_starts[level + 1]
    }

    pub fn bounds(&self) -> Aabb {
        self.root().bounds
    }

    pub fn range(&self, node: u32, attribute: usize) -> ValueRange {
        self.ranges[node as usize * self.attribute_count + attribute]
    }

    pub fn node_ranges(&self, node: u32) -> &[ValueRange] {
        let start = node as usize * self.attribute_count;
        &self.ranges[start..start + self.attribute_count]
    }

    /// Whole-tree value range for `attribute`
    pub fn value_range(&self, attribute: usize) -> ValueRange {
        if attribute >= self.attribute_count {
            return ValueRange::EMPTY;
        }
        self.range(0, attribute)
    }

    /// Primitive ids held by a leaf; empty for inner nodes
    pub fn leaf_primitives(&self, node: u32) -> &[u32] {
        match self.node(node).kind {
            NodeKind::Leaf { first, count } => &self.primitives[first as usize..(first + count) as usize],
            NodeKind::Inner { .. } => &[],
        }
    }

    /// Replace every leaf's ranges, then rebuild inner ranges bottom-up
    pub(crate) fn set_leaf_ranges(&mut self, leaf_ranges: impl Fn(u32) -> Vec<ValueRange>) {
        let count = self.attribute_count;
        for index in 0..self.nodes.len() as u32 {
            if matches!(self.nodes[index as usize].kind, NodeKind::Leaf { .. }) {
                let values = leaf_ranges(index);
                let start = index as usize * count;
                for (slot, value) in self.ranges[start..start + count].iter_mut().zip(values) {
                    *slot = value;
                }
            }
        }
        self.refit_ranges();
    }

    /// Recompute inner ranges as the union of their children.
    ///
    /// Children always sit at larger indices than their parent, so one
    /// reverse sweep suffices.
    pub(crate) fn refit_ranges(&mut self) {
        let count = self.attribute_count;
        for index in (0..self.nodes.len()).rev() {
            if let NodeKind::Inner { children: [a, b] } = self.nodes[index].kind {
                for attribute in 0..count {
                    let merged = self.ranges[a as usize * count + attribute]
                        .union(&self.ranges[b as usize * count + attribute]);
                    self.ranges[index * count + attribute] = merged;
                }
            }
        }
    }

    /// Call `visit` with the primitives of every leaf whose bounds contain
    /// `point`; stop early when it returns `false`.
    pub fn visit_leaves_containing(&self, point: Vec3, mut visit: impl FnMut(&[u32]) -> bool) {
        let mut stack = [0u32; TRAVERSAL_STACK];
        let mut top = 0;
        if self.nodes.is_empty() || !self.root().bounds.contains_point(point) {
            return;
        }
        stack[top] = 0;
        top += 1;
        while top > 0 {
            top -= 1;
            let index = stack[top];
            let node = self.node(index);
            match node.kind {
                NodeKind::Leaf { .. } => {
                    if !visit(self.leaf_primitives(index)) {
                        return;
                    }
                }
                NodeKind::Inner { children } => {
                    for child in children {
                        if self.node(child).bounds.contains_point(point) {
                            stack[top] = child;
                            top += 1;
                        }
                    }
                }
            }
        }
    }

    /// Check parent/child links, level numbering and range containment
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(children) = node.children() {
                assert!(!node.is_leaf());
                for child in children {
                    let c = self.node(child);
                    assert_eq!(c.parent as usize, index);
                    assert_eq!(c.level, node.level + 1);
                    assert!(node.bounds.contains(&c.bounds));
                    for a in 0..self.attribute_count {
                        assert!(self.range(index as u32, a).contains_range(&self.range(child, a)));
                    }
                }
            } else {
                assert!(node.is_leaf());
            }
        }
    }
}
