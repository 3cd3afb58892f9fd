//! Hierarchical DDA interval iterator for the sparse tree
//!
//! Keeps one DDA frame per inner level on a fixed-size stack. A voxel whose
//! range fails the filter is skipped with its whole subtree; a voxel is
//! emitted as a macrocell once the context's depth limit is reached or it
//! holds a leaf/tile.

use crate::core::types::{IVec3, Vec3};
use crate::iterator::{Interval, IteratorState, RangeFilter, RayQuery};
use crate::math::{Ray, ValueRange};
use super::levels::{linear_index, storage_res, total_res, LEAF_LEVEL};
use super::node::VoxelRef;
use super::VdbVolume;

#[derive(Clone, Copy, Debug, Default)]
struct NodeFrame {
    level: usize,
    node: u32,
    cell: IVec3,
    step: IVec3,
    t_next: Vec3,
    t_delta: Vec3,
    t_current: f32,
    t_end: f32,
}

/// Interval iterator over a committed sparse tree
pub struct VdbIntervalIterator<'a> {
    volume: &'a VdbVolume,
    filter: RangeFilter<'a>,
    max_depth: u32,
    state: IteratorState,
    query: RayQuery,
    /// Ray in root-relative index space
    origin: Vec3,
    dir: Vec3,
    span: ValueRange,
    nominal_delta_t: f32,
    stack: [NodeFrame; LEAF_LEVEL],
    depth: usize,
}

impl<'a> VdbIntervalIterator<'a> {
    pub fn new(volume: &'a VdbVolume, filter: RangeFilter<'a>, max_depth: u32) -> Self {
        Self {
            volume,
            filter,
            max_depth: max_depth.min(LEAF_LEVEL as u32),
            state: IteratorState::Uninitialized,
            query: RayQuery::new(Vec3::ZERO, Vec3::X, ValueRange::EMPTY, 0.0),
            origin: Vec3::ZERO,
            dir: Vec3::X,
            span: ValueRange::EMPTY,
            nominal_delta_t: 0.0,
            stack: [NodeFrame::default(); LEAF_LEVEL],
            depth: 0,
        }
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    pub fn time(&self) -> f32 {
        self.query.time
    }

    pub fn ray(&self) -> Ray {
        self.query.ray
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn initialize(&mut self, query: RayQuery) {
        self.query = query;
        self.state = IteratorState::Ready;
        self.depth = 0;

        let volume = self.volume;
        let tree = volume.tree();
        let root = tree.root_origin().as_vec3();
        self.origin = (query.ray.origin - volume.grid_origin()) / volume.grid_spacing() - root;
        self.dir = query.ray.direction / volume.grid_spacing();
        self.nominal_delta_t = 1.0 / self.dir.abs().max_element();

        let index_ray = Ray::new(self.origin, self.dir);
        self.span = index_ray.clip(&tree.offset_bounds(), query.t_range);
        if !(self.span.upper > self.span.lower) {
            self.state = IteratorState::Done;
            return;
        }
        if self.max_depth > 0 {
            self.push_frame(0, 0, self.span);
        }
    }

    fn push_frame(&mut self, level: usize, node: u32, span: ValueRange) {
        let tree = self.volume.tree();
        let node_origin = tree.node(level, node).origin.as_vec3();
        let extent = total_res(level + 1) as f32;
        let max_cell = IVec3::splat(storage_res(level) as i32 - 1);

        let start_t = span.lower + (span.upper - span.lower) * 1e-4;
        let start = self.origin + self.dir * start_t;
        let cell = ((start - node_origin) / extent).floor().as_ivec3().clamp(IVec3::ZERO, max_cell);

        let mut frame = NodeFrame {
            level,
            node,
            cell,
            t_current: span.lower,
            t_end: span.upper,
            ..NodeFrame::default()
        };
        for axis in 0..3 {
            let d = self.dir[axis];
            let o = self.origin[axis];
            if d > 0.0 {
                frame.step[axis] = 1;
                frame.t_next[axis] = (node_origin[axis] + (cell[axis] + 1) as f32 * extent - o) / d;
                frame.t_delta[axis] = extent / d;
            } else if d < 0.0 {
                frame.step[axis] = -1;
                frame.t_next[axis] = (node_origin[axis] + cell[axis] as f32 * extent - o) / d;
                frame.t_delta[axis] = -extent / d;
            } else {
                frame.t_next[axis] = f32::INFINITY;
                frame.t_delta[axis] = f32::INFINITY;
            }
        }
        self.stack[self.depth] = frame;
        self.depth += 1;
    }
}

impl Iterator for VdbIntervalIterator<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        if matches!(self.state, IteratorState::Uninitialized | IteratorState::Done) {
            return None;
        }
        let tree = self.volume.tree();
        let attribute_count = tree.attribute_count();

        if self.max_depth == 0 {
            // Whole tree as one macrocell
            self.state = IteratorState::Done;
            let value_range = tree.value_range(self.filter.attribute);
            if !self.filter.accepts(&value_range) {
                return None;
            }
            return Some(Interval {
                t_range: self.span,
                value_range,
                nominal_delta_t: self.nominal_delta_t,
            });
        }

        while self.depth > 0 {
            let frame = &mut self.stack[self.depth - 1];
            if frame.t_current >= frame.t_end {
                self.depth -= 1;
                continue;
            }
            let axis = if frame.t_next.x <= frame.t_next.y && frame.t_next.x <= frame.t_next.z {
                0
            } else if frame.t_next.y <= frame.t_next.z {
                1
            } else {
                2
            };
            let t_enter = frame.t_current;
            let t_exit = frame.t_next[axis].max(t_enter).min(frame.t_end);
            let cell = frame.cell;
            let level = frame.level;
            let node_index = frame.node;

            frame.t_current = t_exit;
            frame.cell[axis] += frame.step[axis];
            frame.t_next[axis] += frame.t_delta[axis];
            let res = storage_res(level) as i32;
            if frame.cell[axis] < 0 || frame.cell[axis] >= res {
                frame.t_current = frame.t_end;
            }

            if t_exit <= t_enter {
                continue;
            }
            let node = tree.node(level, node_index);
            let voxel = linear_index(cell.as_uvec3(), res as u32);
            let content = node.voxels[voxel];
            if content.is_empty() {
                continue;
            }
            let value_range = node.range(voxel, self.filter.attribute, attribute_count);
            if !self.filter.accepts(&value_range) {
                continue;
            }
            let span = ValueRange::new(t_enter, t_exit);
            if let VoxelRef::Child(child) = content {
                if level + 1 < self.max_depth as usize {
                    self.push_frame(level + 1, child, span);
                    continue;
                }
            }
            self.state = IteratorState::Emitting;
            return Some(Interval {
                t_range: span,
                value_range,
                nominal_delta_t: self.nominal_delta_t,
            });
        }

        self.state = IteratorState::Done;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IVec3;
    use crate::volume::config::VdbConfig;
    use crate::volume::vdb::data::{VdbData, VdbLeaf};

    fn two_leaf_volume() -> VdbVolume {
        let leaves = vec![
            VdbLeaf::dense(IVec3::new(0, 0, 0), vec![1.0; 512]),
            VdbLeaf::dense(IVec3::new(16, 0, 0), vec![5.0; 512]),
            VdbLeaf::tile(2, IVec3::new(128, 0, 0), vec![9.0]),
        ];
        VdbVolume::build(VdbData::new(1, leaves), &VdbConfig::default()).unwrap()
    }

    fn collect(volume: &VdbVolume, ranges: &[ValueRange], depth: u32) -> Vec<Interval> {
        let mut it = VdbIntervalIterator::new(volume, RangeFilter { attribute: 0, ranges }, depth);
        it.initialize(RayQuery::new(Vec3::new(-10.0, 0.5, 0.5), Vec3::X, ValueRange::new(0.0, 1e6), 0.0));
        it.collect()
    }

    #[test]
    fn test_full_depth_emits_leaves_and_tile() {
        let volume = two_leaf_volume();
        let intervals = collect(&volume, &[], 3);
        assert_eq!(intervals.len(), 3);
        assert!((intervals[0].t_range.lower - 10.0).abs() < 1e-3);
        assert!((intervals[0].t_range.upper - 18.0).abs() < 1e-3);
        assert_eq!(intervals[0].value_range, ValueRange::point(1.0));
        assert!((intervals[1].t_range.lower - 26.0).abs() < 1e-3);
        assert_eq!(intervals[1].value_range, ValueRange::point(5.0));
        assert!((intervals[2].t_range.lower - 138.0).abs() < 1e-3);
        assert!((intervals[2].t_range.upper - 266.0).abs() < 1e-3);
        assert_eq!(intervals[2].value_range, ValueRange::point(9.0));
    }

    #[test]
    fn test_coarse_depths_merge_macrocells() {
        let volume = two_leaf_volume();
        let depth0 = collect(&volume, &[], 0);
        assert_eq!(depth0.len(), 1);
        assert_eq!(depth0[0].value_range, ValueRange::new(1.0, 9.0));

        // Depth 1/2: everything sits in the first root voxel and, at depth 2,
        // in two level-1 voxels
        assert_eq!(collect(&volume, &[], 1).len(), 1);
        let depth2 = collect(&volume, &[], 2);
        assert_eq!(depth2.len(), 2);
        assert_eq!(depth2[0].value_range, ValueRange::new(1.0, 5.0));
    }

    #[test]
    fn test_filter_prunes_subtrees() {
        let volume = two_leaf_volume();
        let intervals = collect(&volume, &[ValueRange::new(4.0, 6.0)], 3);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].value_range, ValueRange::point(5.0));
        assert!(collect(&volume, &[ValueRange::new(20.0, 30.0)], 3).is_empty());
    }
}
