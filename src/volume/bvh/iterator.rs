//! Interval iterator over a BVH
//!
//! A node is terminal when it is a leaf or sits at the context's depth
//! limit. Each step finds the nearest terminal node ahead of the current
//! ray parameter, then cuts the interval at the next point where the set
//! of covering terminal nodes changes, so overlapping subtrees still
//! produce ordered, disjoint intervals.

use crate::core::types::Vec3;
use crate::iterator::{Interval, IteratorState, RangeFilter, RayQuery};
use crate::math::{Ray, ValueRange};
use super::node::{Bvh, NodeKind, TRAVERSAL_STACK};

pub struct BvhIntervalIterator<'a> {
    bvh: &'a Bvh,
    filter: RangeFilter<'a>,
    max_depth: u32,
    state: IteratorState,
    query: RayQuery,
    t_current: f32,
    t_end: f32,
}

impl<'a> BvhIntervalIterator<'a> {
    pub fn new(bvh: &'a Bvh, filter: RangeFilter<'a>, max_depth: u32) -> Self {
        Self {
            bvh,
            filter,
            max_depth,
            state: IteratorState::Uninitialized,
            query: RayQuery::new(Vec3::ZERO, Vec3::X, ValueRange::EMPTY, 0.0),
            t_current: 0.0,
            t_end: 0.0,
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
        let span = query.ray.clip(&self.bvh.bounds(), query.t_range);
        self.t_current = span.lower;
        self.t_end = span.upper;
        if !(span.upper > span.lower) {
            self.state = IteratorState::Done;
        }
    }

    /// Visit every terminal node that passes the filter and whose ray span
    /// overlaps `[t_current, limit)`, nearest subtrees first
    ///
    /// `visit` returns the new `limit`. A child's span never starts before
    /// its parent's, so subtrees starting at or past the limit are skipped.
    fn for_each_terminal(&self, mut limit: f32, mut visit: impl FnMut(u32, ValueRange) -> f32) {
        let bvh = self.bvh;
        let ray = &self.query.ray;
        let mut stack = [0u32; TRAVERSAL_STACK];
        let mut top = 1;
        while top > 0 {
            top -= 1;
            let index = stack[top];
            let node = bvh.node(index);
            let span = ray.clip(&node.bounds, ValueRange::new(self.t_current, limit));
            if !(span.upper > span.lower) {
                continue;
            }
            if !self.filter.accepts(&bvh.range(index, self.filter.attribute)) {
                continue;
            }
            match node.kind {
                NodeKind::Inner { children } if node.level < self.max_depth => {
                    let depth_along = |c: u32| (bvh.node(c).bounds.center() - ray.origin).dot(ray.direction);
                    let [near, far] = if depth_along(children[0]) <= depth_along(children[1]) {
                        children
                    } else {
                        [children[1], children[0]]
                    };
                    stack[top] = far;
                    stack[top + 1] = near;
                    top += 2;
                }
                _ => limit = visit(index, span),
            }
        }
    }
}

impl Iterator for BvhIntervalIterator<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        if matches!(self.state, IteratorState::Uninitialized | IteratorState::Done) {
            return None;
        }

        // Nearest entry; only nodes starting before the best so far can improve it
        let mut entry = f32::INFINITY;
        self.for_each_terminal(self.t_end, |_, span| {
            entry = entry.min(span.lower);
            entry
        });
        if !entry.is_finite() {
            self.state = IteratorState::Done;
            return None;
        }

        // Every covering node starts exactly at `entry`; the interval ends
        // where the first of them exits or another terminal node begins
        let bvh = self.bvh;
        let attribute = self.filter.attribute;
        let mut exit = self.t_end;
        let mut value_range = ValueRange::EMPTY;
        let mut length = Vec3::splat(f32::INFINITY);
        self.for_each_terminal(self.t_end, |index, span| {
            if span.lower <= entry {
                exit = exit.min(span.upper);
                value_range.extend_range(&bvh.range(index, attribute));
                length = length.min(bvh.node(index).nominal_length.abs());
            } else {
                exit = exit.min(span.lower);
            }
            exit
        });

        self.t_current = exit;
        if self.t_current >= self.t_end {
            self.state = IteratorState::Done;
        } else {
            self.state = IteratorState::Emitting;
        }
        // The last interval still gets returned; Done only blocks the next call
        Some(Interval {
            t_range: ValueRange::new(entry, exit),
            value_range,
            nominal_delta_t: length.min_element() / self.query.ray.direction.length(),
        })
    }
}
