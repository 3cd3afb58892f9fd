//! Interval and hit iteration along rays
//!
//! Iterators are small value types meant to live on the caller's stack for
//! the duration of one ray query. They borrow the committed structure through
//! an iterator context and never allocate.

pub mod context;
pub mod depth;
pub mod hit;

use crate::core::types::Vec3;
use crate::math::{Ray, ValueRange};
use crate::volume::bvh::iterator::BvhIntervalIterator;
use crate::volume::grid::iterator::GridIntervalIterator;
use crate::volume::vdb::iterator::VdbIntervalIterator;

pub use context::{ContextParams, HitIteratorContext, IntervalIteratorContext};
pub use hit::HitIterator;

/// Ray-parameter sub-range with the field values reachable inside it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    pub t_range: ValueRange,
    pub value_range: ValueRange,
    /// Recommended step for fixed-step sampling inside this interval
    pub nominal_delta_t: f32,
}

/// Ray parameter at which the field crosses a requested iso-value
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub sample: f32,
    /// Distance along the ray within which the hit location is uncertain
    pub epsilon: f32,
}

/// Lifecycle of a per-ray iterator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IteratorState {
    #[default]
    Uninitialized,
    Ready,
    Emitting,
    Done,
}

/// Attribute selection plus the optional value-range filter of a context
#[derive(Clone, Copy, Debug)]
pub struct RangeFilter<'a> {
    pub attribute: usize,
    pub ranges: &'a [ValueRange],
}

impl RangeFilter<'_> {
    /// An empty filter list accepts every non-empty range
    pub fn accepts(&self, range: &ValueRange) -> bool {
        if range.is_empty() {
            return false;
        }
        self.ranges.is_empty() || self.ranges.iter().any(|r| r.intersects(range))
    }
}

/// Per-ray query arguments shared by every family iterator
#[derive(Clone, Copy, Debug)]
pub struct RayQuery {
    pub ray: Ray,
    pub t_range: ValueRange,
    pub time: f32,
}

impl RayQuery {
    pub fn new(origin: Vec3, direction: Vec3, t_range: ValueRange, time: f32) -> Self {
        Self {
            ray: Ray::new(origin, direction),
            t_range,
            time,
        }
    }
}

/// Interval iterator over any committed volume family.
///
/// The enum keeps the per-ray iterator a plain stack value; its size for a
/// given family is reported by [`crate::volume::Volume::interval_iterator_size`].
pub enum IntervalIter<'a> {
    Grid(GridIntervalIterator<'a>),
    Vdb(VdbIntervalIterator<'a>),
    Bvh(BvhIntervalIterator<'a>),
}

impl<'a> IntervalIter<'a> {
    /// Reset the iterator for a new ray; moves to `Ready`
    pub fn initialize(&mut self, origin: Vec3, direction: Vec3, t_range: ValueRange, time: f32) {
        let query = RayQuery::new(origin, direction, t_range, time);
        match self {
            IntervalIter::Grid(it) => it.initialize(query),
            IntervalIter::Vdb(it) => it.initialize(query),
            IntervalIter::Bvh(it) => it.initialize(query),
        }
    }

    pub fn state(&self) -> IteratorState {
        match self {
            IntervalIter::Grid(it) => it.state(),
            IntervalIter::Vdb(it) => it.state(),
            IntervalIter::Bvh(it) => it.state(),
        }
    }

    /// Time the iterator was initialized with
    pub fn time(&self) -> f32 {
        match self {
            IntervalIter::Grid(it) => it.time(),
            IntervalIter::Vdb(it) => it.time(),
            IntervalIter::Bvh(it) => it.time(),
        }
    }

    /// Ray the iterator was initialized with
    pub fn ray(&self) -> Ray {
        match self {
            IntervalIter::Grid(it) => it.ray(),
            IntervalIter::Vdb(it) => it.ray(),
            IntervalIter::Bvh(it) => it.ray(),
        }
    }
}

impl Iterator for IntervalIter<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        match self {
            IntervalIter::Grid(it) => it.next(),
            IntervalIter::Vdb(it) => it.next(),
            IntervalIter::Bvh(it) => it.next(),
        }
    }
}
