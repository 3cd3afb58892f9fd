//! Macrocell DDA interval iterator for dense grids

use crate::core::types::{IVec3, Vec3};
use crate::iterator::{Interval, IteratorState, RangeFilter, RayQuery};
use crate::math::{Aabb, Ray, ValueRange};
use super::data::GridGeometry;
use super::GridVolume;

/// Walks macrocells along the ray in traversal order
pub struct GridIntervalIterator<'a> {
    volume: &'a GridVolume,
    filter: RangeFilter<'a>,
    state: IteratorState,
    query: RayQuery,
    t_current: f32,
    t_end: f32,
    nominal_delta_t: f32,
    cell: IVec3,
    step: IVec3,
    t_next: Vec3,
    t_delta: Vec3,
}

impl<'a> GridIntervalIterator<'a> {
    pub fn new(volume: &'a GridVolume, filter: RangeFilter<'a>) -> Self {
        Self {
            volume,
            filter,
            state: IteratorState::Uninitialized,
            query: RayQuery::new(Vec3::ZERO, Vec3::X, ValueRange::EMPTY, 0.0),
            t_current: 0.0,
            t_end: 0.0,
            nominal_delta_t: 0.0,
            cell: IVec3::ZERO,
            step: IVec3::ZERO,
            t_next: Vec3::ZERO,
            t_delta: Vec3::ZERO,
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

    pub fn initialize(&mut self, query: RayQuery) {
        self.query = query;
        self.state = IteratorState::Ready;
        let grid = self.volume.grid();

        if grid.geometry == GridGeometry::Spherical {
            let span = query.ray.clip(&grid.bounds(), query.t_range);
            self.t_current = span.lower;
            self.t_end = span.upper;
            self.nominal_delta_t = grid.grid_spacing.x / query.ray.direction.length();
            if !(span.upper > span.lower) {
                self.state = IteratorState::Done;
            }
            return;
        }

        let accel = self.volume.accelerator();
        let origin = (query.ray.origin - grid.grid_origin) / grid.grid_spacing;
        let dir = query.ray.direction / grid.grid_spacing;
        let index_ray = Ray::new(origin, dir);
        let span = index_ray.clip(&Aabb::new(Vec3::ZERO, grid.index_extent_max()), query.t_range);
        if !(span.upper > span.lower) {
            self.state = IteratorState::Done;
            return;
        }

        self.t_current = span.lower;
        self.t_end = span.upper;
        self.nominal_delta_t = 1.0 / dir.abs().max_element();

        let width = accel.macrocell_width() as f32;
        let max_cell = accel.cell_counts().as_ivec3() - IVec3::ONE;
        // Locate the entry cell from the middle of the first step to avoid
        // landing on the wrong side of a face we start exactly on
        let start = index_ray.at(span.lower + (span.upper - span.lower).min(self.nominal_delta_t) * 1e-3);
        self.cell = (start / width).floor().as_ivec3().clamp(IVec3::ZERO, max_cell);

        for axis in 0..3 {
            let d = dir[axis];
            if d > 0.0 {
                self.step[axis] = 1;
                let boundary = (self.cell[axis] + 1) as f32 * width;
                self.t_next[axis] = (boundary - origin[axis]) / d;
                self.t_delta[axis] = width / d;
            } else if d < 0.0 {
                self.step[axis] = -1;
                let boundary = self.cell[axis] as f32 * width;
                self.t_next[axis] = (boundary - origin[axis]) / d;
                self.t_delta[axis] = -width / d;
            } else {
                self.step[axis] = 0;
                self.t_next[axis] = f32::INFINITY;
                self.t_delta[axis] = f32::INFINITY;
            }
        }
    }

    fn next_spherical(&mut self) -> Option<Interval> {
        let value_range = self.volume.value_range(self.filter.attribute);
        self.state = IteratorState::Done;
        if !self.filter.accepts(&value_range) {
            return None;
        }
        Some(Interval {
            t_range: ValueRange::new(self.t_current, self.t_end),
            value_range,
            nominal_delta_t: self.nominal_delta_t,
        })
    }
}

impl Iterator for GridIntervalIterator<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        if matches!(self.state, IteratorState::Uninitialized | IteratorState::Done) {
            return None;
        }
        if self.volume.grid().geometry == GridGeometry::Spherical {
            return self.next_spherical();
        }

        let accel = self.volume.accelerator();
        let cells = accel.cell_counts().as_ivec3();

        while self.t_current < self.t_end {
            let axis = if self.t_next.x <= self.t_next.y && self.t_next.x <= self.t_next.z {
                0
            } else if self.t_next.y <= self.t_next.z {
                1
            } else {
                2
            };
            let t_enter = self.t_current;
            let t_exit = self.t_next[axis].max(t_enter).min(self.t_end);
            let cell = self.cell;

            self.t_current = t_exit;
            self.cell[axis] += self.step[axis];
            self.t_next[axis] += self.t_delta[axis];
            if self.cell[axis] < 0 || self.cell[axis] >= cells[axis] {
                self.t_current = self.t_end;
            }

            if t_exit <= t_enter {
                continue;
            }
            let value_range = accel.range(cell.as_uvec3(), self.filter.attribute);
            if self.filter.accepts(&value_range) {
                self.state = IteratorState::Emitting;
                return Some(Interval {
                    t_range: ValueRange::new(t_enter, t_exit),
                    value_range,
                    nominal_delta_t: self.nominal_delta_t,
                });
            }
        }

        self.state = IteratorState::Done;
        None
    }
}
