//! Generic hit iterator built on any interval iterator
//!
//! Inside every interval whose value range contains a requested iso-value
//! the field is stepped at a quarter of the interval's nominal step. A sign
//! change against an iso-value is refined by bisection and reported.

use crate::core::types::Vec3;
use crate::field::FieldSampler;
use crate::math::{Ray, ValueRange};
use crate::sampler::Sampler;
use super::{Hit, Interval, IntervalIter, IteratorState};

const STEPS_PER_NOMINAL: f32 = 4.0;
/// Upper bound on scan steps per interval
const MAX_STEPS_PER_INTERVAL: f32 = 4096.0;
const BISECTION_STEPS: u32 = 16;
const EPSILON_FACTOR: f32 = 0.125;

pub struct HitIterator<'a> {
    intervals: IntervalIter<'a>,
    sampler: &'a Sampler,
    attribute: usize,
    iso_values: &'a [f32],
    state: IteratorState,
    current: Option<Interval>,
    step: f32,
    t_scan: f32,
    value_scan: f32,
}

impl<'a> HitIterator<'a> {
    pub fn new(intervals: IntervalIter<'a>, sampler: &'a Sampler, attribute: usize, iso_values: &'a [f32]) -> Self {
        Self {
            intervals,
            sampler,
            attribute,
            iso_values,
            state: IteratorState::Uninitialized,
            current: None,
            step: 0.0,
            t_scan: 0.0,
            value_scan: f32::NAN,
        }
    }

    pub fn initialize(&mut self, origin: Vec3, direction: Vec3, t_range: ValueRange, time: f32) {
        self.intervals.initialize(origin, direction, t_range, time);
        self.current = None;
        self.state = if self.iso_values.is_empty() || self.intervals.state() == IteratorState::Done {
            IteratorState::Done
        } else {
            IteratorState::Ready
        };
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    pub fn time(&self) -> f32 {
        self.intervals.time()
    }

    pub fn ray(&self) -> Ray {
        self.intervals.ray()
    }

    fn sample(&self, t: f32) -> f32 {
        let point = self.intervals.ray().at(t);
        self.sampler.evaluate(point, self.attribute, self.intervals.time())
    }

    fn start_interval(&mut self, interval: Interval) {
        let span = interval.t_range.size();
        let step = interval.nominal_delta_t / STEPS_PER_NOMINAL;
        self.step = if step.is_finite() && step > 0.0 {
            step.max(span / MAX_STEPS_PER_INTERVAL)
        } else {
            span
        };
        self.t_scan = interval.t_range.lower;
        self.value_scan = self.sample(self.t_scan);
        self.current = Some(interval);
    }

    /// Root of `f - iso` in `[lo, hi]` given a sign change across it
    fn bisect(&self, mut lo: f32, mut hi: f32, iso: f32) -> f32 {
        let below_at_lo = self.sample(lo) < iso;
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if (self.sample(mid) < iso) == below_at_lo {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// Earliest crossing in the current interval at or after the scan point
    fn scan(&mut self, interval: Interval) -> Option<Hit> {
        let upper = interval.t_range.upper;
        while self.t_scan < upper {
            let t0 = self.t_scan;
            let v0 = self.value_scan;
            let t1 = (t0 + self.step).min(upper);
            let v1 = self.sample(t1);

            let mut best: Option<(f32, f32)> = None;
            if v0.is_finite() && v1.is_finite() {
                for &iso in self.iso_values {
                    if (v0 < iso) != (v1 < iso) {
                        let t = self.bisect(t0, t1, iso);
                        if best.is_none_or(|(bt, _)| t < bt) {
                            best = Some((t, iso));
                        }
                    }
                }
            }

            if let Some((t, iso)) = best {
                // Resume just past the root so the same crossing is not found again
                let resume = (t + self.step * 1e-3).max(t0 + f32::EPSILON * t0.abs().max(1.0));
                self.t_scan = resume.min(upper);
                self.value_scan = self.sample(self.t_scan);
                return Some(Hit {
                    t,
                    sample: iso,
                    epsilon: EPSILON_FACTOR * interval.nominal_delta_t,
                });
            }
            self.t_scan = t1;
            self.value_scan = v1;
        }
        None
    }
}

impl Iterator for HitIterator<'_> {
    type Item = Hit;

    fn next(&mut self) -> Option<Hit> {
        if matches!(self.state, IteratorState::Uninitialized | IteratorState::Done) {
            return None;
        }
        loop {
            let interval = match self.current {
                Some(interval) => interval,
                None => {
                    let Some(interval) = self.intervals.next() else {
                        self.state = IteratorState::Done;
                        return None;
                    };
                    if !self.iso_values.iter().any(|&v| interval.value_range.contains(v)) {
                        continue;
                    }
                    self.start_interval(interval);
                    interval
                }
            };
            if let Some(hit) = self.scan(interval) {
                self.state = IteratorState::Emitting;
                return Some(hit);
            }
            self.current = None;
        }
    }
}
