//! Closed scalar interval used for value ranges and ray parameter spans

use serde::{Deserialize, Serialize};

/// Closed interval `[lower, upper]`
///
/// The canonical empty range is `[+inf, -inf]`; extending it by a value
/// yields the degenerate range at that value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub lower: f32,
    pub upper: f32,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl ValueRange {
    pub const EMPTY: ValueRange = ValueRange {
        lower: f32::INFINITY,
        upper: f32::NEG_INFINITY,
    };

    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    /// Degenerate range `[v, v]`
    pub fn point(v: f32) -> Self {
        Self { lower: v, upper: v }
    }

    /// True if the range contains no value (also true for NaN bounds)
    pub fn is_empty(&self) -> bool {
        !(self.lower <= self.upper)
    }

    pub fn size(&self) -> f32 {
        if self.is_empty() { 0.0 } else { self.upper - self.lower }
    }

    /// Grow to include `v`; NaN values are ignored
    pub fn extend(&mut self, v: f32) {
        if v.is_nan() {
            return;
        }
        self.lower = self.lower.min(v);
        self.upper = self.upper.max(v);
    }

    /// Grow to include `other`
    pub fn extend_range(&mut self, other: &ValueRange) {
        if other.is_empty() {
            return;
        }
        self.lower = self.lower.min(other.lower);
        self.upper = self.upper.max(other.upper);
    }

    pub fn union(&self, other: &ValueRange) -> ValueRange {
        let mut r = *self;
        r.extend_range(other);
        r
    }

    pub fn contains(&self, v: f32) -> bool {
        self.lower <= v && v <= self.upper
    }

    /// True if `other` is a subset of this range (the empty range is a
    /// subset of everything)
    pub fn contains_range(&self, other: &ValueRange) -> bool {
        other.is_empty() || (self.lower <= other.lower && other.upper <= self.upper)
    }

    pub fn intersects(&self, other: &ValueRange) -> bool {
        !self.is_empty() && !other.is_empty()
            && self.lower <= other.upper && other.lower <= self.upper
    }

    /// Range grown on both sides by `margin * size()`
    pub fn expanded_relative(&self, margin: f32) -> ValueRange {
        if self.is_empty() {
            return *self;
        }
        let pad = self.size() * margin;
        ValueRange::new(self.lower - pad, self.upper + pad)
    }
}

/// Range of the values in a slice, ignoring NaN
pub fn range_of(values: &[f32]) -> ValueRange {
    let mut r = ValueRange::EMPTY;
    for &v in values {
        r.extend(v);
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_extend() {
        let mut r = ValueRange::EMPTY;
        assert!(r.is_empty());
        r.extend(3.0);
        assert_eq!(r, ValueRange::point(3.0));
        r.extend(f32::NAN);
        r.extend(-1.0);
        assert_eq!(r, ValueRange::new(-1.0, 3.0));
    }

    #[test]
    fn test_containment_and_intersection() {
        let a = ValueRange::new(0.0, 10.0);
        let b = ValueRange::new(2.0, 3.0);
        assert!(a.contains_range(&b));
        assert!(!b.contains_range(&a));
        assert!(a.contains_range(&ValueRange::EMPTY));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&ValueRange::new(11.0, 12.0)));
        assert!(!a.intersects(&ValueRange::EMPTY));
        assert!(a.intersects(&ValueRange::point(10.0)));
    }

    #[test]
    fn test_expanded_relative() {
        let r = ValueRange::new(0.0, 10.0).expanded_relative(0.1);
        assert_eq!(r, ValueRange::new(-1.0, 11.0));
        assert!(ValueRange::EMPTY.expanded_relative(0.1).is_empty());
    }

    #[test]
    fn test_range_of() {
        assert_eq!(range_of(&[2.0, f32::NAN, -4.0]), ValueRange::new(-4.0, 2.0));
        assert!(range_of(&[]).is_empty());
    }
}
