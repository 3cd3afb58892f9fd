//! Iterator contexts: committed per-configuration traversal settings

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::ValueRange;
use crate::sampler::Sampler;
use super::depth::clamp_hint;
use super::hit::HitIterator;
use super::{IntervalIter, RangeFilter};

/// User-supplied context settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    pub attribute_index: usize,
    /// Only intervals whose value range meets one of these are emitted;
    /// empty means no filtering
    pub value_ranges: Vec<ValueRange>,
    /// Values hit iterators search for
    pub iso_values: Vec<f32>,
    /// `[0, 1]` accuracy/performance dial; clamped on commit
    pub resolution_hint: f32,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            attribute_index: 0,
            value_ranges: Vec::new(),
            iso_values: Vec::new(),
            resolution_hint: 0.5,
        }
    }
}

impl ContextParams {
    fn validate(&self, sampler: &Sampler) -> Result<()> {
        let count = sampler.volume().attribute_count();
        if self.attribute_index >= count {
            return Err(Error::validation(format!(
                "attribute index {} out of range for a volume with {} attributes",
                self.attribute_index, count
            )));
        }
        if let Some(bad) = self.value_ranges.iter().find(|r| r.is_empty()) {
            return Err(Error::validation(format!("invalid value range filter {:?}", bad)));
        }
        if self.iso_values.iter().any(|v| v.is_nan()) {
            return Err(Error::validation("iso values must not be NaN"));
        }
        Ok(())
    }
}

/// Committed settings for interval iteration
#[derive(Debug)]
pub struct IntervalIteratorContext<'s> {
    sampler: &'s Sampler,
    params: ContextParams,
    max_depth: u32,
}

impl<'s> IntervalIteratorContext<'s> {
    pub fn new(sampler: &'s Sampler, params: ContextParams) -> Result<Self> {
        let mut context = Self { sampler, params: ContextParams::default(), max_depth: 0 };
        context.commit(params)?;
        Ok(context)
    }

    /// Replace the settings; on error the previous settings stay active
    pub fn commit(&mut self, mut params: ContextParams) -> Result<()> {
        params.validate(self.sampler)?;
        params.resolution_hint = clamp_hint(params.resolution_hint);
        self.max_depth = self.sampler.volume().max_depth(params.resolution_hint, false);
        log::debug!(
            "Interval context: attribute {}, {} filter ranges, hint {} -> depth {}",
            params.attribute_index,
            params.value_ranges.len(),
            params.resolution_hint,
            self.max_depth
        );
        self.params = params;
        Ok(())
    }

    pub fn sampler(&self) -> &'s Sampler {
        self.sampler
    }

    pub fn params(&self) -> &ContextParams {
        &self.params
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Uninitialized iterator; call `initialize` per ray
    pub fn iter(&self) -> IntervalIter<'_> {
        let filter = RangeFilter {
            attribute: self.params.attribute_index,
            ranges: &self.params.value_ranges,
        };
        self.sampler.volume().interval_iter(filter, self.max_depth)
    }
}

/// Committed settings for hit iteration
///
/// Intervals are filtered by the iso values themselves, so only macrocells
/// that can contain a crossing are searched.
#[derive(Debug)]
pub struct HitIteratorContext<'s> {
    sampler: &'s Sampler,
    params: ContextParams,
    iso_ranges: Vec<ValueRange>,
    max_depth: u32,
}

impl<'s> HitIteratorContext<'s> {
    pub fn new(sampler: &'s Sampler, params: ContextParams) -> Result<Self> {
        let mut context = Self {
            sampler,
            params: ContextParams::default(),
            iso_ranges: Vec::new(),
            max_depth: 0,
        };
        context.commit(params)?;
        Ok(context)
    }

    pub fn commit(&mut self, mut params: ContextParams) -> Result<()> {
        params.validate(self.sampler)?;
        params.resolution_hint = clamp_hint(params.resolution_hint);
        if params.iso_values.is_empty() {
            log::warn!("Hit context committed without iso values; iterators will report no hits");
        }
        self.max_depth = self.sampler.volume().max_depth(params.resolution_hint, true);
        self.iso_ranges = params.iso_values.iter().map(|&v| ValueRange::point(v)).collect();
        self.params = params;
        Ok(())
    }

    pub fn sampler(&self) -> &'s Sampler {
        self.sampler
    }

    pub fn params(&self) -> &ContextParams {
        &self.params
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn iter(&self) -> HitIterator<'_> {
        let filter = RangeFilter {
            attribute: self.params.attribute_index,
            ranges: &self.iso_ranges,
        };
        let intervals = self.sampler.volume().interval_iter(filter, self.max_depth);
        HitIterator::new(intervals, self.sampler, self.params.attribute_index, &self.params.iso_values)
    }
}
