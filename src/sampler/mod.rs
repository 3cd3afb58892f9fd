//! Query handle over a committed volume

use std::sync::Arc;

use crate::core::types::{Result, Vec3};
use crate::field::{FieldSampler, Filter};
use crate::iterator::{ContextParams, HitIteratorContext, IntervalIteratorContext};
use crate::volume::CommittedVolume;

/// Shares a committed structure with its volume and any other samplers
#[derive(Clone, Debug)]
pub struct Sampler {
    volume: Arc<CommittedVolume>,
    filter: Filter,
}

impl Sampler {
    pub fn new(volume: Arc<CommittedVolume>, filter: Filter) -> Self {
        Self { volume, filter }
    }

    pub fn volume(&self) -> &CommittedVolume {
        &self.volume
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub fn new_interval_context(&self, params: ContextParams) -> Result<IntervalIteratorContext<'_>> {
        IntervalIteratorContext::new(self, params)
    }

    pub fn new_hit_context(&self, params: ContextParams) -> Result<HitIteratorContext<'_>> {
        HitIteratorContext::new(self, params)
    }
}

impl FieldSampler for Sampler {
    fn evaluate(&self, point: Vec3, attribute: usize, time: f32) -> f32 {
        self.volume.sample(self.filter, point, attribute, time)
    }

    fn gradient_step(&self) -> Vec3 {
        self.volume.gradient_step()
    }
}
