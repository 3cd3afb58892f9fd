//! Volidx - spatial indexing and ray traversal for volumetric fields

pub mod core;
pub mod math;
pub mod field;
pub mod iterator;
pub mod volume;
pub mod sampler;

pub use crate::core::error::Error;
pub use crate::core::types::Result;
pub use field::{FieldSampler, Filter};
pub use iterator::{ContextParams, Hit, HitIterator, Interval, IntervalIter, IteratorState};
pub use math::{Aabb, Ray, ValueRange};
pub use sampler::Sampler;
pub use volume::config::VolumeConfig;
pub use volume::{CommittedVolume, Volume, VolumeData};
