//! Volume families and the commit lifecycle
//!
//! A [`Volume`] holds raw input and configuration. `commit` builds exactly
//! one acceleration structure for the data's family and swaps it in only
//! when the build succeeds; samplers created earlier keep the structure
//! they were created from.

pub mod config;
pub mod grid;
pub mod vdb;
pub mod bvh;
pub mod unstructured;
pub mod particle;

use std::sync::Arc;

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::field::{FieldSampler, Filter};
use crate::iterator::depth::{bvh_depth, vdb_depth};
use crate::iterator::{HitIterator, IntervalIter, RangeFilter};
use crate::math::{Aabb, ValueRange};
use crate::sampler::Sampler;

use bvh::BvhIntervalIterator;
use config::VolumeConfig;
use grid::{GridIntervalIterator, GridVolume, StructuredGrid};
use particle::{ParticleCloud, ParticleVolume};
use unstructured::{UnstructuredMesh, UnstructuredVolume};
use vdb::{VdbData, VdbIntervalIterator, VdbVolume};

/// Raw input for one volume family
#[derive(Clone, Debug)]
pub enum VolumeData {
    StructuredGrid(StructuredGrid),
    Vdb(VdbData),
    Unstructured(UnstructuredMesh),
    Particles(ParticleCloud),
}

impl VolumeData {
    pub fn family(&self) -> &'static str {
        match self {
            VolumeData::StructuredGrid(_) => "structured grid",
            VolumeData::Vdb(_) => "sparse tree",
            VolumeData::Unstructured(_) => "unstructured mesh",
            VolumeData::Particles(_) => "particles",
        }
    }
}

/// A successfully built, read-only acceleration structure
#[derive(Debug)]
pub enum CommittedVolume {
    Grid(GridVolume),
    Vdb(VdbVolume),
    Unstructured(UnstructuredVolume),
    Particles(ParticleVolume),
}

impl CommittedVolume {
    pub fn build(data: VolumeData, config: &VolumeConfig) -> Result<Self> {
        Ok(match data {
            VolumeData::StructuredGrid(grid) => CommittedVolume::Grid(GridVolume::build(grid, &config.grid)?),
            VolumeData::Vdb(data) => CommittedVolume::Vdb(VdbVolume::build(data, &config.vdb)?),
            VolumeData::Unstructured(mesh) => {
                CommittedVolume::Unstructured(UnstructuredVolume::build(mesh, &config.bvh)?)
            }
            VolumeData::Particles(cloud) => {
                CommittedVolume::Particles(ParticleVolume::build(cloud, &config.particle, &config.bvh)?)
            }
        })
    }

    pub fn bounds(&self) -> Aabb {
        match self {
            CommittedVolume::Grid(v) => v.bounds(),
            CommittedVolume::Vdb(v) => v.bounds(),
            CommittedVolume::Unstructured(v) => v.bounds(),
            CommittedVolume::Particles(v) => v.bounds(),
        }
    }

    pub fn attribute_count(&self) -> usize {
        match self {
            CommittedVolume::Grid(v) => v.attribute_count(),
            CommittedVolume::Vdb(v) => v.attribute_count(),
            CommittedVolume::Unstructured(v) => v.attribute_count(),
            CommittedVolume::Particles(_) => 1,
        }
    }

    pub fn value_range(&self, attribute: usize) -> ValueRange {
        match self {
            CommittedVolume::Grid(v) => v.value_range(attribute),
            CommittedVolume::Vdb(v) => v.value_range(attribute),
            CommittedVolume::Unstructured(v) => v.value_range(attribute),
            CommittedVolume::Particles(v) => v.value_range(attribute),
        }
    }

    pub fn sample(&self, filter: Filter, point: Vec3, attribute: usize, time: f32) -> f32 {
        match self {
            CommittedVolume::Grid(v) => v.sample(filter, point, attribute),
            CommittedVolume::Vdb(v) => v.sample(filter, point, attribute, time),
            CommittedVolume::Unstructured(v) => v.sample(filter, point, attribute),
            CommittedVolume::Particles(v) => v.field(point),
        }
    }

    pub fn gradient_step(&self) -> Vec3 {
        match self {
            CommittedVolume::Grid(v) => v.gradient_step(),
            CommittedVolume::Vdb(v) => FieldSampler::gradient_step(v),
            CommittedVolume::Unstructured(v) => v.gradient_step(),
            CommittedVolume::Particles(v) => v.gradient_step(),
        }
    }

    /// Traversal depth for a resolution hint.
    ///
    /// Dense grids have a single macrocell level and always report 0. Hit
    /// iteration over trees with tiles uses the deepest level so tile and
    /// leaf boundaries line up.
    pub fn max_depth(&self, hint: f32, for_hits: bool) -> u32 {
        match self {
            CommittedVolume::Grid(_) => 0,
            CommittedVolume::Vdb(v) if for_hits && v.has_tiles() => vdb::levels::LEAF_LEVEL as u32,
            CommittedVolume::Vdb(_) => vdb_depth(hint),
            CommittedVolume::Unstructured(v) => bvh_depth(hint, v.bvh().depth()),
            CommittedVolume::Particles(v) => bvh_depth(hint, v.bvh().depth()),
        }
    }

    /// Fresh, uninitialized interval iterator for this family
    pub fn interval_iter<'a>(&'a self, filter: RangeFilter<'a>, max_depth: u32) -> IntervalIter<'a> {
        match self {
            CommittedVolume::Grid(v) => IntervalIter::Grid(GridIntervalIterator::new(v, filter)),
            CommittedVolume::Vdb(v) => IntervalIter::Vdb(VdbIntervalIterator::new(v, filter, max_depth)),
            CommittedVolume::Unstructured(v) => IntervalIter::Bvh(BvhIntervalIterator::new(v.bvh(), filter, max_depth)),
            CommittedVolume::Particles(v) => IntervalIter::Bvh(BvhIntervalIterator::new(v.bvh(), filter, max_depth)),
        }
    }
}

/// User-facing volume handle
pub struct Volume {
    data: VolumeData,
    config: VolumeConfig,
    committed: Option<Arc<CommittedVolume>>,
}

impl Volume {
    /// Uncommitted volume; call [`Volume::commit`] before querying
    pub fn new(data: VolumeData, config: VolumeConfig) -> Self {
        Self { data, config, committed: None }
    }

    pub fn data(&self) -> &VolumeData {
        &self.data
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Replace the input; takes effect on the next commit
    pub fn set_data(&mut self, data: VolumeData) {
        self.data = data;
    }

    /// Replace the configuration; takes effect on the next commit
    pub fn set_config(&mut self, config: VolumeConfig) {
        self.config = config;
    }

    /// Build the acceleration structure for the current data and config.
    ///
    /// On failure the previously committed structure, if any, stays in place.
    pub fn commit(&mut self) -> Result<()> {
        let start = std::time::Instant::now();
        let built = self
            .config
            .validate()
            .and_then(|_| CommittedVolume::build(self.data.clone(), &self.config));
        match built {
            Ok(built) => {
                log::info!("Committed {} volume in {:?}", self.data.family(), start.elapsed());
                self.committed = Some(Arc::new(built));
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to commit {} volume: {}", self.data.family(), e);
                Err(e)
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    pub fn committed(&self) -> Result<&Arc<CommittedVolume>> {
        self.committed.as_ref().ok_or(Error::NotCommitted)
    }

    pub fn bounds(&self) -> Result<Aabb> {
        Ok(self.committed()?.bounds())
    }

    pub fn value_range(&self, attribute: usize) -> Result<ValueRange> {
        let committed = self.committed()?;
        if attribute >= committed.attribute_count() {
            return Err(Error::validation(format!(
                "attribute {} out of range for a volume with {} attributes",
                attribute,
                committed.attribute_count()
            )));
        }
        Ok(committed.value_range(attribute))
    }

    pub fn attribute_count(&self) -> Result<usize> {
        Ok(self.committed()?.attribute_count())
    }

    /// Sampler sharing the current committed structure
    pub fn new_sampler(&self, filter: Filter) -> Result<Sampler> {
        Ok(Sampler::new(Arc::clone(self.committed()?), filter))
    }

    /// Bytes needed for `width` interval iterators of this volume's family
    pub fn interval_iterator_size(&self, width: usize) -> usize {
        let one = match self.data {
            VolumeData::StructuredGrid(_) => std::mem::size_of::<GridIntervalIterator<'static>>(),
            VolumeData::Vdb(_) => std::mem::size_of::<VdbIntervalIterator<'static>>(),
            VolumeData::Unstructured(_) | VolumeData::Particles(_) => {
                std::mem::size_of::<BvhIntervalIterator<'static>>()
            }
        };
        one * width
    }

    /// Bytes needed for `width` hit iterators
    pub fn hit_iterator_size(&self, width: usize) -> usize {
        std::mem::size_of::<HitIterator<'static>>() * width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UVec3;

    fn ramp_grid(n: u32) -> VolumeData {
        let values = (0..n * n * n).map(|i| (i % n) as f32).collect();
        VolumeData::StructuredGrid(StructuredGrid::regular(UVec3::splat(n), vec![values]))
    }

    #[test]
    fn test_queries_require_commit() {
        let volume = Volume::new(ramp_grid(4), VolumeConfig::default());
        assert!(!volume.is_committed());
        assert!(matches!(volume.bounds(), Err(Error::NotCommitted)));
        assert!(matches!(volume.new_sampler(Filter::Trilinear), Err(Error::NotCommitted)));
    }

    #[test]
    fn test_failed_recommit_keeps_previous_structure() {
        let mut volume = Volume::new(ramp_grid(4), VolumeConfig::default());
        volume.commit().unwrap();
        let sampler = volume.new_sampler(Filter::Trilinear).unwrap();

        volume.set_data(VolumeData::StructuredGrid(StructuredGrid::regular(UVec3::splat(4), vec![vec![1.0; 3]])));
        assert!(matches!(volume.commit(), Err(Error::Validation(_))));
        assert!(volume.is_committed());
        assert_eq!(volume.value_range(0).unwrap(), ValueRange::new(0.0, 3.0));
        assert_eq!(sampler.evaluate(Vec3::new(2.0, 1.0, 1.0), 0, 0.0), 2.0);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_building() {
        let mut volume = Volume::new(ramp_grid(4), VolumeConfig::default());
        volume.commit().unwrap();
        let mut config = VolumeConfig::default();
        config.bvh.max_leaf_size = 0;
        volume.set_config(config);
        assert!(matches!(volume.commit(), Err(Error::Validation(_))));
        assert_eq!(volume.value_range(0).unwrap(), ValueRange::new(0.0, 3.0));
    }

    #[test]
    fn test_recommit_does_not_disturb_samplers() {
        let mut volume = Volume::new(ramp_grid(4), VolumeConfig::default());
        volume.commit().unwrap();
        let old = volume.new_sampler(Filter::Nearest).unwrap();

        volume.set_data(ramp_grid(8));
        volume.commit().unwrap();
        assert_eq!(volume.value_range(0).unwrap(), ValueRange::new(0.0, 7.0));
        assert_eq!(old.volume().value_range(0), ValueRange::new(0.0, 3.0));
    }

    #[test]
    fn test_iterator_sizes_scale_with_width() {
        let volume = Volume::new(ramp_grid(4), VolumeConfig::default());
        let one = volume.interval_iterator_size(1);
        assert!(one > 0);
        assert_eq!(volume.interval_iterator_size(8), 8 * one);
        assert_eq!(volume.hit_iterator_size(4), 4 * volume.hit_iterator_size(1));
    }
}
