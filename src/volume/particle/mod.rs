//! Particle clouds: a sum of truncated Gaussian kernels indexed by a BVH
//!
//! Kernel contributions add up where supports overlap, so a leaf's range
//! cannot be computed from its own particles alone. Ranges are either
//! estimated by resampling the summed field or fixed to `[0, clamp]`.

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::field::FieldSampler;
use crate::math::{Aabb, ValueRange};
use super::bvh::{propagate_overlap, BinnedBuilder, Bvh, BuildCallbacks, NodeKind, NodeSummary};
use super::config::{BvhConfig, ParticleConfig};

/// Lattice points per axis over a whole leaf box during estimation
const COARSE_LATTICE: usize = 4;
/// Dense lattice spacing in fractions of the smallest contained radius
const SAMPLES_PER_RADIUS: f32 = 4.0;
/// Upper bound on dense lattice points per axis
const MAX_DENSE_LATTICE: usize = 24;
/// Relative widening applied to estimated ranges
const ESTIMATE_MARGIN: f32 = 0.1;

/// Particle input; `weights` defaults to 1 for every particle
#[derive(Clone, Debug, Default)]
pub struct ParticleCloud {
    pub positions: Vec<Vec3>,
    pub radii: Vec<f32>,
    pub weights: Option<Vec<f32>>,
}

impl ParticleCloud {
    pub fn validate(&self) -> Result<()> {
        if self.positions.len() != self.radii.len() {
            return Err(Error::validation(format!(
                "{} particle positions but {} radii",
                self.positions.len(),
                self.radii.len()
            )));
        }
        if let Some(weights) = &self.weights {
            if weights.len() != self.positions.len() {
                return Err(Error::validation(format!(
                    "{} particle weights for {} particles",
                    weights.len(),
                    self.positions.len()
                )));
            }
        }
        if let Some(bad) = self.positions.iter().position(|p| !p.is_finite()) {
            return Err(Error::validation(format!("particle {} has a non-finite position", bad)));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct Particle {
    center: Vec3,
    radius: f32,
    weight: f32,
}

impl Particle {
    fn support(&self, factor: f32) -> Aabb {
        Aabb::from_center_half_extent(self.center, Vec3::splat(self.radius * factor))
    }
}

struct ParticleCallbacks<'p> {
    particles: &'p [Particle],
    /// Leaf range when estimation is disabled; empty otherwise
    leaf_range: ValueRange,
}

impl BuildCallbacks for ParticleCallbacks<'_> {
    fn attribute_count(&self) -> usize {
        1
    }

    fn create_leaf(&self, primitives: &[u32], _bounds: &Aabb) -> NodeSummary {
        let radius = primitives
            .iter()
            .map(|&p| self.particles[p as usize].radius)
            .fold(f32::INFINITY, f32::min);
        NodeSummary {
            ranges: vec![self.leaf_range],
            nominal_length: Vec3::splat(radius),
        }
    }
}

/// Committed particle field
#[derive(Debug)]
pub struct ParticleVolume {
    particles: Vec<Particle>,
    bvh: Bvh,
    support_factor: f32,
    clamp: f32,
}

impl ParticleVolume {
    pub fn build(cloud: ParticleCloud, config: &ParticleConfig, bvh_config: &BvhConfig) -> Result<Self> {
        cloud.validate()?;
        if !(config.radius_support_factor > 0.0) {
            return Err(Error::validation(format!(
                "radius support factor must be positive, got {}",
                config.radius_support_factor
            )));
        }
        if !config.estimate_value_ranges && !(config.clamp_max_cumulative_value > 0.0) {
            return Err(Error::validation(
                "value range estimation is disabled but no positive clamp value was given",
            ));
        }

        let particles: Vec<Particle> = cloud
            .positions
            .iter()
            .zip(&cloud.radii)
            .enumerate()
            .filter(|(_, (_, r))| **r > 0.0)
            .map(|(i, (&center, &radius))| Particle {
                center,
                radius,
                weight: cloud.weights.as_ref().map_or(1.0, |w| w[i]),
            })
            .collect();
        let skipped = cloud.positions.len() - particles.len();
        if skipped > 0 {
            log::warn!("Skipping {} particles with non-positive radius", skipped);
        }
        if particles.is_empty() {
            return Err(Error::structural("particle volume has no particles with a positive radius"));
        }

        let support_factor = config.radius_support_factor;
        let bounds: Vec<Aabb> = particles.par_iter().map(|p| p.support(support_factor)).collect();
        let leaf_range = if config.estimate_value_ranges {
            ValueRange::EMPTY
        } else {
            ValueRange::new(0.0, config.clamp_max_cumulative_value)
        };
        let builder = BinnedBuilder::new(BvhConfig {
            max_leaf_size: config.max_leaf_size,
            ..bvh_config.clone()
        });
        let bvh = builder.build(&bounds, &ParticleCallbacks { particles: &particles, leaf_range })?;

        let mut volume = Self {
            particles,
            bvh,
            support_factor,
            clamp: config.clamp_max_cumulative_value,
        };
        if config.estimate_value_ranges {
            volume.estimate_ranges();
        }
        propagate_overlap(&mut volume.bvh);
        log::debug!(
            "Particle volume: {} particles, BVH depth {}, range {:?}",
            volume.particles.len(),
            volume.bvh.depth(),
            volume.bvh.value_range(0)
        );
        Ok(volume)
    }

    /// Resample the field over each leaf and every particle center it holds
    fn estimate_ranges(&mut self) {
        let start = std::time::Instant::now();
        let leaves: Vec<u32> = (0..self.bvh.node_count() as u32)
            .filter(|&n| matches!(self.bvh.node(n).kind, NodeKind::Leaf { .. }))
            .collect();
        let estimates: Vec<(u32, ValueRange)> = leaves
            .par_iter()
            .map(|&leaf| (leaf, self.estimate_leaf(leaf)))
            .collect();

        let mut per_node = vec![ValueRange::EMPTY; self.bvh.node_count()];
        for (leaf, range) in estimates {
            per_node[leaf as usize] = range;
        }
        self.bvh.set_leaf_ranges(|leaf| vec![per_node[leaf as usize]]);
        log::debug!("Estimated {} particle leaf ranges in {:?}", leaves.len(), start.elapsed());
    }

    /// Extrema of a sum of radial kernels lie in the hull of the contributing
    /// centers, so the dense lattice covers the contained centers padded by
    /// one radius; the coarse lattice reaches the low values at the box
    /// corners. Overlapping leaves add their own extrema in the overlap pass.
    fn estimate_leaf(&self, leaf: u32) -> ValueRange {
        let bounds = self.bvh.node(leaf).bounds;
        let members: Vec<Particle> = self
            .bvh
            .leaf_primitives(leaf)
            .iter()
            .map(|&p| self.particles[p as usize])
            .collect();
        let mut range = ValueRange::EMPTY;
        self.sample_lattice(&bounds, COARSE_LATTICE, &mut range);

        let radius = members.iter().map(|p| p.radius).fold(f32::INFINITY, f32::min);
        let hull = Aabb::from_points(members.iter().map(|p| p.center));
        if !hull.is_empty() {
            let core = Aabb::new(hull.min - Vec3::splat(radius), hull.max + Vec3::splat(radius));
            let step = radius / SAMPLES_PER_RADIUS;
            let count = ((core.size().max_element() / step).ceil() as usize + 1).clamp(2, MAX_DENSE_LATTICE);
            self.sample_lattice(&core, count, &mut range);
        }

        let mut centroid = Vec3::ZERO;
        for (i, a) in members.iter().enumerate() {
            range.extend(self.field(a.center));
            centroid += a.center;
            for b in &members[i + 1..] {
                range.extend(self.field((a.center + b.center) * 0.5));
            }
        }
        if !members.is_empty() {
            range.extend(self.field(centroid / members.len() as f32));
        }
        range.expanded_relative(ESTIMATE_MARGIN)
    }

    /// Extend `range` by the field on a `count`³ lattice spanning `bounds`
    fn sample_lattice(&self, bounds: &Aabb, count: usize, range: &mut ValueRange) {
        let steps = (count - 1) as f32;
        for z in 0..count {
            for y in 0..count {
                for x in 0..count {
                    let f = Vec3::new(x as f32, y as f32, z as f32) / steps;
                    range.extend(self.field(bounds.min + bounds.size() * f));
                }
            }
        }
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.bvh.bounds()
    }

    pub fn value_range(&self, attribute: usize) -> ValueRange {
        self.bvh.value_range(attribute)
    }

    /// Summed kernel value at `point`, clamped when a clamp is configured
    pub fn field(&self, point: Vec3) -> f32 {
        let mut sum = 0.0f32;
        self.bvh.visit_leaves_containing(point, |members| {
            for &p in members {
                let particle = &self.particles[p as usize];
                let d2 = particle.center.distance_squared(point);
                let support = particle.radius * self.support_factor;
                if d2 <= support * support {
                    sum += particle.weight * (-d2 / (2.0 * particle.radius * particle.radius)).exp();
                }
            }
            true
        });
        if self.clamp > 0.0 { sum.min(self.clamp) } else { sum }
    }

    pub fn gradient_step(&self) -> Vec3 {
        let smallest = self.particles.iter().map(|p| p.radius).fold(f32::INFINITY, f32::min);
        Vec3::splat(smallest * 0.05)
    }
}

impl FieldSampler for ParticleVolume {
    fn evaluate(&self, point: Vec3, _attribute: usize, _time: f32) -> f32 {
        self.field(point)
    }

    fn gradient_step(&self) -> Vec3 {
        ParticleVolume::gradient_step(self)
    }
}
