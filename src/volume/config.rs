//! Build configuration for every volume family

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Dense grid accelerator settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cells per macrocell along each axis (power of two)
    pub macrocell_width: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { macrocell_width: 16 }
    }
}

/// Sparse tree settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VdbConfig {
    /// Value returned for points in unoccupied space; `None` reads as NaN
    pub background: Option<f32>,
}

impl Default for VdbConfig {
    fn default() -> Self {
        Self { background: None }
    }
}

impl VdbConfig {
    pub fn background_value(&self) -> f32 {
        self.background.unwrap_or(f32::NAN)
    }
}

/// BVH builder settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BvhConfig {
    /// Largest primitive count the builder may put in one leaf
    pub max_leaf_size: usize,
    /// SAH bins per split axis
    pub bin_count: usize,
    /// Below this primitive count subtrees are built on the current thread
    pub parallel_threshold: usize,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_leaf_size: 1,
            bin_count: 16,
            parallel_threshold: 1024,
        }
    }
}

/// Particle field settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Support radius in multiples of each particle's radius
    pub radius_support_factor: f32,
    /// Hard clamp on the summed field; 0 disables clamping
    pub clamp_max_cumulative_value: f32,
    /// Estimate ranges by resampling; otherwise ranges are `[0, clamp]`
    pub estimate_value_ranges: bool,
    /// Particles per BVH leaf
    pub max_leaf_size: usize,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            radius_support_factor: 3.0,
            clamp_max_cumulative_value: 0.0,
            estimate_value_ranges: true,
            max_leaf_size: 4,
        }
    }
}

/// Configuration for all volume families
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub grid: GridConfig,
    pub vdb: VdbConfig,
    pub bvh: BvhConfig,
    pub particle: ParticleConfig,
}

impl VolumeConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject knob values no build can honor
    pub fn validate(&self) -> Result<()> {
        let width = self.grid.macrocell_width;
        if !width.is_power_of_two() {
            return Err(Error::validation(format!("macrocell width must be a power of two, got {}", width)));
        }
        if self.bvh.max_leaf_size == 0 || self.particle.max_leaf_size == 0 {
            return Err(Error::validation("BVH leaves must hold at least one primitive"));
        }
        if self.bvh.bin_count < 2 {
            return Err(Error::validation(format!("SAH needs at least 2 bins, got {}", self.bvh.bin_count)));
        }
        if !(self.particle.radius_support_factor > 0.0) {
            return Err(Error::validation(format!(
                "radius support factor must be positive, got {}",
                self.particle.radius_support_factor
            )));
        }
        if !(self.particle.clamp_max_cumulative_value >= 0.0) {
            return Err(Error::validation("clamp value must be non-negative; 0 disables clamping"));
        }
        Ok(())
    }
}
