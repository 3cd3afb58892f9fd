//! Macrocell value-range grid over a dense volume
//!
//! The cell lattice of an `N` voxel axis has `N - 1` cells; macrocells group
//! `width` cells per axis. Each macrocell range covers the voxels on both
//! faces of its cells, which is what trilinear reconstruction inside the
//! macrocell can reach.

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3};
use crate::math::ValueRange;
use super::data::StructuredGrid;

/// Per-macrocell, per-attribute value ranges
#[derive(Clone, Debug)]
pub struct GridAccelerator {
    macrocell_width: u32,
    /// Macrocell count per axis
    cells: UVec3,
    /// Ranges stored `[cell][attribute]`
    ranges: Vec<ValueRange>,
    attribute_count: usize,
    volume_ranges: Vec<ValueRange>,
}

impl GridAccelerator {
    /// Scan every macrocell (one task per macrocell) and record its ranges
    pub fn build(grid: &StructuredGrid, macrocell_width: u32) -> Result<Self> {
        if macrocell_width == 0 || !macrocell_width.is_power_of_two() {
            return Err(Error::validation(format!(
                "macrocell width must be a power of two, got {}",
                macrocell_width
            )));
        }
        let cell_dims = grid.dimensions - UVec3::ONE;
        let cells = (cell_dims + UVec3::splat(macrocell_width - 1)) / macrocell_width;
        let count = cells.x as usize * cells.y as usize * cells.z as usize;
        let attribute_count = grid.attributes.len();

        let start = std::time::Instant::now();
        let per_cell: Vec<Vec<ValueRange>> = (0..count)
            .into_par_iter()
            .map(|index| {
                let mc = delinearize(index, cells);
                let lo = mc * macrocell_width;
                let hi = (lo + UVec3::splat(macrocell_width)).min(cell_dims);
                (0..attribute_count)
                    .map(|attribute| scan_voxels(grid, attribute, lo, hi))
                    .collect()
            })
            .collect();

        let mut ranges = Vec::with_capacity(count * attribute_count);
        let mut volume_ranges = vec![ValueRange::EMPTY; attribute_count];
        for cell in per_cell {
            for (attribute, r) in cell.into_iter().enumerate() {
                volume_ranges[attribute].extend_range(&r);
                ranges.push(r);
            }
        }

        log::debug!(
            "Grid accelerator: {} macrocells ({}x{}x{}, width {}) in {:.2}ms",
            count, cells.x, cells.y, cells.z, macrocell_width,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            macrocell_width,
            cells,
            ranges,
            attribute_count,
            volume_ranges,
        })
    }

    pub fn macrocell_width(&self) -> u32 {
        self.macrocell_width
    }

    /// Macrocell count per axis
    pub fn cell_counts(&self) -> UVec3 {
        self.cells
    }

    pub fn cell_count(&self) -> usize {
        self.cells.x as usize * self.cells.y as usize * self.cells.z as usize
    }

    #[inline]
    pub fn cell_index(&self, mc: UVec3) -> usize {
        mc.x as usize + self.cells.x as usize * (mc.y as usize + self.cells.y as usize * mc.z as usize)
    }

    /// Value range of macrocell `mc` for `attribute`
    #[inline]
    pub fn range(&self, mc: UVec3, attribute: usize) -> ValueRange {
        self.ranges[self.cell_index(mc) * self.attribute_count + attribute]
    }

    /// Union over all macrocells
    pub fn volume_range(&self, attribute: usize) -> ValueRange {
        self.volume_ranges.get(attribute).copied().unwrap_or(ValueRange::EMPTY)
    }
}

fn delinearize(index: usize, dims: UVec3) -> UVec3 {
    let x = index % dims.x as usize;
    let y = (index / dims.x as usize) % dims.y as usize;
    let z = index / (dims.x as usize * dims.y as usize);
    UVec3::new(x as u32, y as u32, z as u32)
}

/// Range over voxels `lo..=hi`
fn scan_voxels(grid: &StructuredGrid, attribute: usize, lo: UVec3, hi: UVec3) -> ValueRange {
    let mut r = ValueRange::EMPTY;
    for z in lo.z..=hi.z {
        for y in lo.y..=hi.y {
            let row = grid.linear_index(lo.x, y, z);
            let len = (hi.x - lo.x) as usize + 1;
            for &v in &grid.attributes[attribute][row..row + len] {
                r.extend(v);
            }
        }
    }
    r
}
