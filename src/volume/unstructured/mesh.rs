//! Unstructured mesh input

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::math::{Aabb, ValueRange};
use super::cell::CellType;

/// Flat vertex index buffer in either width
#[derive(Clone, Debug)]
pub enum IndexBuffer {
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl IndexBuffer {
    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U32(v) => v.len(),
            IndexBuffer::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> u64 {
        match self {
            IndexBuffer::U32(v) => v[i] as u64,
            IndexBuffer::U64(v) => v[i],
        }
    }
}

/// Where attribute values live
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueLocation {
    #[default]
    Vertex,
    Cell,
}

/// Polyhedral cells sharing a vertex pool
#[derive(Clone, Debug)]
pub struct UnstructuredMesh {
    pub vertices: Vec<Vec3>,
    pub indices: IndexBuffer,
    /// First index of each cell in `indices`
    pub cell_offsets: Vec<u64>,
    pub cell_types: Vec<CellType>,
    pub value_location: ValueLocation,
    /// One array per attribute, per vertex or per cell
    pub attributes: Vec<Vec<f32>>,
}

impl UnstructuredMesh {
    pub fn cell_count(&self) -> usize {
        self.cell_types.len()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Global vertex ids of a cell
    pub fn cell_vertices(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        let offset = self.cell_offsets[cell] as usize;
        (0..self.cell_types[cell].vertex_count()).map(move |k| self.indices.get(offset + k) as usize)
    }

    pub fn cell_bounds(&self, cell: usize) -> Aabb {
        Aabb::from_points(self.cell_vertices(cell).map(|v| self.vertices[v]))
    }

    /// Exact range of the values a cell can interpolate to
    pub fn cell_range(&self, cell: usize, attribute: usize) -> ValueRange {
        let values = &self.attributes[attribute];
        match self.value_location {
            ValueLocation::Cell => ValueRange::point(values[cell]),
            ValueLocation::Vertex => {
                let mut range = ValueRange::EMPTY;
                for v in self.cell_vertices(cell) {
                    range.extend(values[v]);
                }
                range
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell_types.is_empty() {
            return Err(Error::validation("mesh has no cells"));
        }
        if self.cell_offsets.len() != self.cell_types.len() {
            return Err(Error::validation(format!(
                "{} cell offsets for {} cell types",
                self.cell_offsets.len(),
                self.cell_types.len()
            )));
        }
        if self.attributes.is_empty() {
            return Err(Error::validation("mesh has no attribute data"));
        }
        if let Some(bad) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(Error::validation(format!("vertex {} is not finite", bad)));
        }

        for (cell, (&offset, cell_type)) in self.cell_offsets.iter().zip(&self.cell_types).enumerate() {
            let end = offset as usize + cell_type.vertex_count();
            if end > self.indices.len() {
                return Err(Error::validation(format!(
                    "cell {} reads indices {}..{} past the index buffer of length {}",
                    cell,
                    offset,
                    end,
                    self.indices.len()
                )));
            }
            for k in offset as usize..end {
                let vertex = self.indices.get(k);
                if vertex >= self.vertices.len() as u64 {
                    return Err(Error::validation(format!(
                        "cell {} references vertex {} of {}",
                        cell,
                        vertex,
                        self.vertices.len()
                    )));
                }
            }
        }

        let expected = match self.value_location {
            ValueLocation::Vertex => self.vertices.len(),
            ValueLocation::Cell => self.cell_types.len(),
        };
        for (i, values) in self.attributes.iter().enumerate() {
            if values.len() != expected {
                return Err(Error::validation(format!(
                    "attribute {} has {} values, expected {} ({:?} data)",
                    i,
                    values.len(),
                    expected,
                    self.value_location
                )));
            }
        }

        if let IndexBuffer::U64(indices) = &self.indices {
            if indices.iter().all(|&i| i <= u32::MAX as u64) && self.cell_offsets.iter().all(|&o| o <= u32::MAX as u64) {
                log::warn!("mesh uses 64-bit indices but every index fits in 32 bits");
            }
        }
        Ok(())
    }
}
