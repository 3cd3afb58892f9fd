//! Unstructured polyhedral meshes indexed by a BVH over their cells

pub mod cell;
pub mod mesh;

pub use cell::CellType;
pub use mesh::{IndexBuffer, UnstructuredMesh, ValueLocation};

use rayon::prelude::*;

use crate::core::types::{Result, Vec3};
use crate::field::{FieldSampler, Filter};
use crate::math::{Aabb, ValueRange};
use super::bvh::{propagate_overlap, BinnedBuilder, Bvh, BuildCallbacks, NodeSummary};
use super::config::BvhConfig;
use cell::barycentric;

struct CellCallbacks<'m> {
    mesh: &'m UnstructuredMesh,
}

impl BuildCallbacks for CellCallbacks<'_> {
    fn attribute_count(&self) -> usize {
        self.mesh.attribute_count()
    }

    fn create_leaf(&self, primitives: &[u32], bounds: &Aabb) -> NodeSummary {
        let ranges = (0..self.mesh.attribute_count())
            .map(|a| {
                primitives
                    .iter()
                    .fold(ValueRange::EMPTY, |acc, &c| acc.union(&self.mesh.cell_range(c as usize, a)))
            })
            .collect();
        NodeSummary { ranges, nominal_length: bounds.size() }
    }
}

/// Committed mesh plus its cell hierarchy
#[derive(Debug)]
pub struct UnstructuredVolume {
    mesh: UnstructuredMesh,
    bvh: Bvh,
}

impl UnstructuredVolume {
    pub fn build(mesh: UnstructuredMesh, config: &BvhConfig) -> Result<Self> {
        mesh.validate()?;
        let cell_bounds: Vec<Aabb> = (0..mesh.cell_count()).into_par_iter().map(|c| mesh.cell_bounds(c)).collect();
        let mut bvh = BinnedBuilder::new(config.clone()).build(&cell_bounds, &CellCallbacks { mesh: &mesh })?;
        propagate_overlap(&mut bvh);
        log::debug!("Unstructured volume: {} cells, BVH depth {}", mesh.cell_count(), bvh.depth());
        Ok(Self { mesh, bvh })
    }

    pub fn mesh(&self) -> &UnstructuredMesh {
        &self.mesh
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub fn bounds(&self) -> Aabb {
        self.bvh.bounds()
    }

    pub fn attribute_count(&self) -> usize {
        self.mesh.attribute_count()
    }

    pub fn value_range(&self, attribute: usize) -> ValueRange {
        self.bvh.value_range(attribute)
    }

    /// Interpolate inside the containing cell; NaN outside the mesh
    pub fn sample(&self, filter: Filter, point: Vec3, attribute: usize) -> f32 {
        let mut result = f32::NAN;
        self.bvh.visit_leaves_containing(point, |cells| {
            for &cell in cells {
                if let Some(value) = self.sample_cell(filter, cell as usize, point, attribute) {
                    result = value;
                    return false;
                }
            }
            true
        });
        result
    }

    fn sample_cell(&self, filter: Filter, cell: usize, point: Vec3, attribute: usize) -> Option<f32> {
        let mesh = &self.mesh;
        let offset = mesh.cell_offsets[cell] as usize;
        let vertex = |k: usize| mesh.indices.get(offset + k) as usize;

        for tet in mesh.cell_types[cell].tetrahedra() {
            let corners = tet.map(|k| mesh.vertices[vertex(k)]);
            let Some(weights) = barycentric(corners, point) else {
                continue;
            };
            let values = &mesh.attributes[attribute];
            return Some(match (mesh.value_location, filter) {
                (ValueLocation::Cell, _) => values[cell],
                (ValueLocation::Vertex, Filter::Trilinear) => {
                    tet.iter().zip(weights).map(|(&k, w)| w * values[vertex(k)]).sum()
                }
                (ValueLocation::Vertex, Filter::Nearest) => {
                    let (nearest, _) = tet
                        .iter()
                        .zip(weights)
                        .fold((tet[0], f32::NEG_INFINITY), |best, (&k, w)| if w > best.1 { (k, w) } else { best });
                    values[vertex(nearest)]
                }
            });
        }
        None
    }

    pub fn gradient_step(&self) -> Vec3 {
        let length = self.bvh.root().nominal_length.abs();
        Vec3::splat((length.min_element() * 0.5).max(1e-4))
    }
}

impl FieldSampler for UnstructuredVolume {
    fn evaluate(&self, point: Vec3, attribute: usize, _time: f32) -> f32 {
        self.sample(Filter::Trilinear, point, attribute)
    }

    fn gradient_step(&self) -> Vec3 {
        UnstructuredVolume::gradient_step(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    /// Unit hex plus a tetrahedron and a pyramid stacked above it; the only
    /// attribute is the x coordinate of each vertex
    fn mixed_mesh() -> UnstructuredMesh {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(0.5, 0.5, 2.0),
            Vec3::new(3.0, 0.0, 0.0),
        ];
        let xs = vertices.iter().map(|v| v.x).collect();
        UnstructuredMesh {
            vertices,
            indices: IndexBuffer::U32(vec![0, 1, 2, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8, 1, 9, 2, 5]),
            cell_offsets: vec![0, 8, 13],
            cell_types: vec![CellType::Hexahedron, CellType::Pyramid, CellType::Tetrahedron],
            value_location: ValueLocation::Vertex,
            attributes: vec![xs],
        }
    }

    #[test]
    fn test_vertex_interpolation_is_linear() {
        let volume = UnstructuredVolume::build(mixed_mesh(), &BvhConfig::default()).unwrap();
        volume.bvh().assert_consistent();
        assert_eq!(volume.value_range(0), ValueRange::new(0.0, 3.0));

        for p in [Vec3::new(0.25, 0.5, 0.75), Vec3::new(0.5, 0.5, 1.5), Vec3::new(1.5, 0.2, 0.1)] {
            let value = volume.sample(Filter::Trilinear, p, 0);
            assert!((value - p.x).abs() < 1e-4, "{p:?} -> {value}");
        }
        assert!(volume.sample(Filter::Trilinear, Vec3::new(-1.0, 0.5, 0.5), 0).is_nan());
        assert!(volume.sample(Filter::Trilinear, Vec3::new(0.9, 0.9, 1.9), 0).is_nan());
    }

    #[test]
    fn test_cell_values_are_constant() {
        let mut mesh = mixed_mesh();
        mesh.value_location = ValueLocation::Cell;
        mesh.attributes = vec![vec![10.0, 20.0, 30.0]];
        mesh.indices = IndexBuffer::U64(vec![0, 1, 2, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8, 1, 9, 2, 5]);
        let volume = UnstructuredVolume::build(mesh, &BvhConfig::default()).unwrap();
        assert_eq!(volume.sample(Filter::Nearest, Vec3::splat(0.5), 0), 10.0);
        assert_eq!(volume.sample(Filter::Trilinear, Vec3::new(0.5, 0.5, 1.2), 0), 20.0);
        assert_eq!(volume.value_range(0), ValueRange::new(10.0, 30.0));
    }

    #[test]
    fn test_validation_errors() {
        let mut mesh = mixed_mesh();
        mesh.cell_offsets[2] = 15;
        assert!(matches!(UnstructuredVolume::build(mesh, &BvhConfig::default()), Err(Error::Validation(_))));

        let mut mesh = mixed_mesh();
        mesh.indices = IndexBuffer::U32(vec![0, 1, 2, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8, 1, 42, 2, 5]);
        assert!(matches!(UnstructuredVolume::build(mesh, &BvhConfig::default()), Err(Error::Validation(_))));

        let mut mesh = mixed_mesh();
        mesh.attributes[0].pop();
        assert!(matches!(UnstructuredVolume::build(mesh, &BvhConfig::default()), Err(Error::Validation(_))));
    }
}
