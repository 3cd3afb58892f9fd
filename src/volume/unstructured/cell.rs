//! Cell shapes and their tetrahedral decompositions

use glam::Mat3;
use serde::{Deserialize, Serialize};

use crate::core::types::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    Tetrahedron,
    Hexahedron,
    Wedge,
    Pyramid,
}

const TET_SPLIT: &[[usize; 4]] = &[[0, 1, 2, 3]];
const PYRAMID_SPLIT: &[[usize; 4]] = &[[0, 1, 2, 4], [0, 2, 3, 4]];
const WEDGE_SPLIT: &[[usize; 4]] = &[[0, 1, 2, 5], [0, 1, 5, 4], [0, 4, 5, 3]];
// Six tetrahedra around the 0-6 diagonal
const HEX_SPLIT: &[[usize; 4]] = &[
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
    [0, 5, 1, 6],
];

const INSIDE_EPSILON: f32 = 1e-5;

impl CellType {
    pub fn vertex_count(self) -> usize {
        match self {
            CellType::Tetrahedron => 4,
            CellType::Pyramid => 5,
            CellType::Wedge => 6,
            CellType::Hexahedron => 8,
        }
    }

    /// Tetrahedra as local vertex indices
    pub fn tetrahedra(self) -> &'static [[usize; 4]] {
        match self {
            CellType::Tetrahedron => TET_SPLIT,
            CellType::Pyramid => PYRAMID_SPLIT,
            CellType::Wedge => WEDGE_SPLIT,
            CellType::Hexahedron => HEX_SPLIT,
        }
    }
}

/// Barycentric weights of `p` in tetrahedron `t`, or `None` when outside
/// or degenerate
pub fn barycentric(t: [Vec3; 4], p: Vec3) -> Option<[f32; 4]> {
    let m = Mat3::from_cols(t[1] - t[0], t[2] - t[0], t[3] - t[0]);
    if m.determinant().abs() < f32::EPSILON * m.col(0).length_squared().max(1e-12) {
        return None;
    }
    let l = m.inverse() * (p - t[0]);
    let l0 = 1.0 - l.x - l.y - l.z;
    let weights = [l0, l.x, l.y, l.z];
    if weights.iter().all(|&w| w >= -INSIDE_EPSILON) {
        Some(weights)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_hex() -> [Vec3; 8] {
        [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn test_barycentric_inside_and_outside() {
        let tet = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let w = barycentric(tet, Vec3::splat(0.25)).unwrap();
        for weight in w {
            assert!((weight - 0.25).abs() < 1e-6);
        }
        assert!(barycentric(tet, Vec3::splat(0.5)).is_none());
        assert!(barycentric([Vec3::ZERO, Vec3::X, Vec3::X * 2.0, Vec3::Y], Vec3::ZERO).is_none());
    }

    #[test]
    fn test_hex_split_covers_cube() {
        let hex = unit_hex();
        let volume: f32 = HEX_SPLIT
            .iter()
            .map(|t| {
                let m = Mat3::from_cols(hex[t[1]] - hex[t[0]], hex[t[2]] - hex[t[0]], hex[t[3]] - hex[t[0]]);
                m.determinant().abs() / 6.0
            })
            .sum();
        assert!((volume - 1.0).abs() < 1e-5);

        for p in [Vec3::new(0.1, 0.9, 0.3), Vec3::new(0.8, 0.2, 0.7), Vec3::splat(0.5)] {
            let inside = HEX_SPLIT.iter().any(|t| barycentric([hex[t[0]], hex[t[1]], hex[t[2]], hex[t[3]]], p).is_some());
            assert!(inside, "{p:?} not covered");
        }
    }

    #[test]
    fn test_wedge_and_pyramid_volumes() {
        let wedge = [
            Vec3::ZERO, Vec3::X, Vec3::Y,
            Vec3::Z, Vec3::X + Vec3::Z, Vec3::Y + Vec3::Z,
        ];
        let volume: f32 = WEDGE_SPLIT
            .iter()
            .map(|t| Mat3::from_cols(wedge[t[1]] - wedge[t[0]], wedge[t[2]] - wedge[t[0]], wedge[t[3]] - wedge[t[0]]).determinant().abs() / 6.0)
            .sum();
        assert!((volume - 0.5).abs() < 1e-5);

        let pyramid = [Vec3::ZERO, Vec3::X, Vec3::X + Vec3::Y, Vec3::Y, Vec3::new(0.5, 0.5, 1.0)];
        let volume: f32 = PYRAMID_SPLIT
            .iter()
            .map(|t| Mat3::from_cols(pyramid[t[1]] - pyramid[t[0]], pyramid[t[2]] - pyramid[t[0]], pyramid[t[3]] - pyramid[t[0]]).determinant().abs() / 6.0)
            .sum();
        assert!((volume - 1.0 / 3.0).abs() < 1e-5);
    }
}
