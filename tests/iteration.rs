use glam::{IVec3, UVec3, Vec3};

use volidx::iterator::depth::{bvh_depth, vdb_depth};
use volidx::volume::grid::StructuredGrid;
use volidx::volume::particle::ParticleCloud;
use volidx::volume::unstructured::{CellType, IndexBuffer, UnstructuredMesh, ValueLocation};
use volidx::volume::vdb::{VdbData, VdbLeaf};
use volidx::{CommittedVolume, ContextParams, Filter, Interval, IteratorState, ValueRange, Volume, VolumeConfig, VolumeData};

fn committed(data: VolumeData) -> Volume {
    let mut volume = Volume::new(data, VolumeConfig::default());
    volume.commit().unwrap();
    volume
}

fn ramp_grid(n: u32) -> VolumeData {
    let values = (0..n * n * n).map(|i| (i % n) as f32).collect();
    VolumeData::StructuredGrid(StructuredGrid::regular(UVec3::splat(n), vec![values]))
}

fn checkerboard_vdb() -> VolumeData {
    let mut leaves = Vec::new();
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..4 {
                if (x + y + z) % 2 == 0 {
                    let value = (x * 16 + y * 4 + z) as f32;
                    leaves.push(VdbLeaf::dense(IVec3::new(x, y, z) * 8, vec![value; 512]));
                }
            }
        }
    }
    leaves.push(VdbLeaf::tile(2, IVec3::new(128, 0, 0), vec![-1.0]));
    VolumeData::Vdb(VdbData::new(1, leaves))
}

fn particle_cloud() -> VolumeData {
    let positions = (0..64)
        .map(|i| Vec3::new((i % 4) as f32 * 1.5, ((i / 4) % 4) as f32 * 1.5, (i / 16) as f32 * 1.5))
        .collect();
    VolumeData::Particles(ParticleCloud { positions, radii: vec![0.6; 64], weights: None })
}

/// `nx × ny × nz` unit hexahedra; the attribute is the vertex x coordinate
fn hex_block(nx: u32, ny: u32, nz: u32) -> VolumeData {
    let vertex = |i: u32, j: u32, k: u32| i + (nx + 1) * (j + (ny + 1) * k);
    let mut vertices = Vec::new();
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push(Vec3::new(i as f32, j as f32, k as f32));
            }
        }
    }
    let mut indices = Vec::new();
    let mut cell_offsets = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                cell_offsets.push(indices.len() as u64);
                indices.extend([
                    vertex(i, j, k),
                    vertex(i + 1, j, k),
                    vertex(i + 1, j + 1, k),
                    vertex(i, j + 1, k),
                    vertex(i, j, k + 1),
                    vertex(i + 1, j, k + 1),
                    vertex(i + 1, j + 1, k + 1),
                    vertex(i, j + 1, k + 1),
                ]);
            }
        }
    }
    let xs = vertices.iter().map(|v| v.x).collect();
    let cell_count = cell_offsets.len();
    VolumeData::Unstructured(UnstructuredMesh {
        vertices,
        indices: IndexBuffer::U32(indices),
        cell_offsets,
        cell_types: vec![CellType::Hexahedron; cell_count],
        value_location: ValueLocation::Vertex,
        attributes: vec![xs],
    })
}

fn assert_ordered(intervals: &[Interval]) {
    for interval in intervals {
        assert!(interval.t_range.lower < interval.t_range.upper, "{interval:?}");
        assert!(interval.nominal_delta_t > 0.0);
    }
    for pair in intervals.windows(2) {
        assert!(pair[0].t_range.upper <= pair[1].t_range.lower, "{:?} then {:?}", pair[0], pair[1]);
    }
}

fn run_rays(volume: &Volume, hint: f32) {
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let context = sampler
        .new_interval_context(ContextParams { resolution_hint: hint, ..ContextParams::default() })
        .unwrap();
    let bounds = volume.bounds().unwrap();
    let directions = [
        Vec3::new(1.0, 0.3, 0.2),
        Vec3::new(-0.4, 1.0, 0.7),
        Vec3::new(0.5, -0.5, -1.0),
        Vec3::X,
    ];

    let mut it = context.iter();
    for dir in directions {
        let origin = bounds.center() - dir * bounds.size().length() * 2.0;
        it.initialize(origin, dir, ValueRange::new(0.0, f32::INFINITY), 0.0);
        let mut intervals = Vec::new();
        // Bounded: no family emits more intervals than it has macrocells
        for _ in 0..100_000 {
            match it.next() {
                Some(interval) => intervals.push(interval),
                None => break,
            }
        }
        assert_eq!(it.state(), IteratorState::Done);
        assert!(!intervals.is_empty());
        assert_ordered(&intervals);
        for interval in &intervals {
            assert!(interval.t_range.lower >= 0.0);
        }
    }
}

#[test]
fn test_grid_intervals_ordered() {
    let volume = committed(ramp_grid(40));
    for hint in [0.0, 0.5, 1.0] {
        run_rays(&volume, hint);
    }
}

#[test]
fn test_vdb_intervals_ordered_at_every_depth() {
    let volume = committed(checkerboard_vdb());
    for hint in [0.0, 0.2, 0.4, 0.8, 1.0] {
        run_rays(&volume, hint);
    }
}

#[test]
fn test_particle_intervals_ordered_at_every_depth() {
    let volume = committed(particle_cloud());
    for hint in [0.0, 0.3, 0.5, 0.7, 1.0] {
        run_rays(&volume, hint);
    }
}

#[test]
fn test_mesh_intervals_ordered_at_every_depth() {
    let volume = committed(hex_block(8, 3, 3));
    let CommittedVolume::Unstructured(mesh) = volume.committed().unwrap().as_ref() else {
        panic!("expected an unstructured volume");
    };
    assert!(mesh.bvh().depth() >= 4);
    for hint in [0.0, 0.3, 0.5, 0.7, 1.0] {
        run_rays(&volume, hint);
    }
}

#[test]
fn test_reinitialize_restarts() {
    let volume = committed(ramp_grid(16));
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let context = sampler.new_interval_context(ContextParams::default()).unwrap();
    let mut it = context.iter();
    assert_eq!(it.state(), IteratorState::Uninitialized);
    assert!(it.next().is_none());

    it.initialize(Vec3::new(-1.0, 2.0, 2.0), Vec3::X, ValueRange::new(0.0, 100.0), 0.25);
    let first: Vec<_> = it.by_ref().collect();
    it.initialize(Vec3::new(-1.0, 2.0, 2.0), Vec3::X, ValueRange::new(0.0, 100.0), 0.25);
    let second: Vec<_> = it.by_ref().collect();
    assert_eq!(first, second);
    assert_eq!(it.time(), 0.25);
    assert_eq!(it.ray().origin, Vec3::new(-1.0, 2.0, 2.0));
}

#[test]
fn test_hint_mapping_is_monotonic() {
    let volume = committed(particle_cloud());
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let CommittedVolume::Particles(particles) = sampler.volume() else {
        panic!("expected a particle volume");
    };
    let depth = particles.bvh().depth();
    assert!(depth >= 2);

    let mut previous = 0;
    for i in 0..=100 {
        let hint = i as f32 / 100.0;
        let context = sampler
            .new_interval_context(ContextParams { resolution_hint: hint, ..ContextParams::default() })
            .unwrap();
        assert!(context.max_depth() >= previous);
        assert_eq!(context.max_depth(), bvh_depth(hint, depth));
        previous = context.max_depth();
    }
    assert_eq!(previous, depth);
    assert_eq!(vdb_depth(1.0), 3);
}

#[test]
fn test_hit_context_forces_full_depth_on_tiles() {
    let volume = committed(checkerboard_vdb());
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let params = ContextParams { resolution_hint: 0.0, iso_values: vec![5.0], ..ContextParams::default() };
    assert_eq!(sampler.new_interval_context(params.clone()).unwrap().max_depth(), 0);
    assert_eq!(sampler.new_hit_context(params).unwrap().max_depth(), 3);
}

#[test]
fn test_grid_hits_find_iso_crossing() {
    let volume = committed(ramp_grid(16));
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let context = sampler
        .new_hit_context(ContextParams { iso_values: vec![5.5, 9.25], ..ContextParams::default() })
        .unwrap();

    let mut it = context.iter();
    it.initialize(Vec3::new(-1.0, 3.3, 4.2), Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
    let hits: Vec<_> = it.by_ref().collect();
    assert_eq!(hits.len(), 2);
    assert!((hits[0].t - 6.5).abs() < 1e-3, "{:?}", hits[0]);
    assert_eq!(hits[0].sample, 5.5);
    assert!((hits[1].t - 10.25).abs() < 1e-3, "{:?}", hits[1]);
    assert!(hits[0].epsilon > 0.0);
    assert_eq!(it.state(), IteratorState::Done);

    // Back along the ray: same crossings in reverse order of position
    it.initialize(Vec3::new(20.0, 3.3, 4.2), -Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
    let hits: Vec<_> = it.collect();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].sample, 9.25);
    assert!((hits[0].t - 10.75).abs() < 1e-3);
}

#[test]
fn test_vdb_hits_inside_leaf() {
    let values: Vec<f32> = (0..512).map(|i| (i % 8) as f32).collect();
    let data = VolumeData::Vdb(VdbData::new(1, vec![VdbLeaf::dense(IVec3::ZERO, values)]));
    let volume = committed(data);
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let context = sampler
        .new_hit_context(ContextParams { iso_values: vec![3.0], ..ContextParams::default() })
        .unwrap();

    let mut it = context.iter();
    it.initialize(Vec3::new(-2.0, 3.5, 3.5), Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
    let hits: Vec<_> = it.collect();
    assert_eq!(hits.len(), 1);
    assert!((hits[0].t - 5.5).abs() < 1e-3, "{:?}", hits[0]);
}

#[test]
fn test_hits_without_iso_values_are_empty() {
    let volume = committed(ramp_grid(8));
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let context = sampler.new_hit_context(ContextParams::default()).unwrap();
    let mut it = context.iter();
    it.initialize(Vec3::new(-1.0, 1.0, 1.0), Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
    assert_eq!(it.state(), IteratorState::Done);
    assert!(it.next().is_none());
}

#[test]
fn test_mesh_hits_follow_linear_ramp() {
    let volume = committed(hex_block(8, 3, 3));
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    for hint in [0.0, 0.5, 1.0] {
        let context = sampler
            .new_hit_context(ContextParams {
                iso_values: vec![6.6, 3.3],
                resolution_hint: hint,
                ..ContextParams::default()
            })
            .unwrap();
        let mut it = context.iter();
        it.initialize(Vec3::new(-1.0, 0.7, 1.6), Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
        let hits: Vec<_> = it.collect();
        assert_eq!(hits.len(), 2, "hint {hint}: {hits:?}");
        assert!((hits[0].t - 4.3).abs() < 1e-3, "{:?}", hits[0]);
        assert_eq!(hits[0].sample, 3.3);
        assert!((hits[1].t - 7.6).abs() < 1e-3, "{:?}", hits[1]);
        assert_eq!(hits[1].sample, 6.6);
    }
}

#[test]
fn test_particle_hits_on_kernel_shells() {
    let data = VolumeData::Particles(ParticleCloud {
        positions: vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)],
        radii: vec![1.0, 1.0],
        weights: None,
    });
    let volume = committed(data);
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let context = sampler
        .new_hit_context(ContextParams { iso_values: vec![0.5], resolution_hint: 1.0, ..ContextParams::default() })
        .unwrap();

    // exp(-d^2 / 2) = 0.5 at d = sqrt(2 ln 2)
    let d = (2.0 * 2.0f32.ln()).sqrt();
    let mut it = context.iter();
    it.initialize(Vec3::new(-5.0, 0.0, 0.0), Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
    let hits: Vec<_> = it.collect();
    let expected = [5.0 - d, 5.0 + d, 15.0 - d, 15.0 + d];
    assert_eq!(hits.len(), expected.len(), "{hits:?}");
    for (hit, t) in hits.iter().zip(expected) {
        assert!((hit.t - t).abs() < 1e-3, "{hit:?} vs {t}");
    }
}

#[test]
fn test_vdb_blend_across_leaf_border_is_not_pruned() {
    let data = VolumeData::Vdb(VdbData::new(
        1,
        vec![
            VdbLeaf::dense(IVec3::ZERO, vec![0.0; 512]),
            VdbLeaf::dense(IVec3::new(8, 0, 0), vec![10.0; 512]),
        ],
    ));
    let volume = committed(data);
    let sampler = volume.new_sampler(Filter::Trilinear).unwrap();
    let origin = Vec3::new(-2.0, 4.0, 4.0);
    assert_eq!(sampler.volume().sample(Filter::Trilinear, Vec3::new(8.0, 4.0, 4.0), 0, 0.0), 5.0);

    let context = sampler
        .new_interval_context(ContextParams {
            value_ranges: vec![ValueRange::new(4.0, 6.0)],
            resolution_hint: 1.0,
            ..ContextParams::default()
        })
        .unwrap();
    let mut it = context.iter();
    it.initialize(origin, Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
    assert_eq!(it.by_ref().count(), 2);

    // The blend reaches 2.0 at x = 7.7, inside the all-zero leaf
    let context = sampler
        .new_hit_context(ContextParams { iso_values: vec![2.0], resolution_hint: 1.0, ..ContextParams::default() })
        .unwrap();
    let mut it = context.iter();
    it.initialize(origin, Vec3::X, ValueRange::new(0.0, 100.0), 0.0);
    let hits: Vec<_> = it.collect();
    assert_eq!(hits.len(), 1, "{hits:?}");
    assert!((hits[0].t - 9.7).abs() < 1e-3, "{:?}", hits[0]);
}
