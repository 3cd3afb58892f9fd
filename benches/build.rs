use criterion::{criterion_group, criterion_main, Criterion, black_box};

use glam::{IVec3, UVec3, Vec3};

use volidx::volume::config::VolumeConfig;
use volidx::volume::grid::StructuredGrid;
use volidx::volume::particle::ParticleCloud;
use volidx::volume::vdb::{VdbData, VdbLeaf};
use volidx::{ContextParams, Filter, ValueRange, Volume, VolumeData};

fn sphere_grid(size: u32) -> StructuredGrid {
    let c = size as f32 * 0.5;
    let mut values = Vec::with_capacity((size * size * size) as usize);
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                values.push(c - Vec3::new(x as f32, y as f32, z as f32).distance(Vec3::splat(c)));
            }
        }
    }
    StructuredGrid::regular(UVec3::splat(size), vec![values])
}

fn particle_cloud(count: usize) -> ParticleCloud {
    // Deterministic scatter on a skewed lattice
    let positions = (0..count)
        .map(|i| {
            let f = i as f32;
            Vec3::new((f * 0.618).fract() * 50.0, (f * 0.414).fract() * 50.0, (f * 0.732).fract() * 50.0)
        })
        .collect();
    ParticleCloud { positions, radii: vec![0.8; count], weights: None }
}

fn vdb_shell(leaves_per_axis: i32) -> VdbData {
    let mut leaves = Vec::new();
    for z in 0..leaves_per_axis {
        for y in 0..leaves_per_axis {
            for x in 0..leaves_per_axis {
                let origin = IVec3::new(x, y, z) * 8;
                let value = (x + y + z) as f32;
                leaves.push(VdbLeaf::dense(origin, vec![value; 512]));
            }
        }
    }
    VdbData::new(1, leaves)
}

fn bench_grid_commit_64(c: &mut Criterion) {
    let grid = sphere_grid(64);
    c.bench_function("grid_commit_64", |b| {
        b.iter(|| {
            let mut volume = Volume::new(VolumeData::StructuredGrid(black_box(grid.clone())), VolumeConfig::default());
            volume.commit()
        });
    });
}

fn bench_vdb_commit_16(c: &mut Criterion) {
    let data = vdb_shell(16);
    c.bench_function("vdb_commit_16", |b| {
        b.iter(|| {
            let mut volume = Volume::new(VolumeData::Vdb(black_box(data.clone())), VolumeConfig::default());
            volume.commit()
        });
    });
}

fn bench_particle_commit_2k(c: &mut Criterion) {
    let cloud = particle_cloud(2000);
    c.bench_function("particle_commit_2k", |b| {
        b.iter(|| {
            let mut volume = Volume::new(VolumeData::Particles(black_box(cloud.clone())), VolumeConfig::default());
            volume.commit()
        });
    });
}

fn bench_grid_intervals(c: &mut Criterion) {
    let mut volume = Volume::new(VolumeData::StructuredGrid(sphere_grid(64)), VolumeConfig::default());
    if volume.commit().is_err() {
        return;
    }
    let Ok(sampler) = volume.new_sampler(Filter::Trilinear) else {
        return;
    };
    let Ok(context) = sampler.new_interval_context(ContextParams::default()) else {
        return;
    };

    c.bench_function("grid_intervals_1k_rays", |b| {
        b.iter(|| {
            let mut count = 0usize;
            let mut it = context.iter();
            for i in 0..1000 {
                let y = (i % 32) as f32 * 2.0;
                let z = (i / 32) as f32 * 2.0;
                it.initialize(Vec3::new(-1.0, y, z), Vec3::new(1.0, 0.1, 0.05), ValueRange::new(0.0, 1000.0), 0.0);
                count += it.by_ref().count();
            }
            black_box(count)
        });
    });
}

criterion_group!(
    benches,
    bench_grid_commit_64,
    bench_vdb_commit_16,
    bench_particle_commit_2k,
    bench_grid_intervals,
);
criterion_main!(benches);
