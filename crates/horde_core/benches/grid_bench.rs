//! Benchmarks for grid registration, queries and avoidance.
//!
//! Run with: cargo bench -p horde_core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::{UVec3, Vec3};
use horde_core::grid::GridConfig;
use horde_core::query::{QueryOptions, Sector, SortMode, Sphere, Sweep};
use horde_core::store::{AgentRecord, Population};
use horde_core::NeighborGrid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORLD: f32 = 400.0;

fn config() -> GridConfig {
    GridConfig {
        cell_size: Vec3::new(4.0, 4.0, 8.0),
        grid_size: UVec3::new(100, 100, 1),
        origin: Vec3::new(-WORLD * 0.5, -WORLD * 0.5, -4.0),
        ..GridConfig::default()
    }
}

fn crowd(count: usize) -> Population {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut population = Population::new();
    for _ in 0..count {
        let position = Vec3::new(
            rng.gen_range(-WORLD * 0.45..WORLD * 0.45),
            rng.gen_range(-WORLD * 0.45..WORLD * 0.45),
            0.0,
        );
        let mut record = AgentRecord::new(position, rng.gen_range(0.3..0.6));
        record.motion.desired_velocity = Vec3::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0), 0.0);
        record.motion.current_velocity = record.motion.desired_velocity;
        population.spawn_agent(record);
    }
    population
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");
    for count in [1_000, 10_000, 50_000] {
        let mut population = crowd(count);
        let mut driver = NeighborGrid::without_debug(config()).expect("valid config");
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(driver.update(&mut population).expect("grid not shared")));
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut population = crowd(20_000);
    let mut driver = NeighborGrid::without_debug(config()).expect("valid config");
    driver.update(&mut population).expect("grid not shared");

    let origin = Vec3::new(10.0, -5.0, 0.0);
    let all = QueryOptions::sorted(SortMode::NearToFar, origin);
    let best = QueryOptions::sorted(SortMode::NearToFar, origin).keep(1);
    let sphere = Sphere::new(origin, 20.0);
    let sweep = Sweep::new(origin, origin + Vec3::new(60.0, 30.0, 0.0), 2.0);
    let sector = Sector::new(origin, 30.0, 4.0, Vec3::X, 60.0);

    let mut group = c.benchmark_group("queries");
    group.bench_function("sphere_all", |b| {
        b.iter(|| black_box(driver.sphere_query(&population, &sphere, &all)))
    });
    group.bench_function("sphere_best", |b| {
        b.iter(|| black_box(driver.sphere_query(&population, &sphere, &best)))
    });
    group.bench_function("sweep_all", |b| {
        b.iter(|| black_box(driver.sweep_query(&population, &sweep, &all)))
    });
    group.bench_function("sector_all", |b| {
        b.iter(|| black_box(driver.sector_query(&population, &sector, &all)))
    });
    group.finish();
}

fn bench_avoidance(c: &mut Criterion) {
    let mut group = c.benchmark_group("avoidance");
    group.sample_size(20);
    for count in [1_000, 10_000] {
        let mut population = crowd(count);
        let mut driver = NeighborGrid::without_debug(config()).expect("valid config");
        driver.update(&mut population).expect("grid not shared");
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(driver.avoid(&mut population, 1.0 / 60.0)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_registration, bench_queries, bench_avoidance);
criterion_main!(benches);
