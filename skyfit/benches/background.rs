//! Background model benchmarks.
//! Run with: cargo bench -p skyfit --bench background

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::DVec2;
use skyfit::{
    estimate_background, BackgroundMode, BackgroundSubtractor, Config, DataCube, Frame, Mask,
    PolynomialConfig, Resolution, SimpleCombine,
};

fn sky_frame(size: usize) -> Frame {
    Frame::from_fn(size, size, |x, y| {
        let (x, y) = (x as f32, y as f32);
        100.0 + 0.02 * x - 0.01 * y + 0.0001 * x * y + ((x * 12.9898 + y * 78.233).sin() * 0.5)
    })
}

fn benchmark_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate_background");

    for size in [128, 512] {
        let frame = sky_frame(size);
        let excluded = Mask::from_fn(size, size, |x, y| {
            let d = DVec2::new(x as f64, y as f64) - DVec2::splat(size as f64 / 2.0);
            d.length() < 12.0
        });
        group.throughput(Throughput::Elements((size * size) as u64));

        let modes = [
            (
                "simple",
                BackgroundMode::Simple {
                    combine: SimpleCombine::Additive,
                },
            ),
            (
                "poly_medium",
                BackgroundMode::Polynomial(PolynomialConfig {
                    degree: 2,
                    window_size: 32,
                    resolution: Resolution::Medium,
                }),
            ),
            (
                "poly_high",
                BackgroundMode::Polynomial(PolynomialConfig {
                    degree: 3,
                    window_size: 32,
                    resolution: Resolution::High,
                }),
            ),
        ];

        for (name, mode) in &modes {
            group.bench_function(BenchmarkId::new(*name, size), |b| {
                b.iter(|| {
                    let estimate = estimate_background(black_box(&frame), &excluded, mode);
                    black_box(estimate)
                })
            });
        }
    }

    group.finish();
}

fn benchmark_cube(c: &mut Criterion) {
    let mut group = c.benchmark_group("cube");
    group.sample_size(10);

    let frames = vec![sky_frame(128); 32];
    let cube = DataCube::new(frames).unwrap();
    let subtractor =
        BackgroundSubtractor::new(Config::new(DVec2::new(64.0, 64.0), 6.0, 4.0)).unwrap();

    group.bench_function("run_32x128x128", |b| {
        b.iter(|| black_box(subtractor.run(black_box(&cube)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, benchmark_estimate, benchmark_cube);
criterion_main!(benches);
