use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec2;
use probedeform_dcn::DualComplex;
use std::hint::black_box;

fn bench_blend(c: &mut Criterion) {
    let mut group = c.benchmark_group("dcn_blend");

    for num_dcns in [2, 8, 32, 128].iter() {
        let dcns = (0..*num_dcns)
            .map(|i| {
                let theta = i as f64 * 0.1;
                DualComplex::from_rotation_translation(theta, DVec2::new(theta.cos(), theta.sin()))
            })
            .collect::<Vec<_>>();
        let weights = (0..*num_dcns)
            .map(|i| 1.0 / (1.0 + i as f64))
            .collect::<Vec<_>>();

        group.bench_with_input(
            BenchmarkId::new("blend", num_dcns),
            &(dcns, weights),
            |b, (dcns, weights)| {
                b.iter(|| black_box(DualComplex::blend(dcns, weights)));
            },
        );
    }

    group.finish();
}

fn bench_transform_point(c: &mut Criterion) {
    let dcn = DualComplex::from_rotation(DVec2::new(0.2, 0.1), 0.7);
    let points = (0..10_000)
        .map(|i| DVec2::new((i % 100) as f64 * 0.01, (i / 100) as f64 * 0.01))
        .collect::<Vec<_>>();

    c.bench_function("dcn_transform_point", |b| {
        b.iter(|| {
            points
                .iter()
                .map(|p| dcn.transform_point(*p))
                .fold(DVec2::ZERO, |acc, p| acc + p)
        })
    });
}

criterion_group!(benches, bench_blend, bench_transform_point);
criterion_main!(benches);
