//! Benchmarks for the hyperbolic curve-fit kernels.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use packwatch_numeric::{FitModel, fit_hyperbolic, fit_hyperbolic_optimal_t0};

const EPS: f64 = 1.0e-30;

fn relaxation_trace(n: usize) -> (Vec<f64>, Vec<f64>) {
    let t0 = 2.45;
    let times: Vec<f64> = (3..3 + n).map(|i| i as f64).collect();
    let values: Vec<f64> = times
        .iter()
        .map(|&t| 3000.0 / (t - t0) / (t - t0) + 70.0 / (t - t0) + 9.0)
        .collect();
    (times, values)
}

fn bench_fit_fixed_t0(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_hyperbolic");

    for n in [6, 12, 24] {
        let (times, values) = relaxation_trace(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| {
                fit_hyperbolic(
                    black_box(&times),
                    black_box(&values),
                    black_box(2.45),
                    FitModel::Three,
                    EPS,
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_fit_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_hyperbolic_optimal_t0");

    for n in [6, 12, 24] {
        let (times, values) = relaxation_trace(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| {
                fit_hyperbolic_optimal_t0(black_box(2.0), black_box(&times), black_box(&values), EPS)
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit_fixed_t0, bench_fit_grid_search);
criterion_main!(benches);
