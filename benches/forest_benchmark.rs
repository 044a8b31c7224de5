// Random forest fit and predict throughput on synthetic cohorts of growing size.
// Grid search cost is roughly (candidates x folds) forest fits, so the fit
// numbers here bound how large a grid is practical.

use brisk::learn::forest::{ForestParams, RandomForest};
use brisk::learn::synthetic::{RiskGroup, generate_patients};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};

const COHORT_SIZES: [usize; 3] = [250, 1_000, 4_000];

fn cohort(n_per_group: usize) -> (Array2<f64>, Array1<u8>) {
    let patients = generate_patients(n_per_group, 42);
    let values: Vec<f64> = patients.iter().flat_map(|(_, p)| p.to_array()).collect();
    let labels: Array1<u8> = patients
        .iter()
        .map(|(group, _)| u8::from(*group == RiskGroup::Low))
        .collect();
    let features = Array2::from_shape_vec((patients.len(), 9), values)
        .expect("synthetic cohort has nine features per patient");
    (features, labels)
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_fit");
    group.sample_size(10);
    let params = ForestParams::default();

    for n_per_group in COHORT_SIZES {
        let (x, y) = cohort(n_per_group);
        group.throughput(Throughput::Elements(x.nrows() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(x.nrows()), &(x, y), |b, (x, y)| {
            b.iter(|| RandomForest::fit(black_box(x.view()), black_box(y.view()), params, 42))
        });
    }
    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_predict");
    let (x, y) = cohort(1_000);
    let forest = RandomForest::fit(x.view(), y.view(), ForestParams::default(), 42)
        .expect("synthetic cohort is a valid training set");

    for n_per_group in COHORT_SIZES {
        let (batch, _) = cohort(n_per_group);
        group.throughput(Throughput::Elements(batch.nrows() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch.nrows()), &batch, |b, batch| {
            b.iter(|| forest.predict_proba(black_box(batch.view())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_predict);
criterion_main!(benches);
