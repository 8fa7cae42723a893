//! Criterion benchmarks for index construction and sample extraction.
//!
//! Run with: cargo bench --bench dataset

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use medset::dataset::{Dataset, SliceDataset, SliceGroup, SubvolumeConfig, SubvolumeDataset, VolumeGroup};
use medset::volume::{ArrayVolume, VolumeSource};
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;

fn source(id: &str, shape: &[usize]) -> Arc<dyn VolumeSource> {
    let numel: usize = shape.iter().product();
    let data = ArrayD::from_shape_vec(
        IxDyn(shape),
        (0..numel).map(|i| (i % 256) as f32).collect(),
    )
    .unwrap();
    Arc::new(ArrayVolume::new(id, data, vec![1.0; shape.len()]).unwrap())
}

fn slice_dataset(shape: &[usize]) -> SliceDataset {
    let group = SliceGroup::new(vec![source("img", shape)])
        .ground_truths(vec![Some(source("gt", shape))]);
    SliceDataset::builder(vec![group]).build().unwrap()
}

fn bench_slice_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_index_build");
    for &shape in &[[64usize, 64, 32], [128, 128, 64]] {
        let label = format!("{}x{}x{}", shape[0], shape[1], shape[2]);
        group.bench_with_input(BenchmarkId::from_parameter(&label), &shape, |b, shape| {
            b.iter(|| black_box(slice_dataset(shape)).len())
        });
    }
    group.finish();
}

fn bench_slice_get(c: &mut Criterion) {
    let dataset = slice_dataset(&[128, 128, 64]);
    c.bench_function("slice_get", |b| {
        b.iter(|| dataset.get(black_box(32)).unwrap())
    });
}

fn bench_subvolume_get(c: &mut Criterion) {
    let group = VolumeGroup::new(vec![source("img", &[96, 96, 96])])
        .ground_truths(vec![Some(source("gt", &[96, 96, 96]))]);
    let config = SubvolumeConfig {
        length: [32, 32, 32],
        padding: 16,
    };
    let dataset = SubvolumeDataset::new(vec![group], config, true, false, None).unwrap();
    c.bench_function("subvolume_get", |b| {
        b.iter(|| dataset.get(black_box(3)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_slice_index_build,
    bench_slice_get,
    bench_subvolume_get
);
criterion_main!(benches);
