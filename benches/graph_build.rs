use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
};
use chunkgraph::array::{concatenate, zeros, Array, Index};
use chunkgraph::block::DataType;

fn graph_build(c: &mut Criterion) {
    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    let mut group = c.benchmark_group("graph_build");
    group.plot_config(plot_config);

    for blocks in [4usize, 16, 64] {
        let size = blocks * 8;
        let x = zeros(&[size, size], 8, DataType::Float64).unwrap();
        let num_blocks = blocks * blocks;
        group.bench_function(BenchmarkId::new("elemwise", num_blocks), |b| {
            b.iter(|| (&(&x + &x).unwrap() * 2.0f64).unwrap());
        });
        group.bench_function(BenchmarkId::new("sum_axis", num_blocks), |b| {
            b.iter(|| x.sum(Some(0)).unwrap());
        });
        group.bench_function(BenchmarkId::new("rechunk", num_blocks), |b| {
            b.iter(|| x.rechunk([5, 11]).unwrap());
        });
        group.bench_function(BenchmarkId::new("concatenate", num_blocks), |b| {
            b.iter(|| concatenate(&[&x, &x, &x], 0).unwrap());
        });
        let points: Vec<isize> = (0..isize::try_from(size).unwrap()).rev().collect();
        group.bench_function(BenchmarkId::new("vindex", num_blocks), |b| {
            b.iter(|| {
                x.vindex(&[Index::Array(points.clone()), Index::Array(points.clone())])
                    .unwrap()
            });
        });
        group.bench_function(BenchmarkId::new("reshape", num_blocks), |b| {
            b.iter(|| {
                let flat = isize::try_from(size * size).unwrap();
                Array::reshape(&x, &[flat]).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, graph_build);
criterion_main!(benches);
