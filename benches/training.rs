//! Performance benchmarks for evonet

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use evonet::{AlignedMatrix, Init, Network, Population, Randomizer};

fn benchmark_forward_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward");

    for &width in [16usize, 64, 256].iter() {
        let mut rand = Randomizer::seeded(1);
        let net = Network::<f64>::new(&[width, width, width / 2], Init::Evolution, &mut rand)
            .unwrap();
        let input: Vec<f64> = (0..width).map(|i| (i as f64 * 0.1).sin()).collect();
        let mut output = vec![0.0; width / 2];

        group.bench_with_input(BenchmarkId::new("scalar", width), &width, |b, _| {
            b.iter(|| net.forward_scalar_into(black_box(&input), &mut output));
        });
        group.bench_with_input(BenchmarkId::new("simd", width), &width, |b, _| {
            b.iter(|| net.forward_into(black_box(&input), &mut output));
        });
    }

    group.finish();
}

fn benchmark_batch_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_forward");

    let mut rand = Randomizer::seeded(2);
    let net = Network::<f64>::new(&[64, 64, 32], Init::Evolution, &mut rand).unwrap();

    for &rows in [64usize, 512].iter() {
        let data: Vec<f64> = (0..rows * 64).map(|i| (i as f64 * 0.01).cos()).collect();
        let inputs = AlignedMatrix::from_unaligned(&data, rows, 64).unwrap();
        let mut outputs = AlignedMatrix::zeroed(rows, 32);

        group.bench_with_input(BenchmarkId::new("serial", rows), &rows, |b, _| {
            b.iter(|| net.batch_forward(&inputs, &mut outputs).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("parallel", rows), &rows, |b, _| {
            b.iter(|| net.par_batch_forward(&inputs, &mut outputs).unwrap());
        });
    }

    group.finish();
}

fn benchmark_generation(c: &mut Criterion) {
    let inputs =
        AlignedMatrix::from_unaligned(&[-1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0], 4, 2).unwrap();
    let expected = AlignedMatrix::from_unaligned(&[-0.5, 0.5, 0.5, -0.5], 4, 1).unwrap();

    let mut population = Population::<f64>::with_seed(1_000, 0.05, &[2, 2, 1], 3).unwrap();
    // fill and rank the initial generation outside the timed loop
    population.train(&inputs, &expected, 0.25, true).unwrap();

    c.bench_function("population_generation", |b| {
        b.iter(|| {
            population
                .train(black_box(&inputs), black_box(&expected), 0.25, true)
                .unwrap()
        });
    });
}

fn benchmark_back_propagation(c: &mut Criterion) {
    let inputs =
        AlignedMatrix::from_unaligned(&[-1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0], 4, 2).unwrap();
    let expected = AlignedMatrix::from_unaligned(&[-0.5, 0.5, 0.5, -0.5], 4, 1).unwrap();

    let mut rand = Randomizer::seeded(4);
    let mut net = Network::<f64>::new(&[2, 16, 1], Init::Gradient, &mut rand).unwrap();

    c.bench_function("back_propagation_batch", |b| {
        b.iter(|| {
            net.back_propagation(black_box(&inputs), black_box(&expected), 0.1)
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    benchmark_forward_paths,
    benchmark_batch_forward,
    benchmark_generation,
    benchmark_back_propagation
);
criterion_main!(benches);
