use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use egobox_covariances::{
    Convolutional, InducingPatches, InducingPoints, Matern52, Multiscale, SquaredExponential, kss,
    kuu,
};
use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use rand_xoshiro::Xoshiro256Plus;

const DIM: usize = 5;

fn bench_kuu_inducing_points(c: &mut Criterion) {
    let mut group = c.benchmark_group("kuu_inducing_points");
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let kernel = Matern52::new(1., Array1::from_elem(DIM, 0.5)).unwrap();
    for m in [50, 200] {
        let z = InducingPoints::new(Array2::random_using((m, DIM), Uniform::new(0., 1.), &mut rng));
        group.bench_function(BenchmarkId::from_parameter(m), |b| {
            b.iter(|| kuu(&z, &kernel, 1e-6).unwrap());
        });
    }
    group.finish();
}

fn bench_kuu_multiscale(c: &mut Criterion) {
    let mut group = c.benchmark_group("kuu_multiscale");
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let kernel = SquaredExponential::new(1., Array1::from_elem(DIM, 0.5)).unwrap();
    for m in [50, 200] {
        let z = Array2::random_using((m, DIM), Uniform::new(0., 1.), &mut rng);
        let scales = Array2::random_using((m, DIM), Uniform::new(0., 0.2), &mut rng);
        let ms = Multiscale::new(z, scales).unwrap();
        group.bench_function(BenchmarkId::from_parameter(m), |b| {
            b.iter(|| kuu(&ms, &kernel, 1e-6).unwrap());
        });
    }
    group.finish();
}

fn bench_kuu_patches(c: &mut Criterion) {
    let mut group = c.benchmark_group("kuu_patches");
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let images = Array2::random_using((20, 64), Uniform::new(0., 1.), &mut rng);
    let base = SquaredExponential::new(1., Array1::from_elem(9, 1.)).unwrap();
    let conv = Convolutional::new(base, (8, 8), (3, 3)).unwrap();
    let patches = InducingPatches::from_images(&images, (8, 8), (3, 3), 100, Some(42)).unwrap();
    group.bench_function(BenchmarkId::from_parameter(100), |b| {
        b.iter(|| kuu(&patches, &conv, 1e-6).unwrap());
    });
    group.finish();
}

fn bench_kss(c: &mut Criterion) {
    let mut group = c.benchmark_group("kss");
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let a = Array2::<f64>::random_using((300, 300), Uniform::new(-1., 1.), &mut rng);
    let cov = a.dot(&a.t());
    let indices = (0..100).step_by(2).collect::<Vec<_>>();
    group.bench_function(BenchmarkId::from_parameter(indices.len()), |b| {
        b.iter(|| kss(&indices, &cov, 3).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_kuu_inducing_points,
    bench_kuu_multiscale,
    bench_kuu_patches,
    bench_kss
);
criterion_main!(benches);
