use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tch::{Device, Kind, Tensor};
use trpo::optimizers::conjugate_gradient;

/// A random symmetric positive-definite matrix with dominant diagonal.
fn spd_matrix(n: i64) -> Tensor {
    let a = Tensor::rand(&[n, n], (Kind::Float, Device::Cpu));
    a.matmul(&a.transpose(0, 1)) + Tensor::eye(n, (Kind::Float, Device::Cpu)) * n
}

fn conjugate_gradient_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("conjugate_gradient");
    for n in [16, 64, 256] {
        let matrix = spd_matrix(n);
        let b = Tensor::rand(&[n], (Kind::Float, Device::Cpu));

        group.bench_function(BenchmarkId::new("solve", n), |bench| {
            bench.iter(|| conjugate_gradient(|v| matrix.mv(v), &b, n as u64, 1e-10))
        });
    }
}

criterion_group!(benches, conjugate_gradient_solve);
criterion_main!(benches);
