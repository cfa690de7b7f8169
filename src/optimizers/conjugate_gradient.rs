//! Conjugate gradient solver
//!
//! Based on the [Python CGD implementation][garage_cgo] of the
//! [Garage Toolkit](https://github.com/rlworkgroup/garage).
//!
//! [garage_cgo]: https://github.com/rlworkgroup/garage/blob/90b60905b29cea8f8373c6732ced0cadf8489b0c/src/garage/torch/optimizers/conjugate_gradient_optimizer.py

// == MIT License For This File Only ==
//
// Copyright (c) 2019 Reinforcement Learning Working Group
// Copyright (c) 2021 Eric Langlois
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use tch::Tensor;

/// Use Conjugate Gradient iteration to solve `Ax = b` where `A` is symmetric positive definite.
///
/// The matrix is only accessed through products `Av`, so it may be defined
/// implicitly (by backpropagation, for example) and is never materialized.
///
/// # Args
/// * `mat_vec_fn` - Computes the matrix-vector product `Av` for a 1-D vector `v`.
/// * `b` - Right hand side of the equation to solve. A 1-D tensor.
/// * `max_iters` - Maximum number of conjugate gradient iterations.
/// * `residual_tol` - Convergence threshold on the squared norm of the residual.
///
/// # Returns
/// The best approximation of the solution `x*` to `Ax = b` found within
/// `max_iters` iterations. Zero if `b` is (nearly) zero.
///
/// # Reference
/// https://en.wikipedia.org/wiki/Conjugate_gradient_method
pub fn conjugate_gradient<F>(
    mut mat_vec_fn: F,
    b: &Tensor,
    max_iters: u64,
    residual_tol: f64,
) -> Tensor
where
    F: FnMut(&Tensor) -> Tensor,
{
    let mut x = b.zeros_like();
    let mut residual = b.copy(); // b - Ax where x = 0

    // step direction (p). residual projected to be orthogonal to previous steps
    let mut step = b.copy();
    let mut residual_norm_squared = residual.dot(&residual);

    // A vanishing right hand side would make the first alpha 0/0.
    if f64::from(&residual_norm_squared) < residual_tol {
        return x;
    }

    for _ in 0..max_iters {
        let z = mat_vec_fn(&step); // A * step
        let alpha = &residual_norm_squared / step.dot(&z); // ||r||^2 / (step' * A * step)
        let _ = x.addcmul_(&alpha, &step); // x += alpha * step
        let _ = residual.addcmul_(&(-alpha), &z); // r -= alpha * A*step

        let new_residual_norm_squared = residual.dot(&residual);
        if f64::from(&new_residual_norm_squared) < residual_tol {
            break;
        }

        let mu = &new_residual_norm_squared / &residual_norm_squared;
        let _ = step.g_mul_(&mu);
        let _ = step.g_add_(&residual);

        residual_norm_squared = new_residual_norm_squared;
    }
    x
}

#[cfg(test)]
mod solver {
    use super::*;
    use tch::{Device, Kind};

    /// A small symmetric positive definite system with solution `[1, 1, 1]`.
    fn tridiagonal_system() -> (Tensor, Tensor) {
        let a = Tensor::of_slice(&[
            2.0, -1.0, 0.0, //
            -1.0, 2.0, -1.0, //
            0.0, -1.0, 2.0, //
        ])
        .reshape(&[3, 3]);
        let b = Tensor::of_slice(&[1.0, 0.0, 1.0]);
        (a, b)
    }

    #[test]
    fn solves_spd_system_in_dim_iters() {
        let (a, b) = tridiagonal_system();
        let x = conjugate_gradient(|v| a.mv(v), &b, 3, 0.0);

        let expected = Tensor::of_slice(&[1.0, 1.0, 1.0]);
        assert!(
            f64::from((&x - &expected).norm()) < 1e-6,
            "expected: {:?}, actual: {:?}",
            expected,
            x
        );
    }

    #[test]
    fn converges_early_within_tolerance() {
        let (a, b) = tridiagonal_system();
        let x = conjugate_gradient(|v| a.mv(v), &b, 100, 1e-10);

        let residual = &b - a.mv(&x);
        assert!(f64::from(residual.dot(&residual)) < 1e-10);
    }

    #[test]
    fn zero_rhs_returns_zero() {
        let (a, _) = tridiagonal_system();
        let b = Tensor::zeros(&[3], (Kind::Double, Device::Cpu));

        let x = conjugate_gradient(|v| a.mv(v), &b, 10, 1e-10);
        assert_eq!(x, b);
    }

    #[test]
    fn iteration_budget_gives_best_effort() {
        let (a, b) = tridiagonal_system();
        let x = conjugate_gradient(|v| a.mv(v), &b, 1, 1e-10);

        // A single Krylov step: x = alpha * b with alpha = (b.b) / (b.Ab)
        let alpha = f64::from(b.dot(&b)) / f64::from(b.dot(&a.mv(&b)));
        let expected = alpha * &b;
        assert!(
            f64::from((&x - &expected).norm()) < 1e-10,
            "expected: {:?}, actual: {:?}",
            expected,
            x
        );
    }
}
