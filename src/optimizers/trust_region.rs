//! Trust-region step construction: gradient extraction, curvature, line search.
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

use super::super::utils;
use tch::Tensor;
use thiserror::Error;

/// Error preventing a trust-region policy step.
///
/// These conditions are recoverable: the parameters are left unchanged and the
/// caller may skip the update.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum StepError {
    /// No parameter has a gradient path into the policy distribution.
    #[error("no parameter influences the policy distribution")]
    NoPolicyGradient,
    /// Curvature along the search direction is NaN or non-positive,
    /// so no finite step size satisfies the trust region.
    #[error("degenerate curvature along the search direction: {curvature}")]
    DegenerateCurvature { curvature: f64 },
}

/// Gradients of the surrogate objective and divergence for one policy update.
///
/// Holds the ordered subset of parameters that contribute to the policy
/// distribution together with both gradients in flattened form. The divergence
/// gradient is created with `create_graph` so that it can be differentiated a
/// second time by [`FisherVectorProduct`].
#[derive(Debug)]
pub struct PolicyGrads {
    /// Policy parameters, in the iteration order of the source list.
    pub params: Vec<Tensor>,
    /// Flattened gradient of the surrogate objective.
    pub objective_grad: Tensor,
    /// Flattened gradient of the mean divergence. Carries its graph.
    pub kl_grad: Tensor,
    /// The shape of each tensor in `params`.
    pub shapes: Vec<Vec<i64>>,
}

impl PolicyGrads {
    /// Extract objective and divergence gradients for the policy parameters.
    ///
    /// Parameters whose name contains `"value"` belong to the value function
    /// and are excluded regardless of gradient connectivity. Parameters with
    /// no gradient path into `kl_div` or `objective` are excluded silently;
    /// a structurally absent gradient surfaces as an `Err` from
    /// [`Tensor::f_run_backward`], not as a zero tensor.
    ///
    /// Both backward passes keep the forward graph alive so that the graph is
    /// shared across parameters and remains usable for the Fisher-vector
    /// products afterwards.
    ///
    /// # Args
    /// * `named_params` - Named parameter tensors in a stable order.
    /// * `objective` - Scalar surrogate objective (to be maximized).
    /// * `kl_div` - Scalar mean divergence from the sampling policy.
    ///
    /// # Errors
    /// [`StepError::NoPolicyGradient`] if no parameter survives the partition.
    pub fn compute<'a, I>(
        named_params: I,
        objective: &Tensor,
        kl_div: &Tensor,
    ) -> Result<Self, StepError>
    where
        I: IntoIterator<Item = &'a (String, Tensor)>,
    {
        let mut params = Vec::new();
        let mut shapes = Vec::new();
        let mut objective_grads = Vec::new();
        let mut kl_grads = Vec::new();
        for (name, param) in named_params {
            if name.contains("value") {
                continue;
            }
            let kl_grad = match Tensor::f_run_backward(&[kl_div], &[param], true, true) {
                Ok(mut grads) => grads.remove(0),
                Err(_) => continue,
            };
            let objective_grad =
                match Tensor::f_run_backward(&[objective], &[param], true, false) {
                    Ok(mut grads) => grads.remove(0),
                    Err(_) => continue,
                };
            params.push(param.shallow_clone());
            shapes.push(param.size());
            objective_grads.push(objective_grad);
            kl_grads.push(kl_grad);
        }
        if params.is_empty() {
            return Err(StepError::NoPolicyGradient);
        }
        Ok(Self {
            params,
            objective_grad: utils::flatten_tensors(&objective_grads),
            kl_grad: utils::flatten_tensors(&kl_grads),
            shapes,
        })
    }
}

/// Matrix-free product with the damped Fisher information matrix.
///
/// The Fisher matrix is the Hessian of the mean divergence from the sampling
/// policy, evaluated by differentiating the stored divergence gradient a
/// second time. The matrix itself is never materialized.
///
/// # Reference
/// Pearlmutter, Barak A. "Fast exact multiplication by the Hessian."
/// Neural computation 6.1 (1994): 147-160.
#[derive(Debug)]
pub struct FisherVectorProduct<'a> {
    grads: &'a PolicyGrads,
    /// Damping coefficient. A small value so that A -> A + damping*I.
    damping: f64,
}

impl<'a> FisherVectorProduct<'a> {
    pub const fn new(grads: &'a PolicyGrads, damping: f64) -> Self {
        Self { grads, damping }
    }

    /// Multiply the damped Fisher matrix by a flattened vector.
    ///
    /// May be called repeatedly while `retain_graph` is true; the final call
    /// may pass `false` to release the divergence graph.
    pub fn apply(&self, vector: &Tensor, retain_graph: bool) -> Tensor {
        let grad_vector_product = self.grads.kl_grad.dot(vector);
        // Every stored parameter contributes to kl_grad, so no gradient in
        // this second pass can be structurally absent.
        let products = Tensor::run_backward(
            &[&grad_vector_product],
            &self.grads.params,
            retain_graph,
            false,
        );
        let flat_products = utils::flatten_tensors(&products);
        // flat_products + damping * vector
        flat_products.g_add(&vector.g_mul1(self.damping))
    }
}

/// Largest step length along `direction` that satisfies the trust region.
///
/// For a step `beta * direction` the quadratic model of the divergence is
/// `1/2 * beta^2 * direction' A direction`, so the bound `target_kl` is
/// reached at `beta = sqrt(2 * target_kl / shs)` with
/// `shs = direction' A direction`.
///
/// Consumes the final Fisher-vector product: the divergence graph is released
/// and `fvp` must not be applied again afterwards.
///
/// # Errors
/// [`StepError::DegenerateCurvature`] if `shs` is NaN or non-positive.
pub fn max_step_size(
    direction: &Tensor,
    fvp: &FisherVectorProduct,
    target_kl: f64,
) -> Result<f64, StepError> {
    let curvature = f64::from(direction.dot(&fvp.apply(direction, false)));
    if curvature.is_nan() || curvature <= 0.0 {
        return Err(StepError::DegenerateCurvature { curvature });
    }
    Ok((2.0 * target_kl / curvature).sqrt())
}

/// Result of a backtracking line search over the policy parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSearchOutcome {
    /// A trial step satisfying both acceptance conditions was applied.
    Accepted {
        /// Surrogate objective at the accepted parameters.
        objective: f64,
        /// Divergence from the sampling policy at the accepted parameters.
        kl: f64,
    },
    /// Every trial step failed; the parameters were restored exactly.
    Reverted,
}

impl LineSearchOutcome {
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Backtracking line search along a maximal trust-region step.
///
/// Trial `i` sets every parameter to `snapshot + shrink_factor^i * full_step`
/// (per-tensor segments of the flattened `full_step`) and evaluates the
/// policy at the new values. The first trial with `kl < target_kl` and
/// `objective > initial_objective` is kept. If no trial qualifies within
/// `max_backtracks`, the parameter snapshots are restored and the search
/// reports [`LineSearchOutcome::Reverted`].
///
/// Runs with gradient tracking disabled; `evaluate` must return the scalar
/// `(objective, kl)` pair at the current parameter values. NaN scalars fail
/// both acceptance conditions.
pub fn line_search<F>(
    grads: &PolicyGrads,
    full_step: &Tensor,
    target_kl: f64,
    initial_objective: f64,
    shrink_factor: f64,
    max_backtracks: u64,
    mut evaluate: F,
) -> LineSearchOutcome
where
    F: FnMut() -> (f64, f64),
{
    let _no_grad = tch::no_grad_guard();

    // Detached views of the parameters; writing through them with copy_
    // leaves the autograd metadata of the originals untouched.
    let mut params: Vec<_> = grads.params.iter().map(Tensor::detach).collect();
    let snapshots: Vec<_> = params.iter().map(Tensor::copy).collect();
    let step_segments = utils::unflatten_tensors(full_step, &grads.shapes);

    for i in 0..max_backtracks {
        let coeff = shrink_factor.powi(i as i32);

        for ((segment, snapshot), param) in step_segments
            .iter()
            .zip(snapshots.iter())
            .zip(params.iter_mut())
        {
            param.copy_(&(snapshot + coeff * segment));
        }

        let (objective, kl) = evaluate();
        if kl < target_kl && objective > initial_objective {
            return LineSearchOutcome::Accepted { objective, kl };
        }
    }

    for (param, snapshot) in params.iter_mut().zip(&snapshots) {
        param.copy_(snapshot);
    }
    LineSearchOutcome::Reverted
}


#[cfg(test)]
mod fisher_vector_product {
    use super::*;
    use tch::{Cuda, Device, Kind};

    fn quadratic_grads(m: &Tensor) -> PolicyGrads {
        // kl(x) = 1/2*x'Mx has Hessian M at every x
        let x = Tensor::zeros(&[2], (Kind::Float, Device::Cpu)).requires_grad_(true);
        let kl = m.mv(&x).dot(&x) / 2;
        let objective = x.sum(Kind::Float);
        let named = vec![("policy.x".to_string(), x.shallow_clone())];
        PolicyGrads::compute(&named, &objective, &kl).unwrap()
    }

    #[test]
    fn quadratic_hessian() {
        // Work-around for https://github.com/pytorch/pytorch/issues/35736
        Cuda::is_available();

        let m = Tensor::of_slice(&[1.0f32, -1.0, -1.0, 2.0]).reshape(&[2, 2]);
        let grads = quadratic_grads(&m);
        let fvp = FisherVectorProduct::new(&grads, 0.0);

        assert_eq!(
            fvp.apply(&Tensor::of_slice(&[1.0f32, 0.0]), true),
            Tensor::of_slice(&[1.0f32, -1.0])
        );
        assert_eq!(
            fvp.apply(&Tensor::of_slice(&[0.0f32, 1.0]), false),
            Tensor::of_slice(&[-1.0f32, 2.0])
        );
    }

    #[test]
    fn damping_adds_scaled_identity() {
        // Work-around for https://github.com/pytorch/pytorch/issues/35736
        Cuda::is_available();

        let m = Tensor::of_slice(&[1.0f32, -1.0, -1.0, 2.0]).reshape(&[2, 2]);
        let grads = quadratic_grads(&m);
        let fvp = FisherVectorProduct::new(&grads, 0.5);

        assert_eq!(
            fvp.apply(&Tensor::of_slice(&[1.0f32, 0.0]), false),
            Tensor::of_slice(&[1.5f32, -1.0])
        );
    }
}
