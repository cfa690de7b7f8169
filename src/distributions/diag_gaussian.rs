//! Diagonal Gaussian distribution
use super::ActionDistribution;
use std::f64::consts::PI;
use tch::{Kind, Tensor};

/// Gaussian distribution(s) with diagonal covariance.
///
/// Action dimensions are independent; log probabilities, entropies and
/// divergences are summed over them so the results have batch shape.
#[derive(Debug)]
pub struct DiagGaussian {
    /// Mean of each action dimension. Shape `[BATCH_SIZE, ACTION_DIM]`.
    mean: Tensor,
    /// Log standard deviation of each action dimension.
    log_std: Tensor,
}

impl DiagGaussian {
    /// Initialize from means and log standard deviations.
    ///
    /// `log_std` may have any shape broadcastable to the shape of `mean`,
    /// such as a single `[ACTION_DIM]` vector shared by the whole batch.
    pub fn new(mean: &Tensor, log_std: &Tensor) -> Self {
        Self {
            mean: mean.shallow_clone(),
            log_std: log_std.expand_as(mean),
        }
    }
}

impl ActionDistribution for DiagGaussian {
    fn sample(&self) -> Tensor {
        let _no_grad = tch::no_grad_guard();
        &self.mean + self.mean.randn_like() * self.log_std.exp()
    }

    fn log_probs(&self, actions: &Tensor) -> Tensor {
        let z = (actions - &self.mean) / self.log_std.exp();
        (z.square() / -2.0 - &self.log_std - (2.0 * PI).ln() / 2.0).sum1(&[-1], false, Kind::Float)
    }

    fn entropy(&self) -> Tensor {
        (&self.log_std + (1.0 + (2.0 * PI).ln()) / 2.0).sum1(&[-1], false, Kind::Float)
    }

    fn kl_divergence_from(&self, other: &Self) -> Tensor {
        // Per dimension, with self = N(m0, s0) and other = N(m1, s1):
        // KL = log(s1/s0) + (s0^2 + (m0 - m1)^2) / (2*s1^2) - 1/2
        let log_std_ratio = &other.log_std - &self.log_std;
        let variance_ratio = ((&self.log_std - &other.log_std) * 2.0).exp();
        let mean_term = (&self.mean - &other.mean).square() / ((&other.log_std * 2.0).exp() * 2.0);
        (log_std_ratio + variance_ratio / 2.0 + mean_term - 0.5).sum1(&[-1], false, Kind::Float)
    }
}
