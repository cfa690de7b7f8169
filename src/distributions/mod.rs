//! Action distributions
//!
//! These types represent a batch of distributions, one per transition.
//! The return values of statistics methods are tensors with batch shape.
mod categorical;
mod diag_gaussian;

pub use categorical::Categorical;
pub use diag_gaussian::DiagGaussian;

use tch::{Kind, Tensor};

/// A batch of distributions over action tensors.
pub trait ActionDistribution {
    /// Sample a batch of actions, one per distribution.
    fn sample(&self) -> Tensor;

    /// Log probabilities of the given actions.
    ///
    /// # Args
    /// * `actions` - Actions from the distribution domain, one per distribution.
    ///
    /// # Returns
    /// A tensor of log probabilities with shape `[BATCH_SIZE]`.
    fn log_probs(&self, actions: &Tensor) -> Tensor;

    /// Distribution entropies with shape `[BATCH_SIZE]`.
    fn entropy(&self) -> Tensor;

    /// The KL divergence (relative entropy) from another batch of distributions.
    ///
    /// `KL(self || other)`
    ///
    /// # Args
    /// * `other` - A batch of distributions with the same batch shape.
    ///
    /// # Returns
    /// A tensor of KL divergences `KL(self[i] || other[i])` with shape `[BATCH_SIZE]`.
    fn kl_divergence_from(&self, other: &Self) -> Tensor;
}

/// A policy distribution of either family, resolved by the action space.
#[derive(Debug)]
pub enum PolicyDistribution {
    Categorical(Categorical),
    DiagGaussian(DiagGaussian),
}

impl ActionDistribution for PolicyDistribution {
    fn sample(&self) -> Tensor {
        match self {
            Self::Categorical(d) => d.sample(),
            Self::DiagGaussian(d) => d.sample(),
        }
    }

    fn log_probs(&self, actions: &Tensor) -> Tensor {
        match self {
            Self::Categorical(d) => d.log_probs(actions),
            Self::DiagGaussian(d) => d.log_probs(actions),
        }
    }

    fn entropy(&self) -> Tensor {
        match self {
            Self::Categorical(d) => d.entropy(),
            Self::DiagGaussian(d) => d.entropy(),
        }
    }

    /// # Panics
    /// If `self` and `other` are distributions of different families.
    fn kl_divergence_from(&self, other: &Self) -> Tensor {
        match (self, other) {
            (Self::Categorical(d), Self::Categorical(o)) => d.kl_divergence_from(o),
            (Self::DiagGaussian(d), Self::DiagGaussian(o)) => d.kl_divergence_from(o),
            _ => panic!("mismatched distribution families"),
        }
    }
}

/// Clamp float values to be >= the smallest finite float value.
fn clamp_float_min(x: &Tensor) -> Result<Tensor, Kind> {
    match x.kind() {
        Kind::Float => Ok(x.clamp_min(f64::from(f32::MIN))),
        Kind::Double => Ok(x.clamp_min(f64::MIN)),
        kind => Err(kind),
    }
}
