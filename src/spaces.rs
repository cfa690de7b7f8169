//! Action spaces
use crate::distributions::{Categorical, DiagGaussian, PolicyDistribution};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// A space of possible actions.
///
/// Resolves the distribution family and the stored-action representation once
/// per batch rather than per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpace {
    /// `n` distinct, unrelated actions represented by integer index tensors.
    Discrete { n: usize },
    /// Real vector actions of dimension `dim`.
    Continuous { dim: usize },
}

impl ActionSpace {
    /// Number of distribution parameters per batch element.
    ///
    /// One logit per action for `Discrete`; a mean and a log standard
    /// deviation per action dimension for `Continuous`.
    pub const fn num_distribution_params(&self) -> usize {
        match self {
            Self::Discrete { n } => *n,
            Self::Continuous { dim } => 2 * *dim,
        }
    }

    /// Build a batched action distribution from distribution parameters.
    ///
    /// `params` has shape `[BATCH_SIZE, NUM_DISTRIBUTION_PARAMS]`.
    pub fn distribution(&self, params: &Tensor) -> PolicyDistribution {
        match self {
            Self::Discrete { .. } => PolicyDistribution::Categorical(Categorical::new(params)),
            Self::Continuous { dim } => {
                let dim = *dim as i64;
                let mean = params.slice(-1, 0, dim, 1);
                let log_std = params.slice(-1, dim, 2 * dim, 1);
                PolicyDistribution::DiagGaussian(DiagGaussian::new(&mean, &log_std))
            }
        }
    }

    /// Coerce a stored action batch into the form expected by
    /// [`ActionDistribution::log_probs`](crate::distributions::ActionDistribution::log_probs).
    ///
    /// Discrete actions become a flat `[BATCH_SIZE]` index tensor; continuous
    /// actions pass through unchanged.
    pub fn prepare_actions(&self, actions: &Tensor) -> Tensor {
        match self {
            Self::Discrete { .. } => actions.to_kind(Kind::Int64).flatten(0, -1),
            Self::Continuous { .. } => actions.shallow_clone(),
        }
    }
}
