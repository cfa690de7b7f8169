//! Categorical distribution
use super::{clamp_float_min, ActionDistribution};
use tch::{Kind, Tensor};

/// Categorical distribution(s) over a fixed number of events.
#[derive(Debug)]
pub struct Categorical {
    /// Log probability of each event.
    ///
    /// A float tensor of shape `[BATCH_SIZE, NUM_EVENTS]`.
    logits: Tensor,
}

impl Categorical {
    /// Initialize from possibly unnormalized log probabilities.
    ///
    /// The log probabilities are normalized by adding some value `C` to each
    /// such that `sum_i exp(log_prob[i] + C) = 1`.
    pub fn new(logits: &Tensor) -> Self {
        Self {
            logits: logits.log_softmax(-1, Kind::Float),
        }
    }
}

impl ActionDistribution for Categorical {
    fn sample(&self) -> Tensor {
        self.logits.exp().multinomial(1, true).squeeze1(-1)
    }

    fn log_probs(&self, actions: &Tensor) -> Tensor {
        self.logits
            .gather(-1, &actions.unsqueeze(-1), false)
            .squeeze1(-1)
    }

    fn entropy(&self) -> Tensor {
        // Clamping keeps zero-probability events at 0 * finite instead of
        // 0 * -inf = NaN.
        let clamped_logits = clamp_float_min(&self.logits)
            .map_err(|kind| format!("logits must be f32 or f64, not {:?}", kind))
            .unwrap();
        -(clamped_logits * self.logits.exp()).sum1(&[-1], false, Kind::Float)
    }

    fn kl_divergence_from(&self, other: &Self) -> Tensor {
        let clamped_rel_logits = clamp_float_min(&(&self.logits - &other.logits))
            .map_err(|kind| format!("logits must be f32 or f64, not {:?}", kind))
            .unwrap();
        (clamped_rel_logits * self.logits.exp()).sum1(&[-1], false, Kind::Float)
    }
}
