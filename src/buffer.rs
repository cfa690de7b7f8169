//! Rollout storage
use tch::Tensor;

/// A batch of collected transitions with estimated advantages and returns.
///
/// `observations` and `actions` are 2-D (`[BATCH_SIZE, ...]`); the rest are
/// 1-D of the same length.
#[derive(Debug)]
pub struct RolloutBatch {
    pub observations: Tensor,
    pub actions: Tensor,
    pub old_log_probs: Tensor,
    pub advantages: Tensor,
    pub returns: Tensor,
}

impl RolloutBatch {
    /// Number of transitions in the batch.
    pub fn n_samples(&self) -> i64 {
        self.observations.size()[0]
    }

    /// Keep every `factor`-th transition, starting with the first.
    pub fn sub_sample(&self, factor: i64) -> Self {
        assert!(factor >= 1, "sub-sampling factor must be positive");
        let total = self.n_samples();
        Self {
            observations: self.observations.slice(0, 0, total, factor),
            actions: self.actions.slice(0, 0, total, factor),
            old_log_probs: self.old_log_probs.slice(0, 0, total, factor),
            advantages: self.advantages.slice(0, 0, total, factor),
            returns: self.returns.slice(0, 0, total, factor),
        }
    }
}

/// A fixed set of collected transitions serving one policy update.
#[derive(Debug)]
pub struct RolloutBuffer {
    observations: Tensor,
    actions: Tensor,
    old_log_probs: Tensor,
    advantages: Tensor,
    returns: Tensor,
    /// Value estimates recorded at collection time, for explained variance.
    values: Tensor,
}

impl RolloutBuffer {
    /// Initialize from per-field tensors sharing a leading batch dimension.
    ///
    /// # Panics
    /// If the tensors are empty, have mismatched lengths, or the wrong number
    /// of dimensions.
    pub fn new(
        observations: Tensor,
        actions: Tensor,
        old_log_probs: Tensor,
        advantages: Tensor,
        returns: Tensor,
        values: Tensor,
    ) -> Self {
        assert_eq!(observations.dim(), 2, "observations must be 2-D");
        assert_eq!(actions.dim(), 2, "actions must be 2-D");
        let n = observations.size()[0];
        assert!(n > 0, "buffer must not be empty");
        for (name, tensor) in [
            ("old_log_probs", &old_log_probs),
            ("advantages", &advantages),
            ("returns", &returns),
            ("values", &values),
        ] {
            assert_eq!(tensor.dim(), 1, "{} must be 1-D", name);
            assert_eq!(tensor.size()[0], n, "{} length mismatch", name);
        }
        assert_eq!(actions.size()[0], n, "actions length mismatch");

        Self {
            observations,
            actions,
            old_log_probs,
            advantages,
            returns,
            values,
        }
    }

    /// Number of stored transitions.
    pub fn n_samples(&self) -> i64 {
        self.observations.size()[0]
    }

    /// Value estimates recorded at collection time.
    pub const fn values(&self) -> &Tensor {
        &self.values
    }

    /// Estimated returns.
    pub const fn returns(&self) -> &Tensor {
        &self.returns
    }

    /// Iterate over the stored transitions in order.
    ///
    /// `None` yields the entire buffer as a single batch. `Some(k)` yields
    /// sequential chunks of `k` transitions; the final chunk may be smaller.
    /// Every stored transition appears exactly once per pass.
    pub fn batches(&self, batch_size: Option<i64>) -> impl Iterator<Item = RolloutBatch> + '_ {
        let total = self.n_samples();
        let chunk = batch_size.unwrap_or(total);
        assert!(chunk >= 1, "batch size must be positive");
        (0..total).step_by(chunk as usize).map(move |start| {
            let end = (start + chunk).min(total);
            RolloutBatch {
                observations: self.observations.slice(0, start, end, 1),
                actions: self.actions.slice(0, start, end, 1),
                old_log_probs: self.old_log_probs.slice(0, start, end, 1),
                advantages: self.advantages.slice(0, start, end, 1),
                returns: self.returns.slice(0, start, end, 1),
            }
        })
    }
}
