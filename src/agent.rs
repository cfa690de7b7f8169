//! Trust region policy optimization agent
use crate::buffer::{RolloutBatch, RolloutBuffer};
use crate::distributions::{ActionDistribution, PolicyDistribution};
use crate::optimizers::{
    conjugate_gradient, line_search, max_step_size, FisherVectorProduct, LineSearchOutcome,
    PolicyGrads, StepError,
};
use crate::policy::ActorCriticPolicy;
use crate::spaces::ActionSpace;
use crate::utils;
use serde::{Deserialize, Serialize};
use tch::{Kind, Reduction, TchError, Tensor};
use thiserror::Error;

/// Invalid [`TrpoConfig`] setting.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    /// A value that must be strictly positive was not.
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    /// A value that must be non-negative was not.
    #[error("{name} must be non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    /// A count that must be at least one was zero.
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },
    /// The line-search decay must strictly shrink the step.
    #[error("line_search_shrinking_factor must be within (0, 1), got {0}")]
    ShrinkFactorOutOfRange(f64),
}

/// Configuration for a [`Trpo`] agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrpoConfig {
    /// Maximum number of conjugate-gradient iterations per update.
    pub cg_max_steps: u64,
    /// Damping added to the Fisher-vector products, `A -> A + damping * I`.
    pub cg_damping: f64,
    /// Bound on the mean divergence from the sampling policy per update.
    pub target_kl: f64,
    /// Multiplicative step decay between line-search trials.
    pub line_search_shrinking_factor: f64,
    /// Maximum number of line-search trials per update.
    pub line_search_max_iter: u64,
    /// Value-function regression passes per update.
    pub n_critic_updates: u64,
    /// Minibatch size for value-function regression.
    pub batch_size: i64,
    /// Keep every k-th transition for the policy update.
    pub sub_sampling_factor: i64,
    /// Whether to normalize advantages to zero mean and unit variance.
    pub normalize_advantage: bool,
}

impl Default for TrpoConfig {
    fn default() -> Self {
        Self {
            cg_max_steps: 15,
            cg_damping: 0.1,
            target_kl: 0.01,
            line_search_shrinking_factor: 0.8,
            line_search_max_iter: 10,
            n_critic_updates: 10,
            batch_size: 128,
            sub_sampling_factor: 1,
            normalize_advantage: true,
        }
    }
}

impl TrpoConfig {
    /// Check the configuration invariants.
    ///
    /// # Errors
    /// The first violated invariant, as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_kl <= 0.0 || self.target_kl.is_nan() {
            return Err(ConfigError::NotPositive {
                name: "target_kl",
                value: self.target_kl,
            });
        }
        if self.cg_damping < 0.0 || self.cg_damping.is_nan() {
            return Err(ConfigError::Negative {
                name: "cg_damping",
                value: self.cg_damping,
            });
        }
        let shrink = self.line_search_shrinking_factor;
        if shrink <= 0.0 || shrink >= 1.0 || shrink.is_nan() {
            return Err(ConfigError::ShrinkFactorOutOfRange(shrink));
        }
        for (name, count) in [
            ("cg_max_steps", self.cg_max_steps),
            ("line_search_max_iter", self.line_search_max_iter),
            ("n_critic_updates", self.n_critic_updates),
        ] {
            if count == 0 {
                return Err(ConfigError::ZeroCount { name });
            }
        }
        for (name, count) in [
            ("batch_size", self.batch_size),
            ("sub_sampling_factor", self.sub_sampling_factor),
        ] {
            if count < 1 {
                return Err(ConfigError::ZeroCount { name });
            }
        }
        Ok(())
    }
}

/// Diagnostics from one [`Trpo::train`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainStats {
    /// Mean surrogate policy objective after the update.
    pub policy_objective: f64,
    /// Mean value-function regression loss.
    pub value_loss: f64,
    /// Mean divergence of the accepted step (`0.0` for a reverted or skipped
    /// step).
    pub kl_divergence: f64,
    /// Fraction of policy updates accepted by the line search.
    pub line_search_success: f64,
    /// Explained variance of the stored value estimates against the returns.
    pub explained_variance: f64,
    /// Total number of updates performed by this agent.
    pub n_updates: u64,
    /// Mean action standard deviation, for policies that maintain one.
    pub std: Option<f64>,
}

/// Trust region policy optimization (Schulman et al., 2015).
///
/// Each [`train`](Self::train) call performs one constrained policy update on
/// a rollout buffer followed by a value-function regression pass. The policy
/// update never leaves the parameters at a rejected trial point: it either
/// applies an accepted step or restores the starting values exactly.
pub struct Trpo<P> {
    policy: P,
    action_space: ActionSpace,
    config: TrpoConfig,
    n_updates: u64,
}

impl<P: ActorCriticPolicy> Trpo<P> {
    /// Initialize the agent with a validated configuration.
    ///
    /// # Errors
    /// [`ConfigError`] if any configuration invariant is violated.
    pub fn new(
        policy: P,
        action_space: ActionSpace,
        config: TrpoConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy,
            action_space,
            config,
            n_updates: 0,
        })
    }

    pub const fn policy(&self) -> &P {
        &self.policy
    }

    /// Set the learning rate of the value-function optimizer.
    ///
    /// # Errors
    /// Any error raised by the underlying optimizer.
    pub fn set_learning_rate(&mut self, learning_rate: f64) -> Result<(), TchError> {
        self.policy.optimizer_mut().set_learning_rate(learning_rate)
    }

    /// Run one update on a collected rollout buffer.
    pub fn train(&mut self, buffer: &RolloutBuffer) -> TrainStats {
        let mut objectives = Vec::new();
        let mut kl_divergences = Vec::new();
        let mut successes = Vec::new();

        for batch in buffer.batches(None) {
            let batch = self.prepare_batch(batch);
            let (objective, kl, accepted) = self.policy_step(&batch);
            objectives.push(objective);
            kl_divergences.push(kl);
            successes.push(accepted);
        }

        let value_loss = self.critic_regression(buffer);
        self.n_updates += 1;

        TrainStats {
            policy_objective: mean(&objectives),
            value_loss,
            kl_divergence: mean(&kl_divergences),
            line_search_success: successes.iter().filter(|&&accepted| accepted).count() as f64
                / successes.len() as f64,
            explained_variance: utils::explained_variance(buffer.values(), buffer.returns()),
            n_updates: self.n_updates,
            std: self.policy.action_std(),
        }
    }

    /// Normalize advantages over the full batch, then sub-sample.
    fn prepare_batch(&self, batch: RolloutBatch) -> RolloutBatch {
        let advantages = if self.config.normalize_advantage {
            assert!(
                batch.n_samples() > 1,
                "advantage normalization requires more than one sample"
            );
            let advantages = &batch.advantages;
            (advantages - advantages.mean(Kind::Float)) / (advantages.std(true) + 1e-8)
        } else {
            batch.advantages.shallow_clone()
        };
        let batch = RolloutBatch { advantages, ..batch };
        if self.config.sub_sampling_factor > 1 {
            batch.sub_sample(self.config.sub_sampling_factor)
        } else {
            batch
        }
    }

    /// One constrained policy update on a batch.
    ///
    /// Returns the recorded `(objective, kl, accepted)` triple. A recoverable
    /// [`StepError`] is logged and recorded as an unsuccessful update with the
    /// parameters untouched.
    fn policy_step(&mut self, batch: &RolloutBatch) -> (f64, f64, bool) {
        let actions = self.action_space.prepare_actions(&batch.actions);

        // Sampling-policy snapshot, fixed for the whole iteration.
        let old_distribution = {
            let _no_grad = tch::no_grad_guard();
            self.action_space
                .distribution(&self.policy.action_params(&batch.observations))
        };

        let distribution = self
            .action_space
            .distribution(&self.policy.action_params(&batch.observations));
        let ratio = (distribution.log_probs(&actions) - &batch.old_log_probs).exp();
        let objective = (&batch.advantages * ratio).mean(Kind::Float);
        let kl_div = distribution
            .kl_divergence_from(&old_distribution)
            .mean(Kind::Float);
        let initial_objective = f64::from(&objective);

        let result = self.constrained_step(
            batch,
            &actions,
            &old_distribution,
            &objective,
            &kl_div,
            initial_objective,
        );
        match result {
            Ok(LineSearchOutcome::Accepted { objective, kl }) => (objective, kl, true),
            Ok(LineSearchOutcome::Reverted) => (initial_objective, 0.0, false),
            Err(error) => {
                tracing::warn!("policy update skipped: {}", error);
                (initial_objective, 0.0, false)
            }
        }
    }

    /// Solve for the natural-gradient step and line search along it.
    fn constrained_step(
        &self,
        batch: &RolloutBatch,
        actions: &Tensor,
        old_distribution: &PolicyDistribution,
        objective: &Tensor,
        kl_div: &Tensor,
        initial_objective: f64,
    ) -> Result<LineSearchOutcome, StepError> {
        let grads = PolicyGrads::compute(self.policy.named_parameters(), objective, kl_div)?;
        let fvp = FisherVectorProduct::new(&grads, self.config.cg_damping);
        let direction = conjugate_gradient(
            |v| fvp.apply(v, true),
            &grads.objective_grad,
            self.config.cg_max_steps,
            1e-10,
        );
        // Releases the divergence graph.
        let max_step = max_step_size(&direction, &fvp, self.config.target_kl)?;
        let full_step = max_step * direction;

        let policy = &self.policy;
        let action_space = self.action_space;
        let evaluate = || {
            let distribution =
                action_space.distribution(&policy.action_params(&batch.observations));
            let ratio = (distribution.log_probs(actions) - &batch.old_log_probs).exp();
            let objective = (&batch.advantages * ratio).mean(Kind::Float);
            let kl = distribution
                .kl_divergence_from(old_distribution)
                .mean(Kind::Float);
            (f64::from(&objective), f64::from(&kl))
        };

        Ok(line_search(
            &grads,
            &full_step,
            self.config.target_kl,
            initial_objective,
            self.config.line_search_shrinking_factor,
            self.config.line_search_max_iter,
            evaluate,
        ))
    }

    /// Fit the value function to the returns by minibatch gradient descent.
    ///
    /// Returns the mean regression loss over all minibatches, recorded before
    /// each optimizer step.
    fn critic_regression(&mut self, buffer: &RolloutBuffer) -> f64 {
        if buffer.n_samples() % self.config.batch_size != 0 {
            tracing::warn!(
                "minibatch size {} does not divide the buffer length {}",
                self.config.batch_size,
                buffer.n_samples()
            );
        }

        let mut losses = Vec::new();
        for _ in 0..self.config.n_critic_updates {
            for batch in buffer.batches(Some(self.config.batch_size)) {
                let loss = self
                    .policy
                    .value(&batch.observations)
                    .mse_loss(&batch.returns, Reduction::Mean);
                losses.push(f64::from(&loss));

                self.policy.optimizer_mut().zero_grad().unwrap();
                loss.backward();
                // The optimizer holds only value-named parameters. Clear the
                // gradients the value loss leaves on shared actor parameters
                // so they never accumulate.
                for (name, param) in self.policy.named_parameters() {
                    if !name.contains("value") {
                        utils::zero_grad(param);
                    }
                }
                self.policy.optimizer_mut().step().unwrap();
            }
        }
        mean(&losses)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
