//! Shared test fixtures.
use crate::buffer::RolloutBuffer;
use crate::optimizers::AdamConfig;
use crate::policy::ActorCriticPolicy;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tch::{COptimizer, Device, Kind, Tensor};

/// A linear softmax policy over two actions with a linear critic.
///
/// Both weights start at zero, so the initial action distribution is uniform
/// and the initial value predictions are zero.
pub struct LinearPolicy {
    actor_weight: Tensor,
    value_weight: Tensor,
    params: Vec<(String, Tensor)>,
    optimizer: COptimizer,
}

impl LinearPolicy {
    pub fn new() -> Self {
        let actor_weight = Tensor::zeros(&[1, 2], (Kind::Float, Device::Cpu)).requires_grad_(true);
        let value_weight = Tensor::zeros(&[1, 1], (Kind::Float, Device::Cpu)).requires_grad_(true);
        let params = vec![
            ("policy.weight".to_string(), actor_weight.shallow_clone()),
            ("value.weight".to_string(), value_weight.shallow_clone()),
        ];
        let optimizer = value_optimizer(&AdamConfig::default(), &params);
        Self {
            actor_weight,
            value_weight,
            params,
            optimizer,
        }
    }
}

impl Default for LinearPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorCriticPolicy for LinearPolicy {
    fn named_parameters(&self) -> &[(String, Tensor)] {
        &self.params
    }

    fn action_params(&self, observations: &Tensor) -> Tensor {
        observations.matmul(&self.actor_weight)
    }

    fn value(&self, observations: &Tensor) -> Tensor {
        observations.matmul(&self.value_weight).squeeze1(-1)
    }

    fn optimizer_mut(&mut self) -> &mut COptimizer {
        &mut self.optimizer
    }
}

/// A policy whose actor and value heads share a common trunk.
///
/// The trunk's name picks its side of the name partition: a value-named
/// trunk still influences the action distribution and a policy-named trunk
/// still influences the value predictions.
pub struct SharedPolicy {
    trunk: Tensor,
    actor_head: Tensor,
    value_head: Tensor,
    params: Vec<(String, Tensor)>,
    optimizer: COptimizer,
}

impl SharedPolicy {
    pub fn new(trunk_name: &str, optimizer_config: &AdamConfig) -> Self {
        // Nonzero so that the heads receive a signal through the trunk.
        let trunk = Tensor::of_slice(&[1.0f32, -1.0])
            .reshape(&[1, 2])
            .requires_grad_(true);
        let actor_head = Tensor::zeros(&[2, 2], (Kind::Float, Device::Cpu)).requires_grad_(true);
        let value_head = Tensor::zeros(&[2, 1], (Kind::Float, Device::Cpu)).requires_grad_(true);
        let mut params = vec![
            ("policy.head".to_string(), actor_head.shallow_clone()),
            ("value.head".to_string(), value_head.shallow_clone()),
            (trunk_name.to_string(), trunk.shallow_clone()),
        ];
        params.sort_by(|a, b| a.0.cmp(&b.0));
        let optimizer = value_optimizer(optimizer_config, &params);
        Self {
            trunk,
            actor_head,
            value_head,
            params,
            optimizer,
        }
    }
}

impl ActorCriticPolicy for SharedPolicy {
    fn named_parameters(&self) -> &[(String, Tensor)] {
        &self.params
    }

    fn action_params(&self, observations: &Tensor) -> Tensor {
        observations.matmul(&self.trunk).matmul(&self.actor_head)
    }

    fn value(&self, observations: &Tensor) -> Tensor {
        observations
            .matmul(&self.trunk)
            .matmul(&self.value_head)
            .squeeze1(-1)
    }

    fn optimizer_mut(&mut self) -> &mut COptimizer {
        &mut self.optimizer
    }
}

/// An Adam optimizer over the value-named subset of a parameter list.
fn value_optimizer(config: &AdamConfig, params: &[(String, Tensor)]) -> COptimizer {
    config
        .build(
            params
                .iter()
                .filter(|(name, _)| name.contains("value"))
                .map(|(_, tensor)| tensor),
        )
        .unwrap()
}

/// A deterministic two-armed bandit rollout.
///
/// Unit observations, alternating actions, and advantages favoring the first
/// action. The stored log-probabilities match a uniform sampling policy and
/// the stored values are exactly half of the returns.
pub fn bandit_rollouts(n: i64) -> RolloutBuffer {
    let action_indices = Tensor::arange(n, (Kind::Int64, Device::Cpu)).remainder(2);
    let actions = action_indices.to_kind(Kind::Float).unsqueeze(-1);
    // +1 for action 0, -1 for action 1
    let advantages = action_indices.to_kind(Kind::Float) * -2.0 + 1.0;
    let returns = Tensor::arange(n, (Kind::Float, Device::Cpu)) / n as f64;

    RolloutBuffer::new(
        Tensor::ones(&[n, 1], (Kind::Float, Device::Cpu)),
        actions,
        Tensor::full(&[n], (0.5_f64).ln(), (Kind::Float, Device::Cpu)),
        advantages,
        returns.shallow_clone(),
        returns * 0.5,
    )
}

/// Bandit rollouts with every advantage set to zero, leaving the surrogate
/// objective without an ascent direction.
pub fn zero_advantage_rollouts(n: i64) -> RolloutBuffer {
    let buffer = bandit_rollouts(n);
    let batch = buffer.batches(None).next().unwrap();
    RolloutBuffer::new(
        batch.observations,
        batch.actions,
        batch.old_log_probs,
        Tensor::zeros(&[n], (Kind::Float, Device::Cpu)),
        batch.returns,
        buffer.values().shallow_clone(),
    )
}

/// Continuous-action rollouts drawn from a seeded generator.
pub fn random_rollouts(seed: u64, n: i64, obs_dim: i64, action_dim: i64) -> RolloutBuffer {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let observations = tensor_from_rng(&mut rng, &[n, obs_dim]);
    let actions = tensor_from_rng(&mut rng, &[n, action_dim]);
    let advantages = tensor_from_rng(&mut rng, &[n]);
    let returns = tensor_from_rng(&mut rng, &[n]);
    let values = tensor_from_rng(&mut rng, &[n]);
    // Plausible sampling log-probabilities; keeps the importance ratios finite.
    let old_log_probs = tensor_from_rng(&mut rng, &[n]) - 2.0;

    RolloutBuffer::new(
        observations,
        actions,
        old_log_probs,
        advantages,
        returns,
        values,
    )
}

fn tensor_from_rng(rng: &mut ChaCha8Rng, shape: &[i64]) -> Tensor {
    let numel: i64 = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::of_slice(&data).reshape(shape)
}
