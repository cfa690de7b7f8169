//! Actor-critic policies
use crate::modules::{Mlp, MlpConfig};
use crate::optimizers::AdamConfig;
use crate::spaces::ActionSpace;
use serde::{Deserialize, Serialize};
use tch::{nn::VarStore, COptimizer, Device, Kind, TchError, Tensor};

/// An actor-critic policy trained by [`Trpo`](crate::agent::Trpo).
///
/// The actor and the critic may share parameters. Parameters are partitioned
/// by name: a parameter whose name contains `"value"` belongs to the value
/// function and is never treated as an actor parameter.
pub trait ActorCriticPolicy {
    /// All trainable parameters with their names, in a stable order.
    fn named_parameters(&self) -> &[(String, Tensor)];

    /// Action distribution parameters for a batch of observations.
    ///
    /// Output shape `[BATCH_SIZE, NUM_DISTRIBUTION_PARAMS]`, with gradient.
    fn action_params(&self, observations: &Tensor) -> Tensor;

    /// State-value estimates for a batch of observations, shape `[BATCH_SIZE]`.
    fn value(&self, observations: &Tensor) -> Tensor;

    /// The optimizer used for value-function regression.
    ///
    /// Must be built over the value-named parameters only: optimizer-side
    /// terms like weight decay move every registered parameter, even one
    /// whose gradient is zero.
    fn optimizer_mut(&mut self) -> &mut COptimizer;

    /// Mean action standard deviation, if the policy maintains one.
    fn action_std(&self) -> Option<f64> {
        None
    }
}

/// Configuration for [`MlpPolicy`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MlpPolicyConfig {
    /// Actor network
    pub actor: MlpConfig,
    /// Critic network
    pub critic: MlpConfig,
    /// Value-function optimizer
    pub optimizer: AdamConfig,
}

/// An actor-critic policy with separate actor and critic MLP towers.
///
/// Actor parameters are registered under `policy.*` and critic parameters
/// under `value.*`; the critic optimizer holds only the latter. Continuous
/// action spaces get a state-independent `policy.log_std` parameter, one
/// entry per action dimension.
pub struct MlpPolicy {
    actor: Mlp,
    critic: Mlp,
    log_std: Option<Tensor>,
    params: Vec<(String, Tensor)>,
    optimizer: COptimizer,
}

impl MlpPolicy {
    pub fn new(
        obs_dim: usize,
        action_space: ActionSpace,
        config: &MlpPolicyConfig,
        device: Device,
    ) -> Result<Self, TchError> {
        let vs = VarStore::new(device);
        let root = vs.root();

        let actor_out = match action_space {
            ActionSpace::Discrete { n } => n,
            ActionSpace::Continuous { dim } => dim,
        };
        let actor = Mlp::new(&(&root / "policy"), obs_dim, actor_out, &config.actor);
        let critic = Mlp::new(&(&root / "value"), obs_dim, 1, &config.critic);
        let log_std = match action_space {
            ActionSpace::Continuous { dim } => {
                Some((&root / "policy").zeros("log_std", &[dim as i64]))
            }
            ActionSpace::Discrete { .. } => None,
        };

        let mut params: Vec<_> = vs.variables().into_iter().collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));
        let optimizer = config.optimizer.build(
            params
                .iter()
                .filter(|(name, _)| name.contains("value"))
                .map(|(_, tensor)| tensor),
        )?;

        Ok(Self {
            actor,
            critic,
            log_std,
            params,
            optimizer,
        })
    }
}

impl ActorCriticPolicy for MlpPolicy {
    fn named_parameters(&self) -> &[(String, Tensor)] {
        &self.params
    }

    fn action_params(&self, observations: &Tensor) -> Tensor {
        let output = self.actor.forward(observations);
        match &self.log_std {
            Some(log_std) => Tensor::cat(&[&output, &log_std.expand_as(&output)], -1),
            None => output,
        }
    }

    fn value(&self, observations: &Tensor) -> Tensor {
        self.critic.forward(observations).squeeze1(-1)
    }

    fn optimizer_mut(&mut self) -> &mut COptimizer {
        &mut self.optimizer
    }

    fn action_std(&self) -> Option<f64> {
        let _no_grad = tch::no_grad_guard();
        self.log_std
            .as_ref()
            .map(|log_std| f64::from(&log_std.exp().mean(Kind::Float)))
    }
}
