//! Torch optimizer wrappers and configuration
use serde::{Deserialize, Serialize};
use std::convert::{TryFrom, TryInto};
use tch::{COptimizer, TchError, Tensor};

/// Configuration for the Adam optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Coefficient for the running average of the gradient
    pub beta1: f64,
    /// Coefficient for the running average of the square of the gradient
    pub beta2: f64,
    /// Weight decay (L2 penalty)
    pub weight_decay: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 0.0,
        }
    }
}

impl TryFrom<&AdamConfig> for COptimizer {
    type Error = TchError;
    fn try_from(config: &AdamConfig) -> Result<Self, Self::Error> {
        COptimizer::adam(
            config.learning_rate,
            config.beta1,
            config.beta2,
            config.weight_decay,
        )
    }
}

impl AdamConfig {
    /// Build an optimizer over the given parameter tensors, registered in order.
    pub fn build<'a, I>(&self, params: I) -> Result<COptimizer, TchError>
    where
        I: IntoIterator<Item = &'a Tensor>,
    {
        let mut optimizer: COptimizer = self.try_into()?;
        for param in params {
            optimizer.add_parameters(param, 0)?;
        }
        Ok(optimizer)
    }
}
