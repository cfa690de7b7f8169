//! Optimizers
mod conjugate_gradient;
mod coptimizer;
mod trust_region;

pub use conjugate_gradient::conjugate_gradient;
pub use coptimizer::AdamConfig;
pub use trust_region::{
    line_search, max_step_size, FisherVectorProduct, LineSearchOutcome, PolicyGrads, StepError,
};
