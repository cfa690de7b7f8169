//! Trust region policy optimization.
//!
//! Implements the natural-gradient policy update of Schulman et al. (2015):
//! each update maximizes the surrogate policy objective subject to a hard
//! bound on the mean KL divergence from the sampling policy. The search
//! direction is obtained by running matrix-free conjugate gradient on the
//! damped Fisher information matrix and the step length is set by a
//! backtracking line search that rejects any step violating the KL bound.
//! The value function is fit separately by stochastic gradient descent.
#![warn(clippy::cast_lossless)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::for_kv_map)] // part of warn(clippy::all), specifically style?
#![warn(clippy::missing_const_for_fn)] // has some false positives
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)] // also triggered by macro expansions
pub mod agent;
pub mod buffer;
pub mod distributions;
pub mod modules;
pub mod optimizers;
pub mod policy;
pub mod spaces;
#[cfg(test)]
pub(crate) mod testing;
pub mod utils;

pub use agent::{ConfigError, TrainStats, Trpo, TrpoConfig};
pub use buffer::{RolloutBatch, RolloutBuffer};
pub use policy::{ActorCriticPolicy, MlpPolicy, MlpPolicyConfig};
pub use spaces::ActionSpace;
