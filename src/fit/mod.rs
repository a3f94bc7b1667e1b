//! Posterior sampling.
//!
//! Responsibilities:
//!
//! - define the sampler seam ([`LogDensity`], [`Sampler`], cancellation)
//! - provide a reference random-walk Metropolis sampler
//! - map unconstrained draws back to model parameters
//! - summarize chain convergence (split R-hat, ESS)

pub mod convergence;
pub mod metropolis;
pub mod posterior;
pub mod sampler;

pub use convergence::*;
pub use metropolis::*;
pub use posterior::*;
pub use sampler::*;
