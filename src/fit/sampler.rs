//! The seam between the model and whatever sampler draws from it.
//!
//! The model side implements [`LogDensity`] on an unconstrained `ℝ^d` vector.
//! A [`Sampler`] turns that into per-chain draws plus opaque per-chain
//! diagnostics. Chains never share state; they are concatenated only after all
//! of them have finished. A cancelled run yields no draws at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A log density on `ℝ^d`, safe to evaluate from several threads at once.
///
/// Points where the density is not finite must return `f64::NEG_INFINITY`;
/// samplers treat those as rejected proposals.
pub trait LogDensity: Sync {
    fn dim(&self) -> usize;
    fn log_density(&self, x: &[f64]) -> f64;
    /// A point with finite density to start chains from.
    fn initial_point(&self) -> Vec<f64>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("Sampling was cancelled; partial chains were discarded.")]
    Cancelled,
    #[error("No finite starting point found for chain {chain} after {attempts} attempts.")]
    NoFiniteStart { chain: usize, attempts: usize },
    #[error("Invalid sampler configuration: {0}")]
    Config(String),
}

/// Run-level sampler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub chains: usize,
    /// Post-warm-up draws kept per chain.
    pub iterations: usize,
    pub warmup: usize,
    pub seed: u64,
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.chains == 0 {
            return Err(SamplerError::Config("chains must be >= 1".to_string()));
        }
        if self.iterations == 0 {
            return Err(SamplerError::Config("iterations must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Per-chain sampler report, passed through to the caller uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDiagnostics {
    pub chain: usize,
    pub acceptance_rate: f64,
    /// Proposals whose log density was not finite.
    pub rejected_non_finite: usize,
    pub step_size: f64,
    pub draws: usize,
}

#[derive(Debug, Clone)]
pub struct SamplerOutput {
    /// `chains[c][i]` is the `i`-th kept unconstrained draw of chain `c`.
    pub chains: Vec<Vec<Vec<f64>>>,
    pub diagnostics: Vec<ChainDiagnostics>,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Sampler {
    fn sample<D: LogDensity>(
        &self,
        target: &D,
        config: &SamplerConfig,
        cancel: &CancelToken,
    ) -> Result<SamplerOutput, SamplerError>;
}
