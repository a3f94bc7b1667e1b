//! Posterior predictive diagnostics.
//!
//! Runs over a fixed posterior sample set, in order:
//!
//! 1. pointwise log-likelihood matrix
//! 2. posterior-predictive replicates
//! 3. PSIS-LOO (per-observation Pareto `k`, totals with standard errors)
//! 4. LOO-PIT calibration

pub mod loo;
pub mod pit;
pub mod pointwise;
pub mod psis;

pub use loo::*;
pub use pit::*;
pub use pointwise::*;
pub use psis::*;

use log::info;
use nalgebra::DMatrix;

use crate::domain::PosteriorSampleSet;
use crate::error::ModelError;
use crate::models::ModelComposer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    pub seed: u64,
    pub pit_reference_sets: usize,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub log_lik: DMatrix<f64>,
    pub replicates: DMatrix<f64>,
    pub loo: LooResult,
    pub pit: PitSummary,
}

pub fn run_diagnostics(
    model: &ModelComposer<'_>,
    posterior: &PosteriorSampleSet,
    config: &DiagnosticsConfig,
) -> Result<DiagnosticsReport, ModelError> {
    if posterior.is_empty() {
        return Err(ModelError::DimensionMismatch {
            what: "posterior draws",
            expected: 1,
            got: 0,
        });
    }

    let log_lik = log_likelihood_matrix(model, posterior)?;
    info!(
        "pointwise log-likelihood: {} draws x {} observations",
        log_lik.nrows(),
        log_lik.ncols()
    );
    let replicates = replicate_matrix(model, posterior, config.seed)?;

    let loo = psis_loo(&log_lik);
    info!(
        "elpd_loo = {:.2} (se {:.2}), p_loo = {:.2}, {} flagged",
        loo.elpd_loo,
        loo.se_elpd_loo,
        loo.p_loo,
        loo.flagged.len()
    );

    let observed = model.data().observed_values();
    let values = loo_pit(&observed, &replicates, &loo.weights);
    let pit = summarize_pit(values, config.pit_reference_sets, config.seed ^ 0x5049_5400);
    info!(
        "LOO-PIT KS D = {:.3}, p = {:.3}",
        pit.ks_statistic, pit.ks_p_value
    );

    Ok(DiagnosticsReport {
        log_lik,
        replicates,
        loo,
        pit,
    })
}
