//! The fit pipeline shared by `vbg fit` and the integration tests.
//!
//! ingest -> compose model -> sample -> constrain draws -> convergence and
//! posterior summaries -> pointwise diagnostics (LOO, LOO-PIT)
//!
//! The front-end only decides what to print and export.

use log::info;

use crate::diagnostics::{DiagnosticsConfig, DiagnosticsReport, run_diagnostics};
use crate::domain::{FitConfig, PosteriorSampleSet};
use crate::error::AppError;
use crate::fit::{CancelToken, MetropolisSampler, Sampler, SamplerConfig, SamplerOutput, posterior_from_output};
use crate::io::ingest::{IngestedData, load_growth_data};
use crate::models::ModelComposer;
use crate::report::{FitSummary, summarize_fit};

/// All computed outputs of a single `vbg fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub sampler: SamplerOutput,
    pub posterior: PosteriorSampleSet,
    pub fit: FitSummary,
    pub diagnostics: DiagnosticsReport,
}

/// Execute the full pipeline with the built-in sampler.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    run_fit_with(config, &MetropolisSampler::default(), &CancelToken::new())
}

/// Execute the full pipeline with any sampler.
///
/// Cancelling `cancel` aborts sampling; no partial results are returned.
pub fn run_fit_with<S: Sampler>(config: &FitConfig, sampler: &S, cancel: &CancelToken) -> Result<RunOutput, AppError> {
    let ingest = load_growth_data(config)?;
    let model = ModelComposer::new(&ingest.data, &config.hyper)?;
    info!(
        "model {:?}: {} unconstrained parameters",
        config.hyper.variant,
        model.layout().dim()
    );

    let sampler_config = SamplerConfig {
        chains: config.chains,
        iterations: config.iterations,
        warmup: config.warmup,
        seed: config.seed,
    };
    let output = sampler.sample(&model, &sampler_config, cancel)?;
    let posterior = posterior_from_output(model.layout(), &output)?;
    info!(
        "sampling done: {} draws from {} chains",
        posterior.len(),
        posterior.n_chains()
    );

    let fit = summarize_fit(&model, &posterior, &output)?;
    let diagnostics = run_diagnostics(
        &model,
        &posterior,
        &DiagnosticsConfig {
            seed: config.seed,
            pit_reference_sets: config.pit_reference_sets,
        },
    )?;

    Ok(RunOutput {
        ingest,
        sampler: output,
        posterior,
        fit,
        diagnostics,
    })
}
