//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - builds plain config structs
//! - runs the fit pipeline or the simulator
//! - prints reports and writes optional exports

use clap::Parser;
use log::info;

use crate::cli::{Command, FitArgs, SimulateArgs};
use crate::domain::{FitConfig, Hyperparameters, Priors, SimulateConfig};
use crate::error::AppError;
use crate::io::export::{
    DiagnosticsDocument, write_diagnostics_json, write_pointwise_csv, write_replicates_csv, write_simulated,
};
use crate::io::priors::read_priors_json;

pub mod pipeline;

/// Entry point for the `vbg` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;
    let data = &run.ingest.data;

    println!(
        "{}",
        crate::report::format_run_summary(&run.ingest.stats, data, &run.fit, &run.diagnostics)
    );

    if let Some(path) = &config.export_pointwise {
        write_pointwise_csv(path, data, &run.diagnostics)?;
        info!("wrote {}", path.display());
    }
    if let Some(path) = &config.export_replicates {
        write_replicates_csv(path, &run.diagnostics.replicates)?;
        info!("wrote {}", path.display());
    }
    if let Some(path) = &config.export_diagnostics {
        let document = DiagnosticsDocument::new(&config, data, &run.fit, &run.diagnostics);
        write_diagnostics_json(path, &document)?;
        info!("wrote {}", path.display());
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulate_config_from_args(&args);
    let sim = crate::data::simulate_known(&config)?;
    write_simulated(&config.out_dir, &sim, &config)?;
    println!(
        "Simulated {} census and {} recapture rows across {} sites into {}",
        sim.data.census.len(),
        sim.data.recaptures.len(),
        sim.data.sites.len(),
        config.out_dir.display()
    );
    Ok(())
}

/// A single `--alpha` value is repeated for every age class.
fn expand_alpha(alpha: &[f64], n_ages: usize) -> Vec<f64> {
    match alpha {
        [a] => vec![*a; n_ages],
        _ => alpha.to_vec(),
    }
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let priors = match &args.priors {
        Some(path) => read_priors_json(path)?,
        None => Priors::default(),
    };
    let hyper = Hyperparameters {
        variant: args.variant,
        n_ages: args.n_ages,
        alpha: expand_alpha(&args.alpha, args.n_ages),
        eta: args.eta,
        prior_only: args.prior_only,
        use_covariates: args.use_covariates,
        priors,
    };
    hyper.validate()?;

    Ok(FitConfig {
        census_csv: args.census.clone(),
        recapture_csv: args.recaptures.clone(),
        covariates_csv: args.covariates.clone(),
        hyper,
        chains: args.chains,
        iterations: args.iterations,
        warmup: args.warmup,
        seed: args.seed,
        pit_reference_sets: args.pit_reference_sets,
        export_pointwise: args.export_pointwise.clone(),
        export_replicates: args.export_replicates.clone(),
        export_diagnostics: args.export_diagnostics.clone(),
    })
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        out_dir: args.out_dir.clone(),
        n_sites: args.sites,
        n_census: args.census,
        n_recaptures: args.recaptures,
        n_ages: args.n_ages,
        l0: args.l0,
        linf: args.linf,
        k: args.k,
        sigma_census: args.sigma_census,
        sigma_cmr: args.sigma_cmr,
        tau: args.tau,
        seed: args.seed,
    }
}
