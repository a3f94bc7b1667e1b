//! Command-line parsing for the growth model fitter.
//!
//! Argument parsing and command dispatch stay separate from the model and
//! diagnostics code: this module only produces typed argument structs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::ModelVariant;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "vbg", version, about = "Hierarchical von Bertalanffy growth model with PSIS-LOO diagnostics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the model to census and/or recapture CSVs, print diagnostics, optionally export.
    Fit(FitArgs),
    /// Simulate a dataset from known growth parameters.
    Simulate(SimulateArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Census CSV (`site,length`).
    #[arg(long, value_name = "CSV")]
    pub census: Option<PathBuf>,

    /// Recapture CSV (`site,initial_length,days,recapture_length`).
    #[arg(long, value_name = "CSV")]
    pub recaptures: Option<PathBuf>,

    /// Site covariate CSV (`site,temperature,effort`).
    #[arg(long, value_name = "CSV")]
    pub covariates: Option<PathBuf>,

    /// Model variant.
    #[arg(long, value_enum, default_value_t = ModelVariant::Integrated)]
    pub variant: ModelVariant,

    /// Number of age classes in the census mixture.
    #[arg(long, default_value_t = 5)]
    pub n_ages: usize,

    /// Dirichlet concentration: one value for every age class, or one per class.
    #[arg(long, value_delimiter = ',', default_value = "1.0")]
    pub alpha: Vec<f64>,

    /// LKJ concentration of the site-effect correlation.
    #[arg(long, default_value_t = 2.0)]
    pub eta: f64,

    /// Sample from the prior only (likelihood switched off).
    #[arg(long)]
    pub prior_only: bool,

    /// Regress log(Linf) and log(k) on standardized site covariates.
    #[arg(long)]
    pub use_covariates: bool,

    /// Prior hyperparameter JSON (any subset of fields).
    #[arg(long, value_name = "JSON")]
    pub priors: Option<PathBuf>,

    /// Number of chains.
    #[arg(long, default_value_t = 4)]
    pub chains: usize,

    /// Retained iterations per chain.
    #[arg(long, default_value_t = 1000)]
    pub iterations: usize,

    /// Warmup (adaptation) iterations per chain.
    #[arg(long, default_value_t = 1000)]
    pub warmup: usize,

    /// Random seed for sampling and predictive replicates.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Uniform reference sets for the LOO-PIT ECDF band.
    #[arg(long, default_value_t = 1000)]
    pub pit_reference_sets: usize,

    /// Export per-observation LOO and PIT values to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_pointwise: Option<PathBuf>,

    /// Export the posterior-predictive replicate matrix to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_replicates: Option<PathBuf>,

    /// Export diagnostics (LOO, calibration, sampler, convergence) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_diagnostics: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output directory for the generated files.
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    #[arg(long, default_value_t = 8)]
    pub sites: usize,

    /// Census rows.
    #[arg(long, default_value_t = 400)]
    pub census: usize,

    /// Recapture rows.
    #[arg(long, default_value_t = 200)]
    pub recaptures: usize,

    #[arg(long, default_value_t = 5)]
    pub n_ages: usize,

    /// Length at age class 1.
    #[arg(long, default_value_t = 25.0)]
    pub l0: f64,

    /// Asymptotic length.
    #[arg(long, default_value_t = 250.0)]
    pub linf: f64,

    /// Growth rate (per year).
    #[arg(long, default_value_t = 0.4)]
    pub k: f64,

    #[arg(long, default_value_t = 0.1)]
    pub sigma_census: f64,

    #[arg(long, default_value_t = 0.05)]
    pub sigma_cmr: f64,

    /// Between-site sd of every log growth parameter.
    #[arg(long, default_value_t = 0.1)]
    pub tau: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_defaults_and_alpha_list() {
        let cli = Cli::parse_from(["vbg", "fit", "--census", "c.csv", "--alpha", "1,2,3", "--n-ages", "3"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.alpha, vec![1.0, 2.0, 3.0]);
        assert_eq!(args.variant, ModelVariant::Integrated);
        assert_eq!(args.chains, 4);
        assert!(args.recaptures.is_none());
    }

    #[test]
    fn recapture_only_variant_parses() {
        let cli = Cli::parse_from(["vbg", "fit", "--recaptures", "r.csv", "--variant", "recapture-only"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.variant, ModelVariant::RecaptureOnly);
    }

    #[test]
    fn simulate_l0_help_names_the_first_age_class() {
        use clap::CommandFactory;

        let cmd = Cli::command();
        let simulate = cmd.find_subcommand("simulate").unwrap();
        let l0 = simulate.get_arguments().find(|a| a.get_id() == "l0").unwrap();
        let help = l0.get_help().unwrap().to_string();
        assert!(help.starts_with("Length at age class 1"), "{help}");
    }
}
