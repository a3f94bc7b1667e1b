//! End to end: simulate CSVs, run the fit pipeline, write every export.

use std::fs;
use std::path::Path;

use vbgrowth::app::pipeline::{run_fit, run_fit_with};
use vbgrowth::data::simulate_known;
use vbgrowth::domain::{FitConfig, Hyperparameters, ModelVariant, Priors, SimulateConfig};
use vbgrowth::fit::{CancelToken, MetropolisSampler};
use vbgrowth::io::{
    DiagnosticsDocument, write_diagnostics_json, write_pointwise_csv, write_replicates_csv, write_simulated,
};

fn simulate_into(dir: &Path) {
    let config = SimulateConfig {
        out_dir: dir.to_path_buf(),
        n_sites: 4,
        n_census: 120,
        n_recaptures: 60,
        n_ages: 3,
        l0: 25.0,
        linf: 250.0,
        k: 0.4,
        sigma_census: 0.12,
        sigma_cmr: 0.05,
        tau: 0.1,
        seed: 99,
    };
    let sim = simulate_known(&config).unwrap();
    write_simulated(dir, &sim, &config).unwrap();
}

fn fit_config(dir: &Path, variant: ModelVariant, use_covariates: bool) -> FitConfig {
    FitConfig {
        census_csv: (variant == ModelVariant::Integrated).then(|| dir.join("census.csv")),
        recapture_csv: Some(dir.join("recaptures.csv")),
        covariates_csv: Some(dir.join("covariates.csv")),
        hyper: Hyperparameters {
            variant,
            n_ages: 3,
            alpha: vec![1.0; 3],
            eta: 2.0,
            prior_only: false,
            use_covariates,
            priors: Priors::default(),
        },
        chains: 2,
        iterations: 300,
        warmup: 300,
        seed: 5,
        pit_reference_sets: 200,
        export_pointwise: None,
        export_replicates: None,
        export_diagnostics: None,
    }
}

#[test]
fn integrated_fit_produces_complete_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    simulate_into(dir.path());
    let config = fit_config(dir.path(), ModelVariant::Integrated, true);

    let run = run_fit(&config).unwrap();
    let n_obs = 180;
    assert_eq!(run.posterior.len(), 600);
    assert_eq!(run.posterior.n_chains(), 2);
    assert_eq!(run.diagnostics.log_lik.shape(), (600, n_obs));
    assert_eq!(run.diagnostics.replicates.shape(), (600, n_obs));
    assert_eq!(run.diagnostics.loo.pointwise.len(), n_obs);
    assert!(run.diagnostics.loo.elpd_loo.is_finite());
    assert!(run.diagnostics.pit.values.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(run.fit.sites.len(), 4);
    assert!(run.fit.sites.iter().all(|s| s.l0.is_some() && s.linf > 0.0 && s.k > 0.0));
    assert_eq!(run.fit.chains.len(), 2);
    assert_eq!(run.fit.convergence.len(), run.sampler.chains[0][0].len());

    let pointwise = dir.path().join("pointwise.csv");
    let replicates = dir.path().join("replicates.csv");
    let diagnostics = dir.path().join("diagnostics.json");
    write_pointwise_csv(&pointwise, &run.ingest.data, &run.diagnostics).unwrap();
    write_replicates_csv(&replicates, &run.diagnostics.replicates).unwrap();
    let document = DiagnosticsDocument::new(&config, &run.ingest.data, &run.fit, &run.diagnostics);
    write_diagnostics_json(&diagnostics, &document).unwrap();

    let text = fs::read_to_string(&pointwise).unwrap();
    assert_eq!(text.lines().count(), n_obs + 1);
    assert!(text.lines().nth(1).unwrap().contains(",census,site01,"));
    assert_eq!(fs::read_to_string(&replicates).unwrap().lines().count(), 601);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&diagnostics).unwrap()).unwrap();
    assert_eq!(json["tool"], "vbg");
    assert_eq!(json["n_observations"], n_obs);
    assert_eq!(json["fit"]["sites"].as_array().unwrap().len(), 4);
    assert!(json["pit"]["curve"]["grid"].as_array().unwrap().len() == 101);
}

#[test]
fn recapture_only_fit_runs_without_census() {
    let dir = tempfile::tempdir().unwrap();
    simulate_into(dir.path());
    let config = fit_config(dir.path(), ModelVariant::RecaptureOnly, false);

    let run = run_fit(&config).unwrap();
    assert_eq!(run.diagnostics.loo.pointwise.len(), 60);
    assert!(run.fit.sites.iter().all(|s| s.l0.is_none()));
    assert!(run.fit.globals.iter().all(|g| g.name != "sigma_census"));
}

#[test]
fn cancelled_run_returns_exit_code_five() {
    let dir = tempfile::tempdir().unwrap();
    simulate_into(dir.path());
    let config = fit_config(dir.path(), ModelVariant::Integrated, false);

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = run_fit_with(&config, &MetropolisSampler::default(), &cancel).unwrap_err();
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn recapture_only_variant_rejects_census_rows() {
    let dir = tempfile::tempdir().unwrap();
    simulate_into(dir.path());
    let mut config = fit_config(dir.path(), ModelVariant::RecaptureOnly, false);
    config.census_csv = Some(dir.path().join("census.csv"));

    let err = run_fit(&config).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
