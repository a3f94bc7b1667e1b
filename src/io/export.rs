//! Exports: pointwise diagnostics CSV, replicate matrix CSV, diagnostics JSON
//! and the simulated dataset files written by `vbg simulate`.
//!
//! CSV files are meant to be easy to consume in spreadsheets or downstream
//! scripts; the JSON document mirrors the terminal report.

use std::fs::{self, File};
use std::path::Path;

use chrono::Utc;
use nalgebra::DMatrix;
use serde::Serialize;

use crate::data::SimulatedData;
use crate::diagnostics::{CalibrationCurve, DiagnosticsReport, ParetoKCategory};
use crate::domain::{FitConfig, GrowthData, ObservationKind, SimulateConfig};
use crate::error::AppError;
use crate::report::FitSummary;

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

/// CSV writer that quotes fields (site ids may contain commas).
fn csv_writer(path: &Path, what: &str) -> Result<csv::Writer<File>, AppError> {
    Ok(csv::Writer::from_writer(create(path, what)?))
}

fn write_err<E: std::fmt::Display>(what: &str) -> impl Fn(E) -> AppError + '_ {
    move |e| AppError::new(2, format!("Failed to write {what}: {e}"))
}

/// One row per observation: LOO terms, Pareto `k` and LOO-PIT.
pub fn write_pointwise_csv(path: &Path, data: &GrowthData, diagnostics: &DiagnosticsReport) -> Result<(), AppError> {
    let mut wtr = csv_writer(path, "pointwise CSV")?;
    let what = "pointwise CSV";

    wtr.write_record([
        "observation",
        "kind",
        "site",
        "observed",
        "lpd",
        "elpd_loo",
        "p_loo",
        "pareto_k",
        "k_category",
        "loo_pit",
    ])
    .map_err(write_err(what))?;
    for (i, p) in diagnostics.loo.pointwise.iter().enumerate() {
        let Some((kind, site, observed)) = data.observation(i) else {
            continue;
        };
        let kind = match kind {
            ObservationKind::Census => "census",
            ObservationKind::Recapture => "recapture",
        };
        let site_id = data.sites.get(site).map(|s| s.id.as_str()).unwrap_or_default();
        let category = match p.category {
            ParetoKCategory::Good => "good",
            ParetoKCategory::Ok => "ok",
            ParetoKCategory::Bad => "bad",
            ParetoKCategory::VeryBad => "very_bad",
        };
        let pit = diagnostics.pit.values.get(i).copied().unwrap_or(f64::NAN);
        wtr.write_record([
            i.to_string(),
            kind.to_string(),
            site_id.to_string(),
            format!("{observed:.6}"),
            format!("{:.6}", p.lpd),
            format!("{:.6}", p.elpd_loo),
            format!("{:.6}", p.p_loo),
            format!("{:.4}", p.pareto_k),
            category.to_string(),
            format!("{pit:.6}"),
        ])
        .map_err(write_err(what))?;
    }
    wtr.flush().map_err(write_err(what))
}

/// Replicates as a wide table: one row per draw, one column per observation.
pub fn write_replicates_csv(path: &Path, replicates: &DMatrix<f64>) -> Result<(), AppError> {
    let mut wtr = csv_writer(path, "replicates CSV")?;
    let what = "replicates CSV";

    let header = std::iter::once("draw".to_string()).chain((0..replicates.ncols()).map(|j| format!("y{j}")));
    wtr.write_record(header).map_err(write_err(what))?;
    for (d, row) in replicates.row_iter().enumerate() {
        let record = std::iter::once(d.to_string()).chain(row.iter().map(|v| format!("{v:.6}")));
        wtr.write_record(record).map_err(write_err(what))?;
    }
    wtr.flush().map_err(write_err(what))
}

#[derive(Debug, Serialize)]
pub struct RunSettings {
    pub chains: usize,
    pub iterations: usize,
    pub warmup: usize,
    pub seed: u64,
    pub n_ages: usize,
    pub eta: f64,
    pub prior_only: bool,
    pub use_covariates: bool,
}

#[derive(Debug, Serialize)]
pub struct LooTotals {
    pub elpd_loo: f64,
    pub se_elpd_loo: f64,
    pub p_loo: f64,
    pub se_p_loo: f64,
    pub looic: f64,
    pub k_counts: Vec<(ParetoKCategory, usize)>,
}

#[derive(Debug, Serialize)]
pub struct FlaggedObservation {
    pub observation: usize,
    pub kind: ObservationKind,
    pub site: String,
    pub observed: f64,
    pub pareto_k: f64,
}

#[derive(Debug, Serialize)]
pub struct PitExport<'a> {
    pub ks_statistic: f64,
    pub ks_p_value: f64,
    pub outside_band: usize,
    pub curve: &'a CalibrationCurve,
}

/// Top-level diagnostics JSON document.
#[derive(Debug, Serialize)]
pub struct DiagnosticsDocument<'a> {
    pub tool: &'static str,
    pub created_at: String,
    pub settings: RunSettings,
    pub n_observations: usize,
    pub fit: &'a FitSummary,
    pub loo: LooTotals,
    pub flagged: Vec<FlaggedObservation>,
    pub pit: PitExport<'a>,
}

impl<'a> DiagnosticsDocument<'a> {
    pub fn new(config: &FitConfig, data: &GrowthData, fit: &'a FitSummary, diagnostics: &'a DiagnosticsReport) -> Self {
        let loo = &diagnostics.loo;
        let flagged = loo
            .flagged
            .iter()
            .filter_map(|&i| {
                let (kind, site, observed) = data.observation(i)?;
                Some(FlaggedObservation {
                    observation: i,
                    kind,
                    site: data.sites.get(site)?.id.clone(),
                    observed,
                    pareto_k: loo.pointwise[i].pareto_k,
                })
            })
            .collect();
        Self {
            tool: "vbg",
            created_at: Utc::now().to_rfc3339(),
            settings: RunSettings {
                chains: config.chains,
                iterations: config.iterations,
                warmup: config.warmup,
                seed: config.seed,
                n_ages: config.hyper.n_ages,
                eta: config.hyper.eta,
                prior_only: config.hyper.prior_only,
                use_covariates: config.hyper.use_covariates,
            },
            n_observations: data.n_observations(),
            fit,
            loo: LooTotals {
                elpd_loo: loo.elpd_loo,
                se_elpd_loo: loo.se_elpd_loo,
                p_loo: loo.p_loo,
                se_p_loo: loo.se_p_loo,
                looic: loo.looic,
                k_counts: loo.category_counts().to_vec(),
            },
            flagged,
            pit: PitExport {
                ks_statistic: diagnostics.pit.ks_statistic,
                ks_p_value: diagnostics.pit.ks_p_value,
                outside_band: diagnostics.pit.curve.outside_band(),
                curve: &diagnostics.pit.curve,
            },
        }
    }
}

pub fn write_diagnostics_json(path: &Path, document: &DiagnosticsDocument<'_>) -> Result<(), AppError> {
    let file = create(path, "diagnostics JSON")?;
    // Non-finite floats (k = inf) serialize as JSON null.
    serde_json::to_writer_pretty(file, document)
        .map_err(|e| AppError::new(2, format!("Failed to write diagnostics JSON: {e}")))
}

#[derive(Debug, Serialize)]
struct SiteTruth<'a> {
    id: &'a str,
    l0: Option<f64>,
    linf: f64,
    k: f64,
    weights: &'a [f64],
}

#[derive(Debug, Serialize)]
struct SimulationTruth<'a> {
    tool: &'static str,
    created_at: String,
    seed: u64,
    l0: f64,
    linf: f64,
    k: f64,
    sigma_census: f64,
    sigma_cmr: f64,
    tau: f64,
    sites: Vec<SiteTruth<'a>>,
}

/// Write `census.csv`, `recaptures.csv`, `covariates.csv` and `truth.json`.
///
/// Covariates are written on their raw scale; ingest standardizes them again.
pub fn write_simulated(out_dir: &Path, sim: &SimulatedData, config: &SimulateConfig) -> Result<(), AppError> {
    fs::create_dir_all(out_dir).map_err(|e| {
        AppError::new(2, format!("Failed to create output directory '{}': {e}", out_dir.display()))
    })?;
    let data = &sim.data;
    let site_id = |s: usize| data.sites.get(s).map(|site| site.id.as_str()).unwrap_or_default();

    let what = "census CSV";
    let mut wtr = csv_writer(&out_dir.join("census.csv"), what)?;
    wtr.write_record(["site", "length"]).map_err(write_err(what))?;
    for c in &data.census {
        wtr.write_record([site_id(c.site()).to_string(), format!("{:.4}", c.length())])
            .map_err(write_err(what))?;
    }
    wtr.flush().map_err(write_err(what))?;

    let what = "recaptures CSV";
    let mut wtr = csv_writer(&out_dir.join("recaptures.csv"), what)?;
    wtr.write_record(["site", "initial_length", "days", "recapture_length"])
        .map_err(write_err(what))?;
    for r in &data.recaptures {
        wtr.write_record([
            site_id(r.site()).to_string(),
            format!("{:.4}", r.initial_length()),
            r.days().to_string(),
            format!("{:.4}", r.recapture_length()),
        ])
        .map_err(write_err(what))?;
    }
    wtr.flush().map_err(write_err(what))?;

    let what = "covariates CSV";
    let mut wtr = csv_writer(&out_dir.join("covariates.csv"), what)?;
    wtr.write_record(["site", "temperature", "effort"]).map_err(write_err(what))?;
    for (s, c) in sim.raw_covariates.iter().enumerate() {
        wtr.write_record([
            site_id(s).to_string(),
            format!("{:.6}", c.temperature),
            format!("{:.6}", c.effort),
        ])
        .map_err(write_err(what))?;
    }
    wtr.flush().map_err(write_err(what))?;

    let truth = SimulationTruth {
        tool: "vbg",
        created_at: Utc::now().to_rfc3339(),
        seed: config.seed,
        l0: config.l0,
        linf: config.linf,
        k: config.k,
        sigma_census: config.sigma_census,
        sigma_cmr: config.sigma_cmr,
        tau: config.tau,
        sites: sim
            .site_truth
            .iter()
            .zip(&sim.weights)
            .enumerate()
            .map(|(s, (g, w))| SiteTruth {
                id: site_id(s),
                l0: g.l0,
                linf: g.linf,
                k: g.k,
                weights: w.as_slice(),
            })
            .collect(),
    };
    let file = create(&out_dir.join("truth.json"), "truth JSON")?;
    serde_json::to_writer_pretty(file, &truth)
        .map_err(|e| AppError::new(2, format!("Failed to write truth JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicates_csv_is_one_row_per_draw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reps.csv");
        let reps = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        write_replicates_csv(&path, &reps).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "draw,y0,y1,y2");
        assert_eq!(lines[2], "1,4.000000,5.000000,6.000000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn site_ids_with_commas_survive_a_reload() {
        use crate::data::simulate_known;
        use crate::domain::{Hyperparameters, ModelVariant, Priors, Site, Sites};
        use crate::io::load_growth_data;

        let dir = tempfile::tempdir().unwrap();
        let config = SimulateConfig {
            out_dir: dir.path().to_path_buf(),
            n_sites: 2,
            n_census: 10,
            n_recaptures: 6,
            n_ages: 2,
            l0: 25.0,
            linf: 250.0,
            k: 0.4,
            sigma_census: 0.1,
            sigma_cmr: 0.05,
            tau: 0.1,
            seed: 3,
        };
        let mut sim = simulate_known(&config).unwrap();
        let renamed = ["Lake, North", "River \"East\""]
            .iter()
            .zip(sim.data.sites.iter())
            .map(|(id, site)| Site {
                id: id.to_string(),
                covariates: site.covariates,
            })
            .collect();
        sim.data.sites = Sites::new(renamed).unwrap();
        write_simulated(dir.path(), &sim, &config).unwrap();

        let fit = FitConfig {
            census_csv: Some(dir.path().join("census.csv")),
            recapture_csv: Some(dir.path().join("recaptures.csv")),
            covariates_csv: Some(dir.path().join("covariates.csv")),
            hyper: Hyperparameters {
                variant: ModelVariant::Integrated,
                n_ages: 2,
                alpha: vec![1.0; 2],
                eta: 2.0,
                prior_only: false,
                use_covariates: false,
                priors: Priors::default(),
            },
            chains: 1,
            iterations: 1,
            warmup: 0,
            seed: 0,
            pit_reference_sets: 1,
            export_pointwise: None,
            export_replicates: None,
            export_diagnostics: None,
        };
        let loaded = load_growth_data(&fit).unwrap().data;
        let ids: Vec<&str> = loaded.sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["Lake, North", "River \"East\""]);
        assert_eq!(loaded.census.len(), 10);
        assert_eq!(loaded.recaptures.len(), 6);
    }

    #[test]
    fn create_failure_is_reported_with_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let err = write_replicates_csv(&path, &DMatrix::zeros(1, 1)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("out.csv"));
    }
}
