//! Posterior summaries and formatted terminal output.
//!
//! Formatting lives here so the model, sampler and diagnostics code only
//! return data. Everything the report prints is also available to the JSON
//! export through [`FitSummary`].

use log::warn;
use serde::Serialize;

use crate::diagnostics::{DiagnosticsReport, K_THRESHOLD};
use crate::domain::{GrowthData, GrowthParam, ModelVariant, PosteriorSampleSet, SiteGrowth};
use crate::error::ModelError;
use crate::fit::{ChainDiagnostics, ParameterSummary, SamplerOutput, summarize};
use crate::io::ingest::DatasetStats;
use crate::models::{ModelComposer, predicts_shrinkage, site_growth};

/// Flagged observations printed in full.
const MAX_FLAGGED_ROWS: usize = 10;

/// Posterior mean and sd of one constrained global quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
}

/// Posterior-mean growth parameters of one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub id: String,
    pub l0: Option<f64>,
    pub linf: f64,
    pub k: f64,
}

impl SiteSummary {
    pub fn growth(&self) -> SiteGrowth {
        SiteGrowth {
            l0: self.l0,
            linf: self.linf,
            k: self.k,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub variant: ModelVariant,
    pub n_draws: usize,
    pub globals: Vec<GlobalSummary>,
    pub sites: Vec<SiteSummary>,
    /// Recaptures whose initial length is at or above the site's posterior-mean Linf.
    pub shrinkage: usize,
    pub convergence: Vec<ParameterSummary>,
    pub chains: Vec<ChainDiagnostics>,
}

fn mean_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Population growth values on the natural scale, observation sds and `tau`.
pub fn global_summaries(model: &ModelComposer<'_>, posterior: &PosteriorSampleSet) -> Vec<GlobalSummary> {
    let variant = model.hyper().variant;
    let draws = posterior.draws();
    let mut out = Vec::new();
    let mut push = |name: String, values: Vec<f64>| {
        let (mean, sd) = mean_sd(&values);
        out.push(GlobalSummary { name, mean, sd });
    };

    for &param in variant.params() {
        let values = draws
            .iter()
            .filter_map(|d| model.population_value(d, param))
            .collect();
        push(param.name().to_string(), values);
    }
    if variant.has_census() {
        let values = draws.iter().filter_map(|d| d.global.sigma_census).collect();
        push("sigma_census".to_string(), values);
    }
    push(
        "sigma_cmr".to_string(),
        draws.iter().map(|d| d.global.sigma_cmr).collect(),
    );
    for (col, &param) in variant.params().iter().enumerate() {
        let values = draws.iter().map(|d| d.global.tau[col]).collect();
        push(format!("tau[{}]", param.name()), values);
    }
    out
}

/// Posterior-mean `(L0, Linf, k)` for every site.
pub fn site_posterior_means(
    data: &GrowthData,
    variant: ModelVariant,
    posterior: &PosteriorSampleSet,
) -> Result<Vec<SiteSummary>, ModelError> {
    let n_sites = data.sites.len();
    let mut l0 = vec![0.0; n_sites];
    let mut linf = vec![0.0; n_sites];
    let mut k = vec![0.0; n_sites];
    for draw in posterior.draws() {
        for (s, g) in site_growth(draw, variant, &data.sites)?.iter().enumerate() {
            l0[s] += g.l0.unwrap_or(0.0);
            linf[s] += g.linf;
            k[s] += g.k;
        }
    }
    let n = posterior.len().max(1) as f64;
    let has_l0 = variant.column(GrowthParam::L0).is_some();
    Ok(data
        .sites
        .iter()
        .enumerate()
        .map(|(s, site)| SiteSummary {
            id: site.id.clone(),
            l0: has_l0.then(|| l0[s] / n),
            linf: linf[s] / n,
            k: k[s] / n,
        })
        .collect())
}

/// Count (and log) recaptures that the fitted curve says must shrink.
///
/// These rows stay in the likelihood unchanged.
pub fn count_shrinkage(data: &GrowthData, sites: &[SiteSummary]) -> usize {
    let mut count = 0;
    for (i, r) in data.recaptures.iter().enumerate() {
        let Some(site) = sites.get(r.site()) else {
            continue;
        };
        if predicts_shrinkage(r, &site.growth()) {
            count += 1;
            warn!(
                "recapture {i} (site {}): initial length {:.2} >= posterior-mean Linf {:.2}; expected increment is negative",
                site.id,
                r.initial_length(),
                site.linf
            );
        }
    }
    count
}

pub fn summarize_fit(
    model: &ModelComposer<'_>,
    posterior: &PosteriorSampleSet,
    output: &SamplerOutput,
) -> Result<FitSummary, ModelError> {
    let variant = model.hyper().variant;
    let sites = site_posterior_means(model.data(), variant, posterior)?;
    let shrinkage = count_shrinkage(model.data(), &sites);
    let convergence = summarize(&model.layout().names(), &output.chains);
    for p in convergence.iter().filter(|p| !p.converged()) {
        warn!(
            "{}: R-hat {} above threshold; chains have not mixed",
            p.name,
            fmt_opt(p.rhat)
        );
    }
    Ok(FitSummary {
        variant,
        n_draws: posterior.len(),
        globals: global_summaries(model, posterior),
        sites,
        shrinkage,
        convergence,
        chains: output.diagnostics.clone(),
    })
}

/// Format the full run summary: data, posterior, LOO, calibration, sampler.
pub fn format_run_summary(
    stats: &DatasetStats,
    data: &GrowthData,
    fit: &FitSummary,
    diagnostics: &DiagnosticsReport,
) -> String {
    let mut out = String::new();

    out.push_str("=== vbg - Von Bertalanffy growth fit ===\n");
    out.push_str(&format!("Model: {:?} | draws: {}\n", fit.variant, fit.n_draws));
    out.push_str(&format!(
        "Data: sites={} | census={} | recaptures={} | length=[{:.2}, {:.2}]\n",
        stats.n_sites, stats.n_census, stats.n_recaptures, stats.length_min, stats.length_max
    ));
    if let (Some(lo), Some(hi)) = (stats.days_min, stats.days_max) {
        out.push_str(&format!("Days at liberty: [{lo:.0}, {hi:.0}]\n"));
    }

    out.push_str("\nGlobal parameters (posterior mean, sd):\n");
    for g in &fit.globals {
        out.push_str(&format!("  {:<14} {:>10.4} {:>10.4}\n", g.name, g.mean, g.sd));
    }

    out.push_str("\nSites (posterior-mean growth):\n");
    out.push_str(&format!("  {:<12} {:>10} {:>10} {:>8}\n", "site", "L0", "Linf", "k"));
    for s in &fit.sites {
        out.push_str(&format!(
            "  {:<12} {:>10} {:>10.2} {:>8.4}\n",
            s.id,
            s.l0.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string()),
            s.linf,
            s.k
        ));
    }
    if fit.shrinkage > 0 {
        out.push_str(&format!(
            "  {} recapture(s) start at or above their site's Linf\n",
            fit.shrinkage
        ));
    }

    let loo = &diagnostics.loo;
    out.push_str("\nPSIS-LOO:\n");
    out.push_str(&format!(
        "  elpd_loo = {:.2} (se {:.2}) | p_loo = {:.2} (se {:.2}) | looic = {:.2}\n",
        loo.elpd_loo, loo.se_elpd_loo, loo.p_loo, loo.se_p_loo, loo.looic
    ));
    for (category, count) in loo.category_counts() {
        out.push_str(&format!("  {:<24} {count}\n", category.label()));
    }
    if !loo.flagged.is_empty() {
        out.push_str(&format!(
            "  {} observation(s) with k > {K_THRESHOLD}:\n",
            loo.flagged.len()
        ));
        for &i in loo.flagged.iter().take(MAX_FLAGGED_ROWS) {
            if let Some((kind, site, value)) = data.observation(i) {
                let site_id = data.sites.get(site).map(|s| s.id.as_str()).unwrap_or("?");
                out.push_str(&format!(
                    "    #{i:<5} {kind:?} site={site_id} y={value:.2} k={:.3}\n",
                    loo.pointwise[i].pareto_k
                ));
            }
        }
        if loo.flagged.len() > MAX_FLAGGED_ROWS {
            out.push_str(&format!("    ... and {} more\n", loo.flagged.len() - MAX_FLAGGED_ROWS));
        }
    }

    let pit = &diagnostics.pit;
    out.push_str("\nLOO-PIT calibration:\n");
    out.push_str(&format!(
        "  KS D = {:.4} | p = {:.4} | ECDF outside 95% band at {}/{} grid points\n",
        pit.ks_statistic,
        pit.ks_p_value,
        pit.curve.outside_band(),
        pit.curve.grid.len()
    ));

    out.push_str("\nSampler:\n");
    for c in &fit.chains {
        out.push_str(&format!(
            "  chain {}: accept={:.3} step={:.4} draws={} rejected_non_finite={}\n",
            c.chain, c.acceptance_rate, c.step_size, c.draws, c.rejected_non_finite
        ));
    }
    let unconverged: Vec<&ParameterSummary> = fit.convergence.iter().filter(|p| !p.converged()).collect();
    if unconverged.is_empty() {
        out.push_str("  all split R-hat values within threshold\n");
    } else {
        out.push_str(&format!("  {} parameter(s) with high R-hat:\n", unconverged.len()));
        for p in unconverged.iter().take(MAX_FLAGGED_ROWS) {
            out.push_str(&format!(
                "    {:<20} R-hat={} ESS={}\n",
                p.name,
                fmt_opt(p.rhat),
                fmt_opt(p.ess)
            ));
        }
    }

    out
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RecaptureObservation, Site, Sites};
    use approx::assert_abs_diff_eq;

    fn one_site_data(initials: &[f64]) -> GrowthData {
        let sites = Sites::new(vec![Site {
            id: "A".to_string(),
            covariates: None,
        }])
        .unwrap();
        let recaptures = initials
            .iter()
            .map(|&l| RecaptureObservation::new(0, l, 100.0, l + 1.0).unwrap())
            .collect();
        GrowthData::new(sites, Vec::new(), recaptures).unwrap()
    }

    #[test]
    fn shrinkage_counts_initial_lengths_at_or_above_linf() {
        let data = one_site_data(&[50.0, 150.0, 200.0]);
        let sites = vec![SiteSummary {
            id: "A".to_string(),
            l0: None,
            linf: 150.0,
            k: 0.3,
        }];
        assert_eq!(count_shrinkage(&data, &sites), 2);
    }

    #[test]
    fn mean_sd_uses_sample_variance() {
        let (m, s) = mean_sd(&[1.0, 2.0, 3.0, 4.0]);
        assert_abs_diff_eq!(m, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s, (5.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert!(mean_sd(&[]).0.is_nan());
    }
}
