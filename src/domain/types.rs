//! Shared domain types.
//!
//! Everything here is write-once: observations, sites and parameter values are
//! validated at construction and never mutated by the likelihood or diagnostics
//! code afterwards.

use std::collections::HashMap;
use std::path::PathBuf;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Tolerance used when checking that simplexes sum to one and that correlation
/// Cholesky rows have unit norm.
pub const STRUCTURE_TOL: f64 = 1e-8;

/// Growth parameters that carry a site-level random effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthParam {
    L0,
    Linf,
    K,
}

impl GrowthParam {
    pub fn name(self) -> &'static str {
        match self {
            GrowthParam::L0 => "L0",
            GrowthParam::Linf => "Linf",
            GrowthParam::K => "k",
        }
    }
}

/// Which data sources the model is built for.
///
/// The recapture-only variant drops L0 (not identified without census lengths),
/// the census likelihood and the mixture weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelVariant {
    Integrated,
    RecaptureOnly,
}

impl ModelVariant {
    pub fn params(self) -> &'static [GrowthParam] {
        match self {
            ModelVariant::Integrated => &[GrowthParam::L0, GrowthParam::Linf, GrowthParam::K],
            ModelVariant::RecaptureOnly => &[GrowthParam::Linf, GrowthParam::K],
        }
    }

    pub fn n_params(self) -> usize {
        self.params().len()
    }

    /// Column of `param` in site-by-parameter matrices, if modeled.
    pub fn column(self, param: GrowthParam) -> Option<usize> {
        self.params().iter().position(|&p| p == param)
    }

    pub fn has_census(self) -> bool {
        matches!(self, ModelVariant::Integrated)
    }
}

/// Standardized site covariates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteCovariates {
    pub temperature: f64,
    pub effort: f64,
}

impl SiteCovariates {
    /// Design row `[temperature, effort, temperature × effort]`.
    pub fn design(&self) -> [f64; 3] {
        [self.temperature, self.effort, self.temperature * self.effort]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: String,
    pub covariates: Option<SiteCovariates>,
}

/// Ordered, immutable collection of sites with id lookup.
#[derive(Debug, Clone, Default)]
pub struct Sites {
    sites: Vec<Site>,
    by_id: HashMap<String, usize>,
}

impl Sites {
    pub fn new(sites: Vec<Site>) -> Result<Self, ModelError> {
        let mut by_id = HashMap::with_capacity(sites.len());
        for (idx, site) in sites.iter().enumerate() {
            if by_id.insert(site.id.clone(), idx).is_some() {
                return Err(ModelError::DuplicateSite(site.id.clone()));
            }
        }
        Ok(Self { sites, by_id })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Site> {
        self.sites.get(idx)
    }

    pub fn index_of(&self, id: &str) -> Result<usize, ModelError> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| ModelError::UnknownSite(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }

    /// True when every site carries covariates.
    pub fn all_have_covariates(&self) -> bool {
        !self.sites.is_empty() && self.sites.iter().all(|s| s.covariates.is_some())
    }
}

fn check_length(what: &'static str, value: f64) -> Result<f64, ModelError> {
    if !value.is_finite() {
        return Err(ModelError::NonFinite(what));
    }
    if value <= 0.0 {
        return Err(ModelError::NonPositiveLength { what, value });
    }
    Ok(value)
}

/// One length-at-capture census fish. Its age class is never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CensusObservation {
    site: usize,
    length: f64,
}

impl CensusObservation {
    pub fn new(site: usize, length: f64) -> Result<Self, ModelError> {
        Ok(Self {
            site,
            length: check_length("census length", length)?,
        })
    }

    pub fn site(&self) -> usize {
        self.site
    }

    pub fn length(&self) -> f64 {
        self.length
    }
}

/// One capture-mark-recapture pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecaptureObservation {
    site: usize,
    initial_length: f64,
    days: f64,
    recapture_length: f64,
}

impl RecaptureObservation {
    pub fn new(
        site: usize,
        initial_length: f64,
        days: f64,
        recapture_length: f64,
    ) -> Result<Self, ModelError> {
        if !days.is_finite() {
            return Err(ModelError::NonFinite("elapsed days"));
        }
        if days <= 0.0 {
            return Err(ModelError::NonPositiveDays(days));
        }
        Ok(Self {
            site,
            initial_length: check_length("initial length", initial_length)?,
            days,
            recapture_length: check_length("recapture length", recapture_length)?,
        })
    }

    pub fn site(&self) -> usize {
        self.site
    }

    pub fn initial_length(&self) -> f64 {
        self.initial_length
    }

    pub fn days(&self) -> f64 {
        self.days
    }

    pub fn recapture_length(&self) -> f64 {
        self.recapture_length
    }
}

/// Which data source an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Census,
    Recapture,
}

/// A full dataset for one pipeline run.
///
/// Observation order everywhere downstream: census rows in input order, then
/// recapture rows in input order.
#[derive(Debug, Clone)]
pub struct GrowthData {
    pub sites: Sites,
    pub census: Vec<CensusObservation>,
    pub recaptures: Vec<RecaptureObservation>,
}

impl GrowthData {
    pub fn new(
        sites: Sites,
        census: Vec<CensusObservation>,
        recaptures: Vec<RecaptureObservation>,
    ) -> Result<Self, ModelError> {
        let n_sites = sites.len();
        let bad_site = census
            .iter()
            .map(|c| c.site())
            .chain(recaptures.iter().map(|r| r.site()))
            .find(|&s| s >= n_sites);
        if let Some(s) = bad_site {
            return Err(ModelError::UnknownSite(format!("#{s}")));
        }
        Ok(Self {
            sites,
            census,
            recaptures,
        })
    }

    pub fn n_observations(&self) -> usize {
        self.census.len() + self.recaptures.len()
    }

    /// Kind, site index and observed value of the `i`-th observation.
    pub fn observation(&self, i: usize) -> Option<(ObservationKind, usize, f64)> {
        if let Some(c) = self.census.get(i) {
            return Some((ObservationKind::Census, c.site(), c.length()));
        }
        self.recaptures
            .get(i - self.census.len())
            .map(|r| (ObservationKind::Recapture, r.site(), r.recapture_length()))
    }

    /// Observed values in the canonical observation order.
    pub fn observed_values(&self) -> Vec<f64> {
        self.census
            .iter()
            .map(|c| c.length())
            .chain(self.recaptures.iter().map(|r| r.recapture_length()))
            .collect()
    }
}

/// A sampled (1-based) age class. Only produced for predictive replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AgeClass(pub usize);

/// Per-site probability simplex over age classes.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureWeights(Vec<f64>);

impl MixtureWeights {
    pub fn new(weights: Vec<f64>) -> Result<Self, ModelError> {
        let sum: f64 = weights.iter().sum();
        let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
        let finite = weights.iter().all(|w| w.is_finite());
        if weights.is_empty() || !finite || min < 0.0 || (sum - 1.0).abs() > STRUCTURE_TOL {
            return Err(ModelError::InvalidSimplex { sum, min });
        }
        Ok(Self(weights))
    }

    pub fn uniform(n: usize) -> Self {
        Self(vec![1.0 / n as f64; n])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lower-triangular Cholesky factor `L` of a correlation matrix `L Lᵀ`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationCholesky(DMatrix<f64>);

impl CorrelationCholesky {
    pub fn new(l: DMatrix<f64>) -> Result<Self, ModelError> {
        if l.nrows() != l.ncols() {
            return Err(ModelError::InvalidCholesky(format!(
                "not square ({}x{})",
                l.nrows(),
                l.ncols()
            )));
        }
        let k = l.nrows();
        for i in 0..k {
            if !l.row(i).iter().all(|v| v.is_finite()) {
                return Err(ModelError::InvalidCholesky(format!("row {i} is not finite")));
            }
            for j in (i + 1)..k {
                if l[(i, j)] != 0.0 {
                    return Err(ModelError::InvalidCholesky(format!(
                        "entry ({i},{j}) above the diagonal is non-zero"
                    )));
                }
            }
            if l[(i, i)] <= 0.0 {
                return Err(ModelError::InvalidCholesky(format!(
                    "diagonal entry {i} is not positive"
                )));
            }
            let norm_sq = l.row(i).norm_squared();
            if (norm_sq - 1.0).abs() > STRUCTURE_TOL {
                return Err(ModelError::InvalidCholesky(format!(
                    "L·Lᵀ has diagonal {norm_sq} at row {i}, expected 1"
                )));
            }
        }
        Ok(Self(l))
    }

    pub fn identity(k: usize) -> Self {
        Self(DMatrix::identity(k, k))
    }

    pub fn dim(&self) -> usize {
        self.0.nrows()
    }

    pub fn factor(&self) -> &DMatrix<f64> {
        &self.0
    }

    /// The correlation matrix `L Lᵀ`.
    pub fn correlation(&self) -> DMatrix<f64> {
        &self.0 * self.0.transpose()
    }
}

/// Covariate slopes on the log(Linf) and log(k) linear predictors, each in
/// `[temperature, effort, temperature × effort]` order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CovariateSlopes {
    pub linf: [f64; 3],
    pub k: [f64; 3],
}

impl CovariateSlopes {
    pub fn for_param(&self, param: GrowthParam) -> Option<&[f64; 3]> {
        match param {
            GrowthParam::L0 => None,
            GrowthParam::Linf => Some(&self.linf),
            GrowthParam::K => Some(&self.k),
        }
    }
}

/// Population-level parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalParameters {
    /// Log-scale intercepts, one per modeled growth parameter.
    pub mu: Vec<f64>,
    pub slopes: Option<CovariateSlopes>,
    /// Census lognormal scale; absent in the recapture-only variant.
    pub sigma_census: Option<f64>,
    pub sigma_cmr: f64,
    /// Between-site standard deviations, one per modeled growth parameter.
    pub tau: Vec<f64>,
}

/// One full assignment of every sampled quantity, on the constrained scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub global: GlobalParameters,
    pub correlation: CorrelationCholesky,
    /// Standard-normal raw effects, site-major (`S × P`).
    pub raw_effects: DMatrix<f64>,
    /// One simplex per site; empty for the recapture-only variant.
    pub weights: Vec<MixtureWeights>,
}

pub type PosteriorDraw = ModelParameters;

/// Site-level growth parameters after the log link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteGrowth {
    pub l0: Option<f64>,
    pub linf: f64,
    pub k: f64,
}

/// Draws from all chains, concatenated in chain order.
#[derive(Debug, Clone, Default)]
pub struct PosteriorSampleSet {
    draws: Vec<PosteriorDraw>,
    chain_of: Vec<usize>,
    n_chains: usize,
}

impl PosteriorSampleSet {
    pub fn from_chains(chains: Vec<Vec<PosteriorDraw>>) -> Self {
        let n_chains = chains.len();
        let mut draws = Vec::new();
        let mut chain_of = Vec::new();
        for (chain, chain_draws) in chains.into_iter().enumerate() {
            chain_of.extend(std::iter::repeat(chain).take(chain_draws.len()));
            draws.extend(chain_draws);
        }
        Self {
            draws,
            chain_of,
            n_chains,
        }
    }

    pub fn draws(&self) -> &[PosteriorDraw] {
        &self.draws
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn n_chains(&self) -> usize {
        self.n_chains
    }

    pub fn chain_of(&self, draw: usize) -> Option<usize> {
        self.chain_of.get(draw).copied()
    }
}

/// `Normal(mean, sd)` prior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPrior {
    pub mean: f64,
    pub sd: f64,
}

/// Prior hyperparameters. Every field has a default so a partial JSON file works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    pub mu_log_l0: NormalPrior,
    pub mu_log_linf: NormalPrior,
    pub mu_log_k: NormalPrior,
    /// Prior sd of every covariate slope (mean 0).
    pub slope_sd: f64,
    /// Half-normal scale of `sigma_census` and `sigma_cmr`.
    pub sigma_scale: f64,
    /// Half-normal scale of each between-site sd `tau`.
    pub tau_scale: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            mu_log_l0: NormalPrior { mean: 25.0_f64.ln(), sd: 1.0 },
            mu_log_linf: NormalPrior { mean: 250.0_f64.ln(), sd: 1.0 },
            mu_log_k: NormalPrior { mean: 0.4_f64.ln(), sd: 1.0 },
            slope_sd: 1.0,
            sigma_scale: 1.0,
            tau_scale: 0.5,
        }
    }
}

impl Priors {
    pub fn intercept(&self, param: GrowthParam) -> NormalPrior {
        match param {
            GrowthParam::L0 => self.mu_log_l0,
            GrowthParam::Linf => self.mu_log_linf,
            GrowthParam::K => self.mu_log_k,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let positive = [
            ("mu_log_l0.sd", self.mu_log_l0.sd),
            ("mu_log_linf.sd", self.mu_log_linf.sd),
            ("mu_log_k.sd", self.mu_log_k.sd),
            ("slope_sd", self.slope_sd),
            ("sigma_scale", self.sigma_scale),
            ("tau_scale", self.tau_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidHyperparameter {
                    name: "priors",
                    reason: format!("{name} must be finite and > 0, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Model structure hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
    pub variant: ModelVariant,
    /// Number of age classes `A`.
    pub n_ages: usize,
    /// Dirichlet concentration, length `A`.
    pub alpha: Vec<f64>,
    /// LKJ concentration `η`.
    pub eta: f64,
    /// Evaluate priors only (no likelihood terms).
    pub prior_only: bool,
    /// Add covariate terms to log(Linf) and log(k).
    pub use_covariates: bool,
    pub priors: Priors,
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.variant.has_census() {
            if self.n_ages == 0 {
                return Err(ModelError::InvalidHyperparameter {
                    name: "n_ages",
                    reason: "must be >= 1".to_string(),
                });
            }
            if self.alpha.len() != self.n_ages {
                return Err(ModelError::DimensionMismatch {
                    what: "alpha",
                    expected: self.n_ages,
                    got: self.alpha.len(),
                });
            }
            if let Some(a) = self.alpha.iter().find(|a| !(a.is_finite() && **a > 0.0)) {
                return Err(ModelError::InvalidHyperparameter {
                    name: "alpha",
                    reason: format!("concentrations must be finite and > 0, got {a}"),
                });
            }
        }
        if !(self.eta.is_finite() && self.eta > 0.0) {
            return Err(ModelError::InvalidHyperparameter {
                name: "eta",
                reason: format!("must be finite and > 0, got {}", self.eta),
            });
        }
        self.priors.validate()
    }
}

/// A full `vbg fit` run's configuration.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub census_csv: Option<PathBuf>,
    pub recapture_csv: Option<PathBuf>,
    pub covariates_csv: Option<PathBuf>,
    pub hyper: Hyperparameters,

    pub chains: usize,
    pub iterations: usize,
    pub warmup: usize,
    pub seed: u64,

    /// Number of Uniform(0,1) reference sets for the LOO-PIT envelope.
    pub pit_reference_sets: usize,

    pub export_pointwise: Option<PathBuf>,
    pub export_replicates: Option<PathBuf>,
    pub export_diagnostics: Option<PathBuf>,
}

/// Known "true" values used by `vbg simulate`.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub out_dir: PathBuf,
    pub n_sites: usize,
    pub n_census: usize,
    pub n_recaptures: usize,
    pub n_ages: usize,
    pub l0: f64,
    pub linf: f64,
    pub k: f64,
    pub sigma_census: f64,
    pub sigma_cmr: f64,
    /// Between-site sd on every log growth parameter (0 = identical sites).
    pub tau: f64,
    pub seed: u64,
}
