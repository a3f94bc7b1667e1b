//! Synthetic growth datasets.
//!
//! - [`simulate_known`]: census and recapture data from fixed "true" growth
//!   parameters, used for recovery checks and by `vbg simulate`
//! - [`simulate_from_prior`]: one prior-predictive dataset with the same
//!   structure (sites, recapture intervals) as a template dataset
//!
//! Every draw comes from one `StdRng` seeded by the caller, so a seed fully
//! determines the output.

use nalgebra::DMatrix;
use rand::Rng;
use rand::SeedableRng;
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand_distr::{Beta, Distribution, Gamma, Normal, StandardNormal, Uniform};

use crate::data::standardize::standardize_covariates;
use crate::domain::{
    CensusObservation, CorrelationCholesky, CovariateSlopes, GlobalParameters, GrowthData,
    Hyperparameters, MixtureWeights, ModelParameters, RecaptureObservation, SimulateConfig, Site,
    SiteCovariates, SiteGrowth, Sites,
};
use crate::error::ModelError;
use crate::math::{age_mean, cholesky_corr_constrain, increment_mean};
use crate::models::ModelComposer;

const MIN_DAYS: f64 = 30.0;
const MAX_DAYS: f64 = 730.0;

/// Known-parameter dataset plus the values it was generated from.
#[derive(Debug, Clone)]
pub struct SimulatedData {
    /// Sites carry standardized covariates.
    pub data: GrowthData,
    /// Covariates on their original scale, one per site.
    pub raw_covariates: Vec<SiteCovariates>,
    pub site_truth: Vec<SiteGrowth>,
    pub weights: Vec<MixtureWeights>,
}

#[derive(Debug, Clone)]
pub struct PriorPredictive {
    pub params: ModelParameters,
    pub data: GrowthData,
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidHyperparameter {
        name,
        reason: reason.into(),
    }
}

fn validate(config: &SimulateConfig) -> Result<(), ModelError> {
    if config.n_sites == 0 {
        return Err(invalid("n_sites", "must be >= 1"));
    }
    if config.n_ages == 0 {
        return Err(invalid("n_ages", "must be >= 1"));
    }
    let positive = [
        ("l0", config.l0),
        ("linf", config.linf),
        ("k", config.k),
        ("sigma_census", config.sigma_census),
        ("sigma_cmr", config.sigma_cmr),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(invalid(name, format!("must be finite and > 0, got {value}")));
        }
    }
    if config.linf <= config.l0 {
        return Err(invalid("linf", "must exceed l0"));
    }
    if !(config.tau.is_finite() && config.tau >= 0.0) {
        return Err(invalid("tau", format!("must be finite and >= 0, got {}", config.tau)));
    }
    Ok(())
}

fn lognormal<R: Rng + ?Sized>(mean: f64, sigma: f64, rng: &mut R) -> f64 {
    let z: f64 = StandardNormal.sample(rng);
    (mean.ln() + sigma * z).exp()
}

/// Dirichlet draw through normalized Gamma(α_a, 1) variates.
pub fn draw_dirichlet<R: Rng + ?Sized>(alpha: &[f64], rng: &mut R) -> Result<MixtureWeights, ModelError> {
    let mut g = Vec::with_capacity(alpha.len());
    for &a in alpha {
        let gamma = Gamma::new(a, 1.0).map_err(|e| invalid("alpha", e.to_string()))?;
        g.push(gamma.sample(rng));
    }
    let total: f64 = g.iter().sum();
    if !(total > 0.0) {
        // Every variate underflowed; fall back to the largest concentration.
        let best = alpha
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut w = vec![0.0; alpha.len()];
        w[best] = 1.0;
        return MixtureWeights::new(w);
    }
    MixtureWeights::new(g.into_iter().map(|v| v / total).collect())
}

/// LKJ(η) correlation Cholesky factor by the C-vine method.
///
/// The canonical partial correlation in column `j` is `2 Beta(b_j, b_j) - 1`
/// with `b_j = η + (K - 2 - j) / 2`.
pub fn draw_lkj_cholesky<R: Rng + ?Sized>(
    k: usize,
    eta: f64,
    rng: &mut R,
) -> Result<CorrelationCholesky, ModelError> {
    let mut y = Vec::with_capacity(k * k.saturating_sub(1) / 2);
    for i in 1..k {
        for j in 0..i {
            let b = eta + (k as f64 - 2.0 - j as f64) / 2.0;
            let beta = Beta::new(b, b).map_err(|e| invalid("eta", e.to_string()))?;
            let cpc: f64 = 2.0 * beta.sample(rng) - 1.0;
            y.push(cpc.clamp(-1.0 + 1e-12, 1.0 - 1e-12).atanh());
        }
    }
    let (l, _) = cholesky_corr_constrain(&y, k);
    CorrelationCholesky::new(l)
}

/// Census and recapture data from fixed growth parameters.
///
/// Sites get independent log-scale deviations `tau · N(0, 1)` on every growth
/// parameter and Dirichlet(1) age composition. Observations are assigned to
/// sites round-robin.
pub fn simulate_known(config: &SimulateConfig) -> Result<SimulatedData, ModelError> {
    validate(config)?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let temp = Normal::new(12.0, 3.0).map_err(|e| invalid("temperature", e.to_string()))?;
    let effort = Uniform::new(0.5, 5.0);
    let raw_covariates: Vec<SiteCovariates> = (0..config.n_sites)
        .map(|_| SiteCovariates {
            temperature: temp.sample(&mut rng),
            effort: effort.sample(&mut rng),
        })
        .collect();
    let standardized = standardize_covariates(&raw_covariates);
    let sites = Sites::new(
        standardized
            .into_iter()
            .enumerate()
            .map(|(s, c)| Site {
                id: format!("site{:02}", s + 1),
                covariates: Some(c),
            })
            .collect(),
    )?;

    let deviate = |base: f64, rng: &mut StdRng| {
        let z: f64 = StandardNormal.sample(rng);
        (base.ln() + config.tau * z).exp()
    };
    let site_truth: Vec<SiteGrowth> = (0..config.n_sites)
        .map(|_| SiteGrowth {
            l0: Some(deviate(config.l0, &mut rng)),
            linf: deviate(config.linf, &mut rng),
            k: deviate(config.k, &mut rng),
        })
        .collect();

    let ones = vec![1.0; config.n_ages];
    let weights = (0..config.n_sites)
        .map(|_| draw_dirichlet(&ones, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;

    let pickers = weights
        .iter()
        .map(|w| WeightedIndex::new(w.as_slice()).map_err(|e| invalid("weights", e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    let mut census = Vec::with_capacity(config.n_census);
    for i in 0..config.n_census {
        let s = i % config.n_sites;
        let g = &site_truth[s];
        let age = pickers[s].sample(&mut rng) + 1;
        let mean = age_mean(age as f64, g.l0.unwrap_or(config.l0), g.linf, g.k);
        census.push(CensusObservation::new(s, lognormal(mean, config.sigma_census, &mut rng))?);
    }

    let days = Uniform::new_inclusive(MIN_DAYS, MAX_DAYS);
    let mut recaptures = Vec::with_capacity(config.n_recaptures);
    for i in 0..config.n_recaptures {
        let s = i % config.n_sites;
        let g = &site_truth[s];
        let age = rng.gen_range(1.0..config.n_ages as f64 + 1.0);
        let initial = lognormal(
            age_mean(age, g.l0.unwrap_or(config.l0), g.linf, g.k),
            config.sigma_census,
            &mut rng,
        );
        let elapsed = days.sample(&mut rng).round();
        let recapture = lognormal(
            increment_mean(initial, g.linf, g.k, elapsed),
            config.sigma_cmr,
            &mut rng,
        );
        recaptures.push(RecaptureObservation::new(s, initial, elapsed, recapture)?);
    }

    Ok(SimulatedData {
        data: GrowthData::new(sites, census, recaptures)?,
        raw_covariates,
        site_truth,
        weights,
    })
}

/// Draw every sampled quantity from its prior.
pub fn draw_from_prior<R: Rng + ?Sized>(
    n_sites: usize,
    hyper: &Hyperparameters,
    rng: &mut R,
) -> Result<ModelParameters, ModelError> {
    hyper.validate()?;
    let priors = &hyper.priors;
    let variant = hyper.variant;
    let p = variant.n_params();

    let normal = |mean: f64, sd: f64, rng: &mut R| -> Result<f64, ModelError> {
        let dist = Normal::new(mean, sd).map_err(|e| invalid("priors", e.to_string()))?;
        Ok(dist.sample(rng))
    };

    let mut mu = Vec::with_capacity(p);
    for &param in variant.params() {
        let prior = priors.intercept(param);
        mu.push(normal(prior.mean, prior.sd, rng)?);
    }
    let slopes = if hyper.use_covariates {
        let mut b = [0.0; 6];
        for v in b.iter_mut() {
            *v = normal(0.0, priors.slope_sd, rng)?;
        }
        Some(CovariateSlopes {
            linf: [b[0], b[1], b[2]],
            k: [b[3], b[4], b[5]],
        })
    } else {
        None
    };
    let sigma_census = if variant.has_census() {
        Some(normal(0.0, priors.sigma_scale, rng)?.abs())
    } else {
        None
    };
    let sigma_cmr = normal(0.0, priors.sigma_scale, rng)?.abs();
    let mut tau = Vec::with_capacity(p);
    for _ in 0..p {
        tau.push(normal(0.0, priors.tau_scale, rng)?.abs());
    }

    let correlation = draw_lkj_cholesky(p, hyper.eta, rng)?;
    let raw: Vec<f64> = (0..n_sites * p).map(|_| StandardNormal.sample(rng)).collect();
    let raw_effects = DMatrix::from_row_slice(n_sites, p, &raw);
    let weights = if variant.has_census() {
        (0..n_sites)
            .map(|_| draw_dirichlet(&hyper.alpha, rng))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };

    Ok(ModelParameters {
        global: GlobalParameters {
            mu,
            slopes,
            sigma_census,
            sigma_cmr,
            tau,
        },
        correlation,
        raw_effects,
        weights,
    })
}

/// One prior-predictive dataset shaped like `template`: same sites, same census
/// site assignments, same recapture initial lengths and intervals.
pub fn simulate_from_prior(
    template: &GrowthData,
    hyper: &Hyperparameters,
    seed: u64,
) -> Result<PriorPredictive, ModelError> {
    let model = ModelComposer::new(template, hyper)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let params = draw_from_prior(template.sites.len(), hyper, &mut rng)?;
    let values = model.replicate(&params, &mut rng)?;

    let (census_values, recapture_values) = values.split_at(template.census.len());
    let census = template
        .census
        .iter()
        .zip(census_values)
        .map(|(c, &y)| CensusObservation::new(c.site(), y))
        .collect::<Result<Vec<_>, _>>()?;
    let recaptures = template
        .recaptures
        .iter()
        .zip(recapture_values)
        .map(|(r, &y)| RecaptureObservation::new(r.site(), r.initial_length(), r.days(), y))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PriorPredictive {
        params,
        data: GrowthData::new(template.sites.clone(), census, recaptures)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelVariant, Priors};

    fn config() -> SimulateConfig {
        SimulateConfig {
            out_dir: std::path::PathBuf::from("."),
            n_sites: 4,
            n_census: 200,
            n_recaptures: 40,
            n_ages: 5,
            l0: 25.0,
            linf: 250.0,
            k: 0.4,
            sigma_census: 0.15,
            sigma_cmr: 0.05,
            tau: 0.0,
            seed: 17,
        }
    }

    #[test]
    fn known_simulation_has_requested_shape() {
        let sim = simulate_known(&config()).unwrap();
        assert_eq!(sim.data.sites.len(), 4);
        assert_eq!(sim.data.census.len(), 200);
        assert_eq!(sim.data.recaptures.len(), 40);
        assert!(sim.data.sites.all_have_covariates());
        // tau = 0: every site shares the population values.
        for g in &sim.site_truth {
            assert!((g.linf - 250.0).abs() < 1e-9);
        }
        for r in &sim.data.recaptures {
            assert!(r.days() >= MIN_DAYS && r.days() <= MAX_DAYS);
        }
    }

    #[test]
    fn known_simulation_is_seed_deterministic() {
        let a = simulate_known(&config()).unwrap();
        let b = simulate_known(&config()).unwrap();
        assert_eq!(a.data.observed_values(), b.data.observed_values());
        let mut other = config();
        other.seed = 18;
        let c = simulate_known(&other).unwrap();
        assert_ne!(a.data.observed_values(), c.data.observed_values());
    }

    #[test]
    fn invalid_known_values_are_rejected() {
        let mut bad = config();
        bad.linf = 20.0;
        assert!(simulate_known(&bad).is_err());
        let mut bad = config();
        bad.n_sites = 0;
        assert!(simulate_known(&bad).is_err());
    }

    #[test]
    fn lkj_draws_are_valid_factors() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..200 {
            let l = draw_lkj_cholesky(3, 1.5, &mut rng).unwrap();
            let omega = l.correlation();
            for i in 0..3 {
                assert!((omega[(i, i)] - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn lkj_two_by_two_matches_beta_marginal_variance() {
        // For K = 2 the correlation is 2 Beta(η, η) - 1 with variance 1 / (2η + 1).
        let mut rng = StdRng::seed_from_u64(4);
        let eta = 2.0;
        let n = 20_000;
        let draws: Vec<f64> = (0..n)
            .map(|_| draw_lkj_cholesky(2, eta, &mut rng).unwrap().correlation()[(1, 0)])
            .collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.02);
        assert!((var - 1.0 / (2.0 * eta + 1.0)).abs() < 0.01, "var {var}");
    }

    #[test]
    fn dirichlet_draws_are_simplexes() {
        let mut rng = StdRng::seed_from_u64(9);
        let w = draw_dirichlet(&[0.5, 1.0, 3.0], &mut rng).unwrap();
        assert_eq!(w.len(), 3);
        assert!((w.as_slice().iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prior_predictive_keeps_template_structure() {
        let template = simulate_known(&config()).unwrap().data;
        let hyper = Hyperparameters {
            variant: ModelVariant::Integrated,
            n_ages: 5,
            alpha: vec![1.0; 5],
            eta: 2.0,
            prior_only: true,
            use_covariates: true,
            priors: Priors::default(),
        };
        let out = simulate_from_prior(&template, &hyper, 5).unwrap();
        assert_eq!(out.data.census.len(), template.census.len());
        for (a, b) in out.data.recaptures.iter().zip(&template.recaptures) {
            assert_eq!(a.site(), b.site());
            assert_eq!(a.days(), b.days());
            assert_eq!(a.initial_length(), b.initial_length());
        }
        assert!(out.params.global.slopes.is_some());
    }
}
