//! Joint log posterior density.
//!
//! `log p(θ | data) = log prior(θ) + Σ census log-lik + Σ recapture log-lik`
//!
//! The composer borrows the dataset and hyperparameters for one pipeline run
//! and holds nothing mutable, so it can be evaluated concurrently from every
//! chain at arbitrary points.
//!
//! Pointwise terms are ordered census first, then recaptures (input order
//! within each), matching `GrowthData::observed_values`.

use nalgebra::DMatrix;
use rand::Rng;

use crate::domain::{
    CorrelationCholesky, GlobalParameters, GrowthData, GrowthParam, Hyperparameters,
    ModelParameters, MixtureWeights, SiteGrowth,
};
use crate::error::ModelError;
use crate::fit::sampler::LogDensity;
use crate::math::{age_means, dirichlet_lpdf, half_normal_lpdf, lkj_corr_cholesky_lpdf, normal_lpdf};
use crate::models::effects::site_growth;
use crate::models::increment::{recapture_log_likelihood, recapture_replicate};
use crate::models::layout::ParameterLayout;
use crate::models::mixture::SiteMixture;

#[derive(Debug, Clone)]
pub struct ModelComposer<'a> {
    data: &'a GrowthData,
    hyper: &'a Hyperparameters,
    layout: ParameterLayout,
}

impl<'a> ModelComposer<'a> {
    pub fn new(data: &'a GrowthData, hyper: &'a Hyperparameters) -> Result<Self, ModelError> {
        hyper.validate()?;
        if !hyper.variant.has_census() && !data.census.is_empty() {
            return Err(ModelError::InvalidHyperparameter {
                name: "variant",
                reason: format!(
                    "the recapture-only model cannot use {} census observations",
                    data.census.len()
                ),
            });
        }
        if hyper.use_covariates && !data.sites.all_have_covariates() {
            return Err(ModelError::InvalidHyperparameter {
                name: "use_covariates",
                reason: "every site needs temperature and effort covariates".to_string(),
            });
        }
        let layout = ParameterLayout {
            variant: hyper.variant,
            n_sites: data.sites.len(),
            n_ages: hyper.n_ages,
            covariates: hyper.use_covariates,
        };
        Ok(Self {
            data,
            hyper,
            layout,
        })
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn data(&self) -> &GrowthData {
        self.data
    }

    pub fn hyper(&self) -> &Hyperparameters {
        self.hyper
    }

    /// Prior log density of every sampled quantity (constrained scale).
    pub fn log_prior(&self, params: &ModelParameters) -> f64 {
        let priors = &self.hyper.priors;
        let g = &params.global;
        let mut lp = 0.0;

        for (&param, &mu) in self.hyper.variant.params().iter().zip(&g.mu) {
            let prior = priors.intercept(param);
            lp += normal_lpdf(mu, prior.mean, prior.sd);
        }
        if let Some(slopes) = &g.slopes {
            for &b in slopes.linf.iter().chain(&slopes.k) {
                lp += normal_lpdf(b, 0.0, priors.slope_sd);
            }
        }
        if let Some(sigma) = g.sigma_census {
            lp += half_normal_lpdf(sigma, priors.sigma_scale);
        }
        lp += half_normal_lpdf(g.sigma_cmr, priors.sigma_scale);
        for &t in &g.tau {
            lp += half_normal_lpdf(t, priors.tau_scale);
        }
        lp += lkj_corr_cholesky_lpdf(params.correlation.factor(), self.hyper.eta);
        lp += params
            .raw_effects
            .iter()
            .map(|&z| normal_lpdf(z, 0.0, 1.0))
            .sum::<f64>();
        for w in &params.weights {
            lp += dirichlet_lpdf(w.as_slice(), &self.hyper.alpha);
        }
        lp
    }

    fn site_mixtures(
        &self,
        params: &ModelParameters,
        growth: &[SiteGrowth],
    ) -> Result<Vec<SiteMixture>, ModelError> {
        if self.data.census.is_empty() {
            return Ok(Vec::new());
        }
        if params.weights.len() != growth.len() {
            return Err(ModelError::DimensionMismatch {
                what: "mixture weights",
                expected: growth.len(),
                got: params.weights.len(),
            });
        }
        growth
            .iter()
            .zip(&params.weights)
            .map(|(g, w)| {
                let l0 = g.l0.ok_or(ModelError::NonFinite("L0"))?;
                SiteMixture::new(&age_means(self.hyper.n_ages, l0, g.linf, g.k), w)
            })
            .collect()
    }

    /// Log-likelihood of every observation at one parameter point.
    pub fn pointwise_log_likelihood(&self, params: &ModelParameters) -> Result<Vec<f64>, ModelError> {
        let growth = site_growth(params, self.hyper.variant, &self.data.sites)?;
        let mixtures = self.site_mixtures(params, &growth)?;
        let sigma_census = params.global.sigma_census.unwrap_or(f64::NAN);

        let mut out = Vec::with_capacity(self.data.n_observations());
        out.extend(
            self.data
                .census
                .iter()
                .map(|c| mixtures[c.site()].log_likelihood(c.length(), sigma_census)),
        );
        out.extend(
            self.data
                .recaptures
                .iter()
                .map(|r| recapture_log_likelihood(r, &growth[r.site()], params.global.sigma_cmr)),
        );
        Ok(out)
    }

    /// One predictive replicate per observation, same order as the pointwise terms.
    pub fn replicate<R: Rng + ?Sized>(
        &self,
        params: &ModelParameters,
        rng: &mut R,
    ) -> Result<Vec<f64>, ModelError> {
        let growth = site_growth(params, self.hyper.variant, &self.data.sites)?;
        let mixtures = self.site_mixtures(params, &growth)?;
        let sigma_census = params.global.sigma_census.unwrap_or(f64::NAN);

        let mut out = Vec::with_capacity(self.data.n_observations());
        for c in &self.data.census {
            let (_, y) = mixtures[c.site()].replicate(sigma_census, rng)?;
            out.push(y);
        }
        for r in &self.data.recaptures {
            out.push(recapture_replicate(r, &growth[r.site()], params.global.sigma_cmr, rng));
        }
        Ok(out)
    }

    /// Joint log density on the constrained scale. Non-finite values and
    /// malformed parameters both come back as `-inf`.
    pub fn log_posterior(&self, params: &ModelParameters) -> f64 {
        let mut lp = self.log_prior(params);
        if !self.hyper.prior_only {
            match self.pointwise_log_likelihood(params) {
                Ok(terms) => lp += terms.iter().sum::<f64>(),
                Err(_) => return f64::NEG_INFINITY,
            }
        }
        if lp.is_finite() { lp } else { f64::NEG_INFINITY }
    }

    /// Prior-centered starting values (zero effects, uniform weights).
    pub fn initial_parameters(&self) -> ModelParameters {
        let p = self.layout.n_params();
        let priors = &self.hyper.priors;
        ModelParameters {
            global: GlobalParameters {
                mu: self
                    .hyper
                    .variant
                    .params()
                    .iter()
                    .map(|&param| priors.intercept(param).mean)
                    .collect(),
                slopes: self.hyper.use_covariates.then(Default::default),
                sigma_census: self.hyper.variant.has_census().then_some(0.2),
                sigma_cmr: 0.2,
                tau: vec![0.1; p],
            },
            correlation: CorrelationCholesky::identity(p),
            raw_effects: DMatrix::zeros(self.data.sites.len(), p),
            weights: if self.hyper.variant.has_census() {
                (0..self.data.sites.len())
                    .map(|_| MixtureWeights::uniform(self.hyper.n_ages))
                    .collect()
            } else {
                Vec::new()
            },
        }
    }

    /// Constrained value of a global growth intercept on the natural scale.
    pub fn population_value(&self, params: &ModelParameters, param: GrowthParam) -> Option<f64> {
        self.hyper
            .variant
            .column(param)
            .map(|col| params.global.mu[col].exp())
    }
}

impl LogDensity for ModelComposer<'_> {
    fn dim(&self) -> usize {
        self.layout.dim()
    }

    fn log_density(&self, x: &[f64]) -> f64 {
        match self.layout.constrain(x) {
            Ok((params, log_jac)) => {
                let lp = self.log_posterior(&params) + log_jac;
                if lp.is_finite() { lp } else { f64::NEG_INFINITY }
            }
            Err(_) => f64::NEG_INFINITY,
        }
    }

    fn initial_point(&self) -> Vec<f64> {
        self.layout
            .unconstrain(&self.initial_parameters())
            .unwrap_or_else(|_| vec![0.0; self.layout.dim()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CensusObservation, ModelVariant, Priors, RecaptureObservation, Site, SiteCovariates, Sites,
    };

    fn data(with_covariates: bool) -> GrowthData {
        let sites = Sites::new(
            (0..3)
                .map(|i| Site {
                    id: format!("S{i}"),
                    covariates: with_covariates.then_some(SiteCovariates {
                        temperature: 0.2 * i as f64 - 0.2,
                        effort: 0.1 - 0.1 * i as f64,
                    }),
                })
                .collect(),
        )
        .unwrap();
        let census = [26.0, 90.0, 150.0, 24.0, 170.0, 85.0]
            .iter()
            .enumerate()
            .map(|(i, &y)| CensusObservation::new(i % 3, y).unwrap())
            .collect();
        let recaptures = vec![
            RecaptureObservation::new(0, 90.0, 200.0, 120.0).unwrap(),
            RecaptureObservation::new(2, 150.0, 365.0, 190.0).unwrap(),
        ];
        GrowthData::new(sites, census, recaptures).unwrap()
    }

    fn hyper(prior_only: bool, use_covariates: bool) -> Hyperparameters {
        Hyperparameters {
            variant: ModelVariant::Integrated,
            n_ages: 4,
            alpha: vec![1.0; 4],
            eta: 2.0,
            prior_only,
            use_covariates,
            priors: Priors::default(),
        }
    }

    #[test]
    fn density_is_prior_plus_pointwise_sum() {
        let d = data(false);
        let h = hyper(false, false);
        let model = ModelComposer::new(&d, &h).unwrap();
        let params = model.initial_parameters();
        let terms = model.pointwise_log_likelihood(&params).unwrap();
        assert_eq!(terms.len(), 8);
        let expected = model.log_prior(&params) + terms.iter().sum::<f64>();
        assert!((model.log_posterior(&params) - expected).abs() < 1e-9);
    }

    #[test]
    fn prior_only_excludes_likelihood() {
        let d = data(false);
        let h = hyper(true, false);
        let model = ModelComposer::new(&d, &h).unwrap();
        let params = model.initial_parameters();
        assert_eq!(model.log_posterior(&params), model.log_prior(&params));
    }

    #[test]
    fn unconstrained_density_is_finite_and_repeatable() {
        let d = data(true);
        let h = hyper(false, true);
        let model = ModelComposer::new(&d, &h).unwrap();
        let x0 = model.initial_point();
        assert_eq!(x0.len(), LogDensity::dim(&model));
        let a = LogDensity::log_density(&model, &x0);
        let b = LogDensity::log_density(&model, &x0);
        assert!(a.is_finite());
        assert_eq!(a, b);
    }

    #[test]
    fn overflowing_points_are_rejected_not_fatal() {
        let d = data(false);
        let h = hyper(false, false);
        let model = ModelComposer::new(&d, &h).unwrap();
        let mut x = model.initial_point();
        x[model.layout().tau().start] = 1e6;
        assert_eq!(LogDensity::log_density(&model, &x), f64::NEG_INFINITY);
    }

    #[test]
    fn covariates_require_every_site() {
        let d = data(false);
        let h = hyper(false, true);
        assert!(ModelComposer::new(&d, &h).is_err());
    }

    #[test]
    fn recapture_only_rejects_census_rows() {
        let d = data(false);
        let mut h = hyper(false, false);
        h.variant = ModelVariant::RecaptureOnly;
        assert!(ModelComposer::new(&d, &h).is_err());
    }
}
