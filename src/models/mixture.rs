//! Census likelihood: a finite lognormal mixture over latent age classes.
//!
//! For a fish of length `y` at site `s`, with per-age expected lengths `μ[1..A]`,
//! weights `θ_s` and scale `σ`:
//!
//! ```text
//! log p(y) = logsumexp_a( ln θ_s[a] + lognormal_lpdf(y; ln μ[a], σ) )
//! ```
//!
//! The age class is marginalized here and only drawn explicitly when generating
//! predictive replicates.

use rand::Rng;
use rand::distributions::WeightedIndex;
use rand_distr::{Distribution, StandardNormal};

use crate::domain::{AgeClass, MixtureWeights};
use crate::error::ModelError;
use crate::math::{HALF_LN_2PI, log_sum_exp, lognormal_lpdf};

/// Per-site mixture components, prepared once per parameter point.
#[derive(Debug, Clone)]
pub struct SiteMixture {
    log_means: Vec<f64>,
    log_weights: Vec<f64>,
}

impl SiteMixture {
    pub fn new(means: &[f64], weights: &MixtureWeights) -> Result<Self, ModelError> {
        if means.len() != weights.len() {
            return Err(ModelError::DimensionMismatch {
                what: "age-class means",
                expected: weights.len(),
                got: means.len(),
            });
        }
        Ok(Self {
            log_means: means.iter().map(|m| m.ln()).collect(),
            log_weights: weights.as_slice().iter().map(|w| w.ln()).collect(),
        })
    }

    pub fn n_ages(&self) -> usize {
        self.log_means.len()
    }

    /// Marginal log-likelihood of one census length.
    pub fn log_likelihood(&self, y: f64, sigma: f64) -> f64 {
        if y <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let ln_y = y.ln();
        let base = -HALF_LN_2PI - sigma.ln() - ln_y;
        let inv_two_var = 0.5 / (sigma * sigma);

        // Running-maximum log-sum-exp without a scratch buffer: one pass for
        // the maximum, one pass for the shifted sum.
        let term = |a: usize| {
            let d = ln_y - self.log_means[a];
            self.log_weights[a] + base - d * d * inv_two_var
        };
        let max = (0..self.n_ages()).map(term).fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return max;
        }
        let sum: f64 = (0..self.n_ages()).map(|a| (term(a) - max).exp()).sum();
        max + sum.ln()
    }

    /// Draw an age class from the weights, then a lognormal length for it.
    pub fn replicate<R: Rng + ?Sized>(
        &self,
        sigma: f64,
        rng: &mut R,
    ) -> Result<(AgeClass, f64), ModelError> {
        let weights = self.log_weights.iter().map(|lw| lw.exp());
        let index = WeightedIndex::new(weights).map_err(|e| ModelError::InvalidHyperparameter {
            name: "mixture weights",
            reason: e.to_string(),
        })?;
        let a = index.sample(rng);
        let z: f64 = StandardNormal.sample(rng);
        Ok((AgeClass(a + 1), (self.log_means[a] + sigma * z).exp()))
    }
}

/// Marginal census log-likelihood from explicit means and weights.
pub fn census_log_likelihood(
    y: f64,
    means: &[f64],
    weights: &MixtureWeights,
    sigma: f64,
) -> Result<f64, ModelError> {
    Ok(SiteMixture::new(means, weights)?.log_likelihood(y, sigma))
}

/// Reference form: per-component terms reduced by [`log_sum_exp`].
pub fn census_component_terms(y: f64, means: &[f64], weights: &MixtureWeights, sigma: f64) -> Vec<f64> {
    means
        .iter()
        .zip(weights.as_slice())
        .map(|(m, w)| w.ln() + lognormal_lpdf(y, m.ln(), sigma))
        .collect()
}

/// Same value as [`census_log_likelihood`], through the slice reduction.
pub fn census_log_likelihood_reference(
    y: f64,
    means: &[f64],
    weights: &MixtureWeights,
    sigma: f64,
) -> f64 {
    log_sum_exp(&census_component_terms(y, means, weights, sigma))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn weights() -> MixtureWeights {
        MixtureWeights::new(vec![0.6, 0.3, 0.1]).unwrap()
    }

    #[test]
    fn stable_form_matches_naive_sum_on_separated_components() {
        let means = [25.0, 80.0, 180.0];
        let sigma = 0.15;
        let y = 82.0;
        let naive = census_component_terms(y, &means, &weights(), sigma)
            .iter()
            .map(|t| t.exp())
            .sum::<f64>()
            .ln();
        let ll = census_log_likelihood(y, &means, &weights(), sigma).unwrap();
        assert!((ll - naive).abs() < 1e-6, "{ll} vs {naive}");
        assert!(
            (ll - census_log_likelihood_reference(y, &means, &weights(), sigma)).abs() < 1e-12
        );
    }

    #[test]
    fn stays_finite_where_naive_underflows() {
        let means = [25.0, 80.0, 180.0];
        let sigma = 0.02;
        let y = 500.0;
        let naive = census_component_terms(y, &means, &weights(), sigma)
            .iter()
            .map(|t| t.exp())
            .sum::<f64>()
            .ln();
        assert_eq!(naive, f64::NEG_INFINITY);
        let ll = census_log_likelihood(y, &means, &weights(), sigma).unwrap();
        assert!(ll.is_finite());
    }

    #[test]
    fn rejects_mismatched_age_count() {
        assert!(census_log_likelihood(50.0, &[25.0, 80.0], &weights(), 0.1).is_err());
    }

    #[test]
    fn replicates_follow_the_weights() {
        let mix = SiteMixture::new(&[25.0, 80.0, 180.0], &weights()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 3];
        for _ in 0..20_000 {
            let (AgeClass(a), y) = mix.replicate(0.05, &mut rng).unwrap();
            assert!((1..=3).contains(&a));
            assert!(y > 0.0);
            counts[a - 1] += 1;
        }
        let share = counts[0] as f64 / 20_000.0;
        assert!((share - 0.6).abs() < 0.02, "age-1 share {share}");
    }
}
