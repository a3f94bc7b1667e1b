//! Recapture likelihood: lognormal growth increments.
//!
//! ```text
//! log p(L2 | L1, Δt) = lognormal_lpdf(L2; ln(increment_mean(L1, Linf, k, Δt)), σ_cmr)
//! ```
//!
//! When `L1 >= Linf` the expected recapture length is at or below `L1`. That is
//! passed through untouched; the pipeline counts such cases separately.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::domain::{RecaptureObservation, SiteGrowth};
use crate::math::{increment_mean, lognormal_lpdf};

/// Expected recapture length for `obs` under `growth`.
pub fn expected_recapture_length(obs: &RecaptureObservation, growth: &SiteGrowth) -> f64 {
    increment_mean(obs.initial_length(), growth.linf, growth.k, obs.days())
}

/// Log-likelihood of one recapture pair.
pub fn recapture_log_likelihood(obs: &RecaptureObservation, growth: &SiteGrowth, sigma_cmr: f64) -> f64 {
    let mean = expected_recapture_length(obs, growth);
    if !(mean > 0.0) {
        return f64::NEG_INFINITY;
    }
    lognormal_lpdf(obs.recapture_length(), mean.ln(), sigma_cmr)
}

/// One lognormal replicate of the recapture length.
pub fn recapture_replicate<R: Rng + ?Sized>(
    obs: &RecaptureObservation,
    growth: &SiteGrowth,
    sigma_cmr: f64,
    rng: &mut R,
) -> f64 {
    let mean = expected_recapture_length(obs, growth);
    let z: f64 = StandardNormal.sample(rng);
    (mean.ln() + sigma_cmr * z).exp()
}

/// True when the site's Linf does not exceed the fish's initial length.
pub fn predicts_shrinkage(obs: &RecaptureObservation, growth: &SiteGrowth) -> bool {
    obs.initial_length() >= growth.linf
}
