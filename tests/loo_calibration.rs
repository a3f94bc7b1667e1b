//! Statistical behavior of PSIS-LOO and LOO-PIT on a correctly specified model.
//!
//! Conjugate normal model `mu ~ N(0, 1)`, `y_i ~ N(mu, 1)`: every dataset is
//! drawn from the prior predictive and the posterior `N(Σy / (n+1), 1/(n+1))`
//! is sampled exactly, so any miscalibration comes from the diagnostics.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use vbgrowth::diagnostics::{K_THRESHOLD, ks_p_value, ks_statistic, loo_pit, psis_loo};
use vbgrowth::math::normal_lpdf;

const N_OBS: usize = 40;
const N_DRAWS: usize = 1000;
const REPS: usize = 200;

struct Replication {
    pareto_k: Vec<f64>,
    ks_p: f64,
}

fn replicate(seed: u64) -> Replication {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut z = || -> f64 { StandardNormal.sample(&mut rng) };

    let mu_true = z();
    let y: Vec<f64> = (0..N_OBS).map(|_| mu_true + z()).collect();
    let post_mean = y.iter().sum::<f64>() / (N_OBS as f64 + 1.0);
    let post_sd = (1.0 / (N_OBS as f64 + 1.0)).sqrt();
    let mu: Vec<f64> = (0..N_DRAWS).map(|_| post_mean + post_sd * z()).collect();

    let log_lik = DMatrix::from_fn(N_DRAWS, N_OBS, |s, i| normal_lpdf(y[i], mu[s], 1.0));
    let replicates = DMatrix::from_fn(N_DRAWS, N_OBS, |s, _| mu[s] + z());

    let loo = psis_loo(&log_lik);
    let pit = loo_pit(&y, &replicates, &loo.weights);
    let d = ks_statistic(&pit);
    Replication {
        pareto_k: loo.pointwise.iter().map(|p| p.pareto_k).collect(),
        ks_p: ks_p_value(d, pit.len()),
    }
}

#[test]
fn pareto_k_is_small_for_nearly_all_observations() {
    let mut good = 0usize;
    let mut total = 0usize;
    for rep in 0..REPS / 4 {
        let out = replicate(10_000 + rep as u64);
        good += out.pareto_k.iter().filter(|k| **k < K_THRESHOLD).count();
        total += out.pareto_k.len();
    }
    let rate = good as f64 / total as f64;
    assert!(rate >= 0.95, "only {:.3} of observations have k < 0.7", rate);
}

#[test]
fn loo_pit_passes_ks_in_most_replications() {
    let passed = (0..REPS)
        .filter(|&rep| replicate(20_000 + rep as u64).ks_p > 0.05)
        .count();
    let rate = passed as f64 / REPS as f64;
    assert!(rate >= 0.90, "KS passed in only {:.3} of replications", rate);
}
