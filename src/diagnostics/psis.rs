//! Pareto-smoothed importance sampling.
//!
//! For one observation the raw log importance ratios over `S` draws are
//! `r_s = -log p(y_i | θ_s)`. The largest `M = ceil(min(0.2 S, 3 √S))` ratios
//! are replaced by expected order statistics of a generalized Pareto fit to
//! their exceedances over the `(S-M)`-th value, then every log weight is
//! truncated at the raw maximum and normalized.
//!
//! The GPD fit is the Zhang & Stephens (2009) profile-likelihood estimator with
//! a weak Normal(0.5) prior adjustment on the shape, as in the PSIS paper
//! (Vehtari, Simpson, Gelman, Yao & Gabry).

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::math::log_sum_exp;

/// Fewer tail draws than this leaves the tail unsmoothed with `k = +inf`.
pub const MIN_TAIL: usize = 5;

const GRID_BASE: usize = 30;
const GPD_PRIOR: f64 = 3.0;
const WIP_WEIGHT: f64 = 10.0;
const WIP_CENTER: f64 = 0.5;

/// Generalized Pareto shape and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpdFit {
    pub k: f64,
    pub sigma: f64,
}

/// Normalized smoothed log weights for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PsisWeights {
    /// `log w_s` with `Σ_s w_s = 1`.
    pub log_weights: Vec<f64>,
    pub pareto_k: f64,
    pub tail_len: usize,
}

pub fn tail_length(n_draws: usize) -> usize {
    let s = n_draws as f64;
    (0.2 * s).min(3.0 * s.sqrt()).ceil() as usize
}

/// Fit a GPD to ascending, non-negative exceedances.
///
/// Degenerate tails (a first quartile of zero, or a non-finite estimate) give
/// `k = +inf` so the observation is flagged and left unsmoothed.
pub fn gpd_fit(x: &[f64]) -> GpdFit {
    let unfit = GpdFit {
        k: f64::INFINITY,
        sigma: f64::NAN,
    };
    let n = x.len();
    if n == 0 {
        return unfit;
    }
    let m = GRID_BASE + (n as f64).sqrt().floor() as usize;
    let x_max = x[n - 1];
    // First quartile, 1-based index floor(n/4 + 0.5).
    let q_idx = ((n as f64 / 4.0 + 0.5).floor() as usize).clamp(1, n) - 1;
    let x_star = x[q_idx];
    if !(x_star > 0.0 && x_max.is_finite()) {
        return unfit;
    }

    let theta: Vec<f64> = (1..=m)
        .map(|j| {
            1.0 / x_max + (1.0 - (m as f64 / (j as f64 - 0.5)).sqrt()) / GPD_PRIOR / x_star
        })
        .collect();
    let profile: Vec<f64> = theta
        .iter()
        .map(|&t| {
            let k = x.iter().map(|&v| (-t * v).ln_1p()).sum::<f64>() / n as f64;
            n as f64 * ((-t / k).ln() - k - 1.0)
        })
        .collect();

    let norm = log_sum_exp(&profile);
    let theta_hat: f64 = theta
        .iter()
        .zip(&profile)
        .map(|(&t, &l)| t * (l - norm).exp())
        .sum();
    if !theta_hat.is_finite() {
        return unfit;
    }

    let k = x.iter().map(|&v| (-theta_hat * v).ln_1p()).sum::<f64>() / n as f64;
    let sigma = -k / theta_hat;
    if !(sigma.is_finite() && sigma > 0.0) {
        return unfit;
    }
    let k = (k * n as f64 + WIP_WEIGHT * WIP_CENTER) / (n as f64 + WIP_WEIGHT);
    GpdFit {
        k: if k.is_finite() { k } else { f64::INFINITY },
        sigma,
    }
}

/// GPD quantile at probability `p`.
pub fn gpd_quantile(p: f64, fit: GpdFit) -> f64 {
    if fit.k.abs() < 1e-12 {
        -fit.sigma * (-p).ln_1p()
    } else {
        fit.sigma * (-fit.k * (-p).ln_1p()).exp_m1() / fit.k
    }
}

/// Smooth one observation's raw log ratios.
pub fn psis_smooth(log_ratios: &[f64]) -> PsisWeights {
    let s = log_ratios.len();
    let max = log_ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut lw: Vec<f64> = log_ratios.iter().map(|&r| r - max).collect();
    let tail_len = tail_length(s).min(s.saturating_sub(1));
    let mut pareto_k = f64::INFINITY;

    if tail_len >= MIN_TAIL {
        let mut order: Vec<usize> = (0..s).collect();
        order.sort_by(|&a, &b| lw[a].total_cmp(&lw[b]));
        let tail_ids = &order[s - tail_len..];
        let tail: Vec<f64> = tail_ids.iter().map(|&i| lw[i]).collect();
        let tail_min = tail[0];
        let tail_max = tail[tail_len - 1];

        if (tail_max - tail_min).abs() >= f64::EPSILON / 100.0 {
            let cutoff = lw[order[s - tail_len - 1]];
            let shift = (cutoff - tail_max).exp();
            let exceed: Vec<f64> = tail.iter().map(|&v| (v - tail_max).exp() - shift).collect();
            let fit = gpd_fit(&exceed);
            if fit.k.is_finite() {
                for (j, &i) in tail_ids.iter().enumerate() {
                    let p = (j as f64 + 0.5) / tail_len as f64;
                    lw[i] = (gpd_quantile(p, fit) + shift).ln() + tail_max;
                }
            }
            pareto_k = fit.k;
        }
    }

    for v in lw.iter_mut() {
        if *v > 0.0 || v.is_nan() {
            *v = if v.is_nan() { f64::NEG_INFINITY } else { 0.0 };
        }
    }
    let norm = log_sum_exp(&lw);
    for v in lw.iter_mut() {
        *v -= norm;
    }
    PsisWeights {
        log_weights: lw,
        pareto_k,
        tail_len,
    }
}

/// Leave-one-out PSIS weights for every column of a `[draws × observations]`
/// log-likelihood matrix.
pub fn psis_loo_weights(log_lik: &DMatrix<f64>) -> Vec<PsisWeights> {
    (0..log_lik.ncols())
        .into_par_iter()
        .map(|j| {
            let ratios: Vec<f64> = log_lik.column(j).iter().map(|&ll| -ll).collect();
            psis_smooth(&ratios)
        })
        .collect()
}
