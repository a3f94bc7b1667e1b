//! PSIS-LOO expected log predictive density.
//!
//! Per observation `i` with draws `s`:
//!
//! - `lpd_i = log( (1/S) Σ_s p(y_i | θ_s) )`
//! - `elpd_loo_i = log Σ_s w_is p(y_i | θ_s)` with normalized PSIS weights
//! - `p_loo_i = lpd_i - elpd_loo_i`
//!
//! Totals sum the pointwise values; standard errors are `sqrt(n · var_i)`.
//! Observations whose Pareto `k` exceeds [`K_THRESHOLD`] are listed in
//! [`LooResult::flagged`] and logged; they stay in the totals.

use log::warn;
use nalgebra::DMatrix;
use serde::Serialize;

use crate::diagnostics::psis::{PsisWeights, psis_loo_weights};
use crate::math::log_sum_exp;

/// Pareto `k` above this marks the LOO estimate for an observation unreliable.
pub const K_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParetoKCategory {
    Good,
    Ok,
    Bad,
    VeryBad,
}

impl ParetoKCategory {
    pub fn from_k(k: f64) -> Self {
        if k < 0.5 {
            Self::Good
        } else if k <= K_THRESHOLD {
            Self::Ok
        } else if k < 1.0 {
            Self::Bad
        } else {
            Self::VeryBad
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "good (k < 0.5)",
            Self::Ok => "ok (0.5 <= k <= 0.7)",
            Self::Bad => "bad (0.7 < k < 1)",
            Self::VeryBad => "very bad (k >= 1)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LooPointwise {
    pub elpd_loo: f64,
    pub lpd: f64,
    pub p_loo: f64,
    pub pareto_k: f64,
    pub category: ParetoKCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LooResult {
    pub elpd_loo: f64,
    pub se_elpd_loo: f64,
    pub p_loo: f64,
    pub se_p_loo: f64,
    pub looic: f64,
    pub pointwise: Vec<LooPointwise>,
    /// Observation indices with `k > 0.7`.
    pub flagged: Vec<usize>,
    #[serde(skip)]
    pub weights: Vec<PsisWeights>,
}

impl LooResult {
    /// Number of observations in each Pareto `k` category, in declaration order.
    pub fn category_counts(&self) -> [(ParetoKCategory, usize); 4] {
        let mut counts = [
            (ParetoKCategory::Good, 0),
            (ParetoKCategory::Ok, 0),
            (ParetoKCategory::Bad, 0),
            (ParetoKCategory::VeryBad, 0),
        ];
        for p in &self.pointwise {
            if let Some(slot) = counts.iter_mut().find(|(c, _)| *c == p.category) {
                slot.1 += 1;
            }
        }
        counts
    }
}

fn sum_and_se(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count() as f64;
    let total: f64 = values.clone().sum();
    if n < 2.0 {
        return (total, 0.0);
    }
    let mean = total / n;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (total, (n * var).sqrt())
}

/// PSIS-LOO from a `[draws × observations]` log-likelihood matrix.
pub fn psis_loo(log_lik: &DMatrix<f64>) -> LooResult {
    let weights = psis_loo_weights(log_lik);
    let n_draws = log_lik.nrows() as f64;

    let pointwise: Vec<LooPointwise> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let col: Vec<f64> = log_lik.column(i).iter().copied().collect();
            let lpd = log_sum_exp(&col) - n_draws.ln();
            let weighted: Vec<f64> = col.iter().zip(&w.log_weights).map(|(ll, lw)| ll + lw).collect();
            let elpd_loo = log_sum_exp(&weighted);
            LooPointwise {
                elpd_loo,
                lpd,
                p_loo: lpd - elpd_loo,
                pareto_k: w.pareto_k,
                category: ParetoKCategory::from_k(w.pareto_k),
            }
        })
        .collect();

    let flagged: Vec<usize> = pointwise
        .iter()
        .enumerate()
        .filter(|(_, p)| !(p.pareto_k <= K_THRESHOLD))
        .map(|(i, _)| i)
        .collect();
    for &i in &flagged {
        warn!(
            "observation {i}: Pareto k = {:.3} > {K_THRESHOLD}; LOO estimate unreliable",
            pointwise[i].pareto_k
        );
    }

    let (elpd_loo, se_elpd_loo) = sum_and_se(pointwise.iter().map(|p| p.elpd_loo));
    let (p_loo, se_p_loo) = sum_and_se(pointwise.iter().map(|p| p.p_loo));

    LooResult {
        elpd_loo,
        se_elpd_loo,
        p_loo,
        se_p_loo,
        looic: -2.0 * elpd_loo,
        pointwise,
        flagged,
        weights,
    }
}
