//! LOO probability integral transform and its calibration summary.
//!
//! `pit_i = Σ_s w_is · 1[yrep_is <= y_i]` with the PSIS leave-one-out weights of
//! observation `i`. For a calibrated model the values are close to
//! Uniform(0, 1). Calibration is summarized by:
//!
//! - the one-sample Kolmogorov–Smirnov statistic and its asymptotic p-value
//! - the ECDF of the PIT values on a fixed grid, with a pointwise 95% band from
//!   Monte Carlo Uniform(0, 1) reference sets of the same size

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};
use serde::Serialize;

use crate::diagnostics::psis::PsisWeights;

/// Points in the ECDF calibration grid, including 0 and 1.
pub const GRID_POINTS: usize = 101;

/// LOO-PIT value for every observation.
pub fn loo_pit(observed: &[f64], replicates: &DMatrix<f64>, weights: &[PsisWeights]) -> Vec<f64> {
    observed
        .iter()
        .zip(weights)
        .enumerate()
        .map(|(i, (&y, w))| {
            let p: f64 = replicates
                .column(i)
                .iter()
                .zip(&w.log_weights)
                .filter(|(yrep, _)| **yrep <= y)
                .map(|(_, lw)| lw.exp())
                .sum();
            p.clamp(0.0, 1.0)
        })
        .collect()
}

/// `sup_x |F_n(x) - x|` against Uniform(0, 1).
pub fn ks_statistic(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    sorted
        .iter()
        .enumerate()
        .map(|(i, &u)| {
            let above = (i as f64 + 1.0) / n - u;
            let below = u - i as f64 / n;
            above.max(below)
        })
        .fold(0.0, f64::max)
}

/// Asymptotic Kolmogorov p-value with the Stephens small-sample correction.
pub fn ks_p_value(d: f64, n: usize) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let sqrt_n = (n as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    if lambda < 1e-3 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for j in 1..=100 {
        let jf = j as f64;
        let term = (-2.0 * jf * jf * lambda * lambda).exp();
        sum += sign * term;
        if term < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

fn ecdf_on_grid(sorted: &[f64], grid: &[f64]) -> Vec<f64> {
    let n = sorted.len().max(1) as f64;
    grid.iter()
        .map(|&g| sorted.partition_point(|&v| v <= g) as f64 / n)
        .collect()
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationCurve {
    pub grid: Vec<f64>,
    pub ecdf: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl CalibrationCurve {
    /// Grid points where the observed ECDF leaves the reference band.
    pub fn outside_band(&self) -> usize {
        self.ecdf
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .filter(|(e, (lo, hi))| **e < **lo || **e > **hi)
            .count()
    }
}

/// ECDF of `values` against a band from `reference_sets` Uniform(0,1) samples.
pub fn calibration_curve(values: &[f64], reference_sets: usize, seed: u64) -> CalibrationCurve {
    let grid: Vec<f64> = (0..GRID_POINTS)
        .map(|g| g as f64 / (GRID_POINTS - 1) as f64)
        .collect();
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let ecdf = ecdf_on_grid(&sorted, &grid);

    let mut rng = StdRng::seed_from_u64(seed);
    let unit = Uniform::new(0.0, 1.0);
    let mut columns = vec![Vec::with_capacity(reference_sets); grid.len()];
    for _ in 0..reference_sets {
        let mut sample: Vec<f64> = (0..values.len()).map(|_| unit.sample(&mut rng)).collect();
        sample.sort_by(f64::total_cmp);
        for (col, v) in columns.iter_mut().zip(ecdf_on_grid(&sample, &grid)) {
            col.push(v);
        }
    }

    let (lower, upper) = columns
        .iter_mut()
        .map(|col| {
            col.sort_by(f64::total_cmp);
            (quantile_sorted(col, 0.025), quantile_sorted(col, 0.975))
        })
        .unzip();

    CalibrationCurve {
        grid,
        ecdf,
        lower,
        upper,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitSummary {
    pub values: Vec<f64>,
    pub ks_statistic: f64,
    pub ks_p_value: f64,
    pub curve: CalibrationCurve,
}

pub fn summarize_pit(values: Vec<f64>, reference_sets: usize, seed: u64) -> PitSummary {
    let d = ks_statistic(&values);
    let p = ks_p_value(d, values.len());
    let curve = calibration_curve(&values, reference_sets, seed);
    PitSummary {
        values,
        ks_statistic: d,
        ks_p_value: p,
        curve,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::Rng;

    fn uniform_weights(s: usize) -> PsisWeights {
        PsisWeights {
            log_weights: vec![-(s as f64).ln(); s],
            pareto_k: 0.0,
            tail_len: 0,
        }
    }

    #[test]
    fn pit_counts_weighted_replicates_below() {
        let reps = DMatrix::from_column_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let pit = loo_pit(&[2.5], &reps, &[uniform_weights(4)]);
        assert_abs_diff_eq!(pit[0], 0.5, epsilon = 1e-12);

        let skewed = PsisWeights {
            log_weights: [0.7_f64, 0.1, 0.1, 0.1].iter().map(|w| w.ln()).collect(),
            pareto_k: 0.0,
            tail_len: 0,
        };
        let pit = loo_pit(&[1.0], &reps, &[skewed]);
        assert_abs_diff_eq!(pit[0], 0.7, epsilon = 1e-12);
    }

    #[test]
    fn ks_statistic_of_a_perfect_grid() {
        let n = 10;
        let values: Vec<f64> = (0..n).map(|i| (i as f64 + 0.5) / n as f64).collect();
        assert_abs_diff_eq!(ks_statistic(&values), 0.05, epsilon = 1e-12);
        assert!(ks_p_value(0.05, n) > 0.99);
    }

    #[test]
    fn ks_p_value_matches_tabulated_critical_value() {
        // lambda = 1.358 is the 5% critical value of the Kolmogorov distribution.
        let n = 10_000;
        let sqrt_n = (n as f64).sqrt();
        let d = 1.358 / (sqrt_n + 0.12 + 0.11 / sqrt_n);
        assert_abs_diff_eq!(ks_p_value(d, n), 0.05, epsilon = 1e-3);
    }

    #[test]
    fn clustered_values_are_rejected() {
        let values = vec![0.5; 50];
        let d = ks_statistic(&values);
        assert_abs_diff_eq!(d, 0.5, epsilon = 1e-12);
        assert!(ks_p_value(d, 50) < 1e-6);
    }

    #[test]
    fn uniform_values_stay_inside_the_band() {
        let mut rng = StdRng::seed_from_u64(21);
        let values: Vec<f64> = (0..200).map(|_| rng.gen_range(0.0..1.0)).collect();
        let curve = calibration_curve(&values, 500, 3);
        assert_eq!(curve.grid.len(), GRID_POINTS);
        assert_eq!(curve.ecdf[GRID_POINTS - 1], 1.0);
        assert!(curve.lower.iter().zip(&curve.upper).all(|(l, u)| l <= u));
        assert!(curve.outside_band() <= 40, "{}", curve.outside_band());

        let clustered = calibration_curve(&vec![0.5; 200], 500, 3);
        assert!(clustered.outside_band() > 80);
    }
}
