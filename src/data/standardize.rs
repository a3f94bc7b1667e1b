//! Site covariate standardization: `(x - mean) / (2 sd)`.
//!
//! Dividing by two standard deviations puts continuous inputs on roughly the
//! scale of a binary predictor, so the Normal(0, 1) slope prior means the same
//! thing for temperature, effort and their interaction.

use log::warn;

use crate::domain::SiteCovariates;

/// Standardize one column. A constant column (or fewer than two values)
/// becomes all zeros.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let sd = var.sqrt();
    if !(sd > 0.0 && sd.is_finite()) {
        return vec![0.0; n];
    }
    values.iter().map(|v| (v - mean) / (2.0 * sd)).collect()
}

/// Standardize temperature and effort across sites.
pub fn standardize_covariates(raw: &[SiteCovariates]) -> Vec<SiteCovariates> {
    let temps: Vec<f64> = raw.iter().map(|c| c.temperature).collect();
    let efforts: Vec<f64> = raw.iter().map(|c| c.effort).collect();
    for (name, col) in [("temperature", &temps), ("effort", &efforts)] {
        if col.len() > 1 && col.iter().all(|v| *v == col[0]) {
            warn!("covariate '{name}' is constant across sites; its slopes are not identified");
        }
    }
    standardize(&temps)
        .into_iter()
        .zip(standardize(&efforts))
        .map(|(temperature, effort)| SiteCovariates { temperature, effort })
        .collect()
}
