//! Log densities and stable reductions.
//!
//! All densities are on the natural-log scale. The Dirichlet density is fully
//! normalized; the LKJ density is returned up to its additive constant, which
//! does not depend on any sampled quantity.

use nalgebra::DMatrix;
use special::Gamma as SpecialGamma;

/// `0.5 * ln(2π)`.
pub const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8;

/// `ln(Σ exp(x_i))`, computed by subtracting the running maximum.
///
/// Returns `-inf` for an empty slice or when every term is `-inf`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

pub fn normal_lpdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    -HALF_LN_2PI - sigma.ln() - 0.5 * z * z
}

/// Half-normal on `[0, ∞)` with scale `sigma`.
pub fn half_normal_lpdf(x: f64, sigma: f64) -> f64 {
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    std::f64::consts::LN_2 + normal_lpdf(x, 0.0, sigma)
}

/// Lognormal density of `y` with log-scale location `mu_log` and scale `sigma`.
pub fn lognormal_lpdf(y: f64, mu_log: f64, sigma: f64) -> f64 {
    if y <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let ln_y = y.ln();
    normal_lpdf(ln_y, mu_log, sigma) - ln_y
}

/// Dirichlet density of a simplex `theta` with concentration `alpha`.
pub fn dirichlet_lpdf(theta: &[f64], alpha: &[f64]) -> f64 {
    let alpha_sum: f64 = alpha.iter().sum();
    let mut lp = SpecialGamma::ln_gamma(alpha_sum).0;
    for (&t, &a) in theta.iter().zip(alpha) {
        lp -= SpecialGamma::ln_gamma(a).0;
        if a != 1.0 {
            lp += (a - 1.0) * t.ln();
        }
    }
    lp
}

/// LKJ density of the correlation matrix `L Lᵀ`, evaluated on its Cholesky factor.
///
/// Includes the Jacobian of `Ω = L Lᵀ`, i.e. this is the density of `L` itself:
/// `Σ_{i=1}^{K-1} (K - i - 1 + 2(η - 1)) ln L_ii`.
pub fn lkj_corr_cholesky_lpdf(l: &DMatrix<f64>, eta: f64) -> f64 {
    let k = l.nrows();
    let mut lp = 0.0;
    for i in 1..k {
        let coef = (k - i - 1) as f64 + 2.0 * (eta - 1.0);
        lp += coef * l[(i, i)].ln();
    }
    lp
}
