//! Constraining transforms between the sampler's unconstrained space and the
//! model's constrained parameters.
//!
//! Every `*_constrain` function returns the constrained value together with the
//! log absolute determinant of its Jacobian, so that a density on the
//! constrained space becomes a density on `ℝ^d` by simple addition.
//!
//! Provided transforms:
//! - positive scalars: `x = exp(y)`
//! - simplexes: stick-breaking with a centering offset, `K - 1` free coordinates
//! - correlation Cholesky factors: canonical partial correlations through `tanh`,
//!   `K (K - 1) / 2` free coordinates, filled row by row below the diagonal

use nalgebra::DMatrix;

/// Stable `ln(1 + exp(x))`.
pub fn softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

fn inv_logit(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// `x = exp(y)`, log-Jacobian `y`.
pub fn positive_constrain(y: f64) -> (f64, f64) {
    (y.exp(), y)
}

/// Map `K - 1` unconstrained values onto a `K`-simplex.
///
/// The offset `ln(K - 1 - i)` makes `y = 0` map to the uniform simplex.
pub fn simplex_constrain(y: &[f64]) -> (Vec<f64>, f64) {
    let n = y.len();
    let mut x = Vec::with_capacity(n + 1);
    let mut stick = 1.0_f64;
    let mut log_jac = 0.0;
    for (i, &yi) in y.iter().enumerate() {
        let adj = yi - ((n - i) as f64).ln();
        let z = inv_logit(adj);
        let xi = stick * z;
        // ln z = -softplus(-adj), ln(1 - z) = -softplus(adj)
        log_jac += stick.ln() - softplus(-adj) - softplus(adj);
        stick -= xi;
        x.push(xi);
    }
    x.push(stick.max(0.0));
    (x, log_jac)
}

/// Inverse of [`simplex_constrain`].
pub fn simplex_unconstrain(x: &[f64]) -> Vec<f64> {
    let n = x.len().saturating_sub(1);
    let mut y = Vec::with_capacity(n);
    let mut stick = 1.0_f64;
    for (i, &xi) in x.iter().take(n).enumerate() {
        let z = (xi / stick).clamp(1e-12, 1.0 - 1e-12);
        y.push(logit(z) + ((n - i) as f64).ln());
        stick -= xi;
    }
    y
}

/// Number of free coordinates of a `k × k` correlation Cholesky factor.
pub fn cholesky_corr_free_len(k: usize) -> usize {
    k * k.saturating_sub(1) / 2
}

/// Build a lower-triangular `L` with unit-norm rows from canonical partial
/// correlations `tanh(y)`.
pub fn cholesky_corr_constrain(y: &[f64], k: usize) -> (DMatrix<f64>, f64) {
    let mut l = DMatrix::<f64>::zeros(k, k);
    if k == 0 {
        return (l, 0.0);
    }
    l[(0, 0)] = 1.0;

    let mut log_jac = 0.0;
    let mut pos = 0;
    for i in 1..k {
        let mut sum_sqs = 0.0_f64;
        for j in 0..i {
            let z = y[pos].tanh();
            pos += 1;
            // d tanh / dy = 1 - tanh²
            log_jac += (-(z * z)).ln_1p();
            if j == 0 {
                l[(i, 0)] = z;
            } else {
                log_jac += 0.5 * (-sum_sqs).ln_1p();
                l[(i, j)] = z * (1.0 - sum_sqs).sqrt();
            }
            sum_sqs += l[(i, j)] * l[(i, j)];
        }
        l[(i, i)] = (1.0 - sum_sqs).max(0.0).sqrt();
    }
    (l, log_jac)
}

/// Inverse of [`cholesky_corr_constrain`].
pub fn cholesky_corr_unconstrain(l: &DMatrix<f64>) -> Vec<f64> {
    let k = l.nrows();
    let mut y = Vec::with_capacity(cholesky_corr_free_len(k));
    for i in 1..k {
        let mut sum_sqs = 0.0_f64;
        for j in 0..i {
            let z = if j == 0 {
                l[(i, 0)]
            } else {
                l[(i, j)] / (1.0 - sum_sqs).sqrt()
            };
            y.push(z.clamp(-1.0 + 1e-12, 1.0 - 1e-12).atanh());
            sum_sqs += l[(i, j)] * l[(i, j)];
        }
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_maps_to_uniform_simplex() {
        let (x, _) = simplex_constrain(&[0.0, 0.0, 0.0]);
        for v in x {
            assert_abs_diff_eq!(v, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn simplex_inverse_recovers_input() {
        let y = [0.7, -1.2, 2.4];
        let (x, _) = simplex_constrain(&y);
        assert_abs_diff_eq!(x.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for (a, b) in simplex_unconstrain(&x).iter().zip(&y) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn simplex_log_jacobian_matches_finite_difference_for_two_components() {
        // K = 2: x0 = inv_logit(y), |dx0/dy| = x0 (1 - x0).
        let y = 0.8;
        let (x, lj) = simplex_constrain(&[y]);
        assert_abs_diff_eq!(lj, (x[0] * x[1]).ln(), epsilon = 1e-12);
    }

    #[test]
    fn correlation_factor_has_unit_rows() {
        let y = [0.3, -1.1, 2.0];
        let (l, lj) = cholesky_corr_constrain(&y, 3);
        assert!(lj.is_finite());
        let omega = &l * l.transpose();
        for i in 0..3 {
            assert_abs_diff_eq!(omega[(i, i)], 1.0, epsilon = 1e-12);
            assert!(l[(i, i)] > 0.0);
        }
        for (a, b) in cholesky_corr_unconstrain(&l).iter().zip(&y) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }
}
