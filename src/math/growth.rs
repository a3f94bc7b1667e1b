//! Von Bertalanffy growth curves.
//!
//! Two forms are used:
//!
//! - age-based: `L(a) = L0 + (Linf - L0) (1 - exp(-k (a - 1)))`, valid for `a >= 1`
//! - time-based: `L(t) = L1 + (Linf - L1) (1 - exp(-k t / 365))` with `t` in days
//!
//! Numerical notes:
//! - `1 - exp(-x)` is computed as `-expm1(-x)` so short intervals keep full precision.
//! - At `a = 1` the saturation term is exactly zero, so `age_mean` returns `L0`
//!   bit-for-bit.
//! - Nothing here clamps. If `initial_length > Linf` the time-based form predicts
//!   shrinkage and that value is returned as is.

/// Days per year used to convert elapsed days into the growth-rate time unit.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Fraction of the remaining distance to `Linf` covered after `x = k·Δt`.
fn saturation(x: f64) -> f64 {
    -(-x).exp_m1()
}

/// Expected length at age class `age` (1-based, `age >= 1`).
pub fn age_mean(age: f64, l0: f64, linf: f64, k: f64) -> f64 {
    l0 + (linf - l0) * saturation(k * (age - 1.0))
}

/// Expected length after `days` of growth from `initial_length`.
pub fn increment_mean(initial_length: f64, linf: f64, k: f64, days: f64) -> f64 {
    initial_length + (linf - initial_length) * saturation(k * days / DAYS_PER_YEAR)
}

/// Expected lengths for age classes `1..=n_ages`.
pub fn age_means(n_ages: usize, l0: f64, linf: f64, k: f64) -> Vec<f64> {
    (1..=n_ages)
        .map(|a| age_mean(a as f64, l0, linf, k))
        .collect()
}
