//! Non-centered multivariate site effects.
//!
//! Site deviations are never sampled directly. The sampler sees a raw
//! standard-normal matrix `z` (sites × parameters) and the deviations are
//!
//! ```text
//! effects = ((diag(tau) · L) · zᵀ)ᵀ
//! ```
//!
//! so each site row is `diag(tau) L z_s ~ MVN(0, diag(tau) Ω diag(tau))` with
//! `Ω = L Lᵀ`. Keeping `z` free of scale and correlation avoids the funnel the
//! centered form develops as `tau → 0`.
//!
//! Site growth parameters then follow from the log link:
//! `log θ_{s,p} = mu_p + slopes_p · x_s + effects_{s,p}`.

use nalgebra::DMatrix;

use crate::domain::{
    CorrelationCholesky, GrowthParam, ModelParameters, ModelVariant, SiteGrowth, Sites,
};
use crate::error::ModelError;

/// Correlated site deviations from raw effects, scales and a correlation factor.
pub fn site_effects(
    raw: &DMatrix<f64>,
    scale: &[f64],
    correlation: &CorrelationCholesky,
) -> Result<DMatrix<f64>, ModelError> {
    let p = correlation.dim();
    if raw.ncols() != p {
        return Err(ModelError::DimensionMismatch {
            what: "raw effect columns",
            expected: p,
            got: raw.ncols(),
        });
    }
    if scale.len() != p {
        return Err(ModelError::DimensionMismatch {
            what: "effect scales",
            expected: p,
            got: scale.len(),
        });
    }
    if let Some(&s) = scale.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(ModelError::InvalidHyperparameter {
            name: "tau",
            reason: format!("scales must be finite and > 0, got {s}"),
        });
    }

    let scaled_l = DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(scale))
        * correlation.factor();
    Ok((scaled_l * raw.transpose()).transpose())
}

/// Log-scale linear predictor of `param` at site `s`, before the random effect.
fn fixed_predictor(
    params: &ModelParameters,
    variant: ModelVariant,
    sites: &Sites,
    s: usize,
    param: GrowthParam,
) -> f64 {
    let col = variant.column(param).unwrap_or(0);
    let mut eta = params.global.mu[col];
    let slopes = params.global.slopes.as_ref().and_then(|b| b.for_param(param));
    let covariates = sites.get(s).and_then(|site| site.covariates);
    if let (Some(beta), Some(x)) = (slopes, covariates) {
        eta += beta.iter().zip(x.design()).map(|(b, v)| b * v).sum::<f64>();
    }
    eta
}

/// Per-site `(L0, Linf, k)` after the log link. L0 is `None` when not modeled.
pub fn site_growth(
    params: &ModelParameters,
    variant: ModelVariant,
    sites: &Sites,
) -> Result<Vec<SiteGrowth>, ModelError> {
    if params.raw_effects.nrows() != sites.len() {
        return Err(ModelError::DimensionMismatch {
            what: "raw effect rows",
            expected: sites.len(),
            got: params.raw_effects.nrows(),
        });
    }
    let effects = site_effects(&params.raw_effects, &params.global.tau, &params.correlation)?;

    let value = |s: usize, param: GrowthParam| -> Option<f64> {
        let col = variant.column(param)?;
        Some((fixed_predictor(params, variant, sites, s, param) + effects[(s, col)]).exp())
    };

    (0..sites.len())
        .map(|s| {
            let linf = value(s, GrowthParam::Linf).ok_or(ModelError::NonFinite("Linf"))?;
            let k = value(s, GrowthParam::K).ok_or(ModelError::NonFinite("k"))?;
            Ok(SiteGrowth {
                l0: value(s, GrowthParam::L0),
                linf,
                k,
            })
        })
        .collect()
}
