//! Flat unconstrained parameter vector handed to the sampler.
//!
//! Block order:
//!
//! | block | length | transform |
//! | --- | --- | --- |
//! | `mu` | `P` | identity |
//! | `slopes` | `6` (covariates only) | identity |
//! | `log sigma_census` | `1` (census variant only) | `exp` |
//! | `log sigma_cmr` | `1` | `exp` |
//! | `log tau` | `P` | `exp` |
//! | correlation CPCs | `P (P - 1) / 2` | `tanh` + Cholesky fill |
//! | raw effects `z` | `S × P`, site-major | identity |
//! | simplex coordinates | `S × (A - 1)` (census variant only) | stick-breaking |

use std::ops::Range;

use nalgebra::DMatrix;

use crate::domain::{
    CorrelationCholesky, CovariateSlopes, GlobalParameters, ModelParameters, ModelVariant,
    MixtureWeights,
};
use crate::error::ModelError;
use crate::math::{
    cholesky_corr_constrain, cholesky_corr_free_len, cholesky_corr_unconstrain,
    positive_constrain, simplex_constrain, simplex_unconstrain,
};

pub const N_SLOPES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    pub variant: ModelVariant,
    pub n_sites: usize,
    pub n_ages: usize,
    pub covariates: bool,
}

impl ParameterLayout {
    pub fn n_params(&self) -> usize {
        self.variant.n_params()
    }

    fn n_slopes(&self) -> usize {
        if self.covariates { N_SLOPES } else { 0 }
    }

    fn n_simplex_free(&self) -> usize {
        if self.variant.has_census() {
            self.n_sites * self.n_ages.saturating_sub(1)
        } else {
            0
        }
    }

    pub fn mu(&self) -> Range<usize> {
        0..self.n_params()
    }

    pub fn slopes(&self) -> Range<usize> {
        let start = self.mu().end;
        start..start + self.n_slopes()
    }

    pub fn sigma_census(&self) -> Option<usize> {
        self.variant.has_census().then_some(self.slopes().end)
    }

    pub fn sigma_cmr(&self) -> usize {
        self.slopes().end + usize::from(self.variant.has_census())
    }

    pub fn tau(&self) -> Range<usize> {
        let start = self.sigma_cmr() + 1;
        start..start + self.n_params()
    }

    pub fn correlation(&self) -> Range<usize> {
        let start = self.tau().end;
        start..start + cholesky_corr_free_len(self.n_params())
    }

    pub fn raw_effects(&self) -> Range<usize> {
        let start = self.correlation().end;
        start..start + self.n_sites * self.n_params()
    }

    pub fn simplexes(&self) -> Range<usize> {
        let start = self.raw_effects().end;
        start..start + self.n_simplex_free()
    }

    pub fn dim(&self) -> usize {
        self.simplexes().end
    }

    /// Map an unconstrained vector to model parameters plus the log-Jacobian.
    pub fn constrain(&self, x: &[f64]) -> Result<(ModelParameters, f64), ModelError> {
        if x.len() != self.dim() {
            return Err(ModelError::DimensionMismatch {
                what: "unconstrained parameter vector",
                expected: self.dim(),
                got: x.len(),
            });
        }
        let p = self.n_params();
        let mut log_jac = 0.0;

        let slopes = self.covariates.then(|| {
            let b = &x[self.slopes()];
            CovariateSlopes {
                linf: [b[0], b[1], b[2]],
                k: [b[3], b[4], b[5]],
            }
        });

        let sigma_census = self.sigma_census().map(|i| {
            let (v, lj) = positive_constrain(x[i]);
            log_jac += lj;
            v
        });
        let (sigma_cmr, lj) = positive_constrain(x[self.sigma_cmr()]);
        log_jac += lj;

        let tau: Vec<f64> = x[self.tau()]
            .iter()
            .map(|&y| {
                let (v, lj) = positive_constrain(y);
                log_jac += lj;
                v
            })
            .collect();

        let (l, lj) = cholesky_corr_constrain(&x[self.correlation()], p);
        log_jac += lj;
        let correlation = CorrelationCholesky::new(l)?;

        let raw_effects = DMatrix::from_row_slice(self.n_sites, p, &x[self.raw_effects()]);

        let mut weights = Vec::new();
        if self.variant.has_census() {
            let width = self.n_ages.saturating_sub(1);
            let block = &x[self.simplexes()];
            weights.reserve(self.n_sites);
            for s in 0..self.n_sites {
                let (theta, lj) = simplex_constrain(&block[s * width..(s + 1) * width]);
                log_jac += lj;
                weights.push(MixtureWeights::new(theta)?);
            }
        }

        let params = ModelParameters {
            global: GlobalParameters {
                mu: x[self.mu()].to_vec(),
                slopes,
                sigma_census,
                sigma_cmr,
                tau,
            },
            correlation,
            raw_effects,
            weights,
        };
        Ok((params, log_jac))
    }

    /// Inverse of [`ParameterLayout::constrain`].
    pub fn unconstrain(&self, params: &ModelParameters) -> Result<Vec<f64>, ModelError> {
        let p = self.n_params();
        if params.global.mu.len() != p || params.global.tau.len() != p {
            return Err(ModelError::DimensionMismatch {
                what: "global parameters",
                expected: p,
                got: params.global.mu.len(),
            });
        }
        if params.raw_effects.shape() != (self.n_sites, p) {
            return Err(ModelError::DimensionMismatch {
                what: "raw effect rows",
                expected: self.n_sites,
                got: params.raw_effects.nrows(),
            });
        }

        let mut x = Vec::with_capacity(self.dim());
        x.extend_from_slice(&params.global.mu);
        if self.covariates {
            let b = params.global.slopes.unwrap_or_default();
            x.extend_from_slice(&b.linf);
            x.extend_from_slice(&b.k);
        }
        if self.variant.has_census() {
            let sigma = params
                .global
                .sigma_census
                .ok_or(ModelError::NonFinite("sigma_census"))?;
            x.push(sigma.ln());
        }
        x.push(params.global.sigma_cmr.ln());
        x.extend(params.global.tau.iter().map(|t| t.ln()));
        x.extend(cholesky_corr_unconstrain(params.correlation.factor()));
        for s in 0..self.n_sites {
            x.extend(params.raw_effects.row(s).iter().copied());
        }
        if self.variant.has_census() {
            if params.weights.len() != self.n_sites {
                return Err(ModelError::DimensionMismatch {
                    what: "mixture weights",
                    expected: self.n_sites,
                    got: params.weights.len(),
                });
            }
            for w in &params.weights {
                x.extend(simplex_unconstrain(w.as_slice()));
            }
        }
        Ok(x)
    }

    /// Names of the unconstrained coordinates, for logs and exports.
    pub fn names(&self) -> Vec<String> {
        let params = self.variant.params();
        let mut names = Vec::with_capacity(self.dim());
        names.extend(params.iter().map(|p| format!("mu[{}]", p.name())));
        if self.covariates {
            for target in ["Linf", "k"] {
                for term in ["temp", "effort", "temp:effort"] {
                    names.push(format!("beta[{target},{term}]"));
                }
            }
        }
        if self.variant.has_census() {
            names.push("log_sigma_census".to_string());
        }
        names.push("log_sigma_cmr".to_string());
        names.extend(params.iter().map(|p| format!("log_tau[{}]", p.name())));
        names.extend(self.correlation().enumerate().map(|(i, _)| format!("cpc[{i}]")));
        for s in 0..self.n_sites {
            names.extend(params.iter().map(|p| format!("z[{s},{}]", p.name())));
        }
        for s in 0..self.n_simplex_free() / self.n_ages.saturating_sub(1).max(1) {
            for a in 0..self.n_ages.saturating_sub(1) {
                names.push(format!("theta_free[{s},{a}]"));
            }
        }
        names
    }
}
