//! Adaptive random-walk Metropolis.
//!
//! A small reference [`Sampler`] so the pipeline runs end to end without an
//! external gradient-based sampler plugged in. It is not tuned for large
//! hierarchical models.
//!
//! Per chain:
//! - start from the target's initial point plus a small jitter (retried until finite)
//! - propose `x' = x + ε · s ⊙ z`, `z ~ N(0, I)`
//! - during warm-up, adapt `ε` towards a 0.234 acceptance rate (Robbins–Monro on
//!   `ln ε`) and `s` to the running per-coordinate standard deviation
//!
//! Chains run in parallel and each owns its RNG, seeded from `(seed, chain)`.

use log::debug;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::fit::sampler::{
    CancelToken, ChainDiagnostics, LogDensity, Sampler, SamplerConfig, SamplerError, SamplerOutput,
};

const TARGET_ACCEPT: f64 = 0.234;
const MAX_INIT_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetropolisSampler {
    pub initial_step: f64,
    pub init_jitter: f64,
}

impl Default for MetropolisSampler {
    fn default() -> Self {
        Self {
            initial_step: 0.1,
            init_jitter: 0.1,
        }
    }
}

/// Independent seed for stream `stream` (a chain or a draw) of a run seed.
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    // SplitMix64 finalizer over the pair.
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Welford running mean/variance per coordinate.
struct RunningMoments {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningMoments {
    fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    fn push(&mut self, x: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for ((m, m2), &v) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(x) {
            let d = v - *m;
            *m += d / n;
            *m2 += d * (v - *m);
        }
    }

    fn sd(&self) -> Option<Vec<f64>> {
        if self.n < 10 {
            return None;
        }
        let denom = (self.n - 1) as f64;
        Some(self.m2.iter().map(|m2| (m2 / denom).sqrt().max(1e-6)).collect())
    }
}

impl MetropolisSampler {
    fn run_chain<D: LogDensity>(
        &self,
        target: &D,
        config: &SamplerConfig,
        chain: usize,
        cancel: &CancelToken,
    ) -> Result<(Vec<Vec<f64>>, ChainDiagnostics), SamplerError> {
        let dim = target.dim();
        let mut rng = StdRng::seed_from_u64(stream_seed(config.seed, chain as u64));

        let init = target.initial_point();
        let mut x = Vec::new();
        let mut lp = f64::NEG_INFINITY;
        for _ in 0..MAX_INIT_ATTEMPTS {
            x = init
                .iter()
                .map(|&v| v + rng.gen_range(-self.init_jitter..=self.init_jitter))
                .collect();
            lp = target.log_density(&x);
            if lp.is_finite() {
                break;
            }
        }
        if !lp.is_finite() {
            return Err(SamplerError::NoFiniteStart {
                chain,
                attempts: MAX_INIT_ATTEMPTS,
            });
        }

        let mut log_step = self.initial_step.ln();
        let mut scale = vec![1.0; dim];
        let mut moments = RunningMoments::new(dim);
        let mut accepted = 0usize;
        let mut rejected_non_finite = 0usize;
        let mut draws = Vec::with_capacity(config.iterations);
        let mut proposal = vec![0.0; dim];

        for iter in 0..(config.warmup + config.iterations) {
            if cancel.is_cancelled() {
                return Err(SamplerError::Cancelled);
            }
            let step = log_step.exp();
            for ((p, &xi), &si) in proposal.iter_mut().zip(&x).zip(&scale) {
                let z: f64 = StandardNormal.sample(&mut rng);
                *p = xi + step * si * z;
            }
            let lp_new = target.log_density(&proposal);
            let log_ratio = if lp_new.is_finite() {
                lp_new - lp
            } else {
                rejected_non_finite += 1;
                f64::NEG_INFINITY
            };
            let accept_prob = log_ratio.min(0.0).exp();
            let u: f64 = rng.gen_range(0.0..1.0);
            if u < accept_prob {
                x.copy_from_slice(&proposal);
                lp = lp_new;
                if iter >= config.warmup {
                    accepted += 1;
                }
            }

            if iter < config.warmup {
                let t = (iter + 1) as f64;
                log_step += (accept_prob - TARGET_ACCEPT) / t.sqrt();
                moments.push(&x);
                // Re-estimate the proposal shape at a few fixed points.
                if (iter + 1) % 100 == 0 {
                    if let Some(sd) = moments.sd() {
                        scale = sd;
                    }
                }
            } else {
                draws.push(x.clone());
            }
        }

        let diag = ChainDiagnostics {
            chain,
            acceptance_rate: accepted as f64 / config.iterations as f64,
            rejected_non_finite,
            step_size: log_step.exp(),
            draws: draws.len(),
        };
        debug!(
            "chain {chain}: accept={:.3} step={:.4} non_finite={}",
            diag.acceptance_rate, diag.step_size, diag.rejected_non_finite
        );
        Ok((draws, diag))
    }
}

impl Sampler for MetropolisSampler {
    fn sample<D: LogDensity>(
        &self,
        target: &D,
        config: &SamplerConfig,
        cancel: &CancelToken,
    ) -> Result<SamplerOutput, SamplerError> {
        config.validate()?;

        let results: Vec<(Vec<Vec<f64>>, ChainDiagnostics)> = (0..config.chains)
            .into_par_iter()
            .map(|chain| self.run_chain(target, config, chain, cancel))
            .collect::<Result<_, _>>()?;

        if cancel.is_cancelled() {
            return Err(SamplerError::Cancelled);
        }

        let (chains, diagnostics) = results.into_iter().unzip();
        Ok(SamplerOutput {
            chains,
            diagnostics,
        })
    }
}
