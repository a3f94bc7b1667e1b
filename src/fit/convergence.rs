//! Chain convergence summaries: split R-hat and effective sample size.
//!
//! Both operate on one scalar trace per chain. Split R-hat halves every chain
//! (so a single chain still gets a between-half check). ESS averages the
//! per-chain autocorrelation and truncates the sum at the first non-positive
//! lag.

use serde::Serialize;

/// R-hat above this is reported as a convergence warning.
pub const RHAT_WARN: f64 = 1.05;

const MAX_LAG: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub rhat: Option<f64>,
    pub ess: Option<f64>,
}

impl ParameterSummary {
    pub fn converged(&self) -> bool {
        self.rhat.is_some_and(|r| r.is_finite() && r < RHAT_WARN)
    }
}

fn mean_var(xs: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = if xs.len() > 1 {
        xs.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    (mean, var)
}

/// Split R-hat over equal-length chains. `None` with fewer than 4 draws per chain.
pub fn split_rhat(chains: &[Vec<f64>]) -> Option<f64> {
    let n = chains.iter().map(Vec::len).min()?;
    if n < 4 {
        return None;
    }
    let half = n / 2;
    let mut halves: Vec<&[f64]> = Vec::with_capacity(chains.len() * 2);
    for c in chains {
        halves.push(&c[..half]);
        halves.push(&c[half..2 * half]);
    }

    let stats: Vec<(f64, f64)> = halves.iter().map(|h| mean_var(h)).collect();
    let m = stats.len() as f64;
    let w = stats.iter().map(|s| s.1).sum::<f64>() / m;
    let grand = stats.iter().map(|s| s.0).sum::<f64>() / m;
    let b = half as f64 * stats.iter().map(|s| (s.0 - grand).powi(2)).sum::<f64>() / (m - 1.0);
    if w <= 0.0 {
        // Constant traces: identical halves converge, anything else does not.
        return Some(if b <= 0.0 { 1.0 } else { f64::INFINITY });
    }
    let var_plus = ((half as f64 - 1.0) * w + b) / half as f64;
    Some((var_plus / w).sqrt())
}

fn autocorrelation(xs: &[f64], max_lag: usize) -> Vec<f64> {
    let (mean, _) = mean_var(xs);
    let denom: f64 = xs.iter().map(|&x| (x - mean).powi(2)).sum();
    if denom <= 0.0 {
        return vec![0.0; max_lag];
    }
    (1..=max_lag)
        .map(|lag| {
            xs.iter()
                .zip(&xs[lag..])
                .map(|(&a, &b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / denom
        })
        .collect()
}

/// Effective sample size pooled over chains. `None` with fewer than 10 draws per chain.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> Option<f64> {
    let n = chains.iter().map(Vec::len).min()?;
    if n < 10 {
        return None;
    }
    let max_lag = (n / 2).min(MAX_LAG);
    let mut avg = vec![0.0; max_lag];
    for c in chains {
        for (a, r) in avg.iter_mut().zip(autocorrelation(&c[..n], max_lag)) {
            *a += r / chains.len() as f64;
        }
    }
    let tail: f64 = avg.iter().take_while(|&&r| r > 0.0).sum();
    Some((n * chains.len()) as f64 / (1.0 + 2.0 * tail))
}

/// Summaries for every coordinate of `chains[c][draw][coord]`.
pub fn summarize(names: &[String], chains: &[Vec<Vec<f64>>]) -> Vec<ParameterSummary> {
    names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let traces: Vec<Vec<f64>> = chains
                .iter()
                .map(|c| c.iter().map(|draw| draw[j]).collect())
                .collect();
            let pooled: Vec<f64> = traces.iter().flatten().copied().collect();
            let (mean, var) = mean_var(&pooled);
            ParameterSummary {
                name: name.clone(),
                mean,
                sd: var.sqrt(),
                rhat: split_rhat(&traces),
                ess: effective_sample_size(&traces),
            }
        })
        .collect()
}
