//! Synthetic data and covariate preprocessing.

pub mod simulate;
pub mod standardize;

pub use simulate::*;
pub use standardize::*;
