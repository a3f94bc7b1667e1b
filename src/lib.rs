//! `vbgrowth` library crate.
//!
//! Hierarchical von Bertalanffy growth model for fish length data (census
//! lengths and mark-recapture increments across sites), with PSIS-LOO and
//! LOO-PIT posterior predictive diagnostics.
//!
//! The binary (`vbg`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the sampler can be swapped behind [`fit::Sampler`]
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
