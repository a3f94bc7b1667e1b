//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - prior hyperparameter JSON (`priors`)
//! - result exports (CSV/JSON) and simulated datasets (`export`)

pub mod export;
pub mod ingest;
pub mod priors;

pub use export::*;
pub use ingest::*;
pub use priors::*;
