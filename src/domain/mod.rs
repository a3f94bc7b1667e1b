//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - sites and validated observations (`Site`, `CensusObservation`, `RecaptureObservation`)
//! - constrained parameter containers (`MixtureWeights`, `CorrelationCholesky`, `ModelParameters`)
//! - posterior draws (`PosteriorSampleSet`) and run configuration (`FitConfig`, `Priors`)

pub mod types;

pub use types::*;
