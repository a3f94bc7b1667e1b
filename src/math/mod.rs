//! Mathematical utilities: growth curves, log densities and constraining transforms.

pub mod density;
pub mod growth;
pub mod transforms;

pub use density::*;
pub use growth::*;
pub use transforms::*;
