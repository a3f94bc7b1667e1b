//! Hierarchical growth model.
//!
//! Likelihood pieces are small, pure functions over domain types so the
//! composer and the diagnostics engine can share them:
//!
//! - site effects (non-centered, correlated)
//! - census length mixture over latent age classes
//! - recapture increment likelihood
//! - unconstrained parameter layout
//! - joint log density

pub mod composer;
pub mod effects;
pub mod increment;
pub mod layout;
pub mod mixture;

pub use composer::*;
pub use effects::*;
pub use increment::*;
pub use layout::*;
pub use mixture::*;
