//! Prior hyperparameter JSON files.
//!
//! Every field of [`Priors`] has a default, so a file may override any subset:
//!
//! ```json
//! { "mu_log_linf": { "mean": 6.0, "sd": 0.5 }, "tau_scale": 0.25 }
//! ```

use std::fs::File;
use std::path::Path;

use crate::domain::Priors;
use crate::error::AppError;

/// Read and validate a priors JSON file.
pub fn read_priors_json(path: &Path) -> Result<Priors, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open priors JSON '{}': {e}", path.display())))?;
    let priors: Priors =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid priors JSON: {e}")))?;
    priors.validate()?;
    Ok(priors)
}
