//! Sampler output on the constrained scale.

use rayon::prelude::*;

use crate::domain::{PosteriorDraw, PosteriorSampleSet};
use crate::error::ModelError;
use crate::fit::sampler::SamplerOutput;
use crate::models::layout::ParameterLayout;

/// Constrain every unconstrained draw, keeping chain membership.
pub fn posterior_from_output(
    layout: &ParameterLayout,
    output: &SamplerOutput,
) -> Result<PosteriorSampleSet, ModelError> {
    let chains = output
        .chains
        .iter()
        .map(|chain| {
            chain
                .par_iter()
                .map(|x| layout.constrain(x).map(|(params, _)| params))
                .collect::<Result<Vec<PosteriorDraw>, ModelError>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PosteriorSampleSet::from_chains(chains))
}
