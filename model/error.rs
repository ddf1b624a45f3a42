use crate::params::ConfigurationError;
use crate::psa::PsaError;
use crate::sampler::DistributionError;
use crate::transition::{TransitionModelError, ValidationError};
use thiserror::Error;

/// Error type for building and running cohorts.
///
/// Every failure is raised synchronously at construction time; a cohort that
/// was built successfully simulates without further error conditions.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid transition model input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transition row cannot be sampled: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Parameter sampling failed: {0}")]
    Sampling(#[from] PsaError),

    #[error("Cannot compare cohorts of {base} and {alternative} patients; paired outcomes need equal sizes.")]
    UnpairedCohorts { base: usize, alternative: usize },
}

impl From<TransitionModelError> for SimulationError {
    fn from(err: TransitionModelError) -> Self {
        match err {
            TransitionModelError::Validation(e) => Self::Validation(e),
            TransitionModelError::Distribution(e) => Self::Distribution(e),
        }
    }
}
