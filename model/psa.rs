//! Probabilistic sensitivity analysis: one random draw of the uncertain
//! inputs per simulated cohort.

use crate::error::SimulationError;
use crate::params::{ModelInputs, TherapyParameters};
use crate::states::{NUM_DISEASE_STATES, NUM_TRANSIENT_STATES, Therapy};
use crate::transition::TransitionMatrix;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{
    Beta, BetaError, Dirichlet, DirichletError, Distribution, Gamma, GammaError, LogNormal,
    NormalError,
};
use thiserror::Error;

/// Coefficient of variation of the gamma-distributed annual costs.
pub const COST_CV: f64 = 0.1;
/// Standard deviation of the beta-distributed utilities, before clamping.
pub const UTILITY_SD: f64 = 0.05;
/// Two-sided 95% normal quantile, used to recover the log-scale spread of the
/// relative risk from its confidence interval.
const Z_95: f64 = 1.959_963_984_540_054;
/// Keeps parameter streams apart from patient streams with the same seed.
const PSA_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Error, Debug)]
pub enum PsaError {
    #[error("Invalid Dirichlet parameters for transition row: {0}")]
    Dirichlet(#[from] DirichletError),

    #[error("Invalid gamma parameters for cost: {0}")]
    Gamma(#[from] GammaError),

    #[error("Invalid beta parameters for utility: {0}")]
    Beta(#[from] BetaError),

    #[error("Invalid log-normal parameters for relative risk: {0}")]
    LogNormal(#[from] NormalError),
}

/// One joint draw of every uncertain input.
#[derive(Debug, Clone)]
pub struct ParameterDraw {
    /// Base inputs with the drawn costs, utilities and relative risk.
    pub inputs: ModelInputs,
    /// Drawn reference matrix; replaces the normalised counts.
    pub base_matrix: TransitionMatrix,
}

impl ParameterDraw {
    pub fn therapy_parameters(&self, therapy: Therapy) -> Result<TherapyParameters, SimulationError> {
        TherapyParameters::with_base_matrix(&self.inputs, therapy, self.base_matrix.clone())
    }
}

/// Draws parameter sets around a base configuration.
///
/// - transition rows: Dirichlet with the observed counts as concentrations
/// - annual state costs: gamma with the base value as mean
/// - utilities: beta with the base value as mean
/// - combination relative risk: log-normal fitted to its 95% interval
#[derive(Debug, Clone)]
pub struct ParameterSampler {
    base: ModelInputs,
    rng: StdRng,
}

impl ParameterSampler {
    pub fn new(base: ModelInputs, seed: u64) -> Self {
        Self {
            base,
            rng: StdRng::seed_from_u64(seed ^ PSA_SEED_SALT),
        }
    }

    /// Sampler whose stream is fixed by the cohort it parameterises.
    pub fn for_cohort(base: &ModelInputs, cohort_id: u64) -> Self {
        Self::new(base.clone(), cohort_id)
    }

    pub fn draw(&mut self) -> Result<ParameterDraw, SimulationError> {
        let base_matrix = TransitionMatrix::new(self.draw_probabilities()?)?;

        let mut inputs = self.base.clone();
        for cost in &mut inputs.annual_state_costs {
            *cost = draw_cost(*cost, &mut self.rng)?;
        }
        for utility in &mut inputs.annual_state_utilities {
            *utility = draw_utility(*utility, &mut self.rng)?;
        }
        let rr = self.draw_relative_risk()?;
        inputs.combo_relative_risk = rr;
        inputs.combo_relative_risk_ci = (rr, rr);

        log::debug!(
            "Drew costs {:?}, utilities {:?}, relative risk {rr:.4}",
            inputs.annual_state_costs,
            inputs.annual_state_utilities
        );
        Ok(ParameterDraw {
            inputs,
            base_matrix,
        })
    }

    fn draw_probabilities(&mut self) -> Result<Array2<f64>, PsaError> {
        let mut probabilities = Array2::<f64>::zeros((NUM_DISEASE_STATES, NUM_DISEASE_STATES));
        for (i, row) in self.base.transition_counts.iter().enumerate() {
            let support: Vec<usize> = (0..row.len()).filter(|&j| row[j] > 0).collect();
            match support.as_slice() {
                [] => {}
                [only] => probabilities[[i, *only]] = 1.0,
                _ => {
                    let alphas: Vec<f64> = support.iter().map(|&j| row[j] as f64).collect();
                    let shares = Dirichlet::new(&alphas)?.sample(&mut self.rng);
                    for (&j, share) in support.iter().zip(shares) {
                        probabilities[[i, j]] = share;
                    }
                }
            }
        }
        for i in NUM_TRANSIENT_STATES..NUM_DISEASE_STATES {
            probabilities[[i, i]] = 1.0;
        }
        Ok(probabilities)
    }

    fn draw_relative_risk(&mut self) -> Result<f64, PsaError> {
        let rr = self.base.combo_relative_risk;
        let (lo, hi) = self.base.combo_relative_risk_ci;
        let sigma = (hi.ln() - lo.ln()) / (2.0 * Z_95);
        Ok(LogNormal::new(rr.ln(), sigma)?.sample(&mut self.rng))
    }
}

fn draw_cost(mean: f64, rng: &mut StdRng) -> Result<f64, PsaError> {
    if mean == 0.0 {
        return Ok(0.0);
    }
    let shape = 1.0 / (COST_CV * COST_CV);
    Ok(Gamma::new(shape, mean / shape)?.sample(rng))
}

/// Method-of-moments beta; the spread shrinks near 0 and 1 so the moments
/// stay attainable.
fn draw_utility(mean: f64, rng: &mut StdRng) -> Result<f64, PsaError> {
    let spread = mean * (1.0 - mean);
    if spread <= 0.0 {
        return Ok(mean);
    }
    let sd = UTILITY_SD.min(0.5 * spread.sqrt());
    let k = spread / (sd * sd) - 1.0;
    Ok(Beta::new(mean * k, (1.0 - mean) * k)?.sample(rng))
}
