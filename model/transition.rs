use crate::linalg::{self, MatrixFunctionError};
use crate::sampler::{DistributionError, EmpiricalDistribution, ROW_SUM_TOLERANCE};
use crate::states::{
    HealthState, NUM_DISEASE_STATES, NUM_STATES_WITH_BACKGROUND, NUM_TRANSIENT_STATES, Therapy,
};
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Off-diagonal rates below this magnitude are treated as rounding noise
/// rather than a failure of embeddability.
const RATE_NOISE_TOLERANCE: f64 = 1e-12;
/// Above this, the sub-period step is too coarse for the embedding to be trusted.
const MULTIPLE_TRANSITION_WARNING: f64 = 0.05;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Transition counts must be a {expected_rows}x{expected_cols} table, got {rows}x{cols}.")]
    CountShape {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Transition counts out of '{state}' sum to zero; its probabilities are undefined.")]
    EmptyCountRow { state: HealthState },

    #[error("Backward transition from '{from}' to '{to}' is not allowed.")]
    BackwardTransition { from: HealthState, to: HealthState },

    #[error("Relative risk must be finite and positive, but was {0}.")]
    InvalidRelativeRisk(f64),

    #[error(
        "Relative risk leaves '{state}' with forward probability {forward_mass}, which exceeds 1."
    )]
    RelativeRiskTooLarge {
        state: HealthState,
        forward_mass: f64,
    },

    #[error("Background mortality probability must lie in [0, 1), but was {0}.")]
    InvalidMortalityProbability(f64),

    #[error("Step length must be finite and positive, but was {0}.")]
    InvalidStepLength(f64),

    #[error("'{state}' has zero probability of staying put, so no rate matrix reproduces it.")]
    NotEmbeddable { state: HealthState },

    #[error("Row for '{state}' sums to {sum}, expected 1.")]
    RowSum { state: HealthState, sum: f64 },

    #[error("Entry ({row}, {col}) is {value}; probabilities must lie in [0, 1].")]
    InvalidEntry { row: usize, col: usize, value: f64 },

    #[error("Absorbing state '{0}' must keep probability 1 on itself.")]
    LeakyAbsorbingState(HealthState),

    #[error("Matrix must be 4x4 or 5x5, got {rows}x{cols}.")]
    Dimension { rows: usize, cols: usize },

    #[error("Rate matrix conversion failed: {0}")]
    MatrixFunction(#[from] MatrixFunctionError),
}

/// A validated discrete-time transition probability matrix.
///
/// Rows and columns are indexed by `HealthState::index()`. Four states
/// without background mortality, five with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatrix {
    probabilities: Array2<f64>,
}

impl TransitionMatrix {
    /// Builds the reference matrix by normalising each row of raw counts.
    ///
    /// `counts` holds one row per non-absorbing disease state and one column
    /// per disease state (background death is never observed in the counts).
    pub fn from_counts(counts: &[Vec<u64>]) -> Result<Self, ValidationError> {
        let cols = counts.first().map_or(0, Vec::len);
        if counts.len() != NUM_TRANSIENT_STATES || counts.iter().any(|r| r.len() != NUM_DISEASE_STATES)
        {
            return Err(ValidationError::CountShape {
                expected_rows: NUM_TRANSIENT_STATES,
                expected_cols: NUM_DISEASE_STATES,
                rows: counts.len(),
                cols,
            });
        }

        let mut probabilities = Array2::<f64>::zeros((NUM_DISEASE_STATES, NUM_DISEASE_STATES));
        for (i, row) in counts.iter().enumerate() {
            let from = HealthState::ALL[i];
            if let Some(j) = row.iter().take(i).position(|&c| c > 0) {
                return Err(ValidationError::BackwardTransition {
                    from,
                    to: HealthState::ALL[j],
                });
            }
            let total: u64 = row.iter().sum();
            if total == 0 {
                return Err(ValidationError::EmptyCountRow { state: from });
            }
            for (j, &count) in row.iter().enumerate() {
                probabilities[[i, j]] = count as f64 / total as f64;
            }
        }
        for i in NUM_TRANSIENT_STATES..NUM_DISEASE_STATES {
            probabilities[[i, i]] = 1.0;
        }

        Self::new(probabilities)
    }

    /// Wraps a probability matrix after checking every structural invariant.
    pub fn new(probabilities: Array2<f64>) -> Result<Self, ValidationError> {
        let (rows, cols) = probabilities.dim();
        if rows != cols || !(rows == NUM_DISEASE_STATES || rows == NUM_STATES_WITH_BACKGROUND) {
            return Err(ValidationError::Dimension { rows, cols });
        }
        for ((row, col), &value) in probabilities.indexed_iter() {
            if !value.is_finite() || !(0.0..=1.0 + ROW_SUM_TOLERANCE).contains(&value) {
                return Err(ValidationError::InvalidEntry { row, col, value });
            }
            if col < row && value > 0.0 {
                return Err(ValidationError::BackwardTransition {
                    from: HealthState::ALL[row],
                    to: HealthState::ALL[col],
                });
            }
        }
        for (i, row) in probabilities.rows().into_iter().enumerate() {
            let state = HealthState::ALL[i];
            let sum = row.sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(ValidationError::RowSum { state, sum });
            }
            if state.is_terminal() && row[i] != 1.0 {
                return Err(ValidationError::LeakyAbsorbingState(state));
            }
        }
        Ok(Self { probabilities })
    }

    pub fn num_states(&self) -> usize {
        self.probabilities.nrows()
    }

    pub fn has_background_mortality(&self) -> bool {
        self.num_states() == NUM_STATES_WITH_BACKGROUND
    }

    pub fn states(&self) -> &[HealthState] {
        &HealthState::ALL[..self.num_states()]
    }

    pub fn row(&self, state: HealthState) -> ArrayView1<'_, f64> {
        self.probabilities.row(state.index())
    }

    pub fn probability(&self, from: HealthState, to: HealthState) -> f64 {
        self.probabilities[[from.index(), to.index()]]
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.probabilities
    }

    /// Matrix of a risk-reducing therapy: every disease-driven forward
    /// transition is multiplied by `relative_risk` and the self-loop takes up
    /// the slack. Transitions into background death are left untouched.
    pub fn with_relative_risk(&self, relative_risk: f64) -> Result<Self, ValidationError> {
        if !relative_risk.is_finite() || relative_risk <= 0.0 {
            return Err(ValidationError::InvalidRelativeRisk(relative_risk));
        }
        let n = self.num_states();
        let mut scaled = self.probabilities.clone();
        for i in 0..n {
            let state = HealthState::ALL[i];
            if state.is_terminal() {
                continue;
            }
            for j in (i + 1)..n {
                if HealthState::ALL[j] != HealthState::BackgroundDeath {
                    scaled[[i, j]] *= relative_risk;
                }
            }
            let forward_mass: f64 = (0..n).filter(|&j| j != i).map(|j| scaled[[i, j]]).sum();
            if forward_mass > 1.0 + ROW_SUM_TOLERANCE {
                return Err(ValidationError::RelativeRiskTooLarge {
                    state,
                    forward_mass,
                });
            }
            scaled[[i, i]] = (1.0 - forward_mass).max(0.0);
        }
        Self::new(scaled)
    }

    /// Discrete-to-continuous conversion over a unit period.
    ///
    /// The principal matrix logarithm is taken. Negative off-diagonal rates
    /// (a matrix that no generator reproduces exactly) are clipped to zero and
    /// the remaining positive rates of that row rescaled so the row keeps the
    /// logarithm's exit rate; one-period stay probabilities therefore survive
    /// the round trip exactly. The clipped mass is kept on the result.
    pub fn to_rate_matrix(&self) -> Result<RateMatrix, ValidationError> {
        for state in self.states() {
            if !state.is_terminal() && self.probability(*state, *state) <= 0.0 {
                return Err(ValidationError::NotEmbeddable { state: *state });
            }
        }

        let mut rates = linalg::logm(&self.probabilities)?;
        let n = rates.nrows();
        let mut regularized_mass = 0.0;
        for i in 0..n {
            if HealthState::ALL[i].is_terminal() {
                rates.row_mut(i).fill(0.0);
                continue;
            }
            let exit = -rates[[i, i]];
            let mut clipped = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let value = rates[[i, j]];
                if j < i && value.abs() <= RATE_NOISE_TOLERANCE {
                    rates[[i, j]] = 0.0;
                    continue;
                }
                if value < 0.0 {
                    if value < -RATE_NOISE_TOLERANCE {
                        clipped += -value;
                    }
                    rates[[i, j]] = 0.0;
                }
            }
            let positive: f64 = (0..n).filter(|&j| j != i).map(|j| rates[[i, j]]).sum();
            if clipped > 0.0 && positive > 0.0 && exit > 0.0 {
                let scale = exit / positive;
                for j in (0..n).filter(|&j| j != i) {
                    rates[[i, j]] *= scale;
                }
            }
            regularized_mass += clipped;
            let row_exit: f64 = (0..n).filter(|&j| j != i).map(|j| rates[[i, j]]).sum();
            rates[[i, i]] = -row_exit;
        }
        if regularized_mass > 0.0 {
            log::warn!(
                "Transition matrix is not exactly embeddable; clipped {regularized_mass:.6} of negative rate mass"
            );
        }
        Ok(RateMatrix {
            rates,
            regularized_mass,
        })
    }
}

/// An instantaneous-rate generator: non-negative off-diagonal entries and a
/// diagonal equal to the negative row sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateMatrix {
    rates: Array2<f64>,
    regularized_mass: f64,
}

impl RateMatrix {
    pub fn as_array(&self) -> &Array2<f64> {
        &self.rates
    }

    pub fn rate(&self, from: HealthState, to: HealthState) -> f64 {
        self.rates[[from.index(), to.index()]]
    }

    /// Negative rate mass removed when this generator was derived.
    pub fn regularized_mass(&self) -> f64 {
        self.regularized_mass
    }

    /// Adds an independent background-death hazard out of every
    /// non-absorbing state, growing the generator by one absorbing state.
    pub fn with_background_mortality(
        &self,
        annual_probability: f64,
    ) -> Result<Self, ValidationError> {
        if !annual_probability.is_finite() || !(0.0..1.0).contains(&annual_probability) {
            return Err(ValidationError::InvalidMortalityProbability(
                annual_probability,
            ));
        }
        let n = self.rates.nrows();
        if n != NUM_DISEASE_STATES {
            return Err(ValidationError::Dimension { rows: n, cols: n });
        }
        let hazard = -(1.0 - annual_probability).ln();
        let background = HealthState::BackgroundDeath.index();

        let mut rates = Array2::<f64>::zeros((NUM_STATES_WITH_BACKGROUND, NUM_STATES_WITH_BACKGROUND));
        rates
            .slice_mut(ndarray::s![..n, ..n])
            .assign(&self.rates);
        for i in 0..n {
            if !HealthState::ALL[i].is_terminal() {
                rates[[i, background]] += hazard;
                rates[[i, i]] -= hazard;
            }
        }
        Ok(Self {
            rates,
            regularized_mass: self.regularized_mass,
        })
    }

    /// Continuous-to-discrete conversion over `step_length` periods.
    pub fn to_transition_matrix(
        &self,
        step_length: f64,
    ) -> Result<TransitionMatrix, ValidationError> {
        check_step_length(step_length)?;
        let mut probabilities = linalg::expm(&self.rates.mapv(|v| v * step_length))?;
        for ((i, j), value) in probabilities.indexed_iter_mut() {
            if value.abs() < RATE_NOISE_TOLERANCE && (j < i || *value < 0.0) {
                *value = 0.0;
            }
        }
        for (i, mut row) in probabilities.rows_mut().into_iter().enumerate() {
            let sum = row.sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(ValidationError::RowSum {
                    state: HealthState::ALL[i],
                    sum,
                });
            }
            row.mapv_inplace(|v| v / sum);
        }
        TransitionMatrix::new(probabilities)
    }

    /// Largest total exit rate across states.
    pub fn max_exit_rate(&self) -> f64 {
        self.rates
            .diag()
            .iter()
            .map(|v| -v)
            .fold(0.0, f64::max)
    }

    /// Upper bound on the probability of two or more jumps within one step.
    ///
    /// Under uniformisation at rate `λ = max exit rate`, the jump count in a
    /// step of length `Δ` is dominated by a Poisson(λΔ) variable, so the bound
    /// is `1 - e^{-λΔ}(1 + λΔ)`.
    pub fn multiple_transition_bound(&self, step_length: f64) -> f64 {
        let mean_jumps = self.max_exit_rate() * step_length;
        (1.0 - (-mean_jumps).exp() * (1.0 + mean_jumps)).max(0.0)
    }
}

fn check_step_length(step_length: f64) -> Result<(), ValidationError> {
    if !step_length.is_finite() || step_length <= 0.0 {
        return Err(ValidationError::InvalidStepLength(step_length));
    }
    Ok(())
}

/// Background mortality to fold into the reference matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundMortality {
    /// Probability of dying from unrelated causes over one period.
    pub annual_probability: f64,
    /// Sub-period step length of the resulting discrete matrix.
    pub step_length: f64,
}

/// Result of embedding background mortality into a reference matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortalityEmbedding {
    pub matrix: TransitionMatrix,
    pub rates: RateMatrix,
    pub step_length: f64,
    /// Reported, not enforced: large values mean the step is too coarse.
    pub multiple_transition_bound: f64,
}

impl MortalityEmbedding {
    pub fn new(
        base: &TransitionMatrix,
        mortality: BackgroundMortality,
    ) -> Result<Self, ValidationError> {
        check_step_length(mortality.step_length)?;
        if base.has_background_mortality() {
            let n = base.num_states();
            return Err(ValidationError::Dimension { rows: n, cols: n });
        }
        let rates = base
            .to_rate_matrix()?
            .with_background_mortality(mortality.annual_probability)?;
        let matrix = rates.to_transition_matrix(mortality.step_length)?;
        let multiple_transition_bound = rates.multiple_transition_bound(mortality.step_length);
        if multiple_transition_bound > MULTIPLE_TRANSITION_WARNING {
            log::warn!(
                "Step length {} allows two or more transitions per step with probability up to {multiple_transition_bound:.4}",
                mortality.step_length
            );
        }
        Ok(Self {
            matrix,
            rates,
            step_length: mortality.step_length,
            multiple_transition_bound,
        })
    }
}

/// Raw inputs from which every therapy's matrix is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionInputs {
    pub counts: Vec<Vec<u64>>,
    pub relative_risk: f64,
    pub background_mortality: Option<BackgroundMortality>,
}

#[derive(Error, Debug)]
pub enum TransitionModelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

/// The matrix a therapy is simulated with, plus one sampler per row.
///
/// Built once per therapy and shared read-only by every patient.
#[derive(Debug, Clone)]
pub struct TransitionModel {
    therapy: Therapy,
    matrix: TransitionMatrix,
    rows: Vec<EmpiricalDistribution>,
    embedding: Option<MortalityEmbedding>,
}

impl TransitionModel {
    /// Reference matrix from counts, background mortality folded in if
    /// requested, then the therapy's relative risk applied.
    pub fn build(inputs: &TransitionInputs, therapy: Therapy) -> Result<Self, TransitionModelError> {
        let base = TransitionMatrix::from_counts(&inputs.counts)?;
        Self::from_base(
            base,
            inputs.relative_risk,
            inputs.background_mortality,
            therapy,
        )
    }

    /// Same as [`TransitionModel::build`] for an already normalised reference
    /// matrix, e.g. one drawn during sensitivity analysis.
    pub fn from_base(
        base: TransitionMatrix,
        relative_risk: f64,
        background_mortality: Option<BackgroundMortality>,
        therapy: Therapy,
    ) -> Result<Self, TransitionModelError> {
        let (reference, embedding) = match background_mortality {
            Some(mortality) => {
                let embedding = MortalityEmbedding::new(&base, mortality)?;
                (embedding.matrix.clone(), Some(embedding))
            }
            None => (base, None),
        };
        let matrix = match therapy {
            Therapy::Mono => reference,
            Therapy::Combo => reference.with_relative_risk(relative_risk)?,
        };

        log::debug!(
            "Built {}x{} transition matrix for {therapy}{}",
            matrix.num_states(),
            matrix.num_states(),
            embedding.as_ref().map_or(String::new(), |e| format!(
                " with background mortality (step {}, multi-transition bound {:.4})",
                e.step_length, e.multiple_transition_bound
            ))
        );

        let mut model = Self::from_matrix(matrix, therapy)?;
        model.embedding = embedding;
        Ok(model)
    }

    pub fn from_matrix(matrix: TransitionMatrix, therapy: Therapy) -> Result<Self, TransitionModelError> {
        let rows = matrix
            .as_array()
            .rows()
            .into_iter()
            .map(|row| EmpiricalDistribution::new(&row.to_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            therapy,
            matrix,
            rows,
            embedding: None,
        })
    }

    pub fn therapy(&self) -> Therapy {
        self.therapy
    }

    pub fn matrix(&self) -> &TransitionMatrix {
        &self.matrix
    }

    pub fn embedding(&self) -> Option<&MortalityEmbedding> {
        self.embedding.as_ref()
    }

    /// Draws the state a patient in `current` occupies one step later.
    pub fn next_state<R: Rng + ?Sized>(&self, current: HealthState, rng: &mut R) -> HealthState {
        let index = self.rows[current.index()].sample(rng);
        HealthState::ALL[index]
    }
}
