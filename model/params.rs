use crate::econ::{CostUtilityTable, DiscountConvention, Discounting, StepEconomics};
use crate::error::SimulationError;
use crate::states::{HealthState, NUM_DISEASE_STATES, NUM_TRANSIENT_STATES, Therapy};
use crate::transition::{BackgroundMortality, TransitionInputs, TransitionMatrix, TransitionModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Population size must be positive.")]
    EmptyPopulation,

    #[error("At least one cohort must be simulated.")]
    NoCohorts,

    #[error("Simulation horizon must be at least one step.")]
    EmptyHorizon,

    #[error("Step length must be finite and positive, but was {0}.")]
    InvalidStepLength(f64),

    #[error(
        "Step length {0} differs from one period; sub-period steps require background-mortality embedding."
    )]
    StepLengthWithoutEmbedding(f64),

    #[error("Significance level must lie in (0, 1), but was {0}.")]
    InvalidAlpha(f64),

    #[error("Discount rate must be finite and non-negative, but was {0}.")]
    InvalidDiscountRate(f64),

    #[error("'{name}' must be finite and non-negative, but was {value}.")]
    NegativeAmount { name: &'static str, value: f64 },

    #[error("Utility of state {index} must lie in [0, 1], but was {value}.")]
    UtilityOutOfRange { index: usize, value: f64 },

    #[error("'{name}' must have {expected} entries, found {found}.")]
    Length {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Relative risk must be finite and positive, but was {0}.")]
    InvalidRelativeRisk(f64),

    #[error("Relative-risk interval ({0}, {1}) must be positive and bracket the point estimate.")]
    InvalidRelativeRiskInterval(f64, f64),

    #[error("Background mortality probability must lie in [0, 1), but was {0}.")]
    InvalidMortalityProbability(f64),

    #[error("Initial state '{0}' is absorbing; patients must start alive.")]
    TerminalInitialState(HealthState),

    #[error("Seed for cohort {cohort_id} with {population_size} patients overflows 64 bits.")]
    SeedOverflow {
        cohort_id: u64,
        population_size: usize,
    },

    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Which deaths count towards the reported survival time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurvivalEndpoint {
    /// Only disease-caused death defines a survival time.
    #[default]
    DiseaseDeath,
    /// Any absorbing state defines a survival time.
    AnyDeath,
}

impl SurvivalEndpoint {
    #[inline]
    pub fn is_reached(self, state: HealthState) -> bool {
        match self {
            Self::DiseaseDeath => state == HealthState::DiseaseDeath,
            Self::AnyDeath => state.is_terminal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundMortalitySettings {
    pub enabled: bool,
    /// Probability of death from unrelated causes per year.
    pub annual_probability: f64,
}

impl Default for BackgroundMortalitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            annual_probability: 8.15 / 1000.0,
        }
    }
}

/// Every raw input of a run, as read from a TOML file.
///
/// Missing keys fall back to the reference data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInputs {
    pub population_size: usize,
    /// Number of simulated steps; each step lasts `step_length` years.
    pub horizon_steps: usize,
    /// Years per step. Values other than 1 need background-mortality embedding,
    /// which is what re-discretises the annual matrix.
    pub step_length: f64,
    pub alpha: f64,
    pub discount_rate: f64,
    pub discounting: DiscountConvention,
    pub survival_endpoint: SurvivalEndpoint,
    pub initial_state: HealthState,
    /// Observed transitions out of each non-absorbing state.
    pub transition_counts: Vec<Vec<u64>>,
    pub annual_state_costs: Vec<f64>,
    pub annual_state_utilities: Vec<f64>,
    pub mono_drug_cost: f64,
    /// Drug added on top of the mono regimen under combination therapy.
    pub add_on_drug_cost: f64,
    pub combo_relative_risk: f64,
    /// Lower and upper 95% bounds, used when sampling the relative risk.
    pub combo_relative_risk_ci: (f64, f64),
    pub willingness_to_pay: f64,
    pub background_mortality: BackgroundMortalitySettings,
}

impl Default for ModelInputs {
    fn default() -> Self {
        Self {
            population_size: 1000,
            horizon_steps: 100,
            step_length: 1.0,
            alpha: 0.05,
            discount_rate: 0.03,
            discounting: DiscountConvention::default(),
            survival_endpoint: SurvivalEndpoint::default(),
            initial_state: HealthState::EarlyDisease,
            transition_counts: vec![
                vec![1251, 350, 116, 17],
                vec![0, 731, 512, 15],
                vec![0, 0, 1312, 437],
            ],
            annual_state_costs: vec![2756.0, 3025.0, 9007.0],
            annual_state_utilities: vec![0.75, 0.50, 0.25],
            mono_drug_cost: 2278.0,
            add_on_drug_cost: 2086.0,
            combo_relative_risk: 0.509,
            combo_relative_risk_ci: (0.365, 0.71),
            willingness_to_pay: 50_000.0,
            background_mortality: BackgroundMortalitySettings::default(),
        }
    }
}

fn check_amount(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigurationError::NegativeAmount { name, value });
    }
    Ok(())
}

fn check_length(name: &'static str, found: usize, expected: usize) -> Result<(), ConfigurationError> {
    if found != expected {
        return Err(ConfigurationError::Length {
            name,
            expected,
            found,
        });
    }
    Ok(())
}

impl ModelInputs {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let toml_string = fs::read_to_string(path)?;
        let inputs: Self = toml::from_str(&toml_string)?;
        inputs.validate()?;
        Ok(inputs)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigurationError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Range checks on every scalar and vector input. Structural problems in
    /// the transition counts are reported later, as validation errors, when
    /// the matrices are built.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.population_size == 0 {
            return Err(ConfigurationError::EmptyPopulation);
        }
        if self.horizon_steps == 0 {
            return Err(ConfigurationError::EmptyHorizon);
        }
        if !self.step_length.is_finite() || self.step_length <= 0.0 {
            return Err(ConfigurationError::InvalidStepLength(self.step_length));
        }
        if !self.background_mortality.enabled && self.step_length != 1.0 {
            return Err(ConfigurationError::StepLengthWithoutEmbedding(
                self.step_length,
            ));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigurationError::InvalidAlpha(self.alpha));
        }
        if !self.discount_rate.is_finite() || self.discount_rate < 0.0 {
            return Err(ConfigurationError::InvalidDiscountRate(self.discount_rate));
        }
        if self.initial_state.is_terminal() {
            return Err(ConfigurationError::TerminalInitialState(self.initial_state));
        }

        check_length("transition_counts", self.transition_counts.len(), NUM_TRANSIENT_STATES)?;
        for row in &self.transition_counts {
            check_length("transition_counts row", row.len(), NUM_DISEASE_STATES)?;
        }
        check_length("annual_state_costs", self.annual_state_costs.len(), NUM_TRANSIENT_STATES)?;
        check_length(
            "annual_state_utilities",
            self.annual_state_utilities.len(),
            NUM_TRANSIENT_STATES,
        )?;
        for &cost in &self.annual_state_costs {
            check_amount("annual_state_costs", cost)?;
        }
        for (index, &value) in self.annual_state_utilities.iter().enumerate() {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::UtilityOutOfRange { index, value });
            }
        }
        check_amount("mono_drug_cost", self.mono_drug_cost)?;
        check_amount("add_on_drug_cost", self.add_on_drug_cost)?;
        check_amount("willingness_to_pay", self.willingness_to_pay)?;

        let rr = self.combo_relative_risk;
        if !rr.is_finite() || rr <= 0.0 {
            return Err(ConfigurationError::InvalidRelativeRisk(rr));
        }
        let (lo, hi) = self.combo_relative_risk_ci;
        if !(lo > 0.0 && lo <= rr && rr <= hi && hi.is_finite()) {
            return Err(ConfigurationError::InvalidRelativeRiskInterval(lo, hi));
        }

        let p = self.background_mortality.annual_probability;
        if self.background_mortality.enabled && !(p.is_finite() && (0.0..1.0).contains(&p)) {
            return Err(ConfigurationError::InvalidMortalityProbability(p));
        }
        Ok(())
    }

    pub fn transition_inputs(&self) -> TransitionInputs {
        TransitionInputs {
            counts: self.transition_counts.clone(),
            relative_risk: self.combo_relative_risk,
            background_mortality: self.mortality_embedding(),
        }
    }

    /// The embedding to apply, with `step_length` as its sub-period step.
    pub fn mortality_embedding(&self) -> Option<BackgroundMortality> {
        self.background_mortality
            .enabled
            .then_some(BackgroundMortality {
                annual_probability: self.background_mortality.annual_probability,
                step_length: self.step_length,
            })
    }

    pub fn annual_drug_cost(&self, therapy: Therapy) -> f64 {
        match therapy {
            Therapy::Mono => self.mono_drug_cost,
            Therapy::Combo => self.mono_drug_cost + self.add_on_drug_cost,
        }
    }

    fn cost_utility_table(&self, therapy: Therapy) -> CostUtilityTable {
        let mut annual_state_costs = [0.0; NUM_TRANSIENT_STATES];
        annual_state_costs.copy_from_slice(&self.annual_state_costs);
        let mut annual_state_utilities = [0.0; NUM_TRANSIENT_STATES];
        annual_state_utilities.copy_from_slice(&self.annual_state_utilities);
        CostUtilityTable {
            annual_state_costs,
            annual_state_utilities,
            annual_drug_cost: self.annual_drug_cost(therapy),
        }
    }
}

/// Immutable per-therapy configuration shared by every patient of a cohort.
#[derive(Debug, Clone)]
pub struct TherapyParameters {
    pub therapy: Therapy,
    pub transition: TransitionModel,
    pub economics: StepEconomics,
    pub step_length: f64,
    pub initial_state: HealthState,
    pub horizon_steps: usize,
    pub survival_endpoint: SurvivalEndpoint,
}

impl TherapyParameters {
    pub fn new(inputs: &ModelInputs, therapy: Therapy) -> Result<Self, SimulationError> {
        inputs.validate()?;
        let transition = TransitionModel::build(&inputs.transition_inputs(), therapy)?;
        Ok(Self::assemble(inputs, therapy, transition))
    }

    /// Uses `base` as the reference matrix instead of normalising
    /// `inputs.transition_counts`.
    pub fn with_base_matrix(
        inputs: &ModelInputs,
        therapy: Therapy,
        base: TransitionMatrix,
    ) -> Result<Self, SimulationError> {
        inputs.validate()?;
        let transition = TransitionModel::from_base(
            base,
            inputs.combo_relative_risk,
            inputs.mortality_embedding(),
            therapy,
        )?;
        Ok(Self::assemble(inputs, therapy, transition))
    }

    fn assemble(inputs: &ModelInputs, therapy: Therapy, transition: TransitionModel) -> Self {
        let economics = StepEconomics {
            table: inputs.cost_utility_table(therapy),
            discounting: Discounting::new(
                inputs.discount_rate,
                inputs.step_length,
                inputs.discounting,
            ),
            step_length: inputs.step_length,
        };
        Self {
            therapy,
            transition,
            economics,
            step_length: inputs.step_length,
            initial_state: inputs.initial_state,
            horizon_steps: inputs.horizon_steps,
            survival_endpoint: inputs.survival_endpoint,
        }
    }

    pub fn horizon_years(&self) -> f64 {
        self.horizon_steps as f64 * self.step_length
    }
}
