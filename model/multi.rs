use crate::cohort::Cohort;
use crate::error::SimulationError;
use crate::outcomes::CohortOutcomes;
use crate::params::{ConfigurationError, ModelInputs, TherapyParameters};
use crate::progress::CohortProgressObserver;
use crate::psa::ParameterSampler;
use crate::states::Therapy;
use crate::stats::{DiscreteTimeStat, Interval, SummaryStatistic};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

/// Per-cohort means kept after the cohort's patients are dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    pub cohort_id: u64,
    pub therapy: Therapy,
    /// `None` when nobody reached the survival endpoint within the horizon.
    pub mean_survival_time: Option<f64>,
    pub mean_discounted_cost: f64,
    pub mean_discounted_utility: f64,
}

impl CohortSummary {
    fn of(outcomes: &CohortOutcomes) -> Self {
        Self {
            cohort_id: outcomes.cohort_id(),
            therapy: outcomes.therapy(),
            mean_survival_time: outcomes.survival_time().mean(),
            mean_discounted_cost: outcomes.discounted_cost().mean().unwrap_or(0.0),
            mean_discounted_utility: outcomes.discounted_utility().mean().unwrap_or(0.0),
        }
    }
}

/// Cohort means of one therapy across every simulated cohort.
#[derive(Debug, Clone)]
pub struct MultiCohortOutcomes {
    therapy: Therapy,
    cohorts: Vec<CohortSummary>,
    mean_survival_time: DiscreteTimeStat,
    mean_discounted_cost: DiscreteTimeStat,
    mean_discounted_utility: DiscreteTimeStat,
}

impl MultiCohortOutcomes {
    fn new(therapy: Therapy, cohorts: Vec<CohortSummary>) -> Self {
        let mean_survival_time = DiscreteTimeStat::from_values(
            "Cohort mean survival time",
            cohorts.iter().filter_map(|c| c.mean_survival_time),
        );
        let mean_discounted_cost = DiscreteTimeStat::from_values(
            "Cohort mean discounted cost",
            cohorts.iter().map(|c| c.mean_discounted_cost),
        );
        let mean_discounted_utility = DiscreteTimeStat::from_values(
            "Cohort mean discounted utility",
            cohorts.iter().map(|c| c.mean_discounted_utility),
        );
        Self {
            therapy,
            cohorts,
            mean_survival_time,
            mean_discounted_cost,
            mean_discounted_utility,
        }
    }

    pub fn therapy(&self) -> Therapy {
        self.therapy
    }

    /// Summaries in cohort-id order.
    pub fn cohorts(&self) -> &[CohortSummary] {
        &self.cohorts
    }

    pub fn mean_survival_time(&self) -> &DiscreteTimeStat {
        &self.mean_survival_time
    }

    pub fn mean_discounted_cost(&self) -> &DiscreteTimeStat {
        &self.mean_discounted_cost
    }

    pub fn mean_discounted_utility(&self) -> &DiscreteTimeStat {
        &self.mean_discounted_utility
    }

    /// Where the mean survival time of a further cohort is expected to fall.
    pub fn survival_prediction_interval(&self, alpha: f64) -> Option<Interval> {
        self.mean_survival_time.percentile_interval(alpha)
    }
}

/// Both therapies over the same cohort ids, paired by id.
#[derive(Debug, Clone)]
pub struct MultiCohortComparison {
    pub base: MultiCohortOutcomes,
    pub alternative: MultiCohortOutcomes,
    incremental_cost: DiscreteTimeStat,
    incremental_utility: DiscreteTimeStat,
}

impl MultiCohortComparison {
    fn new(base: MultiCohortOutcomes, alternative: MultiCohortOutcomes) -> Self {
        let pairs = || base.cohorts.iter().zip(&alternative.cohorts);
        let incremental_cost = DiscreteTimeStat::from_values(
            "Incremental cohort mean cost",
            pairs().map(|(b, a)| a.mean_discounted_cost - b.mean_discounted_cost),
        );
        let incremental_utility = DiscreteTimeStat::from_values(
            "Incremental cohort mean utility",
            pairs().map(|(b, a)| a.mean_discounted_utility - b.mean_discounted_utility),
        );
        Self {
            base,
            alternative,
            incremental_cost,
            incremental_utility,
        }
    }

    pub fn incremental_cost(&self) -> &DiscreteTimeStat {
        &self.incremental_cost
    }

    pub fn incremental_utility(&self) -> &DiscreteTimeStat {
        &self.incremental_utility
    }

    pub fn icer(&self) -> Option<f64> {
        let cost = self.incremental_cost.mean()?;
        let utility = self.incremental_utility.mean()?;
        (utility != 0.0).then(|| cost / utility)
    }

    /// Share of cohorts in which the alternative has positive net monetary
    /// benefit; one point of the acceptability curve.
    pub fn probability_cost_effective(&self, willingness_to_pay: f64) -> f64 {
        let n = self.incremental_cost.count();
        if n == 0 {
            return 0.0;
        }
        let favourable = self
            .incremental_utility
            .observations()
            .iter()
            .zip(self.incremental_cost.observations())
            .filter(|&(du, dc)| willingness_to_pay * du - dc > 0.0)
            .count();
        favourable as f64 / n as f64
    }
}

/// Simulates cohorts `0..num_cohorts` in parallel, optionally redrawing the
/// uncertain inputs for every cohort.
#[derive(Debug, Clone)]
pub struct MultiCohort {
    inputs: ModelInputs,
    num_cohorts: usize,
    parameter_uncertainty: bool,
}

impl MultiCohort {
    pub fn new(inputs: ModelInputs, num_cohorts: usize) -> Result<Self, SimulationError> {
        if num_cohorts == 0 {
            return Err(ConfigurationError::NoCohorts.into());
        }
        inputs.validate()?;
        Ok(Self {
            inputs,
            num_cohorts,
            parameter_uncertainty: false,
        })
    }

    pub fn with_parameter_uncertainty(mut self, enabled: bool) -> Self {
        self.parameter_uncertainty = enabled;
        self
    }

    pub fn num_cohorts(&self) -> usize {
        self.num_cohorts
    }

    pub fn simulate(
        &self,
        therapy: Therapy,
        observer: &dyn CohortProgressObserver,
    ) -> Result<MultiCohortOutcomes, SimulationError> {
        observer.on_start(self.num_cohorts);
        let outcomes = self.run(therapy, observer);
        observer.on_finish();
        outcomes
    }

    /// Runs `base` and `alternative` over the same ids, and so the same
    /// parameter draws and patient streams.
    pub fn compare(
        &self,
        base: Therapy,
        alternative: Therapy,
        observer: &dyn CohortProgressObserver,
    ) -> Result<MultiCohortComparison, SimulationError> {
        observer.on_start(2 * self.num_cohorts);
        let result = self
            .run(base, observer)
            .and_then(|b| Ok(MultiCohortComparison::new(b, self.run(alternative, observer)?)));
        observer.on_finish();
        result
    }

    fn run(
        &self,
        therapy: Therapy,
        observer: &dyn CohortProgressObserver,
    ) -> Result<MultiCohortOutcomes, SimulationError> {
        log::info!(
            "Simulating {} cohorts of {} patients under {therapy}{}",
            self.num_cohorts,
            self.inputs.population_size,
            if self.parameter_uncertainty {
                " with sampled parameters"
            } else {
                ""
            }
        );
        let shared = if self.parameter_uncertainty {
            None
        } else {
            Some(Arc::new(TherapyParameters::new(&self.inputs, therapy)?))
        };

        let cohorts = (0..self.num_cohorts as u64)
            .into_par_iter()
            .map(|id| -> Result<CohortSummary, SimulationError> {
                let params = match &shared {
                    Some(params) => Arc::clone(params),
                    None => Arc::new(
                        ParameterSampler::for_cohort(&self.inputs, id)
                            .draw()?
                            .therapy_parameters(therapy)?,
                    ),
                };
                let simulated = Cohort::new(id, params, self.inputs.population_size)?.simulate();
                let summary = CohortSummary::of(&CohortOutcomes::from_cohort(&simulated));
                observer.on_cohort_finished(id);
                Ok(summary)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outcomes = MultiCohortOutcomes::new(therapy, cohorts);
        log::info!(
            "Finished {} cohorts under {therapy}: mean survival {:?}",
            outcomes.cohorts.len(),
            outcomes.mean_survival_time.mean()
        );
        Ok(outcomes)
    }
}
