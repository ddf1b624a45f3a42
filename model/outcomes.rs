use crate::cohort::SimulatedCohort;
use crate::states::Therapy;
use crate::stats::{DiscreteTimeStat, Interval, SummaryStatistic};
use serde::Serialize;

/// Non-increasing step function of how many members remain at time `t`.
///
/// Starts at the initial size and drops by one at every recorded departure.
/// Departures are kept sorted on insertion so queries never need a
/// finishing pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePath {
    name: String,
    initial: usize,
    departures: Vec<f64>,
}

impl SamplePath {
    pub fn new(name: impl Into<String>, initial: usize) -> Self {
        Self {
            name: name.into(),
            initial,
            departures: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn num_departures(&self) -> usize {
        self.departures.len()
    }

    /// Records one member leaving at `time`.
    pub fn record(&mut self, time: f64) {
        let at = self.departures.partition_point(|&t| t <= time);
        self.departures.insert(at, time);
    }

    /// Members remaining at or before `time`.
    pub fn value_at(&self, time: f64) -> usize {
        let gone = self.departures.partition_point(|&t| t <= time);
        self.initial.saturating_sub(gone)
    }

    /// `(time, remaining)` at time zero and at every distinct departure time.
    pub fn steps(&self) -> Vec<(f64, usize)> {
        let mut steps = vec![(0.0, self.initial)];
        for (i, &time) in self.departures.iter().enumerate() {
            let remaining = self.initial.saturating_sub(i + 1);
            match steps.last_mut() {
                Some(last) if last.0 == time => last.1 = remaining,
                _ => steps.push((time, remaining)),
            }
        }
        steps
    }
}

/// Read-only summary of a finished cohort, built in one pass over its
/// patients.
#[derive(Debug, Clone)]
pub struct CohortOutcomes {
    cohort_id: u64,
    therapy: Therapy,
    initial_population_size: usize,
    alive_at_horizon: usize,
    survival_times: Vec<f64>,
    onset_times: Vec<f64>,
    costs: Vec<f64>,
    utilities: Vec<f64>,
    survival_curve: SamplePath,
    onset_free_curve: SamplePath,
    survival_time: DiscreteTimeStat,
    onset_free_survival_time: DiscreteTimeStat,
    discounted_cost: DiscreteTimeStat,
    discounted_utility: DiscreteTimeStat,
}

impl CohortOutcomes {
    pub fn from_cohort(cohort: &SimulatedCohort) -> Self {
        let n = cohort.initial_population_size();
        let mut outcomes = Self {
            cohort_id: cohort.id(),
            therapy: cohort.therapy(),
            initial_population_size: n,
            alive_at_horizon: 0,
            survival_times: Vec::new(),
            onset_times: Vec::new(),
            costs: Vec::with_capacity(n),
            utilities: Vec::with_capacity(n),
            survival_curve: SamplePath::new("Population alive over time", n),
            onset_free_curve: SamplePath::new("Population free of onset over time", n),
            survival_time: DiscreteTimeStat::new("Patient survival time"),
            onset_free_survival_time: DiscreteTimeStat::new("Onset-free survival time"),
            discounted_cost: DiscreteTimeStat::new("Patient discounted cost"),
            discounted_utility: DiscreteTimeStat::new("Patient discounted utility"),
        };

        for patient in cohort.patients() {
            if !patient.is_terminal() {
                outcomes.alive_at_horizon += 1;
            }
            if let Some(time) = patient.survival_time() {
                outcomes.survival_times.push(time);
                outcomes.survival_curve.record(time);
                outcomes.survival_time.record(time);
            }
            if let Some(time) = patient.time_to_onset() {
                outcomes.onset_times.push(time);
                outcomes.onset_free_curve.record(time);
                outcomes.onset_free_survival_time.record(time);
            }
            let cost = patient.total_discounted_cost();
            let utility = patient.total_discounted_utility();
            outcomes.costs.push(cost);
            outcomes.utilities.push(utility);
            outcomes.discounted_cost.record(cost);
            outcomes.discounted_utility.record(utility);
        }

        log::debug!(
            "Cohort {} ({}): {} deaths, {} onsets, mean cost {:?}, mean utility {:?}",
            outcomes.cohort_id,
            outcomes.therapy,
            outcomes.survival_times.len(),
            outcomes.onset_times.len(),
            outcomes.discounted_cost.mean(),
            outcomes.discounted_utility.mean()
        );
        outcomes
    }

    pub fn cohort_id(&self) -> u64 {
        self.cohort_id
    }

    pub fn therapy(&self) -> Therapy {
        self.therapy
    }

    pub fn initial_population_size(&self) -> usize {
        self.initial_population_size
    }

    /// Patients in no terminal state when the horizon ran out. Unlike the
    /// survival curve, this never counts deaths the endpoint ignores.
    pub fn alive_at_horizon(&self) -> usize {
        self.alive_at_horizon
    }

    pub fn survival_times(&self) -> &[f64] {
        &self.survival_times
    }

    pub fn onset_times(&self) -> &[f64] {
        &self.onset_times
    }

    /// Discounted cost per patient, in patient order.
    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    /// Discounted utility per patient, in patient order.
    pub fn utilities(&self) -> &[f64] {
        &self.utilities
    }

    pub fn survival_curve(&self) -> &SamplePath {
        &self.survival_curve
    }

    pub fn onset_free_curve(&self) -> &SamplePath {
        &self.onset_free_curve
    }

    pub fn survival_time(&self) -> &DiscreteTimeStat {
        &self.survival_time
    }

    pub fn onset_free_survival_time(&self) -> &DiscreteTimeStat {
        &self.onset_free_survival_time
    }

    pub fn discounted_cost(&self) -> &DiscreteTimeStat {
        &self.discounted_cost
    }

    pub fn discounted_utility(&self) -> &DiscreteTimeStat {
        &self.discounted_utility
    }

    /// The four named statistics, in reporting order.
    pub fn statistics(&self) -> [&DiscreteTimeStat; 4] {
        [
            &self.survival_time,
            &self.onset_free_survival_time,
            &self.discounted_cost,
            &self.discounted_utility,
        ]
    }

    pub fn summary(&self, alpha: f64) -> Vec<StatSummary> {
        self.statistics()
            .into_iter()
            .map(|stat| StatSummary::of(stat, alpha))
            .collect()
    }
}

/// Mean and confidence interval of one statistic, ready for printing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatSummary {
    pub name: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub confidence_interval: Option<Interval>,
}

impl StatSummary {
    pub fn of(stat: &DiscreteTimeStat, alpha: f64) -> Self {
        Self {
            name: stat.name().to_string(),
            count: stat.count(),
            mean: stat.mean(),
            confidence_interval: stat.confidence_interval(alpha),
        }
    }
}
