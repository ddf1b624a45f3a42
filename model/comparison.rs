use crate::error::SimulationError;
use crate::outcomes::CohortOutcomes;
use crate::states::Therapy;
use crate::stats::{DiscreteTimeStat, Interval, SummaryStatistic};

/// Paired cost-effectiveness comparison of two cohorts simulated with the
/// same cohort id, so patient `i` of both shares a random stream.
#[derive(Debug, Clone)]
pub struct TherapyComparison {
    base: Therapy,
    alternative: Therapy,
    incremental_cost: DiscreteTimeStat,
    incremental_utility: DiscreteTimeStat,
}

impl TherapyComparison {
    pub fn new(base: &CohortOutcomes, alternative: &CohortOutcomes) -> Result<Self, SimulationError> {
        let n = base.initial_population_size();
        let m = alternative.initial_population_size();
        if n != m {
            return Err(SimulationError::UnpairedCohorts {
                base: n,
                alternative: m,
            });
        }
        if base.cohort_id() != alternative.cohort_id() {
            log::warn!(
                "Comparing cohorts {} and {}; differences will not be paired by random stream",
                base.cohort_id(),
                alternative.cohort_id()
            );
        }

        let incremental_cost = DiscreteTimeStat::from_values(
            "Incremental discounted cost",
            paired_differences(base.costs(), alternative.costs()),
        );
        let incremental_utility = DiscreteTimeStat::from_values(
            "Incremental discounted utility",
            paired_differences(base.utilities(), alternative.utilities()),
        );
        Ok(Self {
            base: base.therapy(),
            alternative: alternative.therapy(),
            incremental_cost,
            incremental_utility,
        })
    }

    pub fn base(&self) -> Therapy {
        self.base
    }

    pub fn alternative(&self) -> Therapy {
        self.alternative
    }

    pub fn incremental_cost(&self) -> &DiscreteTimeStat {
        &self.incremental_cost
    }

    pub fn incremental_utility(&self) -> &DiscreteTimeStat {
        &self.incremental_utility
    }

    /// Incremental cost per unit of incremental utility. Undefined when the
    /// alternative adds no utility.
    pub fn icer(&self) -> Option<f64> {
        let cost = self.incremental_cost.mean()?;
        let utility = self.incremental_utility.mean()?;
        (utility != 0.0).then(|| cost / utility)
    }

    /// Per-patient net monetary benefit of switching, `wtp * dU - dC`.
    pub fn net_monetary_benefit(&self, willingness_to_pay: f64) -> DiscreteTimeStat {
        DiscreteTimeStat::from_values(
            "Incremental net monetary benefit",
            self.incremental_utility
                .observations()
                .iter()
                .zip(self.incremental_cost.observations())
                .map(|(du, dc)| willingness_to_pay * du - dc),
        )
    }

    pub fn net_monetary_benefit_interval(
        &self,
        willingness_to_pay: f64,
        alpha: f64,
    ) -> Option<Interval> {
        self.net_monetary_benefit(willingness_to_pay)
            .confidence_interval(alpha)
    }

    /// Whether the alternative is cost-effective at the given threshold.
    pub fn is_cost_effective(&self, willingness_to_pay: f64) -> bool {
        self.net_monetary_benefit(willingness_to_pay)
            .mean()
            .is_some_and(|nmb| nmb > 0.0)
    }
}

fn paired_differences<'a>(base: &'a [f64], alternative: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    alternative.iter().zip(base).map(|(a, b)| a - b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::Cohort;
    use crate::params::{ModelInputs, TherapyParameters};
    use approx::assert_abs_diff_eq;

    fn outcomes(inputs: &ModelInputs, therapy: Therapy, id: u64) -> CohortOutcomes {
        let params = TherapyParameters::new(inputs, therapy).unwrap();
        let cohort = Cohort::new(id, params, inputs.population_size)
            .unwrap()
            .simulate();
        CohortOutcomes::from_cohort(&cohort)
    }

    #[test]
    fn increments_are_paired_per_patient() {
        let mut inputs = ModelInputs::default();
        inputs.population_size = 300;
        let mono = outcomes(&inputs, Therapy::Mono, 0);
        let combo = outcomes(&inputs, Therapy::Combo, 0);
        let comparison = TherapyComparison::new(&mono, &combo).unwrap();

        assert_eq!(comparison.incremental_cost().count(), 300);
        assert_abs_diff_eq!(
            comparison.incremental_cost().observations()[11],
            combo.costs()[11] - mono.costs()[11]
        );
        let expected = combo.discounted_cost().mean().unwrap() - mono.discounted_cost().mean().unwrap();
        assert_abs_diff_eq!(
            comparison.incremental_cost().mean().unwrap(),
            expected,
            epsilon = 1e-6
        );
        assert!(comparison.incremental_cost().mean().unwrap() > 0.0);

        let icer = comparison.icer().unwrap();
        let du = comparison.incremental_utility().mean().unwrap();
        let dc = comparison.incremental_cost().mean().unwrap();
        assert_abs_diff_eq!(icer, dc / du, epsilon = 1e-9);

        let nmb = comparison.net_monetary_benefit(50_000.0).mean().unwrap();
        assert_abs_diff_eq!(nmb, 50_000.0 * du - dc, epsilon = 1e-6);
        assert_eq!(comparison.is_cost_effective(50_000.0), nmb > 0.0);
        assert!(comparison.net_monetary_benefit_interval(50_000.0, 0.05).is_some());
    }

    #[test]
    fn identical_cohorts_have_no_icer() {
        let mut inputs = ModelInputs::default();
        inputs.population_size = 20;
        let a = outcomes(&inputs, Therapy::Mono, 2);
        let comparison = TherapyComparison::new(&a, &a).unwrap();
        assert_eq!(comparison.icer(), None);
        assert_eq!(comparison.incremental_cost().mean(), Some(0.0));
    }

    #[test]
    fn unequal_sizes_are_rejected() {
        let mut inputs = ModelInputs::default();
        inputs.population_size = 10;
        let small = outcomes(&inputs, Therapy::Mono, 0);
        inputs.population_size = 12;
        let large = outcomes(&inputs, Therapy::Combo, 0);
        assert!(matches!(
            TherapyComparison::new(&small, &large),
            Err(SimulationError::UnpairedCohorts {
                base: 10,
                alternative: 12
            })
        ));
    }
}
