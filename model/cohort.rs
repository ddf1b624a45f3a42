use crate::error::SimulationError;
use crate::params::{ConfigurationError, TherapyParameters};
use crate::patient::Patient;
use crate::states::Therapy;
use rayon::prelude::*;
use std::sync::Arc;

/// Seed of patient `index` in cohort `cohort_id`.
///
/// Cohorts own the disjoint seed ranges `[id * n, (id + 1) * n)`, so two
/// cohorts of the same size never share a random stream.
pub fn patient_seed(
    cohort_id: u64,
    population_size: usize,
    index: usize,
) -> Result<u64, ConfigurationError> {
    let overflow = || ConfigurationError::SeedOverflow {
        cohort_id,
        population_size,
    };
    let size = u64::try_from(population_size).map_err(|_| overflow())?;
    let offset = u64::try_from(index).map_err(|_| overflow())?;
    cohort_id
        .checked_mul(size)
        .and_then(|base| base.checked_add(offset))
        .ok_or_else(overflow)
}

/// A population of patients that has not been simulated yet.
#[derive(Debug, Clone)]
pub struct Cohort {
    id: u64,
    params: Arc<TherapyParameters>,
    patients: Vec<Patient>,
}

impl Cohort {
    pub fn new(
        id: u64,
        params: impl Into<Arc<TherapyParameters>>,
        population_size: usize,
    ) -> Result<Self, SimulationError> {
        if population_size == 0 {
            return Err(ConfigurationError::EmptyPopulation.into());
        }
        // Checking the last seed is enough; the others are smaller.
        patient_seed(id, population_size, population_size - 1)?;

        let params: Arc<TherapyParameters> = params.into();
        let base = id * population_size as u64;
        let patients = (0..population_size as u64)
            .map(|i| Patient::new(base + i, Arc::clone(&params)))
            .collect();
        Ok(Self {
            id,
            params,
            patients,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn population_size(&self) -> usize {
        self.patients.len()
    }

    pub fn params(&self) -> &TherapyParameters {
        &self.params
    }

    /// Simulates every patient to completion on the rayon pool.
    ///
    /// Outcomes do not depend on scheduling because each patient owns its
    /// random stream.
    pub fn simulate(mut self) -> SimulatedCohort {
        log::debug!(
            "Simulating cohort {} under {}: {} patients over {} steps of {} years",
            self.id,
            self.params.therapy,
            self.patients.len(),
            self.params.horizon_steps,
            self.params.step_length
        );
        self.patients.par_iter_mut().for_each(Patient::simulate);

        let terminal = self.patients.iter().filter(|p| p.is_terminal()).count();
        log::debug!(
            "Cohort {} finished: {} of {} patients absorbed within the horizon",
            self.id,
            terminal,
            self.patients.len()
        );
        SimulatedCohort {
            id: self.id,
            params: self.params,
            patients: self.patients,
        }
    }
}

/// A cohort whose patients have all finished. Read-only.
#[derive(Debug, Clone)]
pub struct SimulatedCohort {
    id: u64,
    params: Arc<TherapyParameters>,
    patients: Vec<Patient>,
}

impl SimulatedCohort {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn therapy(&self) -> Therapy {
        self.params.therapy
    }

    pub fn params(&self) -> &TherapyParameters {
        &self.params
    }

    pub fn initial_population_size(&self) -> usize {
        self.patients.len()
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ModelInputs;

    fn small_params() -> TherapyParameters {
        TherapyParameters::new(&ModelInputs::default(), Therapy::Mono).unwrap()
    }

    #[test]
    fn seeds_are_disjoint_between_cohorts() {
        assert_eq!(patient_seed(0, 10, 9).unwrap(), 9);
        assert_eq!(patient_seed(1, 10, 0).unwrap(), 10);
        assert_eq!(patient_seed(3, 10, 4).unwrap(), 34);
        let ids: Vec<u64> = Cohort::new(2, small_params(), 5)
            .unwrap()
            .patients
            .iter()
            .map(Patient::id)
            .collect();
        assert_eq!(ids, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn seed_overflow_is_a_configuration_error() {
        assert!(matches!(
            patient_seed(u64::MAX, 2, 0),
            Err(ConfigurationError::SeedOverflow { .. })
        ));
        assert!(matches!(
            Cohort::new(u64::MAX / 2, small_params(), 4),
            Err(SimulationError::Configuration(
                ConfigurationError::SeedOverflow { .. }
            ))
        ));
    }

    #[test]
    fn empty_population_is_rejected() {
        assert!(matches!(
            Cohort::new(0, small_params(), 0),
            Err(SimulationError::Configuration(
                ConfigurationError::EmptyPopulation
            ))
        ));
    }

    #[test]
    fn simulation_is_independent_of_schedule() {
        let parallel = Cohort::new(4, small_params(), 64).unwrap().simulate();
        let params = Arc::new(small_params());
        for (index, patient) in parallel.patients().iter().enumerate() {
            let mut alone = Patient::new(4 * 64 + index as u64, Arc::clone(&params));
            alone.simulate();
            assert_eq!(alone.current_state(), patient.current_state());
            assert_eq!(alone.survival_time(), patient.survival_time());
            assert_eq!(alone.total_discounted_cost(), patient.total_discounted_cost());
        }
        assert_eq!(parallel.initial_population_size(), 64);
        assert_eq!(parallel.therapy(), Therapy::Mono);
    }
}
