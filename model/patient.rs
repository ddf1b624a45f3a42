use crate::econ::CostUtilityAccumulator;
use crate::params::TherapyParameters;
use crate::states::HealthState;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

/// Tracks one patient's state and outcomes as steps are applied.
#[derive(Debug, Clone)]
pub struct PatientStateMonitor {
    current: HealthState,
    survival_time: f64,
    onset_free_time: f64,
    progressed: bool,
    costs: CostUtilityAccumulator,
}

impl PatientStateMonitor {
    pub fn new(initial: HealthState) -> Self {
        Self {
            current: initial,
            survival_time: 0.0,
            onset_free_time: 0.0,
            progressed: initial.is_onset(),
            costs: CostUtilityAccumulator::default(),
        }
    }

    /// Applies the transition `current -> next` taken at zero-based `step`.
    ///
    /// A patient already in an absorbing state is left untouched.
    pub fn update(&mut self, params: &TherapyParameters, step: usize, next: HealthState) {
        if self.current.is_terminal() {
            return;
        }

        // Deaths are assumed to happen mid-step on average.
        let elapsed = if next.is_terminal() {
            0.5 * params.step_length
        } else {
            params.step_length
        };
        self.survival_time += elapsed;
        if !self.current.is_onset() && !self.progressed {
            self.onset_free_time += elapsed;
        }
        if !self.progressed && next.is_onset() {
            self.progressed = true;
        }

        self.costs.update(&params.economics, step, self.current, next);
        self.current = next;
    }

    pub fn current_state(&self) -> HealthState {
        self.current
    }

    pub fn has_progressed(&self) -> bool {
        self.progressed
    }

    pub fn elapsed_survival_time(&self) -> f64 {
        self.survival_time
    }

    pub fn costs(&self) -> &CostUtilityAccumulator {
        &self.costs
    }
}

/// One simulated patient with a private, identity-seeded random stream.
#[derive(Debug, Clone)]
pub struct Patient {
    id: u64,
    params: Arc<TherapyParameters>,
    rng: StdRng,
    monitor: PatientStateMonitor,
    steps_taken: usize,
}

impl Patient {
    pub fn new(id: u64, params: Arc<TherapyParameters>) -> Self {
        let monitor = PatientStateMonitor::new(params.initial_state);
        Self {
            id,
            params,
            rng: StdRng::seed_from_u64(id),
            monitor,
            steps_taken: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runs until an absorbing state is reached or the horizon is exhausted.
    /// Calling it again after completion does nothing.
    pub fn simulate(&mut self) {
        while self.steps_taken < self.params.horizon_steps && !self.monitor.current.is_terminal() {
            self.step();
        }
    }

    /// Advances the patient by one step; a no-op once absorbed or past the
    /// horizon.
    pub fn step(&mut self) {
        if self.monitor.current.is_terminal() || self.steps_taken >= self.params.horizon_steps {
            return;
        }
        let next = self
            .params
            .transition
            .next_state(self.monitor.current, &mut self.rng);
        self.monitor.update(&self.params, self.steps_taken, next);
        self.steps_taken += 1;
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn current_state(&self) -> HealthState {
        self.monitor.current
    }

    pub fn is_terminal(&self) -> bool {
        self.monitor.current.is_terminal()
    }

    /// Defined once the patient has reached the configured survival endpoint.
    pub fn survival_time(&self) -> Option<f64> {
        self.params
            .survival_endpoint
            .is_reached(self.monitor.current)
            .then_some(self.monitor.survival_time)
    }

    /// Defined once the patient has progressed to disease onset.
    pub fn time_to_onset(&self) -> Option<f64> {
        self.monitor
            .progressed
            .then_some(self.monitor.onset_free_time)
    }

    pub fn total_discounted_cost(&self) -> f64 {
        self.monitor.costs.total_discounted_cost()
    }

    pub fn total_discounted_utility(&self) -> f64 {
        self.monitor.costs.total_discounted_utility()
    }

    pub fn monitor(&self) -> &PatientStateMonitor {
        &self.monitor
    }
}
