use crate::states::{HealthState, NUM_TRANSIENT_STATES};
use serde::{Deserialize, Serialize};

/// Where within a step accrued cost and utility are discounted.
///
/// Both conventions discount per half step at `annual_rate * step_length / 2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountConvention {
    /// Step `t` is valued at its midpoint, half-period index `2t + 1`.
    #[default]
    MidStep,
    /// Step `t` is valued at half-period index `t`.
    StepStart,
}

/// Present value of `amount` received `period` periods from now.
#[inline]
pub fn present_value(amount: f64, rate: f64, period: f64) -> f64 {
    amount / (1.0 + rate).powf(period)
}

/// Discount factors for a fixed step length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discounting {
    half_period_rate: f64,
    convention: DiscountConvention,
}

impl Discounting {
    pub fn new(annual_rate: f64, step_length: f64, convention: DiscountConvention) -> Self {
        Self {
            half_period_rate: annual_rate * step_length / 2.0,
            convention,
        }
    }

    pub fn half_period_rate(&self) -> f64 {
        self.half_period_rate
    }

    /// Discount period index for the zero-based step `step`.
    #[inline]
    pub fn period(&self, step: usize) -> f64 {
        match self.convention {
            DiscountConvention::MidStep => (2 * step + 1) as f64,
            DiscountConvention::StepStart => step as f64,
        }
    }

    #[inline]
    pub fn discount(&self, amount: f64, step: usize) -> f64 {
        present_value(amount, self.half_period_rate, self.period(step))
    }
}

/// Annual per-state cost and utility plus the therapy's drug cost.
/// Terminal states cost nothing and carry no utility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostUtilityTable {
    pub annual_state_costs: [f64; NUM_TRANSIENT_STATES],
    pub annual_state_utilities: [f64; NUM_TRANSIENT_STATES],
    pub annual_drug_cost: f64,
}

impl CostUtilityTable {
    #[inline]
    pub fn state_cost(&self, state: HealthState) -> f64 {
        if state.is_terminal() {
            0.0
        } else {
            self.annual_state_costs[state.index()]
        }
    }

    #[inline]
    pub fn state_utility(&self, state: HealthState) -> f64 {
        if state.is_terminal() {
            0.0
        } else {
            self.annual_state_utilities[state.index()]
        }
    }
}

/// Undiscounted and discounted amounts accrued over one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepAccrual {
    pub cost: f64,
    pub utility: f64,
    pub discounted_cost: f64,
    pub discounted_utility: f64,
}

/// Everything needed to price a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEconomics {
    pub table: CostUtilityTable,
    pub discounting: Discounting,
    pub step_length: f64,
}

impl StepEconomics {
    /// Prices the step `current -> next` taken at zero-based index `step`.
    ///
    /// State cost and utility are the average of both endpoints (trapezoidal
    /// accrual). Drug cost is charged for the full step, or half of it when
    /// the patient dies during the step.
    pub fn accrue(&self, step: usize, current: HealthState, next: HealthState) -> StepAccrual {
        let table = &self.table;
        let drug_fraction = if next.is_terminal() { 0.5 } else { 1.0 };
        let cost = self.step_length
            * (0.5 * (table.state_cost(current) + table.state_cost(next))
                + drug_fraction * table.annual_drug_cost);
        let utility =
            self.step_length * 0.5 * (table.state_utility(current) + table.state_utility(next));
        StepAccrual {
            cost,
            utility,
            discounted_cost: self.discounting.discount(cost, step),
            discounted_utility: self.discounting.discount(utility, step),
        }
    }
}

/// Running discounted totals for one patient.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostUtilityAccumulator {
    total_discounted_cost: f64,
    total_discounted_utility: f64,
}

impl CostUtilityAccumulator {
    pub fn update(
        &mut self,
        economics: &StepEconomics,
        step: usize,
        current: HealthState,
        next: HealthState,
    ) -> StepAccrual {
        let accrual = economics.accrue(step, current, next);
        self.total_discounted_cost += accrual.discounted_cost;
        self.total_discounted_utility += accrual.discounted_utility;
        accrual
    }

    pub fn total_discounted_cost(&self) -> f64 {
        self.total_discounted_cost
    }

    pub fn total_discounted_utility(&self) -> f64 {
        self.total_discounted_utility
    }
}
