use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of disease states that can be left again (rows of the raw count table).
pub const NUM_TRANSIENT_STATES: usize = 3;
/// Size of the state space without the background-mortality extension.
pub const NUM_DISEASE_STATES: usize = 4;
/// Size of the state space once background mortality is embedded.
pub const NUM_STATES_WITH_BACKGROUND: usize = 5;

/// Discrete health states, ordered by severity.
///
/// The discriminant doubles as the row/column index in every transition
/// matrix. `BackgroundDeath` only exists in models that embed an independent
/// mortality hazard; such matrices have one extra trailing row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthState {
    EarlyDisease = 0,
    LateDisease = 1,
    ComplicationOnset = 2,
    DiseaseDeath = 3,
    BackgroundDeath = 4,
}

impl HealthState {
    pub const ALL: [HealthState; NUM_STATES_WITH_BACKGROUND] = [
        HealthState::EarlyDisease,
        HealthState::LateDisease,
        HealthState::ComplicationOnset,
        HealthState::DiseaseDeath,
        HealthState::BackgroundDeath,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Absorbing states: once entered, the patient never leaves.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DiseaseDeath | Self::BackgroundDeath)
    }

    /// The intermediate state whose first entry marks disease onset.
    #[inline]
    pub fn is_onset(self) -> bool {
        self == Self::ComplicationOnset
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::EarlyDisease => "early disease",
            Self::LateDisease => "late disease",
            Self::ComplicationOnset => "complication onset",
            Self::DiseaseDeath => "disease death",
            Self::BackgroundDeath => "background death",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Treatment policy. A therapy is configuration: it picks a transition
/// matrix and a drug-cost figure, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Therapy {
    /// Reference regimen, simulated with the count-derived matrix.
    Mono,
    /// Add-on regimen, forward transitions scaled by the relative risk.
    Combo,
}

impl Therapy {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Mono => "mono therapy",
            Self::Combo => "combination therapy",
        }
    }
}

impl fmt::Display for Therapy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_from_index() {
        for state in HealthState::ALL {
            assert_eq!(HealthState::from_index(state.index()), Some(state));
        }
        assert_eq!(HealthState::from_index(NUM_STATES_WITH_BACKGROUND), None);
    }

    #[test]
    fn only_death_states_are_terminal() {
        let terminal: Vec<_> = HealthState::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .copied()
            .collect();
        assert_eq!(
            terminal,
            vec![HealthState::DiseaseDeath, HealthState::BackgroundDeath]
        );
        assert!(HealthState::ComplicationOnset.is_onset());
        assert!(!HealthState::LateDisease.is_onset());
    }
}
