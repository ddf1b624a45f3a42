use rand::Rng;
use thiserror::Error;

/// Probabilities in a row must add up to one within this tolerance.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    #[error("Cannot sample from an empty probability row.")]
    Empty,

    #[error("Probability at index {index} is {value}; probabilities must be finite and non-negative.")]
    NegativeProbability { index: usize, value: f64 },

    #[error("Probabilities sum to {sum}, expected 1 within 1e-9.")]
    RowSum { sum: f64 },
}

/// A categorical distribution over next-state indices, stored as cumulative
/// bucket edges so a uniform draw maps to an index with one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalDistribution {
    cumulative: Vec<f64>,
    last_supported: usize,
}

impl EmpiricalDistribution {
    pub fn new(probabilities: &[f64]) -> Result<Self, DistributionError> {
        if probabilities.is_empty() {
            return Err(DistributionError::Empty);
        }
        let mut cumulative = Vec::with_capacity(probabilities.len());
        let mut running = 0.0;
        let mut last_supported = 0;
        for (index, &value) in probabilities.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(DistributionError::NegativeProbability { index, value });
            }
            if value > 0.0 {
                last_supported = index;
            }
            running += value;
            cumulative.push(running);
        }
        if (running - 1.0).abs() > ROW_SUM_TOLERANCE {
            return Err(DistributionError::RowSum { sum: running });
        }
        Ok(Self {
            cumulative,
            last_supported,
        })
    }

    /// Maps a uniform draw in `[0, 1)` to the first bucket whose upper edge
    /// exceeds it. Draws beyond a rounded-down final edge fall into the last
    /// bucket with positive mass.
    #[inline]
    pub fn index_for(&self, draw: f64) -> usize {
        self.cumulative
            .iter()
            .position(|&edge| draw < edge)
            .unwrap_or(self.last_supported)
    }

    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.index_for(rng.r#gen::<f64>())
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }
}
