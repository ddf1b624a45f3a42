use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::fmt;

/// A closed interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "({:.*}, {:.*})", p, self.lower, p, self.upper),
            None => write!(f, "({}, {})", self.lower, self.upper),
        }
    }
}

/// Contract for the per-outcome statistics a cohort reports.
///
/// Every patient's terminal value is recorded exactly once.
pub trait SummaryStatistic {
    fn record(&mut self, value: f64);
    fn count(&self) -> usize;
    fn mean(&self) -> Option<f64>;
    /// Two-sided interval for the mean at significance level `alpha`.
    fn confidence_interval(&self, alpha: f64) -> Option<Interval>;
}

/// Streaming statistic over discrete observations.
///
/// Mean and variance are maintained with Welford's update; observations are
/// retained so percentile intervals can be answered too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscreteTimeStat {
    name: String,
    observations: Vec<f64>,
    mean: f64,
    sum_sq_dev: f64,
    min: f64,
    max: f64,
}

impl DiscreteTimeStat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observations: Vec::new(),
            mean: 0.0,
            sum_sq_dev: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn from_values(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        let mut stat = Self::new(name);
        for value in values {
            stat.record(value);
        }
        stat
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observations(&self) -> &[f64] {
        &self.observations
    }

    pub fn sum(&self) -> f64 {
        self.mean * self.observations.len() as f64
    }

    /// Sample variance with `n - 1` in the denominator.
    pub fn variance(&self) -> Option<f64> {
        let n = self.observations.len();
        (n >= 2).then(|| self.sum_sq_dev / (n - 1) as f64)
    }

    pub fn stdev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    pub fn min(&self) -> Option<f64> {
        (!self.observations.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.observations.is_empty()).then_some(self.max)
    }

    /// Linear-interpolated percentile, `q` in `[0, 100]`.
    pub fn percentile(&self, q: f64) -> Option<f64> {
        if self.observations.is_empty() || !(0.0..=100.0).contains(&q) {
            return None;
        }
        let mut sorted = self.observations.clone();
        sorted.sort_by(f64::total_cmp);
        let rank = q / 100.0 * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let weight = rank - lo as f64;
        Some(sorted[lo] + weight * (sorted[hi] - sorted[lo]))
    }

    /// Interval covering the central `1 - alpha` share of the observations.
    pub fn percentile_interval(&self, alpha: f64) -> Option<Interval> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return None;
        }
        Some(Interval {
            lower: self.percentile(100.0 * alpha / 2.0)?,
            upper: self.percentile(100.0 * (1.0 - alpha / 2.0))?,
        })
    }
}

impl SummaryStatistic for DiscreteTimeStat {
    fn record(&mut self, value: f64) {
        self.observations.push(value);
        let n = self.observations.len() as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.sum_sq_dev += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn count(&self) -> usize {
        self.observations.len()
    }

    fn mean(&self) -> Option<f64> {
        (!self.observations.is_empty()).then_some(self.mean)
    }

    /// Student-t interval; needs at least two observations.
    fn confidence_interval(&self, alpha: f64) -> Option<Interval> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return None;
        }
        let n = self.observations.len();
        let stdev = self.stdev()?;
        let t = StudentsT::new(0.0, 1.0, (n - 1) as f64).ok()?;
        let half_width = t.inverse_cdf(1.0 - alpha / 2.0) * stdev / (n as f64).sqrt();
        Some(Interval {
            lower: self.mean - half_width,
            upper: self.mean + half_width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn streaming_moments_match_direct_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stat = DiscreteTimeStat::from_values("x", values);
        assert_eq!(stat.count(), 8);
        assert_abs_diff_eq!(stat.mean().unwrap(), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stat.variance().unwrap(), 32.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stat.sum(), 40.0, epsilon = 1e-12);
        assert_eq!(stat.min(), Some(2.0));
        assert_eq!(stat.max(), Some(9.0));
    }

    #[test]
    fn t_interval_brackets_mean_and_narrows_with_alpha() {
        let stat = DiscreteTimeStat::from_values("x", (1..=30).map(f64::from));
        let ci95 = stat.confidence_interval(0.05).unwrap();
        let ci80 = stat.confidence_interval(0.20).unwrap();
        let mean = stat.mean().unwrap();
        assert!(ci95.contains(mean));
        assert!(ci80.width() < ci95.width());
        assert_abs_diff_eq!(mean - ci95.lower, ci95.upper - mean, epsilon = 1e-9);
        // t(0.975, 29) = 2.045230
        let expected = 2.045_230 * stat.stdev().unwrap() / 30f64.sqrt();
        assert_abs_diff_eq!(ci95.upper - mean, expected, epsilon = 1e-4);
    }

    #[test]
    fn percentile_interpolates() {
        let stat = DiscreteTimeStat::from_values("x", [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(stat.percentile(0.0), Some(1.0));
        assert_eq!(stat.percentile(50.0), Some(3.0));
        assert_eq!(stat.percentile(100.0), Some(5.0));
        assert_abs_diff_eq!(stat.percentile(25.0).unwrap(), 2.0);
        assert_abs_diff_eq!(stat.percentile(10.0).unwrap(), 1.4, epsilon = 1e-12);
        let pi = stat.percentile_interval(0.5).unwrap();
        assert_abs_diff_eq!(pi.lower, 2.0);
        assert_abs_diff_eq!(pi.upper, 4.0);
    }

    #[test]
    fn empty_and_singleton_statistics_return_none() {
        let mut stat = DiscreteTimeStat::new("empty");
        assert_eq!(stat.mean(), None);
        assert_eq!(stat.confidence_interval(0.05), None);
        assert_eq!(stat.percentile_interval(0.05), None);
        stat.record(3.0);
        assert_eq!(stat.mean(), Some(3.0));
        assert_eq!(stat.confidence_interval(0.05), None);
        assert_eq!(stat.confidence_interval(1.5), None);
    }

    #[test]
    fn interval_display_honours_precision() {
        let interval = Interval {
            lower: 1.23456,
            upper: 7.5,
        };
        assert_eq!(format!("{interval:.2}"), "(1.23, 7.50)");
    }
}
