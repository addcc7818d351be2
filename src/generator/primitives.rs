//! Seeded sampling, noise, outlier and missing-value injection.
//!
//! Every generator owns one [`RandomSource`]; nothing in this crate draws
//! from a shared or thread-local stream.

use chrono::{Duration, NaiveDate};
use rand::prelude::*;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::error::GeneratorError;
use crate::generator::Result;
use crate::table::{stats, Column, ColumnData, Table};

fn invalid(e: impl std::fmt::Display) -> GeneratorError {
    GeneratorError::InvalidParameter(e.to_string())
}

/// `Normal::new` accepts a negative std, so spreads are checked here.
fn require_spread(what: &str, value: f64) -> Result<f64> {
    if !(value >= 0.0 && value.is_finite()) {
        return Err(GeneratorError::InvalidParameter(format!(
            "{} must be finite and non-negative, got {}",
            what, value
        )));
    }
    Ok(value)
}

/// Number of rows a rate selects out of `n`.
pub fn rate_count(rate: f64, n: usize) -> usize {
    ((rate * n as f64).round() as usize).min(n)
}

/// Deterministic bucket in `0..buckets` from the first 8 bytes of SHA-256(`key`).
pub fn stable_bucket(key: &str, buckets: u64) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % buckets.max(1)
}

/// Intercept `b` such that `mean(sigmoid(score + b))` equals `target_rate`,
/// found by bisection.
pub fn calibrate_intercept(scores: &[f64], target_rate: f64) -> f64 {
    let mean_rate = |b: f64| {
        scores.iter().map(|s| super::curves::sigmoid(s + b)).sum::<f64>() / scores.len().max(1) as f64
    };
    let (mut low, mut high) = (-50.0, 50.0);
    for _ in 0..100 {
        let mid = (low + high) / 2.0;
        if mean_rate(mid) < target_rate {
            low = mid;
        } else {
            high = mid;
        }
    }
    (low + high) / 2.0
}

/// A generator's private random stream.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha8Rng,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform in `[low, high)`; returns `low` for an empty range.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.random_range(low..high)
    }

    pub fn int_between(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.rng.random_range(low..=high)
    }

    pub fn unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.unit() < p
    }

    /// +1.0 or -1.0 with equal probability.
    pub fn sign(&mut self) -> f64 {
        if self.rng.random::<bool>() {
            1.0
        } else {
            -1.0
        }
    }

    pub fn normal(&mut self, mean: f64, std: f64) -> Result<f64> {
        let dist = rand_distr::Normal::new(mean, require_spread("std", std)?).map_err(invalid)?;
        Ok(self.rng.sample(dist))
    }

    pub fn standard_normal(&mut self) -> f64 {
        self.rng.sample(rand_distr::StandardNormal)
    }

    pub fn log_normal(&mut self, mu: f64, sigma: f64) -> Result<f64> {
        let dist = rand_distr::LogNormal::new(mu, require_spread("sigma", sigma)?).map_err(invalid)?;
        Ok(self.rng.sample(dist))
    }

    pub fn beta(&mut self, alpha: f64, beta: f64) -> Result<f64> {
        let dist = rand_distr::Beta::new(alpha, beta).map_err(invalid)?;
        Ok(self.rng.sample(dist))
    }

    pub fn gamma(&mut self, shape: f64, scale: f64) -> Result<f64> {
        let dist = rand_distr::Gamma::new(shape, scale).map_err(invalid)?;
        Ok(self.rng.sample(dist))
    }

    pub fn exponential(&mut self, lambda: f64) -> Result<f64> {
        let dist = rand_distr::Exp::new(lambda).map_err(invalid)?;
        Ok(self.rng.sample(dist))
    }

    /// Poisson count; a zero rate always yields zero.
    pub fn poisson(&mut self, lambda: f64) -> Result<i64> {
        if lambda == 0.0 {
            return Ok(0);
        }
        let dist = rand_distr::Poisson::new(lambda).map_err(invalid)?;
        let draw: f64 = self.rng.sample(dist);
        Ok(draw as i64)
    }

    /// Index drawn proportionally to `weights`.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Result<usize> {
        let total: f64 = weights.iter().sum();
        if weights.is_empty() || !(total > 0.0) || weights.iter().any(|w| *w < 0.0) {
            return Err(GeneratorError::InvalidParameter(
                "weights must be non-negative with a positive sum".to_string(),
            ));
        }
        let target = self.unit() * total;
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if target < cumulative {
                return Ok(i);
            }
        }
        Ok(weights.len() - 1)
    }

    pub fn choose_weighted<'a, T>(&mut self, items: &'a [(T, f64)]) -> Result<&'a T> {
        let weights: Vec<f64> = items.iter().map(|(_, w)| *w).collect();
        let i = self.weighted_index(&weights)?;
        Ok(&items[i].0)
    }

    /// `k` distinct indices from `0..n`, sorted.
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut self.rng);
        indices.truncate(k.min(n));
        indices.sort_unstable();
        indices
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Uniform date in `[start, end]`.
    pub fn date_between(&mut self, start: NaiveDate, end: NaiveDate) -> NaiveDate {
        let span = (end - start).num_days().max(0);
        start + Duration::days(self.int_between(0, span))
    }

    /// Adds Gaussian noise with std `noise_level * std(values)`.
    pub fn add_noise(&mut self, values: &mut [f64], noise_level: f64) -> Result<()> {
        let std = stats::std_dev(values).unwrap_or(0.0) * require_spread("noise_level", noise_level)?;
        if std > 0.0 {
            let dist = rand_distr::Normal::new(0.0, std).map_err(invalid)?;
            for v in values.iter_mut() {
                *v += self.rng.sample(dist);
            }
        }
        Ok(())
    }

    /// Replaces `round(rate * n)` values with `mean ± multiplier * std * (1 + excess)`,
    /// `excess` uniform in `[0, 1)`. Returns the replaced indices.
    pub fn inject_outliers(&mut self, values: &mut [f64], rate: f64, multiplier: f64) -> Vec<usize> {
        let count = rate_count(rate, values.len());
        if count == 0 {
            return Vec::new();
        }
        let (Some(mean), Some(std)) = (stats::mean(values), stats::std_dev(values)) else {
            return Vec::new();
        };
        let indices = self.sample_indices(values.len(), count);
        self.replace_with_outliers(values, &indices, mean, std, multiplier);
        indices
    }

    /// Outlier replacement at chosen `indices`, around a given `mean` and `std`.
    pub fn replace_with_outliers(
        &mut self,
        values: &mut [f64],
        indices: &[usize],
        mean: f64,
        std: f64,
        multiplier: f64,
    ) {
        for &i in indices {
            let excess = self.unit();
            values[i] = mean + self.sign() * multiplier * std * (1.0 + excess);
        }
    }

    /// Nulls out `round(rate * n)` cells of `column`.
    pub fn inject_missing(&mut self, column: &Column, rate: f64) -> Column {
        let count = rate_count(rate, column.len());
        if count == 0 {
            return column.clone();
        }
        let indices = self.sample_indices(column.len(), count);
        let mut data = column.data.clone();
        for i in indices {
            match &mut data {
                ColumnData::Float(v) => v[i] = None,
                ColumnData::Int(v) => v[i] = None,
                ColumnData::Bool(v) => v[i] = None,
                ColumnData::Str(v) => v[i] = None,
                ColumnData::DateTime(v) => v[i] = None,
            }
        }
        Column::new(column.name.clone(), data)
    }

    /// Applies missing-value injection to every column not listed in `protected`.
    pub fn inject_missing_features(
        &mut self,
        table: Table,
        rate: f64,
        protected: &[&str],
    ) -> Result<Table> {
        if rate <= 0.0 {
            return Ok(table);
        }
        let columns = table
            .columns()
            .iter()
            .map(|c| {
                if protected.contains(&c.name.as_str()) {
                    c.clone()
                } else {
                    self.inject_missing(c, rate)
                }
            })
            .collect();
        Ok(Table::new(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = RandomSource::new(7);
        let mut b = RandomSource::new(7);
        for _ in 0..10 {
            assert_eq!(a.normal(0.0, 1.0).unwrap(), b.normal(0.0, 1.0).unwrap());
        }
        assert_eq!(a.sample_indices(100, 5), b.sample_indices(100, 5));
    }

    #[test]
    fn test_invalid_distribution_fails_fast() {
        let mut rng = RandomSource::new(1);
        assert!(rng.normal(0.0, -1.0).is_err());
        assert!(rng.normal(0.0, f64::NAN).is_err());
        assert!(rng.log_normal(0.0, -0.5).is_err());
        assert!(rng.add_noise(&mut [1.0, 2.0, 3.0], -0.1).is_err());
        assert!(rng.normal(0.0, 0.0).is_ok());
        assert!(rng.beta(0.0, 1.0).is_err());
        assert!(rng.weighted_index(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_sample_indices_distinct() {
        let mut rng = RandomSource::new(3);
        let idx = rng.sample_indices(50, 20);
        assert_eq!(idx.len(), 20);
        assert!(idx.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_outliers_leave_the_bulk() {
        let mut rng = RandomSource::new(11);
        let mut values: Vec<f64> = (0..200).map(|i| (i % 10) as f64).collect();
        let mean = stats::mean(&values).unwrap();
        let std = stats::std_dev(&values).unwrap();
        let replaced = rng.inject_outliers(&mut values, 0.05, 3.0);
        assert_eq!(replaced.len(), 10);
        for i in replaced {
            assert!((values[i] - mean).abs() >= 3.0 * std);
        }
    }

    #[test]
    fn test_missing_injection_count() {
        let mut rng = RandomSource::new(5);
        let col = Column::from_f64("x", vec![1.0; 40]);
        assert_eq!(rng.inject_missing(&col, 0.25).null_count(), 10);
    }

    #[test]
    fn test_calibrated_intercept_hits_rate() {
        let scores: Vec<f64> = (0..1000).map(|i| (i as f64 / 100.0) - 5.0).collect();
        let b = calibrate_intercept(&scores, 0.2);
        let rate = scores.iter().map(|s| super::super::curves::sigmoid(s + b)).sum::<f64>() / 1000.0;
        assert!((rate - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_stable_bucket() {
        assert_eq!(stable_bucket("customer-1", 100), stable_bucket("customer-1", 100));
        assert!(stable_bucket("customer-2", 10) < 10);
    }
}
