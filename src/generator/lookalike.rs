//! Seed audiences and lookalike scoring.

use tracing::info;

use super::latent::LatentFactorModel;
use super::primitives::{rate_count, RandomSource};
use super::{finish, GeneratorConfig, Result, SyntheticGenerator};
use crate::error::GeneratorError;
use crate::table::{stats, Column, Table};

const TRAITS: [&str; 4] = ["affinity", "spend", "activity", "loyalty"];
/// Where the seed audience sits in trait space, in standard deviations.
const SEED_PROFILE: [f64; 4] = [1.2, 0.9, 0.8, 0.6];

/// A population containing a seed audience, hidden true lookalikes that share
/// the seed profile, and everyone else.
///
/// `similarity_score` is `1 / (1 + d)` where `d` is the RMS distance of a
/// user's standardized features to the seed centroid; `tier` buckets non-seed
/// users by similarity (top 10% `high`, next 20% `medium`, rest `low`).
/// Params: `seed_fraction` (0.05), `lookalike_fraction` (0.2, of non-seed
/// users), `profile_strength` (1.0).
pub struct LookalikeDataGenerator {
    config: GeneratorConfig,
    rng: RandomSource,
    seed_fraction: f64,
    lookalike_fraction: f64,
    profile_strength: f64,
    latent: LatentFactorModel,
}

impl LookalikeDataGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let seed_fraction = config.param_rate("seed_fraction", 0.05, 0.001, 0.5)?;
        let lookalike_fraction = config.param_rate("lookalike_fraction", 0.2, 0.0, 1.0)?;
        let profile_strength = config.param_f64("profile_strength", 1.0)?;
        if !(profile_strength >= 0.0) {
            return Err(GeneratorError::InvalidParameter(
                "profile_strength must be non-negative".to_string(),
            ));
        }
        let latent = LatentFactorModel::from_pairs(
            &TRAITS,
            &[
                ("affinity", "activity", 0.4),
                ("spend", "loyalty", 0.35),
                ("activity", "loyalty", 0.25),
            ],
        )?;
        Ok(Self {
            rng: RandomSource::new(config.seed),
            config,
            seed_fraction,
            lookalike_fraction,
            profile_strength,
            latent,
        })
    }
}

/// Column-wise z-scores; constant columns map to zero.
fn standardize(features: &[Vec<f64>]) -> Vec<Vec<f64>> {
    features
        .iter()
        .map(|values| {
            let mean = stats::mean(values).unwrap_or(0.0);
            let std = stats::std_dev(values).filter(|s| *s > 0.0).unwrap_or(1.0);
            values.iter().map(|v| (v - mean) / std).collect()
        })
        .collect()
}

impl SyntheticGenerator for LookalikeDataGenerator {
    fn name(&self) -> &'static str {
        "lookalike"
    }

    fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn label_columns(&self) -> &'static [&'static str] {
        &["user_id", "is_seed", "is_lookalike", "similarity_score", "tier"]
    }

    fn generate(&mut self) -> Result<Table> {
        let n = self.config.n_samples;
        let seed_count = rate_count(self.seed_fraction, n).max(1);
        let seeds = self.rng.sample_indices(n, seed_count);
        let mut is_seed = vec![false; n];
        for &i in &seeds {
            is_seed[i] = true;
        }
        let is_lookalike: Vec<bool> = is_seed
            .iter()
            .map(|seed| !seed && self.rng.bernoulli(self.lookalike_fraction))
            .collect();

        let mut factors = self.latent.sample(&mut self.rng, n);
        for (i, mut row) in factors.rows_mut().into_iter().enumerate() {
            if is_seed[i] || is_lookalike[i] {
                for (v, shift) in row.iter_mut().zip(SEED_PROFILE) {
                    *v += shift * self.profile_strength;
                }
            }
        }

        let mut age = Vec::with_capacity(n);
        let mut order_value = Vec::with_capacity(n);
        let mut sessions = Vec::with_capacity(n);
        let mut categories = Vec::with_capacity(n);
        let mut tenure = Vec::with_capacity(n);
        let mut open_rate = Vec::with_capacity(n);
        for row in factors.rows() {
            let (affinity, spend, activity, loyalty) = (row[0], row[1], row[2], row[3]);
            age.push((38.0 - 3.0 * activity + self.rng.normal(0.0, 9.0)?).clamp(18.0, 80.0).round());
            order_value.push(self.rng.log_normal(4.0 + 0.4 * spend, 0.35)?);
            sessions.push(self.rng.poisson((1.2 + 0.45 * activity).exp().min(60.0))? as f64);
            categories.push(1.0 + self.rng.poisson((0.8 + 0.5 * affinity).exp().min(30.0))? as f64);
            tenure.push((self.rng.exponential(1.0 / 365.0)? * (0.4 * loyalty).exp()).round());
            open_rate.push(
                self.rng
                    .beta(2.0 * (0.5 * affinity).exp(), 5.0 * (-0.3 * loyalty).exp())?,
            );
        }

        self.rng.add_noise(&mut order_value, self.config.noise_level)?;
        let multiplier = self.config.param_f64("outlier_multiplier", 3.0)?;
        self.rng
            .inject_outliers(&mut order_value, self.config.outlier_rate, multiplier);
        for v in &mut order_value {
            *v = v.max(0.0);
        }

        let standardized = standardize(&[
            age.clone(),
            order_value.clone(),
            sessions.clone(),
            categories.clone(),
            tenure.clone(),
            open_rate.clone(),
        ]);
        let centroid: Vec<f64> = standardized
            .iter()
            .map(|col| seeds.iter().map(|&i| col[i]).sum::<f64>() / seeds.len() as f64)
            .collect();
        let similarity: Vec<f64> = (0..n)
            .map(|i| {
                let sq: f64 = standardized
                    .iter()
                    .zip(&centroid)
                    .map(|(col, c)| (col[i] - c).powi(2))
                    .sum();
                1.0 / (1.0 + (sq / standardized.len() as f64).sqrt())
            })
            .collect();

        let candidates: Vec<f64> = (0..n).filter(|&i| !is_seed[i]).map(|i| similarity[i]).collect();
        let high = stats::quantile(&candidates, 0.9).unwrap_or(f64::INFINITY);
        let medium = stats::quantile(&candidates, 0.7).unwrap_or(f64::INFINITY);
        let tier: Vec<&str> = (0..n)
            .map(|i| match similarity[i] {
                _ if is_seed[i] => "seed",
                s if s >= high => "high",
                s if s >= medium => "medium",
                _ => "low",
            })
            .collect();

        info!(
            rows = n,
            seeds = seed_count,
            lookalikes = is_lookalike.iter().filter(|l| **l).count(),
            "Generated lookalike audience"
        );
        let ids: Vec<String> = (0..n).map(|i| format!("USER-{:06}", i + 1)).collect();
        let table = Table::new(vec![
            Column::from_strs("user_id", &ids),
            Column::from_i64("age", age.iter().map(|v| *v as i64).collect()),
            Column::from_f64("avg_order_value", order_value),
            Column::from_i64("sessions_per_week", sessions.iter().map(|v| *v as i64).collect()),
            Column::from_i64("categories_browsed", categories.iter().map(|v| *v as i64).collect()),
            Column::from_i64("tenure_days", tenure.iter().map(|v| *v as i64).collect()),
            Column::from_f64("email_open_rate", open_rate),
            Column::from_bools("is_seed", is_seed),
            Column::from_bools("is_lookalike", is_lookalike),
            Column::from_f64("similarity_score", similarity),
            Column::from_strs("tier", &tier),
        ])?;
        let labels = self.label_columns();
        finish(table, &self.config, &mut self.rng, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn flags(table: &Table, name: &str) -> Vec<bool> {
        table
            .column(name)
            .unwrap()
            .values()
            .into_iter()
            .map(|v| v == Value::Bool(true))
            .collect()
    }

    #[test]
    fn test_seed_count_is_exact() {
        let config = GeneratorConfig::new(2_000).with_param("seed_fraction", 0.05);
        let table = LookalikeDataGenerator::new(config).unwrap().generate().unwrap();
        assert_eq!(flags(&table, "is_seed").iter().filter(|s| **s).count(), 100);
        let tiers = table.column("tier").unwrap().to_strings();
        assert_eq!(tiers.iter().filter(|t| t.as_deref() == Some("seed")).count(), 100);
    }

    #[test]
    fn test_true_lookalikes_score_higher() {
        let table = LookalikeDataGenerator::new(GeneratorConfig::new(3_000))
            .unwrap()
            .generate()
            .unwrap();
        let seed = flags(&table, "is_seed");
        let lookalike = flags(&table, "is_lookalike");
        let similarity = table.column("similarity_score").unwrap().numeric_values();
        let mean_of = |pick: &dyn Fn(usize) -> bool| {
            let values: Vec<f64> = (0..similarity.len()).filter(|i| pick(*i)).map(|i| similarity[i]).collect();
            stats::mean(&values).unwrap()
        };
        let lookalikes = mean_of(&|i| lookalike[i]);
        let others = mean_of(&|i| !lookalike[i] && !seed[i]);
        assert!(lookalikes > others);
    }

    #[test]
    fn test_tiny_population_still_has_a_seed() {
        let table = LookalikeDataGenerator::new(GeneratorConfig::new(5))
            .unwrap()
            .generate()
            .unwrap();
        assert_eq!(flags(&table, "is_seed").iter().filter(|s| **s).count(), 1);
        let similarity = table.column("similarity_score").unwrap().numeric_values();
        assert!(similarity.iter().all(|s| s.is_finite() && *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_invalid_seed_fraction() {
        let config = GeneratorConfig::new(10).with_param("seed_fraction", 0.9);
        assert!(LookalikeDataGenerator::new(config).is_err());
    }
}
