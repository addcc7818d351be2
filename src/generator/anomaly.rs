//! Hourly metric series with labelled anomalies.
//!
//! The clean series is `base + trend * t + daily + weekly` seasonality plus
//! Gaussian noise. Exactly `round(anomaly_rate * n)` rows are then labelled,
//! each by one of:
//!
//! - **spike / drop**: the value is multiplied or divided by a factor in `[2, 5]`
//! - **contextual**: the value is replaced by the seasonal level of the
//!   opposite half of the day (`(hour + 12) % 24`)
//! - **collective**: a 3 to 12 sample window is shifted, drifted or has its
//!   variance inflated; every sample in the window is labelled
//! - **trend change**: the slope changes from the changepoint onward; only the
//!   changepoint is labelled

use std::f64::consts::PI;

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::primitives::{rate_count, RandomSource};
use super::{finish, GeneratorConfig, Result, SyntheticGenerator};
use crate::error::GeneratorError;
use crate::table::{stats, Column, Table};

const MIN_WINDOW: usize = 3;
const MAX_WINDOW: usize = 12;
const WINDOW_ATTEMPTS: usize = 32;

/// Family of injected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Point,
    Contextual,
    Collective,
    TrendChange,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 4] = [
        AnomalyType::Point,
        AnomalyType::Contextual,
        AnomalyType::Collective,
        AnomalyType::TrendChange,
    ];

    fn parse(name: &str) -> Result<Self> {
        match name {
            "point" => Ok(AnomalyType::Point),
            "contextual" => Ok(AnomalyType::Contextual),
            "collective" => Ok(AnomalyType::Collective),
            "trend_change" | "trend" => Ok(AnomalyType::TrendChange),
            other => Err(GeneratorError::InvalidParameter(format!(
                "unknown anomaly type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SeriesShape {
    base: f64,
    trend: f64,
    daily_amplitude: f64,
    weekly_amplitude: f64,
}

impl SeriesShape {
    fn level(&self, t: usize, hour: u32, weekday: u32) -> f64 {
        self.base
            + self.trend * t as f64
            + self.daily_amplitude * (2.0 * PI * hour as f64 / 24.0).sin()
            + self.weekly_amplitude * (2.0 * PI * weekday as f64 / 7.0).sin()
    }
}

/// Per-row labels.
#[derive(Debug, Clone)]
struct Labels {
    is_anomaly: Vec<bool>,
    score: Vec<f64>,
    kind: Vec<&'static str>,
}

impl Labels {
    fn new(n: usize) -> Self {
        Self {
            is_anomaly: vec![false; n],
            score: vec![0.0; n],
            kind: vec!["normal"; n],
        }
    }

    fn mark(&mut self, i: usize, kind: &'static str, score: f64) {
        self.is_anomaly[i] = true;
        self.score[i] = score.clamp(0.0, 1.0);
        self.kind[i] = kind;
    }

    fn free_window(&self, start: usize, len: usize) -> bool {
        start + len <= self.is_anomaly.len() && !self.is_anomaly[start..start + len].iter().any(|a| *a)
    }
}

/// Time-series generator with exact-count anomaly labelling.
///
/// Params: `anomaly_rate` (0.05), `anomaly_types` (all), `base_value` (100),
/// `trend` (0.0 per hour), `daily_amplitude` (20), `weekly_amplitude` (10),
/// `outlier_multiplier` (3).
///
/// `outlier_rate` adds `round(outlier_rate * n)` labelled `outlier` rows on top
/// of the anomaly count, drawn from rows that carry no anomaly.
pub struct AnomalyDataGenerator {
    config: GeneratorConfig,
    rng: RandomSource,
    anomaly_rate: f64,
    types: Vec<AnomalyType>,
    shape: SeriesShape,
}

impl AnomalyDataGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let anomaly_rate = config.param_rate("anomaly_rate", 0.05, 0.0, 1.0)?;
        let types = match config.param_strings("anomaly_types")? {
            Some(names) if names.is_empty() => {
                return Err(GeneratorError::InvalidParameter(
                    "anomaly_types must not be empty".to_string(),
                ))
            }
            Some(names) => names
                .iter()
                .map(|n| AnomalyType::parse(n))
                .collect::<Result<Vec<_>>>()?,
            None => AnomalyType::ALL.to_vec(),
        };
        let shape = SeriesShape {
            base: config.param_f64("base_value", 100.0)?,
            trend: config.param_f64("trend", 0.0)?,
            daily_amplitude: config.param_f64("daily_amplitude", 20.0)?,
            weekly_amplitude: config.param_f64("weekly_amplitude", 10.0)?,
        };
        if shape.base <= 0.0 {
            return Err(GeneratorError::InvalidParameter(
                "base_value must be positive".to_string(),
            ));
        }
        Ok(Self {
            rng: RandomSource::new(config.seed),
            config,
            anomaly_rate,
            types,
            shape,
        })
    }

    pub fn anomaly_rate(&self) -> f64 {
        self.anomaly_rate
    }

    /// Picks an unlabelled index by rejection from the shuffled order.
    fn next_free(order: &mut Vec<usize>, labels: &Labels) -> Option<usize> {
        while let Some(i) = order.pop() {
            if !labels.is_anomaly[i] {
                return Some(i);
            }
        }
        None
    }

    fn inject(
        &mut self,
        values: &mut [f64],
        timestamps: &[NaiveDateTime],
        series_std: f64,
    ) -> Result<Labels> {
        let n = values.len();
        let mut labels = Labels::new(n);
        let mut remaining = rate_count(self.anomaly_rate, n);
        let mut order: Vec<usize> = (0..n).collect();
        self.rng.shuffle(&mut order);
        let scale = series_std.max(1e-9);

        while remaining > 0 {
            let mut kind = self.types[self.rng.int_between(0, self.types.len() as i64 - 1) as usize];

            if kind == AnomalyType::Collective {
                let window = (self.rng.int_between(MIN_WINDOW as i64, MAX_WINDOW as i64) as usize)
                    .min(remaining);
                let start = (window >= MIN_WINDOW)
                    .then(|| {
                        (0..WINDOW_ATTEMPTS).find_map(|_| {
                            let start = self.rng.int_between(0, n.saturating_sub(window) as i64) as usize;
                            labels.free_window(start, window).then_some(start)
                        })
                    })
                    .flatten();
                match start {
                    Some(start) => {
                        self.collective(values, &mut labels, start, window, scale)?;
                        remaining -= window;
                        continue;
                    }
                    None => kind = AnomalyType::Point,
                }
            }

            let Some(i) = Self::next_free(&mut order, &labels) else {
                break;
            };
            match kind {
                AnomalyType::Point | AnomalyType::Collective => {
                    let factor = self.rng.uniform(2.0, 5.0);
                    let score = (factor - 1.0) / 4.0;
                    if self.rng.bernoulli(0.5) {
                        values[i] *= factor;
                        labels.mark(i, "spike", score);
                    } else {
                        values[i] /= factor;
                        labels.mark(i, "drop", score);
                    }
                }
                AnomalyType::Contextual => {
                    let ts = timestamps[i];
                    let swapped = (ts.hour() + 12) % 24;
                    let level = self.shape.level(i, swapped, ts.weekday().num_days_from_monday());
                    let score = ((values[i] - level).abs() / (4.0 * scale)).max(0.3);
                    values[i] = level;
                    labels.mark(i, "contextual", score);
                }
                AnomalyType::TrendChange => {
                    let slope = self.rng.sign() * self.rng.uniform(0.01, 0.05) * scale;
                    for (offset, v) in values[i..].iter_mut().enumerate() {
                        *v += slope * offset as f64;
                    }
                    labels.mark(i, "trend_change", (slope.abs() / (0.05 * scale)).min(1.0));
                }
            }
            remaining -= 1;
        }
        Ok(labels)
    }

    fn collective(
        &mut self,
        values: &mut [f64],
        labels: &mut Labels,
        start: usize,
        window: usize,
        scale: f64,
    ) -> Result<()> {
        let magnitude = self.rng.uniform(2.0, 4.0) * scale * self.rng.sign();
        let score = magnitude.abs() / (4.0 * scale);
        let variant = self.rng.int_between(0, 2);
        for (offset, i) in (start..start + window).enumerate() {
            match variant {
                0 => values[i] += magnitude,
                1 => values[i] += magnitude * (offset + 1) as f64 / window as f64,
                _ => values[i] += self.rng.normal(0.0, 3.0 * scale)?,
            }
            labels.mark(i, "collective", score);
        }
        debug!(start, window, variant, "Injected collective anomaly");
        Ok(())
    }

    /// Replaces `round(outlier_rate * n)` rows that carry no anomaly yet and
    /// labels them `outlier`, scored by their distance in units of
    /// `2 * multiplier * std`.
    fn inject_outliers(&mut self, values: &mut [f64], labels: &mut Labels) -> Result<()> {
        let free: Vec<usize> = (0..values.len()).filter(|i| !labels.is_anomaly[*i]).collect();
        let count = rate_count(self.config.outlier_rate, values.len()).min(free.len());
        if count == 0 {
            return Ok(());
        }
        let (Some(mean), Some(std)) = (stats::mean(values), stats::std_dev(values)) else {
            return Ok(());
        };
        let multiplier = self.config.param_f64("outlier_multiplier", 3.0)?;
        let picked: Vec<usize> = self
            .rng
            .sample_indices(free.len(), count)
            .into_iter()
            .map(|k| free[k])
            .collect();
        self.rng.replace_with_outliers(values, &picked, mean, std, multiplier);
        let spread = 2.0 * multiplier * std;
        for i in picked {
            let score = if spread > 0.0 { (values[i] - mean).abs() / spread } else { 1.0 };
            labels.mark(i, "outlier", score);
        }
        debug!(count, "Injected labelled outliers");
        Ok(())
    }
}

impl SyntheticGenerator for AnomalyDataGenerator {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn label_columns(&self) -> &'static [&'static str] {
        &["timestamp", "is_anomaly", "anomaly_score", "anomaly_type"]
    }

    fn generate(&mut self) -> Result<Table> {
        let n = self.config.n_samples;
        let start = self.config.start_date.and_hms_opt(0, 0, 0).unwrap_or_default();
        let timestamps: Vec<NaiveDateTime> =
            (0..n).map(|t| start + Duration::hours(t as i64)).collect();

        let mut values: Vec<f64> = timestamps
            .iter()
            .enumerate()
            .map(|(t, ts)| self.shape.level(t, ts.hour(), ts.weekday().num_days_from_monday()))
            .collect();
        let series_std = stats::std_dev(&values).unwrap_or(0.0);
        self.rng.add_noise(&mut values, self.config.noise_level)?;

        let mut labels = self.inject(&mut values, &timestamps, series_std.max(self.shape.base * 0.05))?;
        self.inject_outliers(&mut values, &mut labels)?;
        let anomalies = labels.is_anomaly.iter().filter(|a| **a).count();
        info!(rows = n, anomalies, "Generated anomaly series");

        let table = Table::new(vec![
            Column::datetime("timestamp", timestamps.iter().map(|t| Some(*t)).collect()),
            Column::from_f64("value", values),
            Column::from_i64("hour", timestamps.iter().map(|t| t.hour() as i64).collect()),
            Column::from_i64(
                "day_of_week",
                timestamps
                    .iter()
                    .map(|t| t.weekday().num_days_from_monday() as i64)
                    .collect(),
            ),
            Column::from_i64(
                "is_anomaly",
                labels.is_anomaly.iter().map(|a| *a as i64).collect(),
            ),
            Column::from_f64("anomaly_score", labels.score),
            Column::from_strs("anomaly_type", &labels.kind),
        ])?;
        let labels = self.label_columns();
        finish(table, &self.config, &mut self.rng, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn anomaly_count(table: &Table) -> usize {
        table
            .column("is_anomaly")
            .unwrap()
            .values()
            .iter()
            .filter(|v| **v == Value::Int(1))
            .count()
    }

    #[test]
    fn test_exact_anomaly_count() {
        let config = GeneratorConfig::new(10_000).with_param("anomaly_rate", 0.05);
        let table = AnomalyDataGenerator::new(config).unwrap().generate().unwrap();
        assert_eq!(table.n_rows(), 10_000);
        assert_eq!(anomaly_count(&table), 500);
    }

    #[test]
    fn test_labels_are_consistent() {
        let config = GeneratorConfig::new(2_000)
            .with_seed(3)
            .with_param("anomaly_rate", 0.1);
        let table = AnomalyDataGenerator::new(config).unwrap().generate().unwrap();
        assert_eq!(anomaly_count(&table), 200);
        let flags = table.column("is_anomaly").unwrap().values();
        let scores = table.column("anomaly_score").unwrap().numeric_values();
        let kinds = table.column("anomaly_type").unwrap().to_strings();
        for ((flag, score), kind) in flags.iter().zip(&scores).zip(&kinds) {
            if *flag == Value::Int(1) {
                assert!((0.0..=1.0).contains(score));
                assert_ne!(kind.as_deref(), Some("normal"));
            } else {
                assert_eq!(*score, 0.0);
                assert_eq!(kind.as_deref(), Some("normal"));
            }
        }
    }

    #[test]
    fn test_single_type_selection() {
        let config = GeneratorConfig::new(500)
            .with_param("anomaly_rate", 0.1)
            .with_param("anomaly_types", serde_json::json!(["collective"]));
        let table = AnomalyDataGenerator::new(config).unwrap().generate().unwrap();
        assert_eq!(anomaly_count(&table), 50);
        let kinds = table.column("anomaly_type").unwrap().to_strings();
        assert!(kinds.iter().flatten().any(|k| k == "collective"));
    }

    #[test]
    fn test_missing_values_skip_labels() {
        let config = GeneratorConfig::new(400).with_missing_rate(0.1);
        let table = AnomalyDataGenerator::new(config).unwrap().generate().unwrap();
        assert_eq!(table.column("value").unwrap().null_count(), 40);
        assert_eq!(table.column("is_anomaly").unwrap().null_count(), 0);
    }

    #[test]
    fn test_outlier_rate_adds_labelled_outliers() {
        let base = GeneratorConfig::new(2_000)
            .with_seed(11)
            .with_noise_level(0.0)
            .with_param("anomaly_rate", 0.05);
        let clean = AnomalyDataGenerator::new(base.clone()).unwrap().generate().unwrap();
        let noisy = AnomalyDataGenerator::new(base.with_outlier_rate(0.1))
            .unwrap()
            .generate()
            .unwrap();
        assert_ne!(
            clean.column("value").unwrap().numeric_values(),
            noisy.column("value").unwrap().numeric_values()
        );
        assert_eq!(anomaly_count(&clean), 100);
        assert_eq!(anomaly_count(&noisy), 300);
        let kinds = noisy.column("anomaly_type").unwrap().to_strings();
        assert_eq!(kinds.iter().flatten().filter(|k| *k == "outlier").count(), 200);
    }

    #[test]
    fn test_invalid_rate_fails_at_construction() {
        let config = GeneratorConfig::new(10).with_param("anomaly_rate", 1.5);
        assert!(AnomalyDataGenerator::new(config).is_err());
        let config = GeneratorConfig::new(10).with_param("anomaly_types", serde_json::json!(["bogus"]));
        assert!(AnomalyDataGenerator::new(config).is_err());
    }
}
