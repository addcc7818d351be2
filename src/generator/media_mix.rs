//! Weekly marketing-mix series with known channel effects.
//!
//! Each channel's spend is carried over with geometric adstock, saturated
//! through a unit Hill curve and scaled by the channel coefficient:
//!
//! ```text
//! contribution[t] = coefficient * hill(adstock(spend)[t], 1, K, n)
//! sales[t]        = base[t] + sum(contribution[t]) + noise
//! ```
//!
//! The parameters used are returned by [`MediaMixGenerator::true_parameters`]
//! so a fitted model can be scored against them.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::curves::{hill, Adstock};
use super::primitives::RandomSource;
use super::{finish, GeneratorConfig, Result, SyntheticGenerator};
use crate::error::GeneratorError;
use crate::table::{Column, Table};

const WEEKS_PER_YEAR: f64 = 52.0;

/// Ground truth for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaChannel {
    pub name: String,
    /// Mean weekly spend when the channel is on air.
    pub mean_spend: f64,
    pub adstock: Adstock,
    /// Adstocked spend giving half of the maximum contribution.
    pub half_saturation: f64,
    pub slope: f64,
    /// Maximum weekly contribution to sales.
    pub coefficient: f64,
    /// Probability that the channel is dark in a given week.
    pub dark_rate: f64,
}

impl MediaChannel {
    pub fn new(
        name: impl Into<String>,
        mean_spend: f64,
        decay: f64,
        half_saturation: f64,
        slope: f64,
        coefficient: f64,
    ) -> Result<Self> {
        let name = name.into();
        if !(mean_spend > 0.0) || !(half_saturation > 0.0) || !(slope > 0.0) || !(coefficient >= 0.0) {
            return Err(GeneratorError::InvalidParameter(format!(
                "channel '{}' needs positive spend, half-saturation and slope and a non-negative coefficient",
                name
            )));
        }
        Ok(Self {
            name,
            mean_spend,
            adstock: Adstock::new(decay)?,
            half_saturation,
            slope,
            coefficient,
            dark_rate: 0.0,
        })
    }

    pub fn with_dark_rate(mut self, rate: f64) -> Self {
        self.dark_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Contribution of an adstocked spend level.
    pub fn contribution(&self, adstocked: f64) -> f64 {
        self.coefficient * hill(adstocked, 1.0, self.half_saturation, self.slope)
    }

    fn defaults() -> Result<Vec<MediaChannel>> {
        Ok(vec![
            MediaChannel::new("tv", 40_000.0, 0.7, 45_000.0, 2.0, 3_500.0)?.with_dark_rate(0.25),
            MediaChannel::new("radio", 8_000.0, 0.5, 10_000.0, 1.5, 900.0)?.with_dark_rate(0.2),
            MediaChannel::new("search", 15_000.0, 0.1, 12_000.0, 1.0, 2_200.0)?,
            MediaChannel::new("social", 12_000.0, 0.3, 14_000.0, 1.3, 1_400.0)?,
            MediaChannel::new("display", 6_000.0, 0.2, 9_000.0, 1.1, 500.0)?.with_dark_rate(0.1),
        ])
    }
}

/// Weekly sales driven by a trending, seasonal base plus media effects.
///
/// Params: `channels` (subset of tv/radio/search/social/display),
/// `base_sales` (10000), `trend` (0.002 relative growth per week),
/// `seasonality` (0.1 relative amplitude, 52-week period),
/// `outlier_multiplier` (3, applied to sales).
pub struct MediaMixGenerator {
    config: GeneratorConfig,
    rng: RandomSource,
    channels: Vec<MediaChannel>,
    base_sales: f64,
    trend: f64,
    seasonality: f64,
}

impl MediaMixGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let mut channels = MediaChannel::defaults()?;
        if let Some(selected) = config.param_strings("channels")? {
            if let Some(unknown) = selected.iter().find(|s| !channels.iter().any(|c| &c.name == *s)) {
                return Err(GeneratorError::InvalidParameter(format!(
                    "unknown channel '{}'",
                    unknown
                )));
            }
            channels.retain(|c| selected.contains(&c.name));
        }
        Self::with_channels(config, channels)
    }

    /// Generator over caller-supplied channels.
    pub fn with_channels(config: GeneratorConfig, channels: Vec<MediaChannel>) -> Result<Self> {
        config.validate()?;
        if channels.is_empty() {
            return Err(GeneratorError::InvalidParameter(
                "at least one channel is required".to_string(),
            ));
        }
        let base_sales = config.param_f64("base_sales", 10_000.0)?;
        if !(base_sales > 0.0) {
            return Err(GeneratorError::InvalidParameter(
                "base_sales must be positive".to_string(),
            ));
        }
        Ok(Self {
            rng: RandomSource::new(config.seed),
            channels,
            base_sales,
            trend: config.param_f64("trend", 0.002)?,
            seasonality: config.param_rate("seasonality", 0.1, 0.0, 1.0)?,
            config,
        })
    }

    pub fn true_parameters(&self) -> &[MediaChannel] {
        &self.channels
    }
}

impl SyntheticGenerator for MediaMixGenerator {
    fn name(&self) -> &'static str {
        "media_mix"
    }

    fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn label_columns(&self) -> &'static [&'static str] {
        &["week", "base_sales", "sales"]
    }

    fn generate(&mut self) -> Result<Table> {
        let n = self.config.n_samples;

        let base: Vec<f64> = (0..n)
            .map(|t| {
                let t = t as f64;
                let season = 1.0 + self.seasonality * (2.0 * std::f64::consts::PI * t / WEEKS_PER_YEAR).sin();
                (self.base_sales * (1.0 + self.trend * t) * season).max(0.0)
            })
            .collect();

        let mut columns = vec![
            Column::datetime(
                "week",
                (0..n)
                    .map(|t| (self.config.start_date + Duration::weeks(t as i64)).and_hms_opt(0, 0, 0))
                    .collect(),
            ),
            Column::from_f64("base_sales", base.clone()),
        ];
        let mut contribution_names = Vec::with_capacity(self.channels.len());
        let mut sales = base;

        for channel in &self.channels {
            let mut spend = Vec::with_capacity(n);
            for _ in 0..n {
                if self.rng.bernoulli(channel.dark_rate) {
                    spend.push(0.0);
                } else {
                    spend.push(self.rng.log_normal(channel.mean_spend.ln() - 0.045, 0.3)?);
                }
            }
            let adstocked = channel.adstock.apply(&spend);
            let contribution: Vec<f64> = adstocked.iter().map(|a| channel.contribution(*a)).collect();
            for (s, c) in sales.iter_mut().zip(&contribution) {
                *s += c;
            }
            columns.push(Column::from_f64(format!("{}_spend", channel.name), spend));
            columns.push(Column::from_f64(format!("{}_adstock", channel.name), adstocked));
            contribution_names.push(format!("{}_contribution", channel.name));
            columns.push(Column::from_f64(format!("{}_contribution", channel.name), contribution));
        }

        self.rng.add_noise(&mut sales, self.config.noise_level)?;
        let multiplier = self.config.param_f64("outlier_multiplier", 3.0)?;
        self.rng
            .inject_outliers(&mut sales, self.config.outlier_rate, multiplier);
        for s in &mut sales {
            *s = s.max(0.0);
        }
        columns.push(Column::from_f64("sales", sales));

        info!(weeks = n, channels = self.channels.len(), "Generated media mix data");
        let table = Table::new(columns)?;
        let mut protected: Vec<&str> = self.label_columns().to_vec();
        protected.extend(contribution_names.iter().map(String::as_str));
        finish(table, &self.config, &mut self.rng, &protected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sales_decompose_without_noise() {
        let config = GeneratorConfig::new(104).with_noise_level(0.0);
        let mut generator = MediaMixGenerator::new(config).unwrap();
        let table = generator.generate().unwrap();
        let sales = table.column("sales").unwrap().numeric_values();
        let mut expected = table.column("base_sales").unwrap().numeric_values();
        for channel in generator.true_parameters() {
            let contribution = table
                .column(&format!("{}_contribution", channel.name))
                .unwrap()
                .numeric_values();
            for (e, c) in expected.iter_mut().zip(contribution) {
                *e += c;
            }
        }
        for (s, e) in sales.iter().zip(expected) {
            assert!((s - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_contribution_bounded_by_coefficient() {
        let config = GeneratorConfig::new(52).with_param("channels", serde_json::json!(["tv"]));
        let mut generator = MediaMixGenerator::new(config).unwrap();
        let table = generator.generate().unwrap();
        let coefficient = generator.true_parameters()[0].coefficient;
        let contribution = table.column("tv_contribution").unwrap().numeric_values();
        assert!(contribution.iter().all(|c| *c >= 0.0 && *c < coefficient));
        assert!(!table.has_column("radio_spend"));
    }

    #[test]
    fn test_adstock_column_follows_recurrence() {
        let config = GeneratorConfig::new(30).with_param("channels", serde_json::json!(["radio"]));
        let table = MediaMixGenerator::new(config).unwrap().generate().unwrap();
        let spend = table.column("radio_spend").unwrap().numeric_values();
        let adstocked = table.column("radio_adstock").unwrap().numeric_values();
        for t in 1..30 {
            assert!((adstocked[t] - (spend[t] + 0.5 * adstocked[t - 1])).abs() < 1e-6);
        }
    }

    #[test]
    fn test_weeks_are_weekly() {
        let table = MediaMixGenerator::new(GeneratorConfig::new(3)).unwrap().generate().unwrap();
        let weeks = table.column("week").unwrap().values();
        let (crate::table::Value::DateTime(a), crate::table::Value::DateTime(b)) = (&weeks[0], &weeks[1]) else {
            panic!("expected datetimes");
        };
        assert_eq!(*b - *a, Duration::days(7));
    }

    #[test]
    fn test_invalid_channels() {
        let config = GeneratorConfig::new(10).with_param("channels", serde_json::json!(["billboard"]));
        assert!(MediaMixGenerator::new(config).is_err());
        assert!(MediaChannel::new("x", 0.0, 0.5, 1.0, 1.0, 1.0).is_err());
        assert!(MediaChannel::new("x", 1.0, 1.0, 1.0, 1.0, 1.0).is_err());
    }
}
