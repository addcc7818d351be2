//! Channel spend and diminishing-returns response.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::curves::{adstock, Adstock, ExponentialSaturation, HillCurve, LogisticCurve};
use super::primitives::{stable_bucket, RandomSource};
use super::{finish, GeneratorConfig, Result, SyntheticGenerator};
use crate::error::GeneratorError;
use crate::table::{Column, Table};

/// Response curve family used for every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveFamily {
    Hill,
    Exponential,
    Logistic,
}

impl std::str::FromStr for CurveFamily {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hill" => Ok(CurveFamily::Hill),
            "exponential" => Ok(CurveFamily::Exponential),
            "logistic" => Ok(CurveFamily::Logistic),
            other => Err(GeneratorError::InvalidParameter(format!(
                "unknown curve family '{}'",
                other
            ))),
        }
    }
}

/// Ground-truth response parameters of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCurve {
    pub channel: String,
    /// Median spend per period.
    pub typical_spend: f64,
    pub max_response: f64,
    /// Spend at which the response is half of `max_response`.
    pub half_saturation: f64,
    pub slope: f64,
    pub adstock: Adstock,
}

impl ChannelCurve {
    fn defaults() -> Result<Vec<ChannelCurve>> {
        [
            ("tv", 50_000.0, 180_000.0, 60_000.0, 1.8, 0.6),
            ("search", 20_000.0, 90_000.0, 15_000.0, 1.0, 0.2),
            ("social", 15_000.0, 60_000.0, 18_000.0, 1.4, 0.4),
            ("display", 10_000.0, 30_000.0, 12_000.0, 1.2, 0.3),
            ("video", 25_000.0, 80_000.0, 30_000.0, 1.6, 0.5),
        ]
        .into_iter()
        .map(|(channel, spend, vmax, k, n, decay)| {
            Ok(ChannelCurve {
                channel: channel.to_string(),
                typical_spend: spend,
                max_response: vmax,
                half_saturation: k,
                slope: n,
                adstock: Adstock::new(decay)?,
            })
        })
        .collect()
    }

    /// Response to an (adstocked) spend level under `family`, all families
    /// sharing the same asymptote and half-saturation point.
    pub fn response(&self, family: CurveFamily, spend: f64) -> Result<f64> {
        Ok(match family {
            CurveFamily::Hill => {
                HillCurve::new(self.max_response, self.half_saturation, self.slope)?.response(spend)
            }
            CurveFamily::Exponential => ExponentialSaturation::new(
                self.max_response,
                std::f64::consts::LN_2 / self.half_saturation,
                1.0,
            )?
            .response(spend),
            CurveFamily::Logistic => {
                LogisticCurve::new(self.max_response, self.slope * 4.0 / self.half_saturation, self.half_saturation)?
                    .response(spend)
            }
        })
    }
}

/// Per-period channel spend with the resulting response.
///
/// Rows cycle through the channels, one period per full cycle, so each
/// channel carries its own adstock. Params: `curve` (`hill`), `channels`
/// (a subset of tv/search/social/display/video), `holdout_percent` (20),
/// `outlier_multiplier` (3).
///
/// Spend outliers that fall below zero are clamped to zero spend.
pub struct BudgetResponseGenerator {
    config: GeneratorConfig,
    rng: RandomSource,
    family: CurveFamily,
    channels: Vec<ChannelCurve>,
    holdout_percent: u64,
    outlier_multiplier: f64,
}

impl BudgetResponseGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let family: CurveFamily = config.param_str("curve", "hill")?.parse()?;
        let mut channels = ChannelCurve::defaults()?;
        if let Some(selected) = config.param_strings("channels")? {
            if let Some(unknown) = selected.iter().find(|s| !channels.iter().any(|c| &c.channel == *s)) {
                return Err(GeneratorError::InvalidParameter(format!(
                    "unknown channel '{}'",
                    unknown
                )));
            }
            channels.retain(|c| selected.contains(&c.channel));
        }
        if channels.is_empty() {
            return Err(GeneratorError::InvalidParameter(
                "at least one channel is required".to_string(),
            ));
        }
        let holdout_percent = config.param_usize("holdout_percent", 20)?;
        if holdout_percent > 100 {
            return Err(GeneratorError::InvalidParameter(
                "holdout_percent must be at most 100".to_string(),
            ));
        }
        Ok(Self {
            rng: RandomSource::new(config.seed),
            family,
            channels,
            holdout_percent: holdout_percent as u64,
            outlier_multiplier: config.param_f64("outlier_multiplier", 3.0)?,
            config,
        })
    }

    pub fn channels(&self) -> &[ChannelCurve] {
        &self.channels
    }
}

impl SyntheticGenerator for BudgetResponseGenerator {
    fn name(&self) -> &'static str {
        "budget"
    }

    fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn label_columns(&self) -> &'static [&'static str] {
        &["date", "channel", "response", "split"]
    }

    fn generate(&mut self) -> Result<Table> {
        let n = self.config.n_samples;
        let k = self.channels.len();

        let mut spend = vec![0.0; n];
        for (i, s) in spend.iter_mut().enumerate() {
            let curve = &self.channels[i % k];
            *s = self.rng.log_normal(curve.typical_spend.ln(), 0.5)?;
        }
        let outliers = self
            .rng
            .inject_outliers(&mut spend, self.config.outlier_rate, self.outlier_multiplier);
        for i in outliers {
            spend[i] = spend[i].max(0.0);
        }

        // Carryover runs per channel over its own periods.
        let mut adstocked = vec![0.0; n];
        for (c, curve) in self.channels.iter().enumerate() {
            let rows: Vec<usize> = (c..n).step_by(k).collect();
            let series: Vec<f64> = rows.iter().map(|&i| spend[i]).collect();
            for (i, v) in rows.iter().zip(adstock(&series, curve.adstock.decay)) {
                adstocked[*i] = v;
            }
        }

        let mut response = Vec::with_capacity(n);
        let mut marginal = Vec::with_capacity(n);
        for i in 0..n {
            let curve = &self.channels[i % k];
            response.push(curve.response(self.family, adstocked[i])?);
            let step = curve.half_saturation * 0.01;
            marginal.push(
                (curve.response(self.family, adstocked[i] + step)? - curve.response(self.family, adstocked[i])?)
                    / step,
            );
        }
        self.rng.add_noise(&mut response, self.config.noise_level)?;
        for r in &mut response {
            *r = r.max(0.0);
        }

        let span_days = (self.config.end_date - self.config.start_date).num_days().max(0) + 1;
        let dates = (0..n)
            .map(|i| {
                let period = (i / k) as i64;
                (self.config.start_date + Duration::days(period % span_days)).and_hms_opt(0, 0, 0)
            })
            .collect();
        let channel_names: Vec<&str> = (0..n).map(|i| self.channels[i % k].channel.as_str()).collect();
        let split: Vec<&str> = (0..n)
            .map(|i| {
                let key = format!("{}:{}:{}", self.config.seed, channel_names[i], i / k);
                if stable_bucket(&key, 100) < self.holdout_percent {
                    "holdout"
                } else {
                    "train"
                }
            })
            .collect();
        let roi: Vec<f64> = response
            .iter()
            .zip(&spend)
            .map(|(r, s)| if *s > 0.0 { r / s } else { 0.0 })
            .collect();

        info!(rows = n, channels = k, curve = ?self.family, "Generated budget response data");
        let table = Table::new(vec![
            Column::datetime("date", dates),
            Column::from_strs("channel", &channel_names),
            Column::from_f64("spend", spend),
            Column::from_f64("adstocked_spend", adstocked),
            Column::from_f64("marginal_response", marginal),
            Column::from_f64("roi", roi),
            Column::from_f64("response", response),
            Column::from_strs("split", &split),
        ])?;
        let labels = self.label_columns();
        finish(table, &self.config, &mut self.rng, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_cycle_and_response_bounded() {
        let config = GeneratorConfig::new(100).with_noise_level(0.0);
        let mut generator = BudgetResponseGenerator::new(config).unwrap();
        let table = generator.generate().unwrap();
        let channels = table.column("channel").unwrap().to_strings();
        assert_eq!(channels[0].as_deref(), Some("tv"));
        assert_eq!(channels[5].as_deref(), Some("tv"));

        let response = table.column("response").unwrap().numeric_values();
        let channel_rows: Vec<usize> = (0..100).step_by(5).collect();
        for i in channel_rows {
            assert!(response[i] < 180_000.0);
            assert!(response[i] >= 0.0);
        }
    }

    #[test]
    fn test_low_spend_outliers_clamp_to_zero() {
        let config = GeneratorConfig::new(1_000)
            .with_seed(5)
            .with_outlier_rate(0.2);
        let table = BudgetResponseGenerator::new(config).unwrap().generate().unwrap();
        let spend = table.column("spend").unwrap().numeric_values();
        assert!(spend.iter().all(|s| *s >= 0.0));
        let zeros = spend.iter().filter(|s| **s == 0.0).count();
        assert!(zeros > 0 && zeros <= 200, "zero-spend rows: {}", zeros);
    }

    #[test]
    fn test_adstock_per_channel() {
        let config = GeneratorConfig::new(10)
            .with_noise_level(0.0)
            .with_param("channels", serde_json::json!(["tv", "search"]));
        let table = BudgetResponseGenerator::new(config).unwrap().generate().unwrap();
        let spend = table.column("spend").unwrap().numeric_values();
        let adstocked = table.column("adstocked_spend").unwrap().numeric_values();
        assert_eq!(adstocked[0], spend[0]);
        assert!((adstocked[2] - (spend[2] + 0.6 * adstocked[0])).abs() < 1e-6);
        assert!((adstocked[3] - (spend[3] + 0.2 * adstocked[1])).abs() < 1e-6);
    }

    #[test]
    fn test_split_is_stable_across_seeds_of_noise() {
        let a = BudgetResponseGenerator::new(GeneratorConfig::new(50).with_noise_level(0.0))
            .unwrap()
            .generate()
            .unwrap();
        let b = BudgetResponseGenerator::new(GeneratorConfig::new(50).with_noise_level(0.5))
            .unwrap()
            .generate()
            .unwrap();
        assert_eq!(a.column("split"), b.column("split"));
    }

    #[test]
    fn test_invalid_params() {
        let bad_curve = GeneratorConfig::new(10).with_param("curve", "cubic");
        assert!(BudgetResponseGenerator::new(bad_curve).is_err());
        let bad_channel = GeneratorConfig::new(10).with_param("channels", serde_json::json!(["radio"]));
        assert!(BudgetResponseGenerator::new(bad_channel).is_err());
    }

    #[test]
    fn test_curve_families_share_half_point() {
        let curve = &ChannelCurve::defaults().unwrap()[0];
        for family in [CurveFamily::Hill, CurveFamily::Exponential, CurveFamily::Logistic] {
            let half = curve.response(family, curve.half_saturation).unwrap();
            assert!((half - curve.max_response / 2.0).abs() < 1e-6, "{family:?}");
        }
    }
}
