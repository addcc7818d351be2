//! Purchase propensity with a calibrated conversion rate.

use tracing::info;

use super::curves::sigmoid;
use super::latent::LatentFactorModel;
use super::primitives::{calibrate_intercept, RandomSource};
use super::{finish, GeneratorConfig, Result, SyntheticGenerator};
use crate::table::{Column, Table};

const CHANNELS: [(&str, f64); 5] = [
    ("organic", 0.35),
    ("paid_search", 0.25),
    ("social", 0.2),
    ("email", 0.12),
    ("referral", 0.08),
];
const DEVICES: [(&str, f64); 3] = [("mobile", 0.55), ("desktop", 0.35), ("tablet", 0.1)];

/// Visitors with browsing behaviour driven by two latent traits (intent,
/// affluence). `propensity_score` is the true conversion probability, its
/// intercept calibrated so the expected rate equals `base_rate` (0.05);
/// `converted` is a Bernoulli draw from it.
pub struct PropensityDataGenerator {
    config: GeneratorConfig,
    rng: RandomSource,
    base_rate: f64,
    latent: LatentFactorModel,
}

impl PropensityDataGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let base_rate = config.param_rate("base_rate", 0.05, 0.001, 0.999)?;
        let latent = LatentFactorModel::from_pairs(
            &["intent", "affluence"],
            &[("intent", "affluence", config.param_f64("intent_affluence_corr", 0.25)?)],
        )?;
        Ok(Self {
            rng: RandomSource::new(config.seed),
            config,
            base_rate,
            latent,
        })
    }
}

impl SyntheticGenerator for PropensityDataGenerator {
    fn name(&self) -> &'static str {
        "propensity"
    }

    fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn label_columns(&self) -> &'static [&'static str] {
        &["user_id", "propensity_score", "converted"]
    }

    fn generate(&mut self) -> Result<Table> {
        let n = self.config.n_samples;
        let factors = self.latent.sample(&mut self.rng, n);

        let mut age = Vec::with_capacity(n);
        let mut income = Vec::with_capacity(n);
        let mut sessions = Vec::with_capacity(n);
        let mut pages = Vec::with_capacity(n);
        let mut time_on_site = Vec::with_capacity(n);
        let mut cart_adds = Vec::with_capacity(n);
        let mut recency = Vec::with_capacity(n);
        let mut previous_purchases = Vec::with_capacity(n);
        let mut channel = Vec::with_capacity(n);
        let mut device = Vec::with_capacity(n);
        let mut first_seen = Vec::with_capacity(n);
        let mut scores = Vec::with_capacity(n);

        for row in factors.rows() {
            let (intent, affluence) = (row[0], row[1]);
            let source = *self.rng.choose_weighted(&CHANNELS)?;
            let kind = *self.rng.choose_weighted(&DEVICES)?;

            let years = (40.0 + 6.0 * affluence + self.rng.normal(0.0, 10.0)?).clamp(18.0, 80.0).round();
            let yearly = self.rng.log_normal(10.8 + 0.35 * affluence, 0.3)?;
            let visits = 1 + self.rng.poisson((1.0 + 0.5 * intent).exp().min(50.0))?;
            let viewed = visits + self.rng.poisson((1.5 + 0.4 * intent).exp().min(100.0))?;
            let seconds = self.rng.gamma(2.0, 60.0 * (0.3 * intent).exp())? * visits as f64;
            let carts = self.rng.poisson((0.9 * intent - 0.8).exp().min(20.0))?;
            let idle = self.rng.exponential(1.0 / (14.0 * (-0.5 * intent).exp()))?.round();
            let purchases = self.rng.poisson((0.4 * affluence + 0.3 * intent - 0.5).exp().min(20.0))?;
            let seen = self.rng.date_between(self.config.start_date, self.config.end_date);

            let channel_effect = match source {
                "email" => 0.5,
                "referral" => 0.4,
                "paid_search" => 0.2,
                "social" => -0.3,
                _ => 0.0,
            };
            let device_effect = if kind == "desktop" { 0.25 } else { 0.0 };
            scores.push(
                1.1 * intent + 0.3 * affluence + 0.35 * carts as f64 + 0.2 * purchases as f64
                    - 0.02 * idle
                    + channel_effect
                    + device_effect,
            );

            age.push(years as i64);
            income.push(yearly);
            sessions.push(visits);
            pages.push(viewed);
            time_on_site.push(seconds);
            cart_adds.push(carts);
            recency.push(idle as i64);
            previous_purchases.push(purchases);
            channel.push(source);
            device.push(kind);
            first_seen.push(seen.and_hms_opt(0, 0, 0));
        }

        let intercept = calibrate_intercept(&scores, self.base_rate);
        let propensity: Vec<f64> = scores.iter().map(|s| sigmoid(s + intercept)).collect();
        let converted: Vec<i64> = propensity
            .iter()
            .map(|p| self.rng.bernoulli(*p) as i64)
            .collect();

        self.rng.add_noise(&mut income, self.config.noise_level)?;
        self.rng.add_noise(&mut time_on_site, self.config.noise_level)?;
        let multiplier = self.config.param_f64("outlier_multiplier", 3.0)?;
        self.rng
            .inject_outliers(&mut income, self.config.outlier_rate, multiplier);
        for v in income.iter_mut().chain(time_on_site.iter_mut()) {
            *v = v.max(0.0);
        }

        info!(
            rows = n,
            converted = converted.iter().sum::<i64>(),
            base_rate = self.base_rate,
            "Generated propensity data"
        );
        let ids: Vec<String> = (0..n).map(|i| format!("USER-{:06}", i + 1)).collect();
        let table = Table::new(vec![
            Column::from_strs("user_id", &ids),
            Column::datetime("first_seen", first_seen),
            Column::from_i64("age", age),
            Column::from_f64("income", income),
            Column::from_strs("acquisition_channel", &channel),
            Column::from_strs("device", &device),
            Column::from_i64("sessions_30d", sessions),
            Column::from_i64("pages_viewed", pages),
            Column::from_f64("time_on_site_sec", time_on_site),
            Column::from_i64("cart_adds", cart_adds),
            Column::from_i64("days_since_last_visit", recency),
            Column::from_i64("previous_purchases", previous_purchases),
            Column::from_f64("propensity_score", propensity),
            Column::from_i64("converted", converted),
        ])?;
        let labels = self.label_columns();
        finish(table, &self.config, &mut self.rng, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::stats;

    #[test]
    fn test_base_rate_is_calibrated() {
        let config = GeneratorConfig::new(4_000).with_param("base_rate", 0.1);
        let table = PropensityDataGenerator::new(config).unwrap().generate().unwrap();
        let scores = table.column("propensity_score").unwrap().numeric_values();
        assert!((stats::mean(&scores).unwrap() - 0.1).abs() < 1e-6);
        assert!(scores.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_cart_adds_raise_propensity() {
        let table = PropensityDataGenerator::new(GeneratorConfig::new(4_000))
            .unwrap()
            .generate()
            .unwrap();
        let carts = table.column("cart_adds").unwrap().to_f64().unwrap();
        let scores = table.column("propensity_score").unwrap().to_f64().unwrap();
        assert!(stats::pearson(&carts, &scores).unwrap() > 0.2);
    }

    #[test]
    fn test_first_seen_within_range() {
        let table = PropensityDataGenerator::new(GeneratorConfig::new(100))
            .unwrap()
            .generate()
            .unwrap();
        let config = GeneratorConfig::new(1);
        let start = config.start_date.and_hms_opt(0, 0, 0).unwrap();
        let end = config.end_date.and_hms_opt(0, 0, 0).unwrap();
        for value in table.column("first_seen").unwrap().values() {
            let crate::table::Value::DateTime(dt) = value else {
                panic!("expected a datetime");
            };
            assert!(dt >= start && dt <= end);
        }
    }

    #[test]
    fn test_invalid_base_rate() {
        let config = GeneratorConfig::new(10).with_param("base_rate", 1.0);
        assert!(PropensityDataGenerator::new(config).is_err());
    }
}
