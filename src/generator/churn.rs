//! Subscription customers with churn labels.

use tracing::info;

use super::curves::sigmoid;
use super::latent::LatentFactorModel;
use super::primitives::{calibrate_intercept, RandomSource};
use super::{finish, GeneratorConfig, Result, SyntheticGenerator};
use crate::table::{Column, Table};

const CONTRACTS: [(&str, f64); 3] = [("month_to_month", 0.55), ("one_year", 0.25), ("two_year", 0.2)];
const PAYMENTS: [(&str, f64); 4] = [
    ("credit_card", 0.35),
    ("bank_transfer", 0.25),
    ("electronic_check", 0.3),
    ("mailed_check", 0.1),
];

/// Customers driven by three correlated latent traits (engagement,
/// satisfaction, value). Churn probability is a logistic function of the
/// traits and contract, with the intercept calibrated so the expected churn
/// rate equals the `churn_rate` param (0.2).
pub struct ChurnDataGenerator {
    config: GeneratorConfig,
    rng: RandomSource,
    churn_rate: f64,
    latent: LatentFactorModel,
}

impl ChurnDataGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let churn_rate = config.param_rate("churn_rate", 0.2, 0.001, 0.999)?;
        let latent = LatentFactorModel::from_pairs(
            &["engagement", "satisfaction", "value"],
            &[
                ("engagement", "satisfaction", config.param_f64("engagement_satisfaction_corr", 0.5)?),
                ("engagement", "value", 0.3),
                ("satisfaction", "value", 0.2),
            ],
        )?;
        Ok(Self {
            rng: RandomSource::new(config.seed),
            config,
            churn_rate,
            latent,
        })
    }
}

impl SyntheticGenerator for ChurnDataGenerator {
    fn name(&self) -> &'static str {
        "churn"
    }

    fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn label_columns(&self) -> &'static [&'static str] {
        &["customer_id", "churn_probability", "churned"]
    }

    fn generate(&mut self) -> Result<Table> {
        let n = self.config.n_samples;
        let factors = self.latent.sample(&mut self.rng, n);

        let mut tenure = Vec::with_capacity(n);
        let mut monthly = Vec::with_capacity(n);
        let mut tickets = Vec::with_capacity(n);
        let mut logins = Vec::with_capacity(n);
        let mut satisfaction_score = Vec::with_capacity(n);
        let mut last_login_days = Vec::with_capacity(n);
        let mut contract = Vec::with_capacity(n);
        let mut payment = Vec::with_capacity(n);
        let mut scores = Vec::with_capacity(n);

        for row in factors.rows() {
            let (engagement, satisfaction, value) = (row[0], row[1], row[2]);

            let contract_kind = *self.rng.choose_weighted(&CONTRACTS)?;
            let payment_kind = *self.rng.choose_weighted(&PAYMENTS)?;
            let months = (self.rng.exponential(1.0 / 24.0)? * (1.0 + 0.3 * value).max(0.2))
                .clamp(1.0, 72.0)
                .round();
            let charges = (65.0 + 20.0 * value + self.rng.normal(0.0, 8.0)?).clamp(15.0, 150.0);
            let ticket_count = self.rng.poisson((1.5 - 0.8 * satisfaction).exp().min(20.0))?;
            let login_rate = self.rng.poisson((2.5 + 0.6 * engagement).exp().min(100.0))?;
            let stars = (3.0 + satisfaction + self.rng.normal(0.0, 0.5)?).round().clamp(1.0, 5.0);
            let idle = self.rng.exponential(1.0 / (10.0 * (-0.7 * engagement).exp()))?.round();

            let contract_effect = match contract_kind {
                "month_to_month" => 0.9,
                "one_year" => -0.3,
                _ => -1.0,
            };
            let payment_effect = if payment_kind == "electronic_check" { 0.3 } else { 0.0 };
            scores.push(
                -0.8 * engagement - 0.9 * satisfaction - 0.3 * value - 0.02 * months
                    + 0.15 * ticket_count as f64
                    + contract_effect
                    + payment_effect,
            );

            tenure.push(months as i64);
            monthly.push(charges);
            tickets.push(ticket_count);
            logins.push(login_rate);
            satisfaction_score.push(stars as i64);
            last_login_days.push(idle as i64);
            contract.push(contract_kind);
            payment.push(payment_kind);
        }

        let intercept = calibrate_intercept(&scores, self.churn_rate);
        let probability: Vec<f64> = scores.iter().map(|s| sigmoid(s + intercept)).collect();
        let churned: Vec<i64> = probability
            .iter()
            .map(|p| self.rng.bernoulli(*p) as i64)
            .collect();

        let total: Vec<f64> = monthly
            .iter()
            .zip(&tenure)
            .map(|(m, t)| m * *t as f64)
            .collect();
        self.rng.add_noise(&mut monthly, self.config.noise_level)?;
        let multiplier = self.config.param_f64("outlier_multiplier", 3.0)?;
        self.rng
            .inject_outliers(&mut monthly, self.config.outlier_rate, multiplier);
        for m in &mut monthly {
            *m = m.max(0.0);
        }

        info!(
            rows = n,
            churned = churned.iter().sum::<i64>(),
            intercept,
            "Generated churn data"
        );
        let ids: Vec<String> = (0..n).map(|i| format!("CUST-{:06}", i + 1)).collect();
        let table = Table::new(vec![
            Column::from_strs("customer_id", &ids),
            Column::from_i64("tenure_months", tenure),
            Column::from_f64("monthly_charges", monthly),
            Column::from_f64("total_charges", total),
            Column::from_strs("contract_type", &contract),
            Column::from_strs("payment_method", &payment),
            Column::from_i64("support_tickets", tickets),
            Column::from_i64("logins_30d", logins),
            Column::from_i64("satisfaction_score", satisfaction_score),
            Column::from_i64("days_since_last_login", last_login_days),
            Column::from_f64("churn_probability", probability),
            Column::from_i64("churned", churned),
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
    fn test_churn_rate_is_calibrated() {
        let config = GeneratorConfig::new(5_000).with_param("churn_rate", 0.3);
        let table = ChurnDataGenerator::new(config).unwrap().generate().unwrap();
        let p = table.column("churn_probability").unwrap().numeric_values();
        assert!((stats::mean(&p).unwrap() - 0.3).abs() < 1e-6);
        let churned = table.column("churned").unwrap().numeric_values();
        assert!((stats::mean(&churned).unwrap() - 0.3).abs() < 0.03);
    }

    #[test]
    fn test_unhappy_customers_churn_more() {
        let table = ChurnDataGenerator::new(GeneratorConfig::new(5_000))
            .unwrap()
            .generate()
            .unwrap();
        let stars = table.column("satisfaction_score").unwrap().numeric_values();
        let p = table.column("churn_probability").unwrap().numeric_values();
        let r = stats::pearson(
            &stars.iter().map(|v| Some(*v)).collect::<Vec<_>>(),
            &p.iter().map(|v| Some(*v)).collect::<Vec<_>>(),
        )
        .unwrap();
        assert!(r < -0.2);
    }

    #[test]
    fn test_labels_never_missing() {
        let config = GeneratorConfig::new(200).with_missing_rate(0.2);
        let table = ChurnDataGenerator::new(config).unwrap().generate().unwrap();
        assert_eq!(table.column("churned").unwrap().null_count(), 0);
        assert_eq!(table.column("customer_id").unwrap().null_count(), 0);
        assert_eq!(table.column("tenure_months").unwrap().null_count(), 40);
    }

    #[test]
    fn test_invalid_churn_rate() {
        let config = GeneratorConfig::new(10).with_param("churn_rate", 0.0);
        assert!(ChurnDataGenerator::new(config).is_err());
    }
}
