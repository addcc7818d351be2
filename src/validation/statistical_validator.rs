//! Distribution checks: IQR outlier rates and mean drift against a reference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::result::{Severity, ValidationResult};
use crate::error::ValidationError;
use crate::table::{stats, Table};

/// Mean and spread of one column captured from reference data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStats {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

/// Statistical validator over numeric columns.
///
/// Results are WARNING severity: distribution shifts are advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalValidator {
    /// Fence multiplier applied to the interquartile range.
    pub iqr_multiplier: f64,
    /// Highest tolerated fraction of values outside the fences.
    pub max_outlier_ratio: f64,
    /// Mean shifts beyond this many reference standard deviations are flagged.
    pub drift_z_threshold: f64,
    #[serde(default)]
    reference: Option<BTreeMap<String, ReferenceStats>>,
}

impl Default for StatisticalValidator {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            max_outlier_ratio: 0.05,
            drift_z_threshold: 2.0,
            reference: None,
        }
    }
}

impl StatisticalValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = multiplier;
        self
    }

    pub fn with_max_outlier_ratio(mut self, ratio: f64) -> Self {
        self.max_outlier_ratio = ratio;
        self
    }

    pub fn with_drift_threshold(mut self, z: f64) -> Self {
        self.drift_z_threshold = z;
        self
    }

    /// Captures per-column mean/std of the numeric columns of `table`.
    pub fn fit_reference(&mut self, table: &Table) -> &mut Self {
        let mut reference = BTreeMap::new();
        for col in table.columns().iter().filter(|c| c.is_numeric()) {
            let values = col.numeric_values();
            if let (Some(mean), Some(std)) = (stats::mean(&values), stats::std_dev(&values)) {
                reference.insert(
                    col.name.clone(),
                    ReferenceStats {
                        mean,
                        std,
                        count: values.len(),
                    },
                );
            }
        }
        debug!(columns = reference.len(), "Captured reference statistics");
        self.reference = Some(reference);
        self
    }

    pub fn reference(&self) -> Option<&BTreeMap<String, ReferenceStats>> {
        self.reference.as_ref()
    }

    /// One result per numeric column: fraction of values outside
    /// `[Q1 - m*IQR, Q3 + m*IQR]`.
    pub fn check_outliers(&self, table: &Table) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        for col in table.columns().iter().filter(|c| c.is_numeric()) {
            let Some(values) = col.to_f64() else {
                continue;
            };
            let present: Vec<f64> = values.iter().flatten().copied().collect();
            let sorted = stats::sorted(&present);
            let (Some(q1), Some(q3)) = (
                stats::quantile_sorted(&sorted, 0.25),
                stats::quantile_sorted(&sorted, 0.75),
            ) else {
                continue;
            };
            let iqr = q3 - q1;
            let lower = q1 - self.iqr_multiplier * iqr;
            let upper = q3 + self.iqr_multiplier * iqr;

            let outliers: Vec<usize> = values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| match v {
                    Some(x) if *x < lower || *x > upper => Some(i),
                    _ => None,
                })
                .collect();
            let ratio = outliers.len() as f64 / sorted.len() as f64;
            let name = col.name.as_str();

            let result = if ratio <= self.max_outlier_ratio {
                ValidationResult::pass(
                    "outliers",
                    Some(name),
                    Severity::Warning,
                    format!("Outlier ratio {:.4} in '{}'", ratio, name),
                    sorted.len(),
                )
            } else {
                ValidationResult::fail(
                    "outliers",
                    Some(name),
                    Severity::Warning,
                    format!(
                        "Outlier ratio {:.4} in '{}' exceeds {:.4}",
                        ratio, name, self.max_outlier_ratio
                    ),
                    outliers.len(),
                    sorted.len(),
                )
                .with_failed_indices(outliers)
            };
            results.push(
                result
                    .with_detail("lower_fence", json!(lower))
                    .with_detail("upper_fence", json!(upper)),
            );
        }
        results
    }

    /// One result per reference column present in `table`, flagging mean
    /// shifts whose z-score against the reference std exceeds the threshold.
    pub fn check_drift(&self, table: &Table) -> Result<Vec<ValidationResult>, ValidationError> {
        let reference = self
            .reference
            .as_ref()
            .ok_or(ValidationError::MissingReference)?;
        let mut results = Vec::new();
        for (name, reference) in reference {
            let Some(col) = table.column(name) else {
                continue;
            };
            let values = col.numeric_values();
            let Some(mean) = stats::mean(&values) else {
                continue;
            };
            let z = drift_z(reference.mean, reference.std, mean);
            let result = if z <= self.drift_z_threshold {
                ValidationResult::pass(
                    "mean_drift",
                    Some(name),
                    Severity::Warning,
                    format!("Mean of '{}' within {:.2} reference std", name, z),
                    values.len(),
                )
            } else {
                ValidationResult::fail(
                    "mean_drift",
                    Some(name),
                    Severity::Warning,
                    format!(
                        "Mean of '{}' shifted {:.2} reference std ({:.4} -> {:.4})",
                        name, z, reference.mean, mean
                    ),
                    values.len(),
                    values.len(),
                )
            };
            results.push(
                result
                    .with_detail("z_score", json!(z))
                    .with_detail("zero_variance", json!(!(reference.std > 0.0)))
                    .with_detail("reference_mean", json!(reference.mean))
                    .with_detail("current_mean", json!(mean)),
            );
        }
        Ok(results)
    }

    /// Outlier checks plus drift checks when a reference has been captured.
    pub fn validate(&self, table: &Table) -> Vec<ValidationResult> {
        let mut results = self.check_outliers(table);
        if let Ok(drift) = self.check_drift(table) {
            results.extend(drift);
        }
        results
    }
}

/// z-score reported when the reference has zero variance and the mean moved.
/// Finite so that reports stay representable in JSON.
pub const ZERO_VARIANCE_Z: f64 = f64::MAX;

/// `|current - mean| / std`; a zero std yields 0 for no shift and
/// [`ZERO_VARIANCE_Z`] otherwise.
pub fn drift_z(reference_mean: f64, reference_std: f64, current_mean: f64) -> f64 {
    let shift = (current_mean - reference_mean).abs();
    if reference_std > 0.0 {
        shift / reference_std
    } else if shift == 0.0 {
        0.0
    } else {
        ZERO_VARIANCE_Z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn test_outlier_rate() {
        let mut values: Vec<f64> = (0..20).map(|i| i as f64).collect();
        values.push(1000.0);
        let table = Table::new(vec![Column::from_f64("spend", values)]).unwrap();

        let results = StatisticalValidator::new().check_outliers(&table);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].failed_count, 0);
        assert!(results[0].is_valid);

        let strict = StatisticalValidator::new().with_max_outlier_ratio(0.01);
        let results = strict.check_outliers(&table);
        assert!(!results[0].is_valid);
        assert_eq!(results[0].failed_indices, Some(vec![20]));
    }

    #[test]
    fn test_drift_requires_reference() {
        let table = Table::new(vec![Column::from_f64("x", vec![1.0, 2.0])]).unwrap();
        assert!(matches!(
            StatisticalValidator::new().check_drift(&table),
            Err(ValidationError::MissingReference)
        ));
    }

    #[test]
    fn test_mean_drift_flagged() {
        let reference = Table::new(vec![Column::from_f64(
            "x",
            vec![90.0, 110.0, 90.0, 110.0],
        )])
        .unwrap();
        let mut validator = StatisticalValidator::new();
        validator.fit_reference(&reference);
        let std = validator.reference().unwrap()["x"].std;

        let shifted = Table::new(vec![Column::from_f64("x", vec![100.0 + 3.0 * std])]).unwrap();
        let results = validator.check_drift(&shifted).unwrap();
        assert!(!results[0].is_valid);
        let z = results[0].details.as_ref().unwrap()["z_score"].as_f64().unwrap();
        assert!((z - 3.0).abs() < 1e-9);

        let same = Table::new(vec![Column::from_f64("x", vec![101.0])]).unwrap();
        assert!(validator.check_drift(&same).unwrap()[0].is_valid);
    }

    #[test]
    fn test_drift_z_zero_std() {
        assert_eq!(drift_z(5.0, 0.0, 5.0), 0.0);
        assert_eq!(drift_z(5.0, 0.0, 6.0), ZERO_VARIANCE_Z);
        assert!(drift_z(5.0, 0.0, 6.0).is_finite());
        assert!((drift_z(100.0, 10.0, 130.0) - 3.0).abs() < 1e-12);
    }
}
