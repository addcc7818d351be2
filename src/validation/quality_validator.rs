//! Dataset-level quality checks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::result::{Severity, ValidationReport, ValidationResult};
use super::rules::{NullRatioRule, RangeRule, UniqueRule, ValidationRule};
use crate::error::ValidationError;
use crate::table::Table;

/// Inclusive numeric bounds for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Quality thresholds applied to a whole table.
///
/// Null ceilings, uniqueness, ranges and domains report as ERROR; the
/// duplicate-row ceiling reports as WARNING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityValidator {
    /// Per-column null-ratio ceiling, applied to every column.
    pub max_null_ratio: f64,
    /// Ceiling on the fraction of fully duplicated rows.
    pub max_duplicate_ratio: f64,
    #[serde(default)]
    pub unique_columns: Vec<String>,
    #[serde(default)]
    pub ranges: BTreeMap<String, Bounds>,
    /// Allowed category labels per column.
    #[serde(default)]
    pub domains: BTreeMap<String, BTreeSet<String>>,
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self {
            max_null_ratio: 0.5,
            max_duplicate_ratio: 0.1,
            unique_columns: Vec::new(),
            ranges: BTreeMap::new(),
            domains: BTreeMap::new(),
        }
    }
}

impl QualityValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_null_ratio(mut self, ratio: f64) -> Self {
        self.max_null_ratio = ratio;
        self
    }

    pub fn with_max_duplicate_ratio(mut self, ratio: f64) -> Self {
        self.max_duplicate_ratio = ratio;
        self
    }

    pub fn with_unique(mut self, column: impl Into<String>) -> Self {
        self.unique_columns.push(column.into());
        self
    }

    pub fn with_range(mut self, column: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        self.ranges.insert(column.into(), Bounds { min, max });
        self
    }

    pub fn with_domain<I, S>(mut self, column: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains
            .insert(column.into(), allowed.into_iter().map(Into::into).collect());
        self
    }

    /// Checks that thresholds are ratios and ranges are ordered.
    pub fn validate_config(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("max_null_ratio", self.max_null_ratio),
            ("max_duplicate_ratio", self.max_duplicate_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::InvalidThreshold {
                    name: name.to_string(),
                    value,
                });
            }
        }
        for bounds in self.ranges.values() {
            if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
                if min > max {
                    return Err(ValidationError::InvalidRange { min, max });
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self, table: &Table) -> Result<Vec<ValidationResult>, ValidationError> {
        self.validate_config()?;
        let mut results = Vec::new();

        for name in table.column_names() {
            results.push(NullRatioRule::new(&name, self.max_null_ratio)?.validate(table));
        }

        results.push(self.check_duplicates(table));

        for column in &self.unique_columns {
            results.push(UniqueRule::new(column).validate(table));
        }
        for (column, bounds) in &self.ranges {
            results.push(RangeRule::new(column, bounds.min, bounds.max)?.validate(table));
        }
        for (column, allowed) in &self.domains {
            results.push(check_domain(table, column, allowed));
        }

        Ok(results)
    }

    pub fn report(&self, table: &Table) -> Result<ValidationReport, ValidationError> {
        Ok(ValidationReport::new(self.validate(table)?))
    }

    fn check_duplicates(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let duplicates = table.duplicate_row_count();
        let ratio = if rows == 0 {
            0.0
        } else {
            duplicates as f64 / rows as f64
        };
        let result = if ratio <= self.max_duplicate_ratio {
            ValidationResult::pass(
                "duplicate_rows",
                None,
                Severity::Warning,
                format!("Duplicate row ratio {:.4}", ratio),
                rows,
            )
        } else {
            ValidationResult::fail(
                "duplicate_rows",
                None,
                Severity::Warning,
                format!(
                    "Duplicate row ratio {:.4} exceeds {:.4}",
                    ratio, self.max_duplicate_ratio
                ),
                duplicates,
                rows,
            )
        };
        result.with_detail("duplicate_ratio", json!(ratio))
    }
}

fn check_domain(table: &Table, column: &str, allowed: &BTreeSet<String>) -> ValidationResult {
    let rows = table.n_rows();
    let Some(col) = table.column(column) else {
        return ValidationResult::fail(
            "allowed_values",
            Some(column),
            Severity::Error,
            format!("Column '{}' not found", column),
            rows,
            rows,
        );
    };
    let strings = col.to_strings();
    let mut unexpected = BTreeSet::new();
    let failed: Vec<usize> = strings
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s {
            Some(s) if !allowed.contains(s) => {
                unexpected.insert(s.clone());
                Some(i)
            }
            _ => None,
        })
        .collect();
    let checked = strings.iter().filter(|s| s.is_some()).count();

    if failed.is_empty() {
        ValidationResult::pass(
            "allowed_values",
            Some(column),
            Severity::Error,
            format!("All values in '{}' are allowed", column),
            checked,
        )
    } else {
        ValidationResult::fail(
            "allowed_values",
            Some(column),
            Severity::Error,
            format!("{} values in '{}' outside the allowed set", failed.len(), column),
            failed.len(),
            checked,
        )
        .with_detail("unexpected", json!(unexpected))
        .with_failed_indices(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn table() -> Table {
        Table::new(vec![
            Column::from_i64("id", vec![1, 2, 2, 4]),
            Column::from_strs("channel", &["tv", "tv", "tv", "radio"]),
            Column::float("spend", vec![Some(5.0), Some(5.0), Some(5.0), None]),
        ])
        .unwrap()
    }

    #[test]
    fn test_default_thresholds() {
        let report = QualityValidator::new().report(&table()).unwrap();
        // rows 1 and 2 are identical: 25% duplicates
        let dup = report
            .results
            .iter()
            .find(|r| r.rule_name == "duplicate_rows")
            .unwrap();
        assert!(!dup.is_valid);
        assert_eq!(dup.severity, Severity::Warning);
        assert!(report.is_valid());
    }

    #[test]
    fn test_unique_range_and_domain() {
        let validator = QualityValidator::new()
            .with_unique("id")
            .with_range("spend", Some(0.0), Some(4.0))
            .with_domain("channel", ["tv", "search"]);
        let report = validator.report(&table()).unwrap();
        assert_eq!(report.errors, 3);

        let domain = report
            .results
            .iter()
            .find(|r| r.rule_name == "allowed_values")
            .unwrap();
        assert_eq!(domain.failed_indices, Some(vec![3]));
    }

    #[test]
    fn test_null_ceiling() {
        let report = QualityValidator::new()
            .with_max_null_ratio(0.1)
            .with_max_duplicate_ratio(1.0)
            .report(&table())
            .unwrap();
        assert_eq!(report.errors, 1);
    }

    #[test]
    fn test_invalid_config() {
        let validator = QualityValidator::new().with_max_null_ratio(2.0);
        assert!(validator.validate(&table()).is_err());
        let validator = QualityValidator::new().with_range("spend", Some(3.0), Some(1.0));
        assert!(matches!(
            validator.validate_config(),
            Err(ValidationError::InvalidRange { .. })
        ));
    }
}
