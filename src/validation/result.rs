//! Validation outcomes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of failing row indices kept on a single result.
pub const MAX_FAILED_INDICES: usize = 100;

/// Severity of a validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Blocking: an ERROR failure makes the data invalid.
    Error,
    /// Advisory only.
    Warning,
    /// Descriptive only.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Outcome of evaluating one rule against a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub rule_name: String,
    pub column: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub failed_count: usize,
    pub total_count: usize,
    /// First [`MAX_FAILED_INDICES`] failing rows, when the rule is row-based.
    pub failed_indices: Option<Vec<usize>>,
    pub details: Option<BTreeMap<String, serde_json::Value>>,
}

impl ValidationResult {
    /// A passing result.
    pub fn pass(
        rule_name: impl Into<String>,
        column: Option<&str>,
        severity: Severity,
        message: impl Into<String>,
        total_count: usize,
    ) -> Self {
        Self {
            is_valid: true,
            rule_name: rule_name.into(),
            column: column.map(str::to_string),
            message: message.into(),
            severity,
            failed_count: 0,
            total_count,
            failed_indices: None,
            details: None,
        }
    }

    /// A failing result.
    pub fn fail(
        rule_name: impl Into<String>,
        column: Option<&str>,
        severity: Severity,
        message: impl Into<String>,
        failed_count: usize,
        total_count: usize,
    ) -> Self {
        Self {
            is_valid: false,
            failed_count,
            ..Self::pass(rule_name, column, severity, message, total_count)
        }
    }

    /// Attaches failing row indices, keeping at most [`MAX_FAILED_INDICES`].
    pub fn with_failed_indices(mut self, mut indices: Vec<usize>) -> Self {
        if !indices.is_empty() {
            indices.truncate(MAX_FAILED_INDICES);
            self.failed_indices = Some(indices);
        }
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    /// Failed fraction of the evaluated items.
    pub fn failure_rate(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.failed_count as f64 / self.total_count as f64
        }
    }

    /// True for a failed ERROR-severity result.
    pub fn is_blocking(&self) -> bool {
        !self.is_valid && self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_valid { "PASS" } else { "FAIL" };
        match &self.column {
            Some(col) => write!(
                f,
                "[{}] {} {}({}): {}",
                self.severity, status, self.rule_name, col, self.message
            ),
            None => write!(
                f,
                "[{}] {} {}: {}",
                self.severity, status, self.rule_name, self.message
            ),
        }
    }
}

/// Summary of a set of validation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
    pub passed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl ValidationReport {
    pub fn new(results: Vec<ValidationResult>) -> Self {
        let count = |sev: Severity| {
            results
                .iter()
                .filter(|r| !r.is_valid && r.severity == sev)
                .count()
        };
        Self {
            passed: results.iter().filter(|r| r.is_valid).count(),
            errors: count(Severity::Error),
            warnings: count(Severity::Warning),
            infos: count(Severity::Info),
            results,
        }
    }

    /// Only ERROR-severity failures make a report invalid.
    pub fn is_valid(&self) -> bool {
        self.errors == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.is_valid)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_blocking())
    }

    /// One line per failure, for logs and pipeline metrics.
    pub fn failure_messages(&self) -> Vec<String> {
        self.failures().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_indices_capped() {
        let result = ValidationResult::fail("range", Some("x"), Severity::Error, "bad", 500, 1000)
            .with_failed_indices((0..500).collect());
        assert_eq!(result.failed_indices.unwrap().len(), MAX_FAILED_INDICES);
    }

    #[test]
    fn test_report_counts_by_severity() {
        let report = ValidationReport::new(vec![
            ValidationResult::pass("a", None, Severity::Error, "ok", 1),
            ValidationResult::fail("b", None, Severity::Warning, "meh", 1, 1),
            ValidationResult::fail("c", None, Severity::Info, "fyi", 1, 1),
        ]);
        assert_eq!(report.passed, 1);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.infos, 1);
        assert!(report.is_valid());
        assert_eq!(report.failure_messages().len(), 2);
    }

    #[test]
    fn test_display() {
        let result = ValidationResult::fail("required", Some("budget"), Severity::Error, "missing", 1, 1);
        assert_eq!(
            result.to_string(),
            "[ERROR] FAIL required(budget): missing"
        );
    }
}
