//! Atomic validation rules.
//!
//! Each rule inspects a whole table and reports exactly one
//! [`ValidationResult`]. Rules never mutate the table and never return errors
//! at validate time: bad definitions are rejected by the constructors, and
//! anything that goes wrong while evaluating becomes a failed result.

use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::result::{Severity, ValidationResult};
use crate::error::ValidationError;
use crate::table::{Column, DataType, Table, Value, DATETIME_FORMAT};

/// A single check over a table.
pub trait ValidationRule: Send + Sync {
    /// Rule name reported on results.
    fn name(&self) -> &str;

    /// Column the rule inspects, if any.
    fn column(&self) -> Option<&str> {
        None
    }

    fn severity(&self) -> Severity;

    fn validate(&self, table: &Table) -> ValidationResult;
}

fn missing_column(rule: &str, column: &str, severity: Severity, rows: usize) -> ValidationResult {
    ValidationResult::fail(
        rule,
        Some(column),
        severity,
        format!("Column '{}' not found", column),
        rows,
        rows,
    )
}

fn check_ratio(name: &str, value: f64) -> Result<f64, ValidationError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(ValidationError::InvalidThreshold {
            name: name.to_string(),
            value,
        });
    }
    Ok(value)
}

/// Fails when the column is absent or holds no values at all.
#[derive(Debug, Clone)]
pub struct RequiredRule {
    column: String,
    severity: Severity,
}

impl RequiredRule {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            severity: Severity::Error,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl ValidationRule for RequiredRule {
    fn name(&self) -> &str {
        "required"
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let Some(col) = table.column(&self.column) else {
            return ValidationResult::fail(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("Required column '{}' is missing", self.column),
                rows.max(1),
                rows.max(1),
            );
        };
        if rows > 0 && col.null_count() == rows {
            return ValidationResult::fail(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("Required column '{}' is empty", self.column),
                rows,
                rows,
            );
        }
        ValidationResult::pass(
            self.name(),
            Some(&self.column),
            self.severity,
            format!("Column '{}' is present", self.column),
            rows,
        )
    }
}

/// Type families a [`TypeRule`] can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedType {
    /// Int or Float.
    Numeric,
    Integer,
    Float,
    Bool,
    Str,
    DateTime,
}

impl ExpectedType {
    fn accepts(self, dtype: DataType) -> bool {
        match self {
            ExpectedType::Numeric => dtype.is_numeric(),
            ExpectedType::Integer => dtype == DataType::Int,
            ExpectedType::Float => dtype == DataType::Float,
            ExpectedType::Bool => dtype == DataType::Bool,
            ExpectedType::Str => dtype == DataType::Str,
            ExpectedType::DateTime => dtype == DataType::DateTime,
        }
    }

    /// Whether a single value can be converted to this family.
    fn coerces(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ExpectedType::Str, _) => true,
            (ExpectedType::Numeric | ExpectedType::Float, v) => match v {
                Value::Str(s) => s.trim().parse::<f64>().is_ok(),
                other => other.as_f64().is_some(),
            },
            (ExpectedType::Integer, v) => match v {
                Value::Int(_) | Value::Bool(_) => true,
                Value::Float(f) => f.fract() == 0.0 && f.is_finite(),
                Value::Str(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            (ExpectedType::Bool, v) => match v {
                Value::Bool(_) => true,
                Value::Int(i) => *i == 0 || *i == 1,
                Value::Str(s) => matches!(
                    s.trim().to_ascii_lowercase().as_str(),
                    "true" | "false" | "1" | "0" | "yes" | "no"
                ),
                _ => false,
            },
            (ExpectedType::DateTime, v) => match v {
                Value::DateTime(_) => true,
                Value::Str(s) => {
                    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).is_ok()
                        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                }
                _ => false,
            },
        }
    }
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpectedType::Numeric => "numeric",
            ExpectedType::Integer => "integer",
            ExpectedType::Float => "float",
            ExpectedType::Bool => "bool",
            ExpectedType::Str => "str",
            ExpectedType::DateTime => "datetime",
        };
        write!(f, "{}", s)
    }
}

/// Checks a column's type family; with `coerce`, values that would convert
/// cleanly are accepted regardless of the stored type.
#[derive(Debug, Clone)]
pub struct TypeRule {
    column: String,
    expected: ExpectedType,
    coerce: bool,
    severity: Severity,
}

impl TypeRule {
    pub fn new(column: impl Into<String>, expected: ExpectedType) -> Self {
        Self {
            column: column.into(),
            expected,
            coerce: false,
            severity: Severity::Error,
        }
    }

    pub fn with_coerce(mut self, coerce: bool) -> Self {
        self.coerce = coerce;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl ValidationRule for TypeRule {
    fn name(&self) -> &str {
        "type"
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let Some(col) = table.column(&self.column) else {
            return missing_column(self.name(), &self.column, self.severity, rows);
        };
        let dtype = col.dtype();
        if self.expected.accepts(dtype) {
            return ValidationResult::pass(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("Column '{}' is {}", self.column, self.expected),
                rows,
            );
        }

        let failed: Vec<usize> = if self.coerce {
            (0..rows)
                .filter(|&i| !self.expected.coerces(&col.get(i)))
                .collect()
        } else {
            (0..rows).filter(|&i| !col.is_null(i)).collect()
        };

        if failed.is_empty() {
            return ValidationResult::pass(
                self.name(),
                Some(&self.column),
                self.severity,
                format!(
                    "Column '{}' ({}) coerces to {}",
                    self.column, dtype, self.expected
                ),
                rows,
            );
        }
        ValidationResult::fail(
            self.name(),
            Some(&self.column),
            self.severity,
            format!(
                "Column '{}' has type {}, expected {}",
                self.column, dtype, self.expected
            ),
            failed.len(),
            rows,
        )
        .with_detail("actual_type", json!(dtype.to_string()))
        .with_detail("expected_type", json!(self.expected.to_string()))
        .with_failed_indices(failed)
    }
}

/// Numeric bounds check. Nulls are skipped.
#[derive(Debug, Clone)]
pub struct RangeRule {
    column: String,
    min: Option<f64>,
    max: Option<f64>,
    inclusive: bool,
    severity: Severity,
}

impl RangeRule {
    /// Creates an inclusive range rule. Fails if `min > max`.
    pub fn new(
        column: impl Into<String>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Self, ValidationError> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(ValidationError::InvalidRange { min: lo, max: hi });
            }
        }
        Ok(Self {
            column: column.into(),
            min,
            max,
            inclusive: true,
            severity: Severity::Error,
        })
    }

    /// Switches to strict bounds (`min < x < max`).
    pub fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn in_range(&self, x: f64) -> bool {
        let above = match self.min {
            Some(lo) if self.inclusive => x >= lo,
            Some(lo) => x > lo,
            None => true,
        };
        let below = match self.max {
            Some(hi) if self.inclusive => x <= hi,
            Some(hi) => x < hi,
            None => true,
        };
        above && below
    }
}

impl ValidationRule for RangeRule {
    fn name(&self) -> &str {
        "range"
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let Some(col) = table.column(&self.column) else {
            return missing_column(self.name(), &self.column, self.severity, rows);
        };
        let Some(values) = col.to_f64() else {
            return ValidationResult::fail(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("Column '{}' is not numeric ({})", self.column, col.dtype()),
                rows,
                rows,
            );
        };

        let failed: Vec<usize> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                Some(x) if !self.in_range(*x) => Some(i),
                _ => None,
            })
            .collect();
        let checked = values.iter().filter(|v| v.is_some()).count();
        let bounds = format!(
            "{}{}, {}{}",
            if self.inclusive { "[" } else { "(" },
            self.min.map_or("-inf".to_string(), |v| v.to_string()),
            self.max.map_or("inf".to_string(), |v| v.to_string()),
            if self.inclusive { "]" } else { ")" },
        );

        if failed.is_empty() {
            ValidationResult::pass(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("All values in '{}' within {}", self.column, bounds),
                checked,
            )
        } else {
            ValidationResult::fail(
                self.name(),
                Some(&self.column),
                self.severity,
                format!(
                    "{} values in '{}' outside {}",
                    failed.len(),
                    self.column,
                    bounds
                ),
                failed.len(),
                checked,
            )
            .with_failed_indices(failed)
        }
    }
}

/// How a [`RegexRule`] applies its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexMode {
    /// Anchored at the start of the value.
    #[default]
    Match,
    /// Anywhere in the value.
    Search,
    /// The whole value must match.
    FullMatch,
}

/// Pattern check over the string form of each non-null value.
#[derive(Debug, Clone)]
pub struct RegexRule {
    column: String,
    pattern: String,
    mode: RegexMode,
    regex: Regex,
    severity: Severity,
}

impl RegexRule {
    /// Compiles the pattern; an invalid pattern is rejected here.
    pub fn new(
        column: impl Into<String>,
        pattern: &str,
        mode: RegexMode,
    ) -> Result<Self, ValidationError> {
        let anchored = match mode {
            RegexMode::Match => format!("^(?:{})", pattern),
            RegexMode::Search => pattern.to_string(),
            RegexMode::FullMatch => format!("^(?:{})$", pattern),
        };
        let regex = Regex::new(&anchored).map_err(|e| ValidationError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            column: column.into(),
            pattern: pattern.to_string(),
            mode,
            regex,
            severity: Severity::Error,
        })
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl ValidationRule for RegexRule {
    fn name(&self) -> &str {
        "regex"
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let Some(col) = table.column(&self.column) else {
            return missing_column(self.name(), &self.column, self.severity, rows);
        };
        let strings = col.to_strings();
        let checked = strings.iter().filter(|s| s.is_some()).count();
        let failed: Vec<usize> = strings
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(s) if !self.regex.is_match(s) => Some(i),
                _ => None,
            })
            .collect();

        if failed.is_empty() {
            ValidationResult::pass(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("All values in '{}' match '{}'", self.column, self.pattern),
                checked,
            )
        } else {
            ValidationResult::fail(
                self.name(),
                Some(&self.column),
                self.severity,
                format!(
                    "{} values in '{}' do not match '{}'",
                    failed.len(),
                    self.column,
                    self.pattern
                ),
                failed.len(),
                checked,
            )
            .with_detail("mode", json!(self.mode))
            .with_failed_indices(failed)
        }
    }
}

/// Fails on repeated non-null values; every repeat after the first is counted.
#[derive(Debug, Clone)]
pub struct UniqueRule {
    column: String,
    case_insensitive: bool,
    severity: Severity,
}

impl UniqueRule {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            case_insensitive: false,
            severity: Severity::Error,
        }
    }

    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn normalized(&self, col: &Column, index: usize) -> Option<Value> {
        match col.get(index) {
            Value::Null => None,
            Value::Str(s) if self.case_insensitive => Some(Value::Str(s.to_lowercase())),
            other => Some(other),
        }
    }
}

impl ValidationRule for UniqueRule {
    fn name(&self) -> &str {
        "unique"
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let Some(col) = table.column(&self.column) else {
            return missing_column(self.name(), &self.column, self.severity, rows);
        };
        let mut seen = HashSet::new();
        let mut failed = Vec::new();
        let mut checked = 0;
        for i in 0..rows {
            if let Some(v) = self.normalized(col, i) {
                checked += 1;
                if !seen.insert(v.key()) {
                    failed.push(i);
                }
            }
        }

        if failed.is_empty() {
            ValidationResult::pass(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("All values in '{}' are unique", self.column),
                checked,
            )
        } else {
            ValidationResult::fail(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("{} duplicate values in '{}'", failed.len(), self.column),
                failed.len(),
                checked,
            )
            .with_failed_indices(failed)
        }
    }
}

/// Null-ratio ceiling; with nulls forbidden any null fails regardless of ratio.
#[derive(Debug, Clone)]
pub struct NullRatioRule {
    column: String,
    max_ratio: f64,
    allow_null: bool,
    severity: Severity,
}

impl NullRatioRule {
    pub fn new(column: impl Into<String>, max_ratio: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            column: column.into(),
            max_ratio: check_ratio("max_null_ratio", max_ratio)?,
            allow_null: true,
            severity: Severity::Error,
        })
    }

    /// A rule that fails on any null.
    pub fn forbid_nulls(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            max_ratio: 0.0,
            allow_null: false,
            severity: Severity::Error,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl ValidationRule for NullRatioRule {
    fn name(&self) -> &str {
        "null_ratio"
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let Some(col) = table.column(&self.column) else {
            return missing_column(self.name(), &self.column, self.severity, rows);
        };
        let nulls: Vec<usize> = (0..rows).filter(|&i| col.is_null(i)).collect();
        let ratio = if rows == 0 {
            0.0
        } else {
            nulls.len() as f64 / rows as f64
        };

        let ok = if self.allow_null {
            ratio <= self.max_ratio
        } else {
            nulls.is_empty()
        };
        if ok {
            return ValidationResult::pass(
                self.name(),
                Some(&self.column),
                self.severity,
                format!("Null ratio {:.4} in '{}'", ratio, self.column),
                rows,
            )
            .with_detail("null_ratio", json!(ratio));
        }

        let message = if self.allow_null {
            format!(
                "Null ratio {:.4} in '{}' exceeds {:.4}",
                ratio, self.column, self.max_ratio
            )
        } else {
            format!("Column '{}' has {} nulls, none allowed", self.column, nulls.len())
        };
        ValidationResult::fail(
            self.name(),
            Some(&self.column),
            self.severity,
            message,
            nulls.len(),
            rows,
        )
        .with_detail("null_ratio", json!(ratio))
        .with_failed_indices(nulls)
    }
}

/// Caller-supplied predicate over the table.
pub type Predicate = dyn Fn(&Table) -> Result<bool, String> + Send + Sync;

/// Wraps arbitrary caller code. An `Err` or a panic becomes a failed result.
pub struct CustomRule {
    name: String,
    column: Option<String>,
    message: String,
    predicate: Box<Predicate>,
    severity: Severity,
}

impl CustomRule {
    pub fn new<F>(name: impl Into<String>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Table) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            column: None,
            message: message.into(),
            predicate: Box::new(predicate),
            severity: Severity::Error,
        }
    }

    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

impl ValidationRule for CustomRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn validate(&self, table: &Table) -> ValidationResult {
        let rows = table.n_rows();
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.predicate)(table)));
        let column = self.column.as_deref();
        match outcome {
            Ok(Ok(true)) => {
                ValidationResult::pass(&self.name, column, self.severity, "Check passed", rows)
            }
            Ok(Ok(false)) => ValidationResult::fail(
                &self.name,
                column,
                self.severity,
                self.message.clone(),
                rows,
                rows,
            ),
            Ok(Err(e)) => ValidationResult::fail(
                &self.name,
                column,
                self.severity,
                format!("Check raised an error: {}", e),
                rows,
                rows,
            ),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ValidationResult::fail(
                    &self.name,
                    column,
                    self.severity,
                    format!("Check panicked: {}", reason),
                    rows,
                    rows,
                )
            }
        }
    }
}
