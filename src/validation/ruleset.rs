//! Ordered collections of rules.

use tracing::debug;

use super::result::{Severity, ValidationReport, ValidationResult};
use super::rules::{
    CustomRule, ExpectedType, NullRatioRule, RangeRule, RegexMode, RegexRule, RequiredRule,
    TypeRule, UniqueRule, ValidationRule,
};
use crate::error::ValidationError;
use crate::table::Table;

/// An ordered set of rules evaluated together.
///
/// # Example
///
/// ```rust,ignore
/// use trainset_forge::validation::{RuleSet, Severity};
///
/// let rules = RuleSet::new("campaign")
///     .add_required("budget", Severity::Error)
///     .add_range("budget", Some(0.0), None, Severity::Error)?;
/// let results = rules.validate(&table);
/// assert!(rules.is_valid(&table));
/// ```
#[derive(Default)]
pub struct RuleSet {
    name: String,
    rules: Vec<Box<dyn ValidationRule>>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("rules", &names)
            .finish()
    }
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn add_rule(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Appends an already boxed rule, for callers assembling rules dynamically.
    pub fn push(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn add_required(self, column: &str, severity: Severity) -> Self {
        self.add_rule(RequiredRule::new(column).with_severity(severity))
    }

    pub fn add_type(
        self,
        column: &str,
        expected: ExpectedType,
        coerce: bool,
        severity: Severity,
    ) -> Self {
        self.add_rule(
            TypeRule::new(column, expected)
                .with_coerce(coerce)
                .with_severity(severity),
        )
    }

    pub fn add_range(
        self,
        column: &str,
        min: Option<f64>,
        max: Option<f64>,
        severity: Severity,
    ) -> Result<Self, ValidationError> {
        let rule = RangeRule::new(column, min, max)?.with_severity(severity);
        Ok(self.add_rule(rule))
    }

    pub fn add_regex(
        self,
        column: &str,
        pattern: &str,
        mode: RegexMode,
        severity: Severity,
    ) -> Result<Self, ValidationError> {
        let rule = RegexRule::new(column, pattern, mode)?.with_severity(severity);
        Ok(self.add_rule(rule))
    }

    pub fn add_unique(self, column: &str, case_insensitive: bool, severity: Severity) -> Self {
        self.add_rule(
            UniqueRule::new(column)
                .case_insensitive(case_insensitive)
                .with_severity(severity),
        )
    }

    pub fn add_null_ratio(
        self,
        column: &str,
        max_ratio: f64,
        severity: Severity,
    ) -> Result<Self, ValidationError> {
        let rule = NullRatioRule::new(column, max_ratio)?.with_severity(severity);
        Ok(self.add_rule(rule))
    }

    pub fn add_not_null(self, column: &str, severity: Severity) -> Self {
        self.add_rule(NullRatioRule::forbid_nulls(column).with_severity(severity))
    }

    pub fn add_custom<F>(self, name: &str, message: &str, severity: Severity, predicate: F) -> Self
    where
        F: Fn(&Table) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.add_rule(CustomRule::new(name, message, predicate).with_severity(severity))
    }

    /// Evaluates every rule, one result per rule in insertion order.
    pub fn validate(&self, table: &Table) -> Vec<ValidationResult> {
        let results: Vec<ValidationResult> =
            self.rules.iter().map(|rule| rule.validate(table)).collect();
        debug!(
            ruleset = %self.name,
            rules = results.len(),
            failed = results.iter().filter(|r| !r.is_valid).count(),
            "Rule set evaluated"
        );
        results
    }

    pub fn report(&self, table: &Table) -> ValidationReport {
        ValidationReport::new(self.validate(table))
    }

    /// True unless some ERROR-severity rule fails.
    pub fn is_valid(&self, table: &Table) -> bool {
        self.validate(table).iter().all(|r| !r.is_blocking())
    }
}
