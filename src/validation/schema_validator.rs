//! Whole-schema validation for tables.
//!
//! A schema lists the expected columns with their type family, whether they
//! must be present and whether nulls are allowed. Unexpected columns can be
//! tolerated or rejected.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::result::{Severity, ValidationReport, ValidationResult};
use super::ruleset::RuleSet;
use super::rules::{ExpectedType, NullRatioRule, RequiredRule, TypeRule, ValidationRule};
use crate::table::{DataType, Table};

fn default_true() -> bool {
    true
}

/// Expected shape of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(default, rename = "type")]
    pub dtype: Option<ExpectedType>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Accept values that convert cleanly to `dtype`.
    #[serde(default)]
    pub coerce: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, dtype: ExpectedType) -> Self {
        Self {
            name: name.into(),
            dtype: Some(dtype),
            required: true,
            nullable: true,
            coerce: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_coerce(mut self) -> Self {
        self.coerce = true;
        self
    }
}

/// Validator for table schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaValidator {
    pub columns: Vec<ColumnSchema>,
    /// Whether columns not listed in the schema are tolerated.
    #[serde(default = "default_true")]
    pub allow_extra: bool,
}

impl SchemaValidator {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self {
            columns,
            allow_extra: true,
        }
    }

    pub fn with_allow_extra(mut self, allow_extra: bool) -> Self {
        self.allow_extra = allow_extra;
        self
    }

    /// Derives a schema from an existing table: every column required, typed
    /// by its stored family, nullable only if it currently holds nulls.
    pub fn infer(table: &Table) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|col| ColumnSchema {
                name: col.name.clone(),
                dtype: Some(match col.dtype() {
                    DataType::Float => ExpectedType::Float,
                    DataType::Int => ExpectedType::Integer,
                    DataType::Bool => ExpectedType::Bool,
                    DataType::Str => ExpectedType::Str,
                    DataType::DateTime => ExpectedType::DateTime,
                }),
                required: true,
                nullable: col.null_count() > 0,
                coerce: false,
            })
            .collect();
        Self {
            columns,
            allow_extra: false,
        }
    }

    /// Validate a table against the schema.
    ///
    /// Performs, per schema column:
    /// - presence (required columns only; absent optional columns are skipped)
    /// - type family, optionally with coercion
    /// - null prohibition for non-nullable columns
    ///
    /// and, when `allow_extra` is off, one check for unexpected columns.
    pub fn validate(&self, table: &Table) -> Vec<ValidationResult> {
        let mut results = Vec::new();

        for entry in &self.columns {
            if !table.has_column(&entry.name) {
                if entry.required {
                    results.push(RequiredRule::new(&entry.name).validate(table));
                }
                continue;
            }
            if let Some(expected) = entry.dtype {
                results.push(
                    TypeRule::new(&entry.name, expected)
                        .with_coerce(entry.coerce)
                        .validate(table),
                );
            }
            if !entry.nullable {
                results.push(NullRatioRule::forbid_nulls(&entry.name).validate(table));
            }
        }

        if !self.allow_extra {
            let extra: Vec<String> = table
                .column_names()
                .into_iter()
                .filter(|name| !self.columns.iter().any(|c| &c.name == name))
                .collect();
            let total = table.n_cols();
            results.push(if extra.is_empty() {
                ValidationResult::pass(
                    "extra_columns",
                    None,
                    Severity::Error,
                    "No unexpected columns",
                    total,
                )
            } else {
                ValidationResult::fail(
                    "extra_columns",
                    None,
                    Severity::Error,
                    format!("Unexpected columns: {}", extra.join(", ")),
                    extra.len(),
                    total,
                )
                .with_detail("columns", json!(extra))
            });
        }

        results
    }

    pub fn report(&self, table: &Table) -> ValidationReport {
        ValidationReport::new(self.validate(table))
    }

    /// Per-column checks as a [`RuleSet`] for the pipeline's validate stage.
    ///
    /// Optional columns and the extra-column check have no rule equivalent and
    /// are left out.
    pub fn to_rule_set(&self, name: &str) -> RuleSet {
        let mut rules = RuleSet::new(name);
        for entry in self.columns.iter().filter(|c| c.required) {
            rules.push(Box::new(RequiredRule::new(&entry.name)));
            if let Some(expected) = entry.dtype {
                rules.push(Box::new(
                    TypeRule::new(&entry.name, expected).with_coerce(entry.coerce),
                ));
            }
            if !entry.nullable {
                rules.push(Box::new(NullRatioRule::forbid_nulls(&entry.name)));
            }
        }
        rules
    }

    pub fn is_valid(&self, table: &Table) -> bool {
        self.validate(table).iter().all(|r| !r.is_blocking())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn create_valid_table() -> Table {
        Table::new(vec![
            Column::from_i64("user_id", vec![1, 2, 3]),
            Column::float("spend", vec![Some(1.0), None, Some(3.0)]),
            Column::from_strs("segment", &["a", "b", "a"]),
        ])
        .unwrap()
    }

    fn schema() -> SchemaValidator {
        SchemaValidator::new(vec![
            ColumnSchema::new("user_id", ExpectedType::Integer).not_null(),
            ColumnSchema::new("spend", ExpectedType::Numeric),
            ColumnSchema::new("segment", ExpectedType::Str),
        ])
    }

    #[test]
    fn test_validate_valid_table() {
        let results = schema().validate(&create_valid_table());
        assert!(
            results.iter().all(|r| r.is_valid),
            "Valid table should pass validation: {:?}",
            results
        );
    }

    #[test]
    fn test_missing_required_column() {
        let mut table = create_valid_table();
        table.drop_column("segment");
        let results = schema().validate(&table);
        assert!(results
            .iter()
            .any(|r| !r.is_valid && r.column.as_deref() == Some("segment")));
    }

    #[test]
    fn test_missing_optional_column_is_skipped() {
        let mut table = create_valid_table();
        table.drop_column("segment");
        let mut validator = schema();
        validator.columns[2] = ColumnSchema::new("segment", ExpectedType::Str).optional();
        assert!(validator.is_valid(&table));
    }

    #[test]
    fn test_extra_columns_toggle() {
        let table = create_valid_table()
            .with_column(Column::from_bools("flag", vec![true, false, true]))
            .unwrap();
        assert!(schema().is_valid(&table));
        let strict = schema().with_allow_extra(false);
        let report = strict.report(&table);
        assert!(!report.is_valid());
        assert!(report.results.iter().any(|r| r.rule_name == "extra_columns"));
    }

    #[test]
    fn test_wrong_type_and_nulls() {
        let table = Table::new(vec![
            Column::int("user_id", vec![Some(1), None, Some(3)]),
            Column::from_strs("spend", &["1", "2", "3"]),
            Column::from_strs("segment", &["a", "b", "a"]),
        ])
        .unwrap();
        let report = schema().report(&table);
        assert_eq!(report.errors, 2);
    }

    #[test]
    fn test_infer_round_trips_through_yaml() {
        let inferred = SchemaValidator::infer(&create_valid_table());
        assert!(inferred.is_valid(&create_valid_table()));
        let yaml = serde_yaml::to_string(&inferred).unwrap();
        let parsed: SchemaValidator = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, inferred);
    }

    #[test]
    fn test_rule_set_blocks_like_schema() {
        let rules = schema().to_rule_set("schema");
        assert_eq!(rules.len(), 7);
        assert!(rules.is_valid(&create_valid_table()));

        let mut table = create_valid_table();
        table.drop_column("user_id");
        assert!(!rules.is_valid(&table));
    }
}
