//! Severity-graded validation of tables.
//!
//! Atomic [`ValidationRule`]s each produce one [`ValidationResult`]; a
//! [`RuleSet`] aggregates them and reduces to a single validity flag where
//! only ERROR-severity failures block. [`SchemaValidator`],
//! [`QualityValidator`] and [`StatisticalValidator`] compose rules for
//! whole-table checks.
//!
//! Validation failures are data, never errors. [`crate::error::ValidationError`]
//! is reserved for malformed rule definitions.

pub mod quality_validator;
pub mod result;
pub mod rules;
pub mod ruleset;
pub mod schema_validator;
pub mod statistical_validator;

pub use quality_validator::{Bounds, QualityValidator};
pub use result::{Severity, ValidationReport, ValidationResult, MAX_FAILED_INDICES};
pub use rules::{
    CustomRule, ExpectedType, NullRatioRule, RangeRule, RegexMode, RegexRule, RequiredRule,
    TypeRule, UniqueRule, ValidationRule,
};
pub use ruleset::RuleSet;
pub use schema_validator::{ColumnSchema, SchemaValidator};
pub use statistical_validator::{drift_z, ReferenceStats, StatisticalValidator, ZERO_VARIANCE_Z};
