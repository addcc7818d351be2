//! trainset-forge: data preparation and synthetic training-data generation.
//!
//! This library provides a tabular core, a connector boundary for sources and
//! sinks, a pipeline executor (extract, validate, transform), fit/apply/invert
//! feature transforms, severity-graded validation, dataset profiling with
//! drift comparison, and seeded synthetic data generators.

// Core modules
pub mod cli;
pub mod connector;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod profiler;
pub mod table;
pub mod transform;
pub mod validation;

// Re-export commonly used types
pub use error::{
    ConnectorError, GeneratorError, PipelineError, TableError, TransformError, ValidationError,
};
pub use generator::{GeneratorConfig, GeneratorKind, SyntheticGenerator};
pub use pipeline::{Pipeline, PipelineConfig, PipelineResult, PipelineStatus};
pub use profiler::{compare_profiles, DataProfile, DataProfiler, DriftReport};
pub use table::{Column, ColumnData, DataType, Table, Value};
pub use transform::{Transform, TransformPipeline};
pub use validation::{RuleSet, Severity, ValidationReport, ValidationResult};
