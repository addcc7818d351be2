//! Error types for trainset-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Table construction and column access
//! - Connector I/O at the source/sink boundary
//! - Transform fitting, application and persistence
//! - Validation rule construction
//! - Synthetic data generation
//! - Pipeline execution
//!
//! Validation *failures* are never errors: they are reported as
//! [`crate::validation::ValidationResult`] values. The variants here only cover
//! misuse (bad rule definitions, unfitted transforms, invalid parameters) and I/O.

use thiserror::Error;

/// Errors that can occur while building or manipulating a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot concatenate tables with different schemas: {0}")]
    SchemaMismatch(String),

    #[error("Row index {index} out of bounds for table with {rows} rows")]
    RowOutOfBounds { index: usize, rows: usize },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a connector while talking to its backing store.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Source '{0}' not found")]
    SourceNotFound(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Invalid filter '{key}': {reason}")]
    InvalidFilter { key: String, reason: String },

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Errors that can occur while fitting, applying or restoring transforms.
#[derive(Debug, Error)]
pub enum TransformError {
    /// `transform` or `inverse_transform` called before `fit`.
    #[error("Transform '{0}' has not been fitted")]
    NotFitted(String),

    #[error("Transform '{0}' does not support inverse_transform")]
    NotInvertible(String),

    #[error("Column '{column}' required by transform '{transform}' is missing")]
    MissingColumn { transform: String, column: String },

    #[error("Column '{column}' has unsupported type {dtype} for transform '{transform}'")]
    UnsupportedType {
        transform: String,
        column: String,
        dtype: String,
    },

    #[error("Invalid parameter for transform '{transform}': {reason}")]
    InvalidParameter { transform: String, reason: String },

    #[error("Unknown transform kind '{0}'")]
    UnknownKind(String),

    #[error("Step {index} ('{name}') failed: {source}")]
    StepFailed {
        index: usize,
        name: String,
        #[source]
        source: Box<TransformError>,
    },

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while defining validation rules.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("Invalid threshold {value} for '{name}': must be between 0.0 and 1.0")]
    InvalidThreshold { name: String, value: f64 },

    #[error("No reference statistics captured; call fit_reference first")]
    MissingReference,
}

/// Errors that can occur during synthetic data generation.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Correlation matrix is not usable: {0}")]
    InvalidCorrelation(String),

    #[error("Unknown generator: {0}")]
    UnknownGenerator(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can end a pipeline run in the FAILED state.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extract(#[from] ConnectorError),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Data validation failed: {0}")]
    ValidationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::pipeline::config::ConfigError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}
