//! Pipeline lifecycle: extract, validate, transform.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::PipelineConfig;
use crate::error::PipelineError;
use crate::table::Table;
use crate::transform::TransformPipeline;
use crate::validation::{RuleSet, ValidationReport};

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Pending => write!(f, "PENDING"),
            PipelineStatus::Running => write!(f, "RUNNING"),
            PipelineStatus::Completed => write!(f, "COMPLETED"),
            PipelineStatus::Failed => write!(f, "FAILED"),
            PipelineStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Counters collected during one `run()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub rows_processed: usize,
    pub rows_validated: usize,
    pub rows_failed: usize,
    pub rows_transformed: usize,
    pub columns_out: usize,
    pub extract_attempts: u32,
    pub elapsed: Duration,
    pub warnings: Vec<String>,
    pub validation_errors: Vec<String>,
}

/// Terminal outcome of one `run()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pipeline_id: Uuid,
    pub config: PipelineConfig,
    pub status: PipelineStatus,
    pub data: Option<Table>,
    pub metrics: PipelineMetrics,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    pub fn row_count(&self) -> usize {
        self.data.as_ref().map_or(0, Table::n_rows)
    }

    /// One-line summary for logs and CLI output.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} [{}] rows={} elapsed={:.3}s warnings={}",
            self.config.name,
            self.status,
            self.row_count(),
            self.metrics.elapsed.as_secs_f64(),
            self.metrics.warnings.len()
        );
        if let Some(message) = &self.error_message {
            line.push_str(&format!(" error={}", message));
        }
        line
    }
}

/// The three stages a pipeline variant provides.
pub trait PipelineStages {
    /// Produces the input table. Any error is fatal to the run.
    fn extract(&mut self, config: &PipelineConfig) -> Result<Table, PipelineError>;

    /// Returns false when the table must not proceed; reasons go to `metrics`.
    fn validate(&mut self, _table: &Table, _metrics: &mut PipelineMetrics) -> bool {
        true
    }

    fn transform(
        &mut self,
        table: Table,
        _metrics: &mut PipelineMetrics,
    ) -> Result<Table, PipelineError> {
        Ok(table)
    }
}

/// Optional rule set and transform chain shared by the pipeline variants.
#[derive(Default)]
pub struct StageHooks {
    pub rules: Option<RuleSet>,
    pub transforms: Option<TransformPipeline>,
}

impl StageHooks {
    /// Runs the rule set; ERROR failures block, other failures become warnings.
    pub fn validate(&self, table: &Table, metrics: &mut PipelineMetrics) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };
        let report = ValidationReport::new(rules.validate(table));
        for failure in report.failures() {
            if failure.is_blocking() {
                metrics.validation_errors.push(failure.to_string());
                metrics.rows_failed = metrics.rows_failed.max(failure.failed_count);
            } else {
                metrics.warnings.push(failure.to_string());
            }
        }
        report.is_valid()
    }

    /// Applies the transform chain, fitting it first when it is not fitted yet.
    pub fn transform(
        &mut self,
        table: Table,
        metrics: &mut PipelineMetrics,
    ) -> Result<Table, PipelineError> {
        let Some(transforms) = self.transforms.as_mut() else {
            return Ok(table);
        };
        let out = if transforms.is_fitted() {
            transforms.transform(&table)?
        } else {
            transforms.fit_transform(&table)?
        };
        metrics.warnings.extend(transforms.warnings());
        Ok(out)
    }
}

/// A pipeline variant wrapped in the lifecycle state machine.
///
/// ```rust,ignore
/// let stages = DataPipeline::new(connector, ReadRequest::table("spend"))
///     .with_rules(RuleSet::new("spend").add_required("budget", Severity::Error));
/// let mut pipeline = Pipeline::new(PipelineConfig::new("daily"), stages)?;
/// let result = pipeline.run();
/// println!("{}", result.summary());
/// ```
pub struct Pipeline<S> {
    id: Uuid,
    config: PipelineConfig,
    status: PipelineStatus,
    stages: S,
}

impl<S: PipelineStages> Pipeline<S> {
    /// Creates a PENDING pipeline; the config is validated here.
    pub fn new(config: PipelineConfig, stages: S) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            status: PipelineStatus::Pending,
            stages,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub fn stages_mut(&mut self) -> &mut S {
        &mut self.stages
    }

    /// Moves a PENDING pipeline to CANCELLED. Returns false in any other state.
    pub fn cancel(&mut self) -> bool {
        if self.status != PipelineStatus::Pending {
            return false;
        }
        self.status = PipelineStatus::Cancelled;
        info!(pipeline_id = %self.id, "Pipeline cancelled");
        true
    }

    /// Runs the pipeline once. Never panics or returns an error: every outcome,
    /// including a failed extract, is reported through the [`PipelineResult`].
    pub fn run(&mut self) -> PipelineResult {
        let started_at = Utc::now();
        if self.status != PipelineStatus::Pending {
            warn!(pipeline_id = %self.id, status = %self.status, "Pipeline already ran");
            return PipelineResult {
                pipeline_id: self.id,
                config: self.config.clone(),
                status: self.status,
                data: None,
                metrics: PipelineMetrics::default(),
                started_at,
                completed_at: Some(Utc::now()),
                error_message: Some(format!(
                    "pipeline is {}; only PENDING pipelines can run",
                    self.status
                )),
            };
        }

        self.status = PipelineStatus::Running;
        info!(
            pipeline_id = %self.id,
            name = %self.config.name,
            source = %self.config.source_type,
            "Pipeline started"
        );

        let start = Instant::now();
        let mut metrics = PipelineMetrics::default();
        let outcome = self.execute(&mut metrics);
        metrics.elapsed = start.elapsed();
        let completed_at = Some(Utc::now());

        let (data, error_message) = match outcome {
            Ok(table) => {
                self.status = PipelineStatus::Completed;
                info!(
                    pipeline_id = %self.id,
                    rows = table.n_rows(),
                    elapsed_ms = metrics.elapsed.as_millis() as u64,
                    "Pipeline completed"
                );
                (Some(table), None)
            }
            Err(e) => {
                self.status = PipelineStatus::Failed;
                error!(pipeline_id = %self.id, error = %e, "Pipeline failed");
                (None, Some(e.to_string()))
            }
        };

        PipelineResult {
            pipeline_id: self.id,
            config: self.config.clone(),
            status: self.status,
            data,
            metrics,
            started_at,
            completed_at,
            error_message,
        }
    }

    fn execute(&mut self, metrics: &mut PipelineMetrics) -> Result<Table, PipelineError> {
        let mut table = self.extract_with_retry(metrics)?;
        metrics.rows_processed = table.n_rows();

        if self.config.validate_data {
            let valid = self.stages.validate(&table, metrics);
            metrics.rows_validated = table.n_rows();
            if !valid {
                let reason = if metrics.validation_errors.is_empty() {
                    "validation rejected the extracted table".to_string()
                } else {
                    metrics.validation_errors.join("; ")
                };
                return Err(PipelineError::ValidationFailed(reason));
            }
        }

        if self.config.apply_transforms {
            table = self.stages.transform(table, metrics)?;
            metrics.rows_transformed = table.n_rows();
        }
        metrics.columns_out = table.n_cols();
        Ok(table)
    }

    fn extract_with_retry(&mut self, metrics: &mut PipelineMetrics) -> Result<Table, PipelineError> {
        let attempts = self.config.retry_count.saturating_add(1);
        let mut attempt = 1;
        loop {
            metrics.extract_attempts = attempt;
            match self.stages.extract(&self.config) {
                Ok(table) => return Ok(table),
                Err(e) if attempt < attempts => {
                    warn!(pipeline_id = %self.id, attempt, error = %e, "Extract attempt failed, retrying");
                    metrics
                        .warnings
                        .push(format!("extract attempt {}/{} failed: {}", attempt, attempts, e));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::table::Column;
    use crate::transform::StandardScaler;
    use crate::validation::Severity;

    struct Scripted {
        failures_before_success: usize,
        calls: usize,
        hooks: StageHooks,
    }

    impl Scripted {
        fn new(failures_before_success: usize) -> Self {
            Self {
                failures_before_success,
                calls: 0,
                hooks: StageHooks::default(),
            }
        }
    }

    impl PipelineStages for Scripted {
        fn extract(&mut self, _config: &PipelineConfig) -> Result<Table, PipelineError> {
            self.calls += 1;
            if self.calls <= self.failures_before_success {
                return Err(ConnectorError::Read("timeout".to_string()).into());
            }
            Ok(Table::new(vec![Column::from_f64("spend", vec![1.0, 2.0, 3.0])])?)
        }

        fn validate(&mut self, table: &Table, metrics: &mut PipelineMetrics) -> bool {
            self.hooks.validate(table, metrics)
        }

        fn transform(
            &mut self,
            table: Table,
            metrics: &mut PipelineMetrics,
        ) -> Result<Table, PipelineError> {
            self.hooks.transform(table, metrics)
        }
    }

    fn config(retries: u32) -> PipelineConfig {
        PipelineConfig::new("test").with_retry_count(retries)
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PipelineStatus::Pending.to_string(), "PENDING");
        assert_eq!(PipelineStatus::Cancelled.to_string(), "CANCELLED");
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(!PipelineStatus::Running.is_terminal());
    }

    #[test]
    fn test_extract_failure_is_terminal_failed() {
        let mut pipeline = Pipeline::new(config(0), Scripted::new(usize::MAX)).unwrap();
        let result = pipeline.run();
        assert_eq!(result.status, PipelineStatus::Failed);
        assert!(result.data.is_none());
        assert!(result.error_message.as_deref().is_some_and(|m| !m.is_empty()));
        assert!(result.completed_at.is_some());
        assert_eq!(pipeline.status(), PipelineStatus::Failed);
    }

    #[test]
    fn test_retry_recovers_and_records_warnings() {
        let mut pipeline = Pipeline::new(config(2), Scripted::new(2)).unwrap();
        let result = pipeline.run();
        assert!(result.is_success());
        assert_eq!(result.metrics.extract_attempts, 3);
        assert_eq!(result.metrics.warnings.len(), 2);
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn test_blocking_validation_fails_run() {
        let mut stages = Scripted::new(0);
        stages.hooks.rules = Some(RuleSet::new("r").add_required("budget", Severity::Error));
        let result = Pipeline::new(config(0), stages).unwrap().run();
        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.metrics.validation_errors.len(), 1);
        assert!(result.error_message.unwrap().contains("budget"));
    }

    #[test]
    fn test_warning_validation_does_not_block() {
        let mut stages = Scripted::new(0);
        stages.hooks.rules = Some(RuleSet::new("r").add_required("budget", Severity::Warning));
        stages.hooks.transforms = Some(TransformPipeline::new("t").add(StandardScaler::new("s")));
        let result = Pipeline::new(config(0), stages).unwrap().run();
        assert!(result.is_success());
        assert_eq!(result.metrics.warnings.len(), 1);
        assert_eq!(result.metrics.rows_transformed, 3);
        let spend = result.data.unwrap();
        assert!(spend.column("spend").unwrap().get(1).as_f64().unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_cancel_and_rerun() {
        let mut pipeline = Pipeline::new(config(0), Scripted::new(0)).unwrap();
        assert!(pipeline.cancel());
        let result = pipeline.run();
        assert_eq!(result.status, PipelineStatus::Cancelled);
        assert!(result.error_message.is_some());

        let mut done = Pipeline::new(config(0), Scripted::new(0)).unwrap();
        assert!(done.run().is_success());
        assert!(!done.cancel());
        let again = done.run();
        assert_eq!(again.status, PipelineStatus::Completed);
        assert!(again.data.is_none());
        assert_eq!(done.stages().calls, 1);
    }
}
