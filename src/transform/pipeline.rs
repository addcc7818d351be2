//! Ordered composition of transforms with per-step history.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Result, Transform, TransformRegistry, TransformState};
use crate::error::TransformError;
use crate::table::Table;

/// Execution record of a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub kind: String,
    pub success: bool,
    pub elapsed: Duration,
    pub input_rows: usize,
    pub output_rows: usize,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
    pub input_fingerprint: String,
    pub output_fingerprint: Option<String>,
    pub error: Option<String>,
}

/// Transforms applied in insertion order, each seeing the previous output.
#[derive(Debug, Default)]
pub struct TransformPipeline {
    name: String,
    steps: Vec<Box<dyn Transform>>,
    history: Vec<StepRecord>,
}

impl TransformPipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn add<T: Transform + 'static>(mut self, step: T) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn Transform>) {
        self.steps.push(step);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Box<dyn Transform>] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&dyn Transform> {
        self.steps.iter().find(|s| s.name() == name).map(|s| s.as_ref())
    }

    pub fn is_fitted(&self) -> bool {
        self.steps.iter().all(|s| s.is_fitted())
    }

    /// Records of the most recent `fit`, `transform` or `fit_transform` call.
    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    /// Fit warnings of every step, in step order.
    pub fn warnings(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|s| s.warnings().iter().cloned())
            .collect()
    }

    /// Fits every step, feeding each the output of the previous one.
    pub fn fit(&mut self, table: &Table) -> Result<()> {
        self.run(table, true).map(|_| ())
    }

    pub fn fit_transform(&mut self, table: &Table) -> Result<Table> {
        self.run(table, true)
    }

    /// Applies the fitted steps in order, recording history.
    pub fn transform(&mut self, table: &Table) -> Result<Table> {
        self.run(table, false)
    }

    /// Applies inverses in reverse order; fails on the first non-invertible step.
    pub fn inverse_transform(&self, table: &Table) -> Result<Table> {
        let mut current = table.clone();
        for (index, step) in self.steps.iter().enumerate().rev() {
            current = step
                .inverse_transform(&current)
                .map_err(|e| step_failed(index, step.as_ref(), e))?;
        }
        Ok(current)
    }

    fn run(&mut self, table: &Table, fit: bool) -> Result<Table> {
        self.history.clear();
        info!(
            pipeline = %self.name,
            steps = self.steps.len(),
            rows = table.n_rows(),
            fit,
            "Running transform pipeline"
        );

        let mut current = table.clone();
        for (index, step) in self.steps.iter_mut().enumerate() {
            let start = Instant::now();
            let input_fingerprint = current.fingerprint();
            let before: BTreeSet<String> = current.column_names().into_iter().collect();

            let outcome = if fit {
                step.fit_transform(&current)
            } else {
                step.transform(&current)
            };

            let mut record = StepRecord {
                index,
                name: step.name().to_string(),
                kind: step.kind().to_string(),
                success: outcome.is_ok(),
                elapsed: start.elapsed(),
                input_rows: current.n_rows(),
                output_rows: 0,
                columns_added: Vec::new(),
                columns_removed: Vec::new(),
                input_fingerprint,
                output_fingerprint: None,
                error: None,
            };

            match outcome {
                Ok(output) => {
                    let after: BTreeSet<String> = output.column_names().into_iter().collect();
                    record.output_rows = output.n_rows();
                    record.columns_added = after.difference(&before).cloned().collect();
                    record.columns_removed = before.difference(&after).cloned().collect();
                    record.output_fingerprint = Some(output.fingerprint());
                    debug!(
                        step = %record.name,
                        elapsed_ms = record.elapsed.as_millis() as u64,
                        added = record.columns_added.len(),
                        removed = record.columns_removed.len(),
                        "Step completed"
                    );
                    self.history.push(record);
                    current = output;
                }
                Err(e) => {
                    record.error = Some(e.to_string());
                    self.history.push(record);
                    return Err(step_failed(index, step.as_ref(), e));
                }
            }
        }
        Ok(current)
    }

    /// Serializable states of every step, in order.
    pub fn to_states(&self) -> Result<Vec<TransformState>> {
        self.steps.iter().map(|s| s.to_state()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_states()?)?)
    }

    /// Rebuilds a pipeline from step states using the builtin registry.
    pub fn from_states(name: impl Into<String>, states: &[TransformState]) -> Result<Self> {
        TransformRegistry::with_builtins().restore_pipeline(name, states)
    }

    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let states: Vec<TransformState> = serde_json::from_str(json)?;
        Self::from_states(name, &states)
    }
}

fn step_failed(index: usize, step: &dyn Transform, source: TransformError) -> TransformError {
    TransformError::StepFailed {
        index,
        name: step.name().to_string(),
        source: Box::new(source),
    }
}
