//! Pipeline variants: plain, incremental by watermark, and batched.

use tracing::{debug, info};

use super::config::PipelineConfig;
use super::executor::{Pipeline, PipelineMetrics, PipelineStages, StageHooks};
use crate::connector::{with_connection, ConnectionGuard, Connector, Filter, FilterOp, ReadRequest};
use crate::error::{ConnectorError, PipelineError, TableError};
use crate::table::{Table, Value};
use crate::transform::TransformPipeline;
use crate::validation::RuleSet;

macro_rules! stage_builders {
    () => {
        /// Validates extracted tables with `rules`.
        pub fn with_rules(mut self, rules: RuleSet) -> Self {
            self.hooks.rules = Some(rules);
            self
        }

        /// Applies `transforms` after validation.
        pub fn with_transforms(mut self, transforms: TransformPipeline) -> Self {
            self.hooks.transforms = Some(transforms);
            self
        }

        pub fn transforms(&self) -> Option<&TransformPipeline> {
            self.hooks.transforms.as_ref()
        }
    };
}

macro_rules! delegate_hooks {
    () => {
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
    };
}

/// Reads one request through a connector.
pub struct DataPipeline<C> {
    connector: C,
    request: ReadRequest,
    hooks: StageHooks,
}

impl<C: Connector> DataPipeline<C> {
    pub fn new(connector: C, request: ReadRequest) -> Self {
        Self {
            connector,
            request,
            hooks: StageHooks::default(),
        }
    }

    stage_builders!();

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connector> PipelineStages for DataPipeline<C> {
    fn extract(&mut self, config: &PipelineConfig) -> Result<Table, PipelineError> {
        debug!(pipeline = %config.name, "Extracting");
        let request = &self.request;
        Ok(with_connection(&mut self.connector, |c| c.read(request))?)
    }

    delegate_hooks!();
}

/// Reads only rows whose watermark column is past the last seen value.
///
/// The caller persists [`IncrementalPipeline::new_watermark`] and passes it
/// back through [`IncrementalPipeline::with_watermark`] on the next run.
pub struct IncrementalPipeline<C> {
    connector: C,
    request: ReadRequest,
    watermark_column: String,
    last_watermark: Option<Value>,
    new_watermark: Option<Value>,
    hooks: StageHooks,
}

impl<C: Connector> IncrementalPipeline<C> {
    pub fn new(connector: C, request: ReadRequest, watermark_column: impl Into<String>) -> Self {
        Self {
            connector,
            request,
            watermark_column: watermark_column.into(),
            last_watermark: None,
            new_watermark: None,
            hooks: StageHooks::default(),
        }
    }

    /// Sets the watermark persisted from the previous run.
    pub fn with_watermark(mut self, watermark: Value) -> Self {
        self.last_watermark = Some(watermark);
        self
    }

    stage_builders!();

    pub fn watermark_column(&self) -> &str {
        &self.watermark_column
    }

    pub fn last_watermark(&self) -> Option<&Value> {
        self.last_watermark.as_ref()
    }

    /// Maximum watermark observed by the last extract, or the previous one
    /// when no new rows arrived.
    pub fn new_watermark(&self) -> Option<&Value> {
        self.new_watermark.as_ref().or(self.last_watermark.as_ref())
    }
}

impl<C: Connector> PipelineStages for IncrementalPipeline<C> {
    fn extract(&mut self, config: &PipelineConfig) -> Result<Table, PipelineError> {
        let mut request = self.request.clone();
        if let Some(watermark) = &self.last_watermark {
            request = request.with_filter(Filter::new(
                self.watermark_column.clone(),
                FilterOp::Gt(watermark.clone()),
            ));
        }
        debug!(
            pipeline = %config.name,
            column = %self.watermark_column,
            watermark = ?self.last_watermark,
            "Extracting incrementally"
        );
        let table = with_connection(&mut self.connector, |c| c.read(&request))?;

        if table.n_rows() > 0 {
            let column = table
                .column(&self.watermark_column)
                .ok_or_else(|| TableError::ColumnNotFound(self.watermark_column.clone()))?;
            self.new_watermark = column
                .values()
                .into_iter()
                .filter(|v| !v.is_null())
                .max_by_key(Value::key);
            info!(
                rows = table.n_rows(),
                watermark = ?self.new_watermark,
                "New rows past watermark"
            );
        }
        Ok(table)
    }

    delegate_hooks!();
}

/// Pages through a source `batch_size` rows at a time.
pub struct BatchPipeline<C> {
    connector: C,
    request: ReadRequest,
    batches_read: usize,
    hooks: StageHooks,
}

impl<C: Connector> BatchPipeline<C> {
    pub fn new(connector: C, request: ReadRequest) -> Self {
        Self {
            connector,
            request,
            batches_read: 0,
            hooks: StageHooks::default(),
        }
    }

    stage_builders!();

    /// Number of batches read by the last eager extract.
    pub fn batches_read(&self) -> usize {
        self.batches_read
    }

    /// Lazily yields one table per batch over a single scoped connection.
    ///
    /// The request's `offset` is the first row read and its `limit` caps the
    /// total across all batches.
    pub fn batches(&mut self, batch_size: usize) -> Result<Batches<'_, C>, ConnectorError> {
        Ok(Batches {
            guard: ConnectionGuard::acquire(&mut self.connector)?,
            request: self.request.clone(),
            batch_size: batch_size.max(1),
            offset: self.request.offset.unwrap_or(0),
            remaining: self.request.limit,
            done: false,
        })
    }
}

impl<C: Connector> PipelineStages for BatchPipeline<C> {
    fn extract(&mut self, config: &PipelineConfig) -> Result<Table, PipelineError> {
        let batches = self
            .batches(config.batch_size)?
            .collect::<Result<Vec<Table>, ConnectorError>>()?;
        self.batches_read = batches.len();
        debug!(pipeline = %config.name, batches = batches.len(), "Batches extracted");
        if batches.is_empty() {
            return Ok(Table::empty());
        }
        Ok(Table::concat(&batches)?)
    }

    delegate_hooks!();
}

/// Iterator over consecutive batches; the connection is released on drop.
pub struct Batches<'a, C: Connector> {
    guard: ConnectionGuard<'a, C>,
    request: ReadRequest,
    batch_size: usize,
    offset: usize,
    remaining: Option<usize>,
    done: bool,
}

impl<C: Connector> Iterator for Batches<'_, C> {
    type Item = Result<Table, ConnectorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        let size = self.remaining.map_or(self.batch_size, |r| r.min(self.batch_size));
        let request = self
            .request
            .clone()
            .with_offset(self.offset)
            .with_limit(size);
        match self.guard.read(&request) {
            Ok(table) => {
                self.offset += table.n_rows();
                if let Some(remaining) = &mut self.remaining {
                    *remaining = remaining.saturating_sub(table.n_rows());
                }
                if table.n_rows() < size {
                    self.done = true;
                }
                if table.n_rows() == 0 {
                    return None;
                }
                Some(Ok(table))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<C: Connector> Pipeline<BatchPipeline<C>> {
    /// Lazy batches sized by the pipeline config.
    pub fn batches(&mut self) -> Result<Batches<'_, C>, ConnectorError> {
        let batch_size = self.config().batch_size;
        self.stages_mut().batches(batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use crate::pipeline::PipelineStatus;
    use crate::table::Column;

    fn events(n: i64) -> Table {
        Table::new(vec![
            Column::from_i64("seq", (1..=n).collect()),
            Column::from_f64("spend", (1..=n).map(|i| i as f64 * 10.0).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn test_data_pipeline_disconnects() {
        let connector = MemoryConnector::new().with_table("events", events(4));
        let mut pipeline = Pipeline::new(
            PipelineConfig::new("plain"),
            DataPipeline::new(connector, ReadRequest::table("events").with_limit(2)),
        )
        .unwrap();
        let result = pipeline.run();
        assert!(result.is_success());
        assert_eq!(result.row_count(), 2);
        let connector = pipeline.stages().connector();
        assert_eq!(connector.connect_calls(), connector.disconnect_calls());
    }

    #[test]
    fn test_refused_connection_fails_after_retries() {
        let connector = MemoryConnector::new().refusing_connections();
        let mut pipeline = Pipeline::new(
            PipelineConfig::new("down").with_retry_count(1),
            DataPipeline::new(connector, ReadRequest::table("events")),
        )
        .unwrap();
        let result = pipeline.run();
        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(pipeline.stages().connector().connect_calls(), 2);
    }

    #[test]
    fn test_incremental_watermark() {
        let connector = MemoryConnector::new().with_table("events", events(5));
        let stages = IncrementalPipeline::new(connector, ReadRequest::table("events"), "seq")
            .with_watermark(Value::Int(3));
        let mut pipeline = Pipeline::new(PipelineConfig::new("inc"), stages).unwrap();
        let result = pipeline.run();
        assert_eq!(result.row_count(), 2);
        assert_eq!(pipeline.stages().new_watermark(), Some(&Value::Int(5)));

        let connector = MemoryConnector::new().with_table("events", events(5));
        let caught_up = IncrementalPipeline::new(connector, ReadRequest::table("events"), "seq")
            .with_watermark(Value::Int(5));
        let mut pipeline = Pipeline::new(PipelineConfig::new("inc"), caught_up).unwrap();
        assert_eq!(pipeline.run().row_count(), 0);
        assert_eq!(pipeline.stages().new_watermark(), Some(&Value::Int(5)));
    }

    #[test]
    fn test_batch_eager_and_lazy() {
        let connector = MemoryConnector::new().with_table("events", events(7));
        let mut pipeline = Pipeline::new(
            PipelineConfig::new("batch").with_batch_size(3),
            BatchPipeline::new(connector, ReadRequest::table("events")),
        )
        .unwrap();

        let sizes: Vec<usize> = pipeline
            .batches()
            .unwrap()
            .map(|b| b.unwrap().n_rows())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let result = pipeline.run();
        assert_eq!(result.row_count(), 7);
        assert_eq!(pipeline.stages().batches_read(), 3);
    }

    #[test]
    fn test_batches_start_at_offset_and_stop_at_limit() {
        let connector = MemoryConnector::new().with_table("events", events(10));
        let request = ReadRequest::table("events").with_offset(2).with_limit(5);
        let mut stages = BatchPipeline::new(connector, request);

        let batches: Vec<Table> = stages.batches(2).unwrap().map(|b| b.unwrap()).collect();
        let sizes: Vec<usize> = batches.iter().map(Table::n_rows).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let seqs: Vec<f64> = batches
            .iter()
            .flat_map(|b| b.column("seq").unwrap().numeric_values())
            .collect();
        assert_eq!(seqs, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }
}
