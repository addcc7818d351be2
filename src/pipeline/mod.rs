//! Pipeline execution: extract, validate, transform.
//!
//! A pipeline is a [`PipelineStages`] variant wrapped in the [`Pipeline`]
//! state machine:
//!
//! ```text
//! PENDING -> RUNNING -> COMPLETED | FAILED
//! PENDING -> CANCELLED
//! ```
//!
//! Terminal states are final; `run()` on a pipeline that is not PENDING
//! returns immediately with the current status.
//!
//! # Pipeline Flow
//!
//! 1. **Extract**: the variant reads a table through its [`crate::connector::Connector`],
//!    retried up to `retry_count` extra times. Exhausting the retries fails the run.
//! 2. **Validate** (when `validate_data`): ERROR-severity rule failures fail the
//!    run; WARNING/INFO failures are recorded as warnings.
//! 3. **Transform** (when `apply_transforms`): the transform chain is fitted on
//!    first use and applied; unsupported-column warnings land in the metrics.
//!
//! `run()` never returns an error. Every outcome is a [`PipelineResult`] with
//! `completed_at` and the elapsed time set.
//!
//! # Variants
//!
//! - [`DataPipeline`]: one read per run.
//! - [`IncrementalPipeline`]: reads rows past a watermark and exposes the new one.
//! - [`BatchPipeline`]: pages through the source, eagerly via `run()` or lazily
//!   via `batches()`.
//!
//! # Example
//!
//! ```rust,ignore
//! use trainset_forge::connector::{MemoryConnector, ReadRequest};
//! use trainset_forge::pipeline::{IncrementalPipeline, Pipeline, PipelineConfig};
//!
//! let stages = IncrementalPipeline::new(connector, ReadRequest::table("events"), "updated_at")
//!     .with_watermark(last_seen);
//! let mut pipeline = Pipeline::new(PipelineConfig::from_env()?, stages)?;
//! let result = pipeline.run();
//! if let Some(watermark) = pipeline.stages().new_watermark() {
//!     store.save(watermark);
//! }
//! ```
//!
//! # Configuration
//!
//! See [`PipelineConfig`] for the `PIPELINE_*` environment variables and YAML
//! keys.

pub mod config;
pub mod executor;
pub mod stages;

pub use config::{ConfigError, PipelineConfig};
pub use executor::{
    Pipeline, PipelineMetrics, PipelineResult, PipelineStages, PipelineStatus, StageHooks,
};
pub use stages::{BatchPipeline, Batches, DataPipeline, IncrementalPipeline};
