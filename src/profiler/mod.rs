//! Dataset profiling and drift comparison.
//!
//! [`DataProfiler::profile`] produces an immutable [`DataProfile`] with
//! per-column statistics, dataset-level counts, strong correlations and
//! advisory warnings. [`compare_profiles`] diffs two profiles of the same
//! logical dataset.
//!
//! # Example
//!
//! ```rust,ignore
//! use trainset_forge::profiler::{compare_profiles, DataProfiler};
//!
//! let profiler = DataProfiler::new().with_top_n(5);
//! let before = profiler.profile(&last_week);
//! let after = profiler.profile(&this_week);
//! let drift = compare_profiles(&before, &after);
//! if drift.has_significant_drift() {
//!     println!("{}", drift.to_json()?);
//! }
//! ```

pub mod column;
pub mod drift;

pub use column::{CategoricalSummary, ColumnProfile, DateTimeSummary, NumericSummary, ValueCount};
pub use drift::{
    compare_profiles, CardinalityChange, DriftReport, DtypeChange, MeanShift, NullRateChange,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::table::{stats, DataType, Table};

const HIGH_NULL_RATE: f64 = 0.5;
const MODERATE_NULL_RATE: f64 = 0.1;
const LOW_CARDINALITY_MAX_UNIQUE: usize = 5;
const LOW_CARDINALITY_MIN_COUNT: usize = 50;
const IDENTIFIER_UNIQUE_RATE: f64 = 0.95;
const HIGH_DUPLICATE_RATE: f64 = 0.1;

/// Pair of numeric columns with a strong linear relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub left: String,
    pub right: String,
    pub r: f64,
}

/// Snapshot of a dataset at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    /// Content digest of the profiled table.
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub n_rows: usize,
    pub n_cols: usize,
    pub memory_bytes: usize,
    pub duplicate_rows: usize,
    pub duplicate_rate: f64,
    pub columns: Vec<ColumnProfile>,
    pub correlations: Vec<Correlation>,
    pub warnings: Vec<String>,
}

impl DataProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Profiling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataProfiler {
    /// Size of top-value tables; numeric frequency tables are kept only at or
    /// below this cardinality.
    pub top_n: usize,
    pub compute_correlations: bool,
    /// Correlations with `|r|` above this are reported.
    pub correlation_threshold: f64,
    pub memory_warning_mb: f64,
}

impl Default for DataProfiler {
    fn default() -> Self {
        Self {
            top_n: 10,
            compute_correlations: true,
            correlation_threshold: 0.5,
            memory_warning_mb: 1024.0,
        }
    }
}

impl DataProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_correlations(mut self, enabled: bool) -> Self {
        self.compute_correlations = enabled;
        self
    }

    pub fn with_correlation_threshold(mut self, threshold: f64) -> Self {
        self.correlation_threshold = threshold;
        self
    }

    pub fn with_memory_warning_mb(mut self, mb: f64) -> Self {
        self.memory_warning_mb = mb;
        self
    }

    pub fn profile(&self, table: &Table) -> DataProfile {
        let columns: Vec<ColumnProfile> = table
            .columns()
            .iter()
            .map(|c| ColumnProfile::from_column(c, self.top_n))
            .collect();
        let duplicate_rows = table.duplicate_row_count();
        let correlations = if self.compute_correlations {
            self.correlations(table)
        } else {
            Vec::new()
        };

        let mut profile = DataProfile {
            fingerprint: table.fingerprint(),
            created_at: Utc::now(),
            n_rows: table.n_rows(),
            n_cols: table.n_cols(),
            memory_bytes: table.memory_bytes(),
            duplicate_rows,
            duplicate_rate: if table.n_rows() == 0 {
                0.0
            } else {
                duplicate_rows as f64 / table.n_rows() as f64
            },
            columns,
            correlations,
            warnings: Vec::new(),
        };
        profile.warnings = self.warnings(&profile);
        info!(
            rows = profile.n_rows,
            cols = profile.n_cols,
            warnings = profile.warnings.len(),
            "Profiled table"
        );
        profile
    }

    fn correlations(&self, table: &Table) -> Vec<Correlation> {
        let numeric: Vec<_> = table
            .columns()
            .iter()
            .filter(|c| c.is_numeric())
            .filter_map(|c| Some((c.name.clone(), c.to_f64()?)))
            .collect();
        let mut out = Vec::new();
        for (i, (left, x)) in numeric.iter().enumerate() {
            for (right, y) in &numeric[i + 1..] {
                if let Some(r) = stats::pearson(x, y) {
                    if r.abs() > self.correlation_threshold {
                        out.push(Correlation {
                            left: left.clone(),
                            right: right.clone(),
                            r,
                        });
                    }
                }
            }
        }
        debug!(pairs = out.len(), "Strong correlations found");
        out
    }

    fn warnings(&self, profile: &DataProfile) -> Vec<String> {
        let mut warnings = Vec::new();
        for col in &profile.columns {
            if col.null_rate > HIGH_NULL_RATE {
                warnings.push(format!(
                    "Column '{}' has {:.1}% null values",
                    col.name,
                    col.null_rate * 100.0
                ));
            } else if col.null_rate > MODERATE_NULL_RATE {
                warnings.push(format!(
                    "Column '{}' has {:.1}% null values (moderate)",
                    col.name,
                    col.null_rate * 100.0
                ));
            }
            if col.is_constant() {
                warnings.push(format!("Column '{}' is constant", col.name));
            }
            if col.is_numeric()
                && col.unique_count <= LOW_CARDINALITY_MAX_UNIQUE
                && col.count > LOW_CARDINALITY_MIN_COUNT
                && !col.is_constant()
            {
                warnings.push(format!(
                    "Numeric column '{}' has only {} distinct values; consider treating it as categorical",
                    col.name, col.unique_count
                ));
            }
            if col.dtype == DataType::Str
                && col.count - col.null_count > 1
                && col.unique_rate > IDENTIFIER_UNIQUE_RATE
            {
                warnings.push(format!(
                    "Column '{}' is {:.1}% unique; probably an identifier",
                    col.name,
                    col.unique_rate * 100.0
                ));
            }
        }
        if profile.duplicate_rate > HIGH_DUPLICATE_RATE {
            warnings.push(format!(
                "{} duplicate rows ({:.1}%)",
                profile.duplicate_rows,
                profile.duplicate_rate * 100.0
            ));
        }
        if profile.memory_mb() > self.memory_warning_mb {
            warnings.push(format!(
                "Table uses {:.1} MB of memory",
                profile.memory_mb()
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn test_profile_counts_and_fingerprint() {
        let table = Table::new(vec![
            Column::from_f64("spend", vec![1.0, 2.0, 3.0, 1.0]),
            Column::from_f64("revenue", vec![2.0, 4.1, 6.0, 2.0]),
            Column::from_strs("channel", &["tv", "tv", "tv", "tv"]),
        ])
        .unwrap();
        let profile = DataProfiler::new().profile(&table);
        assert_eq!(profile.n_rows, 4);
        assert_eq!(profile.n_cols, 3);
        assert_eq!(profile.duplicate_rows, 1);
        assert_eq!(profile.fingerprint, table.fingerprint());
        assert_eq!(profile.correlations.len(), 1);
        assert!(profile.correlations[0].r > 0.99);
        assert!(profile.warnings.iter().any(|w| w.contains("'channel' is constant")));
        assert!(profile.warnings.iter().any(|w| w.contains("duplicate rows")));
    }

    #[test]
    fn test_null_and_identifier_warnings() {
        let table = Table::new(vec![
            Column::float("sparse", vec![None, None, Some(1.0), None]),
            Column::from_strs("user_id", &["a", "b", "c", "d"]),
        ])
        .unwrap();
        let profile = DataProfiler::new().with_correlations(false).profile(&table);
        assert!(profile.warnings.iter().any(|w| w.contains("'sparse' has 75.0% null")));
        assert!(profile.warnings.iter().any(|w| w.contains("identifier")));
    }

    #[test]
    fn test_low_cardinality_numeric() {
        let values: Vec<i64> = (0..60).map(|i| i % 3).collect();
        let table = Table::new(vec![Column::from_i64("tier", values)]).unwrap();
        let profile = DataProfiler::new().profile(&table);
        assert!(profile.warnings.iter().any(|w| w.contains("categorical")));
        assert_eq!(profile.column("tier").unwrap().value_counts.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_profile_json_round_trip() {
        let table = Table::new(vec![Column::from_f64("x", vec![1.0, 2.0])]).unwrap();
        let profile = DataProfiler::new().profile(&table);
        let parsed = DataProfile::from_json(&profile.to_json().unwrap()).unwrap();
        assert_eq!(parsed, profile);
    }
}
