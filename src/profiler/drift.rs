//! Comparison of two profiles of the same logical dataset.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::DataProfile;
use crate::table::DataType;
use crate::validation::drift_z;

/// Null-rate changes above this absolute delta are reported.
pub const NULL_RATE_DELTA: f64 = 0.1;
/// Mean shifts above this z-score are significant.
pub const MEAN_SHIFT_Z: f64 = 2.0;
/// Relative unique-count changes above this are reported.
pub const UNIQUE_COUNT_CHANGE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtypeChange {
    pub column: String,
    pub reference: DataType,
    pub current: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullRateChange {
    pub column: String,
    pub reference: f64,
    pub current: f64,
    pub delta: f64,
}

/// Mean shift of a numeric column in units of the reference std.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanShift {
    pub column: String,
    pub reference_mean: f64,
    pub current_mean: f64,
    pub reference_std: f64,
    pub z_score: f64,
    /// The reference column was constant, so `z_score` is a sentinel.
    #[serde(default)]
    pub zero_variance: bool,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardinalityChange {
    pub column: String,
    pub reference: usize,
    pub current: usize,
    pub relative_change: f64,
}

/// Differences between a reference profile and a current one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub reference_fingerprint: String,
    pub current_fingerprint: String,
    pub row_count_delta: i64,
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
    pub dtype_changes: Vec<DtypeChange>,
    pub null_rate_changes: Vec<NullRateChange>,
    /// Every numeric column present in both profiles, significant or not.
    pub mean_shifts: Vec<MeanShift>,
    pub cardinality_changes: Vec<CardinalityChange>,
}

impl DriftReport {
    /// True when any schema change, threshold breach or significant mean shift was found.
    pub fn has_significant_drift(&self) -> bool {
        !self.added_columns.is_empty()
            || !self.removed_columns.is_empty()
            || !self.dtype_changes.is_empty()
            || !self.null_rate_changes.is_empty()
            || !self.cardinality_changes.is_empty()
            || self.mean_shifts.iter().any(|m| m.significant)
    }

    pub fn significant_mean_shifts(&self) -> impl Iterator<Item = &MeanShift> {
        self.mean_shifts.iter().filter(|m| m.significant)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn compare_profiles(reference: &DataProfile, current: &DataProfile) -> DriftReport {
    let mut report = DriftReport {
        reference_fingerprint: reference.fingerprint.clone(),
        current_fingerprint: current.fingerprint.clone(),
        row_count_delta: current.n_rows as i64 - reference.n_rows as i64,
        ..DriftReport::default()
    };

    report.added_columns = current
        .columns
        .iter()
        .filter(|c| reference.column(&c.name).is_none())
        .map(|c| c.name.clone())
        .collect();
    report.removed_columns = reference
        .columns
        .iter()
        .filter(|c| current.column(&c.name).is_none())
        .map(|c| c.name.clone())
        .collect();

    for before in &reference.columns {
        let Some(after) = current.column(&before.name) else {
            continue;
        };
        let column = before.name.clone();

        if before.dtype != after.dtype {
            report.dtype_changes.push(DtypeChange {
                column: column.clone(),
                reference: before.dtype,
                current: after.dtype,
            });
        }

        let delta = after.null_rate - before.null_rate;
        if delta.abs() > NULL_RATE_DELTA {
            report.null_rate_changes.push(NullRateChange {
                column: column.clone(),
                reference: before.null_rate,
                current: after.null_rate,
                delta,
            });
        }

        if let (Some(ref_mean), Some(ref_std), Some(cur_mean)) =
            (before.mean(), before.std(), after.mean())
        {
            let z_score = drift_z(ref_mean, ref_std, cur_mean);
            let significant = z_score > MEAN_SHIFT_Z;
            if significant {
                warn!(column = %column, z_score, "Significant mean drift");
            }
            report.mean_shifts.push(MeanShift {
                column: column.clone(),
                reference_mean: ref_mean,
                current_mean: cur_mean,
                reference_std: ref_std,
                z_score,
                zero_variance: !(ref_std > 0.0),
                significant,
            });
        }

        if before.unique_count > 0 {
            let relative_change = (after.unique_count as f64 - before.unique_count as f64).abs()
                / before.unique_count as f64;
            if relative_change > UNIQUE_COUNT_CHANGE {
                report.cardinality_changes.push(CardinalityChange {
                    column,
                    reference: before.unique_count,
                    current: after.unique_count,
                    relative_change,
                });
            }
        }
    }

    info!(
        row_delta = report.row_count_delta,
        added = report.added_columns.len(),
        removed = report.removed_columns.len(),
        drifted = report.has_significant_drift(),
        "Compared profiles"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::{ColumnProfile, NumericSummary};
    use chrono::Utc;

    fn numeric_profile(name: &str, mean: f64, std: f64, unique: usize, null_rate: f64) -> ColumnProfile {
        ColumnProfile {
            name: name.to_string(),
            dtype: DataType::Float,
            count: 100,
            null_count: (null_rate * 100.0) as usize,
            null_rate,
            unique_count: unique,
            unique_rate: 1.0,
            numeric: Some(NumericSummary {
                mean,
                std,
                min: 0.0,
                max: 0.0,
                median: mean,
                q1: mean,
                q3: mean,
                skewness: None,
                kurtosis: None,
            }),
            value_counts: None,
            datetime: None,
            categorical: None,
        }
    }

    fn profile(rows: usize, columns: Vec<ColumnProfile>) -> DataProfile {
        DataProfile {
            fingerprint: String::new(),
            created_at: Utc::now(),
            n_rows: rows,
            n_cols: columns.len(),
            memory_bytes: 0,
            duplicate_rows: 0,
            duplicate_rate: 0.0,
            columns,
            correlations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_mean_shift_three_sigma() {
        let reference = profile(100, vec![numeric_profile("spend", 100.0, 10.0, 80, 0.0)]);
        let current = profile(120, vec![numeric_profile("spend", 130.0, 10.0, 85, 0.0)]);
        let report = compare_profiles(&reference, &current);
        assert_eq!(report.row_count_delta, 20);
        let shift = &report.mean_shifts[0];
        assert!((shift.z_score - 3.0).abs() < 1e-12);
        assert!(shift.significant);
        assert!(report.has_significant_drift());
    }

    #[test]
    fn test_schema_null_and_cardinality_changes() {
        let reference = profile(
            100,
            vec![
                numeric_profile("a", 1.0, 1.0, 10, 0.0),
                numeric_profile("gone", 1.0, 1.0, 10, 0.0),
            ],
        );
        let mut changed = numeric_profile("a", 1.5, 1.0, 30, 0.25);
        changed.dtype = DataType::Int;
        let current = profile(100, vec![changed, numeric_profile("new", 0.0, 1.0, 1, 0.0)]);

        let report = compare_profiles(&reference, &current);
        assert_eq!(report.added_columns, vec!["new"]);
        assert_eq!(report.removed_columns, vec!["gone"]);
        assert_eq!(report.dtype_changes.len(), 1);
        assert!((report.null_rate_changes[0].delta - 0.25).abs() < 1e-12);
        assert!((report.cardinality_changes[0].relative_change - 2.0).abs() < 1e-12);
        assert!(!report.mean_shifts[0].significant);
    }

    #[test]
    fn test_constant_reference_serializes_finite_z() {
        let reference = profile(50, vec![numeric_profile("price", 9.99, 0.0, 1, 0.0)]);
        let current = profile(50, vec![numeric_profile("price", 12.49, 0.5, 3, 0.0)]);
        let report = compare_profiles(&reference, &current);
        let shift = &report.mean_shifts[0];
        assert!(shift.zero_variance && shift.significant);

        let json = serde_json::to_value(&report).unwrap();
        let z = &json["mean_shifts"][0]["z_score"];
        assert!(z.is_f64(), "z_score should stay numeric, got {}", z);
        let back: DriftReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.mean_shifts[0], *shift);
    }

    #[test]
    fn test_identical_profiles_do_not_drift() {
        let p = profile(10, vec![numeric_profile("x", 5.0, 2.0, 10, 0.0)]);
        assert!(!compare_profiles(&p, &p).has_significant_drift());
    }
}
