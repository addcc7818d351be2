//! Per-column statistics.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::table::{stats, Column, ColumnData, DataType, Value, ValueKey};

/// Frequency of one distinct value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: Value,
    pub count: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeSummary {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
    pub span_days: i64,
}

/// Summary of string and boolean columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSummary {
    pub mode: Option<Value>,
    pub top_values: Vec<ValueCount>,
    /// Character lengths; only set for string columns.
    pub min_length: Option<usize>,
    pub avg_length: Option<f64>,
    pub max_length: Option<usize>,
}

/// Snapshot of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: DataType,
    pub count: usize,
    pub null_count: usize,
    pub null_rate: f64,
    pub unique_count: usize,
    /// Unique values over non-null values.
    pub unique_rate: f64,
    pub numeric: Option<NumericSummary>,
    /// Full frequency table of a numeric column with at most `top_n` distinct values.
    pub value_counts: Option<Vec<ValueCount>>,
    pub datetime: Option<DateTimeSummary>,
    pub categorical: Option<CategoricalSummary>,
}

impl ColumnProfile {
    pub fn from_column(column: &Column, top_n: usize) -> Self {
        let count = column.len();
        let null_count = column.null_count();
        let non_null = count - null_count;

        let mut frequencies: BTreeMap<ValueKey, usize> = BTreeMap::new();
        for value in column.values().iter().filter(|v| !v.is_null()) {
            *frequencies.entry(value.key()).or_insert(0) += 1;
        }
        let unique_count = frequencies.len();

        let mut profile = Self {
            name: column.name.clone(),
            dtype: column.dtype(),
            count,
            null_count,
            null_rate: ratio(null_count, count),
            unique_count,
            unique_rate: ratio(unique_count, non_null),
            numeric: None,
            value_counts: None,
            datetime: None,
            categorical: None,
        };

        match &column.data {
            ColumnData::Float(_) | ColumnData::Int(_) => {
                profile.numeric = numeric_summary(&column.numeric_values());
                if unique_count <= top_n {
                    profile.value_counts = Some(ranked(&frequencies, non_null, usize::MAX));
                }
            }
            ColumnData::DateTime(values) => {
                let present = values.iter().flatten();
                if let (Some(min), Some(max)) = (present.clone().min(), present.max()) {
                    profile.datetime = Some(DateTimeSummary {
                        min: *min,
                        max: *max,
                        span_days: (*max - *min).num_days(),
                    });
                }
            }
            ColumnData::Str(values) => {
                let lengths: Vec<usize> = values.iter().flatten().map(|s| s.chars().count()).collect();
                let top_values = ranked(&frequencies, non_null, top_n);
                profile.categorical = Some(CategoricalSummary {
                    mode: top_values.first().map(|v| v.value.clone()),
                    top_values,
                    min_length: lengths.iter().min().copied(),
                    avg_length: (!lengths.is_empty())
                        .then(|| lengths.iter().sum::<usize>() as f64 / lengths.len() as f64),
                    max_length: lengths.iter().max().copied(),
                });
            }
            ColumnData::Bool(_) => {
                let top_values = ranked(&frequencies, non_null, top_n);
                profile.categorical = Some(CategoricalSummary {
                    mode: top_values.first().map(|v| v.value.clone()),
                    top_values,
                    min_length: None,
                    avg_length: None,
                    max_length: None,
                });
            }
        }
        profile
    }

    pub fn is_numeric(&self) -> bool {
        self.dtype.is_numeric()
    }

    pub fn is_constant(&self) -> bool {
        self.unique_count == 1
    }

    pub fn mean(&self) -> Option<f64> {
        self.numeric.as_ref().map(|n| n.mean)
    }

    pub fn std(&self) -> Option<f64> {
        self.numeric.as_ref().map(|n| n.std)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn numeric_summary(values: &[f64]) -> Option<NumericSummary> {
    let sorted = stats::sorted(values);
    Some(NumericSummary {
        mean: stats::mean(values)?,
        std: stats::std_dev(values).unwrap_or(0.0),
        min: *sorted.first()?,
        max: *sorted.last()?,
        median: stats::quantile_sorted(&sorted, 0.5)?,
        q1: stats::quantile_sorted(&sorted, 0.25)?,
        q3: stats::quantile_sorted(&sorted, 0.75)?,
        skewness: stats::skewness(values),
        kurtosis: stats::kurtosis(values),
    })
}

/// Most frequent first; ties keep value order.
fn ranked(frequencies: &BTreeMap<ValueKey, usize>, total: usize, limit: usize) -> Vec<ValueCount> {
    let mut entries: Vec<(&ValueKey, &usize)> = frequencies.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1));
    entries
        .into_iter()
        .take(limit)
        .map(|(key, count)| ValueCount {
            value: key.to_value(),
            count: *count,
            rate: ratio(*count, total),
        })
        .collect()
}
