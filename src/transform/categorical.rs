//! Categorical encoders.
//!
//! Categories are the string forms of non-null values. Without an explicit
//! column list the encoders pick up string and bool columns; integer columns
//! are encoded only when named explicitly. Nulls stay null in every output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{transform_accessors, transform_builder, Result, Transform, TransformBase, TransformState};
use crate::error::TransformError;
use crate::table::{stats, Column, DataType, Table};

fn categorical_columns(
    base: &mut TransformBase,
    table: &Table,
    exclude: Option<&str>,
) -> Result<Vec<String>> {
    let explicit = base.columns.is_some();
    let mut columns = base.select_columns(table, |c| match c.dtype() {
        DataType::Str | DataType::Bool => true,
        DataType::Int => explicit,
        _ => false,
    })?;
    if let Some(excluded) = exclude {
        columns.retain(|c| c != excluded);
    }
    Ok(columns)
}

/// Occurrence count per category, ordered by category string.
fn category_counts(col: &Column) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for label in col.to_strings().into_iter().flatten() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Swaps `original` for `replacements`, keeping them at the original position.
fn replace_with(table: &mut Table, original: &str, replacements: Vec<Column>) -> Result<()> {
    let mut anchor = original.to_string();
    for col in replacements {
        let name = col.name.clone();
        table.insert_after(&anchor, col)?;
        anchor = name;
    }
    table.drop_column(original);
    Ok(())
}

/// Maps each category to its position in string order; unseen categories become -1.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    base: TransformBase,
    fitted: Option<BTreeMap<String, Vec<String>>>,
}

impl LabelEncoder {
    pub const KIND: &'static str = "label_encoder";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            fitted: None,
        }
    }

    transform_builder!();

    /// Sorted classes per column.
    pub fn classes(&self, column: &str) -> Option<&[String]> {
        self.fitted.as_ref()?.get(column).map(Vec::as_slice)
    }

    pub fn from_state(state: &TransformState) -> Result<Self> {
        let (base, (), fitted) = TransformBase::restore(state, Self::KIND)?;
        Ok(Self { base, fitted })
    }
}

impl Transform for LabelEncoder {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let columns = categorical_columns(&mut self.base, table, None)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let classes = category_counts(self.base.require(table, &name)?)
                .into_keys()
                .collect();
            fitted.insert(name, classes);
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, classes) in fitted {
            let col = self.base.require(table, name)?;
            let codes = col
                .to_strings()
                .into_iter()
                .map(|v| {
                    v.map(|label| match classes.binary_search(&label) {
                        Ok(idx) => idx as i64,
                        Err(_) => -1,
                    })
                })
                .collect();
            out.set_column(Column::int(name.clone(), codes))?;
        }
        Ok(out)
    }

    fn inverse_transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, classes) in fitted {
            let col = self.base.require(table, name)?;
            let codes = col.to_f64().ok_or_else(|| TransformError::UnsupportedType {
                transform: self.base.name.clone(),
                column: name.clone(),
                dtype: col.dtype().to_string(),
            })?;
            let labels = codes
                .into_iter()
                .map(|code| {
                    code.filter(|c| *c >= 0.0)
                        .and_then(|c| classes.get(c as usize).cloned())
                })
                .collect();
            out.set_column(Column::str(name.clone(), labels))?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &(), &self.fitted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotConfig {
    pub drop_first: bool,
    /// Categories seen fewer times than this get no indicator column.
    pub min_frequency: usize,
}

/// One indicator column `{column}_{category}` per kept category.
#[derive(Debug, Clone)]
pub struct OneHotEncoder {
    base: TransformBase,
    config: OneHotConfig,
    fitted: Option<BTreeMap<String, Vec<String>>>,
}

impl OneHotEncoder {
    pub const KIND: &'static str = "onehot_encoder";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: OneHotConfig {
                drop_first: false,
                min_frequency: 1,
            },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_drop_first(mut self, drop_first: bool) -> Self {
        self.config.drop_first = drop_first;
        self
    }

    pub fn with_min_frequency(mut self, min_frequency: usize) -> Self {
        self.config.min_frequency = min_frequency;
        self
    }

    /// Categories that receive an indicator column.
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.fitted.as_ref()?.get(column).map(Vec::as_slice)
    }

    pub fn from_state(state: &TransformState) -> Result<Self> {
        let (base, config, fitted) = TransformBase::restore(state, Self::KIND)?;
        Ok(Self {
            base,
            config,
            fitted,
        })
    }
}

impl Transform for OneHotEncoder {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let columns = categorical_columns(&mut self.base, table, None)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let mut kept: Vec<String> = category_counts(self.base.require(table, &name)?)
                .into_iter()
                .filter(|(_, n)| *n >= self.config.min_frequency)
                .map(|(label, _)| label)
                .collect();
            if self.config.drop_first && !kept.is_empty() {
                kept.remove(0);
            }
            fitted.insert(name, kept);
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, categories) in fitted {
            let labels = self.base.require(table, name)?.to_strings();
            let indicators = categories
                .iter()
                .map(|cat| {
                    let values = labels
                        .iter()
                        .map(|v| v.as_ref().map(|label| i64::from(label == cat)))
                        .collect();
                    Column::int(format!("{}_{}", name, cat), values)
                })
                .collect();
            replace_with(&mut out, name, indicators)?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyConfig {
    pub normalize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyTable {
    pub total: usize,
    pub counts: BTreeMap<String, usize>,
}

/// Replaces categories by their count (or share) in the fitting data; unseen become 0.
#[derive(Debug, Clone)]
pub struct FrequencyEncoder {
    base: TransformBase,
    config: FrequencyConfig,
    fitted: Option<BTreeMap<String, FrequencyTable>>,
}

impl FrequencyEncoder {
    pub const KIND: &'static str = "frequency_encoder";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: FrequencyConfig { normalize: true },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.config.normalize = normalize;
        self
    }

    pub fn from_state(state: &TransformState) -> Result<Self> {
        let (base, config, fitted) = TransformBase::restore(state, Self::KIND)?;
        Ok(Self {
            base,
            config,
            fitted,
        })
    }
}

impl Transform for FrequencyEncoder {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let columns = categorical_columns(&mut self.base, table, None)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let counts = category_counts(self.base.require(table, &name)?);
            let total = counts.values().sum();
            fitted.insert(name, FrequencyTable { total, counts });
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, freq) in fitted {
            let values = self
                .base
                .require(table, name)?
                .to_strings()
                .into_iter()
                .map(|v| {
                    v.map(|label| {
                        let count = freq.counts.get(&label).copied().unwrap_or(0) as f64;
                        if self.config.normalize && freq.total > 0 {
                            count / freq.total as f64
                        } else {
                            count
                        }
                    })
                })
                .collect();
            out.set_column(Column::float(name.clone(), values))?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub target: String,
    /// Additive smoothing strength `alpha`.
    pub smoothing: f64,
    /// Categories with fewer samples fall back to the global mean.
    pub min_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMapping {
    pub global_mean: f64,
    pub encoding: BTreeMap<String, f64>,
}

/// Smoothed target-mean encoding: `(n * mean + alpha * global) / (n + alpha)`.
///
/// Unseen categories and categories below `min_samples` map to the global mean.
#[derive(Debug, Clone)]
pub struct TargetEncoder {
    base: TransformBase,
    config: TargetConfig,
    fitted: Option<BTreeMap<String, TargetMapping>>,
}

impl TargetEncoder {
    pub const KIND: &'static str = "target_encoder";

    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: TargetConfig {
                target: target.into(),
                smoothing: 1.0,
                min_samples: 1,
            },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.config.smoothing = smoothing;
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.config.min_samples = min_samples;
        self
    }

    pub fn mapping(&self, column: &str) -> Option<&TargetMapping> {
        self.fitted.as_ref()?.get(column)
    }

    pub fn from_state(state: &TransformState) -> Result<Self> {
        let (base, config, fitted) = TransformBase::restore(state, Self::KIND)?;
        Ok(Self {
            base,
            config,
            fitted,
        })
    }
}

impl Transform for TargetEncoder {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        if !(self.config.smoothing >= 0.0 && self.config.smoothing.is_finite()) {
            return Err(self.base.invalid("smoothing must be non-negative"));
        }
        let target_col = self.base.require(table, &self.config.target)?;
        let target = target_col
            .to_f64()
            .ok_or_else(|| TransformError::UnsupportedType {
                transform: self.base.name.clone(),
                column: self.config.target.clone(),
                dtype: target_col.dtype().to_string(),
            })?;
        let observed: Vec<f64> = target.iter().flatten().copied().collect();
        let global_mean = stats::mean(&observed).unwrap_or(0.0);
        let alpha = self.config.smoothing;

        let columns = categorical_columns(&mut self.base, table, Some(&self.config.target))?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let labels = self.base.require(table, &name)?.to_strings();
            let mut groups: BTreeMap<String, (usize, f64)> = BTreeMap::new();
            for (label, y) in labels.into_iter().zip(target.iter()) {
                if let (Some(label), Some(y)) = (label, y) {
                    let entry = groups.entry(label).or_insert((0, 0.0));
                    entry.0 += 1;
                    entry.1 += y;
                }
            }
            let encoding = groups
                .into_iter()
                .map(|(label, (n, sum))| {
                    let value = if n < self.config.min_samples {
                        global_mean
                    } else {
                        let n = n as f64;
                        let mean = sum / n;
                        (n * mean + alpha * global_mean) / (n + alpha)
                    };
                    (label, value)
                })
                .collect();
            fitted.insert(
                name,
                TargetMapping {
                    global_mean,
                    encoding,
                },
            );
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, mapping) in fitted {
            let values = self
                .base
                .require(table, name)?
                .to_strings()
                .into_iter()
                .map(|v| {
                    v.map(|label| {
                        mapping
                            .encoding
                            .get(&label)
                            .copied()
                            .unwrap_or(mapping.global_mean)
                    })
                })
                .collect();
            out.set_column(Column::float(name.clone(), values))?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

/// Bits needed to encode `cardinality` codes: `ceil(log2(max(cardinality, 2)))`.
pub fn binary_width(cardinality: usize) -> usize {
    let card = cardinality.max(2);
    (usize::BITS - (card - 1).leading_zeros()) as usize
}

/// Encodes each category's 0-based code as bit columns `{column}_bin_{k}`,
/// most significant bit first.
///
/// With `ceil(log2(cardinality))` bits every pattern may belong to a known
/// category, so unseen categories are written as `-1` in every bit column,
/// matching [`LabelEncoder`]'s unseen code.
#[derive(Debug, Clone)]
pub struct BinaryEncoder {
    base: TransformBase,
    fitted: Option<BTreeMap<String, Vec<String>>>,
}

impl BinaryEncoder {
    pub const KIND: &'static str = "binary_encoder";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            fitted: None,
        }
    }

    transform_builder!();

    pub fn from_state(state: &TransformState) -> Result<Self> {
        let (base, (), fitted) = TransformBase::restore(state, Self::KIND)?;
        Ok(Self { base, fitted })
    }
}

impl Transform for BinaryEncoder {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let columns = categorical_columns(&mut self.base, table, None)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let categories = category_counts(self.base.require(table, &name)?)
                .into_keys()
                .collect();
            fitted.insert(name, categories);
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, categories) in fitted {
            let width = binary_width(categories.len());
            let codes: Vec<Option<Option<usize>>> = self
                .base
                .require(table, name)?
                .to_strings()
                .into_iter()
                .map(|v| v.map(|label| categories.binary_search(&label).ok()))
                .collect();
            let bits = (0..width)
                .map(|k| {
                    let shift = width - 1 - k;
                    let values = codes
                        .iter()
                        .map(|code| code.map(|c| c.map_or(-1, |c| ((c >> shift) & 1) as i64)))
                        .collect();
                    Column::int(format!("{}_bin_{}", name, k), values)
                })
                .collect();
            replace_with(&mut out, name, bits)?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &(), &self.fitted)
    }
}
