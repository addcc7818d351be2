//! Missing-value imputation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{transform_accessors, transform_builder, Result, Transform, TransformBase, TransformState};
use crate::table::{stats, Column, ColumnData, Table, Value, ValueKey};

/// Fill value policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Column mean; numeric columns only.
    Mean,
    /// Column median; numeric columns only.
    Median,
    /// Most frequent value, ties broken by value order.
    MostFrequent,
    /// A fixed value for every selected column.
    Constant(Value),
}

/// Replaces nulls with a fitted per-column fill value.
#[derive(Debug, Clone)]
pub struct Imputer {
    base: TransformBase,
    strategy: ImputeStrategy,
    fitted: Option<BTreeMap<String, Value>>,
}

impl Imputer {
    pub const KIND: &'static str = "imputer";

    pub fn new(name: impl Into<String>, strategy: ImputeStrategy) -> Self {
        Self {
            base: TransformBase::new(name),
            strategy,
            fitted: None,
        }
    }

    transform_builder!();

    pub fn fill_values(&self) -> Option<&BTreeMap<String, Value>> {
        self.fitted.as_ref()
    }

    pub fn from_state(state: &TransformState) -> Result<Self> {
        let (base, strategy, fitted) = TransformBase::restore(state, Self::KIND)?;
        Ok(Self {
            base,
            strategy,
            fitted,
        })
    }
}

fn most_frequent(col: &Column) -> Option<Value> {
    let mut counts: BTreeMap<ValueKey, usize> = BTreeMap::new();
    for v in col.values().iter().filter(|v| !v.is_null()) {
        *counts.entry(v.key()).or_insert(0) += 1;
    }
    // max_by_key keeps the last maximum; iterate in reverse so the smallest key wins ties.
    counts
        .iter()
        .rev()
        .max_by_key(|(_, n)| **n)
        .map(|(key, _)| key.to_value())
}

impl Transform for Imputer {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let numeric_only = matches!(self.strategy, ImputeStrategy::Mean | ImputeStrategy::Median);
        let columns = self
            .base
            .select_columns(table, |c| !numeric_only || c.is_numeric())?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let col = self.base.require(table, &name)?;
            let fill = match &self.strategy {
                ImputeStrategy::Mean => stats::mean(&col.numeric_values()).map(Value::Float),
                ImputeStrategy::Median => stats::median(&col.numeric_values()).map(Value::Float),
                ImputeStrategy::MostFrequent => most_frequent(col),
                ImputeStrategy::Constant(value) => Some(value.clone()),
            };
            match fill {
                Some(value) => {
                    fitted.insert(name, value);
                }
                None => self
                    .base
                    .warnings
                    .push(format!("{}: column '{}' has no values to impute from", self.base.name, name)),
            }
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, fill) in fitted {
            let col = self.base.require(table, name)?;
            if col.null_count() == 0 {
                continue;
            }
            let values: Vec<Value> = col
                .values()
                .into_iter()
                .map(|v| if v.is_null() { fill.clone() } else { v })
                .collect();
            let data = match (&col.data, fill) {
                // Keep integer columns integral when the fill is integral.
                (ColumnData::Int(_), Value::Float(f)) if f.fract() == 0.0 => ColumnData::from_values(
                    &values
                        .into_iter()
                        .map(|v| match v {
                            Value::Float(f) => Value::Int(f as i64),
                            other => other,
                        })
                        .collect::<Vec<_>>(),
                ),
                _ => ColumnData::from_values(&values),
            };
            out.set_column(Column::new(name.clone(), data))?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.strategy, &self.fitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec![
            Column::float("spend", vec![Some(1.0), None, Some(5.0), Some(6.0)]),
            Column::str(
                "region",
                vec![
                    Some("north".to_string()),
                    Some("south".to_string()),
                    None,
                    Some("south".to_string()),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_mean_and_median() {
        let out = Imputer::new("mean", ImputeStrategy::Mean)
            .fit_transform(&table())
            .unwrap();
        assert_eq!(out.column("spend").unwrap().get(1), Value::Float(4.0));
        // region is skipped without a warning because it was not requested
        assert!(out.column("region").unwrap().is_null(2));

        let out = Imputer::new("median", ImputeStrategy::Median)
            .fit_transform(&table())
            .unwrap();
        assert_eq!(out.column("spend").unwrap().get(1), Value::Float(5.0));
    }

    #[test]
    fn test_most_frequent_and_constant() {
        let out = Imputer::new("mode", ImputeStrategy::MostFrequent)
            .fit_transform(&table())
            .unwrap();
        assert_eq!(out.column("region").unwrap().get(2), Value::Str("south".to_string()));

        let out = Imputer::new("zero", ImputeStrategy::Constant(Value::Float(0.0)))
            .with_columns(["spend"])
            .fit_transform(&table())
            .unwrap();
        assert_eq!(out.column("spend").unwrap().null_count(), 0);
        assert_eq!(out.column("spend").unwrap().get(1), Value::Float(0.0));
    }

    #[test]
    fn test_mean_on_string_column_warns() {
        let mut imputer = Imputer::new("mean", ImputeStrategy::Mean).with_columns(["region"]);
        imputer.fit(&table()).unwrap();
        assert_eq!(imputer.warnings().len(), 1);
        assert!(imputer.fill_values().unwrap().is_empty());
    }

    #[test]
    fn test_state_round_trip() {
        let mut imputer = Imputer::new("mode", ImputeStrategy::MostFrequent);
        imputer.fit(&table()).unwrap();
        let restored = Imputer::from_state(&imputer.to_state().unwrap()).unwrap();
        assert_eq!(restored.fill_values(), imputer.fill_values());
    }
}
