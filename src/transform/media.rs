//! Media-response feature transforms: carryover and saturation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{transform_accessors, transform_builder, Result, Transform, TransformBase, TransformState};
use crate::error::TransformError;
use crate::generator::curves;
use crate::table::{stats, Column, Table};

fn numeric_or_unsupported<'t>(
    base: &TransformBase,
    table: &'t Table,
    name: &str,
) -> Result<(&'t Column, Vec<Option<f64>>)> {
    let col = base.require(table, name)?;
    let values = col.to_f64().ok_or_else(|| TransformError::UnsupportedType {
        transform: base.name.clone(),
        column: name.to_string(),
        dtype: col.dtype().to_string(),
    })?;
    Ok((col, values))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdstockConfig {
    pub decay: f64,
}

/// Applies the carryover recurrence down each column in row order.
///
/// Nulls contribute zero to the carry and stay null in the output.
#[derive(Debug, Clone)]
pub struct AdstockTransform {
    base: TransformBase,
    config: AdstockConfig,
    fitted: Option<Vec<String>>,
}

impl AdstockTransform {
    pub const KIND: &'static str = "adstock";

    pub fn new(name: impl Into<String>, decay: f64) -> Self {
        Self {
            base: TransformBase::new(name),
            config: AdstockConfig { decay },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn from_state(state: &TransformState) -> Result<Self> {
        let (base, config, fitted) = TransformBase::restore(state, Self::KIND)?;
        Ok(Self {
            base,
            config,
            fitted,
        })
    }

    fn map_columns(
        &self,
        table: &Table,
        f: impl Fn(&[Option<f64>]) -> Vec<Option<f64>>,
    ) -> Result<Table> {
        let columns = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for name in columns {
            let (_, values) = numeric_or_unsupported(&self.base, table, name)?;
            out.set_column(Column::float(name.clone(), f(&values)))?;
        }
        Ok(out)
    }
}

fn adstock_with_gaps(values: &[Option<f64>], decay: f64) -> Vec<Option<f64>> {
    let dense: Vec<f64> = values.iter().map(|v| v.unwrap_or(0.0)).collect();
    values
        .iter()
        .zip(curves::adstock(&dense, decay))
        .map(|(orig, y)| orig.map(|_| y))
        .collect()
}

/// Inverse of [`adstock_with_gaps`]. A null row still carried `decay * y[i-1]`
/// forward, so the carry is rebuilt through it rather than read as zero.
fn inverse_adstock_with_gaps(adstocked: &[Option<f64>], decay: f64) -> Vec<Option<f64>> {
    let mut carry = 0.0;
    adstocked
        .iter()
        .map(|y| match y {
            Some(y) => {
                let x = y - decay * carry;
                carry = *y;
                Some(x)
            }
            None => {
                carry *= decay;
                None
            }
        })
        .collect()
}

impl Transform for AdstockTransform {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        if !(0.0..1.0).contains(&self.config.decay) {
            return Err(self.base.invalid(format!(
                "decay must be in [0, 1), got {}",
                self.config.decay
            )));
        }
        self.fitted = Some(self.base.select_columns(table, Column::is_numeric)?);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let decay = self.config.decay;
        self.map_columns(table, |x| adstock_with_gaps(x, decay))
    }

    fn inverse_transform(&self, table: &Table) -> Result<Table> {
        let decay = self.config.decay;
        self.map_columns(table, |y| inverse_adstock_with_gaps(y, decay))
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaturationConfig {
    pub vmax: f64,
    pub slope: f64,
    /// Fixed half-saturation point; fitted from the column median when unset.
    pub half_saturation: Option<f64>,
}

/// Hill-curve saturation of spend-like columns.
#[derive(Debug, Clone)]
pub struct SaturationTransform {
    base: TransformBase,
    config: SaturationConfig,
    fitted: Option<BTreeMap<String, f64>>,
}

impl SaturationTransform {
    pub const KIND: &'static str = "saturation";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: SaturationConfig {
                vmax: 1.0,
                slope: 1.0,
                half_saturation: None,
            },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_vmax(mut self, vmax: f64) -> Self {
        self.config.vmax = vmax;
        self
    }

    pub fn with_slope(mut self, slope: f64) -> Self {
        self.config.slope = slope;
        self
    }

    pub fn with_half_saturation(mut self, k: f64) -> Self {
        self.config.half_saturation = Some(k);
        self
    }

    /// Fitted half-saturation point per column.
    pub fn half_saturation(&self, column: &str) -> Option<f64> {
        self.fitted.as_ref()?.get(column).copied()
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

impl Transform for SaturationTransform {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let SaturationConfig {
            vmax,
            slope,
            half_saturation,
        } = self.config;
        if !(vmax > 0.0 && slope > 0.0) {
            return Err(self.base.invalid("vmax and slope must be positive"));
        }
        if matches!(half_saturation, Some(k) if k <= 0.0) {
            return Err(self.base.invalid("half_saturation must be positive"));
        }

        let columns = self.base.select_columns(table, Column::is_numeric)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let k = match half_saturation {
                Some(k) => k,
                None => {
                    let positive: Vec<f64> = self
                        .base
                        .require(table, &name)?
                        .numeric_values()
                        .into_iter()
                        .filter(|v| *v > 0.0)
                        .collect();
                    match stats::median(&positive) {
                        Some(median) => median,
                        None => {
                            self.base.warnings.push(format!(
                                "{}: column '{}' has no positive values, using half-saturation 1.0",
                                self.base.name, name
                            ));
                            1.0
                        }
                    }
                }
            };
            fitted.insert(name, k);
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, k) in fitted {
            let (_, values) = numeric_or_unsupported(&self.base, table, name)?;
            let result = values
                .into_iter()
                .map(|v| v.map(|x| curves::hill(x, self.config.vmax, *k, self.config.slope)))
                .collect();
            out.set_column(Column::float(name.clone(), result))?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    #[test]
    fn test_adstock_transform() {
        let table = Table::new(vec![Column::float(
            "tv",
            vec![Some(100.0), Some(0.0), None, Some(0.0)],
        )])
        .unwrap();
        let mut adstock = AdstockTransform::new("carry", 0.7);
        let out = adstock.fit_transform(&table).unwrap();
        let col = out.column("tv").unwrap();
        assert_eq!(col.get(0), Value::Float(100.0));
        assert!((col.get(1).as_f64().unwrap() - 70.0).abs() < 1e-12);
        assert!(col.is_null(2));
        assert!((col.get(3).as_f64().unwrap() - 34.3).abs() < 1e-9);

        let back = adstock.inverse_transform(&out).unwrap();
        assert!(back.column("tv").unwrap().get(3).as_f64().unwrap().abs() < 1e-9);

        assert!(AdstockTransform::new("bad", 1.0).fit(&table).is_err());
    }

    #[test]
    fn test_adstock_inverse_carries_through_nulls() {
        let table = Table::new(vec![Column::float(
            "radio",
            vec![Some(50.0), None, None, Some(20.0), Some(0.0)],
        )])
        .unwrap();
        let mut adstock = AdstockTransform::new("carry", 0.5);
        let out = adstock.fit_transform(&table).unwrap();
        let col = out.column("radio").unwrap();
        assert!((col.get(3).as_f64().unwrap() - 26.25).abs() < 1e-12);

        let back = adstock.inverse_transform(&out).unwrap();
        let restored = back.column("radio").unwrap();
        assert!((restored.get(0).as_f64().unwrap() - 50.0).abs() < 1e-9);
        assert!(restored.is_null(1) && restored.is_null(2));
        assert!((restored.get(3).as_f64().unwrap() - 20.0).abs() < 1e-9);
        assert!(restored.get(4).as_f64().unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_saturation_half_point_at_median() {
        let table = Table::new(vec![Column::from_f64("spend", vec![10.0, 20.0, 30.0])]).unwrap();
        let mut sat = SaturationTransform::new("sat").with_vmax(2.0);
        let out = sat.fit_transform(&table).unwrap();
        assert_eq!(sat.half_saturation("spend"), Some(20.0));
        assert!((out.column("spend").unwrap().get(1).as_f64().unwrap() - 1.0).abs() < 1e-12);

        let fixed = SaturationTransform::new("sat")
            .with_half_saturation(10.0)
            .fit_transform(&table)
            .unwrap();
        assert!((fixed.column("spend").unwrap().get(0).as_f64().unwrap() - 0.5).abs() < 1e-12);
    }
}
