//! Numeric scalers, log transform, winsorization and binning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{map_numeric, transform_accessors, transform_builder, Result, Transform, TransformBase, TransformState};
use crate::error::TransformError;
use crate::table::{stats, Column, Table};

/// Floor applied to log arguments so the output stays finite.
pub const LOG_EPSILON: f64 = 1e-10;

/// Per-column centre and scale: `z = (x - center) / scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub center: f64,
    pub scale: f64,
}

fn apply_columns<P>(
    base: &TransformBase,
    table: &Table,
    fitted: &BTreeMap<String, P>,
    f: impl Fn(f64, &P) -> f64,
) -> Result<Table> {
    let mut out = table.clone();
    for (name, params) in fitted {
        let col = base.require(table, name)?;
        if !col.is_numeric() {
            return Err(TransformError::UnsupportedType {
                transform: base.name.clone(),
                column: name.clone(),
                dtype: col.dtype().to_string(),
            });
        }
        out.set_column(map_numeric(col, |x| f(x, params)))?;
    }
    Ok(out)
}

fn nonzero(scale: Option<f64>) -> f64 {
    match scale {
        Some(s) if s != 0.0 && s.is_finite() => s,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScalerConfig {
    pub with_mean: bool,
    pub with_std: bool,
}

/// Standardization `z = (x - mean) / std` with sample std; zero std scales by 1.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    base: TransformBase,
    config: StandardScalerConfig,
    fitted: Option<BTreeMap<String, ScaleParams>>,
}

impl StandardScaler {
    pub const KIND: &'static str = "standard_scaler";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: StandardScalerConfig {
                with_mean: true,
                with_std: true,
            },
            fitted: None,
        }
    }

    transform_builder!();

    /// Disables centring when `false`.
    pub fn with_mean(mut self, enabled: bool) -> Self {
        self.config.with_mean = enabled;
        self
    }

    /// Disables scaling when `false`.
    pub fn with_std(mut self, enabled: bool) -> Self {
        self.config.with_std = enabled;
        self
    }

    pub fn params(&self) -> Option<&BTreeMap<String, ScaleParams>> {
        self.fitted.as_ref()
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

impl Transform for StandardScaler {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let columns = self.base.select_columns(table, Column::is_numeric)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let values = self.base.require(table, &name)?.numeric_values();
            let center = if self.config.with_mean {
                stats::mean(&values).unwrap_or(0.0)
            } else {
                0.0
            };
            let scale = if self.config.with_std {
                nonzero(stats::std_dev(&values))
            } else {
                1.0
            };
            fitted.insert(name, ScaleParams { center, scale });
        }
        debug!(transform = %self.base.name, columns = fitted.len(), "Fitted standard scaler");
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        apply_columns(&self.base, table, fitted, |x, p| (x - p.center) / p.scale)
    }

    fn inverse_transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        apply_columns(&self.base, table, fitted, |z, p| z * p.scale + p.center)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxConfig {
    pub feature_range: (f64, f64),
}

/// Observed per-column bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// Rescales each column to `feature_range`; a zero-range column maps to the lower bound.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    base: TransformBase,
    config: MinMaxConfig,
    fitted: Option<BTreeMap<String, Bounds>>,
}

impl MinMaxScaler {
    pub const KIND: &'static str = "minmax_scaler";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: MinMaxConfig {
                feature_range: (0.0, 1.0),
            },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_feature_range(mut self, lower: f64, upper: f64) -> Self {
        self.config.feature_range = (lower, upper);
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

impl Transform for MinMaxScaler {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let (lower, upper) = self.config.feature_range;
        if !(lower < upper) {
            return Err(self.base.invalid(format!(
                "feature_range lower {} must be below upper {}",
                lower, upper
            )));
        }
        let columns = self.base.select_columns(table, Column::is_numeric)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let values = self.base.require(table, &name)?.numeric_values();
            fitted.insert(
                name,
                Bounds {
                    min: stats::min(&values).unwrap_or(0.0),
                    max: stats::max(&values).unwrap_or(0.0),
                },
            );
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let (lower, upper) = self.config.feature_range;
        apply_columns(&self.base, table, fitted, |x, b| {
            let range = b.max - b.min;
            if range == 0.0 {
                lower
            } else {
                lower + (x - b.min) / range * (upper - lower)
            }
        })
    }

    fn inverse_transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let (lower, upper) = self.config.feature_range;
        apply_columns(&self.base, table, fitted, |y, b| {
            b.min + (y - lower) / (upper - lower) * (b.max - b.min)
        })
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustConfig {
    /// Percentile pair used for the scale, e.g. `(25.0, 75.0)`.
    pub quantile_range: (f64, f64),
    pub with_centering: bool,
    pub with_scaling: bool,
}

/// Centres on the median and scales by an inter-quantile range.
#[derive(Debug, Clone)]
pub struct RobustScaler {
    base: TransformBase,
    config: RobustConfig,
    fitted: Option<BTreeMap<String, ScaleParams>>,
}

impl RobustScaler {
    pub const KIND: &'static str = "robust_scaler";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: RobustConfig {
                quantile_range: (25.0, 75.0),
                with_centering: true,
                with_scaling: true,
            },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_quantile_range(mut self, lower: f64, upper: f64) -> Self {
        self.config.quantile_range = (lower, upper);
        self
    }

    pub fn with_centering(mut self, enabled: bool) -> Self {
        self.config.with_centering = enabled;
        self
    }

    pub fn with_scaling(mut self, enabled: bool) -> Self {
        self.config.with_scaling = enabled;
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

impl Transform for RobustScaler {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let (q_lo, q_hi) = self.config.quantile_range;
        if !(0.0 <= q_lo && q_lo < q_hi && q_hi <= 100.0) {
            return Err(self.base.invalid(format!(
                "quantile_range must satisfy 0 <= lower < upper <= 100, got ({}, {})",
                q_lo, q_hi
            )));
        }
        let columns = self.base.select_columns(table, Column::is_numeric)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let sorted = stats::sorted(&self.base.require(table, &name)?.numeric_values());
            let center = if self.config.with_centering {
                stats::quantile_sorted(&sorted, 0.5).unwrap_or(0.0)
            } else {
                0.0
            };
            let scale = if self.config.with_scaling {
                let lo = stats::quantile_sorted(&sorted, q_lo / 100.0);
                let hi = stats::quantile_sorted(&sorted, q_hi / 100.0);
                nonzero(lo.zip(hi).map(|(lo, hi)| hi - lo))
            } else {
                1.0
            };
            fitted.insert(name, ScaleParams { center, scale });
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        apply_columns(&self.base, table, fitted, |x, p| (x - p.center) / p.scale)
    }

    fn inverse_transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        apply_columns(&self.base, table, fitted, |z, p| z * p.scale + p.center)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

/// Logarithm base for [`LogTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBase {
    #[default]
    E,
    Ten,
    Two,
}

impl LogBase {
    fn log(self, x: f64) -> f64 {
        match self {
            LogBase::E => x.ln(),
            LogBase::Ten => x.log10(),
            LogBase::Two => x.log2(),
        }
    }

    fn exp(self, y: f64) -> f64 {
        match self {
            LogBase::E => y.exp(),
            LogBase::Ten => 10f64.powf(y),
            LogBase::Two => y.exp2(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    pub offset: f64,
    pub base: LogBase,
}

/// `log_base(max(x + offset, 1e-10))`.
#[derive(Debug, Clone)]
pub struct LogTransform {
    base: TransformBase,
    config: LogConfig,
    fitted: Option<Vec<String>>,
}

impl LogTransform {
    pub const KIND: &'static str = "log_transform";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: LogConfig {
                offset: 1.0,
                base: LogBase::E,
            },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.config.offset = offset;
        self
    }

    pub fn with_base(mut self, base: LogBase) -> Self {
        self.config.base = base;
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

    fn fitted_map(&self) -> Result<BTreeMap<String, ()>> {
        let columns = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        Ok(columns.iter().map(|c| (c.clone(), ())).collect())
    }
}

impl Transform for LogTransform {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        if !self.config.offset.is_finite() {
            return Err(self.base.invalid("offset must be finite"));
        }
        self.fitted = Some(self.base.select_columns(table, Column::is_numeric)?);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let LogConfig { offset, base } = self.config;
        apply_columns(&self.base, table, &self.fitted_map()?, |x, _| {
            base.log((x + offset).max(LOG_EPSILON))
        })
    }

    fn inverse_transform(&self, table: &Table) -> Result<Table> {
        let LogConfig { offset, base } = self.config;
        apply_columns(&self.base, table, &self.fitted_map()?, |y, _| {
            base.exp(y) - offset
        })
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinsorConfig {
    /// Lower clipping quantile in `[0, 1]`.
    pub lower: f64,
    /// Upper clipping quantile in `[0, 1]`.
    pub upper: f64,
}

/// Clips values to fitted lower/upper quantiles.
#[derive(Debug, Clone)]
pub struct Winsorizer {
    base: TransformBase,
    config: WinsorConfig,
    fitted: Option<BTreeMap<String, Bounds>>,
}

impl Winsorizer {
    pub const KIND: &'static str = "winsorizer";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformBase::new(name),
            config: WinsorConfig {
                lower: 0.05,
                upper: 0.95,
            },
            fitted: None,
        }
    }

    transform_builder!();

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.config = WinsorConfig { lower, upper };
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

impl Transform for Winsorizer {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        let WinsorConfig { lower, upper } = self.config;
        if !(0.0 <= lower && lower < upper && upper <= 1.0) {
            return Err(self.base.invalid(format!(
                "limits must satisfy 0 <= lower < upper <= 1, got ({}, {})",
                lower, upper
            )));
        }
        let columns = self.base.select_columns(table, Column::is_numeric)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let sorted = stats::sorted(&self.base.require(table, &name)?.numeric_values());
            if let (Some(min), Some(max)) = (
                stats::quantile_sorted(&sorted, lower),
                stats::quantile_sorted(&sorted, upper),
            ) {
                fitted.insert(name, Bounds { min, max });
            }
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        apply_columns(&self.base, table, fitted, |x, b| x.clamp(b.min, b.max))
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}

/// How [`Binner`] places bin edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinStrategy {
    /// Equal-frequency bins.
    #[default]
    Quantile,
    /// Equal-width bins.
    Uniform,
    /// Edges halfway between 1-D k-means centres.
    KMeans,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinConfig {
    pub n_bins: usize,
    pub strategy: BinStrategy,
}

/// Discretizes numeric columns into integer bin indices.
///
/// Duplicate edges are collapsed, so a column can end up with fewer bins
/// than requested.
#[derive(Debug, Clone)]
pub struct Binner {
    base: TransformBase,
    config: BinConfig,
    fitted: Option<BTreeMap<String, Vec<f64>>>,
}

impl Binner {
    pub const KIND: &'static str = "binner";

    pub fn new(name: impl Into<String>, n_bins: usize, strategy: BinStrategy) -> Self {
        Self {
            base: TransformBase::new(name),
            config: BinConfig { n_bins, strategy },
            fitted: None,
        }
    }

    transform_builder!();

    /// Fitted edges per column, including both outer edges.
    pub fn edges(&self) -> Option<&BTreeMap<String, Vec<f64>>> {
        self.fitted.as_ref()
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

fn uniform_edges(sorted: &[f64], n_bins: usize) -> Vec<f64> {
    match (sorted.first(), sorted.last()) {
        (Some(&lo), Some(&hi)) => stats::linspace(lo, hi, n_bins),
        _ => Vec::new(),
    }
}

fn quantile_edges(sorted: &[f64], n_bins: usize) -> Vec<f64> {
    (0..=n_bins)
        .filter_map(|i| stats::quantile_sorted(sorted, i as f64 / n_bins as f64))
        .collect()
}

fn kmeans_edges(sorted: &[f64], n_bins: usize) -> Vec<f64> {
    let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    // Centres start at the midpoints of a uniform grid.
    let grid = stats::linspace(lo, hi, n_bins);
    let mut centers: Vec<f64> = grid.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();

    for _ in 0..100 {
        let mut sums = vec![0.0; centers.len()];
        let mut counts = vec![0usize; centers.len()];
        for &x in sorted {
            let nearest = centers
                .iter()
                .enumerate()
                .min_by(|a, b| (x - a.1).abs().total_cmp(&(x - b.1).abs()))
                .map(|(i, _)| i)
                .unwrap_or(0);
            sums[nearest] += x;
            counts[nearest] += 1;
        }
        let updated: Vec<f64> = centers
            .iter()
            .enumerate()
            .map(|(i, c)| if counts[i] > 0 { sums[i] / counts[i] as f64 } else { *c })
            .collect();
        let shift = updated
            .iter()
            .zip(&centers)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        centers = updated;
        if shift < 1e-9 {
            break;
        }
    }

    centers.sort_by(f64::total_cmp);
    let mut edges = vec![lo];
    edges.extend(centers.windows(2).map(|w| (w[0] + w[1]) / 2.0));
    edges.push(hi);
    edges
}

fn dedup_edges(mut edges: Vec<f64>) -> Vec<f64> {
    edges.sort_by(f64::total_cmp);
    edges.dedup_by(|a, b| (*a - *b).abs() <= 1e-12 * b.abs().max(1.0));
    edges
}

/// Index of the bin containing `x`; outer bins absorb out-of-range values.
fn bin_index(edges: &[f64], x: f64) -> i64 {
    if edges.len() < 2 {
        return 0;
    }
    let inner = &edges[1..edges.len() - 1];
    inner.partition_point(|e| *e <= x) as i64
}

impl Transform for Binner {
    transform_accessors!();

    fn fit(&mut self, table: &Table) -> Result<()> {
        if self.config.n_bins < 1 {
            return Err(self.base.invalid("n_bins must be at least 1"));
        }
        let columns = self.base.select_columns(table, Column::is_numeric)?;
        let mut fitted = BTreeMap::new();
        for name in columns {
            let sorted = stats::sorted(&self.base.require(table, &name)?.numeric_values());
            let edges = match self.config.strategy {
                BinStrategy::Uniform => uniform_edges(&sorted, self.config.n_bins),
                BinStrategy::Quantile => quantile_edges(&sorted, self.config.n_bins),
                BinStrategy::KMeans => kmeans_edges(&sorted, self.config.n_bins),
            };
            let edges = dedup_edges(edges);
            if edges.len() > 1 && edges.len() - 1 < self.config.n_bins {
                debug!(column = %name, bins = edges.len() - 1, "Collapsed duplicate bin edges");
            }
            fitted.insert(name, edges);
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or_else(|| self.base.not_fitted())?;
        let mut out = table.clone();
        for (name, edges) in fitted {
            let col = self.base.require(table, name)?;
            let values = col.to_f64().ok_or_else(|| TransformError::UnsupportedType {
                transform: self.base.name.clone(),
                column: name.clone(),
                dtype: col.dtype().to_string(),
            })?;
            let bins = values
                .into_iter()
                .map(|v| v.map(|x| bin_index(edges, x)))
                .collect();
            out.set_column(Column::int(name.clone(), bins))?;
        }
        Ok(out)
    }

    fn to_state(&self) -> Result<TransformState> {
        self.base.state(Self::KIND, &self.config, &self.fitted)
    }
}
