//! Stateful, reversible table transforms.
//!
//! Every transform follows the same contract:
//!
//! - [`Transform::fit`] learns parameters from a table; calling it again
//!   re-learns from the new data.
//! - [`Transform::transform`] is a pure function of the fitted parameters and
//!   fails with [`TransformError::NotFitted`] before `fit`.
//! - [`Transform::inverse_transform`] undoes the transform where that is
//!   possible (scalers, log, label and adstock).
//!
//! Columns with a type a transform cannot handle are skipped during `fit` and
//! reported through [`Transform::warnings`] instead of failing the fit.
//!
//! Fitted state round-trips through [`TransformState`], a plain
//! serde-serializable structure; [`TransformRegistry`] turns a state back into
//! a boxed transform by its `kind`.
//!
//! # Example
//!
//! ```rust,ignore
//! use trainset_forge::transform::{StandardScaler, Transform, TransformPipeline, LogTransform};
//!
//! let mut pipeline = TransformPipeline::new("features")
//!     .add(LogTransform::new("log_spend").with_columns(["spend"]))
//!     .add(StandardScaler::new("scale"));
//! let out = pipeline.fit_transform(&table)?;
//! for step in pipeline.history() {
//!     println!("{} took {:?}", step.name, step.elapsed);
//! }
//! ```

pub mod categorical;
pub mod impute;
pub mod media;
pub mod numeric;
pub mod pipeline;
pub mod registry;

pub use categorical::{BinaryEncoder, FrequencyEncoder, LabelEncoder, OneHotEncoder, TargetEncoder};
pub use impute::{ImputeStrategy, Imputer};
pub use media::{AdstockTransform, SaturationTransform};
pub use numeric::{
    BinStrategy, Binner, LogBase, LogTransform, MinMaxScaler, RobustScaler, StandardScaler,
    Winsorizer,
};
pub use pipeline::{StepRecord, TransformPipeline};
pub use registry::TransformRegistry;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::TransformError;
use crate::table::{Column, Table};

/// Result type alias for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// A fit/apply/invert transform over a table.
pub trait Transform: std::fmt::Debug + Send {
    fn name(&self) -> &str;

    /// Registry key of the concrete transform type.
    fn kind(&self) -> &'static str;

    /// Explicit column subset, `None` meaning every compatible column.
    fn columns(&self) -> Option<&[String]>;

    fn is_fitted(&self) -> bool;

    fn fit(&mut self, table: &Table) -> Result<()>;

    fn transform(&self, table: &Table) -> Result<Table>;

    fn inverse_transform(&self, _table: &Table) -> Result<Table> {
        Err(TransformError::NotInvertible(self.name().to_string()))
    }

    fn fit_transform(&mut self, table: &Table) -> Result<Table> {
        self.fit(table)?;
        self.transform(table)
    }

    /// Warnings collected during the last `fit`.
    fn warnings(&self) -> &[String] {
        &[]
    }

    /// Serializable snapshot of configuration and fitted parameters.
    fn to_state(&self) -> Result<TransformState>;
}

/// Persisted form of a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    pub name: String,
    pub kind: String,
    pub columns: Option<Vec<String>>,
    pub fitted: bool,
    /// `{"config": ..., "fitted": ...}` for the concrete kind.
    pub params: serde_json::Value,
}

impl TransformState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Name, column selection and fit warnings shared by every transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformBase {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub warnings: Vec<String>,
}

impl TransformBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: None,
            warnings: Vec::new(),
        }
    }

    /// Resolves the columns to fit on.
    ///
    /// Explicit columns must exist; those rejected by `accepts` are skipped with
    /// a warning. Without an explicit subset every accepted column is used.
    pub fn select_columns(
        &mut self,
        table: &Table,
        accepts: impl Fn(&Column) -> bool,
    ) -> Result<Vec<String>> {
        self.warnings.clear();
        let Some(explicit) = &self.columns else {
            return Ok(table
                .columns()
                .iter()
                .filter(|c| accepts(c))
                .map(|c| c.name.clone())
                .collect());
        };

        let mut selected = Vec::with_capacity(explicit.len());
        for name in explicit {
            let col = table.column(name).ok_or_else(|| TransformError::MissingColumn {
                transform: self.name.clone(),
                column: name.clone(),
            })?;
            if accepts(col) {
                selected.push(name.clone());
            } else {
                let message = format!(
                    "{}: skipped column '{}' with unsupported type {}",
                    self.name,
                    name,
                    col.dtype()
                );
                warn!(transform = %self.name, column = %name, dtype = %col.dtype(), "Skipping unsupported column");
                self.warnings.push(message);
            }
        }
        Ok(selected)
    }

    pub fn require<'t>(&self, table: &'t Table, column: &str) -> Result<&'t Column> {
        table.column(column).ok_or_else(|| TransformError::MissingColumn {
            transform: self.name.clone(),
            column: column.to_string(),
        })
    }

    pub fn not_fitted(&self) -> TransformError {
        TransformError::NotFitted(self.name.clone())
    }

    pub fn invalid(&self, reason: impl Into<String>) -> TransformError {
        TransformError::InvalidParameter {
            transform: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Packs configuration and fitted parameters into a [`TransformState`].
    pub fn state<C: Serialize, F: Serialize>(
        &self,
        kind: &str,
        config: &C,
        fitted: &Option<F>,
    ) -> Result<TransformState> {
        Ok(TransformState {
            name: self.name.clone(),
            kind: kind.to_string(),
            columns: self.columns.clone(),
            fitted: fitted.is_some(),
            params: json!({
                "config": serde_json::to_value(config)?,
                "fitted": serde_json::to_value(fitted)?,
            }),
        })
    }

    /// Unpacks a [`TransformState`] produced by [`TransformBase::state`].
    pub fn restore<C: DeserializeOwned, F: DeserializeOwned>(
        state: &TransformState,
        kind: &str,
    ) -> Result<(Self, C, Option<F>)> {
        if state.kind != kind {
            return Err(TransformError::UnknownKind(format!(
                "expected '{}', got '{}'",
                kind, state.kind
            )));
        }
        let config = serde_json::from_value(state.params["config"].clone())?;
        let fitted: Option<F> = if state.fitted {
            serde_json::from_value(state.params["fitted"].clone())?
        } else {
            None
        };
        let base = Self {
            name: state.name.clone(),
            columns: state.columns.clone(),
            warnings: Vec::new(),
        };
        Ok((base, config, fitted))
    }
}

/// Replaces each non-null value of a numeric column, producing a float column.
pub(crate) fn map_numeric(col: &Column, f: impl Fn(f64) -> f64) -> Column {
    let values = col
        .to_f64()
        .unwrap_or_else(|| vec![None; col.len()])
        .into_iter()
        .map(|v| v.map(&f))
        .collect();
    Column::float(col.name.clone(), values)
}

/// Builder shared by every transform: `with_columns`.
macro_rules! transform_builder {
    () => {
        /// Restricts the transform to the given columns.
        pub fn with_columns<I, S>(mut self, columns: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.base.columns = Some(columns.into_iter().map(Into::into).collect());
            self
        }
    };
}
pub(crate) use transform_builder;

/// [`Transform`] accessors for types holding a `base: TransformBase`, an
/// optional `fitted` state and a `KIND` constant.
macro_rules! transform_accessors {
    () => {
        fn name(&self) -> &str {
            &self.base.name
        }

        fn kind(&self) -> &'static str {
            Self::KIND
        }

        fn columns(&self) -> Option<&[String]> {
            self.base.columns.as_deref()
        }

        fn is_fitted(&self) -> bool {
            self.fitted.is_some()
        }

        fn warnings(&self) -> &[String] {
            &self.base.warnings
        }
    };
}
pub(crate) use transform_accessors;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_columns_warns_on_unsupported() {
        let table = Table::new(vec![
            Column::from_f64("spend", vec![1.0, 2.0]),
            Column::from_strs("channel", &["tv", "radio"]),
        ])
        .unwrap();

        let mut base = TransformBase::new("scale");
        let all = base.select_columns(&table, Column::is_numeric).unwrap();
        assert_eq!(all, vec!["spend"]);
        assert!(base.warnings.is_empty());

        base.columns = Some(vec!["spend".to_string(), "channel".to_string()]);
        let explicit = base.select_columns(&table, Column::is_numeric).unwrap();
        assert_eq!(explicit, vec!["spend"]);
        assert_eq!(base.warnings.len(), 1);
        assert!(base.warnings[0].contains("channel"));

        base.columns = Some(vec!["missing".to_string()]);
        assert!(matches!(
            base.select_columns(&table, Column::is_numeric),
            Err(TransformError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_accessors_report_identity_and_fit_state() {
        let table = Table::new(vec![
            Column::from_f64("spend", vec![1.0, 4.0, 9.0]),
            Column::from_strs("channel", &["tv", "radio", "tv"]),
        ])
        .unwrap();
        let mut transforms: Vec<Box<dyn Transform>> = vec![
            Box::new(StandardScaler::new("std")),
            Box::new(Binner::new("bins", 2, BinStrategy::Uniform)),
            Box::new(BinaryEncoder::new("bin").with_columns(["channel", "spend"])),
            Box::new(Imputer::new("fill", ImputeStrategy::Median)),
            Box::new(AdstockTransform::new("carry", 0.5)),
        ];
        for t in &mut transforms {
            assert!(!t.is_fitted());
            t.fit(&table).unwrap();
            assert!(t.is_fitted(), "{} should be fitted", t.name());
            assert_eq!(t.to_state().unwrap().kind, t.kind());
        }
        assert_eq!(transforms[0].kind(), StandardScaler::KIND);
        assert_eq!(transforms[2].name(), "bin");
        assert_eq!(
            transforms[2].columns(),
            Some(&["channel".to_string(), "spend".to_string()][..])
        );
        assert_eq!(transforms[2].warnings().len(), 1);
    }

    #[test]
    fn test_state_json_round_trip() {
        let base = TransformBase::new("x");
        let state = base
            .state("standard_scaler", &json!({"with_mean": true}), &Some(json!({"a": 1})))
            .unwrap();
        let parsed = TransformState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(parsed, state);
        assert!(parsed.fitted);

        let restored: Result<(TransformBase, serde_json::Value, Option<serde_json::Value>)> =
            TransformBase::restore(&parsed, "minmax_scaler");
        assert!(matches!(restored, Err(TransformError::UnknownKind(_))));
    }
}
