//! Kind-keyed constructors for restoring persisted transforms.

use std::collections::HashMap;

use super::{
    AdstockTransform, BinaryEncoder, Binner, FrequencyEncoder, Imputer, LabelEncoder,
    LogTransform, MinMaxScaler, OneHotEncoder, Result, RobustScaler, SaturationTransform,
    StandardScaler, TargetEncoder, Transform, TransformPipeline, TransformState, Winsorizer,
};
use crate::error::TransformError;

/// Builds a boxed transform from its persisted state.
pub type RestoreFn = fn(&TransformState) -> Result<Box<dyn Transform>>;

/// Maps a transform `kind` to the function that restores it.
pub struct TransformRegistry {
    constructors: HashMap<String, RestoreFn>,
}

fn boxed<T: Transform + 'static>(t: Result<T>) -> Result<Box<dyn Transform>> {
    t.map(|t| Box::new(t) as Box<dyn Transform>)
}

impl TransformRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Creates a registry with every transform shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(StandardScaler::KIND, |s| boxed(StandardScaler::from_state(s)));
        registry.register(MinMaxScaler::KIND, |s| boxed(MinMaxScaler::from_state(s)));
        registry.register(RobustScaler::KIND, |s| boxed(RobustScaler::from_state(s)));
        registry.register(LogTransform::KIND, |s| boxed(LogTransform::from_state(s)));
        registry.register(Winsorizer::KIND, |s| boxed(Winsorizer::from_state(s)));
        registry.register(Binner::KIND, |s| boxed(Binner::from_state(s)));
        registry.register(LabelEncoder::KIND, |s| boxed(LabelEncoder::from_state(s)));
        registry.register(OneHotEncoder::KIND, |s| boxed(OneHotEncoder::from_state(s)));
        registry.register(FrequencyEncoder::KIND, |s| boxed(FrequencyEncoder::from_state(s)));
        registry.register(TargetEncoder::KIND, |s| boxed(TargetEncoder::from_state(s)));
        registry.register(BinaryEncoder::KIND, |s| boxed(BinaryEncoder::from_state(s)));
        registry.register(Imputer::KIND, |s| boxed(Imputer::from_state(s)));
        registry.register(AdstockTransform::KIND, |s| boxed(AdstockTransform::from_state(s)));
        registry.register(SaturationTransform::KIND, |s| {
            boxed(SaturationTransform::from_state(s))
        });
        registry
    }

    /// Registers a constructor, replacing any previous one for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, restore: RestoreFn) {
        self.constructors.insert(kind.into(), restore);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn restore(&self, state: &TransformState) -> Result<Box<dyn Transform>> {
        let restore = self
            .constructors
            .get(&state.kind)
            .ok_or_else(|| TransformError::UnknownKind(state.kind.clone()))?;
        restore(state)
    }

    pub fn restore_pipeline(
        &self,
        name: impl Into<String>,
        states: &[TransformState],
    ) -> Result<TransformPipeline> {
        let mut pipeline = TransformPipeline::new(name);
        for state in states {
            pipeline.push(self.restore(state)?);
        }
        Ok(pipeline)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Table};

    #[test]
    fn test_builtins_cover_every_kind() {
        let registry = TransformRegistry::with_builtins();
        assert_eq!(registry.kinds().len(), 14);
        assert!(registry.contains("adstock"));
        assert!(registry.contains("imputer"));
    }

    #[test]
    fn test_restore_fitted_scaler() {
        let table = Table::new(vec![Column::from_f64("x", vec![1.0, 2.0, 3.0])]).unwrap();
        let mut scaler = StandardScaler::new("scale");
        let expected = scaler.fit_transform(&table).unwrap();

        let restored = TransformRegistry::with_builtins()
            .restore(&scaler.to_state().unwrap())
            .unwrap();
        assert!(restored.is_fitted());
        assert_eq!(restored.kind(), "standard_scaler");
        assert_eq!(restored.transform(&table).unwrap(), expected);
    }

    #[test]
    fn test_unknown_kind() {
        let state = TransformState {
            name: "x".to_string(),
            kind: "pca".to_string(),
            columns: None,
            fitted: false,
            params: serde_json::Value::Null,
        };
        assert!(matches!(
            TransformRegistry::new().restore(&state),
            Err(TransformError::UnknownKind(k)) if k == "pca"
        ));
    }
}
