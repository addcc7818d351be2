//! Typed, nullable columns.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::value::{DataType, Value};

/// Storage for a column's cells, one vector per type family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum ColumnData {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
    DateTime(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Int(_) => DataType::Int,
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::Str(_) => DataType::Str,
            ColumnData::DateTime(_) => DataType::DateTime,
        }
    }

    /// An empty vector of the given type family.
    pub fn empty(dtype: DataType) -> Self {
        match dtype {
            DataType::Float => ColumnData::Float(Vec::new()),
            DataType::Int => ColumnData::Int(Vec::new()),
            DataType::Bool => ColumnData::Bool(Vec::new()),
            DataType::Str => ColumnData::Str(Vec::new()),
            DataType::DateTime => ColumnData::DateTime(Vec::new()),
        }
    }

    /// Build a column from loose values, inferring the narrowest common type.
    ///
    /// Mixed int/float widens to float; any other mix falls back to strings.
    pub fn from_values(values: &[Value]) -> Self {
        let mut dtype: Option<DataType> = None;
        for v in values {
            let Some(t) = v.dtype() else { continue };
            dtype = Some(match dtype {
                None => t,
                Some(cur) if cur == t => cur,
                Some(cur) if cur.is_numeric() && t.is_numeric() => DataType::Float,
                Some(_) => DataType::Str,
            });
        }

        match dtype.unwrap_or(DataType::Float) {
            DataType::Float => ColumnData::Float(values.iter().map(Value::as_f64).collect()),
            DataType::Int => ColumnData::Int(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect(),
            ),
            DataType::Bool => ColumnData::Bool(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect(),
            ),
            DataType::DateTime => ColumnData::DateTime(
                values
                    .iter()
                    .map(|v| match v {
                        Value::DateTime(d) => Some(*d),
                        _ => None,
                    })
                    .collect(),
            ),
            DataType::Str => ColumnData::Str(
                values
                    .iter()
                    .map(|v| if v.is_null() { None } else { Some(v.to_string()) })
                    .collect(),
            ),
        }
    }

    fn get(&self, index: usize) -> Value {
        match self {
            ColumnData::Float(v) => v.get(index).copied().flatten().map_or(Value::Null, Value::Float),
            ColumnData::Int(v) => v.get(index).copied().flatten().map_or(Value::Null, Value::Int),
            ColumnData::Bool(v) => v.get(index).copied().flatten().map_or(Value::Null, Value::Bool),
            ColumnData::Str(v) => v
                .get(index)
                .cloned()
                .flatten()
                .map_or(Value::Null, Value::Str),
            ColumnData::DateTime(v) => v
                .get(index)
                .copied()
                .flatten()
                .map_or(Value::Null, Value::DateTime),
        }
    }

    fn is_null_at(&self, index: usize) -> bool {
        match self {
            ColumnData::Float(v) => v.get(index).is_none_or(|x| x.is_none()),
            ColumnData::Int(v) => v.get(index).is_none_or(|x| x.is_none()),
            ColumnData::Bool(v) => v.get(index).is_none_or(|x| x.is_none()),
            ColumnData::Str(v) => v.get(index).is_none_or(|x| x.is_none()),
            ColumnData::DateTime(v) => v.get(index).is_none_or(|x| x.is_none()),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|&i| v.get(i).cloned().flatten())
                .collect()
        }
        match self {
            ColumnData::Float(v) => ColumnData::Float(pick(v, indices)),
            ColumnData::Int(v) => ColumnData::Int(pick(v, indices)),
            ColumnData::Bool(v) => ColumnData::Bool(pick(v, indices)),
            ColumnData::Str(v) => ColumnData::Str(pick(v, indices)),
            ColumnData::DateTime(v) => ColumnData::DateTime(pick(v, indices)),
        }
    }

    /// Append another vector of the same family. Returns false on type mismatch.
    fn extend_from(&mut self, other: &ColumnData) -> bool {
        match (self, other) {
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend_from_slice(b),
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend_from_slice(b),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend_from_slice(b),
            (ColumnData::Str(a), ColumnData::Str(b)) => a.extend_from_slice(b),
            (ColumnData::DateTime(a), ColumnData::DateTime(b)) => a.extend_from_slice(b),
            (ColumnData::Float(a), ColumnData::Int(b)) => {
                a.extend(b.iter().map(|x| x.map(|i| i as f64)))
            }
            _ => return false,
        }
        true
    }
}

/// A named column of typed, nullable cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Float column from non-null values.
    pub fn from_f64(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnData::Float(values.into_iter().map(Some).collect()))
    }

    /// Float column with nulls.
    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Float(values))
    }

    pub fn from_i64(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(name, ColumnData::Int(values.into_iter().map(Some).collect()))
    }

    pub fn int(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnData::Int(values))
    }

    pub fn from_bools(name: impl Into<String>, values: Vec<bool>) -> Self {
        Self::new(name, ColumnData::Bool(values.into_iter().map(Some).collect()))
    }

    /// String column from non-null values.
    pub fn from_strs<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        Self::new(
            name,
            ColumnData::Str(values.iter().map(|s| Some(s.as_ref().to_string())).collect()),
        )
    }

    pub fn str(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Str(values))
    }

    pub fn datetime(name: impl Into<String>, values: Vec<Option<NaiveDateTime>>) -> Self {
        Self::new(name, ColumnData::DateTime(values))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn is_numeric(&self) -> bool {
        self.dtype().is_numeric()
    }

    /// Cell at `index`; out-of-range indices read as null.
    pub fn get(&self, index: usize) -> Value {
        self.data.get(index)
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.data.is_null_at(index)
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    /// All cells as loose values.
    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Numeric cells with nulls preserved, or `None` for non-numeric columns.
    pub fn to_f64(&self) -> Option<Vec<Option<f64>>> {
        match &self.data {
            ColumnData::Float(v) => Some(v.clone()),
            ColumnData::Int(v) => Some(v.iter().map(|x| x.map(|i| i as f64)).collect()),
            ColumnData::Bool(v) => Some(
                v.iter()
                    .map(|x| x.map(|b| if b { 1.0 } else { 0.0 }))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Non-null numeric values (empty for non-numeric columns).
    pub fn numeric_values(&self) -> Vec<f64> {
        if !self.is_numeric() {
            return Vec::new();
        }
        self.to_f64()
            .map(|v| v.into_iter().flatten().filter(|x| x.is_finite()).collect())
            .unwrap_or_default()
    }

    /// String view of every cell; nulls stay `None`.
    pub fn to_strings(&self) -> Vec<Option<String>> {
        (0..self.len())
            .map(|i| {
                let v = self.get(i);
                if v.is_null() {
                    None
                } else {
                    Some(v.to_string())
                }
            })
            .collect()
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        Self::new(self.name.clone(), self.data.take(indices))
    }

    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let end = offset.saturating_add(len).min(self.len());
        let indices: Vec<usize> = (offset.min(end)..end).collect();
        self.take(&indices)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn extend_from(&mut self, other: &Column) -> bool {
        self.data.extend_from(&other.data)
    }

    /// Approximate in-memory size in bytes.
    pub fn memory_bytes(&self) -> usize {
        match &self.data {
            ColumnData::Float(v) => v.len() * 8,
            ColumnData::Int(v) => v.len() * 8,
            ColumnData::Bool(v) => v.len(),
            ColumnData::DateTime(v) => v.len() * 12,
            ColumnData::Str(v) => v
                .iter()
                .map(|s| 24 + s.as_ref().map_or(0, |s| s.len()))
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_widens_numeric() {
        let data = ColumnData::from_values(&[Value::Int(1), Value::Float(2.5), Value::Null]);
        assert_eq!(data, ColumnData::Float(vec![Some(1.0), Some(2.5), None]));
    }

    #[test]
    fn test_from_values_mixed_falls_back_to_str() {
        let data = ColumnData::from_values(&[Value::Int(1), Value::from("a")]);
        assert_eq!(
            data,
            ColumnData::Str(vec![Some("1".to_string()), Some("a".to_string())])
        );
    }

    #[test]
    fn test_null_count_and_numeric_values() {
        let col = Column::float("x", vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(col.null_count(), 1);
        assert_eq!(col.numeric_values(), vec![1.0, 3.0]);
        assert!(col.get(1).is_null());
        assert!(col.get(10).is_null());
    }

    #[test]
    fn test_take_and_slice() {
        let col = Column::from_i64("n", vec![10, 20, 30, 40]);
        assert_eq!(col.take(&[3, 0]).values(), vec![Value::Int(40), Value::Int(10)]);
        assert_eq!(col.slice(1, 2).values(), vec![Value::Int(20), Value::Int(30)]);
        assert!(col.slice(10, 2).is_empty());
    }
}
