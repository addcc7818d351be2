//! In-memory tabular data.
//!
//! A [`Table`] is an ordered set of equally long, uniquely named [`Column`]s.
//! It is the unit of data exchanged between connectors, validators,
//! transforms, the profiler and the synthetic generators.
//!
//! # Example
//!
//! ```rust,ignore
//! use trainset_forge::table::{Column, Table};
//!
//! let table = Table::new(vec![
//!     Column::from_strs("channel", &["tv", "search"]),
//!     Column::from_f64("spend", vec![1200.0, 340.0]),
//! ])?;
//! assert_eq!(table.n_rows(), 2);
//! ```

pub mod column;
pub mod stats;
pub mod value;

pub use column::{Column, ColumnData};
pub use value::{DataType, Value, ValueKey, DATETIME_FORMAT};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TableError;

/// Result type alias for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// An ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Creates a table, checking that names are unique and lengths agree.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        let expected = columns.first().map(Column::len).unwrap_or(0);
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
            if col.len() != expected {
                return Err(TableError::LengthMismatch {
                    column: col.name.clone(),
                    expected,
                    actual: col.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table from JSON objects, one per row.
    ///
    /// Column order follows first appearance; keys missing from a row read as null.
    pub fn from_records(records: &[serde_json::Value]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            let obj = record
                .as_object()
                .ok_or_else(|| TableError::InvalidRecord(format!("expected object, got {}", record)))?;
            for key in obj.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .iter()
            .map(|name| {
                let values: Vec<Value> = records
                    .iter()
                    .map(|r| r.get(name).map(Value::from_json).unwrap_or(Value::Null))
                    .collect();
                Column::new(name.clone(), ColumnData::from_values(&values))
            })
            .collect();
        Self::new(columns)
    }

    /// Parses newline-delimited JSON objects.
    pub fn from_json_lines(input: &str) -> Result<Self> {
        let records = input
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<serde_json::Value>, _>>()?;
        Self::from_records(&records)
    }

    /// Rows as JSON objects.
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        (0..self.n_rows())
            .map(|i| {
                let mut obj = serde_json::Map::new();
                for col in &self.columns {
                    obj.insert(col.name.clone(), col.get(i).to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect()
    }

    /// Rows as newline-delimited JSON.
    pub fn to_json_lines(&self) -> String {
        self.to_records()
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column lookup that fails with [`TableError::ColumnNotFound`].
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Names of the numeric (`Int`/`Float`) columns.
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Adds a column, replacing any existing column with the same name in place.
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(TableError::LengthMismatch {
                column: column.name.clone(),
                expected: self.n_rows(),
                actual: column.len(),
            });
        }
        match self.column_index(&column.name) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Builder form of [`Table::set_column`].
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        self.set_column(column)?;
        Ok(self)
    }

    /// Inserts `column` right after `anchor` (or at the end if `anchor` is absent).
    pub fn insert_after(&mut self, anchor: &str, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(TableError::DuplicateColumn(column.name.clone()));
        }
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(TableError::LengthMismatch {
                column: column.name.clone(),
                expected: self.n_rows(),
                actual: column.len(),
            });
        }
        match self.column_index(anchor) {
            Some(idx) => self.columns.insert(idx + 1, column),
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.column_index(name)?;
        Some(self.columns.remove(idx))
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if from != to && self.has_column(to) {
            return Err(TableError::DuplicateColumn(to.to_string()));
        }
        let idx = self
            .column_index(from)
            .ok_or_else(|| TableError::ColumnNotFound(from.to_string()))?;
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    /// Keeps only the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|n| self.require(n).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns)
    }

    pub fn row(&self, index: usize) -> Result<Vec<Value>> {
        if index >= self.n_rows() {
            return Err(TableError::RowOutOfBounds {
                index,
                rows: self.n_rows(),
            });
        }
        Ok(self.columns.iter().map(|c| c.get(index)).collect())
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.slice(offset, len)).collect(),
        }
    }

    pub fn head(&self, n: usize) -> Self {
        self.slice(0, n)
    }

    /// Keeps the rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Self {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
            .collect();
        self.take(&indices)
    }

    /// Stable sort by one column. Nulls sort last.
    pub fn sort_by(&self, column: &str, ascending: bool) -> Result<Self> {
        let col = self.require(column)?;
        let mut indices: Vec<usize> = (0..self.n_rows()).collect();
        indices.sort_by(|&a, &b| {
            let (ka, kb) = (col.get(a).key(), col.get(b).key());
            match (ka == ValueKey::Null, kb == ValueKey::Null) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) if ascending => ka.cmp(&kb),
                (false, false) => kb.cmp(&ka),
            }
        });
        Ok(self.take(&indices))
    }

    /// Vertically concatenates tables with identical column names and types.
    ///
    /// Int columns widen into float columns of the same name.
    pub fn concat(tables: &[Table]) -> Result<Self> {
        let Some(first) = tables.iter().find(|t| t.n_cols() > 0) else {
            return Ok(Self::empty());
        };
        let mut out = first.clone();
        for table in tables.iter().filter(|t| t.n_cols() > 0).skip(1) {
            if table.column_names() != out.column_names() {
                return Err(TableError::SchemaMismatch(format!(
                    "{:?} vs {:?}",
                    out.column_names(),
                    table.column_names()
                )));
            }
            for (dst, src) in out.columns.iter_mut().zip(table.columns.iter()) {
                if !dst.extend_from(src) {
                    return Err(TableError::SchemaMismatch(format!(
                        "column '{}' is {} in one table and {} in another",
                        dst.name,
                        dst.dtype(),
                        src.dtype()
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Number of rows that repeat an earlier row exactly.
    pub fn duplicate_row_count(&self) -> usize {
        let mut seen = HashSet::new();
        (0..self.n_rows())
            .filter(|&i| {
                let key: Vec<ValueKey> = self.columns.iter().map(|c| c.get(i).key()).collect();
                !seen.insert(key)
            })
            .count()
    }

    /// Approximate in-memory size in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.columns.iter().map(Column::memory_bytes).sum()
    }

    /// SHA-256 hex digest over column names, types and cells.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for col in &self.columns {
            hasher.update(col.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(col.dtype().to_string().as_bytes());
            hasher.update([0u8]);
            for i in 0..col.len() {
                hasher.update(col.get(i).to_string().as_bytes());
                hasher.update([if col.is_null(i) { 1u8 } else { 0u8 }]);
            }
        }
        hex::encode(hasher.finalize())
    }
}
