//! Source/sink boundary.
//!
//! Concrete adapters (warehouse tables, blob stores, relational stores, HTTP
//! APIs) live outside this crate; they only have to implement [`Connector`].
//! [`MemoryConnector`] is the in-process reference implementation.
//!
//! Connections follow scoped acquisition: wrap a connector in a
//! [`ConnectionGuard`] and the guard calls `disconnect()` on every exit path.
//!
//! # Filters
//!
//! Read filters use an operator-suffix convention on the key:
//!
//! | key            | meaning                         |
//! |----------------|---------------------------------|
//! | `col`          | equals                          |
//! | `col__gt`      | greater than                    |
//! | `col__lt`      | less than                       |
//! | `col__gte`     | greater than or equal           |
//! | `col__lte`     | less than or equal              |
//! | `col__ne`      | not equal                       |
//! | `col__in`      | member of a JSON array          |
//! | `col__contains`| substring match                 |
//! | `col__isnull`  | null check (`true`/`false`)     |
//!
//! All filters of a request are combined with AND.

pub mod memory;

pub use memory::MemoryConnector;

use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConnectorError;
use crate::table::{Table, Value};

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// How `write` combines new rows with an existing target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum WriteMode {
    #[default]
    Append,
    /// Replace the target entirely.
    Replace,
    /// Update rows whose key columns match, append the rest.
    Upsert { keys: Vec<String> },
}

/// Contract every source/sink adapter implements.
pub trait Connector {
    /// Establishes the underlying connection. Idempotent; returns false on failure.
    fn connect(&mut self) -> bool;

    /// Releases the underlying connection. Safe to call when not connected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Reads a table according to `request`.
    fn read(&mut self, request: &ReadRequest) -> Result<Table>;

    /// Writes `table` into `target`.
    fn write(
        &mut self,
        table: &Table,
        target: &str,
        mode: &WriteMode,
        batch_size: Option<usize>,
    ) -> Result<bool>;
}

impl<C: Connector + ?Sized> Connector for Box<C> {
    fn connect(&mut self) -> bool {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn read(&mut self, request: &ReadRequest) -> Result<Table> {
        (**self).read(request)
    }

    fn write(
        &mut self,
        table: &Table,
        target: &str,
        mode: &WriteMode,
        batch_size: Option<usize>,
    ) -> Result<bool> {
        (**self).write(table, target, mode, batch_size)
    }
}

/// Scoped connection: connects on creation and disconnects when dropped.
pub struct ConnectionGuard<'a, C: Connector + ?Sized> {
    connector: &'a mut C,
}

impl<'a, C: Connector + ?Sized> ConnectionGuard<'a, C> {
    /// Connects `connector`, failing with [`ConnectorError::Connection`].
    pub fn acquire(connector: &'a mut C) -> Result<Self> {
        if !connector.connect() {
            // The contract allows disconnect after a failed connect.
            connector.disconnect();
            return Err(ConnectorError::Connection(
                "connector refused to connect".to_string(),
            ));
        }
        debug!("Connection acquired");
        Ok(Self { connector })
    }
}

impl<C: Connector + ?Sized> Deref for ConnectionGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.connector
    }
}

impl<C: Connector + ?Sized> DerefMut for ConnectionGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.connector
    }
}

impl<C: Connector + ?Sized> Drop for ConnectionGuard<'_, C> {
    fn drop(&mut self) {
        self.connector.disconnect();
        debug!("Connection released");
    }
}

/// Runs `f` inside a scoped connection.
pub fn with_connection<C, T, F>(connector: &mut C, f: F) -> Result<T>
where
    C: Connector + ?Sized,
    F: FnOnce(&mut C) -> Result<T>,
{
    let mut guard = ConnectionGuard::acquire(connector)?;
    f(&mut *guard)
}

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq(Value),
    Gt(Value),
    Lt(Value),
    Gte(Value),
    Lte(Value),
    Ne(Value),
    In(Vec<Value>),
    Contains(String),
    IsNull(bool),
}

/// A single column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp) -> Self {
        Self {
            column: column.into(),
            op,
        }
    }

    /// Parses a suffixed key such as `spend__gte` together with its value.
    pub fn parse(key: &str, value: &serde_json::Value) -> Result<Self> {
        let (column, suffix) = match key.rsplit_once("__") {
            Some((col, suffix)) if !col.is_empty() => (col, Some(suffix)),
            _ => (key, None),
        };
        let scalar = Value::from_json(value);
        let op = match suffix {
            None => FilterOp::Eq(scalar),
            Some("gt") => FilterOp::Gt(scalar),
            Some("lt") => FilterOp::Lt(scalar),
            Some("gte") => FilterOp::Gte(scalar),
            Some("lte") => FilterOp::Lte(scalar),
            Some("ne") => FilterOp::Ne(scalar),
            Some("in") => {
                let items = value.as_array().ok_or_else(|| ConnectorError::InvalidFilter {
                    key: key.to_string(),
                    reason: "__in expects an array".to_string(),
                })?;
                FilterOp::In(items.iter().map(Value::from_json).collect())
            }
            Some("contains") => FilterOp::Contains(match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            Some("isnull") => FilterOp::IsNull(value.as_bool().ok_or_else(|| {
                ConnectorError::InvalidFilter {
                    key: key.to_string(),
                    reason: "__isnull expects a boolean".to_string(),
                }
            })?),
            Some(other) => {
                return Err(ConnectorError::InvalidFilter {
                    key: key.to_string(),
                    reason: format!("unknown operator '__{}'", other),
                })
            }
        };
        Ok(Self::new(column, op))
    }

    /// Whether a cell satisfies the predicate. Nulls only match `__isnull=true`
    /// and `__ne`.
    pub fn matches(&self, cell: &Value) -> bool {
        match &self.op {
            FilterOp::IsNull(expected) => cell.is_null() == *expected,
            FilterOp::Ne(v) => compare(cell, v) != Some(Ordering::Equal),
            _ if cell.is_null() => false,
            FilterOp::Eq(v) => compare(cell, v) == Some(Ordering::Equal),
            FilterOp::Gt(v) => compare(cell, v) == Some(Ordering::Greater),
            FilterOp::Lt(v) => compare(cell, v) == Some(Ordering::Less),
            FilterOp::Gte(v) => matches!(
                compare(cell, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lte(v) => matches!(compare(cell, v), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::In(items) => items
                .iter()
                .any(|v| compare(cell, v) == Some(Ordering::Equal)),
            FilterOp::Contains(needle) => cell.to_string().contains(needle.as_str()),
        }
    }
}

/// Orders two cells; numbers compare numerically across int/float.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::Str(y)) | (Value::Str(y), Value::DateTime(x)) => {
            let parsed = chrono::NaiveDateTime::parse_from_str(y, crate::table::DATETIME_FORMAT).ok()?;
            let ord = x.cmp(&parsed);
            Some(if matches!(a, Value::DateTime(_)) { ord } else { ord.reverse() })
        }
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Applies AND-combined filters to a table.
///
/// Filters on unknown columns are an error rather than silently matching nothing.
pub fn apply_filters(table: &Table, filters: &[Filter]) -> Result<Table> {
    if filters.is_empty() {
        return Ok(table.clone());
    }
    let columns = filters
        .iter()
        .map(|f| table.require(&f.column).map_err(ConnectorError::from))
        .collect::<Result<Vec<_>>>()?;
    let mask: Vec<bool> = (0..table.n_rows())
        .map(|row| {
            filters
                .iter()
                .zip(columns.iter())
                .all(|(f, col)| f.matches(&col.get(row)))
        })
        .collect();
    Ok(table.filter(&mask))
}

/// Ordering clause of a read request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Parameters of a `read` call. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Free-form query understood by the adapter (e.g. SQL).
    pub query: Option<String>,
    pub table: Option<String>,
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order_by: Option<OrderBy>,
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds filters from a suffix-keyed JSON object.
    pub fn with_filter_map(mut self, filters: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        for (key, value) in filters {
            self.filters.push(Filter::parse(key, value)?);
        }
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    /// Applies filters, ordering, offset/limit and projection to an in-memory table.
    ///
    /// Adapters backed by a query engine push these down instead.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mut out = apply_filters(table, &self.filters)?;
        if let Some(order) = &self.order_by {
            out = out.sort_by(&order.column, order.ascending)?;
        }
        let offset = self.offset.unwrap_or(0);
        if offset > 0 || self.limit.is_some() {
            let len = self.limit.unwrap_or(usize::MAX);
            out = out.slice(offset, len);
        }
        if let Some(cols) = &self.columns {
            out = out.select(cols)?;
        }
        if self.query.is_some() {
            warn!("Free-form query ignored by in-memory request evaluation");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use serde_json::json;

    fn table() -> Table {
        Table::new(vec![
            Column::from_strs("channel", &["tv", "search", "social", "tv"]),
            Column::float("spend", vec![Some(100.0), Some(20.0), None, Some(60.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_suffixes() {
        let f = Filter::parse("spend__gte", &json!(50)).unwrap();
        assert_eq!(f.column, "spend");
        assert_eq!(f.op, FilterOp::Gte(Value::Int(50)));

        let f = Filter::parse("channel", &json!("tv")).unwrap();
        assert_eq!(f.op, FilterOp::Eq(Value::from("tv")));

        assert!(Filter::parse("spend__between", &json!(1)).is_err());
        assert!(Filter::parse("spend__in", &json!(1)).is_err());
    }

    #[test]
    fn test_filters_combine_with_and() {
        let filters = vec![
            Filter::parse("channel", &json!("tv")).unwrap(),
            Filter::parse("spend__gt", &json!(80)).unwrap(),
        ];
        let out = apply_filters(&table(), &filters).unwrap();
        assert_eq!(out.n_rows(), 1);
        assert_eq!(out.column("spend").unwrap().get(0), Value::Float(100.0));
    }

    #[test]
    fn test_null_handling() {
        let isnull = Filter::parse("spend__isnull", &json!(true)).unwrap();
        assert_eq!(apply_filters(&table(), &[isnull]).unwrap().n_rows(), 1);

        let gt = Filter::parse("spend__gt", &json!(0)).unwrap();
        assert_eq!(apply_filters(&table(), &[gt]).unwrap().n_rows(), 3);
    }

    #[test]
    fn test_in_and_contains() {
        let f = Filter::parse("channel__in", &json!(["tv", "social"])).unwrap();
        assert_eq!(apply_filters(&table(), &[f]).unwrap().n_rows(), 3);

        let f = Filter::parse("channel__contains", &json!("ear")).unwrap();
        assert_eq!(apply_filters(&table(), &[f]).unwrap().n_rows(), 1);
    }

    #[test]
    fn test_request_apply() {
        let request = ReadRequest::new()
            .with_order_by("spend", false)
            .with_offset(1)
            .with_limit(2)
            .with_columns(vec!["spend".to_string()]);
        let out = request.apply(&table()).unwrap();
        assert_eq!(out.column_names(), vec!["spend"]);
        assert_eq!(
            out.column("spend").unwrap().values(),
            vec![Value::Float(60.0), Value::Float(20.0)]
        );
    }

    #[test]
    fn test_request_unbounded_limit_past_offset() {
        let request = ReadRequest::new().with_offset(1).with_limit(usize::MAX);
        assert_eq!(request.apply(&table()).unwrap().n_rows(), 3);

        let request = ReadRequest::new().with_offset(10);
        assert_eq!(request.apply(&table()).unwrap().n_rows(), 0);

        assert_eq!(table().slice(usize::MAX, usize::MAX).n_rows(), 0);
    }
}
