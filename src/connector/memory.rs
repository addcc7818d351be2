//! In-process connector backed by named tables.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::{Connector, ReadRequest, Result, WriteMode};
use crate::error::ConnectorError;
use crate::table::{Table, ValueKey};

/// Connector over an in-memory map of named tables.
///
/// Reads resolve `ReadRequest::table` (or the default source when unset) and
/// evaluate filters, ordering, paging and projection locally.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    tables: BTreeMap<String, Table>,
    default_source: Option<String>,
    connected: bool,
    refuse_connections: bool,
    connect_calls: usize,
    disconnect_calls: usize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under `name`; the first registered table becomes the default source.
    pub fn with_table(mut self, name: impl Into<String>, table: Table) -> Self {
        let name = name.into();
        if self.default_source.is_none() {
            self.default_source = Some(name.clone());
        }
        self.tables.insert(name, table);
        self
    }

    /// Makes every `connect()` fail, to exercise connection error paths.
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls
    }

    fn resolve(&self, request: &ReadRequest) -> Result<&Table> {
        let name = request
            .table
            .as_ref()
            .or(self.default_source.as_ref())
            .ok_or_else(|| ConnectorError::Read("no source table specified".to_string()))?;
        self.tables
            .get(name)
            .ok_or_else(|| ConnectorError::SourceNotFound(name.clone()))
    }
}

impl Connector for MemoryConnector {
    fn connect(&mut self) -> bool {
        self.connect_calls += 1;
        if self.refuse_connections {
            return false;
        }
        self.connected = true;
        true
    }

    fn disconnect(&mut self) {
        self.disconnect_calls += 1;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read(&mut self, request: &ReadRequest) -> Result<Table> {
        if !self.connected {
            return Err(ConnectorError::NotConnected);
        }
        let source = self.resolve(request)?;
        let out = request.apply(source)?;
        debug!(rows = out.n_rows(), "Memory connector read");
        Ok(out)
    }

    fn write(
        &mut self,
        table: &Table,
        target: &str,
        mode: &WriteMode,
        batch_size: Option<usize>,
    ) -> Result<bool> {
        if !self.connected {
            return Err(ConnectorError::NotConnected);
        }

        let merged = match (mode, self.tables.get(target)) {
            (WriteMode::Replace, _) | (_, None) => table.clone(),
            (WriteMode::Append, Some(existing)) => {
                let mut parts = vec![existing.clone()];
                // Batches only change how rows are shipped, not the result.
                let step = batch_size.unwrap_or(table.n_rows()).max(1);
                let mut offset = 0;
                while offset < table.n_rows() {
                    parts.push(table.slice(offset, step));
                    offset += step;
                }
                Table::concat(&parts)?
            }
            (WriteMode::Upsert { keys }, Some(existing)) => upsert(existing, table, keys)?,
        };

        info!(destination = target, rows = table.n_rows(), "Memory connector write");
        self.tables.insert(target.to_string(), merged);
        Ok(true)
    }
}

/// Replaces rows of `existing` whose key columns match a row of `incoming`,
/// then appends incoming rows with new keys.
fn upsert(existing: &Table, incoming: &Table, keys: &[String]) -> Result<Table> {
    if keys.is_empty() {
        return Err(ConnectorError::Write("upsert requires key columns".to_string()));
    }
    let key_of = |table: &Table, row: usize| -> Result<Vec<ValueKey>> {
        keys.iter()
            .map(|k| Ok(table.require(k)?.get(row).key()))
            .collect()
    };

    let mut incoming_rows: HashMap<Vec<ValueKey>, usize> = HashMap::new();
    for row in 0..incoming.n_rows() {
        incoming_rows.insert(key_of(incoming, row)?, row);
    }

    let mut keep = Vec::with_capacity(existing.n_rows());
    for row in 0..existing.n_rows() {
        keep.push(!incoming_rows.contains_key(&key_of(existing, row)?));
    }

    let kept = existing.filter(&keep);
    let aligned = incoming.select(&existing.column_names())?;
    Ok(Table::concat(&[kept, aligned])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{with_connection, ConnectionGuard, Filter};
    use crate::table::{Column, Value};
    use serde_json::json;

    fn budgets() -> Table {
        Table::new(vec![
            Column::from_i64("id", vec![1, 2, 3]),
            Column::from_f64("budget", vec![10.0, 20.0, 30.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_read_requires_connection() {
        let mut conn = MemoryConnector::new().with_table("budgets", budgets());
        assert!(matches!(
            conn.read(&ReadRequest::new()),
            Err(ConnectorError::NotConnected)
        ));
    }

    #[test]
    fn test_guard_disconnects_on_error_path() {
        let mut conn = MemoryConnector::new().with_table("budgets", budgets());
        let result = with_connection(&mut conn, |c| c.read(&ReadRequest::table("missing")));
        assert!(matches!(result, Err(ConnectorError::SourceNotFound(_))));
        assert!(!conn.is_connected());
        assert_eq!(conn.disconnect_calls(), 1);
    }

    #[test]
    fn test_refused_connection() {
        let mut conn = MemoryConnector::new().refusing_connections();
        assert!(ConnectionGuard::acquire(&mut conn).is_err());
        assert_eq!(conn.disconnect_calls(), 1);
    }

    #[test]
    fn test_filtered_read() {
        let mut conn = MemoryConnector::new().with_table("budgets", budgets());
        let request =
            ReadRequest::table("budgets").with_filter(Filter::parse("budget__gte", &json!(20)).unwrap());
        let out = with_connection(&mut conn, |c| c.read(&request)).unwrap();
        assert_eq!(out.n_rows(), 2);
    }

    #[test]
    fn test_upsert() {
        let mut conn = MemoryConnector::new().with_table("budgets", budgets());
        let incoming = Table::new(vec![
            Column::from_i64("id", vec![2, 4]),
            Column::from_f64("budget", vec![99.0, 40.0]),
        ])
        .unwrap();
        with_connection(&mut conn, |c| {
            c.write(
                &incoming,
                "budgets",
                &WriteMode::Upsert {
                    keys: vec!["id".to_string()],
                },
                None,
            )
        })
        .unwrap();

        let stored = conn.table("budgets").unwrap();
        assert_eq!(stored.n_rows(), 4);
        let budgets = stored.column("budget").unwrap().values();
        assert!(budgets.contains(&Value::Float(99.0)));
        assert!(!budgets.contains(&Value::Float(20.0)));
    }

    #[test]
    fn test_append_in_batches() {
        let mut conn = MemoryConnector::new().with_table("budgets", budgets());
        with_connection(&mut conn, |c| {
            c.write(&budgets(), "budgets", &WriteMode::Append, Some(2))
        })
        .unwrap();
        assert_eq!(conn.table("budgets").unwrap().n_rows(), 6);
    }
}
