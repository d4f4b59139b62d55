use crate::{IsolationLevel, Result, Value};
use std::{future::Future, sync::Arc};

/// A bound statement parameter, named after its placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub output: bool,
}

impl Parameter {
    pub fn input(name: String, value: Value) -> Self {
        Self {
            name,
            value,
            output: false,
        }
    }

    /// Output parameter, filled in by the engine (Oracle `RETURNING … INTO`,
    /// ref cursors).
    pub fn output(name: String, shape: Value) -> Self {
        Self {
            name,
            value: shape,
            output: true,
        }
    }
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|label| label == name)
            .map(|i| &self.values[i])
    }
}

/// A native transaction handle bound to one connection. Exclusively owned by
/// its transaction-stack node from open until commit/rollback.
pub trait NativeTransaction: Send {
    fn execute(&mut self, sql: &str, params: &[Parameter]) -> Result<u64>;
    fn query(&mut self, sql: &str, params: &[Parameter]) -> Result<Vec<RowLabeled>>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// The external database client consumed by the engine. The crate never
/// manages connections itself; it hands over SQL text plus parameters and
/// materializes whatever comes back.
///
/// Contract for output parameters: when a statement carries output
/// parameters (Oracle identity retrieval, ref cursors), `query` surfaces
/// their final values as result rows, one rowset per cursor for
/// `query_multi`.
pub trait DatabaseClient: Send + Sync {
    fn execute(&self, sql: &str, params: &[Parameter]) -> Result<u64>;

    fn query(&self, sql: &str, params: &[Parameter]) -> Result<Vec<RowLabeled>>;

    /// Multi-rowset form for statements returning several cursors. Defaults
    /// to a single rowset.
    fn query_multi(&self, sql: &str, params: &[Parameter]) -> Result<Vec<Vec<RowLabeled>>> {
        Ok(vec![self.query(sql, params)?])
    }

    /// First column of the first row, `Value::Null` when nothing came back.
    fn query_scalar(&self, sql: &str, params: &[Parameter]) -> Result<Value> {
        Ok(self
            .query(sql, params)?
            .first()
            .and_then(|row| row.values.first())
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn execute_async<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Parameter],
    ) -> impl Future<Output = Result<u64>> + Send + 'a {
        async move { self.execute(sql, params) }
    }

    fn query_async<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Parameter],
    ) -> impl Future<Output = Result<Vec<RowLabeled>>> + Send + 'a {
        async move { self.query(sql, params) }
    }

    fn query_multi_async<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Parameter],
    ) -> impl Future<Output = Result<Vec<Vec<RowLabeled>>>> + Send + 'a {
        async move { self.query_multi(sql, params) }
    }

    fn query_scalar_async<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Parameter],
    ) -> impl Future<Output = Result<Value>> + Send + 'a {
        async move {
            Ok(self
                .query_async(sql, params)
                .await?
                .first()
                .and_then(|row| row.values.first())
                .cloned()
                .unwrap_or(Value::Null))
        }
    }

    /// Open a connection and begin a native transaction on it.
    fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn NativeTransaction>>;
}
