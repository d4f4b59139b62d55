use crate::{
    AsValue, DatabaseClient, Dialect, Entity, Error, Expr, IsolationLevel, KeySource, Parameter,
    Result, RowLabeled, SelectQuery, Statement, StatementBuilder, TransactionStack,
    TransactionToken, Value, materializer, truncate_long,
};
use std::sync::Mutex;

/// One page of results with the predicate-wide total row count.
#[derive(Debug)]
pub struct Page<E> {
    pub rows: Vec<E>,
    pub total: u64,
}

/// Data-access facade over one client and one dialect. Builds statements,
/// runs them through the client and materializes the results.
///
/// Statements issued while a transaction is open run on that transaction's
/// connection; nesting is handled by an explicit LIFO stack, so inner calls
/// join the innermost open transaction without handle-passing. Native
/// transactions are synchronous; async entry points fall back to the sync
/// path while a transaction is open.
pub struct Session<C: DatabaseClient> {
    client: C,
    builder: StatementBuilder,
    transactions: Mutex<TransactionStack>,
}

impl<C: DatabaseClient> Session<C> {
    pub fn new(client: C, dialect: Dialect) -> Self {
        Self {
            client,
            builder: StatementBuilder::new(dialect.profile()),
            transactions: Mutex::new(TransactionStack::new()),
        }
    }

    pub fn builder(&self) -> &StatementBuilder {
        &self.builder
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn stack(&self) -> std::sync::MutexGuard<'_, TransactionStack> {
        self.transactions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_execute(&self, sql: &str, params: &[Parameter]) -> Result<u64> {
        log::debug!("Executing: {}", truncate_long!(sql));
        let mut stack = self.stack();
        match stack.current_mut() {
            Some(transaction) => transaction.execute(sql, params),
            None => self.client.execute(sql, params),
        }
    }

    fn run_query(&self, sql: &str, params: &[Parameter]) -> Result<Vec<RowLabeled>> {
        log::debug!("Querying: {}", truncate_long!(sql));
        let mut stack = self.stack();
        match stack.current_mut() {
            Some(transaction) => transaction.query(sql, params),
            None => self.client.query(sql, params),
        }
    }

    async fn run_execute_async(&self, sql: &str, params: &[Parameter]) -> Result<u64> {
        if self.stack().depth() > 0 {
            return self.run_execute(sql, params);
        }
        log::debug!("Executing: {}", truncate_long!(sql));
        self.client.execute_async(sql, params).await
    }

    async fn run_query_async(&self, sql: &str, params: &[Parameter]) -> Result<Vec<RowLabeled>> {
        if self.stack().depth() > 0 {
            return self.run_query(sql, params);
        }
        log::debug!("Querying: {}", truncate_long!(sql));
        self.client.query_async(sql, params).await
    }

    // Transactions

    /// Begin a transaction nested inside any already open one. The returned
    /// token is required to complete it; completion is strictly innermost
    /// first.
    pub fn begin(&self, isolation: IsolationLevel) -> Result<TransactionToken> {
        let native = self.client.begin(isolation)?;
        let mut stack = self.stack();
        let token = stack.open(native);
        log::debug!("Transaction opened, depth {}", stack.depth());
        Ok(token)
    }

    pub fn commit(&self, token: TransactionToken) -> Result<()> {
        self.stack().complete(token, true)
    }

    pub fn rollback(&self, token: TransactionToken) -> Result<()> {
        self.stack().complete(token, false)
    }

    pub fn transaction_depth(&self) -> usize {
        self.stack().depth()
    }

    // Selects

    pub fn select<E: Entity>(&self, query: &SelectQuery) -> Result<Vec<E>> {
        let statement = self.builder.select::<E>(query)?;
        let rows = self.run_query(&statement.sql, &statement.params)?;
        Self::materialize_all(rows)
    }

    pub async fn select_async<E: Entity>(&self, query: &SelectQuery) -> Result<Vec<E>> {
        let statement = self.builder.select::<E>(query)?;
        let rows = self.run_query_async(&statement.sql, &statement.params).await?;
        Self::materialize_all(rows)
    }

    /// First entity matching `predicate`, if any. `projection` narrows the
    /// column list; columns it leaves out materialize as their null value.
    pub fn select_single<E: Entity>(
        &self,
        projection: Option<Expr>,
        predicate: Expr,
    ) -> Result<Option<E>> {
        let statement = self.builder.select_single::<E>(projection, predicate)?;
        let rows = self.run_query(&statement.sql, &statement.params)?;
        Self::materialize_first(rows)
    }

    pub async fn select_single_async<E: Entity>(
        &self,
        projection: Option<Expr>,
        predicate: Expr,
    ) -> Result<Option<E>> {
        let statement = self.builder.select_single::<E>(projection, predicate)?;
        let rows = self.run_query_async(&statement.sql, &statement.params).await?;
        Self::materialize_first(rows)
    }

    pub fn select_by_id<E: Entity>(
        &self,
        projection: Option<Expr>,
        id: impl Into<Value>,
    ) -> Result<Option<E>> {
        let statement = self.builder.select_by_id::<E>(projection, id.into())?;
        let rows = self.run_query(&statement.sql, &statement.params)?;
        Self::materialize_first(rows)
    }

    pub async fn select_by_id_async<E: Entity>(
        &self,
        projection: Option<Expr>,
        id: impl Into<Value>,
    ) -> Result<Option<E>> {
        let statement = self.builder.select_by_id::<E>(projection, id.into())?;
        let rows = self.run_query_async(&statement.sql, &statement.params).await?;
        Self::materialize_first(rows)
    }

    /// One page of entities plus the total count under the same predicate.
    pub fn select_paged<E: Entity>(&self, query: &SelectQuery) -> Result<Page<E>> {
        let statement = self.builder.select_paged::<E>(query)?;
        log::debug!("Querying: {}", truncate_long!(statement.sql));
        let rowsets = {
            let mut stack = self.stack();
            match stack.current_mut() {
                // The native handle returns one rowset per call, so the row
                // and count queries run as two round trips. Cursor output
                // parameters only apply to the combined form.
                Some(transaction) => {
                    let inputs: Vec<Parameter> = statement
                        .params
                        .iter()
                        .filter(|p| !p.output)
                        .cloned()
                        .collect();
                    let rows = transaction.query(&statement.row_sql, &inputs)?;
                    let counts = transaction.query(&statement.count_sql, &inputs)?;
                    vec![rows, counts]
                }
                None => self.client.query_multi(&statement.sql, &statement.params)?,
            }
        };
        Self::assemble_page(rowsets)
    }

    pub async fn select_paged_async<E: Entity>(&self, query: &SelectQuery) -> Result<Page<E>> {
        if self.stack().depth() > 0 {
            return self.select_paged::<E>(query);
        }
        let statement = self.builder.select_paged::<E>(query)?;
        log::debug!("Querying: {}", truncate_long!(statement.sql));
        let rowsets = self
            .client
            .query_multi_async(&statement.sql, &statement.params)
            .await?;
        Self::assemble_page(rowsets)
    }

    // Inserts

    pub fn insert<E: Entity>(&self, entity: &E) -> Result<u64> {
        let statement = self.builder.insert::<E>(entity)?;
        self.run_execute(&statement.sql, &statement.params)
    }

    pub async fn insert_async<E: Entity>(&self, entity: &E) -> Result<u64> {
        let statement = self.builder.insert::<E>(entity)?;
        self.run_execute_async(&statement.sql, &statement.params).await
    }

    /// Insert only the named properties.
    pub fn insert_with<E: Entity>(&self, entity: &E, properties: &[&str]) -> Result<u64> {
        let statement = self.builder.insert_with::<E>(entity, Some(properties))?;
        self.run_execute(&statement.sql, &statement.params)
    }

    pub async fn insert_with_async<E: Entity>(&self, entity: &E, properties: &[&str]) -> Result<u64> {
        let statement = self.builder.insert_with::<E>(entity, Some(properties))?;
        self.run_execute_async(&statement.sql, &statement.params).await
    }

    /// Multi-row insert, transparently split per the dialect's caps. Returns
    /// the total affected row count across splits.
    pub fn insert_range<E: Entity>(&self, entities: &[E]) -> Result<u64> {
        let statements = self.builder.insert_batch::<E>(entities)?;
        let mut affected = 0;
        for statement in &statements {
            affected += self.run_execute(&statement.sql, &statement.params)?;
        }
        Ok(affected)
    }

    pub async fn insert_range_async<E: Entity>(&self, entities: &[E]) -> Result<u64> {
        let statements = self.builder.insert_batch::<E>(entities)?;
        let mut affected = 0;
        for statement in &statements {
            affected += self
                .run_execute_async(&statement.sql, &statement.params)
                .await?;
        }
        Ok(affected)
    }

    /// Insert and return the generated identity key, converted to `K`.
    pub fn insert_identity<E: Entity, K: AsValue>(&self, entity: &E) -> Result<K> {
        let statement = self.builder.insert_identity::<E>(entity)?;
        let rows = self.run_query(&statement.sql, &statement.params)?;
        Self::extract_key(&statement, rows)
    }

    pub async fn insert_identity_async<E: Entity, K: AsValue>(&self, entity: &E) -> Result<K> {
        let statement = self.builder.insert_identity::<E>(entity)?;
        let rows = self.run_query_async(&statement.sql, &statement.params).await?;
        Self::extract_key(&statement, rows)
    }

    // Updates and deletes

    /// Update every mapped non-identity column of `entity`, keyed by its
    /// identity value.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<u64> {
        let statement = self.builder.update::<E>(entity)?;
        self.run_execute(&statement.sql, &statement.params)
    }

    pub async fn update_async<E: Entity>(&self, entity: &E) -> Result<u64> {
        let statement = self.builder.update::<E>(entity)?;
        self.run_execute_async(&statement.sql, &statement.params).await
    }

    pub fn update_where<E: Entity>(
        &self,
        assignments: &[(&'static str, Expr)],
        predicate: &Expr,
    ) -> Result<u64> {
        let statement = self.builder.update_where::<E>(assignments, predicate)?;
        self.run_execute(&statement.sql, &statement.params)
    }

    pub async fn update_where_async<E: Entity>(
        &self,
        assignments: &[(&'static str, Expr)],
        predicate: &Expr,
    ) -> Result<u64> {
        let statement = self.builder.update_where::<E>(assignments, predicate)?;
        self.run_execute_async(&statement.sql, &statement.params).await
    }

    pub fn delete_by_id<E: Entity>(&self, id: impl Into<Value>) -> Result<u64> {
        let statement = self.builder.delete_by_id::<E>(id.into())?;
        self.run_execute(&statement.sql, &statement.params)
    }

    pub async fn delete_by_id_async<E: Entity>(&self, id: impl Into<Value>) -> Result<u64> {
        let statement = self.builder.delete_by_id::<E>(id.into())?;
        self.run_execute_async(&statement.sql, &statement.params).await
    }

    pub fn delete_where<E: Entity>(&self, predicate: &Expr) -> Result<u64> {
        let statement = self.builder.delete_where::<E>(predicate)?;
        self.run_execute(&statement.sql, &statement.params)
    }

    pub async fn delete_where_async<E: Entity>(&self, predicate: &Expr) -> Result<u64> {
        let statement = self.builder.delete_where::<E>(predicate)?;
        self.run_execute_async(&statement.sql, &statement.params).await
    }

    // Result assembly

    fn materialize_all<E: Entity>(rows: Vec<RowLabeled>) -> Result<Vec<E>> {
        let plan = materializer::<E>();
        rows.iter().map(|row| plan.materialize(row)).collect()
    }

    fn materialize_first<E: Entity>(rows: Vec<RowLabeled>) -> Result<Option<E>> {
        match rows.first() {
            Some(row) => materializer::<E>().materialize(row).map(Some),
            None => Ok(None),
        }
    }

    fn assemble_page<E: Entity>(mut rowsets: Vec<Vec<RowLabeled>>) -> Result<Page<E>> {
        if rowsets.len() < 2 {
            return Err(Error::msg(format!(
                "Paged query returned {} rowsets, expected rows and count",
                rowsets.len()
            )));
        }
        let counts = rowsets.pop().expect("length checked above");
        let total = counts
            .first()
            .and_then(|row| row.values.first())
            .cloned()
            .ok_or_else(|| Error::msg("Paged query count rowset came back empty"))?;
        let rows = Self::materialize_all(rowsets.swap_remove(0))?;
        Ok(Page {
            rows,
            total: u64::try_from_value(total)?,
        })
    }

    /// Generated identity key of an insert, from the scalar result row or the
    /// dialect's output parameter, converted to the entity's key type.
    fn extract_key<K: AsValue>(statement: &Statement, rows: Vec<RowLabeled>) -> Result<K> {
        let value = match &statement.key {
            Some(KeySource::Scalar) => rows
                .first()
                .and_then(|row| row.values.first())
                .cloned(),
            Some(KeySource::OutParam(name)) => rows.first().and_then(|row| {
                row.get_column(name)
                    .or_else(|| row.values.first())
                    .cloned()
            }),
            None => None,
        };
        let value = value
            .ok_or_else(|| Error::msg("Identity insert returned no generated key"))?;
        K::try_from_value(value)
    }
}
