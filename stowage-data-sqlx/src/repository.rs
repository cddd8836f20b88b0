use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use sqlx::any::{Any, AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::Query;
use sqlx::AnyPool;
use stowage_core::Context;
use stowage_data::query::{self, OnConflict};
use stowage_data::{
    ColumnType, Condition, Criteria, DataError, Dialect, Entity, QueryBuilder, Record, Repository,
    Statement, TableSchema, Value,
};

use crate::connection::{self, DatabaseConfig};
use crate::error::SqlxErrorExt;
use crate::tx::TxHandle;

#[derive(Clone)]
enum Executor {
    Pool(AnyPool),
    Tx(TxHandle),
}

/// [`Repository`] over an `sqlx` Any pool.
///
/// Cloning is cheap. A clone produced by [`with_tx`](Repository::with_tx)
/// runs every statement inside that transaction instead of on the pool.
///
/// # Example
///
/// ```ignore
/// let repo = SqlxRepository::connect(&DatabaseConfig::new(Driver::Sqlite, "app.db")).await?;
/// repo.migrate(&ctx, &[User::schema()]).await?;
/// repo.create(&ctx, &[user], false).await?;
/// ```
#[derive(Clone)]
pub struct SqlxRepository {
    executor: Executor,
    dialect: Dialect,
    log_queries: bool,
}

impl SqlxRepository {
    pub fn new(pool: AnyPool, dialect: Dialect) -> Self {
        Self {
            executor: Executor::Pool(pool),
            dialect,
            log_queries: false,
        }
    }

    /// Open a pool for `config` and wrap it.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DataError> {
        let pool = connection::connect(config).await?;
        Ok(Self::new(pool, config.driver.dialect()).log_queries(config.log_queries))
    }

    /// Emit generated SQL at `info` (target `stowage::sql`) instead of `trace`.
    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The underlying pool, or `None` for a transaction-bound repository.
    pub fn pool(&self) -> Option<&AnyPool> {
        match &self.executor {
            Executor::Pool(pool) => Some(pool),
            Executor::Tx(_) => None,
        }
    }

    /// The transaction this repository is bound to.
    pub fn tx(&self) -> Option<&TxHandle> {
        match &self.executor {
            Executor::Pool(_) => None,
            Executor::Tx(tx) => Some(tx),
        }
    }

    /// Start a transaction for manual control; pair with [`with_tx`](Repository::with_tx).
    pub async fn begin(&self, ctx: &Context) -> Result<TxHandle, DataError> {
        match &self.executor {
            Executor::Pool(pool) => {
                let tx = ctx
                    .run(pool.begin())
                    .await?
                    .map_err(SqlxErrorExt::into_data_error)?;
                tracing::debug!("transaction started");
                Ok(TxHandle::new(tx))
            }
            Executor::Tx(_) => Err(DataError::NestedTransaction),
        }
    }

    pub async fn ping(&self, ctx: &Context) -> Result<(), DataError> {
        self.execute(ctx, &raw_statement("SELECT 1".into()))
            .await
            .map(|_| ())
    }

    /// Close the pool. Does nothing on a transaction-bound repository.
    pub async fn close(&self) {
        if let Executor::Pool(pool) = &self.executor {
            pool.close().await;
            tracing::info!("database pool closed");
        }
    }

    fn log_statement(&self, stmt: &Statement) {
        if self.log_queries {
            tracing::info!(target: "stowage::sql", sql = %stmt.sql, params = stmt.params.len(), "query");
        } else {
            tracing::trace!(target: "stowage::sql", sql = %stmt.sql, params = stmt.params.len(), "query");
        }
    }

    async fn execute(&self, ctx: &Context, stmt: &Statement) -> Result<AnyQueryResult, DataError> {
        self.log_statement(stmt);
        let query = bind_all(sqlx::query(&stmt.sql), &stmt.params);
        let result = match &self.executor {
            Executor::Pool(pool) => ctx.run(query.execute(pool)).await?,
            Executor::Tx(tx) => {
                let mut state = ctx.run(tx.lock()).await?;
                let conn = state.connection()?;
                ctx.run(query.execute(conn)).await?
            }
        };
        result.map_err(SqlxErrorExt::into_data_error)
    }

    async fn fetch_all(&self, ctx: &Context, stmt: &Statement) -> Result<Vec<AnyRow>, DataError> {
        self.log_statement(stmt);
        let query = bind_all(sqlx::query(&stmt.sql), &stmt.params);
        let result = match &self.executor {
            Executor::Pool(pool) => ctx.run(query.fetch_all(pool)).await?,
            Executor::Tx(tx) => {
                let mut state = ctx.run(tx.lock()).await?;
                let conn = state.connection()?;
                ctx.run(query.fetch_all(conn)).await?
            }
        };
        result.map_err(SqlxErrorExt::into_data_error)
    }

    async fn fetch_optional(&self, ctx: &Context, stmt: &Statement) -> Result<Option<AnyRow>, DataError> {
        self.log_statement(stmt);
        let query = bind_all(sqlx::query(&stmt.sql), &stmt.params);
        let result = match &self.executor {
            Executor::Pool(pool) => ctx.run(query.fetch_optional(pool)).await?,
            Executor::Tx(tx) => {
                let mut state = ctx.run(tx.lock()).await?;
                let conn = state.connection()?;
                ctx.run(query.fetch_optional(conn)).await?
            }
        };
        result.map_err(SqlxErrorExt::into_data_error)
    }

    async fn load_one<T: Record>(
        &self,
        ctx: &Context,
        record: &mut T,
        builder: QueryBuilder,
    ) -> Result<(), DataError> {
        let stmt = builder.limit(1).build_select(&column_names::<T>())?;
        let row = self
            .fetch_optional(ctx, &stmt)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("no matching row in {}", T::table_name())))?;
        *record = decode_row(&row)?;
        Ok(())
    }

    /// Run the bulk UPDATE and require that every distinct key matched a row.
    async fn apply_bulk(
        &self,
        ctx: &Context,
        table: &str,
        stmt: &Statement,
        expected: u64,
    ) -> Result<(), DataError> {
        let updated = self.execute(ctx, stmt).await?.rows_affected();
        if updated < expected {
            return Err(DataError::NotFound(format!(
                "{} of {expected} primary keys have no row in {table}",
                expected - updated
            )));
        }
        tracing::debug!(table, rows = updated, "bulk update applied");
        Ok(())
    }

    /// [`apply_bulk`](Self::apply_bulk) inside a savepoint of the bound
    /// transaction, so a failed batch leaves none of its rows behind.
    async fn apply_bulk_in_savepoint(
        &self,
        ctx: &Context,
        table: &str,
        stmt: &Statement,
        expected: u64,
    ) -> Result<(), DataError> {
        self.execute(ctx, &raw_statement(format!("SAVEPOINT {BULK_SAVEPOINT}")))
            .await?;
        let outcome = self.apply_bulk(ctx, table, stmt, expected).await;
        if outcome.is_err() {
            // Cleanup ignores cancellation of `ctx`
            let undo = raw_statement(format!("ROLLBACK TO SAVEPOINT {BULK_SAVEPOINT}"));
            if let Err(err) = self.execute(&Context::background(), &undo).await {
                tracing::debug!(error = %err, "savepoint rollback failed");
            }
        }
        let release = raw_statement(format!("RELEASE SAVEPOINT {BULK_SAVEPOINT}"));
        match self.execute(&Context::background(), &release).await {
            Ok(_) => outcome,
            Err(err) => outcome.and(Err(err)),
        }
    }
}

impl Repository for SqlxRepository {
    type Tx = TxHandle;

    async fn migrate(&self, ctx: &Context, schemas: &[TableSchema]) -> Result<(), DataError> {
        for schema in schemas {
            let stmt = query::create_table(self.dialect, schema)
                .map_err(|e| DataError::migration(schema.table, e))?;
            self.execute(ctx, &stmt)
                .await
                .map_err(|e| DataError::migration(schema.table, e))?;
            tracing::debug!(table = schema.table, "table ready");
        }
        Ok(())
    }

    async fn create<T: Record>(
        &self,
        ctx: &Context,
        records: &[T],
        ignore_duplicates: bool,
    ) -> Result<(), DataError> {
        if records.is_empty() {
            return Ok(());
        }
        let on_conflict = if ignore_duplicates {
            OnConflict::Ignore
        } else {
            OnConflict::Fail
        };
        let rows = records.iter().map(Entity::values).collect();
        let stmt = query::insert(self.dialect, T::table_name(), T::columns(), rows, on_conflict)?;
        let result = self.execute(ctx, &stmt).await?;
        tracing::debug!(
            table = T::table_name(),
            rows = result.rows_affected(),
            "rows created"
        );
        Ok(())
    }

    async fn upsert<T: Record>(&self, ctx: &Context, records: &[T]) -> Result<(), DataError> {
        if records.is_empty() {
            return Ok(());
        }
        let key = T::primary_key();
        if key.is_empty() {
            return Err(DataError::MissingPrimaryKey(T::table_name().to_string()));
        }
        let rows = records.iter().map(Entity::values).collect();
        let stmt = query::insert(
            self.dialect,
            T::table_name(),
            T::columns(),
            rows,
            OnConflict::Update { key: &key },
        )?;
        self.execute(ctx, &stmt).await?;
        Ok(())
    }

    async fn find_by_pk<T: Record>(&self, ctx: &Context, record: &mut T) -> Result<(), DataError> {
        let builder = key_conditions(&*record)?
            .into_iter()
            .fold(QueryBuilder::new(T::table_name(), self.dialect), QueryBuilder::filter);
        self.load_one(ctx, record, builder).await
    }

    async fn find_where<T: Record>(
        &self,
        ctx: &Context,
        record: &mut T,
        criteria: &[Criteria],
    ) -> Result<(), DataError> {
        let builder = QueryBuilder::new(T::table_name(), self.dialect).apply(criteria);
        self.load_one(ctx, record, builder).await
    }

    async fn list<T: Record>(&self, ctx: &Context, criteria: &[Criteria]) -> Result<Vec<T>, DataError> {
        let stmt = QueryBuilder::new(T::table_name(), self.dialect)
            .apply(criteria)
            .build_select(&column_names::<T>())?;
        self.fetch_all(ctx, &stmt)
            .await?
            .iter()
            .map(decode_row)
            .collect()
    }

    async fn update<T: Record>(&self, ctx: &Context, record: &T) -> Result<(), DataError> {
        key_conditions(record)?;
        let stmt = query::update_by_key(self.dialect, T::table_name(), T::columns(), record.values())?;
        let result = self.execute(ctx, &stmt).await?;
        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!(
                "no row in {} with the given primary key",
                T::table_name()
            )));
        }
        Ok(())
    }

    async fn update_bulk<T: Record>(&self, ctx: &Context, records: &[T]) -> Result<(), DataError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut distinct = HashSet::new();
        for record in records {
            distinct.insert(format!("{:?}", key_values(record)?));
        }
        let expected = distinct.len() as u64;
        let rows = records.iter().map(Entity::values).collect();
        let stmt = query::update_bulk_by_key(self.dialect, T::table_name(), T::columns(), rows)?;

        if let Executor::Tx(_) = self.executor {
            return self
                .apply_bulk_in_savepoint(ctx, T::table_name(), &stmt, expected)
                .await;
        }
        self.transactional(ctx, |ctx, repo| async move {
            repo.apply_bulk(&ctx, T::table_name(), &stmt, expected).await
        })
        .await
    }

    async fn delete_by_pk<T: Record>(&self, ctx: &Context, records: &[T]) -> Result<u64, DataError> {
        if records.is_empty() {
            return Ok(0);
        }
        let key = T::primary_key();
        let keys = records
            .iter()
            .map(|r| key_values(r))
            .collect::<Result<Vec<_>, _>>()?;
        let stmt = query::delete_by_keys(self.dialect, T::table_name(), &key, keys)?;
        Ok(self.execute(ctx, &stmt).await?.rows_affected())
    }

    async fn delete_where<T: Record>(&self, ctx: &Context, conditions: &[Condition]) -> Result<u64, DataError> {
        if conditions.is_empty() {
            return Err(DataError::UnguardedDelete(T::table_name().to_string()));
        }
        let stmt = conditions
            .iter()
            .cloned()
            .fold(QueryBuilder::new(T::table_name(), self.dialect), QueryBuilder::filter)
            .build_delete()?;
        Ok(self.execute(ctx, &stmt).await?.rows_affected())
    }

    async fn delete_all<T: Record>(&self, ctx: &Context) -> Result<u64, DataError> {
        let stmt = QueryBuilder::new(T::table_name(), self.dialect).build_delete()?;
        let deleted = self.execute(ctx, &stmt).await?.rows_affected();
        tracing::debug!(table = T::table_name(), rows = deleted, "table emptied");
        Ok(deleted)
    }

    fn with_tx(&self, tx: &TxHandle) -> Self {
        Self {
            executor: Executor::Tx(tx.clone()),
            dialect: self.dialect,
            log_queries: self.log_queries,
        }
    }

    async fn transactional<F, Fut, R, E>(&self, ctx: &Context, f: F) -> Result<R, E>
    where
        F: FnOnce(Context, Self) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: From<DataError> + Send,
    {
        let tx = self.begin(ctx).await?;
        let bound = self.with_tx(&tx);

        match AssertUnwindSafe(f(ctx.child(), bound)).catch_unwind().await {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                rollback_quietly(&tx).await;
                Err(err)
            }
            Err(panic) => {
                rollback_quietly(&tx).await;
                std::panic::resume_unwind(panic)
            }
        }
    }
}

const BULK_SAVEPOINT: &str = "stowage_bulk_update";

fn raw_statement(sql: String) -> Statement {
    Statement {
        sql,
        params: Vec::new(),
    }
}

async fn rollback_quietly(tx: &TxHandle) {
    if let Err(err) = tx.rollback().await {
        // The transaction may already be finished by the callback
        tracing::debug!(error = %err, "rollback skipped");
    }
}

fn column_names<T: Entity>() -> Vec<&'static str> {
    T::columns().iter().map(|c| c.name).collect()
}

fn decode_row<T: Record>(row: &AnyRow) -> Result<T, DataError> {
    <T as sqlx::FromRow<'_, AnyRow>>::from_row(row).map_err(SqlxErrorExt::into_data_error)
}

/// Primary-key values of `record`, in key-column order. A null, zero or
/// empty key part is [`DataError::MissingPrimaryKey`].
fn key_values<T: Entity>(record: &T) -> Result<Vec<Value>, DataError> {
    let columns = T::columns();
    let values = record.values();
    if values.len() != columns.len() {
        return Err(DataError::InvalidInput(format!(
            "{} declares {} columns but the record supplied {} values",
            T::table_name(),
            columns.len(),
            values.len()
        )));
    }

    let key: Vec<Value> = columns
        .iter()
        .zip(values)
        .filter(|(col, _)| col.primary_key)
        .map(|(_, value)| value)
        .collect();
    if key.is_empty() || key.iter().any(Value::is_zero) {
        return Err(DataError::MissingPrimaryKey(T::table_name().to_string()));
    }
    Ok(key)
}

fn key_conditions<T: Entity>(record: &T) -> Result<Vec<Condition>, DataError> {
    let values = key_values(record)?;
    Ok(T::primary_key()
        .into_iter()
        .zip(values)
        .map(|(name, value)| Condition::Eq(name.to_string(), value))
        .collect())
}

fn bind_all<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    params: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    params.iter().fold(query, |query, value| match value {
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Null(ColumnType::Bool) => query.bind(None::<bool>),
        Value::Null(ColumnType::BigInt) => query.bind(None::<i64>),
        Value::Null(ColumnType::Double) => query.bind(None::<f64>),
        Value::Null(ColumnType::Text) => query.bind(None::<String>),
        Value::Null(ColumnType::Bytes) => query.bind(None::<Vec<u8>>),
    })
}
