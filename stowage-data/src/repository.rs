use std::future::Future;

use sqlx::any::AnyRow;
use stowage_core::Context;

use crate::criteria::{Condition, Criteria};
use crate::entity::{Entity, TableSchema};
use crate::error::DataError;
use crate::value::Value;

/// An [`Entity`] that can be decoded from a database row.
///
/// Implemented automatically for every entity that derives `sqlx::FromRow`.
pub trait Record: Entity + for<'r> sqlx::FromRow<'r, AnyRow> {}

impl<T> Record for T where T: Entity + for<'r> sqlx::FromRow<'r, AnyRow> {}

/// Generic async repository over any number of entity types.
///
/// Every operation runs against the pool, or against the transaction the
/// repository is bound to (see [`with_tx`](Self::with_tx)).
///
/// Uses RPITIT (return-position `impl Trait` in traits), no `async-trait` needed.
pub trait Repository: Clone + Send + Sync + Sized {
    /// Handle to an open transaction.
    type Tx: Send + Sync;

    /// `CREATE TABLE IF NOT EXISTS` for each schema, in order. Stops at the
    /// first failure with [`DataError::Migration`].
    fn migrate(
        &self,
        ctx: &Context,
        schemas: &[TableSchema],
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Insert `records` in one statement. With `ignore_duplicates`, rows that
    /// collide with an existing key or unique column are skipped.
    fn create<T: Record>(
        &self,
        ctx: &Context,
        records: &[T],
        ignore_duplicates: bool,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Insert `records`, replacing every non-key column of rows whose primary
    /// key already exists.
    fn upsert<T: Record>(
        &self,
        ctx: &Context,
        records: &[T],
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Reload `record` from the row with the same primary key.
    fn find_by_pk<T: Record>(
        &self,
        ctx: &Context,
        record: &mut T,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Load the first row matching `criteria` into `record`.
    fn find_where<T: Record>(
        &self,
        ctx: &Context,
        record: &mut T,
        criteria: &[Criteria],
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Every row matching `criteria`. An empty result is not an error.
    fn list<T: Record>(
        &self,
        ctx: &Context,
        criteria: &[Criteria],
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn find_by_column<T: Record>(
        &self,
        ctx: &Context,
        record: &mut T,
        column: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), DataError>> + Send {
        async move {
            self.find_where(ctx, record, &[Criteria::Where(Condition::Eq(column.to_string(), value))])
                .await
        }
    }

    fn list_by_column<T: Record>(
        &self,
        ctx: &Context,
        column: &str,
        value: Value,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send {
        async move {
            self.list(ctx, &[Criteria::Where(Condition::Eq(column.to_string(), value))])
                .await
        }
    }

    /// Write every non-key column of `record`. [`DataError::NotFound`] when
    /// no row has its primary key.
    fn update<T: Record>(
        &self,
        ctx: &Context,
        record: &T,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Update each record by its own primary key; all rows apply or none do.
    fn update_bulk<T: Record>(
        &self,
        ctx: &Context,
        records: &[T],
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Delete the rows with the records' primary keys. Absent keys are ignored.
    fn delete_by_pk<T: Record>(
        &self,
        ctx: &Context,
        records: &[T],
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Delete the rows of `T`'s table matching every condition.
    ///
    /// Zero conditions is rejected with [`DataError::UnguardedDelete`].
    fn delete_where<T: Record>(
        &self,
        ctx: &Context,
        conditions: &[Condition],
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Delete every row of `T`'s table.
    fn delete_all<T: Record>(&self, ctx: &Context) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// A new repository whose operations run inside `tx`. `self` is unchanged.
    fn with_tx(&self, tx: &Self::Tx) -> Self;

    /// Run `f` inside a fresh transaction.
    ///
    /// `f` receives a child context and a repository bound to the
    /// transaction. The transaction commits when `f` returns `Ok`, and rolls
    /// back when it returns `Err` or panics; a panic is resumed after the
    /// rollback. Calling this on a repository that is already bound to a
    /// transaction fails with [`DataError::NestedTransaction`].
    fn transactional<F, Fut, R, E>(
        &self,
        ctx: &Context,
        f: F,
    ) -> impl Future<Output = Result<R, E>> + Send
    where
        F: FnOnce(Context, Self) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: From<DataError> + Send;
}
