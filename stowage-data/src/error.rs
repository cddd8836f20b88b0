use stowage_core::{Classify, ErrorKind, Interrupted};

use crate::query::QueryError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the data layer.
#[derive(Debug)]
pub enum DataError {
    /// No row matched.
    NotFound(String),
    /// The entity declares no primary key, or a record has no key value.
    MissingPrimaryKey(String),
    ConstraintViolation(BoxError),
    Connection(BoxError),
    Database(BoxError),
    /// Creating `table` failed; earlier tables in the batch were created.
    Migration { table: String, source: BoxError },
    /// `delete_where` was called without conditions. Use `delete_all`.
    UnguardedDelete(String),
    /// `transactional` was called on a repository already bound to a transaction.
    NestedTransaction,
    /// The transaction was already committed or rolled back.
    TransactionClosed,
    InvalidInput(String),
    Interrupted(Interrupted),
    Other(String),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates to wrap driver-specific errors they do not
    /// classify further.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    pub fn migration(table: &str, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Migration {
            table: table.to_string(),
            source: Box::new(err),
        }
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
            DataError::MissingPrimaryKey(table) => {
                write!(f, "Missing primary key for table {table}")
            }
            DataError::ConstraintViolation(err) => write!(f, "Constraint violation: {err}"),
            DataError::Connection(err) => write!(f, "Connection error: {err}"),
            DataError::Database(err) => write!(f, "Database error: {err}"),
            DataError::Migration { table, source } => {
                write!(f, "Migration of table {table} failed: {source}")
            }
            DataError::UnguardedDelete(table) => write!(
                f,
                "Refusing to delete from {table} without conditions; use delete_all"
            ),
            DataError::NestedTransaction => {
                write!(f, "Repository is already bound to a transaction")
            }
            DataError::TransactionClosed => write!(f, "Transaction already finished"),
            DataError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            DataError::Interrupted(reason) => write!(f, "Data operation interrupted: {reason}"),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::ConstraintViolation(err)
            | DataError::Connection(err)
            | DataError::Database(err)
            | DataError::Migration { source: err, .. } => Some(err.as_ref()),
            DataError::Interrupted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<Interrupted> for DataError {
    fn from(reason: Interrupted) -> Self {
        DataError::Interrupted(reason)
    }
}

impl From<QueryError> for DataError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::MissingPrimaryKey { table } => DataError::MissingPrimaryKey(table),
            other => DataError::InvalidInput(other.to_string()),
        }
    }
}

impl Classify for DataError {
    fn kind(&self) -> ErrorKind {
        match self {
            DataError::NotFound(_) => ErrorKind::NotFound,
            DataError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            DataError::Connection(_) => ErrorKind::Connection,
            DataError::Interrupted(reason) => reason.kind(),
            DataError::MissingPrimaryKey(_)
            | DataError::UnguardedDelete(_)
            | DataError::NestedTransaction
            | DataError::TransactionClosed
            | DataError::InvalidInput(_) => ErrorKind::InvalidInput,
            DataError::Migration { source, .. } => match source.downcast_ref::<DataError>() {
                Some(inner) => inner.kind(),
                None => ErrorKind::Other,
            },
            DataError::Database(_) | DataError::Other(_) => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_takes_the_kind_of_its_cause() {
        let err = DataError::migration("users", DataError::Connection("refused".into()));
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn query_errors_become_invalid_input() {
        let err: DataError = QueryError::NoColumns {
            table: "t".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err: DataError = QueryError::MissingPrimaryKey { table: "t".into() }.into();
        assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    }
}
