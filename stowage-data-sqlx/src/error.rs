use stowage_data::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()`.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match &self {
            sqlx::Error::RowNotFound => DataError::NotFound("Row not found".into()),
            sqlx::Error::Database(db) if is_constraint(db.kind()) => {
                DataError::ConstraintViolation(Box::new(self))
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DataError::Connection(Box::new(self)),
            _ => DataError::database(self),
        }
    }
}

fn is_constraint(kind: sqlx::error::ErrorKind) -> bool {
    matches!(
        kind,
        sqlx::error::ErrorKind::UniqueViolation
            | sqlx::error::ErrorKind::ForeignKeyViolation
            | sqlx::error::ErrorKind::NotNullViolation
            | sqlx::error::ErrorKind::CheckViolation
    )
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::{Classify, ErrorKind};

    #[test]
    fn row_not_found_is_not_found() {
        assert!(sqlx::Error::RowNotFound.into_data_error().is_not_found());
    }

    #[test]
    fn pool_failures_are_connection_errors() {
        assert_eq!(
            sqlx::Error::PoolTimedOut.into_data_error().kind(),
            ErrorKind::Connection
        );
    }

    #[test]
    fn other_errors_stay_database_errors() {
        let err = sqlx::Error::Protocol("bad frame".into()).into_data_error();
        assert!(matches!(err, DataError::Database(_)));
    }
}
