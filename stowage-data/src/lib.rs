pub mod criteria;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod query;
pub mod repository;
pub mod value;

pub use criteria::{Condition, Criteria, Order};
pub use cursor::{build_page, decode_token, encode_token, Cursor, CursorError, Direction, TokenCodec};
pub use entity::{Column, Entity, TableSchema};
pub use error::DataError;
pub use query::{Dialect, QueryBuilder, QueryError, Statement};
pub use repository::{Record, Repository};
pub use value::{ColumnType, HasColumnType, Value};

/// Backend crates decode rows through sqlx's `FromRow`; re-exported so
/// entities can derive it without a direct sqlx dependency.
pub use sqlx;

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        Column, ColumnType, Condition, Criteria, Cursor, DataError, Direction, Entity, Record,
        Repository, Value,
    };
}
