use crate::value::{ColumnType, Value};

/// Column metadata declared by an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary_key: false,
            nullable: false,
            unique: false,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Table definition used by `migrate`.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub table: &'static str,
    pub columns: &'static [Column],
}

impl TableSchema {
    pub fn primary_key(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

/// A record type stored in one table.
///
/// `values` must return one value per entry of `columns`, in the same order.
///
/// # Example
///
/// ```ignore
/// impl Entity for User {
///     fn table_name() -> &'static str { "users" }
///     fn columns() -> &'static [Column] {
///         const COLUMNS: &[Column] = &[
///             Column::new("id", ColumnType::BigInt).primary_key(),
///             Column::new("email", ColumnType::Text).unique(),
///             Column::new("nickname", ColumnType::Text).nullable(),
///         ];
///         COLUMNS
///     }
///     fn values(&self) -> Vec<Value> {
///         vec![self.id.into(), self.email.clone().into(), self.nickname.clone().into()]
///     }
/// }
/// ```
pub trait Entity: Send + Sync + Unpin + 'static {
    fn table_name() -> &'static str;
    fn columns() -> &'static [Column];
    fn values(&self) -> Vec<Value>;

    /// Names of the primary-key columns, in declaration order.
    fn primary_key() -> Vec<&'static str> {
        Self::columns()
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name)
            .collect()
    }

    fn schema() -> TableSchema {
        TableSchema {
            table: Self::table_name(),
            columns: Self::columns(),
        }
    }
}
