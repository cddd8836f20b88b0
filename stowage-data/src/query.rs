//! SQL generation.
//!
//! Every identifier is validated and double-quoted; every value travels as a
//! bound parameter. Statements are plain data ([`Statement`]) so the backend
//! crate only has to bind and execute them.
//!
//! ```ignore
//! let stmt = QueryBuilder::new("users", Dialect::Postgres)
//!     .filter(Condition::eq("status", "active"))
//!     .filter(Condition::like("name", "%alice%"))
//!     .order_by("id", Order::Asc)
//!     .limit(10)
//!     .build_select(&["id", "name"])?;
//! ```

use crate::criteria::{Condition, Criteria, Order};
use crate::entity::{Column, TableSchema};
use crate::value::{ColumnType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `?` placeholders.
    Sqlite,
    /// `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// SQL type used for `ty` in `CREATE TABLE`.
    pub fn column_type(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (Dialect::Sqlite, ColumnType::BigInt) => "INTEGER",
            (Dialect::Sqlite, ColumnType::Double) => "REAL",
            (Dialect::Sqlite, ColumnType::Bytes) => "BLOB",
            (Dialect::Postgres, ColumnType::BigInt) => "BIGINT",
            (Dialect::Postgres, ColumnType::Double) => "DOUBLE PRECISION",
            (Dialect::Postgres, ColumnType::Bytes) => "BYTEA",
            (_, ColumnType::Text) => "TEXT",
            (_, ColumnType::Bool) => "BOOLEAN",
        }
    }
}

/// SQL text plus its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// What an INSERT does when a row collides with an existing key.
#[derive(Debug, Clone, Copy)]
pub enum OnConflict<'a> {
    Fail,
    Ignore,
    /// Replace every non-key column with the incoming value.
    Update { key: &'a [&'a str] },
}

#[derive(Debug, Clone)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
    NoColumns { table: String },
    MissingPrimaryKey { table: String },
    ArityMismatch { table: String, expected: usize, found: usize },
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            QueryError::NoColumns { table } => write!(f, "No columns to write for table {table}"),
            QueryError::MissingPrimaryKey { table } => {
                write!(f, "Table {table} declares no primary key")
            }
            QueryError::ArityMismatch {
                table,
                expected,
                found,
            } => write!(
                f,
                "Table {table} has {expected} columns but a row supplied {found} values"
            ),
        }
    }
}

impl std::error::Error for QueryError {}

/// A fluent builder for SELECT, COUNT and DELETE statements over one table.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    conditions: Vec<Condition>,
    order: Vec<(String, Order)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    dialect: Dialect,
}

impl QueryBuilder {
    pub fn new(table: &str, dialect: Dialect) -> Self {
        Self {
            table: table.to_string(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            dialect,
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order.push((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_val = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_val = Some(offset);
        self
    }

    /// Apply criteria in order.
    pub fn apply(self, criteria: &[Criteria]) -> Self {
        criteria.iter().fold(self, |builder, criterion| match criterion {
            Criteria::Where(cond) => builder.filter(cond.clone()),
            Criteria::OrderBy(col, order) => builder.order_by(col, *order),
            Criteria::Limit(n) => builder.limit(*n),
            Criteria::Offset(n) => builder.offset(*n),
        })
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn build_select(&self, columns: &[&str]) -> Result<Statement, QueryError> {
        let table = quote_checked(&self.table, "table")?;
        let columns = column_list(columns)?;
        let mut w = Writer::new(self.dialect, format!("SELECT {columns} FROM {table}"));
        self.append_where(&mut w)?;
        self.append_order(&mut w)?;
        self.append_limit_offset(&mut w);
        Ok(w.finish())
    }

    pub fn build_count(&self) -> Result<Statement, QueryError> {
        let table = quote_checked(&self.table, "table")?;
        let mut w = Writer::new(self.dialect, format!("SELECT COUNT(*) FROM {table}"));
        self.append_where(&mut w)?;
        Ok(w.finish())
    }

    /// DELETE restricted by the builder's conditions. Ordering and paging
    /// are ignored.
    pub fn build_delete(&self) -> Result<Statement, QueryError> {
        let table = quote_checked(&self.table, "table")?;
        let mut w = Writer::new(self.dialect, format!("DELETE FROM {table}"));
        self.append_where(&mut w)?;
        Ok(w.finish())
    }

    fn append_where(&self, w: &mut Writer) -> Result<(), QueryError> {
        if self.conditions.is_empty() {
            return Ok(());
        }
        w.sql.push_str(" WHERE ");
        for (idx, cond) in self.conditions.iter().enumerate() {
            if idx > 0 {
                w.sql.push_str(" AND ");
            }
            w.condition(cond)?;
        }
        Ok(())
    }

    fn append_order(&self, w: &mut Writer) -> Result<(), QueryError> {
        if self.order.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(self.order.len());
        for (col, order) in &self.order {
            let col = quote_checked(col, "column")?;
            match order {
                Order::Asc => clauses.push(format!("{col} ASC")),
                Order::Desc => clauses.push(format!("{col} DESC")),
            }
        }
        w.sql.push_str(" ORDER BY ");
        w.sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn append_limit_offset(&self, w: &mut Writer) {
        match (self.limit_val, self.offset_val, self.dialect) {
            (Some(limit), _, _) => w.sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(_), Dialect::Sqlite) => w.sql.push_str(" LIMIT -1"),
            _ => {}
        }
        if let Some(offset) = self.offset_val {
            w.sql.push_str(&format!(" OFFSET {offset}"));
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS` for `schema`.
pub fn create_table(dialect: Dialect, schema: &TableSchema) -> Result<Statement, QueryError> {
    let table = quote_checked(schema.table, "table")?;
    if schema.columns.is_empty() {
        return Err(QueryError::NoColumns {
            table: schema.table.to_string(),
        });
    }

    let mut defs = Vec::with_capacity(schema.columns.len() + 1);
    for col in schema.columns {
        let mut def = format!(
            "{} {}",
            quote_checked(col.name, "column")?,
            dialect.column_type(col.ty)
        );
        if !col.nullable {
            def.push_str(" NOT NULL");
        }
        if col.unique && !col.primary_key {
            def.push_str(" UNIQUE");
        }
        defs.push(def);
    }

    let key: Vec<&str> = schema.primary_key().map(|c| c.name).collect();
    if !key.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", column_list(&key)?));
    }

    Ok(Statement {
        sql: format!("CREATE TABLE IF NOT EXISTS {table} ({})", defs.join(", ")),
        params: Vec::new(),
    })
}

/// Multi-row INSERT. Each row must hold one value per column.
pub fn insert(
    dialect: Dialect,
    table: &str,
    columns: &[Column],
    rows: Vec<Vec<Value>>,
    on_conflict: OnConflict<'_>,
) -> Result<Statement, QueryError> {
    let quoted_table = quote_checked(table, "table")?;
    if columns.is_empty() {
        return Err(QueryError::NoColumns {
            table: table.to_string(),
        });
    }
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let mut w = Writer::new(
        dialect,
        format!("INSERT INTO {quoted_table} ({}) VALUES ", column_list(&names)?),
    );

    for (idx, row) in rows.into_iter().enumerate() {
        check_arity(table, columns.len(), row.len())?;
        if idx > 0 {
            w.sql.push_str(", ");
        }
        let placeholders: Vec<String> = row.into_iter().map(|v| w.bind(v)).collect();
        w.sql.push('(');
        w.sql.push_str(&placeholders.join(", "));
        w.sql.push(')');
    }

    match on_conflict {
        OnConflict::Fail => {}
        OnConflict::Ignore => w.sql.push_str(" ON CONFLICT DO NOTHING"),
        OnConflict::Update { key } => {
            if key.is_empty() {
                return Err(QueryError::MissingPrimaryKey {
                    table: table.to_string(),
                });
            }
            w.sql
                .push_str(&format!(" ON CONFLICT ({})", column_list(key)?));
            let mut sets = Vec::new();
            for name in names.iter().filter(|n| !key.contains(*n)) {
                let col = quote_checked(name, "column")?;
                sets.push(format!("{col} = excluded.{col}"));
            }
            if sets.is_empty() {
                w.sql.push_str(" DO NOTHING");
            } else {
                w.sql.push_str(" DO UPDATE SET ");
                w.sql.push_str(&sets.join(", "));
            }
        }
    }
    Ok(w.finish())
}

/// UPDATE of every non-key column, matched on the primary key.
pub fn update_by_key(
    dialect: Dialect,
    table: &str,
    columns: &[Column],
    values: Vec<Value>,
) -> Result<Statement, QueryError> {
    let quoted_table = quote_checked(table, "table")?;
    check_arity(table, columns.len(), values.len())?;

    let mut sets = Vec::new();
    let mut keys = Vec::new();
    for (col, value) in columns.iter().zip(values) {
        if col.primary_key {
            keys.push((col.name, value));
        } else {
            sets.push((col.name, value));
        }
    }
    if keys.is_empty() {
        return Err(QueryError::MissingPrimaryKey {
            table: table.to_string(),
        });
    }
    if sets.is_empty() {
        return Err(QueryError::NoColumns {
            table: table.to_string(),
        });
    }

    let mut w = Writer::new(dialect, format!("UPDATE {quoted_table} SET "));
    for (idx, (name, value)) in sets.into_iter().enumerate() {
        if idx > 0 {
            w.sql.push_str(", ");
        }
        let col = quote_checked(name, "column")?;
        let placeholder = w.bind(value);
        w.sql.push_str(&format!("{col} = {placeholder}"));
    }
    w.sql.push_str(" WHERE ");
    for (idx, (name, value)) in keys.into_iter().enumerate() {
        if idx > 0 {
            w.sql.push_str(" AND ");
        }
        w.condition(&Condition::Eq(name.to_string(), value))?;
    }
    Ok(w.finish())
}

/// One UPDATE for many rows, each matched on its own primary key.
///
/// The rows travel as a `VALUES` list joined with `UPDATE ... FROM`; its
/// columns are addressed as `column1..N`, the name both SQLite and Postgres
/// give to `VALUES` columns.
pub fn update_bulk_by_key(
    dialect: Dialect,
    table: &str,
    columns: &[Column],
    rows: Vec<Vec<Value>>,
) -> Result<Statement, QueryError> {
    let quoted_table = quote_checked(table, "table")?;
    if rows.is_empty() {
        return Err(QueryError::NoColumns {
            table: table.to_string(),
        });
    }
    if !columns.iter().any(|c| c.primary_key) {
        return Err(QueryError::MissingPrimaryKey {
            table: table.to_string(),
        });
    }

    let source = quote_checked(BULK_SOURCE, "alias")?;
    let mut sets = Vec::new();
    let mut joins = Vec::new();
    for (idx, col) in columns.iter().enumerate() {
        let name = quote_checked(col.name, "column")?;
        let field = format!("{source}.\"column{}\"", idx + 1);
        if col.primary_key {
            joins.push(format!("{quoted_table}.{name} = {field}"));
        } else {
            sets.push(format!("{name} = {field}"));
        }
    }
    if sets.is_empty() {
        return Err(QueryError::NoColumns {
            table: table.to_string(),
        });
    }

    let mut w = Writer::new(
        dialect,
        format!("UPDATE {quoted_table} SET {} FROM (VALUES ", sets.join(", ")),
    );
    for (idx, row) in rows.into_iter().enumerate() {
        check_arity(table, columns.len(), row.len())?;
        if idx > 0 {
            w.sql.push_str(", ");
        }
        let placeholders: Vec<String> = row.into_iter().map(|v| w.bind(v)).collect();
        w.sql.push('(');
        w.sql.push_str(&placeholders.join(", "));
        w.sql.push(')');
    }
    w.sql.push_str(&format!(") AS {source} WHERE {}", joins.join(" AND ")));
    Ok(w.finish())
}

const BULK_SOURCE: &str = "_rows";

/// DELETE of the rows whose key tuple is one of `keys`.
///
/// A single-column key renders as `IN (...)`, a composite key as an OR of
/// AND groups.
pub fn delete_by_keys(
    dialect: Dialect,
    table: &str,
    key: &[&str],
    keys: Vec<Vec<Value>>,
) -> Result<Statement, QueryError> {
    let quoted_table = quote_checked(table, "table")?;
    if key.is_empty() {
        return Err(QueryError::MissingPrimaryKey {
            table: table.to_string(),
        });
    }
    let mut w = Writer::new(dialect, format!("DELETE FROM {quoted_table} WHERE "));

    if let [column] = key {
        let mut values = Vec::with_capacity(keys.len());
        for mut tuple in keys {
            check_arity(table, 1, tuple.len())?;
            values.extend(tuple.pop());
        }
        w.condition(&Condition::In(column.to_string(), values))?;
        return Ok(w.finish());
    }

    let mut groups = Vec::with_capacity(keys.len());
    for tuple in keys {
        check_arity(table, key.len(), tuple.len())?;
        let mut parts = Vec::with_capacity(key.len());
        for (name, value) in key.iter().zip(tuple) {
            let col = quote_checked(name, "column")?;
            let placeholder = w.bind(value);
            parts.push(format!("{col} = {placeholder}"));
        }
        groups.push(format!("({})", parts.join(" AND ")));
    }
    if groups.is_empty() {
        w.sql.push_str("1 = 0");
    } else {
        w.sql.push_str(&groups.join(" OR "));
    }
    Ok(w.finish())
}

/// Accumulates SQL and parameters, numbering placeholders as they are bound.
struct Writer {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl Writer {
    fn new(dialect: Dialect, sql: String) -> Self {
        Self {
            dialect,
            sql,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn condition(&mut self, cond: &Condition) -> Result<(), QueryError> {
        let col = quote_checked(cond.column(), "column")?;
        let fragment = match cond {
            Condition::Eq(_, Value::Null(_)) => format!("{col} IS NULL"),
            Condition::NotEq(_, Value::Null(_)) => format!("{col} IS NOT NULL"),
            Condition::Eq(_, v) => format!("{col} = {}", self.bind(v.clone())),
            Condition::NotEq(_, v) => format!("{col} != {}", self.bind(v.clone())),
            Condition::Gt(_, v) => format!("{col} > {}", self.bind(v.clone())),
            Condition::Gte(_, v) => format!("{col} >= {}", self.bind(v.clone())),
            Condition::Lt(_, v) => format!("{col} < {}", self.bind(v.clone())),
            Condition::Lte(_, v) => format!("{col} <= {}", self.bind(v.clone())),
            Condition::Like(_, pattern) => {
                format!("{col} LIKE {}", self.bind(Value::Text(pattern.clone())))
            }
            Condition::In(_, values) if values.is_empty() => "1 = 0".to_string(),
            Condition::In(_, values) => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.bind(v.clone())).collect();
                format!("{col} IN ({})", placeholders.join(", "))
            }
            Condition::IsNull(_) => format!("{col} IS NULL"),
            Condition::IsNotNull(_) => format!("{col} IS NOT NULL"),
        };
        self.sql.push_str(&fragment);
        Ok(())
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn check_arity(table: &str, expected: usize, found: usize) -> Result<(), QueryError> {
    if expected != found {
        return Err(QueryError::ArityMismatch {
            table: table.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

fn column_list(columns: &[&str]) -> Result<String, QueryError> {
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        if *col == "*" {
            out.push("*".to_string());
        } else {
            out.push(quote_checked(col, "column")?);
        }
    }
    Ok(out.join(", "))
}

fn quote_checked(ident: &str, kind: &'static str) -> Result<String, QueryError> {
    if !is_valid_identifier(ident) {
        return Err(QueryError::InvalidIdentifier {
            kind,
            ident: ident.to_string(),
        });
    }
    Ok(ident
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
