use crate::value::Value;

/// A single predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    NotEq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Like(String, String),
    /// An empty list matches nothing.
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(column.into(), value.into())
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::NotEq(column.into(), value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Gt(column.into(), value.into())
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Gte(column.into(), value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Lt(column.into(), value.into())
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Lte(column.into(), value.into())
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::Like(column.into(), pattern.into())
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Condition::IsNotNull(column.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _)
            | Condition::NotEq(c, _)
            | Condition::Gt(c, _)
            | Condition::Gte(c, _)
            | Condition::Lt(c, _)
            | Condition::Lte(c, _)
            | Condition::Like(c, _)
            | Condition::In(c, _)
            | Condition::IsNull(c)
            | Condition::IsNotNull(c) => c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A query refinement. Applied left to right: every `Where` narrows the
/// result further, `OrderBy` entries accumulate, and a later `Limit` or
/// `Offset` replaces an earlier one.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Where(Condition),
    OrderBy(String, Order),
    Limit(u64),
    Offset(u64),
}

impl Criteria {
    pub fn filter(condition: Condition) -> Self {
        Criteria::Where(condition)
    }

    pub fn order_by(column: impl Into<String>, order: Order) -> Self {
        Criteria::OrderBy(column.into(), order)
    }

    pub fn limit(limit: u64) -> Self {
        Criteria::Limit(limit)
    }

    pub fn offset(offset: u64) -> Self {
        Criteria::Offset(offset)
    }
}

impl From<Condition> for Criteria {
    fn from(condition: Condition) -> Self {
        Criteria::Where(condition)
    }
}
