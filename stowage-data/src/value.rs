/// Storage type of a column, independent of the SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    BigInt,
    Double,
    Text,
    Bool,
    Bytes,
}

/// A bindable SQL parameter.
///
/// `Null` carries the column type so the driver can bind a correctly typed
/// NULL; Postgres rejects untyped NULL parameters in several positions.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Null(ColumnType),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// `true` for values that cannot identify a row: null, `0`, and empty
    /// text or bytes.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null(_) => true,
            Value::Int(i) => *i == 0,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Bool(_) | Value::Float(_) => false,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Bool(_) => ColumnType::Bool,
            Value::Int(_) => ColumnType::BigInt,
            Value::Float(_) => ColumnType::Double,
            Value::Text(_) => ColumnType::Text,
            Value::Bytes(_) => ColumnType::Bytes,
            Value::Null(ty) => *ty,
        }
    }
}

/// Rust types with a fixed column type, so `Option<T>` can become a typed NULL.
pub trait HasColumnType {
    const COLUMN_TYPE: ColumnType;
}

macro_rules! impl_value {
    ($ty:ty, $column:ident, |$v:ident| $conv:expr) => {
        impl HasColumnType for $ty {
            const COLUMN_TYPE: ColumnType = ColumnType::$column;
        }

        impl From<$ty> for Value {
            fn from($v: $ty) -> Self {
                $conv
            }
        }
    };
}

impl_value!(bool, Bool, |v| Value::Bool(v));
impl_value!(i64, BigInt, |v| Value::Int(v));
impl_value!(i32, BigInt, |v| Value::Int(i64::from(v)));
impl_value!(i16, BigInt, |v| Value::Int(i64::from(v)));
impl_value!(u32, BigInt, |v| Value::Int(i64::from(v)));
impl_value!(f64, Double, |v| Value::Float(v));
impl_value!(f32, Double, |v| Value::Float(f64::from(v)));
impl_value!(String, Text, |v| Value::Text(v));
impl_value!(Vec<u8>, Bytes, |v| Value::Bytes(v));

impl HasColumnType for &str {
    const COLUMN_TYPE: ColumnType = ColumnType::Text;
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl HasColumnType for &[u8] {
    const COLUMN_TYPE: ColumnType = ColumnType::Bytes;
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value> + HasColumnType,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null(T::COLUMN_TYPE),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Null(_) => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_keeps_its_column_type() {
        assert_eq!(Value::from(None::<i64>), Value::Null(ColumnType::BigInt));
        assert_eq!(Value::from(None::<String>), Value::Null(ColumnType::Text));
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn narrow_integers_widen() {
        assert_eq!(Value::from(7i32), Value::Int(7));
        assert_eq!(Value::from(7u32).column_type(), ColumnType::BigInt);
    }

    #[test]
    fn zero_values_cannot_identify_a_row() {
        assert!(Value::Int(0).is_zero());
        assert!(Value::from("").is_zero());
        assert!(Value::Bytes(Vec::new()).is_zero());
        assert!(Value::from(None::<i64>).is_zero());
        assert!(!Value::Int(-1).is_zero());
        assert!(!Value::from("0").is_zero());
        assert!(!Value::Bool(false).is_zero());
    }
}
