//! Result rows and typed column extraction.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows of one result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create column info from the ordered list of column names.
    ///
    /// When a name repeats, lookups by name resolve to its first occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get the name of a column by index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a query.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a row owning its own column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            values,
            columns: Arc::new(ColumnInfo::new(column_names)),
        }
    }

    /// Create a row sharing column metadata with the rest of its result set.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get a typed value by column index.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.get(index).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!(
                    "index {} out of bounds (row has {} columns)",
                    index,
                    self.len()
                ),
                column: None,
            })
        })?;
        T::from_value(value).map_err(|e| with_column(e, self.columns.name_at(index)))
    }

    /// Get a typed value by column name.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
            })
        })?;
        T::from_value(value).map_err(|e| with_column(e, Some(name)))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Consume the row, returning its values in column order.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

fn with_column(err: Error, column: Option<&str>) -> Error {
    match err {
        Error::Type(mut te) if te.column.is_none() => {
            te.column = column.map(str::to_string);
            Error::Type(te)
        }
        e => e,
    }
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

/// Conversion from a column `Value` to a Rust type.
///
/// Non-optional implementations reject `Value::Null`; wrap the target in
/// `Option` to accept it.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let v = value.as_i64().ok_or_else(|| mismatch("i32", value))?;
        i32::try_from(v).map_err(|_| {
            Error::Type(TypeError {
                expected: "i32",
                actual: format!("value {} out of range", v),
                column: None,
            })
        })
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self> {
        let v = value.as_i64().ok_or_else(|| mismatch("u32", value))?;
        u32::try_from(v).map_err(|_| {
            Error::Type(TypeError {
                expected: "u32",
                actual: format!("value {} out of range", v),
                column: None,
            })
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Json(j) => Ok(j.to_string()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| {
                Error::Type(TypeError {
                    expected: "valid JSON",
                    actual: format!("invalid JSON: {}", e),
                    column: None,
                })
            }),
            _ => Err(mismatch("JSON", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car_row() -> Row {
        Row::new(
            vec!["name".to_string(), "price".to_string(), "sold".to_string()],
            vec![
                Value::Text("Tesla".to_string()),
                Value::Double(40_000.0),
                Value::Null,
            ],
        )
    }

    #[test]
    fn test_row_access_by_index_and_name() {
        let row = car_row();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(0), Some(&Value::Text("Tesla".to_string())));
        assert_eq!(row.get(3), None);
        assert_eq!(row.get_by_name("price"), Some(&Value::Double(40_000.0)));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.get_as::<String>(0).unwrap(), "Tesla");
        assert!((row.get_named::<f64>("price").unwrap() - 40_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_null_requires_option() {
        let row = car_row();
        assert_eq!(row.get_named::<Option<i64>>("sold").unwrap(), None);

        let err = row.get_named::<i64>("sold").unwrap_err();
        match err {
            Error::Type(te) => {
                assert_eq!(te.column.as_deref(), Some("sold"));
                assert_eq!(te.actual, "NULL");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_index_errors_name_the_column() {
        let row = car_row();
        let err = row.get_as::<i64>(0).unwrap_err();
        assert!(matches!(err, Error::Type(ref te) if te.column.as_deref() == Some("name")));
        assert!(row.get_as::<i64>(99).is_err());
    }

    #[test]
    fn test_duplicate_column_names_resolve_to_first() {
        let row = Row::new(
            vec!["a".to_string(), "a".to_string()],
            vec![Value::Int(1), Value::Int(2)],
        );
        assert_eq!(row.get_named::<i32>("a").unwrap(), 1);
        assert_eq!(row.column_names().collect::<Vec<_>>(), vec!["a", "a"]);
    }

    #[test]
    fn test_integer_range_checks() {
        assert!(i32::from_value(&Value::BigInt(i64::MAX)).is_err());
        assert!(u32::from_value(&Value::Int(-1)).is_err());
        assert_eq!(u32::from_value(&Value::BigInt(7)).unwrap(), 7);
    }

    #[test]
    fn test_json_from_text() {
        let v = serde_json::Value::from_value(&Value::Text(r#"{"k":1}"#.to_string())).unwrap();
        assert_eq!(v["k"], 1);
        assert!(serde_json::Value::from_value(&Value::Text("{".to_string())).is_err());
    }

    #[test]
    fn test_shared_columns() {
        let row = car_row();
        let next = Row::with_columns(
            row.column_info(),
            vec![Value::Text("Audi".into()), Value::Double(1.0), Value::Bool(true)],
        );
        assert!(Arc::ptr_eq(&row.column_info(), &next.column_info()));
        assert!(next.get_named::<bool>("sold").unwrap());
        assert_eq!(next.into_values().len(), 3);
    }
}
