//! Query Result Rows
//!
//! Rows arrive schema-less from the execution engine. Each cell is a tagged
//! scalar so that downstream branching on shape stays exhaustive.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Numeric view of the cell. Text and non-finite floats are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Float(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

/// One result row: column name to cell, in the engine's column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    cells: Vec<(String, ScalarValue)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Set a cell. A repeated column name replaces the earlier value in place.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<ScalarValue>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.cells.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = ResultRow;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of column name to scalar value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ResultRow, A::Error> {
                let mut row = ResultRow::new();
                while let Some((column, value)) = access.next_entry::<String, ScalarValue>()? {
                    row.push(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_keeps_column_order_in_json() {
        let row = ResultRow::new()
            .with("period", "2025-01")
            .with("metric_value", 100i64)
            .with("note", ScalarValue::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"period":"2025-01","metric_value":100,"note":null}"#);
    }

    #[test]
    fn test_row_from_json_preserves_order_and_types() {
        let row: ResultRow = serde_json::from_str(r#"{"z":1.5,"a":2,"m":"x","n":null}"#).unwrap();
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["z", "a", "m", "n"]);
        assert_eq!(row.get("z"), Some(&ScalarValue::Float(1.5)));
        assert_eq!(row.get("a"), Some(&ScalarValue::Integer(2)));
        assert!(row.get("n").unwrap().is_null());
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(ScalarValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(ScalarValue::Float(f64::NAN).as_f64(), None);
        assert_eq!(ScalarValue::Text("3".to_string()).as_f64(), None);
        assert_eq!(ScalarValue::Null.as_f64(), None);
    }
}
