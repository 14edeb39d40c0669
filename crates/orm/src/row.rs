//! Backend-agnostic result rows
//!
//! Drivers decode their native wire rows into `Row` so everything above the
//! driver layer materializes models from one shape. `FromDbValue` handles the
//! column-to-field conversions, with the loose coercions SQLite needs
//! (timestamps stored as text, booleans as integers).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{OrmError, OrmResult};
use crate::value::DbValue;

/// One result row: ordered column names and their decoded values
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<DbValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<DbValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value by column name.
    pub fn get(&self, name: &str) -> OrmResult<&DbValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| &self.values[i])
            .ok_or_else(|| OrmError::Decode(format!("column '{}' not found", name)))
    }

    /// Raw value by position.
    pub fn get_index(&self, index: usize) -> OrmResult<&DbValue> {
        self.values
            .get(index)
            .ok_or_else(|| OrmError::Decode(format!("column index {} out of range", index)))
    }

    /// Typed value by column name.
    pub fn column<T: FromDbValue>(&self, name: &str) -> OrmResult<T> {
        let value = self.get(name)?;
        T::from_db(value)
            .map_err(|e| OrmError::Decode(format!("column '{}': {}", name, e)))
    }

    pub fn to_map(&self) -> HashMap<String, DbValue> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Conversion from a decoded column value into a model field
pub trait FromDbValue: Sized {
    fn from_db(value: &DbValue) -> OrmResult<Self>;
}

fn mismatch(expected: &str, got: &DbValue) -> OrmError {
    OrmError::Decode(format!("expected {}, got {:?}", expected, got))
}

impl FromDbValue for i64 {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::Int64(i) => Ok(*i),
            DbValue::Int32(i) => Ok(*i as i64),
            _ => Err(mismatch("integer", value)),
        }
    }
}

impl FromDbValue for i32 {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::Int32(i) => Ok(*i),
            DbValue::Int64(i) => i32::try_from(*i)
                .map_err(|_| mismatch("32-bit integer", value)),
            _ => Err(mismatch("integer", value)),
        }
    }
}

impl FromDbValue for f64 {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::Float64(f) => Ok(*f),
            DbValue::Int32(i) => Ok(*i as f64),
            DbValue::Int64(i) => Ok(*i as f64),
            _ => Err(mismatch("float", value)),
        }
    }
}

impl FromDbValue for bool {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::Bool(b) => Ok(*b),
            // SQLite and MySQL report booleans as integers
            DbValue::Int32(i) => Ok(*i != 0),
            DbValue::Int64(i) => Ok(*i != 0),
            _ => Err(mismatch("boolean", value)),
        }
    }
}

impl FromDbValue for String {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::String(s) => Ok(s.clone()),
            _ => Err(mismatch("text", value)),
        }
    }
}

impl FromDbValue for Uuid {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::Uuid(u) => Ok(*u),
            DbValue::String(s) => {
                Uuid::parse_str(s).map_err(|_| mismatch("uuid", value))
            }
            _ => Err(mismatch("uuid", value)),
        }
    }
}

impl FromDbValue for DateTime<Utc> {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::DateTime(dt) => Ok(*dt),
            // SQLite stores timestamps as text
            DbValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| mismatch("timestamp", value)),
            _ => Err(mismatch("timestamp", value)),
        }
    }
}

impl FromDbValue for JsonValue {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::Json(j) => Ok(j.clone()),
            DbValue::String(s) => {
                serde_json::from_str(s).map_err(|_| mismatch("json", value))
            }
            _ => Err(mismatch("json", value)),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        match value {
            DbValue::Bytes(b) => Ok(b.clone()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db(value: &DbValue) -> OrmResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_db(value).map(Some)
        }
    }
}
