//! Result rows.
//!
//! A [`Row`] is an ordered list of `(column, Value)` pairs, independent of the
//! backend that produced it, so rows can be cached and compared.

use crate::error::{DbalError, DbalResult};
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_postgres::types::{FromSql, Type};
use uuid::Uuid;

/// One result row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new(cells: Vec<(String, Value)>) -> Self {
        Self { cells }
    }

    /// Value of the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Like [`Row::get`], but a missing column is a `Decode` error.
    pub fn try_get(&self, column: &str) -> DbalResult<&Value> {
        self.get(column)
            .ok_or_else(|| DbalError::decode(column, "no such column"))
    }

    /// Value at position `index`.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.cells.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Map this row onto any `Deserialize` type, keyed by column name.
    ///
    /// ```ignore
    /// #[derive(serde::Deserialize)]
    /// struct User { id: i64, name: String }
    ///
    /// let user: User = row.deserialize()?;
    /// ```
    pub fn deserialize<T: DeserializeOwned>(&self) -> DbalResult<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .cells
            .iter()
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| DbalError::decode("*", e.to_string()))
    }

    /// Decode a backend row, converting each cell by its column type.
    pub fn from_pg(row: &tokio_postgres::Row) -> DbalResult<Self> {
        let cells = row
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let value = decode_cell(row, idx, column.type_())
                    .map_err(|e| DbalError::decode(column.name(), e))?;
                Ok((column.name().to_string(), value))
            })
            .collect::<DbalResult<Vec<_>>>()?;
        Ok(Self { cells })
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

fn cell<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>, String>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).map_err(|e| e.to_string())
}

fn decode_cell(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value, String> {
    let value = match *ty {
        Type::BOOL => cell::<bool>(row, idx)?.map(Value::Bool),
        Type::CHAR => cell::<i8>(row, idx)?.map(Value::from),
        Type::INT2 => cell::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => cell::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => cell::<i64>(row, idx)?.map(Value::Int),
        Type::OID => cell::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => cell::<f32>(row, idx)?.map(Value::from),
        Type::FLOAT8 => cell::<f64>(row, idx)?.map(Value::Float),
        Type::BYTEA => cell::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        Type::JSON | Type::JSONB => cell::<serde_json::Value>(row, idx)?.map(Value::Json),
        Type::UUID => cell::<Uuid>(row, idx)?.map(Value::Uuid),
        Type::TIMESTAMP => cell::<NaiveDateTime>(row, idx)?.map(|t| Value::Timestamp(t.and_utc())),
        Type::TIMESTAMPTZ => cell::<DateTime<Utc>>(row, idx)?.map(Value::Timestamp),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            cell::<String>(row, idx)?.map(Value::Text)
        }
        _ => return Err(format!("unsupported column type '{ty}'")),
    };
    Ok(value.unwrap_or(Value::Null))
}
