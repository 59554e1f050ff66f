//! Range values and header-labelled tables

use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result, ShapeDims};
use crate::value::Value;

/// Contents of a named range, shaped like the range
#[derive(Debug, Clone, PartialEq)]
pub enum RangeValue {
    Scalar(Value),
    Vector(Vec<Value>),
    /// Row-major, first row holds the headers
    Table(Vec<Vec<Value>>),
}

impl RangeValue {
    /// Dimensions as reported in shape errors
    pub fn dims(&self) -> ShapeDims {
        match self {
            RangeValue::Scalar(_) => ShapeDims::Scalar,
            RangeValue::Vector(v) => ShapeDims::Vector(v.len()),
            RangeValue::Table(rows) => {
                let cols = rows.first().map_or(0, Vec::len);
                if rows.iter().any(|r| r.len() != cols) {
                    ShapeDims::Ragged
                } else {
                    ShapeDims::Table {
                        rows: rows.len(),
                        cols,
                    }
                }
            }
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            RangeValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            RangeValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Cells in row-major order
    pub fn into_cells(self) -> Vec<Value> {
        match self {
            RangeValue::Scalar(v) => vec![v],
            RangeValue::Vector(v) => v,
            RangeValue::Table(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

impl From<Value> for RangeValue {
    fn from(v: Value) -> Self {
        RangeValue::Scalar(v)
    }
}

impl From<Vec<Value>> for RangeValue {
    fn from(v: Vec<Value>) -> Self {
        RangeValue::Vector(v)
    }
}

impl From<Vec<Vec<Value>>> for RangeValue {
    fn from(rows: Vec<Vec<Value>>) -> Self {
        RangeValue::Table(rows)
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeValue::Scalar(v) => write!(f, "{v}"),
            RangeValue::Vector(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            RangeValue::Table(rows) => {
                let cols = rows.first().map_or(0, Vec::len);
                write!(f, "<{}x{} table>", rows.len(), cols)
            }
        }
    }
}

/// A table range split into header labels and body rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table, checking that labels are unique and rows are as wide
    /// as the header
    pub fn new(name: &str, headers: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        check_headers(name, &headers)?;
        if let Some(bad) = rows.iter().find(|r| r.len() != headers.len()) {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: ShapeDims::Vector(headers.len()),
                actual: ShapeDims::Vector(bad.len()),
            });
        }
        Ok(Self { headers, rows })
    }

    /// Split a row-major grid at its first row
    pub fn from_grid(name: &str, grid: Vec<Vec<Value>>) -> Result<Self> {
        let mut rows = grid.into_iter();
        let headers = rows
            .next()
            .unwrap_or_default()
            .iter()
            .map(Value::to_label)
            .collect();
        Self::new(name, headers, rows.collect())
    }

    /// Header row followed by the body
    pub fn to_grid(&self) -> Vec<Vec<Value>> {
        std::iter::once(self.headers.iter().map(|h| Value::text(h.as_str())).collect())
            .chain(self.rows.iter().cloned())
            .collect()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == label)
    }

    /// Values of one column
    pub fn column(&self, label: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(label)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Body rows as `(label, value)` pairs
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> + '_ {
        self.rows.iter().map(|row| {
            self.headers
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }
}

/// Labels must be unique
pub(crate) fn check_headers(name: &str, headers: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(headers.len());
    for label in headers {
        if !seen.insert(label.as_str()) {
            return Err(Error::HeaderConflict {
                name: name.to_string(),
                label: label.clone(),
            });
        }
    }
    Ok(())
}
