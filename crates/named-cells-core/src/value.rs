//! Values at the language boundary and their native cell counterparts

use std::fmt;

use chrono::NaiveDateTime;

use crate::number_format::NumberFormat;

/// A coerced cell value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Empty cell
    #[default]
    Null,

    Number(f64),

    Text(String),

    Bool(bool),

    /// Numeric cell displayed with a date/time format
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn text<S: Into<String>>(s: S) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value kind for messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Bool(_) => "boolean",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Label used when the value sits in a table header
    pub fn to_label(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A cell value as stored by the backend
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    #[default]
    Empty,

    /// Numbers, including date serials
    Number(f64),

    Text(String),

    Bool(bool),

    /// Error literal such as `#N/A`
    Error(String),

    /// Formula with its last calculated result, if the file carries one
    Formula {
        text: String,
        cached: Option<Box<NativeValue>>,
    },
}

impl NativeValue {
    /// The cached result for formulas, the value itself otherwise
    pub fn effective(&self) -> Option<&NativeValue> {
        match self {
            NativeValue::Formula { cached, .. } => cached.as_deref().and_then(|v| v.effective()),
            other => Some(other),
        }
    }
}

/// One cell as read from a backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeCell {
    pub value: NativeValue,
    pub number_format: NumberFormat,
}

impl NativeCell {
    pub fn new(value: NativeValue, number_format: NumberFormat) -> Self {
        Self {
            value,
            number_format,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// How a write should treat the cell's number format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatIntent {
    /// Keep whatever style the cell has
    Preserve,
    /// The value must read back as a number: drop a date format if present
    Numeric,
    /// The value must read back as a date: apply a date-time format unless
    /// the cell already has a date format
    DateTime,
}

/// One cell write handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub value: NativeValue,
    pub format: FormatIntent,
}

impl CellWrite {
    pub fn new(value: NativeValue, format: FormatIntent) -> Self {
        Self { value, format }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_value() {
        let formula = NativeValue::Formula {
            text: "A1*2".into(),
            cached: Some(Box::new(NativeValue::Number(4.0))),
        };
        assert_eq!(formula.effective(), Some(&NativeValue::Number(4.0)));

        let uncached = NativeValue::Formula {
            text: "A1*2".into(),
            cached: None,
        };
        assert_eq!(uncached.effective(), None);
        assert_eq!(NativeValue::Empty.effective(), Some(&NativeValue::Empty));
    }

    #[test]
    fn test_labels() {
        assert_eq!(Value::text("code").to_label(), "code");
        assert_eq!(Value::Number(2024.0).to_label(), "2024");
        assert_eq!(Value::Bool(true).to_label(), "TRUE");
        assert_eq!(Value::Null.to_label(), "");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<f64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::text("x"));
    }
}
