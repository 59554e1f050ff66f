//! Conversion between native cells and [`Value`]s

use crate::datetime::DateSystem;
use crate::value::{CellWrite, FormatIntent, NativeCell, NativeValue, Value};

/// Convert a native cell to a value
///
/// Formulas yield their cached result, or `Null` when the file carries none.
/// Numbers become `DateTime` only when the cell's number format is a date
/// format and the serial converts; error literals become text.
pub fn to_value(cell: &NativeCell, dates: DateSystem) -> Value {
    match cell.value.effective() {
        None | Some(NativeValue::Empty) => Value::Null,
        Some(NativeValue::Number(n)) => {
            if cell.number_format.is_date_format() {
                dates
                    .to_datetime(*n)
                    .map_or(Value::Number(*n), Value::DateTime)
            } else {
                Value::Number(*n)
            }
        }
        Some(NativeValue::Text(s)) | Some(NativeValue::Error(s)) => Value::Text(s.clone()),
        Some(NativeValue::Bool(b)) => Value::Bool(*b),
        Some(NativeValue::Formula { .. }) => Value::Null,
    }
}

/// Convert a value to the write a backend should perform
pub fn to_native(value: &Value, dates: DateSystem) -> CellWrite {
    match value {
        Value::Null => CellWrite::new(NativeValue::Empty, FormatIntent::Preserve),
        Value::Number(n) => CellWrite::new(NativeValue::Number(*n), FormatIntent::Numeric),
        Value::Text(s) => CellWrite::new(NativeValue::Text(s.clone()), FormatIntent::Preserve),
        Value::Bool(b) => CellWrite::new(NativeValue::Bool(*b), FormatIntent::Preserve),
        Value::DateTime(dt) => CellWrite::new(
            NativeValue::Number(dates.to_serial(*dt)),
            FormatIntent::DateTime,
        ),
    }
}
