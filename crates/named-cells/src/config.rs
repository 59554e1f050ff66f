//! TOML configuration files of named cells
//!
//! A configuration groups names by the sheet their range lives on:
//!
//! ```toml
//! [Inputs]
//! "i.threshold" = 42
//! "t.rates" = [{ code = "A", rate = 0.05 }]
//! ```
//!
//! Scalars map to TOML scalars, vectors to arrays and tables to arrays of
//! records keyed by header label. An empty cell is written as `{}`; inside a
//! record the field is left out.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;
use toml::value::{Date, Datetime, Time};

use named_cells_core::accessor;
use named_cells_core::{Backend, NamedRange, RangeValue, Shape, ShapeDims, Table, Value};

/// Largest magnitude below which integral numbers are exact in an `f64`
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unsupported value for '{name}': {reason}")]
    UnsupportedValue { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Named(#[from] named_cells_core::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    /// The accessor error behind this one, if any
    pub fn named_error(&self) -> Option<&named_cells_core::Error> {
        match self {
            ConfigError::Named(e) => Some(e),
            _ => None,
        }
    }
}

fn unsupported(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::UnsupportedValue {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Values of all workbook-scoped names starting with `prefix`, grouped by sheet
///
/// Groups and the names inside them are sorted.
pub fn export<B: Backend + ?Sized>(book: &B, prefix: Option<&str>) -> ConfigResult<toml::Table> {
    let mut groups: BTreeMap<String, BTreeMap<String, toml::Value>> = BTreeMap::new();
    for name in accessor::names(book, prefix) {
        let range = accessor::resolve(book, &name)?;
        let value = accessor::read_range(book, &range)?;
        let entry = range_to_toml(&range.name, value)?;
        groups
            .entry(range.sheet().to_string())
            .or_default()
            .insert(range.name, entry);
    }

    Ok(groups
        .into_iter()
        .map(|(sheet, names)| (sheet, toml::Value::Table(names.into_iter().collect())))
        .collect())
}

/// [`export`] rendered as a TOML document
pub fn to_toml_string<B: Backend + ?Sized>(book: &B, prefix: Option<&str>) -> ConfigResult<String> {
    Ok(toml::to_string(&export(book, prefix)?)?)
}

/// Flatten a configuration document into `(name, value)` entries
///
/// Group names are ignored; a name may appear only once.
pub fn parse(text: &str) -> ConfigResult<Vec<(String, toml::Value)>> {
    let doc: toml::Table = text.parse()?;
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (group, value) in doc {
        let names = match value {
            toml::Value::Table(names) => names,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "top-level key '{group}' must be a table of names, found {}",
                    other.type_str()
                )))
            }
        };
        for (name, value) in names {
            if !seen.insert(name.to_lowercase()) {
                return Err(ConfigError::Invalid(format!("name '{name}' appears more than once")));
            }
            entries.push((name, value));
        }
    }
    Ok(entries)
}

/// Write every entry of a configuration document to `book`
///
/// All names are resolved, converted and validated before the first cell is
/// written; any failure leaves the workbook unchanged. Header rows of tables
/// are left untouched. Returns the number of names written. The workbook is
/// not saved.
pub fn load<B: Backend + ?Sized>(book: &mut B, text: &str) -> ConfigResult<usize> {
    let entries = parse(text)?;

    let mut plan = Vec::with_capacity(entries.len());
    for (name, value) in &entries {
        let range = accessor::resolve(book, name)?;
        let value = toml_to_range(book, &range, value)?;
        accessor::validate(&range, &value)?;
        accessor::check_writable(book, &range, true)?;
        plan.push((range, value));
    }

    for (range, value) in &plan {
        accessor::write_table_body(book, range, value)?;
    }
    Ok(plan.len())
}

pub(crate) fn range_to_toml(name: &str, value: RangeValue) -> ConfigResult<toml::Value> {
    match value {
        RangeValue::Scalar(v) => scalar_to_toml(name, &v),
        RangeValue::Vector(values) => Ok(toml::Value::Array(
            values
                .iter()
                .map(|v| scalar_to_toml(name, v))
                .collect::<ConfigResult<_>>()?,
        )),
        RangeValue::Table(grid) => {
            let table = Table::from_grid(name, grid)?;
            let records = table
                .records()
                .map(|fields| -> ConfigResult<toml::Value> {
                    let mut record = toml::Table::new();
                    for (label, value) in fields.into_iter().filter(|(_, v)| !v.is_null()) {
                        record.insert(label.to_string(), scalar_to_toml(name, value)?);
                    }
                    Ok(toml::Value::Table(record))
                })
                .collect::<ConfigResult<_>>()?;
            Ok(toml::Value::Array(records))
        }
    }
}

fn scalar_to_toml(name: &str, value: &Value) -> ConfigResult<toml::Value> {
    Ok(match value {
        Value::Null => toml::Value::Table(toml::Table::new()),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_EXACT_INT => {
            toml::Value::Integer(*n as i64)
        }
        Value::Number(n) => toml::Value::Float(*n),
        Value::Text(s) => toml::Value::String(s.clone()),
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::DateTime(dt) => toml::Value::Datetime(datetime_to_toml(name, dt)?),
    })
}

fn datetime_to_toml(name: &str, dt: &NaiveDateTime) -> ConfigResult<Datetime> {
    let year = u16::try_from(dt.year())
        .ok()
        .filter(|y| *y <= 9999)
        .ok_or_else(|| unsupported(name, format!("year {} is outside TOML's range", dt.year())))?;
    let date = Date {
        year,
        month: dt.month() as u8,
        day: dt.day() as u8,
    };
    let time = (dt.time() != NaiveTime::MIN).then(|| Time {
        hour: dt.hour() as u8,
        minute: dt.minute() as u8,
        second: dt.second() as u8,
        nanosecond: dt.nanosecond(),
    });
    Ok(Datetime {
        date: Some(date),
        time,
        offset: None,
    })
}

/// A TOML value as one cell, a list of cells, or a record
enum Element<'a> {
    Scalar(Value),
    Array(&'a [toml::Value]),
    Record(&'a toml::Table),
}

fn classify<'a>(name: &str, value: &'a toml::Value) -> ConfigResult<Element<'a>> {
    Ok(match value {
        toml::Value::String(s) => Element::Scalar(Value::Text(s.clone())),
        toml::Value::Integer(i) => Element::Scalar(Value::Number(*i as f64)),
        toml::Value::Float(f) => Element::Scalar(Value::Number(*f)),
        toml::Value::Boolean(b) => Element::Scalar(Value::Bool(*b)),
        toml::Value::Datetime(dt) => Element::Scalar(toml_to_datetime(name, dt)?),
        toml::Value::Table(t) if t.is_empty() => Element::Scalar(Value::Null),
        toml::Value::Table(t) => Element::Record(t),
        toml::Value::Array(items) => Element::Array(items),
    })
}

fn toml_to_datetime(name: &str, dt: &Datetime) -> ConfigResult<Value> {
    let date = dt
        .date
        .ok_or_else(|| unsupported(name, "a time of day without a date"))?;
    let day = NaiveDate::from_ymd_opt(date.year.into(), date.month.into(), date.day.into())
        .ok_or_else(|| unsupported(name, format!("invalid date {date}")))?;
    let time = match dt.time {
        Some(t) => NaiveTime::from_hms_nano_opt(
            t.hour.into(),
            t.minute.into(),
            t.second.into(),
            t.nanosecond,
        )
        .ok_or_else(|| unsupported(name, format!("invalid time {t}")))?,
        None => NaiveTime::MIN,
    };
    Ok(Value::DateTime(day.and_time(time)))
}

/// Dimensions of a TOML value as the accessor would see them
fn toml_dims(value: &toml::Value) -> ShapeDims {
    match value {
        toml::Value::Table(t) if t.is_empty() => ShapeDims::Scalar,
        toml::Value::Table(t) => ShapeDims::Table {
            rows: 2,
            cols: t.len(),
        },
        toml::Value::Array(items) => {
            if items.iter().all(|v| toml_dims(v) == ShapeDims::Scalar) {
                ShapeDims::Vector(items.len())
            } else if items.iter().all(|v| matches!(v, toml::Value::Table(_))) {
                let cols = items
                    .iter()
                    .filter_map(toml::Value::as_table)
                    .map(toml::Table::len)
                    .max()
                    .unwrap_or(0);
                ShapeDims::Table {
                    rows: items.len() + 1,
                    cols,
                }
            } else {
                ShapeDims::Ragged
            }
        }
        _ => ShapeDims::Scalar,
    }
}

fn mismatch(range: &NamedRange, value: &toml::Value) -> ConfigError {
    ConfigError::Named(named_cells_core::Error::ShapeMismatch {
        name: range.name.clone(),
        expected: range.dims(),
        actual: toml_dims(value),
    })
}

/// Convert a configuration value for the shape of `range`
fn toml_to_range<B: Backend + ?Sized>(
    book: &B,
    range: &NamedRange,
    value: &toml::Value,
) -> ConfigResult<RangeValue> {
    let name = range.name.as_str();
    match (range.shape, classify(name, value)?) {
        (Shape::Scalar, Element::Scalar(v)) => Ok(RangeValue::Scalar(v)),
        (Shape::Vector, Element::Array(items)) => {
            let values = items
                .iter()
                .map(|item| -> ConfigResult<Value> {
                    match classify(name, item)? {
                        Element::Scalar(v) => Ok(v),
                        _ => Err(mismatch(range, value)),
                    }
                })
                .collect::<ConfigResult<_>>()?;
            Ok(RangeValue::Vector(values))
        }
        (Shape::Table, Element::Array(items)) => table_from_records(book, range, value, items),
        _ => Err(mismatch(range, value)),
    }
}

/// Records laid out under the header row currently in the workbook
fn table_from_records<B: Backend + ?Sized>(
    book: &B,
    range: &NamedRange,
    value: &toml::Value,
    items: &[toml::Value],
) -> ConfigResult<RangeValue> {
    let name = range.name.as_str();
    let header_row = match accessor::read_range(book, range)? {
        RangeValue::Table(mut grid) if !grid.is_empty() => grid.swap_remove(0),
        _ => return Err(mismatch(range, value)),
    };
    let labels: Vec<String> = header_row.iter().map(Value::to_label).collect();
    // Rejects duplicate labels
    Table::new(name, labels.clone(), Vec::new())?;

    let mut grid = vec![header_row];
    for item in items {
        let record = match classify(name, item)? {
            Element::Record(record) => record,
            Element::Scalar(Value::Null) => {
                grid.push(vec![Value::Null; labels.len()]);
                continue;
            }
            _ => return Err(mismatch(range, value)),
        };
        if let Some(unknown) = record.keys().find(|k| !labels.iter().any(|l| l == *k)) {
            return Err(unsupported(
                name,
                format!("unknown column '{unknown}' (headers: {})", labels.join(", ")),
            ));
        }
        let row = labels
            .iter()
            .map(|label| -> ConfigResult<Value> {
                match record.get(label) {
                    None => Ok(Value::Null),
                    Some(field) => match classify(name, field)? {
                        Element::Scalar(v) => Ok(v),
                        _ => Err(mismatch(range, value)),
                    },
                }
            })
            .collect::<ConfigResult<_>>()?;
        grid.push(row);
    }
    Ok(RangeValue::Table(grid))
}
