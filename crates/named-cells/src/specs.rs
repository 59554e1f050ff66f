//! Listing of named cells with their addresses and current values

use std::io::Write;

use serde::Serialize;

use named_cells_core::accessor;
use named_cells_core::{Backend, CellRange, RangeValue, Result, Shape};

use crate::config::range_to_toml;

/// One row of a name listing
#[derive(Debug, Clone, PartialEq)]
pub struct NameSpec {
    pub sheet: String,
    pub range: CellRange,
    pub name: String,
    pub shape: Shape,
    pub value: RangeValue,
}

impl NameSpec {
    /// The value as one line of text: scalars as-is, vectors and tables in
    /// TOML inline syntax
    pub fn value_text(&self) -> String {
        match &self.value {
            RangeValue::Scalar(v) => v.to_string(),
            other => range_to_toml(&self.name, other.clone())
                .map(|t| t.to_string())
                .unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// Workbook-scoped names starting with `prefix`, sorted by sheet, range and
/// name
pub fn specifications<B: Backend + ?Sized>(book: &B, prefix: Option<&str>) -> Result<Vec<NameSpec>> {
    let mut specs = accessor::names(book, prefix)
        .iter()
        .map(|name| {
            let range = accessor::resolve(book, name)?;
            let value = accessor::read_range(book, &range)?;
            Ok(NameSpec {
                sheet: range.sheet().to_string(),
                range: *range.range(),
                shape: range.shape,
                name: range.name,
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    specs.sort_by(|a, b| {
        (&a.sheet, a.range.start, a.range.end, &a.name)
            .cmp(&(&b.sheet, b.range.start, b.range.end, &b.name))
    });
    Ok(specs)
}

/// One CSV row of [`write_csv`]
#[derive(Serialize)]
struct Row<'a> {
    sheet: &'a str,
    range: String,
    name: &'a str,
    shape: &'static str,
    value: String,
}

const HEADER: [&str; 5] = ["sheet", "range", "name", "shape", "value"];

/// Write `specs` as CSV with columns `sheet,range,name,shape,value`
///
/// The header row is written even when there are no names.
pub fn write_csv<W: Write>(specs: &[NameSpec], writer: W) -> csv::Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer.write_record(HEADER)?;
    for spec in specs {
        csv_writer.serialize(Row {
            sheet: &spec.sheet,
            range: spec.range.to_a1_string(),
            name: &spec.name,
            shape: spec.shape.as_str(),
            value: spec.value_text(),
        })?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use named_cells_core::Value;
    use pretty_assertions::assert_eq;

    fn spec(name: &str, range: &str, value: RangeValue) -> NameSpec {
        let range = CellRange::parse(range).unwrap();
        NameSpec {
            sheet: "Inputs".into(),
            shape: Shape::of(&range),
            range,
            name: name.into(),
            value,
        }
    }

    #[test]
    fn test_value_text() {
        let scalar = spec("i.a", "B1", RangeValue::Scalar(Value::text("hello")));
        assert_eq!(scalar.value_text(), "hello");
        let vector = spec(
            "v.a",
            "B1:B2",
            RangeValue::Vector(vec![Value::Number(1.0), Value::Number(2.5)]),
        );
        assert_eq!(vector.value_text(), "[1, 2.5]");
    }

    #[test]
    fn test_write_csv() {
        let specs = vec![
            spec("i.a", "B1", RangeValue::Scalar(Value::Number(42.0))),
            spec("i.b", "B2", RangeValue::Scalar(Value::text("x, y"))),
        ];
        let mut out = Vec::new();
        write_csv(&specs, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "sheet,range,name,shape,value\nInputs,B1,i.a,scalar,42\nInputs,B2,i.b,scalar,\"x, y\"\n"
        );
    }
}
