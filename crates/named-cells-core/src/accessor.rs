//! Named-range accessor
//!
//! Every operation resolves the name against the handle on each call; nothing
//! about a name is cached between calls.

use crate::address::CellAddress;
use crate::backend::Backend;
use crate::coerce;
use crate::error::{Error, Result};
use crate::named_range::{find_name, resolve_reference, NamedRange, Shape};
use crate::table::{check_headers, RangeValue, Table};
use crate::value::Value;

/// Resolve a workbook-scoped name to its address and shape
pub fn resolve<B: Backend + ?Sized>(book: &B, name: &str) -> Result<NamedRange> {
    let entry = find_name(book.defined_names(), book.sheet_names(), name)?;
    let address = resolve_reference(&entry.name, &entry.refers_to, book.tables())?;
    let sheet = book
        .sheet_names()
        .iter()
        .find(|s| s.eq_ignore_ascii_case(&address.sheet))
        .ok_or_else(|| Error::UnsupportedReference {
            name: entry.name.clone(),
            refers_to: entry.refers_to.clone(),
            reason: format!("no sheet named '{}'", address.sheet),
        })?;
    let mut address = address;
    address.sheet = sheet.clone();
    Ok(NamedRange::new(entry.name.clone(), address))
}

/// Read the value of a name, shaped like its range
pub fn read<B: Backend + ?Sized>(book: &B, name: &str) -> Result<RangeValue> {
    let range = resolve(book, name)?;
    read_range(book, &range)
}

/// Read an already resolved range
pub fn read_range<B: Backend + ?Sized>(book: &B, range: &NamedRange) -> Result<RangeValue> {
    let dates = book.date_system();
    let span = range.range();
    let cell = |addr: CellAddress| -> Result<Value> {
        Ok(coerce::to_value(&book.get(range.sheet(), addr)?, dates))
    };

    Ok(match range.shape {
        Shape::Scalar => RangeValue::Scalar(cell(span.start)?),
        Shape::Vector => RangeValue::Vector(span.cells().map(cell).collect::<Result<_>>()?),
        Shape::Table => RangeValue::Table(
            (0..span.row_count())
                .map(|offset| span.row_cells(offset).map(cell).collect::<Result<Vec<_>>>())
                .collect::<Result<_>>()?,
        ),
    })
}

/// Write a value to a name
///
/// The value must have the range's shape; tables must have unique header
/// labels. Both are checked before any cell is written. The handle is only
/// marked dirty; call [`Backend::save`] to persist.
pub fn write<B: Backend + ?Sized>(book: &mut B, name: &str, value: &RangeValue) -> Result<()> {
    let range = resolve(book, name)?;
    validate(&range, value)?;
    check_writable(book, &range, false)?;
    write_range(book, &range, value)
}

/// Check that every cell of `range` can be written, leaving out the header
/// row of a table when `skip_header` is set
pub fn check_writable<B: Backend + ?Sized>(
    book: &B,
    range: &NamedRange,
    skip_header: bool,
) -> Result<()> {
    let span = range.range();
    let first_row = span.start.row + u32::from(skip_header && range.shape == Shape::Table);
    for addr in span.cells().filter(|a| a.row >= first_row) {
        book.check_write(range.sheet(), addr)?;
    }
    Ok(())
}

/// Check `value` against the shape of `range`
pub fn validate(range: &NamedRange, value: &RangeValue) -> Result<()> {
    let expected = range.dims();
    let actual = value.dims();
    if expected != actual {
        return Err(Error::ShapeMismatch {
            name: range.name.clone(),
            expected,
            actual,
        });
    }
    if let RangeValue::Table(rows) = value {
        let headers: Vec<String> = rows
            .first()
            .map(|r| r.iter().map(Value::to_label).collect())
            .unwrap_or_default();
        check_headers(&range.name, &headers)?;
    }
    Ok(())
}

/// Write an already validated value
pub fn write_range<B: Backend + ?Sized>(
    book: &mut B,
    range: &NamedRange,
    value: &RangeValue,
) -> Result<()> {
    let dates = book.date_system();
    let values: Vec<&Value> = match value {
        RangeValue::Scalar(v) => vec![v],
        RangeValue::Vector(values) => values.iter().collect(),
        RangeValue::Table(rows) => rows.iter().flatten().collect(),
    };
    for (addr, v) in range.range().cells().zip(values) {
        book.set(range.sheet(), addr, coerce::to_native(v, dates))?;
    }
    Ok(())
}

/// Write an already validated value, leaving the header row of a table as
/// it is in the workbook
///
/// Scalars and vectors are written like [`write_range`] does.
pub fn write_table_body<B: Backend + ?Sized>(
    book: &mut B,
    range: &NamedRange,
    value: &RangeValue,
) -> Result<()> {
    let rows = match value {
        RangeValue::Table(rows) if range.shape == Shape::Table => rows,
        other => return write_range(book, range, other),
    };
    let dates = book.date_system();
    let span = *range.range();
    for (offset, row) in (1..span.row_count()).zip(rows.iter().skip(1)) {
        for (addr, v) in span.row_cells(offset).zip(row) {
            book.set(range.sheet(), addr, coerce::to_native(v, dates))?;
        }
    }
    Ok(())
}

/// Read a table range as headers plus body rows
pub fn as_table<B: Backend + ?Sized>(book: &B, range: &NamedRange) -> Result<Table> {
    if range.shape != Shape::Table {
        return Err(Error::NotTabular {
            name: range.name.clone(),
            shape: range.shape,
        });
    }
    match read_range(book, range)? {
        RangeValue::Table(grid) => Table::from_grid(&range.name, grid),
        _ => Err(Error::NotTabular {
            name: range.name.clone(),
            shape: range.shape,
        }),
    }
}

/// Write a table (header row plus body) to a name
pub fn write_table<B: Backend + ?Sized>(book: &mut B, name: &str, table: &Table) -> Result<()> {
    write(book, name, &RangeValue::Table(table.to_grid()))
}

/// Workbook-scoped names starting with `prefix`, sorted
///
/// Built-in names (`_xlnm.*`) are skipped.
pub fn names<B: Backend + ?Sized>(book: &B, prefix: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = book
        .defined_names()
        .iter()
        .filter(|n| n.is_workbook_scoped())
        .filter(|n| !n.name.starts_with("_xlnm."))
        .filter(|n| prefix.map_or(true, |p| n.name.starts_with(p)))
        .map(|n| n.name.clone())
        .collect();
    out.sort();
    out.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    out
}

/// Accessor operations as methods on any backend
pub trait NamedCellsExt: Backend {
    fn resolve_name(&self, name: &str) -> Result<NamedRange> {
        resolve(self, name)
    }

    fn read_name(&self, name: &str) -> Result<RangeValue> {
        read(self, name)
    }

    fn write_name(&mut self, name: &str, value: &RangeValue) -> Result<()> {
        write(self, name, value)
    }

    fn read_table(&self, name: &str) -> Result<Table> {
        let range = resolve(self, name)?;
        as_table(self, &range)
    }

    fn write_table(&mut self, name: &str, table: &Table) -> Result<()> {
        write_table(self, name, table)
    }

    fn names(&self, prefix: Option<&str>) -> Vec<String> {
        names(self, prefix)
    }
}

impl<B: Backend + ?Sized> NamedCellsExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::DateSystem;
    use crate::error::{ErrorKind, ShapeDims};
    use crate::named_range::{DefinedName, NameScope, TableDef};
    use crate::number_format::NumberFormat;
    use crate::value::{CellWrite, FormatIntent, NativeCell, NativeValue};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::Path;

    /// Backend over a map of cells
    #[derive(Default)]
    struct MemoryBook {
        sheets: Vec<String>,
        names: Vec<DefinedName>,
        tables: Vec<TableDef>,
        cells: HashMap<(String, CellAddress), NativeCell>,
        dirty: bool,
    }

    impl MemoryBook {
        fn sample() -> Self {
            let mut book = MemoryBook {
                sheets: vec!["Inputs".into(), "Calc".into()],
                names: vec![
                    DefinedName::new("i.threshold", "Inputs!$B$1"),
                    DefinedName::new("i.start", "Inputs!$B$2"),
                    DefinedName::new("v.weights", "Inputs!$D$1:$D$4"),
                    DefinedName::new("t.rates", "Inputs!$A$5:$B$7"),
                    DefinedName::new("t.prices", "Prices"),
                    DefinedName::new("local", "Calc!$A$1").with_scope(NameScope::Sheet(1)),
                ],
                tables: vec![TableDef {
                    name: "Prices".into(),
                    sheet: "Calc".into(),
                    range: crate::address::CellRange::parse("A1:B3").unwrap(),
                    header_rows: 1,
                    totals_rows: 0,
                    columns: vec!["item".into(), "price".into()],
                }],
                ..Default::default()
            };
            book.put("Inputs", "B1", NativeValue::Number(42.0), NumberFormat::General);
            book.put("Inputs", "B2", NativeValue::Number(45292.5), NumberFormat::from_id(22));
            book.put("Inputs", "D1", NativeValue::Number(1.0), NumberFormat::General);
            book.put("Inputs", "D3", NativeValue::Number(3.0), NumberFormat::General);
            book.put("Inputs", "A5", NativeValue::Text("code".into()), NumberFormat::General);
            book.put("Inputs", "B5", NativeValue::Text("rate".into()), NumberFormat::General);
            book.put("Inputs", "A6", NativeValue::Text("A".into()), NumberFormat::General);
            book.put("Inputs", "B6", NativeValue::Number(0.05), NumberFormat::General);
            book.put("Inputs", "A7", NativeValue::Text("B".into()), NumberFormat::General);
            book.put("Inputs", "B7", NativeValue::Number(0.07), NumberFormat::General);
            book.put("Calc", "A1", NativeValue::Text("item".into()), NumberFormat::General);
            book.put("Calc", "B1", NativeValue::Text("price".into()), NumberFormat::General);
            book.put("Calc", "A2", NativeValue::Text("pen".into()), NumberFormat::General);
            book.put("Calc", "B2", NativeValue::Number(1.5), NumberFormat::General);
            book.dirty = false;
            book
        }

        fn put(&mut self, sheet: &str, a1: &str, value: NativeValue, fmt: NumberFormat) {
            let addr = CellAddress::parse(a1).unwrap();
            self.cells
                .insert((sheet.to_string(), addr), NativeCell::new(value, fmt));
        }
    }

    impl Backend for MemoryBook {
        fn open(_path: &Path) -> Result<Self> {
            Ok(Self::sample())
        }

        fn path(&self) -> Option<&Path> {
            None
        }

        fn sheet_names(&self) -> &[String] {
            &self.sheets
        }

        fn defined_names(&self) -> &[DefinedName] {
            &self.names
        }

        fn tables(&self) -> &[TableDef] {
            &self.tables
        }

        fn date_system(&self) -> DateSystem {
            DateSystem::Excel1900
        }

        fn get(&self, sheet: &str, cell: CellAddress) -> Result<NativeCell> {
            Ok(self
                .cells
                .get(&(sheet.to_string(), cell))
                .cloned()
                .unwrap_or_default())
        }

        fn used_range(&self, sheet: &str) -> Result<Option<crate::address::CellRange>> {
            Ok(crate::address::CellRange::covering(
                self.cells
                    .iter()
                    .filter(|((s, _), cell)| s == sheet && cell.value != NativeValue::Empty)
                    .map(|((_, addr), _)| *addr),
            ))
        }

        fn set(&mut self, sheet: &str, cell: CellAddress, write: CellWrite) -> Result<()> {
            let entry = self.cells.entry((sheet.to_string(), cell)).or_default();
            entry.value = write.value;
            match write.format {
                FormatIntent::Preserve => {}
                FormatIntent::Numeric if entry.number_format.is_date_format() => {
                    entry.number_format = NumberFormat::General;
                }
                FormatIntent::Numeric => {}
                FormatIntent::DateTime if entry.number_format.is_date_format() => {}
                FormatIntent::DateTime => {
                    entry.number_format = NumberFormat::from_id(NumberFormat::ID_DATETIME);
                }
            }
            self.dirty = true;
            Ok(())
        }

        fn is_dirty(&self) -> bool {
            self.dirty
        }

        fn save(&mut self, _path: Option<&Path>) -> Result<()> {
            self.dirty = false;
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32, h: u32) -> Value {
        Value::DateTime(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap())
    }

    #[test]
    fn test_read_shapes() {
        let book = MemoryBook::sample();
        assert_eq!(book.read_name("i.threshold").unwrap(), RangeValue::Scalar(Value::Number(42.0)));
        assert_eq!(book.read_name("I.START").unwrap(), RangeValue::Scalar(date(2024, 1, 1, 12)));
        assert_eq!(
            book.read_name("v.weights").unwrap(),
            RangeValue::Vector(vec![
                Value::Number(1.0),
                Value::Null,
                Value::Number(3.0),
                Value::Null
            ])
        );
        let table = book.read_table("t.rates").unwrap();
        assert_eq!(table.headers, vec!["code", "rate"]);
        assert_eq!(table.rows[1], vec![Value::text("B"), Value::Number(0.07)]);
    }

    #[test]
    fn test_resolve_errors() {
        let book = MemoryBook::sample();
        assert_eq!(book.read_name("missing").unwrap_err().kind(), ErrorKind::NameNotFound);
        assert_eq!(book.read_name("local").unwrap_err().kind(), ErrorKind::AmbiguousScope);
    }

    #[test]
    fn test_structured_reference_includes_header() {
        let book = MemoryBook::sample();
        let range = book.resolve_name("t.prices").unwrap();
        assert_eq!(range.address.to_string(), "Calc!A1:B3");
        assert_eq!(range.shape, Shape::Table);

        let prices = book.read_table("t.prices").unwrap();
        assert_eq!(prices.headers, vec!["item", "price"]);
        assert_eq!(prices.rows[0], vec![Value::text("pen"), Value::Number(1.5)]);
    }

    #[test]
    fn test_write_table_body_keeps_header_cells() {
        let mut book = MemoryBook::sample();
        let header = NativeValue::Formula {
            text: "\"co\"&\"de\"".into(),
            cached: Some(Box::new(NativeValue::Text("code".into()))),
        };
        book.put("Inputs", "A5", header.clone(), NumberFormat::General);

        let range = book.resolve_name("t.rates").unwrap();
        let value = RangeValue::Table(vec![
            vec![Value::text("code"), Value::text("rate")],
            vec![Value::text("X"), Value::Number(1.0)],
            vec![Value::text("Y"), Value::Number(2.0)],
        ]);
        validate(&range, &value).unwrap();
        write_table_body(&mut book, &range, &value).unwrap();

        let a5 = CellAddress::parse("A5").unwrap();
        assert_eq!(book.get("Inputs", a5).unwrap().value, header);
        assert_eq!(book.read_name("t.rates").unwrap(), value);
    }

    #[test]
    fn test_shape_mismatch_leaves_cells() {
        let mut book = MemoryBook::sample();
        let value = RangeValue::Vector(vec![Value::Number(1.0); 6]);
        let err = book.write_name("t.rates", &value).unwrap_err();
        match err {
            Error::ShapeMismatch { expected, actual, .. } => {
                assert_eq!(expected, ShapeDims::Table { rows: 3, cols: 2 });
                assert_eq!(actual, ShapeDims::Vector(6));
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
        assert!(!book.is_dirty());
        assert_eq!(book.read_table("t.rates").unwrap().rows[0][1], Value::Number(0.05));
    }

    #[test]
    fn test_write_round_trips() {
        let mut book = MemoryBook::sample();
        let cases = [
            ("i.threshold", RangeValue::Scalar(Value::text("high"))),
            ("i.threshold", RangeValue::Scalar(Value::Bool(true))),
            ("i.threshold", RangeValue::Scalar(date(2030, 6, 1, 0))),
            ("i.start", RangeValue::Scalar(Value::Number(7.0))),
            (
                "v.weights",
                RangeValue::Vector(vec![
                    Value::Null,
                    Value::text(""),
                    Value::Number(f64::INFINITY),
                    date(1999, 12, 31, 23),
                ]),
            ),
            (
                "t.rates",
                RangeValue::Table(vec![
                    vec![Value::text("code"), Value::text("rate")],
                    vec![Value::text("X"), Value::Number(1.0)],
                    vec![Value::Bool(false), Value::Null],
                ]),
            ),
        ];
        for (name, value) in cases {
            book.write_name(name, &value).unwrap();
            assert_eq!(book.read_name(name).unwrap(), value, "{name}");
        }
        assert!(book.is_dirty());
    }

    #[test]
    fn test_table_header_conflict() {
        let mut book = MemoryBook::sample();
        let value = RangeValue::Table(vec![
            vec![Value::text("code"), Value::text("code")],
            vec![Value::Null, Value::Null],
            vec![Value::Null, Value::Null],
        ]);
        assert_eq!(
            book.write_name("t.rates", &value).unwrap_err().kind(),
            ErrorKind::HeaderConflict
        );
        assert!(!book.is_dirty());
    }

    #[test]
    fn test_not_tabular() {
        let book = MemoryBook::sample();
        assert_eq!(book.read_table("v.weights").unwrap_err().kind(), ErrorKind::NotTabular);
        assert_eq!(book.read_table("i.threshold").unwrap_err().kind(), ErrorKind::NotTabular);
    }

    #[test]
    fn test_write_table() {
        let mut book = MemoryBook::sample();
        let table = Table::new(
            "t.rates",
            vec!["code".into(), "rate".into()],
            vec![
                vec![Value::text("C"), Value::Number(0.1)],
                vec![Value::text("D"), Value::Number(0.2)],
            ],
        )
        .unwrap();
        book.write_table("t.rates", &table).unwrap();
        assert_eq!(book.read_table("t.rates").unwrap(), table);
    }

    /// Refuses writes to one cell, like a backend guarding formula cells
    struct GuardedBook {
        inner: MemoryBook,
        guarded: CellAddress,
    }

    impl Backend for GuardedBook {
        fn open(path: &Path) -> Result<Self> {
            Ok(Self {
                inner: MemoryBook::open(path)?,
                guarded: CellAddress::parse("B7").unwrap(),
            })
        }

        fn path(&self) -> Option<&Path> {
            None
        }

        fn sheet_names(&self) -> &[String] {
            self.inner.sheet_names()
        }

        fn defined_names(&self) -> &[DefinedName] {
            self.inner.defined_names()
        }

        fn tables(&self) -> &[TableDef] {
            self.inner.tables()
        }

        fn date_system(&self) -> DateSystem {
            self.inner.date_system()
        }

        fn get(&self, sheet: &str, cell: CellAddress) -> Result<NativeCell> {
            self.inner.get(sheet, cell)
        }

        fn used_range(&self, sheet: &str) -> Result<Option<crate::address::CellRange>> {
            self.inner.used_range(sheet)
        }

        fn check_write(&self, _sheet: &str, cell: CellAddress) -> Result<()> {
            if cell == self.guarded {
                return Err(Error::backend(format!("{cell} is read-only")));
            }
            Ok(())
        }

        fn set(&mut self, sheet: &str, cell: CellAddress, write: CellWrite) -> Result<()> {
            self.check_write(sheet, cell)?;
            self.inner.set(sheet, cell, write)
        }

        fn is_dirty(&self) -> bool {
            self.inner.is_dirty()
        }

        fn save(&mut self, path: Option<&Path>) -> Result<()> {
            self.inner.save(path)
        }
    }

    #[test]
    fn test_refused_cell_writes_nothing() {
        let mut book = GuardedBook::open(Path::new("unused")).unwrap();
        let value = RangeValue::Table(vec![
            vec![Value::text("code"), Value::text("rate")],
            vec![Value::text("X"), Value::Number(1.0)],
            vec![Value::text("Y"), Value::Number(2.0)],
        ]);
        let err = book.write_name("t.rates", &value).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendIo);
        assert!(!book.is_dirty());

        book.guarded = CellAddress::parse("A5").unwrap();
        let range = book.resolve_name("t.rates").unwrap();
        assert!(check_writable(&book, &range, false).is_err());
        check_writable(&book, &range, true).unwrap();
    }

    #[test]
    fn test_names_listing() {
        let book = MemoryBook::sample();
        assert_eq!(book.names(Some("i.")), vec!["i.start", "i.threshold"]);
        let all = book.names(None);
        assert!(!all.contains(&"local".to_string()));
        assert_eq!(all.len(), 5);
    }
}
