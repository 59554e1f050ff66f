//! Values written by the backend survive a save and a reopen from disk

use chrono::NaiveDate;
use named_cells_core::{ErrorKind, NamedCellsExt, RangeValue, Value};
use named_cells_core::Backend;
use named_cells_xlsx::fixtures::XlsxFixture;
use named_cells_xlsx::XlsxWorkbook;
use pretty_assertions::assert_eq;

fn fixture() -> XlsxFixture {
    XlsxFixture::new()
        .sheet("Data")
        .number("Data", "A1", 1.0)
        .text("Data", "C1", "code")
        .text("Data", "D1", "active")
        .text("Data", "C2", "A")
        .boolean("Data", "D2", true)
        .text("Data", "C3", "B")
        .boolean("Data", "D3", false)
        .error("Data", "F1", "#DIV/0!")
        .name("i.one", "Data!$A$1")
        .name("v.row", "Data!$A$5:$D$5")
        .name("t.flags", "Data!$C$1:$D$3")
        .name("i.error", "Data!$F$1")
        .local_name("i.local", 0, "Data!$A$1")
}

fn date(y: i32, m: u32, d: u32, h: u32) -> Value {
    Value::DateTime(
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap(),
    )
}

fn round_trip(fixture: XlsxFixture, writes: &[(&str, RangeValue)]) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    fixture.write_to(&path).unwrap();

    let mut book = XlsxWorkbook::open_file(&path).unwrap();
    for (name, value) in writes {
        book.write_name(name, value).unwrap();
    }
    book.save(None).unwrap();
    assert!(!book.is_dirty());

    let reopened = XlsxWorkbook::open_file(&path).unwrap();
    for (name, value) in writes {
        assert_eq!(&reopened.read_name(name).unwrap(), value, "{name}");
    }
}

#[test]
fn test_every_shape_survives_reopen() {
    round_trip(
        fixture(),
        &[
            ("i.one", RangeValue::Scalar(date(2024, 2, 29, 6))),
            (
                "v.row",
                RangeValue::Vector(vec![
                    Value::Number(-2.5),
                    Value::text("x & <y>"),
                    Value::Bool(true),
                    date(1999, 12, 31, 23),
                ]),
            ),
            (
                "t.flags",
                RangeValue::Table(vec![
                    vec![Value::text("code"), Value::text("active")],
                    vec![Value::text("Z"), Value::Bool(false)],
                    vec![Value::Null, Value::Number(7.0)],
                ]),
            ),
        ],
    );
}

#[test]
fn test_dates_in_1904_workbook() {
    round_trip(
        fixture().date1904(),
        &[("i.one", RangeValue::Scalar(date(1904, 1, 2, 12)))],
    );
}

#[test]
fn test_read_only_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    fixture().write_to(&path).unwrap();
    let book = XlsxWorkbook::open_file(&path).unwrap();

    assert_eq!(
        book.read_name("i.error").unwrap(),
        RangeValue::Scalar(Value::text("#DIV/0!"))
    );
    assert_eq!(
        book.read_name("v.row").unwrap(),
        RangeValue::Vector(vec![Value::Null; 4])
    );
    assert_eq!(
        book.read_name("i.local").unwrap_err().kind(),
        ErrorKind::AmbiguousScope
    );
    assert_eq!(
        book.names(None),
        vec!["i.error", "i.one", "t.flags", "v.row"]
    );
}
