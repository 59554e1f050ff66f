//! Export to TOML and load back through the pure-data backend

use std::path::Path;

use named_cells::config::{self, ConfigError};
use named_cells::prelude::*;
use named_cells::ErrorKind;
use named_cells_xlsx::fixtures::{XlsxFixture, STYLE_DATE};
use pretty_assertions::assert_eq;

fn model(threshold: f64, code: &str, rate: f64) -> XlsxFixture {
    XlsxFixture::new()
        .sheet("Inputs")
        .text("Inputs", "A1", "threshold")
        .number("Inputs", "B1", threshold)
        .text("Inputs", "D1", "code")
        .text("Inputs", "E1", "rate")
        .text("Inputs", "D2", code)
        .number("Inputs", "E2", rate)
        .name("i.threshold", "Inputs!$B$1")
        .name("t.rates", "Inputs!$D$1:$E$2")
}

fn open(fixture: &XlsxFixture, dir: &Path, file: &str) -> XlsxWorkbook {
    let path = dir.join(file);
    fixture.write_to(&path).unwrap();
    XlsxWorkbook::open_file(&path).unwrap()
}

fn toml_table(text: &str) -> toml::Table {
    text.parse().unwrap()
}

#[test]
fn test_export_example() {
    let dir = tempfile::tempdir().unwrap();
    let book = open(&model(42.0, "A", 0.05), dir.path(), "model.xlsx");

    assert_eq!(
        config::export(&book, None).unwrap(),
        toml_table(
            r#"
            [Inputs]
            "i.threshold" = 42
            "t.rates" = [{ code = "A", rate = 0.05 }]
            "#
        )
    );

    let text = config::to_toml_string(&book, None).unwrap();
    assert_eq!(toml_table(&text), config::export(&book, None).unwrap());
}

#[test]
fn test_load_onto_fresh_copy() {
    let dir = tempfile::tempdir().unwrap();
    let source = open(&model(42.0, "A", 0.05), dir.path(), "source.xlsx");
    let text = config::to_toml_string(&source, None).unwrap();

    let mut target = open(&model(0.0, "Z", 9.0), dir.path(), "target.xlsx");
    assert_eq!(config::load(&mut target, &text).unwrap(), 2);
    assert!(target.is_dirty());
    target.save(None).unwrap();

    let reopened = XlsxWorkbook::open_file(dir.path().join("target.xlsx")).unwrap();
    assert_eq!(
        config::export(&reopened, None).unwrap(),
        config::export(&source, None).unwrap()
    );
    assert_eq!(
        reopened.read_name("i.threshold").unwrap(),
        RangeValue::Scalar(Value::Number(42.0))
    );
}

#[test]
fn test_failed_validation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open(&model(1.0, "A", 0.5), dir.path(), "model.xlsx");

    let err = config::load(
        &mut book,
        r#"
        [Inputs]
        "i.threshold" = 99
        "t.rates" = [1, 2]
        "#,
    )
    .unwrap_err();
    assert_eq!(
        err.named_error().map(|e| e.kind()),
        Some(ErrorKind::ShapeMismatch)
    );
    assert!(!book.is_dirty());
    assert_eq!(
        book.read_name("i.threshold").unwrap(),
        RangeValue::Scalar(Value::Number(1.0))
    );
}

#[test]
fn test_unknown_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open(&model(1.0, "A", 0.5), dir.path(), "model.xlsx");
    let err = config::load(&mut book, "[Inputs]\n\"i.missing\" = 1\n").unwrap_err();
    assert_eq!(
        err.named_error().map(|e| e.kind()),
        Some(ErrorKind::NameNotFound)
    );
}

#[test]
fn test_table_row_count_must_match() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open(&model(1.0, "A", 0.5), dir.path(), "model.xlsx");
    let err = config::load(
        &mut book,
        "[Inputs]\n\"t.rates\" = [{ code = \"A\", rate = 1 }, { code = \"B\", rate = 2 }]\n",
    )
    .unwrap_err();
    assert_eq!(
        err.named_error().map(|e| e.kind()),
        Some(ErrorKind::ShapeMismatch)
    );
}

#[test]
fn test_unknown_column() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open(&model(1.0, "A", 0.5), dir.path(), "model.xlsx");
    let err = config::load(&mut book, "[Inputs]\n\"t.rates\" = [{ kode = \"A\" }]\n").unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedValue { .. }));
    assert!(!book.is_dirty());
}

#[test]
fn test_nulls_and_dates() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = XlsxFixture::new()
        .sheet("Data")
        .number("Data", "A1", 1.0)
        .number("Data", "A3", 3.0)
        .styled_number("Data", "C1", 45292.0, STYLE_DATE)
        .text("Data", "E1", "a")
        .text("Data", "F1", "b")
        .number("Data", "E2", 1.0)
        .name("v.list", "Data!$A$1:$A$3")
        .name("i.start", "Data!$C$1")
        .name("i.blank", "Data!$C$2")
        .name("t.sparse", "Data!$E$1:$F$2");
    let book = open(&fixture, dir.path(), "data.xlsx");
    let exported = config::export(&book, None).unwrap();
    assert_eq!(
        exported,
        toml_table(
            r#"
            [Data]
            "i.blank" = {}
            "i.start" = 2024-01-01
            "t.sparse" = [{ a = 1 }]
            "v.list" = [1, {}, 3]
            "#
        )
    );

    let text = toml::to_string(&exported).unwrap();
    let mut copy = open(&fixture, dir.path(), "copy.xlsx");
    config::load(&mut copy, &text).unwrap();
    assert_eq!(
        copy.read_name("v.list").unwrap(),
        RangeValue::Vector(vec![Value::Number(1.0), Value::Null, Value::Number(3.0)])
    );
    assert_eq!(
        copy.read_name("t.sparse").unwrap(),
        RangeValue::Table(vec![
            vec![Value::text("a"), Value::text("b")],
            vec![Value::Number(1.0), Value::Null],
        ])
    );
    assert_eq!(config::export(&copy, None).unwrap(), exported);
}

#[test]
fn test_prefix_filter() {
    let dir = tempfile::tempdir().unwrap();
    let book = open(&model(42.0, "A", 0.05), dir.path(), "model.xlsx");
    assert_eq!(
        config::export(&book, Some("i.")).unwrap(),
        toml_table("[Inputs]\n\"i.threshold\" = 42\n")
    );
}

fn bands(first: [f64; 2]) -> XlsxFixture {
    XlsxFixture::new()
        .sheet("Calc")
        .formula("Calc", "A1", "2023+1", 2024.0)
        .text("Calc", "B1", "high")
        .number("Calc", "A2", first[0])
        .number("Calc", "B2", first[1])
        .number("Calc", "A3", 5.0)
        .number("Calc", "B3", 6.0)
        .table("Calc", "Bands", "A1:B3", &["2024", "high"])
        .name("t.bands", "Bands")
}

#[test]
fn test_native_table_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = open(&bands([0.0, 0.0]), dir.path(), "source.xlsx");
    assert_eq!(
        config::export(&source, None).unwrap(),
        toml_table(
            r#"
            [Calc]
            "t.bands" = [{ 2024 = 0, high = 0 }, { 2024 = 5, high = 6 }]
            "#
        )
    );

    let text = config::to_toml_string(&source, None).unwrap();
    let mut target = open(&bands([1.0, 2.0]), dir.path(), "target.xlsx");
    config::load(&mut target, &text).unwrap();
    assert_eq!(
        config::export(&target, None).unwrap(),
        config::export(&source, None).unwrap()
    );
}

#[test]
fn test_load_leaves_header_cells() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open(&bands([1.0, 2.0]), dir.path(), "bands.xlsx");
    config::load(
        &mut book,
        "[Calc]\n\"t.bands\" = [{ 2024 = 7, high = 8 }, { high = 9 }]\n",
    )
    .unwrap();

    let header = book
        .get("Calc", named_cells::CellAddress::parse("A1").unwrap())
        .unwrap();
    assert!(matches!(
        header.value,
        named_cells_core::NativeValue::Formula { .. }
    ));
    assert_eq!(
        book.read_table("t.bands").unwrap().rows,
        vec![
            vec![Value::Number(7.0), Value::Number(8.0)],
            vec![Value::Null, Value::Number(9.0)],
        ]
    );
}
