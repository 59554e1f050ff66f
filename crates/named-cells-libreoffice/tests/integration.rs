//! Round trips through a real LibreOffice installation.
//!
//! These tests run `soffice` from `PATH` (or `NAMED_CELLS_SOFFICE`). When it
//! is not installed, every test is skipped.

use named_cells_core::{Backend, NamedCellsExt, RangeValue, Value};
use named_cells_libreoffice::{LibreOfficeConfig, LibreOfficeWorkbook};
use named_cells_xlsx::fixtures::XlsxFixture;

fn config() -> LibreOfficeConfig {
    match std::env::var_os("NAMED_CELLS_SOFFICE") {
        Some(path) => LibreOfficeConfig::with_soffice(path),
        None => LibreOfficeConfig::default(),
    }
}

/// Skip this test if soffice is not available.
macro_rules! skip_if_no_soffice {
    () => {
        if !config().is_available() {
            eprintln!(
                "SKIP: soffice not found.\n\
                 Install LibreOffice or point NAMED_CELLS_SOFFICE at the soffice binary."
            );
            return;
        }
    };
}

/// A workbook whose cached formula result is deliberately stale
fn stale_book(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("model.xlsx");
    XlsxFixture::new()
        .sheet("Model")
        .number("Model", "A1", 10.0)
        .formula("Model", "A2", "A1*2", 0.0)
        .name("i.input", "Model!$A$1")
        .name("o.output", "Model!$A$2")
        .write_to(&path)
        .unwrap();
    path
}

#[test]
fn test_open_recalculates() {
    skip_if_no_soffice!();

    let dir = tempfile::tempdir().unwrap();
    let book = LibreOfficeWorkbook::open_with(stale_book(dir.path()), config()).unwrap();
    assert_eq!(
        book.read_name("o.output").unwrap(),
        RangeValue::Scalar(Value::Number(20.0))
    );
    book.close().unwrap();
}

#[test]
fn test_save_recalculates_dependents() {
    skip_if_no_soffice!();

    let dir = tempfile::tempdir().unwrap();
    let path = stale_book(dir.path());
    let mut book = LibreOfficeWorkbook::open_with(&path, config()).unwrap();
    book.write_name("i.input", &RangeValue::Scalar(Value::Number(21.0)))
        .unwrap();
    book.save(None).unwrap();
    assert!(!book.is_dirty());
    assert_eq!(
        book.read_name("o.output").unwrap(),
        RangeValue::Scalar(Value::Number(42.0))
    );
    book.close().unwrap();

    // The file on disk carries the recalculated cache
    let reopened = named_cells_xlsx::XlsxWorkbook::open_file(&path).unwrap();
    assert_eq!(
        reopened.read_name("o.output").unwrap(),
        RangeValue::Scalar(Value::Number(42.0))
    );
}

#[test]
fn test_save_elsewhere_keeps_source() {
    skip_if_no_soffice!();

    let dir = tempfile::tempdir().unwrap();
    let path = stale_book(dir.path());
    let before = std::fs::read(&path).unwrap();
    let out = dir.path().join("out.xlsx");

    let mut book = LibreOfficeWorkbook::open_with(&path, config()).unwrap();
    book.write_name("i.input", &RangeValue::Scalar(Value::Number(1.0)))
        .unwrap();
    book.save(Some(&out)).unwrap();
    assert_eq!(book.path(), Some(out.as_path()));
    book.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(out.is_file());
}
