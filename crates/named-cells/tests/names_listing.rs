//! Name listings and engine selection

use named_cells::prelude::*;
use named_cells::specs::{specifications, write_csv};
use named_cells_xlsx::fixtures::XlsxFixture;
use pretty_assertions::assert_eq;

fn fixture() -> XlsxFixture {
    XlsxFixture::new()
        .sheet("B")
        .sheet("A")
        .number("A", "B10", 10.0)
        .number("A", "B2", 2.0)
        .number("B", "A1", 1.0)
        .number("B", "A2", 2.0)
        .name("x.late", "A!$B$10")
        .name("x.early", "A!$B$2")
        .name("v.pair", "B!$A$1:$A$2")
        .local_name("x.local", 0, "B!$A$1")
        .name("_xlnm.Print_Area", "B!$A$1:$A$2")
}

#[test]
fn test_specifications_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    fixture().write_to(&path).unwrap();
    let book = Workbook::open_with(&path, &OpenOptions::new(Engine::Xlsx)).unwrap();

    let specs = specifications(&book, None).unwrap();
    let rows: Vec<(&str, String, &str)> = specs
        .iter()
        .map(|s| (s.sheet.as_str(), s.range.to_a1_string(), s.name.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("A", "B2".to_string(), "x.early"),
            ("A", "B10".to_string(), "x.late"),
            ("B", "A1:A2".to_string(), "v.pair"),
        ]
    );

    let mut out = Vec::new();
    write_csv(&specs, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "sheet,range,name,shape,value\n\
         A,B2,x.early,scalar,2\n\
         A,B10,x.late,scalar,10\n\
         B,A1:A2,v.pair,vector,\"[1, 2]\"\n"
    );
}

#[test]
fn test_specifications_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    fixture().write_to(&path).unwrap();
    let book = Workbook::open(&path).unwrap();
    assert_eq!(book.engine(), Engine::Xlsx);

    let names: Vec<String> = specifications(&book, Some("v."))
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["v.pair".to_string()]);
}

#[test]
fn test_workbook_save_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    fixture().write_to(&path).unwrap();

    let mut book = Workbook::open(&path).unwrap();
    book.write_name("x.early", &RangeValue::Scalar(Value::text("changed")))
        .unwrap();
    book.save(None).unwrap();
    book.close().unwrap();

    let book = Workbook::open(&path).unwrap();
    assert_eq!(
        book.read_name("x.early").unwrap(),
        RangeValue::Scalar(Value::text("changed"))
    );
}
