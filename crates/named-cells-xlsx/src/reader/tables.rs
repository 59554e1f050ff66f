//! Table (list object) parts referenced from worksheets

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use named_cells_core::{CellRange, TableDef};

use crate::error::{XlsxError, XlsxResult};
use crate::package::{resolve_target, XlsxPackage};
use crate::xml::{attr_value, decode_excel_escapes, local_name};

const TABLE_REL: &str = "/table";

/// Tables attached to the worksheet part `sheet_part`
pub(crate) fn read_sheet_tables(
    package: &XlsxPackage,
    sheet_part: &str,
    sheet_name: &str,
) -> XlsxResult<Vec<TableDef>> {
    let mut tables = Vec::new();
    for rel in package.relationships(sheet_part)? {
        if rel.external || !rel.rel_type.ends_with(TABLE_REL) {
            continue;
        }
        let part = resolve_target(sheet_part, &rel.target);
        let Some(bytes) = package.part(&part) else {
            log::warn!("table part {part} referenced from {sheet_part} is missing");
            continue;
        };
        tables.push(read_table(bytes, sheet_name)?);
    }
    Ok(tables)
}

fn read_table(bytes: &[u8], sheet_name: &str) -> XlsxResult<TableDef> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut table: Option<TableDef> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"table" => {
                    let name = attr_value(&e, b"displayName")
                        .or_else(|| attr_value(&e, b"name"))
                        .ok_or_else(|| XlsxError::Parse("table without a name".into()))?;
                    let reference = attr_value(&e, b"ref")
                        .ok_or_else(|| XlsxError::Parse(format!("table '{name}' has no ref")))?;
                    let range = CellRange::parse(&reference).map_err(|err| {
                        XlsxError::Parse(format!("table '{name}' ref '{reference}': {err}"))
                    })?;
                    let count = |key: &[u8], default: u32| {
                        attr_value(&e, key)
                            .and_then(|s| s.parse::<u32>().ok())
                            .unwrap_or(default)
                    };
                    table = Some(TableDef {
                        name,
                        sheet: sheet_name.to_string(),
                        range,
                        header_rows: count(b"headerRowCount", 1),
                        totals_rows: count(b"totalsRowCount", 0),
                        columns: Vec::new(),
                    });
                }
                b"tableColumn" => {
                    if let (Some(table), Some(name)) = (table.as_mut(), attr_value(&e, b"name")) {
                        table.columns.push(decode_excel_escapes(&name));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    table.ok_or_else(|| XlsxError::InvalidFormat("table part without <table>".into()))
}
