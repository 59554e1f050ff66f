//! In-place cell patches for worksheet parts
//!
//! A worksheet is streamed through `quick-xml` once; every event is copied
//! except the `<c>` elements being replaced. Missing rows and cells are
//! inserted in order, so the rest of the part (column widths, merged cells,
//! conditional formats, extension lists) survives untouched.

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use named_cells_core::CellAddress;

use crate::error::{XlsxError, XlsxResult};
use crate::reader::is_shared_master;
use crate::xml::{
    attr_value, encode_excel_escapes, escape_text, local_name, needs_space_preserve,
};

/// Value written by a patch
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PatchValue {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
}

/// Replacement for one cell
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CellPatch {
    pub value: PatchValue,
    /// Cell format index
    pub style: u32,
}

/// Patches of one worksheet keyed by 0-based `(row, col)`
pub(crate) type SheetPatches = BTreeMap<(u32, u32), CellPatch>;

/// Patches grouped by 1-based row number, columns ascending
fn by_row(patches: &SheetPatches) -> BTreeMap<u32, Vec<(u32, &CellPatch)>> {
    let mut out: BTreeMap<u32, Vec<(u32, &CellPatch)>> = BTreeMap::new();
    for (&(row, col), patch) in patches {
        out.entry(row + 1).or_default().push((col, patch));
    }
    out
}

/// Apply `patches` to a worksheet part
pub(crate) fn patch_worksheet_xml(original: &[u8], patches: &SheetPatches) -> XlsxResult<Vec<u8>> {
    let rows = by_row(patches);
    let mut pending: Vec<u32> = rows.keys().copied().collect();
    pending.reverse();

    let mut reader = Reader::from_reader(original);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + patches.len() * 64));
    let mut buf = Vec::new();
    let mut saw_sheet_data = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                patch_sheet_data(&mut reader, &mut writer, &rows, &mut pending)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                // `<sheetData/>` becomes `<sheetData>...</sheetData>`
                writer.write_event(Event::Start(e.into_owned()))?;
                write_rows_before(&mut writer, &rows, &mut pending, u32::MAX)?;
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                if !saw_sheet_data && !pending.is_empty() {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    write_rows_before(&mut writer, &rows, &mut pending, u32::MAX)?;
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Write new rows for every pending row number below `limit`
///
/// `pending` is sorted descending so the next row is at the end.
fn write_rows_before(
    writer: &mut Writer<Vec<u8>>,
    rows: &BTreeMap<u32, Vec<(u32, &CellPatch)>>,
    pending: &mut Vec<u32>,
    limit: u32,
) -> XlsxResult<()> {
    while let Some(&row) = pending.last() {
        if row >= limit {
            break;
        }
        pending.pop();
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", row.to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        for (col, patch) in rows.get(&row).map(Vec::as_slice).unwrap_or_default() {
            write_cell(writer, row, *col, patch)?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

fn patch_sheet_data<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    rows: &BTreeMap<u32, Vec<(u32, &CellPatch)>>,
    pending: &mut Vec<u32>,
) -> XlsxResult<()> {
    let mut buf = Vec::new();
    let mut last_row = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_num = row_number(&e, last_row);
                last_row = row_num;
                write_rows_before(writer, rows, pending, row_num)?;
                writer.write_event(Event::Start(e.into_owned()))?;
                let cells = take_row(rows, pending, row_num);
                patch_row(reader, writer, row_num, cells)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_num = row_number(&e, last_row);
                last_row = row_num;
                write_rows_before(writer, rows, pending, row_num)?;
                let cells = take_row(rows, pending, row_num);
                if cells.is_empty() {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                } else {
                    // `<row/>` becomes `<row>...</row>`
                    writer.write_event(Event::Start(e.into_owned()))?;
                    for (col, patch) in cells {
                        write_cell(writer, row_num, *col, patch)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("row")))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_rows_before(writer, rows, pending, u32::MAX)?;
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(XlsxError::InvalidFormat(
                    "unexpected EOF while patching sheetData".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(())
}

/// Patches of `row_num`, removing it from `pending`
fn take_row<'a>(
    rows: &'a BTreeMap<u32, Vec<(u32, &'a CellPatch)>>,
    pending: &mut Vec<u32>,
    row_num: u32,
) -> &'a [(u32, &'a CellPatch)] {
    if pending.last() == Some(&row_num) {
        pending.pop();
    }
    rows.get(&row_num).map(Vec::as_slice).unwrap_or_default()
}

fn patch_row<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    patches: &[(u32, &CellPatch)],
) -> XlsxResult<()> {
    let mut buf = Vec::new();
    let mut idx = 0usize;
    let mut next_col = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let col = cell_column(&e, next_col)?;
                next_col = col + 1;
                idx = write_cells_before(writer, row_num, patches, idx, col)?;
                if idx < patches.len() && patches[idx].0 == col {
                    if skip_cell(reader)? {
                        let a1 = CellAddress::new(row_num - 1, col);
                        return Err(XlsxError::Unsupported(format!(
                            "{a1} holds the master of a shared formula"
                        )));
                    }
                    write_cell(writer, row_num, col, patches[idx].1)?;
                    idx += 1;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let col = cell_column(&e, next_col)?;
                next_col = col + 1;
                idx = write_cells_before(writer, row_num, patches, idx, col)?;
                if idx < patches.len() && patches[idx].0 == col {
                    write_cell(writer, row_num, col, patches[idx].1)?;
                    idx += 1;
                } else {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                write_cells_before(writer, row_num, patches, idx, u32::MAX)?;
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(XlsxError::InvalidFormat(
                    "unexpected EOF while patching row".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(())
}

/// Write patches for columns below `col`, returning the next patch index
fn write_cells_before(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    patches: &[(u32, &CellPatch)],
    mut idx: usize,
    col: u32,
) -> XlsxResult<usize> {
    while idx < patches.len() && patches[idx].0 < col {
        write_cell(writer, row_num, patches[idx].0, patches[idx].1)?;
        idx += 1;
    }
    Ok(idx)
}

/// Consume events up to the `</c>` of the cell being replaced
///
/// Returns whether the cell was the master of a shared formula.
fn skip_cell<R: std::io::BufRead>(reader: &mut Reader<R>) -> XlsxResult<bool> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    let mut shared_master = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                if local_name(e.name().as_ref()) == b"f" {
                    shared_master |= is_shared_master(&e);
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"f" => {
                shared_master |= is_shared_master(&e);
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(shared_master);
                }
            }
            Event::Eof => {
                return Err(XlsxError::InvalidFormat(
                    "unexpected EOF while skipping patched cell".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
}

fn row_number(row: &BytesStart<'_>, last_row: u32) -> u32 {
    attr_value(row, b"r")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(last_row + 1)
}

fn cell_column(cell: &BytesStart<'_>, next_col: u32) -> XlsxResult<u32> {
    match attr_value(cell, b"r") {
        Some(r) => CellAddress::parse(&r)
            .map(|a| a.col)
            .map_err(|err| XlsxError::Parse(format!("cell reference '{r}': {err}"))),
        None => Ok(next_col),
    }
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    col: u32,
    patch: &CellPatch,
) -> XlsxResult<()> {
    let a1 = CellAddress::new(row_num - 1, col).to_a1_string();

    let mut cell = String::new();
    cell.push_str(r#"<c r=""#);
    cell.push_str(&a1);
    cell.push('"');
    if patch.style != 0 {
        cell.push_str(&format!(r#" s="{}""#, patch.style));
    }

    let (ty, body) = match &patch.value {
        PatchValue::Empty => (None, String::new()),
        PatchValue::Number(n) => (None, format!("<v>{n}</v>")),
        PatchValue::Bool(b) => (Some("b"), format!("<v>{}</v>", u8::from(*b))),
        PatchValue::Error(e) => (Some("e"), format!("<v>{}</v>", escape_text(e))),
        PatchValue::Text(s) => {
            let space = if needs_space_preserve(s) {
                r#" xml:space="preserve""#
            } else {
                ""
            };
            let text = escape_text(&encode_excel_escapes(s));
            (Some("inlineStr"), format!("<is><t{space}>{text}</t></is>"))
        }
    };

    if let Some(t) = ty {
        cell.push_str(&format!(r#" t="{t}""#));
    }
    if body.is_empty() {
        cell.push_str("/>");
    } else {
        cell.push('>');
        cell.push_str(&body);
        cell.push_str("</c>");
    }

    writer.get_mut().extend_from_slice(cell.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn patches(cells: &[(&str, PatchValue, u32)]) -> SheetPatches {
        cells
            .iter()
            .map(|(a1, value, style)| {
                let addr = CellAddress::parse(a1).unwrap();
                (
                    (addr.row, addr.col),
                    CellPatch {
                        value: value.clone(),
                        style: *style,
                    },
                )
            })
            .collect()
    }

    fn apply(xml: &str, cells: &[(&str, PatchValue, u32)]) -> String {
        String::from_utf8(patch_worksheet_xml(xml.as_bytes(), &patches(cells)).unwrap()).unwrap()
    }

    #[test]
    fn test_replace_existing_cell() {
        let xml = r#"<worksheet><cols><col min="1" max="1" width="20" customWidth="1"/></cols><sheetData><row r="1"><c r="A1" s="2"><f>1+1</f><v>2</v></c><c r="B1"><v>5</v></c></row></sheetData></worksheet>"#;
        let out = apply(xml, &[("A1", PatchValue::Number(7.5), 2)]);
        assert_eq!(
            out,
            r#"<worksheet><cols><col min="1" max="1" width="20" customWidth="1"/></cols><sheetData><row r="1"><c r="A1" s="2"><v>7.5</v></c><c r="B1"><v>5</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn test_insert_cells_and_rows_in_order() {
        let xml = r#"<worksheet><sheetData><row r="2"><c r="B2"><v>1</v></c></row><row r="5"/></sheetData></worksheet>"#;
        let out = apply(
            xml,
            &[
                ("A1", PatchValue::Bool(true), 0),
                ("A2", PatchValue::Text(" hi ".into()), 0),
                ("C2", PatchValue::Empty, 4),
                ("A5", PatchValue::Number(1.0), 0),
                ("A9", PatchValue::Text("a<b".into()), 0),
            ],
        );
        assert_eq!(
            out,
            concat!(
                r#"<worksheet><sheetData>"#,
                r#"<row r="1"><c r="A1" t="b"><v>1</v></c></row>"#,
                r#"<row r="2"><c r="A2" t="inlineStr"><is><t xml:space="preserve"> hi </t></is></c><c r="B2"><v>1</v></c><c r="C2" s="4"/></row>"#,
                r#"<row r="5"><c r="A5"><v>1</v></c></row>"#,
                r#"<row r="9"><c r="A9" t="inlineStr"><is><t>a&lt;b</t></is></c></row>"#,
                r#"</sheetData></worksheet>"#
            )
        );
    }

    #[test]
    fn test_empty_sheet_data() {
        let out = apply(
            r#"<worksheet><sheetData/><pageMargins left="0.7"/></worksheet>"#,
            &[("B3", PatchValue::Number(3.0), 0)],
        );
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row r="3"><c r="B3"><v>3</v></c></row></sheetData><pageMargins left="0.7"/></worksheet>"#
        );
    }

    #[test]
    fn test_shared_formula_master_refused() {
        let xml = concat!(
            r#"<worksheet><sheetData>"#,
            r#"<row r="1"><c r="A1"><f t="shared" ref="A1:A2" si="0">B1*2</f><v>2</v></c></row>"#,
            r#"<row r="2"><c r="A2"><f t="shared" si="0"/><v>4</v></c></row>"#,
            r#"</sheetData></worksheet>"#
        );
        let err = patch_worksheet_xml(
            xml.as_bytes(),
            &patches(&[("A1", PatchValue::Number(9.0), 0)]),
        )
        .unwrap_err();
        assert!(matches!(err, XlsxError::Unsupported(_)), "{err}");

        // Dependents can be replaced; the master's range still covers them
        let out = apply(xml, &[("A2", PatchValue::Number(9.0), 0)]);
        assert!(out.contains(r#"<f t="shared" ref="A1:A2" si="0">B1*2</f>"#));
        assert!(out.contains(r#"<c r="A2"><v>9</v></c>"#));
    }

    #[test]
    fn test_cells_without_references() {
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>"#;
        let out = apply(xml, &[("B1", PatchValue::Number(9.0), 0)]);
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row><c><v>1</v></c><c r="B1"><v>9</v></c></row></sheetData></worksheet>"#
        );
    }
}
