//! Worksheet cell reader

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use named_cells_core::{CellAddress, DateSystem, NativeValue};

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{attr_value, decode_excel_escapes, local_name, parse_bool};

/// One `<c>` element as stored in the sheet
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct RawCell {
    pub value: NativeValue,
    /// Cell format index (`s` attribute)
    pub style: u32,
    /// The value came from an ISO 8601 `t="d"` cell
    pub iso_date: bool,
    /// The cell holds the master `<f t="shared" ref=..>` of a shared formula
    pub shared_master: bool,
}

#[derive(Default)]
struct CellState {
    addr: Option<CellAddress>,
    cell_type: Option<String>,
    style: u32,
    value: Option<String>,
    inline: Option<String>,
    formula: Option<String>,
    shared_master: bool,
}

/// Read every cell of a worksheet part
///
/// Rows and cells without an `r` attribute take the position after their
/// predecessor.
pub(crate) fn read_worksheet(
    bytes: &[u8],
    shared_strings: &[String],
    dates: DateSystem,
) -> XlsxResult<HashMap<CellAddress, RawCell>> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut cells = HashMap::new();

    let mut row: u32 = 0;
    let mut next_row: u32 = 0;
    let mut next_col: u32 = 0;
    let mut current: Option<CellState> = None;
    let mut in_value = false;
    let mut in_formula = false;
    let mut in_inline_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"row" => {
                    row = start_row(&e, next_row);
                    next_row = row + 1;
                    next_col = 0;
                }
                b"c" => {
                    let state = start_cell(&e, row, next_col)?;
                    next_col = state.addr.map_or(next_col, |a| a.col + 1);
                    current = Some(state);
                }
                b"v" if current.is_some() => in_value = true,
                b"f" if current.is_some() => {
                    in_formula = true;
                    if let Some(state) = current.as_mut() {
                        state.formula.get_or_insert_with(String::new);
                        state.shared_master |= is_shared_master(&e);
                    }
                }
                b"is" if current.is_some() => {
                    if let Some(state) = current.as_mut() {
                        state.inline.get_or_insert_with(String::new);
                    }
                }
                b"rPh" => in_phonetic = true,
                b"t" if current.is_some() && !in_phonetic => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"row" => {
                    row = start_row(&e, next_row);
                    next_row = row + 1;
                }
                b"c" => {
                    let state = start_cell(&e, row, next_col)?;
                    next_col = state.addr.map_or(next_col, |a| a.col + 1);
                    finish_cell(state, shared_strings, dates, &mut cells)?;
                }
                b"f" => {
                    // Shared formula dependent: text lives on the master cell
                    if let Some(state) = current.as_mut() {
                        state.formula.get_or_insert_with(String::new);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_value || in_formula || in_inline_text => {
                let text = e.unescape()?;
                if let Some(state) = current.as_mut() {
                    let target = if in_value {
                        state.value.get_or_insert_with(String::new)
                    } else if in_formula {
                        state.formula.get_or_insert_with(String::new)
                    } else {
                        state.inline.get_or_insert_with(String::new)
                    };
                    target.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"c" => {
                    if let Some(state) = current.take() {
                        finish_cell(state, shared_strings, dates, &mut cells)?;
                    }
                }
                b"v" => in_value = false,
                b"f" => in_formula = false,
                b"t" => in_inline_text = false,
                b"rPh" => in_phonetic = false,
                b"sheetData" => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(cells)
}

pub(crate) fn is_shared_master(f: &BytesStart<'_>) -> bool {
    attr_value(f, b"t").as_deref() == Some("shared") && attr_value(f, b"ref").is_some()
}

fn start_row(e: &BytesStart<'_>, next_row: u32) -> u32 {
    attr_value(e, b"r")
        .and_then(|s| s.parse::<u32>().ok())
        .and_then(|r| r.checked_sub(1))
        .unwrap_or(next_row)
}

fn start_cell(e: &BytesStart<'_>, row: u32, next_col: u32) -> XlsxResult<CellState> {
    let addr = match attr_value(e, b"r") {
        Some(r) => CellAddress::parse(&r)
            .map_err(|err| XlsxError::Parse(format!("cell reference '{r}': {err}")))?,
        None => CellAddress::new(row, next_col),
    };
    Ok(CellState {
        addr: Some(addr),
        cell_type: attr_value(e, b"t"),
        style: attr_value(e, b"s")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0),
        ..Default::default()
    })
}

fn finish_cell(
    state: CellState,
    shared_strings: &[String],
    dates: DateSystem,
    cells: &mut HashMap<CellAddress, RawCell>,
) -> XlsxResult<()> {
    let Some(addr) = state.addr else {
        return Ok(());
    };

    let mut iso_date = false;
    let literal = match (state.cell_type.as_deref(), state.value, state.inline) {
        (Some("inlineStr"), _, Some(text)) => Some(NativeValue::Text(decode_excel_escapes(&text))),
        (_, None, _) => None,
        (Some("s"), Some(v), _) => {
            let idx: usize = v
                .trim()
                .parse()
                .map_err(|_| XlsxError::Parse(format!("shared string index '{v}' at {addr}")))?;
            let text = shared_strings.get(idx).ok_or_else(|| {
                XlsxError::Parse(format!("shared string index {idx} out of range at {addr}"))
            })?;
            Some(NativeValue::Text(text.clone()))
        }
        (Some("str"), Some(v), _) | (Some("inlineStr"), Some(v), None) => {
            Some(NativeValue::Text(decode_excel_escapes(&v)))
        }
        (Some("b"), Some(v), _) => Some(NativeValue::Bool(parse_bool(v.trim()))),
        (Some("e"), Some(v), _) => Some(NativeValue::Error(v)),
        (Some("d"), Some(v), _) => {
            let dt = parse_iso_datetime(v.trim())
                .ok_or_else(|| XlsxError::Parse(format!("date '{v}' at {addr}")))?;
            iso_date = true;
            Some(NativeValue::Number(dates.to_serial(dt)))
        }
        (_, Some(v), _) => {
            let n: f64 = v
                .trim()
                .parse()
                .map_err(|_| XlsxError::Parse(format!("number '{v}' at {addr}")))?;
            Some(NativeValue::Number(n))
        }
    };

    let value = match (state.formula, literal) {
        (Some(text), cached) => NativeValue::Formula {
            text,
            cached: cached.map(Box::new),
        },
        (None, Some(v)) => v,
        (None, None) => NativeValue::Empty,
    };

    cells.insert(
        addr,
        RawCell {
            value,
            style: state.style,
            iso_date,
            shared_master: state.shared_master,
        },
    );
    Ok(())
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
