//! Part readers: workbook, shared strings, worksheets and tables

mod sheet;
mod tables;

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use named_cells_core::{DateSystem, DefinedName, NameScope};

use crate::error::{XlsxError, XlsxResult};
use crate::package::{resolve_target, XlsxPackage};
use crate::xml::{attr_value, decode_excel_escapes, local_name, parse_bool};

pub(crate) use sheet::{is_shared_master, read_worksheet, RawCell};
pub(crate) use tables::read_sheet_tables;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const WORKSHEET_REL: &str = "/worksheet";
const OFFICE_DOCUMENT_REL: &str = "/officeDocument";

/// A sheet listed in `workbook.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetInfo {
    pub name: String,
    /// Worksheet part path, `None` for chartsheets and dialog sheets
    pub part: Option<String>,
}

/// Contents of `workbook.xml` that matter for names
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkbookInfo {
    pub sheets: Vec<SheetInfo>,
    pub names: Vec<DefinedName>,
    pub date_system: DateSystem,
}

/// Path of the workbook part, following the package root relationship
pub(crate) fn workbook_part(package: &XlsxPackage) -> XlsxResult<String> {
    let root = package
        .relationships("")?
        .into_iter()
        .find(|r| r.rel_type.ends_with(OFFICE_DOCUMENT_REL))
        .map(|r| resolve_target("", &r.target));
    Ok(root.unwrap_or_else(|| WORKBOOK_PART.to_string()))
}

/// Read `workbook.xml` and resolve sheet parts through its relationships
pub(crate) fn read_workbook(package: &XlsxPackage, part: &str) -> XlsxResult<WorkbookInfo> {
    let bytes = package.require(part)?;
    let rels: HashMap<String, String> = package
        .relationships(part)?
        .into_iter()
        .filter(|r| r.rel_type.ends_with(WORKSHEET_REL) && !r.external)
        .map(|r| (r.id, resolve_target(part, &r.target)))
        .collect();

    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut info = WorkbookInfo::default();
    let mut pending_name: Option<DefinedName> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"sheet" =>
            {
                if let Some(name) = attr_value(&e, b"name") {
                    let part = attr_value(&e, b"id").and_then(|id| rels.get(&id).cloned());
                    info.sheets.push(SheetInfo { name, part });
                }
            }
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"workbookPr" =>
            {
                if attr_value(&e, b"date1904").is_some_and(|v| parse_bool(&v)) {
                    info.date_system = DateSystem::Excel1904;
                }
            }
            Ok(Event::Start(e)) if local_name(e.name().as_ref()) == b"definedName" => {
                if let Some(name) = attr_value(&e, b"name") {
                    let scope = attr_value(&e, b"localSheetId")
                        .and_then(|s| s.parse::<usize>().ok())
                        .map_or(NameScope::Workbook, NameScope::Sheet);
                    let mut defined = DefinedName::new(name, String::new()).with_scope(scope);
                    defined.hidden = attr_value(&e, b"hidden").is_some_and(|v| parse_bool(&v));
                    pending_name = Some(defined);
                }
            }
            Ok(Event::Text(e)) if pending_name.is_some() => {
                if let (Some(defined), Ok(text)) = (pending_name.as_mut(), e.unescape()) {
                    defined.refers_to.push_str(&text);
                }
            }
            Ok(Event::End(e)) if local_name(e.name().as_ref()) == b"definedName" => {
                if let Some(defined) = pending_name.take() {
                    info.names.push(defined);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    log::debug!(
        "workbook has {} sheets and {} defined names",
        info.sheets.len(),
        info.names.len()
    );
    Ok(info)
}

/// Read the shared strings table
pub(crate) fn read_shared_strings(package: &XlsxPackage) -> XlsxResult<Vec<String>> {
    let mut strings = Vec::new();

    let Some(bytes) = package.part(SHARED_STRINGS_PART) else {
        return Ok(strings); // No shared strings is valid
    };

    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(false);

    let mut buf = Vec::new();
    let mut current_string = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"si" => {
                    in_si = true;
                    current_string.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_si && !in_phonetic => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if local_name(e.name().as_ref()) == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"si" => {
                    strings.push(decode_excel_escapes(&current_string));
                    current_string.clear();
                    in_si = false;
                }
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_t => {
                let text = e.unescape()?;
                current_string.push_str(&text);
            }
            Ok(Event::CData(e)) if in_t => {
                current_string.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    log::debug!("read {} shared strings", strings.len());
    Ok(strings)
}
