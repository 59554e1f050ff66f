//! Ask the next application that opens the file to recalculate
//!
//! Once cells change, the calculation chain and cached results are stale:
//! `xl/calcChain.xml` is dropped together with its relationship and content
//! type, and `<calcPr fullCalcOnLoad="1"/>` is set on the workbook.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::XlsxResult;
use crate::package::XlsxPackage;
use crate::xml::local_name;

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CALC_CHAIN_REL: &str = "/calcChain";

/// Elements that follow `calcPr` in `workbook.xml`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

pub(crate) fn force_recalculation(package: &mut XlsxPackage, workbook_part: &str) -> XlsxResult<()> {
    if package.remove_part(CALC_CHAIN_PART) {
        log::debug!("dropped {CALC_CHAIN_PART}");
    }
    package.remove_relationships(workbook_part, CALC_CHAIN_REL)?;
    package.remove_content_type_override(CALC_CHAIN_PART)?;

    let workbook = package.require(workbook_part)?;
    let updated = with_full_calc_on_load(workbook)?;
    package.set_part(workbook_part, updated);
    Ok(())
}

fn with_full_calc_on_load(workbook_xml: &[u8]) -> XlsxResult<Vec<u8>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));
    let mut buf = Vec::new();
    let mut saw_calc_pr = false;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(patched_calc_pr(&e)))?;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                depth += 1;
                writer.write_event(Event::Start(patched_calc_pr(&e)))?;
            }
            Event::Start(e) => {
                // Direct children of <workbook> sit at depth 1
                if depth == 1 && !saw_calc_pr && follows_calc_pr(e.name().as_ref()) {
                    writer.write_event(Event::Empty(new_calc_pr()))?;
                    saw_calc_pr = true;
                }
                depth += 1;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) => {
                if depth == 1 && !saw_calc_pr && follows_calc_pr(e.name().as_ref()) {
                    writer.write_event(Event::Empty(new_calc_pr()))?;
                    saw_calc_pr = true;
                }
                writer.write_event(Event::Empty(e.into_owned()))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !saw_calc_pr && local_name(e.name().as_ref()) == b"workbook" {
                    writer.write_event(Event::Empty(new_calc_pr()))?;
                    saw_calc_pr = true;
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

fn follows_calc_pr(name: &[u8]) -> bool {
    let name = local_name(name);
    AFTER_CALC_PR.iter().any(|n| *n == name)
}

fn new_calc_pr() -> BytesStart<'static> {
    let mut calc_pr = BytesStart::new("calcPr");
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    calc_pr
}

fn patched_calc_pr(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut calc_pr = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if local_name(attr.key.as_ref()) == b"fullCalcOnLoad" {
            continue;
        }
        calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    calc_pr
}
