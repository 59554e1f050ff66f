//! Cell formats from `xl/styles.xml`
//!
//! Only what value coercion needs is interpreted: each cell format's number
//! format. Cell formats derived during writes are appended to `cellXfs`; the
//! rest of the part is copied through unchanged.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use named_cells_core::NumberFormat;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{attr_value, local_name};

pub(crate) const STYLES_PART: &str = "xl/styles.xml";

/// One `<xf>` of `cellXfs`
#[derive(Debug, Clone, PartialEq)]
struct XfRecord {
    num_fmt_id: u32,
    attrs: Vec<(String, String)>,
    /// Child elements (`alignment`, `protection`) as raw XML
    inner: Vec<u8>,
}

impl XfRecord {
    fn default_xf() -> Self {
        Self {
            num_fmt_id: 0,
            attrs: ["numFmtId", "fontId", "fillId", "borderId", "xfId"]
                .iter()
                .map(|k| (k.to_string(), "0".to_string()))
                .collect(),
            inner: Vec::new(),
        }
    }

    /// Copy with another number format
    fn with_num_fmt(&self, fmt_id: u32) -> Self {
        let mut attrs: Vec<(String, String)> = self
            .attrs
            .iter()
            .filter(|(k, _)| k != "numFmtId" && k != "applyNumberFormat")
            .cloned()
            .collect();
        attrs.insert(0, ("numFmtId".to_string(), fmt_id.to_string()));
        attrs.push(("applyNumberFormat".to_string(), "1".to_string()));
        Self {
            num_fmt_id: fmt_id,
            attrs,
            inner: self.inner.clone(),
        }
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> XlsxResult<()> {
        let mut start = BytesStart::new("xf");
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if self.inner.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            writer.get_mut().extend_from_slice(&self.inner);
            writer.write_event(Event::End(BytesEnd::new("xf")))?;
        }
        Ok(())
    }
}

/// Parsed cell formats
#[derive(Debug, Clone)]
pub(crate) struct Styles {
    custom_formats: HashMap<u32, String>,
    xfs: Vec<XfRecord>,
    /// Number of `xf` entries in the part as read
    original_len: usize,
    derived: HashMap<(u32, u32), u32>,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            custom_formats: HashMap::new(),
            xfs: vec![XfRecord::default_xf()],
            original_len: 0,
            derived: HashMap::new(),
        }
    }
}

impl Styles {
    /// Parse `xl/styles.xml`
    pub(crate) fn parse(bytes: &[u8]) -> XlsxResult<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(false);
        let mut buf = Vec::new();

        let mut custom_formats = HashMap::new();
        let mut xfs = Vec::new();
        let mut in_num_fmts = false;
        let mut in_cell_xfs = false;
        let mut current: Option<XfRecord> = None;
        let mut inner = Writer::new(Vec::new());
        let mut depth = 0usize;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if depth > 0 => {
                    depth += 1;
                    inner.write_event(Event::Start(e.into_owned()))?;
                }
                Ok(Event::End(e)) if depth > 1 => {
                    depth -= 1;
                    inner.write_event(Event::End(e.into_owned()))?;
                }
                Ok(Event::End(e)) if depth == 1 && local_name(e.name().as_ref()) == b"xf" => {
                    depth = 0;
                    if let Some(mut xf) = current.take() {
                        xf.inner = std::mem::take(inner.get_mut());
                        xfs.push(xf);
                    }
                }
                Ok(ev) if depth > 0 => {
                    if !matches!(ev, Event::Text(ref t) if t.iter().all(u8::is_ascii_whitespace)) {
                        inner.write_event(ev.into_owned())?;
                    }
                }
                Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                    b"numFmts" => in_num_fmts = true,
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        current = Some(parse_xf(&e));
                        depth = 1;
                    }
                    _ => {}
                },
                Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                    b"numFmt" if in_num_fmts => {
                        let id = attr_value(&e, b"numFmtId").and_then(|s| s.parse::<u32>().ok());
                        let code = attr_value(&e, b"formatCode");
                        if let (Some(id), Some(code)) = (id, code) {
                            custom_formats.insert(id, code);
                        }
                    }
                    b"xf" if in_cell_xfs => xfs.push(parse_xf(&e)),
                    _ => {}
                },
                Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                    b"numFmts" => in_num_fmts = false,
                    b"cellXfs" => in_cell_xfs = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        let original_len = xfs.len();
        if xfs.is_empty() {
            xfs.push(XfRecord::default_xf());
        }
        Ok(Self {
            custom_formats,
            xfs,
            original_len,
            derived: HashMap::new(),
        })
    }

    /// Number format of cell format `xf`
    pub(crate) fn number_format(&self, xf: u32) -> NumberFormat {
        let id = self.xfs.get(xf as usize).map_or(0, |r| r.num_fmt_id);
        match self.custom_formats.get(&id) {
            Some(code) => NumberFormat::from_string(code.as_str()),
            None => NumberFormat::from_id(id),
        }
    }

    /// Index of a cell format equal to `xf` but with number format `fmt_id`
    pub(crate) fn with_number_format(&mut self, xf: u32, fmt_id: u32) -> u32 {
        if let Some(idx) = self.derived.get(&(xf, fmt_id)) {
            return *idx;
        }
        let base = self
            .xfs
            .get(xf as usize)
            .cloned()
            .unwrap_or_else(XfRecord::default_xf);
        let idx = self.xfs.len() as u32;
        self.xfs.push(base.with_num_fmt(fmt_id));
        self.derived.insert((xf, fmt_id), idx);
        log::debug!("derived cell format {idx} from {xf} with number format {fmt_id}");
        idx
    }

    /// Whether formats were added since parsing
    pub(crate) fn is_dirty(&self) -> bool {
        !self.derived.is_empty()
    }

    /// The styles part with derived formats appended to `cellXfs`
    pub(crate) fn write(&self, original: Option<&[u8]>) -> XlsxResult<Vec<u8>> {
        match original {
            Some(bytes) => self.patch_part(bytes),
            None => self.minimal_part(),
        }
    }

    fn added(&self) -> &[XfRecord] {
        let start = self.original_len.max(1).min(self.xfs.len());
        &self.xfs[start..]
    }

    fn patch_part(&self, bytes: &[u8]) -> XlsxResult<Vec<u8>> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(bytes.len() + 256));
        let mut buf = Vec::new();
        let count = self.xfs.len().to_string();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    writer.write_event(Event::Start(with_count(&e, &count)))?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    writer.write_event(Event::Start(with_count(&e, &count)))?;
                    for xf in &self.xfs {
                        xf.write(&mut writer)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("cellXfs")))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    for xf in self.added() {
                        xf.write(&mut writer)?;
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

    fn minimal_part(&self) -> XlsxResult<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer.get_mut().extend_from_slice(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
        );
        let mut start = BytesStart::new("cellXfs");
        start.push_attribute(("count", self.xfs.len().to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        for xf in &self.xfs {
            xf.write(&mut writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("cellXfs")))?;
        writer.get_mut().extend_from_slice(
            br#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#,
        );
        Ok(writer.into_inner())
    }
}

fn parse_xf(e: &BytesStart<'_>) -> XfRecord {
    let mut attrs = Vec::new();
    let mut num_fmt_id = 0;
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_default();
        if key == "numFmtId" {
            num_fmt_id = value.parse().unwrap_or(0);
        }
        attrs.push((key, value));
    }
    XfRecord {
        num_fmt_id,
        attrs,
        inner: Vec::new(),
    }
}

fn with_count(e: &BytesStart<'_>, count: &str) -> BytesStart<'static> {
    let mut start = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"count" {
            start.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    start.push_attribute(("count", count));
    start
}
