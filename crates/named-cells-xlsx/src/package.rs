//! In-memory OPC package
//!
//! Every part is kept as raw bytes in archive order, so parts that are never
//! edited are written back unchanged.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{attr_value, local_name};

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
}

/// All parts of an XLSX archive
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: Vec<Part>,
}

/// One entry of a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Target as written in the part
    pub target: String,
    pub external: bool,
}

impl XlsxPackage {
    /// Read a package from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<Self> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read a package from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push(Part {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
            });
        }

        let package = Self { parts };
        if package.part("[Content_Types].xml").is_none() {
            return Err(XlsxError::InvalidFormat(
                "Missing [Content_Types].xml".into(),
            ));
        }
        log::debug!("read package with {} parts", package.parts.len());
        Ok(package)
    }

    /// Write the package as a ZIP archive
    pub fn write<W: Write + Seek>(&self, writer: W) -> XlsxResult<()> {
        let mut zip = zip::ZipWriter::new(writer);
        for part in &self.parts {
            let method = match part.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = SimpleFileOptions::default().compression_method(method);
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(&part.data)?;
        }
        zip.finish()?;
        Ok(())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Part contents, failing with [`XlsxError::MissingPart`]
    pub fn require(&self, name: &str) -> XlsxResult<&[u8]> {
        self.part(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))
    }

    /// Replace a part, or append it when new
    pub fn set_part(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.parts.iter_mut().find(|p| p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name,
                data,
                compression: CompressionMethod::Deflated,
            }),
        }
    }

    pub fn remove_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| p.name != name);
        self.parts.len() != before
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Relationships of `part`, empty when it has no `.rels` part
    pub fn relationships(&self, part: &str) -> XlsxResult<Vec<Relationship>> {
        let Some(bytes) = self.part(&rels_path(part)) else {
            return Ok(Vec::new());
        };

        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut rels = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e))
                    if local_name(e.name().as_ref()) == b"Relationship" =>
                {
                    let id = attr_value(&e, b"Id");
                    let target = attr_value(&e, b"Target");
                    let rel_type = attr_value(&e, b"Type");
                    let external = attr_value(&e, b"TargetMode").as_deref() == Some("External");
                    if let (Some(id), Some(target), Some(rel_type)) = (id, target, rel_type) {
                        rels.push(Relationship {
                            id,
                            rel_type,
                            target,
                            external,
                        });
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    /// Drop every relationship of `part` whose type ends with `type_suffix`
    pub fn remove_relationships(&mut self, part: &str, type_suffix: &str) -> XlsxResult<()> {
        let path = rels_path(part);
        let Some(bytes) = self.part(&path) else {
            return Ok(());
        };
        let updated = filter_elements(bytes, b"Relationship", |e| {
            attr_value(e, b"Type").map_or(true, |t| !t.ends_with(type_suffix))
        })?;
        self.set_part(path, updated);
        Ok(())
    }

    /// Drop the `[Content_Types].xml` override for `part`
    pub fn remove_content_type_override(&mut self, part: &str) -> XlsxResult<()> {
        let bytes = self.require("[Content_Types].xml")?;
        let part_name = format!("/{part}");
        let updated = filter_elements(bytes, b"Override", |e| {
            attr_value(e, b"PartName").as_deref() != Some(part_name.as_str())
        })?;
        self.set_part("[Content_Types].xml", updated);
        Ok(())
    }

    /// Register the content type of a new part
    pub fn add_content_type_override(&mut self, part: &str, content_type: &str) -> XlsxResult<()> {
        let bytes = self.require("[Content_Types].xml")?;
        let mut element = BytesStart::new("Override");
        element.push_attribute(("PartName", format!("/{part}").as_str()));
        element.push_attribute(("ContentType", content_type));
        let updated = append_child(bytes, b"Types", element)?;
        self.set_part("[Content_Types].xml", updated);
        Ok(())
    }

    /// Add a relationship from `part` to `target`, returning its id
    pub fn add_relationship(
        &mut self,
        part: &str,
        rel_type: &str,
        target: &str,
    ) -> XlsxResult<String> {
        let existing = self.relationships(part)?;
        let id = (1..)
            .map(|n| format!("rId{n}"))
            .find(|id| existing.iter().all(|r| &r.id != id))
            .unwrap_or_else(|| "rId1".to_string());

        let path = rels_path(part);
        let bytes = self.part(&path).map(<[u8]>::to_vec).unwrap_or_else(|| {
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
                .to_vec()
        });
        let mut element = BytesStart::new("Relationship");
        element.push_attribute(("Id", id.as_str()));
        element.push_attribute(("Type", rel_type));
        element.push_attribute(("Target", target));
        let updated = append_child(&bytes, b"Relationships", element)?;
        self.set_part(path, updated);
        Ok(id)
    }
}

/// Path of the `.rels` part describing `part`
pub fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns it
pub fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Copy an XML part, leaving out the elements named `tag` that `keep` rejects
fn filter_elements<F>(bytes: &[u8], tag: &[u8], keep: F) -> XlsxResult<Vec<u8>>
where
    F: Fn(&BytesStart<'_>) -> bool,
{
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }
        match event {
            Event::Empty(ref e) if local_name(e.name().as_ref()) == tag && !keep(e) => {}
            Event::Start(ref e) if local_name(e.name().as_ref()) == tag && !keep(e) => {
                skip_depth = 1;
            }
            Event::Eof => break,
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Copy an XML part, adding `element` as the last child of the root `root`
fn append_child(bytes: &[u8], root: &[u8], element: BytesStart<'_>) -> XlsxResult<Vec<u8>> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len() + 128));
    let mut buf = Vec::new();
    let mut element = Some(element);

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(e) if local_name(e.name().as_ref()) == root => {
                if let Some(child) = element.take() {
                    writer.write_event(Event::Empty(child))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == root => {
                writer.write_event(Event::Start(e.clone().into_owned()))?;
                if let Some(child) = element.take() {
                    writer.write_event(Event::Empty(child))?;
                }
                writer.write_event(Event::End(e.to_end().into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rels_path() {
        assert_eq!(rels_path("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(
            rels_path("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../tables/table1.xml"),
            "xl/tables/table1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
    }

    #[test]
    fn test_add_relationship() {
        let mut pkg = XlsxPackage::default();
        pkg.set_part(
            "xl/_rels/workbook.xml.rels",
            br#"<Relationships><Relationship Id="rId1" Type="t/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_vec(),
        );
        let id = pkg
            .add_relationship("xl/workbook.xml", "t/styles", "styles.xml")
            .unwrap();
        assert_eq!(id, "rId2");
        let rels = pkg.relationships("xl/workbook.xml").unwrap();
        assert_eq!(rels[1].target, "styles.xml");
        assert_eq!(rels[1].rel_type, "t/styles");
    }

    #[test]
    fn test_filter_elements() {
        let xml = br#"<Types><Override PartName="/a.xml"/><Override PartName="/b.xml"/></Types>"#;
        let out = filter_elements(xml, b"Override", |e| {
            attr_value(e, b"PartName").as_deref() != Some("/a.xml")
        })
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<Types><Override PartName="/b.xml"/></Types>"#
        );
    }
}
