//! Builder for small XLSX packages
//!
//! Produces the parts a spreadsheet application would write for a simple
//! workbook: shared strings, a styles part with a few fixed cell formats,
//! defined names, tables and optionally a calculation chain.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use named_cells_core::CellAddress;

use crate::error::{XlsxError, XlsxResult};

/// Cell format 1: built-in date `mm-dd-yy` (14)
pub const STYLE_DATE: u32 = 1;
/// Cell format 2: built-in date and time `m/d/yy h:mm` (22)
pub const STYLE_DATETIME: u32 = 2;
/// Cell format 3: custom `yyyy-mm-dd hh:mm` (164)
pub const STYLE_CUSTOM_DATE: u32 = 3;
/// Cell format 4: built-in `0.00` (2)
pub const STYLE_DECIMAL: u32 = 4;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CT_PREFIX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml";

#[derive(Debug, Clone)]
enum FixtureValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
    Formula { text: String, cached: f64 },
    /// Member of shared formula group `si`; the master carries text and range
    Shared {
        si: u32,
        master: Option<(String, String)>,
        cached: f64,
    },
    Empty,
}

#[derive(Debug, Clone)]
struct FixtureTable {
    name: String,
    reference: String,
    columns: Vec<String>,
    totals_rows: u32,
}

#[derive(Debug, Clone)]
struct FixtureSheet {
    name: String,
    cells: BTreeMap<(u32, u32), (FixtureValue, u32)>,
    tables: Vec<FixtureTable>,
}

#[derive(Debug, Clone)]
struct FixtureName {
    name: String,
    local_sheet: Option<usize>,
    refers_to: String,
}

/// A workbook description that builds into XLSX bytes
#[derive(Debug, Clone, Default)]
pub struct XlsxFixture {
    sheets: Vec<FixtureSheet>,
    names: Vec<FixtureName>,
    date1904: bool,
    calc_chain: bool,
    no_styles: bool,
}

impl XlsxFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty worksheet
    pub fn sheet(mut self, name: &str) -> Self {
        self.sheets.push(FixtureSheet {
            name: name.to_string(),
            cells: BTreeMap::new(),
            tables: Vec::new(),
        });
        self
    }

    pub fn number(self, sheet: &str, a1: &str, n: f64) -> Self {
        self.cell(sheet, a1, FixtureValue::Number(n), 0)
    }

    pub fn styled_number(self, sheet: &str, a1: &str, n: f64, style: u32) -> Self {
        self.cell(sheet, a1, FixtureValue::Number(n), style)
    }

    /// Shared-string text cell
    pub fn text(self, sheet: &str, a1: &str, s: &str) -> Self {
        self.cell(sheet, a1, FixtureValue::Text(s.to_string()), 0)
    }

    pub fn boolean(self, sheet: &str, a1: &str, b: bool) -> Self {
        self.cell(sheet, a1, FixtureValue::Bool(b), 0)
    }

    pub fn error(self, sheet: &str, a1: &str, code: &str) -> Self {
        self.cell(sheet, a1, FixtureValue::Error(code.to_string()), 0)
    }

    /// Cell carrying only a format
    pub fn styled_empty(self, sheet: &str, a1: &str, style: u32) -> Self {
        self.cell(sheet, a1, FixtureValue::Empty, style)
    }

    /// Formula cell with a cached numeric result
    pub fn formula(self, sheet: &str, a1: &str, text: &str, cached: f64) -> Self {
        self.cell(
            sheet,
            a1,
            FixtureValue::Formula {
                text: text.to_string(),
                cached,
            },
            0,
        )
    }

    /// Workbook-scoped defined name
    /// Master cell of shared formula group `si` covering `reference`
    pub fn shared_master(
        self,
        sheet: &str,
        a1: &str,
        si: u32,
        reference: &str,
        text: &str,
        cached: f64,
    ) -> Self {
        let master = Some((reference.to_string(), text.to_string()));
        self.cell(sheet, a1, FixtureValue::Shared { si, master, cached }, 0)
    }

    /// Dependent cell of shared formula group `si`
    pub fn shared_dependent(self, sheet: &str, a1: &str, si: u32, cached: f64) -> Self {
        let value = FixtureValue::Shared {
            si,
            master: None,
            cached,
        };
        self.cell(sheet, a1, value, 0)
    }

    pub fn name(mut self, name: &str, refers_to: &str) -> Self {
        self.names.push(FixtureName {
            name: name.to_string(),
            local_sheet: None,
            refers_to: refers_to.to_string(),
        });
        self
    }

    /// Defined name scoped to the sheet at `sheet_index`
    pub fn local_name(mut self, name: &str, sheet_index: usize, refers_to: &str) -> Self {
        self.names.push(FixtureName {
            name: name.to_string(),
            local_sheet: Some(sheet_index),
            refers_to: refers_to.to_string(),
        });
        self
    }

    /// Table with one header row; header cells are not filled in
    pub fn table(self, sheet: &str, name: &str, reference: &str, columns: &[&str]) -> Self {
        self.table_with_totals(sheet, name, reference, columns, 0)
    }

    pub fn table_with_totals(
        mut self,
        sheet: &str,
        name: &str,
        reference: &str,
        columns: &[&str],
        totals_rows: u32,
    ) -> Self {
        let table = FixtureTable {
            name: name.to_string(),
            reference: reference.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            totals_rows,
        };
        if let Some(s) = self.sheets.iter_mut().find(|s| s.name == sheet) {
            s.tables.push(table);
        }
        self
    }

    pub fn date1904(mut self) -> Self {
        self.date1904 = true;
        self
    }

    /// Include `xl/calcChain.xml` listing every formula cell
    pub fn with_calc_chain(mut self) -> Self {
        self.calc_chain = true;
        self
    }

    /// Leave out `xl/styles.xml`
    pub fn without_styles(mut self) -> Self {
        self.no_styles = true;
        self
    }

    fn cell(mut self, sheet: &str, a1: &str, value: FixtureValue, style: u32) -> Self {
        // Unknown sheets and bad addresses make the cell disappear, which the
        // test using the fixture will notice.
        if let (Some(s), Ok(addr)) = (
            self.sheets.iter_mut().find(|s| s.name == sheet),
            CellAddress::parse(a1),
        ) {
            s.cells.insert((addr.row, addr.col), (value, style));
        }
        self
    }

    /// The package as ZIP bytes
    pub fn build(&self) -> XlsxResult<Vec<u8>> {
        let parts = self.parts();
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data.as_bytes())?;
        }
        Ok(zip.finish()?.into_inner())
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> XlsxResult<()> {
        std::fs::write(path, self.build()?).map_err(XlsxError::Io)
    }

    fn parts(&self) -> Vec<(String, String)> {
        let shared = self.shared_strings();
        let mut parts = vec![
            ("[Content_Types].xml".to_string(), self.content_types()),
            ("_rels/.rels".to_string(), root_rels()),
            ("xl/workbook.xml".to_string(), self.workbook_xml()),
            ("xl/_rels/workbook.xml.rels".to_string(), self.workbook_rels()),
        ];
        if !self.no_styles {
            parts.push(("xl/styles.xml".to_string(), styles_xml()));
        }
        parts.push(("xl/sharedStrings.xml".to_string(), shared_strings_xml(&shared)));

        let mut table_id = 0;
        for (i, sheet) in self.sheets.iter().enumerate() {
            let n = i + 1;
            let first_table = table_id + 1;
            parts.push((
                format!("xl/worksheets/sheet{n}.xml"),
                worksheet_xml(sheet, &shared),
            ));
            if !sheet.tables.is_empty() {
                let rels: String = sheet
                    .tables
                    .iter()
                    .enumerate()
                    .map(|(j, _)| {
                        format!(
                            r#"<Relationship Id="rId{}" Type="{REL_NS}/table" Target="../tables/table{}.xml"/>"#,
                            j + 1,
                            first_table + j
                        )
                    })
                    .collect();
                parts.push((
                    format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                    format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}">{rels}</Relationships>"#),
                ));
            }
            for table in &sheet.tables {
                table_id += 1;
                parts.push((format!("xl/tables/table{table_id}.xml"), table_xml(table, table_id)));
            }
        }

        if self.calc_chain {
            parts.push(("xl/calcChain.xml".to_string(), self.calc_chain_xml()));
        }
        parts
    }

    fn table_count(&self) -> usize {
        self.sheets.iter().map(|s| s.tables.len()).sum()
    }

    fn content_types(&self) -> String {
        let mut overrides = format!(
            r#"<Override PartName="/xl/workbook.xml" ContentType="{CT_PREFIX}.sheet.main+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="{CT_PREFIX}.sharedStrings+xml"/>"#
        );
        if !self.no_styles {
            overrides.push_str(&format!(
                r#"<Override PartName="/xl/styles.xml" ContentType="{CT_PREFIX}.styles+xml"/>"#
            ));
        }
        for n in 1..=self.sheets.len() {
            overrides.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="{CT_PREFIX}.worksheet+xml"/>"#
            ));
        }
        for n in 1..=self.table_count() {
            overrides.push_str(&format!(
                r#"<Override PartName="/xl/tables/table{n}.xml" ContentType="{CT_PREFIX}.table+xml"/>"#
            ));
        }
        if self.calc_chain {
            overrides.push_str(&format!(
                r#"<Override PartName="/xl/calcChain.xml" ContentType="{CT_PREFIX}.calcChain+xml"/>"#
            ));
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
        )
    }

    fn workbook_xml(&self) -> String {
        let sheets: String = self
            .sheets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                    escape(s.name.as_str()),
                    i + 1,
                    i + 1
                )
            })
            .collect();
        let names: String = self
            .names
            .iter()
            .map(|n| {
                let scope = n
                    .local_sheet
                    .map(|i| format!(r#" localSheetId="{i}""#))
                    .unwrap_or_default();
                format!(
                    r#"<definedName name="{}"{scope}>{}</definedName>"#,
                    escape(n.name.as_str()),
                    escape(n.refers_to.as_str())
                )
            })
            .collect();
        let names = if names.is_empty() {
            String::new()
        } else {
            format!("<definedNames>{names}</definedNames>")
        };
        let pr = if self.date1904 {
            r#"<workbookPr date1904="1"/>"#
        } else {
            "<workbookPr/>"
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}">{pr}<bookViews><workbookView/></bookViews><sheets>{sheets}</sheets>{names}<calcPr calcId="191029"/></workbook>"#
        )
    }

    fn workbook_rels(&self) -> String {
        let mut rels: String = (1..=self.sheets.len())
            .map(|n| {
                format!(
                    r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
                )
            })
            .collect();
        let mut next = self.sheets.len() + 1;
        let mut push = |rel_type: &str, target: &str| {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{next}" Type="{REL_NS}/{rel_type}" Target="{target}"/>"#
            ));
            next += 1;
        };
        if !self.no_styles {
            push("styles", "styles.xml");
        }
        push("sharedStrings", "sharedStrings.xml");
        if self.calc_chain {
            push("calcChain", "calcChain.xml");
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}">{rels}</Relationships>"#
        )
    }

    fn shared_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for sheet in &self.sheets {
            for (value, _) in sheet.cells.values() {
                if let FixtureValue::Text(s) = value {
                    if !out.contains(s) {
                        out.push(s.clone());
                    }
                }
            }
        }
        out
    }

    fn calc_chain_xml(&self) -> String {
        let mut cells = String::new();
        for (i, sheet) in self.sheets.iter().enumerate() {
            for (&(row, col), (value, _)) in &sheet.cells {
                if matches!(value, FixtureValue::Formula { .. } | FixtureValue::Shared { .. }) {
                    cells.push_str(&format!(
                        r#"<c r="{}" i="{}"/>"#,
                        CellAddress::new(row, col).to_a1_string(),
                        i + 1
                    ));
                }
            }
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><calcChain xmlns="{MAIN_NS}">{cells}</calcChain>"#
        )
    }
}

fn root_rels() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    )
}

fn styles_xml() -> String {
    let xf = |fmt: u32| {
        let apply = if fmt == 0 { "" } else { r#" applyNumberFormat="1""# };
        format!(r#"<xf numFmtId="{fmt}" fontId="0" fillId="0" borderId="0" xfId="0"{apply}/>"#)
    };
    let xfs: String = [0, 14, 22, 164, 2].iter().map(|&f| xf(f)).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="{MAIN_NS}"><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd\ hh:mm"/></numFmts><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="5">{xfs}</cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#
    )
}

fn shared_strings_xml(strings: &[String]) -> String {
    let items: String = strings
        .iter()
        .map(|s| {
            let space = if s.trim() != s { r#" xml:space="preserve""# } else { "" };
            format!("<si><t{space}>{}</t></si>", escape(s.as_str()))
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="{MAIN_NS}" count="{n}" uniqueCount="{n}">{items}</sst>"#,
        n = strings.len()
    )
}

fn worksheet_xml(sheet: &FixtureSheet, shared: &[String]) -> String {
    let mut rows: BTreeMap<u32, String> = BTreeMap::new();
    for (&(row, col), (value, style)) in &sheet.cells {
        let r = CellAddress::new(row, col).to_a1_string();
        let s = if *style == 0 { String::new() } else { format!(r#" s="{style}""#) };
        let cell = match value {
            FixtureValue::Number(n) => format!(r#"<c r="{r}"{s}><v>{n}</v></c>"#),
            FixtureValue::Text(text) => {
                let idx = shared.iter().position(|x| x == text).unwrap_or(0);
                format!(r#"<c r="{r}"{s} t="s"><v>{idx}</v></c>"#)
            }
            FixtureValue::Bool(b) => format!(r#"<c r="{r}"{s} t="b"><v>{}</v></c>"#, u8::from(*b)),
            FixtureValue::Error(e) => {
                format!(r#"<c r="{r}"{s} t="e"><v>{}</v></c>"#, escape(e.as_str()))
            }
            FixtureValue::Formula { text, cached } => format!(
                r#"<c r="{r}"{s}><f>{}</f><v>{cached}</v></c>"#,
                escape(text.as_str())
            ),
            FixtureValue::Shared {
                si,
                master: Some((reference, text)),
                cached,
            } => format!(
                r#"<c r="{r}"{s}><f t="shared" ref="{reference}" si="{si}">{}</f><v>{cached}</v></c>"#,
                escape(text.as_str())
            ),
            FixtureValue::Shared {
                si,
                master: None,
                cached,
            } => format!(r#"<c r="{r}"{s}><f t="shared" si="{si}"/><v>{cached}</v></c>"#),
            FixtureValue::Empty => format!(r#"<c r="{r}"{s}/>"#),
        };
        rows.entry(row).or_default().push_str(&cell);
    }
    let data: String = rows
        .iter()
        .map(|(row, cells)| format!(r#"<row r="{}">{cells}</row>"#, row + 1))
        .collect();
    let tables = if sheet.tables.is_empty() {
        String::new()
    } else {
        let parts: String = (1..=sheet.tables.len())
            .map(|j| format!(r#"<tablePart r:id="rId{j}"/>"#))
            .collect();
        format!(r#"<tableParts count="{}">{parts}</tableParts>"#, sheet.tables.len())
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="15"/><cols><col min="1" max="1" width="14" customWidth="1"/></cols><sheetData>{data}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>{tables}</worksheet>"#
    )
}

fn table_xml(table: &FixtureTable, id: usize) -> String {
    let columns: String = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!(r#"<tableColumn id="{}" name="{}"/>"#, i + 1, escape(c.as_str())))
        .collect();
    let totals = if table.totals_rows > 0 {
        format!(r#" totalsRowCount="{}""#, table.totals_rows)
    } else {
        String::new()
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><table xmlns="{MAIN_NS}" id="{id}" name="{name}" displayName="{name}" ref="{r}"{totals}><autoFilter ref="{r}"/><tableColumns count="{n}">{columns}</tableColumns><tableStyleInfo name="TableStyleMedium2" showRowStripes="1"/></table>"#,
        name = escape(table.name.as_str()),
        r = table.reference,
        n = table.columns.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XlsxPackage;

    #[test]
    fn test_fixture_is_a_package() {
        let bytes = XlsxFixture::new()
            .sheet("A")
            .text("A", "A1", "x")
            .table("A", "T", "A1:A2", &["x"])
            .with_calc_chain()
            .build()
            .unwrap();
        let pkg = XlsxPackage::read(Cursor::new(bytes)).unwrap();
        let names: Vec<&str> = pkg.part_names().collect();
        assert!(names.contains(&"xl/tables/table1.xml"));
        assert!(names.contains(&"xl/worksheets/_rels/sheet1.xml.rels"));
        assert!(names.contains(&"xl/calcChain.xml"));
    }
}
