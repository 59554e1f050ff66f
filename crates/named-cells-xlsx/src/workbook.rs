//! [`XlsxWorkbook`]: the pure-data backend
//!
//! The package is read once on open; writes are kept as per-sheet patches
//! and applied to a copy of the package on save. Parts that were not edited
//! are written back byte-for-byte.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use named_cells_core::{
    Backend, CellAddress, CellRange, CellWrite, DateSystem, DefinedName, FormatIntent, NativeCell,
    NativeValue, NumberFormat, TableDef,
};

use crate::error::{XlsxError, XlsxResult};
use crate::package::{resolve_target, XlsxPackage};
use crate::patch::{patch_worksheet_xml, CellPatch, PatchValue, SheetPatches};
use crate::reader::{
    read_shared_strings, read_sheet_tables, read_workbook, read_worksheet, workbook_part, RawCell,
    SheetInfo,
};
use crate::recalc::force_recalculation;
use crate::styles::{Styles, STYLES_PART};

const STYLES_REL: &str = "/styles";
const STYLES_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const STYLES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";

/// An XLSX workbook edited without any spreadsheet application
///
/// Formulas are never evaluated: reads return the cached result stored in
/// the file, and saving marks the workbook for full recalculation the next
/// time an application opens it.
#[derive(Debug, Clone)]
pub struct XlsxWorkbook {
    package: XlsxPackage,
    path: Option<PathBuf>,
    workbook_part: String,
    sheets: Vec<SheetInfo>,
    sheet_names: Vec<String>,
    names: Vec<DefinedName>,
    tables: Vec<TableDef>,
    date_system: DateSystem,
    styles: Styles,
    styles_part: String,
    cells: Vec<HashMap<CellAddress, RawCell>>,
    patches: BTreeMap<usize, SheetPatches>,
}

impl XlsxWorkbook {
    /// Open the workbook at `path`
    pub fn open_file<P: AsRef<Path>>(path: P) -> XlsxResult<Self> {
        let path = path.as_ref();
        log::debug!("opening {}", path.display());
        let package = XlsxPackage::read_file(path)?;
        let mut book = Self::from_package(package)?;
        book.path = Some(path.to_path_buf());
        Ok(book)
    }

    /// Read a workbook from any seekable reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<Self> {
        Self::from_package(XlsxPackage::read(reader)?)
    }

    /// Interpret an already loaded package
    pub fn from_package(package: XlsxPackage) -> XlsxResult<Self> {
        let workbook_part = workbook_part(&package)?;
        let info = read_workbook(&package, &workbook_part)?;
        let shared_strings = read_shared_strings(&package)?;

        let styles_part = package
            .relationships(&workbook_part)?
            .into_iter()
            .find(|r| r.rel_type.ends_with(STYLES_REL) && !r.external)
            .map(|r| resolve_target(&workbook_part, &r.target))
            .unwrap_or_else(|| STYLES_PART.to_string());
        let styles = match package.part(&styles_part) {
            Some(bytes) => Styles::parse(bytes)?,
            None => Styles::default(),
        };

        let mut cells = Vec::with_capacity(info.sheets.len());
        let mut tables = Vec::new();
        for sheet in &info.sheets {
            match &sheet.part {
                Some(part) => {
                    let bytes = package.require(part)?;
                    cells.push(read_worksheet(bytes, &shared_strings, info.date_system)?);
                    tables.extend(read_sheet_tables(&package, part, &sheet.name)?);
                }
                None => cells.push(HashMap::new()),
            }
        }

        log::debug!(
            "workbook has {} sheets, {} names and {} tables",
            info.sheets.len(),
            info.names.len(),
            tables.len()
        );

        Ok(Self {
            sheet_names: info.sheets.iter().map(|s| s.name.clone()).collect(),
            sheets: info.sheets,
            names: info.names,
            date_system: info.date_system,
            package,
            path: None,
            workbook_part,
            tables,
            styles,
            styles_part,
            cells,
            patches: BTreeMap::new(),
        })
    }

    /// The package as it would be saved now
    pub fn to_package(&self) -> XlsxResult<XlsxPackage> {
        let mut package = self.package.clone();
        for (&idx, patches) in &self.patches {
            let part = self.worksheet_part(idx)?;
            let updated = patch_worksheet_xml(package.require(part)?, patches)?;
            package.set_part(part, updated);
        }

        if self.styles.is_dirty() {
            let original = package.part(&self.styles_part).map(<[u8]>::to_vec);
            let is_new = original.is_none();
            package.set_part(&self.styles_part, self.styles.write(original.as_deref())?);
            if is_new {
                package.add_content_type_override(&self.styles_part, STYLES_CONTENT_TYPE)?;
                let target = relative_target(&self.workbook_part, &self.styles_part);
                package.add_relationship(&self.workbook_part, STYLES_REL_TYPE, &target)?;
            }
        }

        if !self.patches.is_empty() {
            force_recalculation(&mut package, &self.workbook_part)?;
        }
        Ok(package)
    }

    /// Write the workbook with all pending edits to `writer`
    pub fn write<W: Write + Seek>(&self, writer: W) -> XlsxResult<()> {
        self.to_package()?.write(writer)
    }

    /// Write the workbook with all pending edits to `path`
    ///
    /// The file is written next to its destination and renamed into place,
    /// so a failed write leaves an existing file intact. Pending edits stay
    /// pending.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> XlsxResult<XlsxPackage> {
        let package = self.to_package()?;
        write_atomic(&package, path.as_ref())?;
        Ok(package)
    }

    /// Persist pending edits, returning to a clean state
    pub fn save_to<P: AsRef<Path>>(&mut self, path: P) -> XlsxResult<()> {
        let path = path.as_ref();
        let package = self.write_to(path)?;
        log::info!(
            "saved {} edited sheets to {}",
            self.patches.len(),
            path.display()
        );

        self.styles = match package.part(&self.styles_part) {
            Some(bytes) => Styles::parse(bytes)?,
            None => Styles::default(),
        };
        self.package = package;
        self.patches.clear();
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Index of `sheet`, matched exactly, then ignoring ASCII case
    pub fn sheet_index(&self, sheet: &str) -> XlsxResult<usize> {
        self.sheet_names
            .iter()
            .position(|s| s == sheet)
            .or_else(|| {
                self.sheet_names
                    .iter()
                    .position(|s| s.eq_ignore_ascii_case(sheet))
            })
            .ok_or_else(|| XlsxError::UnknownSheet(sheet.to_string()))
    }

    pub fn package(&self) -> &XlsxPackage {
        &self.package
    }

    fn worksheet_part(&self, idx: usize) -> XlsxResult<&str> {
        let sheet = &self.sheets[idx];
        sheet.part.as_deref().ok_or_else(|| {
            XlsxError::Unsupported(format!("sheet '{}' is not a worksheet", sheet.name))
        })
    }

    fn cell(&self, sheet: &str, addr: CellAddress) -> XlsxResult<NativeCell> {
        let idx = self.sheet_index(sheet)?;
        let Some(raw) = self.cells[idx].get(&addr) else {
            return Ok(NativeCell::empty());
        };
        let mut format = self.styles.number_format(raw.style);
        if raw.iso_date && !format.is_date_format() {
            format = NumberFormat::BuiltIn(NumberFormat::ID_DATETIME);
        }
        Ok(NativeCell::new(raw.value.clone(), format))
    }

    /// Refuse cells whose replacement would leave the sheet inconsistent
    fn check_cell_write(&self, sheet: &str, addr: CellAddress) -> XlsxResult<usize> {
        let idx = self.sheet_index(sheet)?;
        if self.cells[idx].get(&addr).map_or(false, |c| c.shared_master) {
            return Err(XlsxError::Unsupported(format!(
                "{sheet}!{addr} holds the master of a shared formula"
            )));
        }
        Ok(idx)
    }

    fn set_cell(&mut self, sheet: &str, addr: CellAddress, write: CellWrite) -> XlsxResult<()> {
        let idx = self.check_cell_write(sheet, addr)?;
        self.worksheet_part(idx)?;

        let value = match &write.value {
            NativeValue::Empty => PatchValue::Empty,
            NativeValue::Number(n) => PatchValue::Number(*n),
            NativeValue::Text(s) => PatchValue::Text(s.clone()),
            NativeValue::Bool(b) => PatchValue::Bool(*b),
            NativeValue::Error(e) => PatchValue::Error(e.clone()),
            NativeValue::Formula { .. } => {
                return Err(XlsxError::Unsupported(format!(
                    "cannot write a formula to {sheet}!{addr}"
                )))
            }
        };

        let current = self.cells[idx].get(&addr).map_or(0, |c| c.style);
        let is_date = self.styles.number_format(current).is_date_format();
        let style = match write.format {
            FormatIntent::Numeric if is_date => {
                self.styles
                    .with_number_format(current, NumberFormat::ID_GENERAL)
            }
            FormatIntent::DateTime if !is_date => {
                self.styles
                    .with_number_format(current, NumberFormat::ID_DATETIME)
            }
            _ => current,
        };

        log::trace!("set {sheet}!{addr} = {:?} (style {style})", write.value);
        self.cells[idx].insert(
            addr,
            RawCell {
                value: write.value,
                style,
                iso_date: false,
                shared_master: false,
            },
        );
        self.patches
            .entry(idx)
            .or_default()
            .insert((addr.row, addr.col), CellPatch { value, style });
        Ok(())
    }
}

impl Backend for XlsxWorkbook {
    fn open(path: &Path) -> named_cells_core::Result<Self> {
        Ok(Self::open_file(path)?)
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    fn defined_names(&self) -> &[DefinedName] {
        &self.names
    }

    fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    fn date_system(&self) -> DateSystem {
        self.date_system
    }

    fn get(&self, sheet: &str, cell: CellAddress) -> named_cells_core::Result<NativeCell> {
        Ok(self.cell(sheet, cell)?)
    }

    fn used_range(&self, sheet: &str) -> named_cells_core::Result<Option<CellRange>> {
        let idx = self.sheet_index(sheet)?;
        Ok(CellRange::covering(self.cells[idx].iter().filter_map(
            |(addr, raw)| (!matches!(raw.value, NativeValue::Empty)).then_some(*addr),
        )))
    }

    fn check_write(&self, sheet: &str, cell: CellAddress) -> named_cells_core::Result<()> {
        self.check_cell_write(sheet, cell)?;
        Ok(())
    }

    fn set(
        &mut self,
        sheet: &str,
        cell: CellAddress,
        write: CellWrite,
    ) -> named_cells_core::Result<()> {
        Ok(self.set_cell(sheet, cell, write)?)
    }

    fn is_dirty(&self) -> bool {
        !self.patches.is_empty()
    }

    fn save(&mut self, path: Option<&Path>) -> named_cells_core::Result<()> {
        let target = match path.or(self.path.as_deref()) {
            Some(p) => p.to_path_buf(),
            None => {
                return Err(named_cells_core::Error::backend(XlsxError::Unsupported(
                    "workbook has no path to save to".into(),
                )))
            }
        };
        Ok(self.save_to(target)?)
    }
}

fn write_atomic(package: &XlsxPackage, path: &Path) -> XlsxResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    package.write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// `target` relative to the directory of `from`, for a relationship entry
fn relative_target(from: &str, target: &str) -> String {
    let dir = from.rsplit_once('/').map_or("", |(d, _)| d);
    match target.strip_prefix(dir).and_then(|t| t.strip_prefix('/')) {
        Some(rest) if !dir.is_empty() => rest.to_string(),
        _ => format!("/{target}"),
    }
}
