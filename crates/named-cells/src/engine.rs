//! Backend selection at runtime

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use named_cells_core::{
    Backend, CellAddress, CellRange, CellWrite, DateSystem, DefinedName, NativeCell, Result, TableDef,
};
use named_cells_xlsx::XlsxWorkbook;

#[cfg(feature = "libreoffice")]
use named_cells_libreoffice::{LibreOfficeConfig, LibreOfficeWorkbook};

/// Which backend opens a workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Engine {
    /// Pure-data XLSX backend; formula results are the cached values
    #[default]
    Xlsx,
    /// Round trip through headless LibreOffice; formulas are recalculated
    LibreOffice,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Xlsx => "xlsx",
            Engine::LibreOffice => "libreoffice",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" | "openpyxl" => Ok(Engine::Xlsx),
            "libreoffice" | "soffice" => Ok(Engine::LibreOffice),
            other => Err(format!(
                "unknown engine '{other}' (expected 'xlsx' or 'libreoffice')"
            )),
        }
    }
}

/// Options for [`Workbook::open_with`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub engine: Engine,
    /// `soffice` executable for [`Engine::LibreOffice`]; searched on `PATH`
    /// when unset
    pub soffice: Option<PathBuf>,
}

impl OpenOptions {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            soffice: None,
        }
    }

    pub fn soffice(mut self, path: Option<PathBuf>) -> Self {
        self.soffice = path;
        self
    }
}

/// A workbook opened with either backend
#[derive(Debug)]
pub enum Workbook {
    Xlsx(XlsxWorkbook),
    #[cfg(feature = "libreoffice")]
    LibreOffice(LibreOfficeWorkbook),
}

impl Workbook {
    pub fn open_with<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        match options.engine {
            Engine::Xlsx => Ok(Workbook::Xlsx(XlsxWorkbook::open_file(path)?)),
            #[cfg(feature = "libreoffice")]
            Engine::LibreOffice => {
                let config = match &options.soffice {
                    Some(soffice) => LibreOfficeConfig::with_soffice(soffice),
                    None => LibreOfficeConfig::default(),
                };
                Ok(Workbook::LibreOffice(LibreOfficeWorkbook::open_with(
                    path, config,
                )?))
            }
            #[cfg(not(feature = "libreoffice"))]
            Engine::LibreOffice => Err(named_cells_core::Error::backend(
                "named-cells was built without the `libreoffice` feature",
            )),
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            Workbook::Xlsx(_) => Engine::Xlsx,
            #[cfg(feature = "libreoffice")]
            Workbook::LibreOffice(_) => Engine::LibreOffice,
        }
    }

    fn backend(&self) -> &dyn Backend {
        match self {
            Workbook::Xlsx(b) => b,
            #[cfg(feature = "libreoffice")]
            Workbook::LibreOffice(b) => b,
        }
    }

    fn backend_mut(&mut self) -> &mut dyn Backend {
        match self {
            Workbook::Xlsx(b) => b,
            #[cfg(feature = "libreoffice")]
            Workbook::LibreOffice(b) => b,
        }
    }
}

impl Backend for Workbook {
    /// Opens with the pure-data backend
    fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &OpenOptions::default())
    }

    fn path(&self) -> Option<&Path> {
        self.backend().path()
    }

    fn sheet_names(&self) -> &[String] {
        self.backend().sheet_names()
    }

    fn defined_names(&self) -> &[DefinedName] {
        self.backend().defined_names()
    }

    fn tables(&self) -> &[TableDef] {
        self.backend().tables()
    }

    fn date_system(&self) -> DateSystem {
        self.backend().date_system()
    }

    fn get(&self, sheet: &str, cell: CellAddress) -> Result<NativeCell> {
        self.backend().get(sheet, cell)
    }

    fn used_range(&self, sheet: &str) -> Result<Option<CellRange>> {
        self.backend().used_range(sheet)
    }

    fn check_write(&self, sheet: &str, cell: CellAddress) -> Result<()> {
        self.backend().check_write(sheet, cell)
    }

    fn set(&mut self, sheet: &str, cell: CellAddress, write: CellWrite) -> Result<()> {
        self.backend_mut().set(sheet, cell, write)
    }

    fn is_dirty(&self) -> bool {
        self.backend().is_dirty()
    }

    fn save(&mut self, path: Option<&Path>) -> Result<()> {
        self.backend_mut().save(path)
    }

    fn close(self) -> Result<()> {
        match self {
            Workbook::Xlsx(b) => b.close(),
            #[cfg(feature = "libreoffice")]
            Workbook::LibreOffice(b) => b.close(),
        }
    }
}
