//! [`LibreOfficeWorkbook`]: an XLSX workbook recalculated by LibreOffice

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use named_cells_core::{
    Backend, CellAddress, CellRange, CellWrite, DateSystem, DefinedName, NativeCell, TableDef,
};
use named_cells_xlsx::XlsxWorkbook;
use tempfile::TempDir;

use crate::config::LibreOfficeConfig;
use crate::convert::convert;
use crate::error::{LibreOfficeError, Result};
use crate::profile::Profile;

/// A workbook whose formula results are always fresh
///
/// Opening converts the file through headless `soffice`, which recalculates
/// every formula; cells are then served from the converted copy. Saving
/// writes the edits, converts again and copies the result to the target,
/// so saved files carry recalculated values.
#[derive(Debug)]
pub struct LibreOfficeWorkbook {
    config: LibreOfficeConfig,
    inner: XlsxWorkbook,
    path: PathBuf,
    /// Scratch space for staged and converted copies
    work: TempDir,
    profile: Profile,
}

impl LibreOfficeWorkbook {
    /// Open `path` with `config`
    pub fn open_with<P: AsRef<Path>>(path: P, config: LibreOfficeConfig) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("opening {} through LibreOffice", path.display());

        let profile = Profile::create()?;
        let work = tempfile::Builder::new().prefix("named-cells").tempdir()?;

        let staged = scratch_dir(&work, "input")?.join(file_name(path));
        fs::copy(path, &staged)?;
        let converted = convert(&config, &profile, &staged, &scratch_dir(&work, "open")?)?;
        let inner = XlsxWorkbook::open_file(&converted)?;

        Ok(Self {
            config,
            inner,
            path: path.to_path_buf(),
            work,
            profile,
        })
    }

    pub fn config(&self) -> &LibreOfficeConfig {
        &self.config
    }

    /// The recalculated copy the cells are read from
    pub fn inner(&self) -> &XlsxWorkbook {
        &self.inner
    }

    fn save_to(&mut self, target: &Path) -> Result<()> {
        let staged = scratch_dir(&self.work, "save")?.join(file_name(target));
        self.inner.write_to(&staged)?;
        let converted = convert(
            &self.config,
            &self.profile,
            &staged,
            &scratch_dir(&self.work, "saved")?,
        )?;

        copy_atomic(&converted, target)?;
        tracing::info!("saved {} through LibreOffice", target.display());

        self.inner = XlsxWorkbook::open_file(&converted)?;
        self.path = target.to_path_buf();
        Ok(())
    }
}

impl Backend for LibreOfficeWorkbook {
    fn open(path: &Path) -> named_cells_core::Result<Self> {
        Ok(Self::open_with(path, LibreOfficeConfig::default())?)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn sheet_names(&self) -> &[String] {
        self.inner.sheet_names()
    }

    fn defined_names(&self) -> &[DefinedName] {
        self.inner.defined_names()
    }

    fn tables(&self) -> &[TableDef] {
        self.inner.tables()
    }

    fn date_system(&self) -> DateSystem {
        self.inner.date_system()
    }

    fn get(&self, sheet: &str, cell: CellAddress) -> named_cells_core::Result<NativeCell> {
        self.inner.get(sheet, cell)
    }

    fn used_range(&self, sheet: &str) -> named_cells_core::Result<Option<CellRange>> {
        self.inner.used_range(sheet)
    }

    fn check_write(&self, sheet: &str, cell: CellAddress) -> named_cells_core::Result<()> {
        self.inner.check_write(sheet, cell)
    }

    fn set(
        &mut self,
        sheet: &str,
        cell: CellAddress,
        write: CellWrite,
    ) -> named_cells_core::Result<()> {
        self.inner.set(sheet, cell, write)
    }

    fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    fn save(&mut self, path: Option<&Path>) -> named_cells_core::Result<()> {
        let target = path.map_or_else(|| self.path.clone(), Path::to_path_buf);
        Ok(self.save_to(&target)?)
    }

    fn close(self) -> named_cells_core::Result<()> {
        let Self { work, profile, .. } = self;
        work.close().map_err(LibreOfficeError::Io)?;
        profile.close()?;
        Ok(())
    }
}

/// A fresh, empty directory under `work`
///
/// `soffice` names its output after the input, so every conversion writes
/// into a directory of its own. The directory is removed together with
/// `work`.
fn scratch_dir(work: &TempDir, prefix: &str) -> Result<PathBuf> {
    let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(work.path())?;
    Ok(dir.keep())
}

fn file_name(path: &Path) -> OsString {
    path.file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("workbook.xlsx"))
}

fn copy_atomic(from: &Path, to: &Path) -> Result<()> {
    let dir = match to.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::copy(&mut File::open(from)?, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(to)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_without_soffice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        fs::write(&path, b"not used").unwrap();

        let config = LibreOfficeConfig::with_soffice(dir.path().join("missing-soffice"));
        let err = LibreOfficeWorkbook::open_with(&path, config).unwrap_err();
        assert!(matches!(err, LibreOfficeError::NotFound(_)));
    }

    #[test]
    fn test_scratch_dirs_live_under_work() {
        let work = tempfile::tempdir().unwrap();
        let first = scratch_dir(&work, "save").unwrap();
        let second = scratch_dir(&work, "save").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with(work.path()));
        assert!(first.is_dir() && second.is_dir());

        work.close().unwrap();
        assert!(!first.exists());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LibreOfficeWorkbook::open_with(dir.path().join("nope.xlsx"), LibreOfficeConfig::default())
            .unwrap_err();
        assert!(matches!(err, LibreOfficeError::Io(_)));
    }
}
