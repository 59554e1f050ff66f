//! The capability set an open workbook offers to the accessor

use std::path::Path;

use crate::address::{CellAddress, CellRange};
use crate::datetime::DateSystem;
use crate::error::Result;
use crate::named_range::{DefinedName, TableDef};
use crate::value::{CellWrite, NativeCell};

/// An open workbook
///
/// A handle owns every resource it needs (files, temporary directories) and
/// releases them on drop. Writes go to the handle only; nothing reaches disk
/// before [`Backend::save`].
pub trait Backend {
    /// Open the workbook at `path`
    fn open(path: &Path) -> Result<Self>
    where
        Self: Sized;

    /// Path the workbook was opened from
    fn path(&self) -> Option<&Path>;

    /// Sheet names in workbook order
    fn sheet_names(&self) -> &[String];

    /// Entries of the name table
    fn defined_names(&self) -> &[DefinedName];

    /// Native tables (list objects) of all sheets
    fn tables(&self) -> &[TableDef];

    fn date_system(&self) -> DateSystem;

    /// Read one cell; cells outside the used area read as empty
    fn get(&self, sheet: &str, cell: CellAddress) -> Result<NativeCell>;

    /// Range from `A1` to the last row and column holding a value, `None`
    /// when the sheet has no values
    fn used_range(&self, sheet: &str) -> Result<Option<CellRange>>;

    /// Fail when [`Backend::set`] would refuse to write `cell`
    fn check_write(&self, sheet: &str, cell: CellAddress) -> Result<()> {
        let _ = (sheet, cell);
        Ok(())
    }

    /// Record a write to one cell
    fn set(&mut self, sheet: &str, cell: CellAddress, write: CellWrite) -> Result<()>;

    /// Whether there are writes not yet saved
    fn is_dirty(&self) -> bool;

    /// Persist to `path`, or to the path the workbook was opened from
    fn save(&mut self, path: Option<&Path>) -> Result<()>;

    /// Release the handle, reporting cleanup failures
    fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}
