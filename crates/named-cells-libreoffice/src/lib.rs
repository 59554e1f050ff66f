//! LibreOffice-backed workbooks for named-cells.
//!
//! The pure-data backend never evaluates formulas. This crate drives a
//! headless `soffice` to recalculate a workbook before its cells are read
//! and again after edits are saved.
//!
//! # Architecture
//!
//! ```text
//! LibreOfficeWorkbook (this crate)
//!     ├── soffice --headless --convert-to xlsx   (private user profile)
//!     └── XlsxWorkbook (named-cells-xlsx)        (serves the converted copy)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use named_cells_core::{Backend, NamedCellsExt};
//! use named_cells_libreoffice::{LibreOfficeConfig, LibreOfficeWorkbook};
//!
//! # fn example() -> named_cells_core::Result<()> {
//! let book = LibreOfficeWorkbook::open_with("model.xlsx", LibreOfficeConfig::default())?;
//! let total = book.read_name("o.total")?;
//! println!("{total}");
//! book.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod workbook;

mod convert;
mod profile;

pub use config::{LibreOfficeConfig, DEFAULT_FILTER};
pub use error::LibreOfficeError;
pub use workbook::LibreOfficeWorkbook;
