//! # named-cells
//!
//! Read and write the named cells of XLSX workbooks, and move their values
//! in and out of TOML configuration files.
//!
//! ## Features
//!
//! - Resolve workbook-scoped names to scalars, vectors and tables
//! - Two interchangeable backends: pure-data XLSX patching, and a
//!   LibreOffice round trip that recalculates formulas (`libreoffice` feature)
//! - Export names grouped by sheet to TOML, and load them back all-or-nothing
//! - CSV listings of names with their address, shape and value
//! - Cell-by-cell sheet comparison with a numeric tolerance
//!
//! ## Example
//!
//! ```rust,no_run
//! use named_cells::prelude::*;
//!
//! # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let mut book = Workbook::open_with("model.xlsx", &OpenOptions::default())?;
//!
//! // Named cells
//! let threshold = book.read_name("i.threshold")?;
//! book.write_name("i.threshold", &RangeValue::Scalar(Value::Number(50.0)))?;
//!
//! // Configuration files
//! let text = named_cells::config::to_toml_string(&book, Some("i."))?;
//! named_cells::config::load(&mut book, &text)?;
//!
//! book.save(None)?;
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod config;
pub mod engine;
pub mod prelude;
pub mod specs;

pub use compare::{compare_sheets, CellDiff, SheetComparison};
pub use config::{ConfigError, ConfigResult};
pub use engine::{Engine, OpenOptions, Workbook};
pub use specs::NameSpec;

// Re-export core types
pub use named_cells_core::{
    accessor, Backend, CellAddress, CellRange, DateSystem, DefinedName, Error, ErrorKind,
    NameScope, NamedCellsExt, NamedRange, RangeValue, Result, Shape, SheetRange, Table, TableDef,
    Value,
};

// Re-export backends
pub use named_cells_xlsx::{XlsxError, XlsxWorkbook};

#[cfg(feature = "libreoffice")]
pub use named_cells_libreoffice::{LibreOfficeConfig, LibreOfficeError, LibreOfficeWorkbook};
