//! # named-cells-xlsx
//!
//! XLSX backend for named-cells that never launches a spreadsheet
//! application. Edited cells are patched into their worksheet parts; every
//! other part of the package is written back unchanged.

pub mod error;
pub mod package;
pub mod workbook;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

mod patch;
mod reader;
mod recalc;
mod styles;
mod xml;

pub use error::{XlsxError, XlsxResult};
pub use package::{Relationship, XlsxPackage};
pub use workbook::XlsxWorkbook;
