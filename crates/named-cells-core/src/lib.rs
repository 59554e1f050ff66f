//! # named-cells-core
//!
//! Named-range accessor shared by the named-cells backends.
//!
//! This crate provides:
//! - [`Value`] and [`RangeValue`] - Coerced cell values, shaped like their range
//! - [`CellAddress`], [`CellRange`], [`SheetRange`] - A1 addressing
//! - [`Backend`] - The capability set of an open workbook
//! - [`NamedCellsExt`] - Resolve, read and write names on any backend
//!
//! ## Example
//!
//! ```rust,ignore
//! use named_cells_core::{NamedCellsExt, RangeValue, Value};
//!
//! let threshold = book.read_name("i.threshold")?;
//! book.write_name("i.threshold", &RangeValue::Scalar(Value::Number(50.0)))?;
//! book.save(None)?;
//! ```

pub mod accessor;
pub mod address;
pub mod backend;
pub mod coerce;
pub mod datetime;
pub mod error;
pub mod named_range;
pub mod number_format;
pub mod table;
pub mod value;

// Re-exports for convenience
pub use accessor::NamedCellsExt;
pub use address::{CellAddress, CellRange, SheetRange};
pub use backend::Backend;
pub use datetime::DateSystem;
pub use error::{BackendError, Error, ErrorKind, Result, ShapeDims};
pub use named_range::{DefinedName, NameScope, NamedRange, Shape, TableDef};
pub use number_format::NumberFormat;
pub use table::{RangeValue, Table};
pub use value::{CellWrite, FormatIntent, NativeCell, NativeValue, Value};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u32 = 16_384;
