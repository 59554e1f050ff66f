//! Prelude module - common imports for named-cells users
//!
//! ```rust
//! use named_cells::prelude::*;
//! ```

pub use crate::{
    // Traits
    Backend,
    NamedCellsExt,

    // Backend selection
    Engine,
    OpenOptions,
    Workbook,
    XlsxWorkbook,

    // Values
    RangeValue,
    Shape,
    Table,
    Value,

    // Errors
    ConfigError,
    Error,
    Result,
};
