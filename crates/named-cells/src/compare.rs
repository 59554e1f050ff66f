//! Cell-by-cell comparison of two sheets
//!
//! Used to check a recalculated workbook against a reference copy. Numbers
//! compare with a relative and absolute tolerance, text compares against the
//! other cell's display string.

use std::fmt;

use named_cells_core::coerce;
use named_cells_core::{Backend, CellAddress, CellRange, Result, Value};

/// Relative tolerance for numbers
pub const RELATIVE_TOLERANCE: f64 = 1e-5;

/// Absolute tolerance for numbers
pub const ABSOLUTE_TOLERANCE: f64 = 1e-8;

/// A cell whose values differ
#[derive(Debug, Clone, PartialEq)]
pub struct CellDiff {
    pub sheet: String,
    pub address: CellAddress,
    pub left: Value,
    pub right: Value,
}

impl fmt::Display for CellDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}: {} != {}",
            self.sheet,
            self.address,
            shown(&self.left),
            shown(&self.right)
        )
    }
}

fn shown(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Outcome of [`compare_sheets`]
#[derive(Debug, Clone, PartialEq)]
pub struct SheetComparison {
    /// Used range of each side, `None` for a sheet without values
    pub left_extent: Option<CellRange>,
    pub right_extent: Option<CellRange>,
    pub diffs: Vec<CellDiff>,
}

impl SheetComparison {
    pub fn shapes_match(&self) -> bool {
        dims(self.left_extent) == dims(self.right_extent)
    }

    pub fn is_match(&self) -> bool {
        self.shapes_match() && self.diffs.is_empty()
    }
}

fn dims(extent: Option<CellRange>) -> (u32, u32) {
    extent.map_or((0, 0), |r| (r.row_count(), r.col_count()))
}

/// Compare `left_sheet` of `left` with `right_sheet` of `right` (the same
/// sheet name when `None`), from `start` to the end of the area both sheets
/// use
///
/// Sheets of different sizes are compared over their overlap and reported
/// through [`SheetComparison::shapes_match`].
pub fn compare_sheets<L, R>(
    left: &L,
    left_sheet: &str,
    right: &R,
    right_sheet: Option<&str>,
    start: CellAddress,
) -> Result<SheetComparison>
where
    L: Backend + ?Sized,
    R: Backend + ?Sized,
{
    let right_sheet = right_sheet.unwrap_or(left_sheet);
    let left_extent = left.used_range(left_sheet)?;
    let right_extent = right.used_range(right_sheet)?;

    let (left_rows, left_cols) = dims(left_extent);
    let (right_rows, right_cols) = dims(right_extent);
    if (left_rows, left_cols) != (right_rows, right_cols) {
        log::warn!(
            "shape mismatch: {left_sheet} is {left_rows}x{left_cols}, \
             {right_sheet} is {right_rows}x{right_cols}"
        );
    }
    let rows = left_rows.min(right_rows);
    let cols = left_cols.min(right_cols);

    let mut diffs = Vec::new();
    if start.row < rows && start.col < cols {
        let area = CellRange::from_indices(start.row, start.col, rows - 1, cols - 1);
        for address in area.cells() {
            let l = coerce::to_value(&left.get(left_sheet, address)?, left.date_system());
            let r = coerce::to_value(&right.get(right_sheet, address)?, right.date_system());
            if !values_match(&l, &r) {
                diffs.push(CellDiff {
                    sheet: left_sheet.to_string(),
                    address,
                    left: l,
                    right: r,
                });
            }
        }
    }

    Ok(SheetComparison {
        left_extent,
        right_extent,
        diffs,
    })
}

/// Whether two cell values agree; the left value decides how they compare
pub fn values_match(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Text(l), r) => *l == r.to_string(),
        (Value::Number(l), r) => match number(r) {
            Some(r) => is_close(*l, r),
            None => false,
        },
        (l, r) => l == r,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

/// `|a - b| <= atol + rtol * |b|`; NaN never matches
pub fn is_close(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_infinite() || b.is_infinite() {
        return false;
    }
    (a - b).abs() <= ABSOLUTE_TOLERANCE + RELATIVE_TOLERANCE * b.abs()
}
