//! Cell addresses, rectangular spans and sheet-qualified ranges

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};

/// A cell position, 0-based (`A1` is row 0, column 0)
///
/// `$` markers are accepted when parsing and dropped: a named range always
/// denotes a fixed span, so relative/absolute flags carry no meaning here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse A1-style notation (`B7`, `$B$7`)
    ///
    /// # Examples
    /// ```
    /// use named_cells_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("$C$10").unwrap();
    /// assert_eq!((addr.row, addr.col), (9, 2));
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let bytes = s.as_bytes();
        let mut pos = 0;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }
        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(Error::InvalidAddress(format!("no column letters in '{s}'")));
        }
        let col = Self::letters_to_column(&s[col_start..pos])?;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }
        let row_str = &s[pos..];
        if row_str.is_empty() || !row_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidAddress(format!("invalid row number in '{s}'")));
        }
        let row: u32 = row_str
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid row number in '{s}'")))?;
        if row == 0 || row > MAX_ROWS {
            return Err(Error::InvalidAddress(format!("row out of bounds in '{s}'")));
        }

        Ok(Self { row: row - 1, col })
    }

    /// Convert a column index to letters (0 = A, 25 = Z, 26 = AA)
    pub fn column_to_letters(col: u32) -> String {
        let mut result = Vec::new();
        let mut n = col + 1;
        while n > 0 {
            n -= 1;
            result.push((n % 26) as u8 + b'A');
            n /= 26;
        }
        result.reverse();
        String::from_utf8(result).unwrap_or_default()
    }

    /// Convert column letters to an index (A = 0, AA = 26)
    pub fn letters_to_column(letters: &str) -> Result<u32> {
        if letters.is_empty() || letters.len() > 3 {
            return Err(Error::InvalidAddress(format!("bad column '{letters}'")));
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!("invalid column letter '{c}'")));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        if col > MAX_COLS {
            return Err(Error::InvalidAddress(format!("column out of bounds '{letters}'")));
        }
        Ok(col - 1)
    }

    pub fn to_a1_string(&self) -> String {
        format!("{}{}", Self::column_to_letters(self.col), self.row + 1)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular span of cells; `start` is top-left, `end` bottom-right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Create a range, normalizing the corners
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start: CellAddress::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddress::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn single(addr: CellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    pub fn from_indices(start_row: u32, start_col: u32, end_row: u32, end_col: u32) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    /// Range from `A1` to the last row and column among `cells`
    pub fn covering(cells: impl IntoIterator<Item = CellAddress>) -> Option<Self> {
        cells
            .into_iter()
            .fold(None, |end: Option<CellAddress>, addr| {
                Some(match end {
                    Some(e) => CellAddress::new(e.row.max(addr.row), e.col.max(addr.col)),
                    None => addr,
                })
            })
            .map(|end| Self::new(CellAddress::new(0, 0), end))
    }

    /// Parse `A1:B10` or a single cell
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(CellAddress::parse(a)?, CellAddress::parse(b)?)),
            None => Ok(Self::single(CellAddress::parse(s)?)),
        }
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    pub fn contains(&self, addr: &CellAddress) -> bool {
        addr.row >= self.start.row
            && addr.row <= self.end.row
            && addr.col >= self.start.col
            && addr.col <= self.end.col
    }

    /// Addresses of one row of the span (0-based offset from the top)
    pub fn row_cells(&self, offset: u32) -> impl Iterator<Item = CellAddress> {
        let row = self.start.row + offset;
        (self.start.col..=self.end.col).map(move |col| CellAddress::new(row, col))
    }

    /// All addresses, row by row
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> {
        let range = *self;
        (range.start.row..=range.end.row).flat_map(move |row| {
            (range.start.col..=range.end.col).map(move |col| CellAddress::new(row, col))
        })
    }

    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start, self.end)
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A span on a named sheet, e.g. `'My Sheet'!$A$1:$B$3`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetRange {
    pub sheet: String,
    pub range: CellRange,
}

impl SheetRange {
    pub fn new(sheet: impl Into<String>, range: CellRange) -> Self {
        Self {
            sheet: sheet.into(),
            range,
        }
    }

    /// Parse a sheet-qualified reference. Quoted sheet names use `''` for a
    /// literal quote.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (sheet, coords) = split_sheet(s)?;
        if coords.contains('!') {
            return Err(Error::InvalidAddress(format!("unexpected '!' in '{s}'")));
        }
        Ok(Self {
            sheet,
            range: CellRange::parse(coords)?,
        })
    }

    /// Sheet name, quoted when it would not parse bare
    pub fn quoted_sheet(&self) -> String {
        let bare = !self.sheet.is_empty()
            && self
                .sheet
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
            && !self.sheet.starts_with(|c: char| c.is_ascii_digit());
        if bare {
            self.sheet.clone()
        } else {
            format!("'{}'", self.sheet.replace('\'', "''"))
        }
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.quoted_sheet(), self.range)
    }
}

fn split_sheet(s: &str) -> Result<(String, &str)> {
    if let Some(rest) = s.strip_prefix('\'') {
        let mut sheet = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            if c != '\'' {
                sheet.push(c);
                continue;
            }
            if rest[i + 1..].starts_with('\'') {
                sheet.push('\'');
                chars.next();
                continue;
            }
            return match rest[i + 1..].strip_prefix('!') {
                Some(coords) => Ok((sheet, coords)),
                None => Err(Error::InvalidAddress(format!("missing '!' after sheet in '{s}'"))),
            };
        }
        Err(Error::InvalidAddress(format!("unterminated sheet name in '{s}'")))
    } else {
        match s.rsplit_once('!') {
            Some((sheet, coords)) if !sheet.is_empty() => Ok((sheet.to_string(), coords)),
            _ => Err(Error::InvalidAddress(format!("missing sheet name in '{s}'"))),
        }
    }
}
