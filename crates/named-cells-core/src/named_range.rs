//! Defined names, table metadata and reference resolution

use std::fmt;

use crate::address::{CellRange, SheetRange};
use crate::error::{Error, Result, ShapeDims};

/// Scope of a defined name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScope {
    Workbook,
    /// Index of the owning sheet in workbook order
    Sheet(usize),
}

/// A raw entry of the workbook's name table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedName {
    pub name: String,
    pub scope: NameScope,
    /// Reference text without the leading `=`
    pub refers_to: String,
    pub hidden: bool,
}

impl DefinedName {
    pub fn new(name: impl Into<String>, refers_to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: NameScope::Workbook,
            refers_to: refers_to.into(),
            hidden: false,
        }
    }

    pub fn with_scope(mut self, scope: NameScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn is_workbook_scoped(&self) -> bool {
        self.scope == NameScope::Workbook
    }
}

/// Metadata of a native spreadsheet table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub sheet: String,
    /// Full span including header and totals rows
    pub range: CellRange,
    pub header_rows: u32,
    pub totals_rows: u32,
    pub columns: Vec<String>,
}

impl TableDef {
    fn column_index(&self, label: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(label))
            .map(|i| i as u32)
    }
}

/// Shape of a named range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// 1x1
    Scalar,
    /// 1xN or Nx1
    Vector,
    /// Anything else, first row holds the headers
    Table,
}

impl Shape {
    pub fn of(range: &CellRange) -> Self {
        match (range.row_count(), range.col_count()) {
            (1, 1) => Shape::Scalar,
            (1, _) | (_, 1) => Shape::Vector,
            _ => Shape::Table,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Scalar => "scalar",
            Shape::Vector => "vector",
            Shape::Table => "table",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved workbook-scoped name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRange {
    /// Name as stored in the workbook
    pub name: String,
    pub address: SheetRange,
    pub shape: Shape,
}

impl NamedRange {
    pub fn new(name: impl Into<String>, address: SheetRange) -> Self {
        let shape = Shape::of(&address.range);
        Self {
            name: name.into(),
            address,
            shape,
        }
    }

    pub fn sheet(&self) -> &str {
        &self.address.sheet
    }

    pub fn range(&self) -> &CellRange {
        &self.address.range
    }

    /// Dimensions as reported in shape errors
    pub fn dims(&self) -> ShapeDims {
        let range = self.range();
        match self.shape {
            Shape::Scalar => ShapeDims::Scalar,
            Shape::Vector => ShapeDims::Vector(range.cell_count() as usize),
            Shape::Table => ShapeDims::Table {
                rows: range.row_count() as usize,
                cols: range.col_count() as usize,
            },
        }
    }
}

/// Find the workbook-scoped entry for `name`, ignoring case
///
/// A name that exists only with sheet scope is an [`Error::AmbiguousScope`];
/// `sheets` supplies the sheet name for the message.
pub fn find_name<'a>(
    names: &'a [DefinedName],
    sheets: &[String],
    name: &str,
) -> Result<&'a DefinedName> {
    let mut sheet_scoped = None;
    for entry in names.iter().filter(|n| n.name.eq_ignore_ascii_case(name)) {
        match entry.scope {
            NameScope::Workbook => return Ok(entry),
            NameScope::Sheet(idx) => {
                sheet_scoped.get_or_insert(idx);
            }
        }
    }
    match sheet_scoped {
        Some(idx) => Err(Error::AmbiguousScope {
            name: name.to_string(),
            sheet: sheets
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("#{idx}")),
        }),
        None => Err(Error::NameNotFound(name.to_string())),
    }
}

/// Evaluate the `refers_to` text of `name` to a single rectangular span
pub fn resolve_reference(name: &str, refers_to: &str, tables: &[TableDef]) -> Result<SheetRange> {
    let text = refers_to.trim();
    let text = text.strip_prefix('=').unwrap_or(text).trim();
    let unsupported = |reason: &str| Error::UnsupportedReference {
        name: name.to_string(),
        refers_to: refers_to.to_string(),
        reason: reason.to_string(),
    };

    if text.is_empty() {
        return Err(unsupported("empty reference"));
    }
    if text.contains("#REF!") {
        return Err(unsupported("broken reference"));
    }
    if text.starts_with('[') {
        return Err(unsupported("external workbook reference"));
    }
    if text.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '"' | '{' | '-' | '+' | '.'))
        || text.eq_ignore_ascii_case("TRUE")
        || text.eq_ignore_ascii_case("FALSE")
    {
        return Err(unsupported("constant value"));
    }
    if has_top_level(text, ',') {
        return Err(unsupported("multi-area reference"));
    }
    if has_top_level(text, '(') || has_top_level(text, ' ') {
        return Err(unsupported("formula"));
    }

    if let Some(bang) = top_level_bang(text) {
        let coords = &text[bang + 1..];
        if is_whole_line(coords) {
            return Err(unsupported("whole rows or columns are not supported"));
        }
        return SheetRange::parse(text).map_err(|e| match e {
            Error::InvalidAddress(msg) => unsupported(&msg),
            other => other,
        });
    }

    structured_reference(text, tables).map_err(|reason| unsupported(&reason))
}

/// Whether `c` occurs outside quotes and brackets
fn has_top_level(text: &str, c: char) -> bool {
    scan_top_level(text).any(|(_, ch)| ch == c)
}

fn top_level_bang(text: &str) -> Option<usize> {
    scan_top_level(text)
        .filter(|(_, ch)| *ch == '!')
        .map(|(i, _)| i)
        .last()
}

/// Characters that are neither quoted nor inside `[...]`
fn scan_top_level(text: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut quoted = false;
    let mut depth = 0u32;
    text.char_indices().filter(move |&(_, c)| {
        match c {
            '\'' if depth == 0 => {
                quoted = !quoted;
                return false;
            }
            '[' if !quoted => depth += 1,
            ']' if !quoted => {
                depth = depth.saturating_sub(1);
                return false;
            }
            _ => {}
        }
        !quoted && depth == 0
    })
}

/// `A:C`, `$A:$A`, `1:3`
fn is_whole_line(coords: &str) -> bool {
    let Some((a, b)) = coords.split_once(':') else {
        return false;
    };
    let strip = |s: &str| s.replace('$', "");
    let (a, b) = (strip(a), strip(b));
    let all = |s: &str, f: fn(&char) -> bool| !s.is_empty() && s.chars().all(|c| f(&c));
    (all(&a, char::is_ascii_alphabetic) && all(&b, char::is_ascii_alphabetic))
        || (all(&a, char::is_ascii_digit) && all(&b, char::is_ascii_digit))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    All,
    Data,
    Headers,
    Totals,
}

/// `Table`, `Table[Column]`, `Table[#Data]`, `Table[[#Headers],[a]:[b]]`
///
/// A single column without a section is the column's data body. Data
/// selections of several columns start at the last header row; totals rows
/// are excluded.
fn structured_reference(text: &str, tables: &[TableDef]) -> std::result::Result<SheetRange, String> {
    let (table_name, spec) = match text.find('[') {
        Some(i) => (&text[..i], Some(&text[i..])),
        None => (text, None),
    };
    let table = tables
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(table_name))
        .ok_or_else(|| format!("unknown table '{table_name}'"))?;

    let mut sections = Vec::new();
    let mut columns: Option<(u32, u32)> = None;

    if let Some(spec) = spec {
        let inner = spec
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| "malformed structured reference".to_string())?;
        let items: Vec<String> = if inner.trim_start().starts_with('[') {
            split_items(inner)?
        } else {
            vec![inner.to_string()]
        };

        for item in items {
            let item = item.trim();
            if let Some(section) = item.strip_prefix('#') {
                sections.push(match section.to_ascii_lowercase().as_str() {
                    "all" => Section::All,
                    "data" => Section::Data,
                    "headers" => Section::Headers,
                    "totals" => Section::Totals,
                    other => return Err(format!("unsupported table section '#{other}'")),
                });
                continue;
            }
            let (first, last) = match item.split_once("]:[") {
                Some((a, b)) => (a.to_string(), b.to_string()),
                None => (item.to_string(), item.to_string()),
            };
            let lookup = |label: &str| {
                let label = unescape_column(label);
                table
                    .column_index(&label)
                    .ok_or_else(|| format!("unknown column '{label}' in table '{}'", table.name))
            };
            let (a, b) = (lookup(&first)?, lookup(&last)?);
            if columns.is_some() {
                return Err("more than one column selection".to_string());
            }
            columns = Some((a.min(b), a.max(b)));
        }
    }

    if sections.is_empty() {
        sections.push(Section::Data);
    }
    let data_only = sections.iter().all(|s| *s == Section::Data);

    let full = table.range;
    let header_end = full.start.row + table.header_rows;
    let totals_start = (full.end.row + 1).saturating_sub(table.totals_rows);
    let mut rows: Option<(u32, u32)> = None;
    for section in sections {
        let band = match section {
            Section::All => (full.start.row, full.end.row),
            Section::Headers if table.header_rows > 0 => (full.start.row, header_end - 1),
            Section::Headers => return Err(format!("table '{}' has no header row", table.name)),
            Section::Totals if table.totals_rows > 0 => (totals_start, full.end.row),
            Section::Totals => return Err(format!("table '{}' has no totals row", table.name)),
            Section::Data if header_end < totals_start => (header_end, totals_start - 1),
            Section::Data => return Err(format!("table '{}' has no data rows", table.name)),
        };
        rows = Some(match rows {
            Some((lo, hi)) => (lo.min(band.0), hi.max(band.1)),
            None => band,
        });
    }
    let (mut first_row, last_row) = rows.unwrap_or((full.start.row, full.end.row));
    let (first_col, last_col) = match columns {
        Some((a, b)) => (full.start.col + a, full.start.col + b),
        None => (full.start.col, full.end.col),
    };

    // A data selection spanning several columns reads as a table, whose
    // first row must hold the labels
    if data_only && last_col > first_col && table.header_rows > 0 {
        first_row = header_end - 1;
    }

    Ok(SheetRange::new(
        table.sheet.clone(),
        CellRange::from_indices(first_row, first_col, last_row, last_col),
    ))
}

/// Split `[a],[b]:[c]` into `a` and `b]:[c`
fn split_items(inner: &str) -> std::result::Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '[' => {
                if depth > 0 {
                    current.push(c);
                }
                depth += 1;
            }
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced brackets".to_string())?;
                if depth > 0 {
                    current.push(c);
                }
            }
            ',' if depth == 0 => items.push(std::mem::take(&mut current)),
            ':' if depth == 0 => current.push_str("]:["),
            c if depth == 0 && c.is_whitespace() => {}
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err("unbalanced brackets".to_string());
    }
    if !current.is_empty() {
        items.push(current);
    }
    Ok(items)
}

/// Column names escape `[`, `]`, `#` and `'` with a leading `'`
fn unescape_column(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut chars = label.chars();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn rates() -> TableDef {
        // Header on row 2, data on rows 3-5
        TableDef {
            name: "Rates".into(),
            sheet: "Inputs".into(),
            range: CellRange::parse("B2:C5").unwrap(),
            header_rows: 1,
            totals_rows: 0,
            columns: vec!["code".into(), "rate".into()],
        }
    }

    fn resolve(refers_to: &str) -> Result<String> {
        resolve_reference("x", refers_to, &[rates()]).map(|r| r.to_string())
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Shape::of(&CellRange::parse("A1").unwrap()), Shape::Scalar);
        assert_eq!(Shape::of(&CellRange::parse("A1:A5").unwrap()), Shape::Vector);
        assert_eq!(Shape::of(&CellRange::parse("A1:E1").unwrap()), Shape::Vector);
        assert_eq!(Shape::of(&CellRange::parse("A1:B2").unwrap()), Shape::Table);

        let named = NamedRange::new("t", SheetRange::parse("A B!A10:B15").unwrap());
        assert_eq!(named.dims(), ShapeDims::Table { rows: 6, cols: 2 });
        assert_eq!(named.range().cell_count(), 12);
    }

    #[test]
    fn test_cell_references() {
        assert_eq!(resolve("Inputs!$B$2").unwrap(), "Inputs!B2");
        assert_eq!(resolve("='My Sheet'!$A$1:$B$3").unwrap(), "'My Sheet'!A1:B3");
    }

    #[test]
    fn test_structured_references() {
        assert_eq!(resolve("Rates").unwrap(), "Inputs!B2:C5");
        assert_eq!(resolve("Rates[#Data]").unwrap(), "Inputs!B2:C5");
        assert_eq!(resolve("Rates[[#Data],[code]:[rate]]").unwrap(), "Inputs!B2:C5");
        assert_eq!(resolve("Rates[rate]").unwrap(), "Inputs!C3:C5");
        assert_eq!(resolve("Rates[#All]").unwrap(), "Inputs!B2:C5");
        assert_eq!(resolve("Rates[#Headers]").unwrap(), "Inputs!B2:C2");
        assert_eq!(resolve("Rates[[#Data],[code]]").unwrap(), "Inputs!B3:B5");
        assert_eq!(resolve("Rates[[#All],[code]:[rate]]").unwrap(), "Inputs!B2:C5");
        assert_eq!(resolve("rates[RATE]").unwrap(), "Inputs!C3:C5");
    }

    #[test]
    fn test_table_with_totals_excludes_totals() {
        let mut bands = rates();
        bands.totals_rows = 1;
        let tables = [bands];
        let resolve = |text: &str| resolve_reference("x", text, &tables).unwrap().to_string();
        assert_eq!(resolve("Rates"), "Inputs!B2:C4");
        assert_eq!(resolve("Rates[code]"), "Inputs!B3:B4");
        assert_eq!(resolve("Rates[#All]"), "Inputs!B2:C5");
    }

    #[test]
    fn test_table_without_header_row() {
        let mut bare = rates();
        bare.header_rows = 0;
        let tables = [bare];
        assert_eq!(
            resolve_reference("x", "Rates", &tables).unwrap().to_string(),
            "Inputs!B2:C5"
        );
    }

    #[test]
    fn test_unsupported_references() {
        for text in [
            "42",
            "\"text\"",
            "Inputs!$A$1,Inputs!$B$2",
            "SUM(Inputs!A1:A3)",
            "Inputs!$A:$A",
            "Inputs!1:3",
            "#REF!",
            "Missing[col]",
            "Rates[missing]",
            "Rates[#Totals]",
            "[1]Sheet1!A1",
        ] {
            let err = resolve(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedReference, "{text}");
        }
    }

    #[test]
    fn test_find_name_scopes() {
        let sheets = vec!["Inputs".to_string(), "Calc".to_string()];
        let names = vec![
            DefinedName::new("i.threshold", "Inputs!$B$1"),
            DefinedName::new("local", "Calc!$A$1").with_scope(NameScope::Sheet(1)),
            DefinedName::new("i.both", "Calc!$A$2").with_scope(NameScope::Sheet(1)),
            DefinedName::new("i.both", "Inputs!$A$2"),
        ];

        assert_eq!(find_name(&names, &sheets, "I.THRESHOLD").unwrap().refers_to, "Inputs!$B$1");
        assert_eq!(find_name(&names, &sheets, "i.both").unwrap().refers_to, "Inputs!$A$2");

        match find_name(&names, &sheets, "local") {
            Err(Error::AmbiguousScope { sheet, .. }) => assert_eq!(sheet, "Calc"),
            other => panic!("expected AmbiguousScope, got {other:?}"),
        }
        assert_eq!(
            find_name(&names, &sheets, "nope").unwrap_err().kind(),
            ErrorKind::NameNotFound
        );
    }
}
