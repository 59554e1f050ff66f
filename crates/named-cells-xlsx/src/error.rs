//! XLSX error types

use thiserror::Error;

/// Result type for XLSX operations
pub type XlsxResult<T> = std::result::Result<T, XlsxError>;

/// Errors that can occur while reading or patching an XLSX package
#[derive(Debug, Error)]
pub enum XlsxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Invalid file format
    #[error("Invalid XLSX format: {0}")]
    InvalidFormat(String),

    /// Missing required part
    #[error("Missing required part: {0}")]
    MissingPart(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// The package cannot represent the requested edit
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// No sheet with this name
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),
}

impl From<std::string::FromUtf8Error> for XlsxError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        XlsxError::InvalidFormat(format!("part is not UTF-8: {err}"))
    }
}

impl From<tempfile::PersistError> for XlsxError {
    fn from(err: tempfile::PersistError) -> Self {
        XlsxError::Io(err.error)
    }
}

impl From<XlsxError> for named_cells_core::Error {
    fn from(err: XlsxError) -> Self {
        named_cells_core::Error::backend(err)
    }
}
