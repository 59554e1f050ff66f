//! Error types for the LibreOffice backend.

use std::path::PathBuf;

use named_cells_xlsx::XlsxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibreOfficeError {
    #[error("LibreOffice not found at '{0}'. Install LibreOffice and ensure 'soffice' is in PATH.")]
    NotFound(PathBuf),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion of '{input}' failed ({status}): {stderr}")]
    ConversionFailed {
        input: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("Profile XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xlsx(#[from] XlsxError),
}

pub type Result<T> = std::result::Result<T, LibreOfficeError>;

impl From<tempfile::PersistError> for LibreOfficeError {
    fn from(err: tempfile::PersistError) -> Self {
        LibreOfficeError::Io(err.error)
    }
}

impl From<LibreOfficeError> for named_cells_core::Error {
    fn from(err: LibreOfficeError) -> Self {
        named_cells_core::Error::backend(err)
    }
}
