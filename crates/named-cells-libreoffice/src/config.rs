//! Where `soffice` lives and how it is asked to convert.

use std::path::{Path, PathBuf};

/// Export filter used when nothing else is configured
pub const DEFAULT_FILTER: &str = "Calc MS Excel 2007 XML";

#[cfg(windows)]
const SOFFICE_NAMES: &[&str] = &["soffice.exe", "soffice.com"];
#[cfg(not(windows))]
const SOFFICE_NAMES: &[&str] = &["soffice", "libreoffice"];

/// Install locations checked after `PATH`
#[cfg(target_os = "macos")]
const WELL_KNOWN: &[&str] = &["/Applications/LibreOffice.app/Contents/MacOS/soffice"];
#[cfg(windows)]
const WELL_KNOWN: &[&str] = &[r"C:\Program Files\LibreOffice\program\soffice.exe"];
#[cfg(not(any(target_os = "macos", windows)))]
const WELL_KNOWN: &[&str] = &["/usr/lib/libreoffice/program/soffice", "/opt/libreoffice/program/soffice"];

/// Configuration for the LibreOffice backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibreOfficeConfig {
    /// Path to the `soffice` executable. If None, searches PATH.
    pub soffice_path: Option<PathBuf>,
    /// Extra arguments to pass to soffice.
    pub extra_args: Vec<String>,
    /// Export filter name for `--convert-to xlsx:<filter>`.
    pub filter: String,
}

impl Default for LibreOfficeConfig {
    fn default() -> Self {
        Self {
            soffice_path: None,
            extra_args: Vec::new(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LibreOfficeConfig {
    pub fn with_soffice<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            soffice_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// The executable to run: the configured path, then `PATH`, then the
    /// platform's usual install location
    pub fn soffice(&self) -> PathBuf {
        if let Some(path) = &self.soffice_path {
            return path.clone();
        }
        find_in_path()
            .or_else(|| {
                WELL_KNOWN
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.is_file())
            })
            .unwrap_or_else(|| PathBuf::from(SOFFICE_NAMES[0]))
    }

    /// Whether the executable exists
    pub fn is_available(&self) -> bool {
        is_executable(&self.soffice())
    }
}

fn find_in_path() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        SOFFICE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| is_executable(candidate))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = LibreOfficeConfig::default();
        assert_eq!(config.filter, "Calc MS Excel 2007 XML");
        assert!(config.soffice_path.is_none());
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_configured_path_wins() {
        let config = LibreOfficeConfig::with_soffice("/nowhere/soffice");
        assert_eq!(config.soffice(), PathBuf::from("/nowhere/soffice"));
        assert!(!config.is_available());
    }
}
