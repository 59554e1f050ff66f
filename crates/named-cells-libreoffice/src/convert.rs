//! One headless `soffice --convert-to` run

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::LibreOfficeConfig;
use crate::error::{LibreOfficeError, Result};
use crate::profile::Profile;

/// Build the command converting `input` into `outdir`
pub(crate) fn command(
    config: &LibreOfficeConfig,
    profile: &Profile,
    input: &Path,
    outdir: &Path,
) -> Command {
    let mut cmd = Command::new(config.soffice());
    cmd.arg(format!("-env:UserInstallation={}", profile.url()))
        .arg("--headless")
        .arg("--invisible")
        .arg("--nocrashreport")
        .arg("--nodefault")
        .arg("--nologo")
        .arg("--nofirststartwizard")
        .arg("--norestore")
        .arg("--convert-to")
        .arg(format!("xlsx:{}", config.filter))
        .arg("--outdir")
        .arg(outdir);

    for arg in &config.extra_args {
        cmd.arg(arg);
    }
    cmd.arg(input);

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Convert `input` into `outdir`, returning the written file
///
/// Blocks until `soffice` exits.
pub(crate) fn convert(
    config: &LibreOfficeConfig,
    profile: &Profile,
    input: &Path,
    outdir: &Path,
) -> Result<PathBuf> {
    let mut cmd = command(config, profile, input, outdir);
    tracing::info!("Running LibreOffice: {:?}", cmd);

    let output = cmd.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LibreOfficeError::NotFound(config.soffice())
        } else {
            LibreOfficeError::Spawn {
                program: config.soffice(),
                source: e,
            }
        }
    })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(LibreOfficeError::ConversionFailed {
            input: input.to_path_buf(),
            status: output.status.to_string(),
            stderr,
        });
    }

    // soffice exits with success even when it could not load the input
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let converted = outdir.join(format!("{stem}.xlsx"));
    if !converted.is_file() {
        return Err(LibreOfficeError::ConversionFailed {
            input: input.to_path_buf(),
            status: "no output written".to_string(),
            stderr,
        });
    }

    tracing::debug!("converted {} to {}", input.display(), converted.display());
    Ok(converted)
}
