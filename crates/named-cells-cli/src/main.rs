//! named-cells CLI - export, load and refresh the named cells of workbooks

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use named_cells::compare::compare_sheets;
use named_cells::config::{self, ConfigError};
use named_cells::prelude::*;
use named_cells::specs::{specifications, write_csv};
use named_cells::{CellAddress, CellRange, ErrorKind};
use rayon::prelude::*;
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "named-cells")]
#[command(
    author,
    version,
    about = "Export, load and refresh the named cells of XLSX workbooks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// LibreOffice executable used by the libreoffice engine
    #[arg(long, global = true, env = "NAMED_CELLS_SOFFICE")]
    soffice: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Export named cells to TOML, grouped by sheet
    Save {
        /// Input workbook
        workbook: PathBuf,

        /// Output TOML file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only names starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Write the values of a TOML file into a copy of a workbook
    Load {
        /// TOML configuration
        config: PathBuf,

        /// Template workbook
        workbook: PathBuf,

        /// Workbook to write
        output: PathBuf,

        /// Backend used to write and save
        #[arg(short, long, default_value = "xlsx")]
        engine: Engine,
    },

    /// Recalculate workbooks by saving them through LibreOffice
    Refresh {
        /// A workbook, or a directory whose *.xlsx files are refreshed
        path: PathBuf,

        /// Save the files where they are instead of refreshing copies in a
        /// temporary directory and copying them back
        #[arg(long)]
        inplace: bool,

        /// Refresh several workbooks at once
        #[arg(long)]
        parallel: bool,
    },

    /// Compare the cached values of two sheets cell by cell
    Compare {
        /// Workbook holding the reference sheet
        left: PathBuf,

        /// Sheet of the left workbook
        sheet: String,

        /// Workbook to check
        right: PathBuf,

        /// Sheet of the right workbook (default: same name)
        #[arg(long)]
        right_sheet: Option<String>,

        /// First cell compared, skipping rows above and columns left of it
        #[arg(long, default_value = "A1")]
        start: String,
    },

    /// List named cells as CSV
    Names {
        /// Input workbook
        workbook: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only names starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // `log` records are forwarded through tracing-subscriber's tracing-log bridge
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Save {
            workbook,
            output,
            prefix,
        } => save(&workbook, output.as_deref(), prefix.as_deref()),
        Commands::Load {
            config,
            workbook,
            output,
            engine,
        } => load(
            &config,
            &workbook,
            &output,
            &OpenOptions::new(engine).soffice(cli.soffice),
        ),
        Commands::Refresh {
            path,
            inplace,
            parallel,
        } => refresh(
            &path,
            &RefreshOptions {
                open: OpenOptions::new(Engine::LibreOffice).soffice(cli.soffice),
                inplace,
                parallel,
            },
        ),
        Commands::Compare {
            left,
            sheet,
            right,
            right_sheet,
            start,
        } => compare(&left, &sheet, &right, right_sheet.as_deref(), &start),
        Commands::Names {
            workbook,
            output,
            prefix,
        } => names(&workbook, output.as_deref(), prefix.as_deref()),
    }
}

fn open(path: &Path, options: &OpenOptions) -> Result<Workbook> {
    Workbook::open_with(path, options)
        .with_context(|| format!("Failed to open '{}'", path.display()))
}

fn save(input: &Path, output: Option<&Path>, prefix: Option<&str>) -> Result<()> {
    let book = open(input, &OpenOptions::new(Engine::Xlsx))?;
    let text = config::to_toml_string(&book, prefix)
        .with_context(|| format!("Failed to export names of '{}'", input.display()))?;

    match output {
        Some(path) => {
            fs::write(path, &text)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            tracing::info!("wrote {}", path.display());
        }
        None => io::stdout()
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?,
    }
    Ok(())
}

fn load(config_path: &Path, input: &Path, output: &Path, options: &OpenOptions) -> Result<()> {
    let text = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read '{}'", config_path.display()))?;

    fs::copy(input, output).with_context(|| {
        format!(
            "Failed to copy '{}' to '{}'",
            input.display(),
            output.display()
        )
    })?;

    let mut book = open(output, options)?;
    let count = config::load(&mut book, &text)
        .with_context(|| format!("Failed to load '{}'", config_path.display()))?;
    book.save(None)
        .with_context(|| format!("Failed to save '{}'", output.display()))?;
    book.close()?;

    tracing::info!("wrote {count} names to {}", output.display());
    Ok(())
}

/// Workbooks named by `path`: the file itself, or the sorted `*.xlsx` files
/// of a directory
fn refresh_targets(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in
        fs::read_dir(path).with_context(|| format!("Failed to read '{}'", path.display()))?
    {
        let file = entry?.path();
        let is_xlsx = file
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx"));
        if is_xlsx && file.is_file() {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

struct RefreshOptions {
    open: OpenOptions,
    inplace: bool,
    parallel: bool,
}

fn refresh(path: &Path, options: &RefreshOptions) -> Result<()> {
    let targets = refresh_targets(path)?;
    if targets.is_empty() {
        tracing::warn!("no workbooks to refresh in '{}'", path.display());
        return Ok(());
    }
    if options.inplace {
        return refresh_all(&targets, options);
    }

    let staging = tempfile::Builder::new()
        .prefix("named-cells-refresh")
        .tempdir()
        .context("Failed to create a staging directory")?;
    let copies = stage(&targets, staging.path())?;
    refresh_all(&copies, options)?;

    for (copy, target) in copies.iter().zip(&targets) {
        fs::copy(copy, target)
            .with_context(|| format!("Failed to copy back '{}'", target.display()))?;
    }
    staging
        .close()
        .context("Failed to remove the staging directory")?;
    Ok(())
}

/// Copy `targets` into numbered directories under `dir`, keeping their file
/// names
fn stage(targets: &[PathBuf], dir: &Path) -> Result<Vec<PathBuf>> {
    targets
        .iter()
        .enumerate()
        .map(|(i, target)| {
            let name = target
                .file_name()
                .unwrap_or_else(|| OsStr::new("workbook.xlsx"));
            let slot = dir.join(i.to_string());
            fs::create_dir(&slot)?;
            let copy = slot.join(name);
            fs::copy(target, &copy)
                .with_context(|| format!("Failed to stage '{}'", target.display()))?;
            Ok(copy)
        })
        .collect()
}

fn refresh_all(files: &[PathBuf], options: &RefreshOptions) -> Result<()> {
    if options.parallel {
        files
            .par_iter()
            .try_for_each(|file| refresh_file(file, &options.open))
    } else {
        files
            .iter()
            .try_for_each(|file| refresh_file(file, &options.open))
    }
}

/// Save one workbook through the backend and check it was rewritten
fn refresh_file(file: &Path, options: &OpenOptions) -> Result<()> {
    let before = modified(file)?;

    let mut book = open(file, options)?;
    book.save(None)
        .with_context(|| format!("Failed to save '{}'", file.display()))?;
    book.close()?;

    if modified(file)? <= before {
        bail!("'{}' was not updated", file.display());
    }
    tracing::info!("refreshed {}", file.display());
    Ok(())
}

fn modified(path: &Path) -> Result<std::time::SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat '{}'", path.display()))
}

fn compare(
    left: &Path,
    sheet: &str,
    right: &Path,
    right_sheet: Option<&str>,
    start: &str,
) -> Result<()> {
    let start = CellAddress::parse(start)?;
    let options = OpenOptions::new(Engine::Xlsx);
    let left_book = open(left, &options)?;
    let right_book = open(right, &options)?;

    let result = compare_sheets(&left_book, sheet, &right_book, right_sheet, start)
        .with_context(|| format!("Failed to compare sheet '{sheet}'"))?;

    let mut out = io::stdout().lock();
    if !result.shapes_match() {
        writeln!(
            out,
            "shape mismatch: {} != {}",
            extent_text(result.left_extent),
            extent_text(result.right_extent)
        )?;
    }
    for diff in &result.diffs {
        writeln!(out, "{diff}")?;
    }

    if !result.is_match() {
        bail!("{} cells differ", result.diffs.len());
    }
    Ok(())
}

fn extent_text(extent: Option<CellRange>) -> String {
    extent.map_or_else(|| "empty".to_string(), |r| r.to_a1_string())
}

fn names(input: &Path, output: Option<&Path>, prefix: Option<&str>) -> Result<()> {
    let book = open(input, &OpenOptions::new(Engine::Xlsx))?;
    let specs = specifications(&book, prefix)
        .with_context(|| format!("Failed to list names of '{}'", input.display()))?;

    match output {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?;
            write_csv(&specs, file)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
        }
        None => write_csv(&specs, io::stdout().lock()).context("Failed to write to stdout")?,
    }
    Ok(())
}

/// Exit code for the first error in the chain that has one
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(config_err) = cause.downcast_ref::<ConfigError>() {
            return match config_err.named_error() {
                Some(named) => kind_code(named.kind()),
                None => 10,
            };
        }
        if let Some(named) = cause.downcast_ref::<Error>() {
            return kind_code(named.kind());
        }
        if cause.is::<io::Error>() {
            return kind_code(ErrorKind::BackendIo);
        }
    }
    1
}

fn kind_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::NameNotFound => 3,
        ErrorKind::AmbiguousScope => 4,
        ErrorKind::ShapeMismatch => 5,
        ErrorKind::HeaderConflict => 6,
        ErrorKind::NotTabular => 7,
        ErrorKind::UnsupportedReference => 8,
        ErrorKind::BackendIo => 9,
    }
}
