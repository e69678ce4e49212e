use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, error, info};

use xaba_extract::{ExtractStats, Manifest, process_store_file};

mod discover;
mod logfile;

#[derive(Parser)]
#[command(
    name = "xaba",
    about = "Extract .NET assemblies from Android AssemblyStore blobs",
    version,
    long_about = "Unpacks the managed assemblies bundled into native .blob files by the \
.NET for Android (Xamarin) toolchain. Stores are parsed canonically where possible; \
unrecognized files go through a heuristic recovery scanner."
)]
struct Cli {
    /// Directory scanned recursively for .blob stores and assemblies.manifest
    input_dir: Option<PathBuf>,

    /// Directory receiving extracted assemblies and the conversion log
    output_dir: Option<PathBuf>,

    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let input_dir = match cli.input_dir {
        Some(dir) => dir,
        None => prompt("Input directory: ")?,
    };
    let output_dir = match cli.output_dir {
        Some(dir) => dir,
        None => prompt("Output directory: ")?,
    };

    if !input_dir.is_dir() {
        return Err(format!("input directory {input_dir:?} does not exist").into());
    }
    std::fs::create_dir_all(&output_dir)?;

    let log_path = logfile::init(&output_dir, Level::from(cli.log_level))?;
    info!("Logging to {:?}", log_path);

    let inputs = discover::find_inputs(&input_dir)?;
    if inputs.stores.is_empty() {
        info!("No .blob stores under {:?}, nothing to do", input_dir);
        return Ok(());
    }

    let manifest = match &inputs.manifest {
        Some(path) => Manifest::load(path),
        None => {
            info!("No assemblies.manifest found; stores without names go through recovery");
            Manifest::default()
        }
    };

    let mut totals = ExtractStats::default();
    for store in &inputs.stores {
        match process_store_file(&store.path, store.kind, &manifest, &output_dir) {
            Ok(stats) => totals.merge(&stats),
            Err(e) => error!("Giving up on {:?}: {e}", store.path),
        }
    }

    info!(
        "Done: {} extracted, {} invalid, {} skipped, {} recovered ({} files total)",
        totals.extracted,
        totals.invalid,
        totals.skipped,
        totals.recovered,
        totals.emitted()
    );
    Ok(())
}

fn prompt(message: &str) -> std::io::Result<PathBuf> {
    print!("{message}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(PathBuf::from(line.trim()))
}
