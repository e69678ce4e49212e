//! Run-log setup: every formatted line is teed to stderr and to a
//! timestamped log file in the output directory.
//!
//! The file handle sits behind a mutex so interleaved writes stay
//! line-atomic; single-threaded extraction does not exercise this, but
//! the sink keeps the contract.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::Level;

struct TeeWriter {
    file: Arc<Mutex<File>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Ok(mut file) = self.file.lock() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Ok(mut file) = self.file.lock() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Create `conversion_log_<YYYYMMDD_HHMMSS>.txt` under `output_dir` and
/// install the global subscriber writing to it and to stderr.
///
/// Returns the log file path.
pub fn init(output_dir: &Path, level: Level) -> io::Result<PathBuf> {
    let name = format!(
        "conversion_log_{}.txt",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = output_dir.join(name);
    let file = Arc::new(Mutex::new(File::create(&path)?));

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .with_writer(move || TeeWriter {
            file: Arc::clone(&file),
        })
        .init();

    Ok(path)
}
