//! Logging setup
//!
//! Two sinks:
//! - stderr, filtered by `RUST_LOG` or `deskmode=info` (`debug` with `-v`)
//! - `$XDG_DATA_HOME/deskmode/logs/deskmode.log` at debug level, size-rotated
//!   with one `.old` backup
//!
//! The file sink is best effort: if the log directory cannot be created the
//! process logs to stderr only.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::config::APP_DIR;

pub const LOG_FILE: &str = "deskmode.log";

/// Rotate once the log reaches 1 MB
pub const MAX_LOG_BYTES: u64 = 1_000_000;

/// `$XDG_DATA_HOME/deskmode/logs`
#[must_use]
pub fn log_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR).join("logs"))
}

/// Install the global subscriber
///
/// Keep the returned guard alive for the whole process; dropping it flushes
/// and stops the file writer.
pub fn init(verbose: bool) -> Option<WorkerGuard> {
    let default_filter = if verbose { "deskmode=debug" } else { "deskmode=info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console = fmt::layer()
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let (file_layer, guard) = match log_dir() {
        Some(dir) if fs::create_dir_all(&dir).is_ok() => {
            let appender = RotatingFileAppender::new(&dir, LOG_FILE, MAX_LOG_BYTES);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("deskmode=debug"));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    guard
}

/// A file appender that rotates logs based on size
///
/// Keeps exactly two files: the active log and `<name>.old`. The active file
/// is re-created if something deletes it, and created with mode 0600.
pub struct RotatingFileAppender {
    path: PathBuf,
    backup_path: PathBuf,
    max_size_bytes: u64,
    file: Mutex<Option<File>>,
}

impl RotatingFileAppender {
    pub fn new(dir: impl Into<PathBuf>, filename: &str, max_size_bytes: u64) -> Self {
        let dir = dir.into();
        Self {
            path: dir.join(filename),
            backup_path: dir.join(format!("{filename}.old")),
            max_size_bytes,
            file: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_secure(path: &Path, append: bool) -> io::Result<File> {
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true);

        if append {
            options.append(true);
        } else {
            options.truncate(true);
        }

        #[cfg(unix)]
        {
            options.mode(0o600);
        }

        options.open(path)
    }

    /// Open the file if not open, or re-open if deleted
    fn get_file<'a>(&self, slot: &'a mut Option<File>) -> io::Result<&'a mut File> {
        if !self.path.exists() {
            *slot = None;
        }

        match slot {
            Some(file) => Ok(file),
            None => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                Ok(slot.insert(Self::open_secure(&self.path, true)?))
            }
        }
    }

    /// current -> backup, then start a fresh current
    fn rotate(&self, slot: &mut Option<File>) -> io::Result<()> {
        *slot = None;
        if self.path.exists() {
            fs::rename(&self.path, &self.backup_path)?;
        }
        *slot = Some(Self::open_secure(&self.path, false)?);
        Ok(())
    }
}

impl Write for RotatingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        let current_size = match self.get_file(&mut slot) {
            Ok(f) => f.metadata()?.len(),
            Err(_) => 0,
        };

        if current_size >= self.max_size_bytes
            && let Err(e) = self.rotate(&mut slot)
        {
            eprintln!("Failed to rotate log file: {e}");
        }

        self.get_file(&mut slot)?.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        if let Some(file) = slot.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rotates_into_single_backup() {
        let temp = TempDir::new().unwrap();
        let mut appender = RotatingFileAppender::new(temp.path(), "test.log", 5);

        appender.write_all(b"first line\n").unwrap();
        appender.write_all(b"second\n").unwrap();
        appender.write_all(b"third\n").unwrap();
        appender.flush().unwrap();

        let current = fs::read_to_string(temp.path().join("test.log")).unwrap();
        let backup = fs::read_to_string(temp.path().join("test.log.old")).unwrap();
        assert_eq!(current, "third\n");
        assert_eq!(backup, "second\n");
    }

    #[test]
    fn recreates_deleted_file() {
        let temp = TempDir::new().unwrap();
        let mut appender = RotatingFileAppender::new(temp.path().join("logs"), "test.log", 1_000);

        appender.write_all(b"a\n").unwrap();
        fs::remove_file(appender.path()).unwrap();
        appender.write_all(b"b\n").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(appender.path()).unwrap(), "b\n");
    }

    #[cfg(unix)]
    #[test]
    fn log_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let mut appender = RotatingFileAppender::new(temp.path(), "test.log", 1_000);
        appender.write_all(b"x").unwrap();

        let mode = fs::metadata(appender.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
