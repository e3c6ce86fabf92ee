// src/core/logging.rs
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::timestamp::{format_compact, local_now};

// Globale Sequenznummer für Korrelation
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub const LOG_FILE_PREFIX: &str = "log_";
pub const LOG_FILE_SUFFIX: &str = ".txt";

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub sequence: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn format(&self, message: &str) -> String {
        format!(
            "[seq={:06}][{}:{}] {}",
            self.sequence, self.component, self.instance_id, message
        )
    }
}

/// Einheitliches Logging mit Komponenten-Präfix
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }
}

/// Writes every log line to the console and, if open, to the per-run log file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Name of the log file for a run started at the current local time.
pub fn run_log_file_name() -> String {
    format!(
        "{}{}{}",
        LOG_FILE_PREFIX,
        format_compact(&local_now()),
        LOG_FILE_SUFFIX
    )
}

fn open_run_log(log_dir: &Path) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(run_log_file_name());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Installs the global logger: `info` by default (`RUST_LOG` overrides),
/// mirrored to stderr and `<log_dir>/log_<YYYYMMDD>_<HHMMSS>.txt`.
///
/// Returns the path of the log file, or `None` when only the console is used.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    let (file, path, open_err) = match open_run_log(log_dir) {
        Ok((file, path)) => (Some(file), Some(path), None),
        Err(e) => (None, None, Some(e)),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .try_init()?;

    if let Some(e) = open_err {
        log::warn!(
            "[logging] cannot open log file in {:?}, console only: {}",
            log_dir,
            e
        );
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_context_creation() {
        let first = LogContext::new("Supervisor", "cam1");
        let second = LogContext::new("Supervisor", "cam1");

        assert_eq!(first.component, "Supervisor");
        assert_eq!(first.instance_id, "cam1");
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn log_formatting() {
        let ctx = LogContext::new("Capture", "front_door");
        let formatted = ctx.format("segment saved");

        assert_eq!(
            formatted,
            format!("[seq={:06}][Capture:front_door] segment saved", ctx.sequence)
        );
    }

    #[test]
    fn run_log_file_name_shape() {
        let name = run_log_file_name();
        assert!(name.starts_with(LOG_FILE_PREFIX));
        assert!(name.ends_with(LOG_FILE_SUFFIX));
        // log_ + YYYYMMDD_HHMMSS + .txt
        assert_eq!(name.len(), 4 + 15 + 4);
    }

    #[test]
    fn tee_writer_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let (file, path) = open_run_log(dir.path()).unwrap();
        let mut tee = TeeWriter { file: Some(file) };

        tee.write_all(b"hello\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "hello\n");
    }
}
