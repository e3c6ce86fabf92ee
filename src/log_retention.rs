// src/log_retention.rs
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::load_log_retention_days;
use crate::core::logging::{LOG_FILE_PREFIX, LOG_FILE_SUFFIX};
use crate::core::timestamp::{age_days, local_now, parse_compact};
use crate::recorder::{CleanupStats, RetentionPolicy};

/// Deletes run logs (`log_<YYYYMMDD>_<HHMMSS>.txt`) older than the configured days.
/// The retention file is re-read on every run.
pub struct LogRetention {
    log_dir: PathBuf,
    config_path: PathBuf,
}

impl LogRetention {
    pub fn new(log_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            config_path: config_path.into(),
        }
    }
}

impl RetentionPolicy for LogRetention {
    fn run(&mut self, now: NaiveDateTime) -> anyhow::Result<CleanupStats> {
        let days = load_log_retention_days(&self.config_path);
        Ok(clean_logs(&self.log_dir, days, &now))
    }
}

fn log_file_time(name: &str) -> Option<NaiveDateTime> {
    let stamp = name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    parse_compact(stamp)
}

pub fn clean_logs(log_dir: &Path, retention_days: u32, now: &NaiveDateTime) -> CleanupStats {
    let mut stats = CleanupStats::default();

    let entries = match fs::read_dir(log_dir) {
        Ok(e) => e,
        Err(_) => return stats,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(LOG_FILE_PREFIX) || !name.ends_with(LOG_FILE_SUFFIX) {
            continue;
        }
        let Some(logged_at) = log_file_time(name) else {
            log::debug!("[log-retention] skipping malformed log name {}", name);
            continue;
        };
        if age_days(now, &logged_at) <= f64::from(retention_days) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(&path) {
            Ok(()) => {
                stats.files_deleted += 1;
                stats.bytes_freed += size;
                log::info!(
                    "[log-retention] removed {:?} (older than {} days)",
                    path,
                    retention_days
                );
            }
            Err(err) => log::error!("[log-retention] failed {:?}: {}", path, err),
        }
    }

    if stats.files_deleted > 0 {
        log::info!(
            "[log-retention] removed {} expired log files",
            stats.files_deleted
        );
    }
    stats
}

/// Runs `policy` every `interval` on a detached background thread.
pub fn spawn_log_cleanup(
    mut policy: LogRetention,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("log-retention".into())
        .spawn(move || {
            loop {
                std::thread::sleep(interval);
                if let Err(e) = policy.run(local_now()) {
                    log::error!("[log-retention] error: {}", e);
                }
            }
        })?;
    log::info!(
        "[log-retention] cleanup thread started (every {}s)",
        interval.as_secs()
    );
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 20)
            .unwrap()
            .and_hms_opt(15, 30, 45)
            .unwrap()
    }

    #[test]
    fn parses_log_names() {
        assert_eq!(log_file_time("log_20250720_153045.txt"), Some(now()));
        assert!(log_file_time("log_2025.txt").is_none());
        assert!(log_file_time("app_20250720_153045.txt").is_none());
    }

    #[test]
    fn removes_only_expired_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("log_20250701_120000.txt");
        let recent = dir.path().join("log_20250718_120000.txt");
        let odd = dir.path().join("log_garbage.txt");
        let other = dir.path().join("notes_20200101_000000.txt");
        for p in [&old, &recent, &odd, &other] {
            fs::write(p, b"x").unwrap();
        }

        let stats = clean_logs(dir.path(), 7, &now());

        assert_eq!(stats.files_deleted, 1);
        assert!(!old.exists());
        assert!(recent.exists());
        assert!(odd.exists());
        assert!(other.exists());
    }

    #[test]
    fn policy_reads_config_each_run() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("log");
        fs::create_dir_all(&logs).unwrap();
        let conf = dir.path().join("logconf.txt");
        let file = logs.join("log_20250718_120000.txt");
        fs::write(&file, b"x").unwrap();

        let mut policy = LogRetention::new(&logs, &conf);
        // default 7 days keeps a 2-day-old log
        assert_eq!(policy.run(now()).unwrap().files_deleted, 0);

        fs::write(&conf, "# days\n1\n").unwrap();
        assert_eq!(policy.run(now()).unwrap().files_deleted, 1);
        assert!(!file.exists());
    }

    #[test]
    fn missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let stats = clean_logs(&dir.path().join("nope"), 7, &now());
        assert_eq!(stats, CleanupStats::default());
    }
}
