// src/recorder/retention_fs.rs
use crate::config::ContainerFormat;
use crate::core::timestamp::{age_days, local_now};
use crate::recorder::path_codec::{PathCodec, FALLBACK_DIR};
use crate::recorder::{CleanupStats, RetentionPolicy};

use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Age-based cleanup of one camera's dated tree.
pub struct FsRetention {
    root: PathBuf,
    camera_id: String,
    retention_days: u32,
}

impl FsRetention {
    pub fn new(root: impl Into<PathBuf>, camera_id: &str, retention_days: u32) -> Self {
        Self {
            root: root.into(),
            camera_id: camera_id.to_string(),
            retention_days,
        }
    }
}

impl RetentionPolicy for FsRetention {
    fn run(&mut self, now: NaiveDateTime) -> anyhow::Result<CleanupStats> {
        Ok(sweep_at(&self.root, &self.camera_id, self.retention_days, &now))
    }
}

pub fn sweep(root: &Path, camera_id: &str, retention_days: u32) -> CleanupStats {
    sweep_at(root, camera_id, retention_days, &local_now())
}

/// Deletes this camera's segments older than `retention_days`, then prunes
/// directories left empty. Files that do not decode are never touched and
/// the camera directory itself is never removed.
pub fn sweep_at(
    root: &Path,
    camera_id: &str,
    retention_days: u32,
    now: &NaiveDateTime,
) -> CleanupStats {
    let mut stats = CleanupStats::default();
    if retention_days == 0 {
        return stats;
    }

    let stranded = fallback_backlog(root, camera_id);
    if stranded > 0 {
        log::warn!(
            "[retention] {}: {} segments in {:?} are not covered by retention",
            camera_id,
            stranded,
            root.join(FALLBACK_DIR)
        );
    }

    let camera_dir = root.join(camera_id);
    if !camera_dir.is_dir() {
        return stats;
    }

    for entry in WalkDir::new(&camera_dir) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                log::warn!("[retention] {}: walk error: {}", camera_id, err);
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_segment_extension(entry.path()) {
            continue;
        }

        let Some(segment) = PathCodec::decode(entry.path()) else {
            continue;
        };
        if segment.camera_id != camera_id {
            continue;
        }
        if age_days(now, &segment.timestamp) <= f64::from(retention_days) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                stats.files_deleted += 1;
                stats.bytes_freed += size;
                log::info!(
                    "[retention] removed {:?} ({:.2} MB)",
                    entry.path(),
                    size as f64 / (1024.0 * 1024.0)
                );
            }
            Err(err) => {
                log::error!("[retention] failed {:?}: {}", entry.path(), err);
            }
        }
    }

    stats.directories_deleted = prune_empty_dirs(&camera_dir, true);
    stats
}

/// Number of this camera's segments sitting in the flat fallback directory.
/// They carry no dated path, so age-based cleanup never removes them.
pub fn fallback_backlog(root: &Path, camera_id: &str) -> usize {
    let Ok(entries) = fs::read_dir(root.join(FALLBACK_DIR)) else {
        return 0;
    };
    let prefix = format!("{}_", camera_id);
    entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| {
            let path = e.path();
            has_segment_extension(&path)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
        })
        .count()
}

fn has_segment_extension(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| {
            ContainerFormat::ALL
                .iter()
                .any(|f| name.ends_with(&format!(".{}", f.extension())))
        })
}

/// Removes empty directories below `dir`, deepest first. `dir` itself is
/// kept when `keep_self` is set. Returns the number of directories removed.
pub fn prune_empty_dirs(dir: &Path, keep_self: bool) -> u64 {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(err) => {
            log::warn!("[retention] cannot list {:?}: {}", dir, err);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            removed += prune_empty_dirs(&entry.path(), false);
        }
    }

    if keep_self {
        return removed;
    }

    let is_empty = fs::read_dir(dir)
        .map(|mut e| e.next().is_none())
        .unwrap_or(false);
    if is_empty {
        match fs::remove_dir(dir) {
            Ok(()) => {
                removed += 1;
                log::info!("[retention] removed empty directory {:?}", dir);
            }
            Err(err) => log::error!("[retention] failed to remove {:?}: {}", dir, err),
        }
    }

    removed
}
