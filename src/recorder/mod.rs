// src/recorder/mod.rs

use chrono::NaiveDateTime;

/// Aggregate result of one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub files_deleted: u64,
    pub bytes_freed: u64,
    pub directories_deleted: u64,
}

impl CleanupStats {
    pub fn is_empty(&self) -> bool {
        self.files_deleted == 0 && self.directories_deleted == 0
    }

    pub fn mb_freed(&self) -> f64 {
        self.bytes_freed as f64 / (1024.0 * 1024.0)
    }
}

pub trait RetentionPolicy: Send {
    fn run(&mut self, now: NaiveDateTime) -> anyhow::Result<CleanupStats>;
}

pub mod capture;
pub mod config;
pub mod path_codec;
pub mod retention_fs;
pub mod supervisor;

pub use capture::{
    CaptureOutcome, CaptureRunner, ExitInfo, FfmpegRecorder, ProcessRegistry, SegmentRecorder,
};
pub use config::RecorderConfig;
pub use path_codec::{EncodedPath, PathCodec, SegmentDescriptor};
pub use retention_fs::FsRetention;
pub use supervisor::{CameraSupervisor, SupervisorState};
