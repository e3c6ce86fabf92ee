// src/recorder/config.rs
use std::path::PathBuf;
use std::time::Duration;

use crate::config::AppConfig;

/// Timing and placement shared by every camera supervisor.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub video_root: PathBuf,
    pub failure_backoff: Duration,
    pub retention_interval: Duration,
}

impl From<&AppConfig> for RecorderConfig {
    fn from(app: &AppConfig) -> Self {
        Self {
            video_root: app.video_root.clone(),
            failure_backoff: app.failure_backoff(),
            retention_interval: app.retention_interval(),
        }
    }
}
