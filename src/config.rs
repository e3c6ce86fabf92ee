// src/config.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::ConfigError;

pub const DEFAULT_SEGMENT_SECS: u32 = 60;
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

/// Directory markers used by the video tree; camera ids must not contain them.
pub const YEAR_MARKER: char = '年';
pub const MONTH_MARKER: char = '月';
pub const DAY_MARKER: char = '日';
pub const HOUR_MARKER: char = '时';

// ---------- Container ----------
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    #[default]
    Flv,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 2] = [ContainerFormat::Mp4, ContainerFormat::Flv];

    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Flv => "flv",
        }
    }

    /// Case-insensitive lookup, `None` for anything that is not a known container.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext.trim()))
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------- Camera ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    pub id: String,
    pub source_url: String,
    /// 0 = never expire
    pub retention_days: u32,
    pub segment_duration_secs: u32,
    pub format: ContainerFormat,
    /// 0 = no floor
    pub min_file_size_kb: u64,
}

impl CameraConfig {
    pub fn min_file_size_bytes(&self) -> u64 {
        self.min_file_size_kb.saturating_mul(1024)
    }
}

/// Camera ids become a path segment and a file-name prefix.
pub fn is_valid_camera_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.contains([YEAR_MARKER, MONTH_MARKER, DAY_MARKER, HOUR_MARKER])
}

/// Parses one `id,url,retention_days,segment_secs[,format[,min_kb]]` line.
///
/// Bad numeric or format fields are defaulted with a warning; only a short
/// line or an unusable id rejects the camera.
pub fn parse_camera_line(line_no: usize, line: &str) -> Result<CameraConfig, ConfigError> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        return Err(ConfigError::TooFewFields {
            line: line_no,
            found: parts.len(),
        });
    }

    let id = parts[0].to_string();
    if !is_valid_camera_id(&id) {
        return Err(ConfigError::InvalidCameraId { line: line_no, id });
    }

    let retention_days = match parts[2].parse::<i64>() {
        Ok(days) => days.clamp(0, i64::from(u32::MAX)) as u32,
        Err(_) => {
            log::warn!("[config] camera {}: invalid retention days '{}', using 0", id, parts[2]);
            0
        }
    };

    let segment_duration_secs = match parts[3].parse::<i64>() {
        Ok(secs) if secs > 0 => secs.min(i64::from(u32::MAX)) as u32,
        Ok(_) => DEFAULT_SEGMENT_SECS,
        Err(_) => {
            log::warn!(
                "[config] camera {}: invalid segment duration '{}', using {}s",
                id,
                parts[3],
                DEFAULT_SEGMENT_SECS
            );
            DEFAULT_SEGMENT_SECS
        }
    };

    let format = match parts.get(4) {
        None => ContainerFormat::default(),
        Some(raw) => ContainerFormat::from_extension(raw).unwrap_or_else(|| {
            log::warn!("[config] camera {}: unknown format '{}', using flv", id, raw);
            ContainerFormat::default()
        }),
    };

    let min_file_size_kb = match parts.get(5) {
        None => 0,
        Some(raw) => match raw.parse::<i64>() {
            Ok(kb) => kb.max(0) as u64,
            Err(_) => {
                log::warn!("[config] camera {}: invalid minimum size '{}', using 0", id, raw);
                0
            }
        },
    };

    Ok(CameraConfig {
        id,
        source_url: parts[1].to_string(),
        retention_days,
        segment_duration_secs,
        format,
        min_file_size_kb,
    })
}

/// Parses a whole camera config; rejected lines are logged and skipped.
pub fn parse_camera_config(text: &str) -> Vec<CameraConfig> {
    let mut cameras: Vec<CameraConfig> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_no = idx + 1;

        let camera = match parse_camera_line(line_no, line) {
            Ok(camera) => camera,
            Err(e) => {
                log::warn!("[config] skipping '{}': {}", line, e);
                continue;
            }
        };

        if !seen.insert(camera.id.clone()) {
            let e = ConfigError::DuplicateCameraId {
                line: line_no,
                id: camera.id,
            };
            log::warn!("[config] skipping '{}': {}", line, e);
            continue;
        }

        log::info!(
            "[config] camera {} - {} (keep {} days, {}s segments, {}, min {} KB)",
            camera.id,
            camera.source_url,
            camera.retention_days,
            camera.segment_duration_secs,
            camera.format,
            camera.min_file_size_kb
        );
        cameras.push(camera);
    }

    cameras
}

/// Reads the camera file; an unreadable file is logged and yields no cameras.
pub fn load_cameras(path: &Path) -> Vec<CameraConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_camera_config(&text),
        Err(e) => {
            log::error!("[config] cannot read camera config {:?}: {}", path, e);
            Vec::new()
        }
    }
}

// ---------- Log retention ----------
pub fn parse_log_retention(text: &str) -> Result<u32, ConfigError> {
    let Some(line) = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
    else {
        return Ok(DEFAULT_LOG_RETENTION_DAYS);
    };

    let days = line
        .parse::<i64>()
        .map_err(|e| ConfigError::with_context(format!("invalid log retention '{}'", line), e))?;
    Ok(days.clamp(1, i64::from(u32::MAX)) as u32)
}

/// Log retention in days, at least 1; 7 when the file is missing or invalid.
pub fn load_log_retention_days(path: &Path) -> u32 {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return DEFAULT_LOG_RETENTION_DAYS,
    };
    parse_log_retention(&text).unwrap_or_else(|e| {
        log::warn!(
            "[config] {}, keeping logs for {} days",
            e,
            DEFAULT_LOG_RETENTION_DAYS
        );
        DEFAULT_LOG_RETENTION_DAYS
    })
}

// ---------- Root ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub video_root: PathBuf,
    pub camera_config: PathBuf,
    pub log_dir: PathBuf,
    pub log_config: PathBuf,
    pub ffmpeg_bin: String,
    pub rtsp_transport: Option<String>,
    pub failure_backoff_secs: u64,
    pub retention_interval_secs: u64,
    pub log_cleanup_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video_root: PathBuf::from("Video"),
            camera_config: PathBuf::from("conf/conf.txt"),
            log_dir: PathBuf::from("log"),
            log_config: PathBuf::from("conf/logconf.txt"),
            ffmpeg_bin: "ffmpeg".to_string(),
            rtsp_transport: None,
            failure_backoff_secs: 5,
            retention_interval_secs: 3600,
            log_cleanup_interval_secs: 43_200,
        }
    }
}

impl AppConfig {
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }

    pub fn log_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.log_cleanup_interval_secs)
    }
}

// ---------- Loader ----------
/// Loads the application config; a missing file means defaults.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let txt = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::with_context(format!("reading {:?}", path), e))?;
    toml::from_str(&txt).map_err(|e| ConfigError::with_context(format!("parsing {:?}", path), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_line_is_parsed() {
        let cam = parse_camera_line(1, "cam1,rtsp://x,2,60,mp4,500").unwrap();
        assert_eq!(cam.min_file_size_bytes(), 500 * 1024);
        assert_eq!(
            cam,
            CameraConfig {
                id: "cam1".into(),
                source_url: "rtsp://x".into(),
                retention_days: 2,
                segment_duration_secs: 60,
                format: ContainerFormat::Mp4,
                min_file_size_kb: 500,
            }
        );
    }

    #[test]
    fn short_line_is_rejected() {
        let err = parse_camera_line(4, "cam2,rtsp://y").unwrap_err();
        assert!(matches!(err, ConfigError::TooFewFields { line: 4, found: 2 }));
    }

    #[test]
    fn optional_fields_default() {
        let cam = parse_camera_line(1, " cam3 , rtsp://z , 7 , 120 ").unwrap();
        assert_eq!(cam.id, "cam3");
        assert_eq!(cam.source_url, "rtsp://z");
        assert_eq!(cam.format, ContainerFormat::Flv);
        assert_eq!(cam.min_file_size_kb, 0);
    }

    #[test]
    fn bad_fields_fall_back() {
        let cam = parse_camera_line(1, "cam4,rtsp://z,abc,-5,mkv,lots").unwrap();
        assert_eq!(cam.retention_days, 0);
        assert_eq!(cam.segment_duration_secs, DEFAULT_SEGMENT_SECS);
        assert_eq!(cam.format, ContainerFormat::Flv);
        assert_eq!(cam.min_file_size_kb, 0);

        let cam = parse_camera_line(1, "cam5,rtsp://z,-3,xyz,MP4,-1").unwrap();
        assert_eq!(cam.retention_days, 0);
        assert_eq!(cam.segment_duration_secs, DEFAULT_SEGMENT_SECS);
        assert_eq!(cam.format, ContainerFormat::Mp4);
        assert_eq!(cam.min_file_size_kb, 0);
    }

    #[test]
    fn path_like_ids_are_rejected() {
        for id in ["a/b", "a\\b", "", "..", "cam年", "5时"] {
            let line = format!("{},rtsp://x,1,60", id);
            assert!(
                matches!(parse_camera_line(1, &line), Err(ConfigError::InvalidCameraId { .. })),
                "id {:?} accepted",
                id
            );
        }
    }

    #[test]
    fn config_skips_comments_short_lines_and_duplicates() {
        let text = "# id,url,days,secs\n\ncam1,rtsp://a,1,60\ncam2,rtsp://b\ncam1,rtsp://c,1,60\ncam3,rtsp://d,0,30,mp4\n";
        let cams = parse_camera_config(text);
        let ids: Vec<_> = cams.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["cam1", "cam3"]);
        assert_eq!(cams[0].source_url, "rtsp://a");
    }

    #[test]
    fn log_retention_parsing() {
        assert_eq!(parse_log_retention("# days\n\n14\n").unwrap(), 14);
        assert_eq!(parse_log_retention("0").unwrap(), 1);
        assert_eq!(parse_log_retention("-4").unwrap(), 1);
        assert_eq!(parse_log_retention("# only comments").unwrap(), DEFAULT_LOG_RETENTION_DAYS);
        assert!(parse_log_retention("seven").is_err());
    }

    #[test]
    fn log_retention_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("logconf.txt");
        assert_eq!(load_log_retention_days(&missing), DEFAULT_LOG_RETENTION_DAYS);

        std::fs::write(&missing, "not a number").unwrap();
        assert_eq!(load_log_retention_days(&missing), DEFAULT_LOG_RETENTION_DAYS);

        std::fs::write(&missing, "30").unwrap();
        assert_eq!(load_log_retention_days(&missing), 30);
    }

    #[test]
    fn app_config_partial_toml() {
        let cfg: AppConfig = toml::from_str("video_root = \"/srv/video\"\nrtsp_transport = \"tcp\"").unwrap();
        assert_eq!(cfg.video_root, PathBuf::from("/srv/video"));
        assert_eq!(cfg.rtsp_transport.as_deref(), Some("tcp"));
        assert_eq!(cfg.failure_backoff(), Duration::from_secs(5));
        assert_eq!(cfg.retention_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn missing_app_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(&dir.path().join("nvr.toml")).unwrap();
        assert_eq!(cfg.ffmpeg_bin, "ffmpeg");
        assert_eq!(cfg.log_cleanup_interval_secs, 43_200);
    }
}
