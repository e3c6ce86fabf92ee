// src/recorder/path_codec.rs
//
// Layout: <root>/<camera>/<Y>年/<M>月/<D>日/<H>时/<camera>_<YYYYMMDD>_<HHMMSS>.<ext>
//
// Retention relies on this exact shape; anything else decodes to `None`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::{ContainerFormat, DAY_MARKER, HOUR_MARKER, MONTH_MARKER, YEAR_MARKER};
use crate::core::timestamp::{format_compact, local_now};

/// Flat directory under the root used when the dated tree cannot be created.
pub const FALLBACK_DIR: &str = "unknown_path";

/// Logical identity of one recorded segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub camera_id: String,
    pub timestamp: NaiveDateTime,
    pub format: ContainerFormat,
}

/// Writable destination produced by [`PathCodec::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPath {
    pub path: PathBuf,
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct PathCodec {
    root: PathBuf,
}

impl PathCodec {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn camera_dir(&self, camera_id: &str) -> PathBuf {
        self.root.join(camera_id)
    }

    pub fn fallback_dir(&self) -> PathBuf {
        self.root.join(FALLBACK_DIR)
    }

    pub fn segment_dir(&self, camera_id: &str, ts: &NaiveDateTime) -> PathBuf {
        self.camera_dir(camera_id)
            .join(format!("{}{}", ts.year(), YEAR_MARKER))
            .join(format!("{}{}", ts.month(), MONTH_MARKER))
            .join(format!("{}{}", ts.day(), DAY_MARKER))
            .join(format!("{}{}", ts.hour(), HOUR_MARKER))
    }

    pub fn file_name(camera_id: &str, ts: &NaiveDateTime, format: ContainerFormat) -> String {
        format!("{}_{}.{}", camera_id, format_compact(ts), format.extension())
    }

    /// Destination for a segment starting now.
    pub fn encode_now(&self, camera_id: &str, format: ContainerFormat) -> EncodedPath {
        self.encode(camera_id, &local_now(), format)
    }

    /// Builds the dated destination and creates its directories.
    ///
    /// Never fails: if the dated directories cannot be created the file goes
    /// to `<root>/unknown_path/` instead and `used_fallback` is set.
    pub fn encode(
        &self,
        camera_id: &str,
        ts: &NaiveDateTime,
        format: ContainerFormat,
    ) -> EncodedPath {
        let name = Self::file_name(camera_id, ts, format);
        let dir = self.segment_dir(camera_id, ts);

        match fs::create_dir_all(&dir) {
            Ok(()) => EncodedPath {
                path: dir.join(name),
                used_fallback: false,
            },
            Err(e) => {
                log::error!("[path] cannot create {:?}: {}", dir, e);
                let fallback = self.fallback_dir();
                if let Err(e) = fs::create_dir_all(&fallback) {
                    log::error!("[path] cannot create fallback {:?}: {}", fallback, e);
                }
                EncodedPath {
                    path: fallback.join(name),
                    used_fallback: true,
                }
            }
        }
    }

    /// Inverse of [`encode`](Self::encode). Returns `None` for any path that
    /// does not have the dated layout.
    ///
    /// Date and hour come from the directories. Minute and second come from
    /// the file name and default to zero when it does not carry them.
    pub fn decode(path: &Path) -> Option<SegmentDescriptor> {
        // the root may be empty, so six components are enough
        if path.components().count() < 6 {
            return None;
        }

        let parts: Vec<&str> = path
            .components()
            .rev()
            .take(6)
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        // reversed: file, hour, day, month, year, camera
        let (file, hour, day, month, year, camera_id) =
            (parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]);

        let year = parse_unit(year, YEAR_MARKER, 4)?;
        let month = parse_unit(month, MONTH_MARKER, 2)?;
        let day = parse_unit(day, DAY_MARKER, 2)?;
        let hour = parse_unit(hour, HOUR_MARKER, 2)?;

        let (stem, ext) = file.rsplit_once('.')?;
        let format = ContainerFormat::from_extension(ext)?;

        let mut fields = stem.rsplitn(3, '_');
        let time = fields.next()?;
        let _date = fields.next()?;
        let _prefix = fields.next()?;

        let (minute, second) = parse_minute_second(time).unwrap_or((0, 0));

        let timestamp = NaiveDate::from_ymd_opt(year as i32, month, day)?
            .and_hms_opt(hour, minute, second)?;

        Some(SegmentDescriptor {
            camera_id: camera_id.to_string(),
            timestamp,
            format,
        })
    }
}

/// `"2024年"` -> 2024; digits only, at most `max_digits` of them.
fn parse_unit(part: &str, marker: char, max_digits: usize) -> Option<u32> {
    let digits = part.strip_suffix(marker)?;
    if digits.is_empty() || digits.len() > max_digits || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}

/// Minute and second from an `HHMMSS` file-name field.
fn parse_minute_second(time: &str) -> Option<(u32, u32)> {
    if time.len() != 6 || !time.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let minute: u32 = time[2..4].parse().ok()?;
    let second: u32 = time[4..6].parse().ok()?;
    (minute < 60 && second < 60).then_some((minute, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn encode_builds_dated_tree() {
        let dir = tempfile::tempdir().unwrap();
        let codec = PathCodec::new(dir.path());

        let out = codec.encode("cam1", &at(2024, 3, 5, 14, 30, 0), ContainerFormat::Mp4);

        assert!(!out.used_fallback);
        assert_eq!(
            out.path,
            dir.path()
                .join("cam1/2024年/3月/5日/14时/cam1_20240305_143000.mp4")
        );
        assert!(out.path.parent().unwrap().is_dir());
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let codec = PathCodec::new(dir.path());
        let times = [
            at(2024, 3, 5, 14, 30, 0),
            at(1999, 12, 31, 23, 59, 59),
            at(2025, 1, 1, 0, 0, 1),
        ];

        for id in ["cam1", "front_door", "a_b_c", "门口"] {
            for ts in times.iter() {
                for format in ContainerFormat::ALL {
                    let out = codec.encode(id, ts, format);
                    let decoded = PathCodec::decode(&out.path).unwrap();
                    assert_eq!(
                        decoded,
                        SegmentDescriptor {
                            camera_id: id.to_string(),
                            timestamp: *ts,
                            format,
                        }
                    );
                }
            }
        }
    }

    #[test]
    fn decode_relative_path() {
        let d = PathCodec::decode(Path::new(
            "Video/cam1/2024年/3月/5日/14时/cam1_20240305_143012.flv",
        ))
        .unwrap();
        assert_eq!(d.camera_id, "cam1");
        assert_eq!(d.timestamp, at(2024, 3, 5, 14, 30, 12));
        assert_eq!(d.format, ContainerFormat::Flv);
    }

    #[test]
    fn decode_defaults_minute_second() {
        let d = PathCodec::decode(Path::new("Video/cam1/2024年/3月/5日/14时/cam1_20240305_14.mp4"))
            .unwrap();
        assert_eq!(d.timestamp, at(2024, 3, 5, 14, 0, 0));
    }

    #[test]
    fn decode_rejects_wrong_shapes() {
        for p in [
            "Video/cam1/stray_notes.txt",
            "Video/cam1/2024年/3月/5日/cam1_20240305_143000.mp4",
            "2024年/3月/5日/14时/cam1_20240305_143000.mp4",
            "Video/cam1/2024/3月/5日/14时/cam1_20240305_143000.mp4",
            "Video/cam1/2024年/03x月/5日/14时/cam1_20240305_143000.mp4",
            "Video/cam1/2024年/3月/123日/14时/cam1_20240305_143000.mp4",
            "Video/cam1/2024年/13月/5日/14时/cam1_20240305_143000.mp4",
            "Video/cam1/2024年/2月/30日/14时/cam1_20240305_143000.mp4",
            "Video/cam1/2024年/3月/5日/24时/cam1_20240305_143000.mp4",
            "Video/cam1/2024年/3月/5日/14时/cam1_20240305_143000.mkv",
            "Video/cam1/2024年/3月/5日/14时/cam1_143000.mp4",
            "Video/cam1/2024年/3月/5日/14时/cam1_20240305_143000",
        ] {
            assert!(PathCodec::decode(Path::new(p)).is_none(), "{} decoded", p);
        }
    }

    #[test]
    fn decode_accepts_empty_root() {
        let codec = PathCodec::new("");
        let ts = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let rel = codec
            .segment_dir("cam1", &ts)
            .join(PathCodec::file_name("cam1", &ts, ContainerFormat::Mp4));
        assert_eq!(rel, Path::new("cam1/2024年/3月/5日/14时/cam1_20240305_143000.mp4"));

        let seg = PathCodec::decode(&rel).unwrap();
        assert_eq!(seg.camera_id, "cam1");
        assert_eq!(seg.timestamp, ts);
        assert_eq!(seg.format, ContainerFormat::Mp4);
    }

    #[cfg(unix)]
    #[test]
    fn encode_falls_back_when_tree_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let codec = PathCodec::new(dir.path());
        // a plain file where the camera directory should be
        fs::write(dir.path().join("cam1"), b"").unwrap();

        let ts = at(2024, 3, 5, 14, 30, 0);
        let out = codec.encode("cam1", &ts, ContainerFormat::Flv);

        assert!(out.used_fallback);
        assert_eq!(
            out.path,
            dir.path().join(FALLBACK_DIR).join("cam1_20240305_143000.flv")
        );
        assert!(dir.path().join(FALLBACK_DIR).is_dir());
        assert!(PathCodec::decode(&out.path).is_none());
    }
}
