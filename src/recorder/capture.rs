// src/recorder/capture.rs
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{CameraConfig, ContainerFormat};
use crate::core::error::{NvrError, NvrResult};
use crate::recorder::path_codec::PathCodec;

const STDERR_TAIL_LINES: usize = 5;

/// How a capture process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    Exited(i32),
    /// Ended by a signal, no exit code.
    Signaled,
    /// Never ran: spawn failed or the registry is closed.
    LaunchFailed(String),
}

impl ExitInfo {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitInfo::Exited(code),
            None => ExitInfo::Signaled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitInfo::Exited(0))
    }
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitInfo::Exited(code) => write!(f, "exit code {}", code),
            ExitInfo::Signaled => f.write_str("terminated by signal"),
            ExitInfo::LaunchFailed(msg) => write!(f, "launch failed: {}", msg),
        }
    }
}

/// Result of one capture attempt.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub success: bool,
    pub destination: PathBuf,
    pub used_fallback: bool,
    /// The destination, if a file is still there after the size filter.
    pub produced_file: Option<PathBuf>,
    pub exit: ExitInfo,
    /// Size in bytes of a file deleted for being under the minimum.
    pub undersized: Option<u64>,
}

/// Runs the external capture for one segment and blocks until it ends.
pub trait SegmentRecorder: Send + Sync {
    fn record(&self, camera: &CameraConfig, destination: &Path) -> ExitInfo;
}

// ---------- Process registry ----------
#[derive(Default)]
struct RegistryState {
    closed: bool,
    running: HashMap<u32, String>,
}

/// Tracks every capture process currently running so shutdown can signal them.
#[derive(Default)]
pub struct ProcessRegistry {
    state: Mutex<RegistryState>,
}

/// Result of one termination attempt.
#[derive(Debug, Clone)]
pub struct TerminationReport {
    pub pid: u32,
    pub camera_id: String,
    pub result: Result<(), String>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::error!("[capture] process registry lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Spawns `cmd` and records its pid, unless the registry has been closed.
    pub fn spawn(&self, camera_id: &str, cmd: &mut Command) -> NvrResult<TrackedChild<'_>> {
        let mut state = self.lock();
        if state.closed {
            return Err(NvrError::RegistryClosed {
                camera_id: camera_id.to_string(),
            });
        }
        let child = cmd
            .spawn()
            .map_err(|e| NvrError::with_context(format!("spawning capture for {}", camera_id), e))?;
        let pid = child.id();
        state.running.insert(pid, camera_id.to_string());
        Ok(TrackedChild {
            child,
            pid,
            registry: self,
        })
    }

    /// Refuse all further spawns.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn running(&self) -> Vec<(u32, String)> {
        let mut running: Vec<_> = self
            .lock()
            .running
            .iter()
            .map(|(pid, cam)| (*pid, cam.clone()))
            .collect();
        running.sort();
        running
    }

    /// Sends SIGTERM to every tracked process without waiting for it to exit.
    pub fn terminate_all(&self) -> Vec<TerminationReport> {
        let state = self.lock();
        let mut reports = Vec::with_capacity(state.running.len());

        for (pid, camera_id) in state.running.iter() {
            let result = send_terminate(*pid);
            match &result {
                Ok(()) => log::info!("[capture] terminated ffmpeg pid {} ({})", pid, camera_id),
                Err(e) => log::error!(
                    "[capture] failed to terminate ffmpeg pid {} ({}): {}",
                    pid,
                    camera_id,
                    e
                ),
            }
            reports.push(TerminationReport {
                pid: *pid,
                camera_id: camera_id.clone(),
                result,
            });
        }

        reports
    }

    fn forget(&self, pid: u32) {
        self.lock().running.remove(&pid);
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> Result<(), String> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|e| e.to_string())?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> Result<(), String> {
    Err("signal-based termination is only supported on unix".to_string())
}

/// A running child that leaves the registry once reaped.
pub struct TrackedChild<'a> {
    child: Child,
    pid: u32,
    registry: &'a ProcessRegistry,
}

impl TrackedChild<'_> {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Drains stderr to EOF, waits for exit and returns the status with the
    /// last stderr lines. Bytes that are not UTF-8 are replaced, not fatal.
    pub fn wait_with_stderr_tail(mut self) -> std::io::Result<(ExitStatus, Vec<String>)> {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = self.child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(String::from_utf8_lossy(&buf).trim_end().to_string());
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::warn!("[capture] stderr of pid {} unreadable: {}", self.pid, e);
                        break;
                    }
                }
            }
        }
        let status = self.child.wait()?;
        Ok((status, tail.into_iter().collect()))
    }
}

impl Drop for TrackedChild<'_> {
    fn drop(&mut self) {
        self.registry.forget(self.pid);
    }
}

// ---------- ffmpeg ----------
/// Records segments with the ffmpeg executable, stream-copying audio and video.
pub struct FfmpegRecorder {
    binary: String,
    rtsp_transport: Option<String>,
    registry: Arc<ProcessRegistry>,
}

impl FfmpegRecorder {
    pub fn new(
        binary: impl Into<String>,
        rtsp_transport: Option<String>,
        registry: Arc<ProcessRegistry>,
    ) -> Self {
        Self {
            binary: binary.into(),
            rtsp_transport,
            registry,
        }
    }

    pub fn args(&self, camera: &CameraConfig, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "warning", "-y"]
            .into_iter()
            .map(OsString::from)
            .collect();

        if let Some(transport) = &self.rtsp_transport {
            args.push("-rtsp_transport".into());
            args.push(transport.into());
        }

        args.push("-i".into());
        args.push(camera.source_url.as_str().into());
        for map in ["0:v", "0:a"] {
            args.push("-map".into());
            args.push(map.into());
        }
        args.push("-c".into());
        args.push("copy".into());
        args.push("-t".into());
        args.push(camera.segment_duration_secs.to_string().into());

        if camera.format == ContainerFormat::Flv {
            args.push("-f".into());
            args.push("flv".into());
        }

        args.push(destination.as_os_str().to_os_string());
        args
    }
}

impl SegmentRecorder for FfmpegRecorder {
    fn record(&self, camera: &CameraConfig, destination: &Path) -> ExitInfo {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args(camera, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = match self.registry.spawn(&camera.id, &mut cmd) {
            Ok(child) => child,
            Err(e) => return ExitInfo::LaunchFailed(e.to_string()),
        };
        let pid = child.pid();
        log::debug!("[capture] {} ffmpeg pid {}", camera.id, pid);

        match child.wait_with_stderr_tail() {
            Ok((status, tail)) => {
                let exit = ExitInfo::from_status(status);
                if !exit.is_success() {
                    for line in tail {
                        log::warn!("[capture] {} ffmpeg: {}", camera.id, line);
                    }
                }
                exit
            }
            Err(e) => ExitInfo::LaunchFailed(format!("waiting for pid {}: {}", pid, e)),
        }
    }
}

/// Checks that `<binary> -version` runs and exits cleanly.
pub fn ffmpeg_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Deletes `path` when it is smaller than `min_bytes`. Returns the deleted size.
pub fn remove_if_undersized(path: &Path, min_bytes: u64) -> Option<u64> {
    if min_bytes == 0 {
        return None;
    }
    let size = fs::metadata(path).ok()?.len();
    if size >= min_bytes {
        return None;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            log::info!(
                "[capture] removed undersized file {:?} ({:.2} KB < {:.2} KB)",
                path,
                size as f64 / 1024.0,
                min_bytes as f64 / 1024.0
            );
            Some(size)
        }
        Err(e) => {
            log::error!("[capture] failed to remove undersized file {:?}: {}", path, e);
            None
        }
    }
}

// ---------- Runner ----------
/// One segment: pick the destination, record, classify, apply the size floor.
pub struct CaptureRunner<R> {
    codec: PathCodec,
    recorder: R,
}

impl<R: SegmentRecorder> CaptureRunner<R> {
    pub fn new(codec: PathCodec, recorder: R) -> Self {
        Self { codec, recorder }
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn capture_segment(&self, camera: &CameraConfig) -> CaptureOutcome {
        let encoded = self.codec.encode_now(&camera.id, camera.format);
        if encoded.used_fallback {
            log::warn!(
                "[capture] {} writing to fallback {:?}",
                camera.id,
                encoded.path
            );
        }
        log::info!(
            "[capture] {} recording {}s {} -> {:?}",
            camera.id,
            camera.segment_duration_secs,
            camera.format,
            encoded.path
        );

        let exit = self.recorder.record(camera, &encoded.path);
        let success = exit.is_success();

        // partial output can exist after a failure too
        let undersized = remove_if_undersized(&encoded.path, camera.min_file_size_bytes());
        let produced_file = encoded.path.is_file().then(|| encoded.path.clone());

        CaptureOutcome {
            success,
            destination: encoded.path,
            used_fallback: encoded.used_fallback,
            produced_file,
            exit,
            undersized,
        }
    }
}
