use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::CameraConfig;
use crate::recorder::capture::{ExitInfo, SegmentRecorder};

/// Stand-in for ffmpeg: each call pops `(exit_code, bytes)` from the script,
/// writes `bytes` bytes to the destination (nothing when 0) and returns the code.
/// An exhausted script reports a launch failure.
#[derive(Clone, Default)]
pub struct ScriptedRecorder {
    script: Arc<Mutex<VecDeque<(i32, u64)>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedRecorder {
    pub fn new(script: impl IntoIterator<Item = (i32, u64)>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SegmentRecorder for ScriptedRecorder {
    fn record(&self, _camera: &CameraConfig, destination: &Path) -> ExitInfo {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(_) => None,
        };
        let Some((code, bytes)) = next else {
            return ExitInfo::LaunchFailed("script exhausted".to_string());
        };

        if bytes > 0 {
            if let Err(e) = fs::write(destination, vec![0u8; bytes as usize]) {
                return ExitInfo::LaunchFailed(e.to_string());
            }
        }
        ExitInfo::Exited(code)
    }
}
