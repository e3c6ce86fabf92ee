// src/recorder/supervisor.rs

use std::time::Instant;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};

use super::{CaptureOutcome, CaptureRunner, FsRetention, RecorderConfig, RetentionPolicy, SegmentRecorder};
use crate::config::CameraConfig;
use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::timestamp::local_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Recording,
    Succeeded,
    Failed,
    MaybeSweeping,
    Stopped,
}

/// Record → outcome → maybe sweep → repeat, for one camera, until shutdown.
///
/// Shutdown is signalled by dropping the sender side of `shutdown`.
pub struct CameraSupervisor<R> {
    camera: CameraConfig,
    runner: CaptureRunner<R>,
    retention: Option<Box<dyn RetentionPolicy>>,
    cfg: RecorderConfig,
    shutdown: Receiver<()>,
    state: SupervisorState,
    last_outcome: Option<CaptureOutcome>,
    last_sweep: Instant,
    segments_ok: u64,
    segments_failed: u64,
}

impl<R: SegmentRecorder> CameraSupervisor<R> {
    pub fn new(
        camera: CameraConfig,
        runner: CaptureRunner<R>,
        cfg: RecorderConfig,
        shutdown: Receiver<()>,
    ) -> Self {
        let retention: Option<Box<dyn RetentionPolicy>> = (camera.retention_days > 0).then(|| {
            Box::new(FsRetention::new(
                runner.codec().root(),
                &camera.id,
                camera.retention_days,
            )) as Box<dyn RetentionPolicy>
        });

        Self {
            camera,
            runner,
            retention,
            cfg,
            shutdown,
            state: SupervisorState::Idle,
            last_outcome: None,
            last_sweep: Instant::now(),
            segments_ok: 0,
            segments_failed: 0,
        }
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn last_outcome(&self) -> Option<&CaptureOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn segments(&self) -> (u64, u64) {
        (self.segments_ok, self.segments_failed)
    }

    fn shutdown_requested(&self) -> bool {
        matches!(self.shutdown.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
    }

    /// Performs one state transition and returns the new state.
    pub fn step(&mut self) -> SupervisorState {
        let next = match self.state {
            SupervisorState::Idle => {
                if self.shutdown_requested() {
                    SupervisorState::Stopped
                } else {
                    SupervisorState::Recording
                }
            }

            SupervisorState::Recording => {
                let outcome = self.runner.capture_segment(&self.camera);
                let next = if outcome.success {
                    self.segments_ok += 1;
                    self.info(&format!("segment saved: {:?}", outcome.destination));
                    SupervisorState::Succeeded
                } else {
                    self.segments_failed += 1;
                    self.error(&format!("recording failed ({})", outcome.exit));
                    SupervisorState::Failed
                };
                self.last_outcome = Some(outcome);
                next
            }

            // segment duration paces the loop
            SupervisorState::Succeeded => SupervisorState::MaybeSweeping,

            SupervisorState::Failed => match self.shutdown.recv_timeout(self.cfg.failure_backoff) {
                Err(RecvTimeoutError::Timeout) => SupervisorState::MaybeSweeping,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => SupervisorState::Stopped,
            },

            SupervisorState::MaybeSweeping => {
                if self.last_sweep.elapsed() >= self.cfg.retention_interval {
                    self.sweep();
                    self.last_sweep = Instant::now();
                }
                SupervisorState::Idle
            }

            SupervisorState::Stopped => SupervisorState::Stopped,
        };
        self.state = next;
        next
    }

    fn sweep(&mut self) {
        let Some(policy) = self.retention.as_mut() else {
            return;
        };
        match policy.run(local_now()) {
            Ok(stats) if !stats.is_empty() => self.info(&format!(
                "cleanup: {} expired files removed, {:.2} MB freed, {} empty directories removed",
                stats.files_deleted,
                stats.mb_freed(),
                stats.directories_deleted
            )),
            Ok(_) => self.debug("cleanup: nothing expired"),
            Err(e) => self.error(&format!("cleanup failed: {}", e)),
        }
    }

    /// Runs until shutdown is signalled.
    pub fn run(mut self) {
        self.info(&format!(
            "supervisor started ({}, {}s segments, keep {} days)",
            self.camera.source_url, self.camera.segment_duration_secs, self.camera.retention_days
        ));
        while self.step() != SupervisorState::Stopped {}
        self.info(&format!(
            "supervisor stopped after {} saved / {} failed segments",
            self.segments_ok, self.segments_failed
        ));
    }
}

impl<R> ComponentLogger for CameraSupervisor<R> {
    fn log_context(&self) -> LogContext {
        LogContext::new("camera", &self.camera.id)
    }
}
