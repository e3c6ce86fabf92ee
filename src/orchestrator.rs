// src/orchestrator.rs
use std::sync::Arc;

use crossbeam::channel::{bounded, Sender};

use crate::config::CameraConfig;
use crate::core::error::{NvrError, NvrResult};
use crate::recorder::capture::TerminationReport;
use crate::recorder::{
    CameraSupervisor, CaptureRunner, PathCodec, ProcessRegistry, RecorderConfig, SegmentRecorder,
};

/// Starts one detached supervisor thread per camera and signals shutdown.
pub struct Orchestrator {
    registry: Arc<ProcessRegistry>,
    shutdown_tx: Option<Sender<()>>,
    started: Vec<String>,
}

impl Orchestrator {
    /// `make_recorder` builds the recorder used by each camera's supervisor.
    pub fn start<R, F>(
        cameras: Vec<CameraConfig>,
        cfg: &RecorderConfig,
        registry: Arc<ProcessRegistry>,
        mut make_recorder: F,
    ) -> NvrResult<Self>
    where
        R: SegmentRecorder + 'static,
        F: FnMut(&CameraConfig) -> R,
    {
        if cameras.is_empty() {
            return Err(NvrError::NoCameras);
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let mut started = Vec::with_capacity(cameras.len());

        for camera in cameras {
            let id = camera.id.clone();
            let runner = CaptureRunner::new(PathCodec::new(&cfg.video_root), make_recorder(&camera));
            let supervisor = CameraSupervisor::new(camera, runner, cfg.clone(), shutdown_rx.clone());

            // handles dropped: supervisors are never joined
            match std::thread::Builder::new()
                .name(format!("cam-{}", id))
                .spawn(move || supervisor.run())
            {
                Ok(_) => {
                    log::info!("[orchestrator] started recording thread for {}", id);
                    started.push(id);
                }
                Err(e) => log::error!("[orchestrator] cannot start thread for {}: {}", id, e),
            }
        }

        if started.is_empty() {
            return Err(NvrError::NoCameras);
        }

        Ok(Self {
            registry,
            shutdown_tx: Some(shutdown_tx),
            started,
        })
    }

    pub fn cameras(&self) -> &[String] {
        &self.started
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Stops new captures, tells supervisors to exit and SIGTERMs running
    /// capture processes. Does not wait for anything to finish.
    pub fn shutdown(&mut self) -> Vec<TerminationReport> {
        self.registry.close();
        self.shutdown_tx.take();
        let reports = self.registry.terminate_all();
        log::info!(
            "[orchestrator] shutdown: {} capture processes signalled",
            reports.len()
        );
        reports
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            let _ = self.shutdown();
        }
    }
}
