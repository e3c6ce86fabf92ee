// src/main.rs

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use crossbeam::channel::bounded;
use log::{error, info};

use rtsp_nvr::config::{self, load_cameras};
use rtsp_nvr::core::{init_logging, local_now, NvrError};
use rtsp_nvr::log_retention::{spawn_log_cleanup, LogRetention};
use rtsp_nvr::recorder::capture::ffmpeg_available;
use rtsp_nvr::recorder::{FfmpegRecorder, ProcessRegistry, RecorderConfig, RetentionPolicy};
use rtsp_nvr::Orchestrator;

fn main() -> anyhow::Result<()> {
    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "nvr.toml".into());
    let cfg = config::load(Path::new(&cfg_path))?;

    // ------------------------------------------------------------
    // Logging + log retention
    // ------------------------------------------------------------
    let log_file = init_logging(&cfg.log_dir)?;
    info!("[nvr] config {} (log file {:?})", cfg_path, log_file);

    let mut log_policy = LogRetention::new(&cfg.log_dir, &cfg.log_config);
    log_policy.run(local_now())?;
    spawn_log_cleanup(log_policy, cfg.log_cleanup_interval())?;

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let (signal_tx, signal_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })?;

    // ------------------------------------------------------------
    // Startup checks
    // ------------------------------------------------------------
    if !ffmpeg_available(&cfg.ffmpeg_bin) {
        let err = NvrError::CaptureBinaryMissing {
            binary: cfg.ffmpeg_bin.clone(),
        };
        error!("[nvr] {}", err);
        return Err(err.into());
    }

    std::fs::create_dir_all(&cfg.video_root)
        .with_context(|| format!("creating video root {:?}", cfg.video_root))?;

    let cameras = load_cameras(&cfg.camera_config);
    if cameras.is_empty() {
        error!(
            "[nvr] no valid camera in {:?}, exiting",
            cfg.camera_config
        );
        return Err(NvrError::NoCameras.into());
    }

    // ------------------------------------------------------------
    // Camera supervisors
    // ------------------------------------------------------------
    let registry = Arc::new(ProcessRegistry::new());
    let rec_cfg = RecorderConfig::from(&cfg);

    let mut orchestrator = Orchestrator::start(cameras, &rec_cfg, registry.clone(), |_| {
        FfmpegRecorder::new(
            cfg.ffmpeg_bin.clone(),
            cfg.rtsp_transport.clone(),
            registry.clone(),
        )
    })?;

    info!(
        "[nvr] recording {} cameras – Ctrl+C to stop",
        orchestrator.cameras().len()
    );

    // ------------------------------------------------------------
    // Wait + shutdown
    // ------------------------------------------------------------
    let _ = signal_rx.recv();
    info!("[nvr] shutdown requested");

    let reports = orchestrator.shutdown();
    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    if failed > 0 {
        error!("[nvr] {} capture processes could not be signalled", failed);
    }

    info!("[nvr] stopped");
    Ok(())
}
