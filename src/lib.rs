// src/lib.rs
pub mod config;
pub mod core;
pub mod log_retention;
pub mod orchestrator;
pub mod recorder;
pub mod testing;

// Re-export die wichtigsten Typen
pub use config::{AppConfig, CameraConfig, ContainerFormat};
pub use crate::core::{ComponentLogger, ConfigError, LogContext, NvrError};
pub use orchestrator::Orchestrator;
pub use recorder::{
    CameraSupervisor, CaptureOutcome, CaptureRunner, CleanupStats, PathCodec, SegmentDescriptor,
};
