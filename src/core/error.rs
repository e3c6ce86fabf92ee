use std::error::Error as StdError;
use thiserror::Error;

pub type NvrResult<T> = Result<T, NvrError>;

#[derive(Debug, Error)]
pub enum NvrError {
    #[error("capture executable '{binary}' not found or not runnable")]
    CaptureBinaryMissing { binary: String },
    #[error("no usable camera configured")]
    NoCameras,
    #[error("capture registry closed, refusing to start '{camera_id}'")]
    RegistryClosed { camera_id: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl NvrError {
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: expected at least 4 fields, got {found}")]
    TooFewFields { line: usize, found: usize },
    #[error("line {line}: invalid camera id '{id}'")]
    InvalidCameraId { line: usize, id: String },
    #[error("line {line}: duplicate camera id '{id}'")]
    DuplicateCameraId { line: usize, id: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
