pub mod error;
pub mod logging;
pub mod timestamp;

pub use error::{ConfigError, NvrError, NvrResult};
pub use logging::{init_logging, ComponentLogger, LogContext};
pub use timestamp::*;
