/// Console and rotated-file logging setup built on `fern`.
pub mod logger;

pub use logger::{setup_logging, LoggerError};
