//! Monitoring Module
//!
//! Provides observability for plughub:
//! - Structured logging via `tracing`

pub mod logging;

pub use logging::{init_logging, LogFormat, LogLevel, LoggerConfig};
