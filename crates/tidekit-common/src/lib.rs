//! # Tidekit Common
//!
//! Shared utilities for the Tidekit offline toolkit:
//!
//! - Logging configuration and setup (`tracing` based)
//! - Timing helpers: cancellable timeouts and wall-clock milliseconds

pub mod logging;
pub mod timing;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use timing::{now_ms, with_timeout, Elapsed};
