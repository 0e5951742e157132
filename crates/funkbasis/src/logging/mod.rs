// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Compile-time configurable logging system.
//!
//! This module provides zero-cost abstractions for logging with five severity
//! levels matching the ladder used throughout the transceiver code:
//! - `debug!()` - Per-block and per-sample development information
//! - `info!()` - Protocol events (state changes, telegrams sent/received)
//! - `notice!()` - Dropped frames, identity mismatches, odd configurations
//! - `warn!()` - Warning conditions
//! - `error!()` - Error conditions
//!
//! When the `logging` Cargo feature is disabled, all macros expand to empty
//! expressions with zero runtime overhead. The feature is on by default: a
//! base station without logs is very hard to drive against real handsets.
//!
//! ## Example
//!
//! ```ignore
//! use funkbasis::logging::{init_logger, ConsoleOutput, LogLevel};
//! use std::sync::Arc;
//!
//! let console = Arc::new(ConsoleOutput::new(LogLevel::Debug));
//! init_logger(console, LogLevel::Debug);
//!
//! info!("Kanal {}: entering IDLE state", 131);
//! notice!("Kanal {}: ignoring attach while busy", 131);
//! ```

#[cfg(feature = "logging")]
pub mod logger;
#[cfg(feature = "logging")]
mod output;

#[cfg(feature = "logging")]
pub use output::{ConsoleOutput, FileOutput, LogBridge, LogLevel, Output};

#[cfg(feature = "logging")]
pub use logger::{flush_logger, init_logger};

/// Log level stub used when the `logging` feature is disabled.
///
/// Keeps public signatures (channel constructors take a level) compiling in
/// both configurations.
#[cfg(not(feature = "logging"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Notice = 2,
    Warning = 3,
    Error = 4,
}

/// Debug-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! debug {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Debug,
            &format!($($arg)*),
        );
    };
}

/// Info-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! info {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Info,
            &format!($($arg)*),
        );
    };
}

/// Notice-level log message.
///
/// The protocol-error level: CRC failures, unexpected opcodes and identity
/// mismatches are logged here and then silently discarded, never escalated.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! notice {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Notice,
            &format!($($arg)*),
        );
    };
}

/// Warning-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! warn {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Warning,
            &format!($($arg)*),
        );
    };
}

/// Error-level log message. Formatted like `println!()`.
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! error {
    ($($arg:tt)*) => {
        let _ = $crate::logging::logger::log_message(
            $crate::logging::LogLevel::Error,
            &format!($($arg)*),
        );
    };
}

/// Function entry trace marker, active with `logging` + `trace` features.
#[macro_export]
#[cfg(all(feature = "logging", feature = "trace"))]
macro_rules! trace_fn {
    ($fn_name:expr) => {
        let _ = $crate::logging::logger::trace_entry($fn_name);
    };
}

/// No-op trace macro (when trace feature disabled).
#[macro_export]
#[cfg(not(all(feature = "logging", feature = "trace")))]
macro_rules! trace_fn {
    ($fn_name:expr) => {};
}

/// No-op debug macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

/// No-op info macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}

/// No-op notice macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! notice {
    ($($arg:tt)*) => {};
}

/// No-op warn macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

/// No-op error macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_macros_compile() {
        debug!("debug message");
        info!("info message");
        notice!("notice message");
        warn!("warn message");
        error!("error message");

        debug!("with args: {}", 42);
        info!("with format: {:?}", vec![1, 2, 3]);
    }

    #[test]
    fn test_init_and_log() {
        let console = Arc::new(ConsoleOutput::new(LogLevel::Debug));
        init_logger(console, LogLevel::Debug);

        debug!("test debug");
        info!("test info");
        notice!("test notice");
        warn!("test warning");
        error!("test error");

        assert!(flush_logger().is_ok());
    }

    #[test]
    fn test_multiple_init_calls_safe() {
        let console = Arc::new(ConsoleOutput::new(LogLevel::Info));
        init_logger(console.clone(), LogLevel::Info);

        // Second call is ignored (safe)
        init_logger(console, LogLevel::Debug);

        info!("still works");
    }
}
