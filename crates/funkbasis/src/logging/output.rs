// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Logging output backends (console, file, `log` facade bridge).

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};

/// Log level enumeration for filtering and display.
///
/// `Notice` sits between `Info` and `Warning`: it is the level used for
/// protocol errors that are discarded by design (bad CRC, identity
/// mismatch, unexpected opcode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug: per-block transmission details
    Debug = 0,
    /// Info: protocol events during normal operation
    Info = 1,
    /// Notice: discarded frames, odd configuration, kicked transactions
    Notice = 2,
    /// Warning: potentially harmful situations
    Warning = 3,
    /// Error: error conditions
    Error = 4,
}

impl LogLevel {
    /// Returns the string representation of the log level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG ",
            Self::Info => "INFO  ",
            Self::Notice => "NOTICE",
            Self::Warning => "WARN  ",
            Self::Error => "ERROR ",
        }
    }
}

/// Output destination trait for log messages.
///
/// Implementations must be thread-safe and handle errors gracefully.
pub trait Output: Send + Sync {
    /// Write a formatted log message to the output.
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&self) -> io::Result<()>;
}

/// Console output implementation.
///
/// Writes directly to stderr with level prefix and newline.
pub struct ConsoleOutput {
    level_filter: LogLevel,
}

impl ConsoleOutput {
    /// Create a new console output with the specified minimum level.
    pub fn new(level_filter: LogLevel) -> Self {
        Self { level_filter }
    }
}

impl Output for ConsoleOutput {
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        eprintln!("[{}] {}", level.as_str(), message);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// File output implementation.
///
/// Appends log messages to a file with level prefix and newline.
/// Thread-safe via internal mutex protecting the file handle.
pub struct FileOutput {
    file: Mutex<std::fs::File>,
    level_filter: LogLevel,
}

impl FileOutput {
    /// Create a new file output, creating/truncating the file at the given path.
    pub fn new(path: &str, level_filter: LogLevel) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            level_filter,
        })
    }
}

impl Output for FileOutput {
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }

        let mut file = self.file.lock();
        writeln!(file, "[{}] {}", level.as_str(), message)
    }

    fn flush(&self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

/// Bridge output forwarding messages into the `log` crate facade.
///
/// Lets embedders route base-station logs into whatever logger their
/// application already installed (env_logger, syslog, ...). `Notice` maps
/// to `log::Level::Info` since the facade has no notice level.
pub struct LogBridge;

impl LogBridge {
    /// Create a new bridge output.
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Output for LogBridge {
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
        let mapped = match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info | LogLevel::Notice => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        };
        log::log!(mapped, "{}", message);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        log::logger().flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Notice);
        assert!(LogLevel::Notice < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_str() {
        assert_eq!(LogLevel::Debug.as_str(), "DEBUG ");
        assert_eq!(LogLevel::Notice.as_str(), "NOTICE");
        assert_eq!(LogLevel::Error.as_str(), "ERROR ");
    }

    #[test]
    fn test_console_output_creation() {
        let output = ConsoleOutput::new(LogLevel::Info);
        assert!(output.write(LogLevel::Error, "test").is_ok());
        assert!(output.flush().is_ok());
    }

    #[test]
    fn test_file_output_writes_and_filters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("funkbasis.log");
        let path = path.to_str().expect("utf-8 path");

        let output = FileOutput::new(path, LogLevel::Notice).expect("file output");
        assert!(output.write(LogLevel::Debug, "filtered").is_ok());
        assert!(output.write(LogLevel::Notice, "kept").is_ok());
        assert!(output.flush().is_ok());

        let mut contents = String::new();
        std::fs::File::open(path)
            .expect("reopen")
            .read_to_string(&mut contents)
            .expect("read");
        assert!(!contents.contains("filtered"));
        assert!(contents.contains("kept"));
    }

    #[test]
    fn test_log_bridge() {
        let bridge = LogBridge::new();
        assert!(bridge.write(LogLevel::Info, "via facade").is_ok());
        assert!(bridge.flush().is_ok());
    }
}
