//! Leveled logging shared by every object rooted at a [`crate::context::Context`].
//!
//! The level set is a superset of the `log` crate's five levels (it adds
//! `None` and `Fatal` at the two ends), matching what the reference C
//! implementation exposes. When no explicit sink has been installed on a
//! `Context`, messages are also forwarded to the `log` facade under the
//! target `"asdf"` so host applications can route them through whatever
//! subscriber they already use.

use std::env;
use std::fmt;

/// Logging threshold, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Logging disabled entirely.
    None = 0,
    Trace = 1,
    Debug = 2,
    #[default]
    Info = 3,
    Warn = 4,
    Error = 5,
    Fatal = 6,
}

/// Name of the environment variable consulted by [`LogLevel::from_env`].
pub const LOG_LEVEL_ENV_VAR: &str = "ASDF_LOG_LEVEL";

/// Threshold used when the environment variable is unset or unrecognized.
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Warn;

impl LogLevel {
    fn from_str(s: &str) -> Option<LogLevel> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Some(LogLevel::None),
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            "FATAL" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// Read [`LOG_LEVEL_ENV_VAR`] from the environment, falling back to
    /// [`DEFAULT_LOG_LEVEL`] if it is unset or not recognized.
    pub fn from_env() -> LogLevel {
        env::var(LOG_LEVEL_ENV_VAR)
            .ok()
            .and_then(|v| LogLevel::from_str(&v))
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    fn as_log_level(self) -> Option<log::Level> {
        match self {
            LogLevel::None => None,
            LogLevel::Trace => Some(log::Level::Trace),
            LogLevel::Debug => Some(log::Level::Debug),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Warn => Some(log::Level::Warn),
            LogLevel::Error | LogLevel::Fatal => Some(log::Level::Error),
        }
    }
}

/// A sink for log messages. The default logger forwards to the `log` crate.
pub trait LogSink {
    fn log(&self, level: LogLevel, message: &dyn fmt::Display);
}

struct DefaultSink;

impl LogSink for DefaultSink {
    fn log(&self, level: LogLevel, message: &dyn fmt::Display) {
        if let Some(level) = level.as_log_level() {
            log::log!(target: "asdf", level, "{}", message);
        }
    }
}

/// Per-file logger: a threshold plus a sink.
pub struct Logger {
    level: LogLevel,
    sink: Box<dyn LogSink>,
}

impl Logger {
    pub fn new() -> Logger {
        Logger {
            level: LogLevel::from_env(),
            sink: Box::new(DefaultSink),
        }
    }

    pub fn with_level(level: LogLevel) -> Logger {
        Logger {
            level,
            sink: Box::new(DefaultSink),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn set_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sink = sink;
    }

    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        if level == LogLevel::None || level < self.level {
            return;
        }
        self.sink.log(level, &message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("level", &self.level).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(LogLevel::from_str("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("ERROR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("bogus"), None);
    }

    #[test]
    fn ordering_matches_severity() {
        assert!(LogLevel::Trace < LogLevel::Warn);
        assert!(LogLevel::Fatal > LogLevel::Error);
    }
}
