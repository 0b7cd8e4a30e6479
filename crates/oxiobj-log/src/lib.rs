//! Leveled diagnostics for the `oxiobj` object runtime.
//!
//! The runtime reports class initialization, registry traffic, shutdown hooks
//! and fatal misuse through this crate. It has no dependencies: the level is a
//! single atomic, the logger is a process-wide singleton, and every message is
//! tagged with the module path of the call site.
//!
//! # Example
//!
//! ```
//! use oxiobj_log::{debug, error, info, warn, Level};
//!
//! oxiobj_log::set_level(Level::Debug);
//!
//! let class = "Hello";
//! info!("initialized class {}", class);
//! debug!("table slots: {:?}", [1, 2, 3]);
//! warn!("zombie instance kept alive");
//! error!("over-release detected");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Severity of a log record.
///
/// Lower numeric values are more severe; a logger set to `Info` lets `Error`,
/// `Warn` and `Info` through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Broken invariants, reported right before the runtime panics.
    Error = 0,
    /// Suspicious but survivable conditions.
    Warn = 1,
    /// Lifecycle milestones.
    Info = 2,
    /// Per-class events such as initialization and shutdown hooks.
    Debug = 3,
    /// Per-operation detail.
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case label used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            3 => Level::Debug,
            4 => Level::Trace,
            _ => Level::Info,
        }
    }

    /// Parses a level name, ignoring case.
    ///
    /// ```
    /// use oxiobj_log::Level;
    ///
    /// assert_eq!(Level::from_str("warn"), Ok(Level::Warn));
    /// assert_eq!(Level::from_str("TRACE"), Ok(Level::Trace));
    /// assert!(Level::from_str("loud").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a message naming the rejected input when it is not one of
    /// `error`, `warn`, `info`, `debug` or `trace`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

/// Process-wide logger state.
pub struct Logger {
    level: AtomicU8,
    color: AtomicBool,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            color: AtomicBool::new(true),
        }
    }

    /// Sets the minimum level that will be written.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Enables or disables ANSI colors in the level label.
    pub fn set_color(&self, enabled: bool) {
        self.color.store(enabled, Ordering::Relaxed);
    }

    /// Returns whether a record at `level` would be written.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it at `Info` on first use.
///
/// Colors start disabled when the `NO_COLOR` environment variable is set.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| {
        let logger = Logger::new(Level::Info);
        if std::env::var_os("NO_COLOR").is_some() {
            logger.set_color(false);
        }
        logger
    })
}

/// Sets the minimum level of the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum level of the global logger from a level name.
///
/// # Errors
///
/// Propagates the parse error of [`Level::from_str`]; the level is left
/// unchanged in that case.
pub fn set_level_from_str(s: &str) -> Result<(), String> {
    let level = Level::from_str(s)?;
    set_level(level);
    Ok(())
}

/// Reads a level name from the environment variable `var` and applies it.
///
/// Returns the level that was applied, or `None` when the variable is unset
/// or does not name a level (the current level is kept).
///
/// ```
/// use oxiobj_log::init_from_env;
///
/// // Unset variables leave the logger untouched.
/// assert_eq!(init_from_env("OXIOBJ_LOG_DOCTEST_UNSET"), None);
/// ```
pub fn init_from_env(var: &str) -> Option<Level> {
    let raw = std::env::var(var).ok()?;
    let level = Level::from_str(&raw).ok()?;
    set_level(level);
    Some(level)
}

/// Writes one record. Called by the macros after the level check.
#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    const RESET: &str = "\x1b[0m";

    let logger = get_logger();
    if !logger.enabled(level) {
        return;
    }

    let label = level.as_str();
    let mut stderr = std::io::stderr().lock();
    // A failed write to stderr has nowhere better to go.
    let _ = if logger.color.load(Ordering::Relaxed) {
        let color = level.color_code();
        writeln!(stderr, "{color}[{label}]{RESET} {target}: {args}")
    } else {
        writeln!(stderr, "[{label}] {target}: {args}")
    };
}

/// Logs at an explicit level.
///
/// ```
/// use oxiobj_log::{log, Level};
///
/// log!(level: Level::Info, "{} classes registered", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}
