//! Runtime configuration.
//!
//! Two knobs, both process-wide:
//!
//! - the log level of [`oxiobj_log`] (`OXIOBJ_LOG`, default `info`)
//! - zombie mode (`OXIOBJ_ZOMBIES`, default off): destroyed instances keep
//!   their block with the header marked as a zombie, so a later retain or
//!   release of the stale pointer is reported instead of touching freed
//!   memory. Zombie blocks are never reclaimed; use it for debugging only.

use oxiobj_log::Level;
use std::sync::atomic::{AtomicBool, Ordering};

static ZOMBIES: AtomicBool = AtomicBool::new(false);

/// Turns zombie mode on or off for instances destroyed from now on.
pub fn set_zombies(enabled: bool) {
    ZOMBIES.store(enabled, Ordering::Relaxed);
}

/// Whether zombie mode is on.
#[must_use]
pub fn zombies_enabled() -> bool {
    ZOMBIES.load(Ordering::Relaxed)
}

/// Settings applied by [`Runtime::start`](crate::runtime::Runtime::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Minimum level written by the runtime's logger.
    pub log_level: Level,
    /// Keep destroyed instances as zombies.
    pub zombies: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            log_level: Level::Info,
            zombies: false,
        }
    }
}

impl RuntimeConfig {
    /// Environment variable holding the log level name.
    pub const LOG_VAR: &'static str = "OXIOBJ_LOG";
    /// Environment variable enabling zombie mode.
    pub const ZOMBIES_VAR: &'static str = "OXIOBJ_ZOMBIES";

    /// Reads the configuration from the process environment. Unset or
    /// unparsable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// ```rust
    /// use oxiobj::config::RuntimeConfig;
    /// use oxiobj_log::Level;
    ///
    /// let config = RuntimeConfig::from_lookup(|var| match var {
    ///     "OXIOBJ_LOG" => Some("debug".to_string()),
    ///     "OXIOBJ_ZOMBIES" => Some("1".to_string()),
    ///     _ => None,
    /// });
    ///
    /// assert_eq!(config.log_level, Level::Debug);
    /// assert!(config.zombies);
    /// ```
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RuntimeConfig::default();

        let log_level = lookup(Self::LOG_VAR)
            .and_then(|raw| Level::from_str(&raw).ok())
            .unwrap_or(defaults.log_level);
        let zombies = lookup(Self::ZOMBIES_VAR)
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(defaults.zombies);

        RuntimeConfig { log_level, zombies }
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Enables or disables zombie mode.
    #[must_use]
    pub fn with_zombies(mut self, enabled: bool) -> Self {
        self.zombies = enabled;
        self
    }

    /// Applies the settings to the running process.
    pub fn apply(&self) {
        oxiobj_log::set_level(self.log_level);
        set_zombies(self.zombies);
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
