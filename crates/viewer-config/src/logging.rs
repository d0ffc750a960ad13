//! Structured logging utilities for viewer bootstrap components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use viewer_config::{log_crash_warn, log_instance_info};
//!
//! log_instance_info!("Registered dispatch endpoint", pid = std::process::id());
//! log_crash_warn!("Reporter spawn failed", error = tracing::field::display(&e));
//! ```
//!
//! Never call these from a signal handler or between `fork` and `exec`.

use std::str::FromStr;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const BOOT: &'static str = "BOOT";
    pub const INSTANCE: &'static str = "INSTANCE";
    pub const DISPATCH: &'static str = "DISPATCH";
    pub const CRASH: &'static str = "CRASH";
    pub const PLUGIN: &'static str = "PLUGIN";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// === BOOT logging macros ===

#[macro_export]
macro_rules! log_boot_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "BOOT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_boot_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "BOOT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_boot_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "BOOT", $($key = $value,)* $msg)
    };
}

// === INSTANCE logging macros ===

#[macro_export]
macro_rules! log_instance_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "INSTANCE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_instance_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "INSTANCE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_instance_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "INSTANCE", $($key = $value,)* $msg)
    };
}

// === DISPATCH logging macros ===

#[macro_export]
macro_rules! log_dispatch_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "DISPATCH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "DISPATCH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "DISPATCH", $($key = $value,)* $msg)
    };
}

// === CRASH logging macros ===

#[macro_export]
macro_rules! log_crash_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "CRASH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_crash_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "CRASH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_crash_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CRASH", $($key = $value,)* $msg)
    };
}

// === PLUGIN logging macros ===

#[macro_export]
macro_rules! log_plugin_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "PLUGIN", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_plugin_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "PLUGIN", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup; `RUST_LOG` wins when set.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    // try_init: a host that already installed a subscriber keeps it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
