//! Structured logging utilities for CDBL components.
//!
//! Every macro tags the event with a `component` field so a single
//! `EnvFilter` run can be narrowed to one subsystem. Fields follow the
//! message and accept the usual `%` / `?` sigils.
//!
//! # Usage
//!
//! ```ignore
//! use cdbl_config::{log_swap_info, log_flags_warn};
//!
//! log_swap_info!("Asset swapped", hash = "abc123");
//! log_flags_warn!("Settings file unreadable", path = %path.display());
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const SWAP: &'static str = "SWAP";
    pub const FLAGS: &'static str = "FLAGS";
    pub const LEDGER: &'static str = "LEDGER";
    pub const ENGINE: &'static str = "ENGINE";
    pub const CLI: &'static str = "CLI";
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

// === SWAP logging macros ===

#[macro_export]
macro_rules! log_swap_warn {
    ($msg:literal $(,)?) => {
        tracing::warn!(component = "SWAP", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::warn!(component = "SWAP", $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_swap_info {
    ($msg:literal $(,)?) => {
        tracing::info!(component = "SWAP", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::info!(component = "SWAP", $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_swap_debug {
    ($msg:literal $(,)?) => {
        tracing::debug!(component = "SWAP", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::debug!(component = "SWAP", $($field)+, $msg)
    };
}

// === FLAGS logging macros ===

#[macro_export]
macro_rules! log_flags_warn {
    ($msg:literal $(,)?) => {
        tracing::warn!(component = "FLAGS", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::warn!(component = "FLAGS", $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_flags_info {
    ($msg:literal $(,)?) => {
        tracing::info!(component = "FLAGS", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::info!(component = "FLAGS", $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_flags_debug {
    ($msg:literal $(,)?) => {
        tracing::debug!(component = "FLAGS", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::debug!(component = "FLAGS", $($field)+, $msg)
    };
}

// === LEDGER logging macros ===

#[macro_export]
macro_rules! log_ledger_warn {
    ($msg:literal $(,)?) => {
        tracing::warn!(component = "LEDGER", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::warn!(component = "LEDGER", $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_ledger_debug {
    ($msg:literal $(,)?) => {
        tracing::debug!(component = "LEDGER", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::debug!(component = "LEDGER", $($field)+, $msg)
    };
}

// === ENGINE logging macros ===

#[macro_export]
macro_rules! log_engine_warn {
    ($msg:literal $(,)?) => {
        tracing::warn!(component = "ENGINE", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::warn!(component = "ENGINE", $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_engine_info {
    ($msg:literal $(,)?) => {
        tracing::info!(component = "ENGINE", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::info!(component = "ENGINE", $($field)+, $msg)
    };
}

#[macro_export]
macro_rules! log_engine_debug {
    ($msg:literal $(,)?) => {
        tracing::debug!(component = "ENGINE", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::debug!(component = "ENGINE", $($field)+, $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(,)?) => {
        tracing::debug!(component = "CLI", $msg)
    };
    ($msg:literal, $($field:tt)+) => {
        tracing::debug!(component = "CLI", $($field)+, $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `CDBL_LOG` takes precedence over `RUST_LOG`; `level` applies when
/// neither is set.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("CDBL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::SWAP, "SWAP");
        assert_eq!(Component::FLAGS, "FLAGS");
        assert_eq!(Component::LEDGER, "LEDGER");
    }

    #[test]
    fn test_level_filters() {
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }
}
