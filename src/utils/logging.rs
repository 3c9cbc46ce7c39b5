//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! A module opts in by declaring the flag and importing the macros from the
//! crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_warn};
//!
//! log_debug!("tonight refreshed");
//! ```
//! Flipping the flag to `false` silences the module without touching
//! `RUST_LOG`.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors are the tracker's only failure surface, so this one ignores
/// `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*);
    };
}

/// Log level for the binary: `Debug` when `SLEEP_TRACKER_DEBUG` is set to
/// `1` or `true`, `Info` otherwise. `RUST_LOG` still overrides both.
pub fn default_level() -> log::LevelFilter {
    let debug_mode = std::env::var("SLEEP_TRACKER_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if debug_mode {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

/// Installs `env_logger`. Safe to call more than once.
pub fn init() {
    let _ = env_logger::Builder::new()
        .filter_level(default_level())
        .parse_default_env()
        .try_init();
}
