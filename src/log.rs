//! The `log` module defines an interface to the crate's internal logging facilities. This module
//! (re)exports the five logging macros: `error!`, `warn!`, `info!`, `debug!` and `trace!`, where
//! `error!` represents the highest-priority log messages and `trace!` the lowest. To emit a log
//! message, simply use one of these macros in your code:
//!
//! ```rust
//! use holon::info;
//!
//! pub fn do_a_thing() {
//!     info!("A thing is being done.");
//! }
//! ```
//!
//! Logging is _disabled_ by default. Log messages are enabled/disabled using the functions:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level: LevelFilter)`: enables only log messages with priority at least `level`

use std::sync::Once;

use env_logger::Builder;
pub use log::{debug, error, info, trace, warn, LevelFilter};

static INIT: Once = Once::new();

/// Enables the logger with no level filter / full logging. Equivalent to
/// `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the global log level. A filter level of `LevelFilter::Off` disables logging.
pub fn set_log_level(level: LevelFilter) {
    INIT.call_once(|| {
        // try_init rather than init: the embedding application may have installed
        // its own global logger, which takes precedence.
        let _ = Builder::new().filter_level(level).try_init();
    });
    log::set_max_level(level);
}
