//! Utility library for the PID Drive Software
//!
//! Everything an executable needs around its processing modules: sessions, logging, parameter
//! loading and CSV archives.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod archive;
pub mod host;
pub mod logger;
pub mod maths;
pub mod module;
pub mod params;
pub mod session;
pub mod time;

// ---------------------------------------------------------------------------
// MACROS
// ---------------------------------------------------------------------------

/// Log an error then panic.
///
/// Only for programming or configuration errors which cannot be recovered from, everything else
/// should return a `Result`.
#[macro_export]
macro_rules! raise_error {
    ($fmt:expr) => ({
        log::error!("{}", $fmt);
        std::panic!("Unrecoverable error");
    });
    ($fmt:expr, $($arg:tt)*) => ({
        log::error!("{}", std::format_args!($fmt, $($arg)*));
        std::panic!("Unrecoverable error");
    });
}
