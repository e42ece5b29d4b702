//! Drive control module
//!
//! Combines a steering PID loop on the cross track error with a throttle PID loop on the speed
//! error, optionally tuning the steering gains online with twiddle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during DriveCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum DriveCtrlError {
    #[error("Could not load the DriveCtrl parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid DriveCtrl parameters: {0}")]
    InvalidParams(String),

    #[error("Could not open the DriveCtrl archives: {0}")]
    ArchiveError(util::archive::ArchiveError),
}
