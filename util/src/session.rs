//! Session management
//!
//! A session is one execution of an executable. Each session gets its own directory,
//! `<sessions_root>/<exec_name>_<timestamp>/`, holding the log file and an `arch` directory for
//! the CSV archives. The session epoch is global to the process and can only be set once.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::{host, time};

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// strftime format of the timestamp in session directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name of the archive directory within a session.
const ARCH_DIR_NAME: &str = "arch";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Paths belonging to the current session
#[derive(Clone, Debug)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The root directory for this session's archives
    pub arch_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable ({}) is not set", host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot create the session directory {0:?}: {1}")]
    CannotCreateDir(PathBuf, std::io::Error),

    #[error("A session has already been started in this process")]
    AlreadyStarted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session in the `sessions_dir` directory of the software root.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let sessions_root = host::get_pid_drive_sw_root()
            .map_err(|_| SessionError::SwRootNotSet)?
            .join(sessions_dir);

        Self::new_in(exec_name, sessions_root)
    }

    /// Start a new session inside an explicit sessions directory.
    pub fn new_in(exec_name: &str, sessions_root: PathBuf) -> Result<Self, SessionError> {
        SESSION_EPOCH.try_init_once(Utc::now)
            .map_err(|_| SessionError::AlreadyStarted)?;

        // Only fails if another thread is mid-initialisation
        let epoch = SESSION_EPOCH.get().ok_or(SessionError::AlreadyStarted)?;

        let session_root = sessions_root.join(format!(
            "{}_{}",
            exec_name,
            epoch.format(TIMESTAMP_FORMAT)
        ));
        let arch_root = session_root.join(ARCH_DIR_NAME);

        // Creating the archive dir creates the session root too
        create_dir(&arch_root)?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            session_root,
            arch_root,
        })
    }

    /// Full path of a file in the session's archive directory.
    pub fn arch_path<P: AsRef<Path>>(&self, rel_path: P) -> PathBuf {
        self.arch_root.join(rel_path)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// `NAN` before the session has started, so early log lines are still printed.
pub fn elapsed_seconds() -> f64 {
    epoch()
        .and_then(|e| time::duration_to_seconds(Utc::now() - *e))
        .unwrap_or(std::f64::NAN)
}

/// The session epoch, if a session has been started.
pub fn epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn create_dir(path: &Path) -> Result<(), SessionError> {
    fs::create_dir_all(path)
        .map_err(|e| SessionError::CannotCreateDir(path.to_path_buf(), e))
}

#[cfg(test)]
mod test {
    use super::*;

    // The epoch is process wide so everything touching it lives in one test
    #[test]
    fn test_session_lifecycle() {
        let sessions_root = std::env::temp_dir().join("util_session_test");

        assert!(elapsed_seconds().is_nan() || epoch().is_some());

        let session = Session::new_in("test_exec", sessions_root.clone()).unwrap();

        assert!(session.session_root.starts_with(&sessions_root));
        assert!(session.arch_root.is_dir());
        assert_eq!(
            session.log_file_path.file_name().and_then(|n| n.to_str()),
            Some("test_exec.log")
        );
        assert_eq!(
            session.arch_path("drive_ctrl/status_report.csv"),
            session.arch_root.join("drive_ctrl").join("status_report.csv")
        );

        assert!(epoch().is_some());
        assert!(elapsed_seconds() >= 0.0);

        // Only one session per process
        assert!(matches!(
            Session::new_in("test_exec", sessions_root),
            Err(SessionError::AlreadyStarted)
        ));
    }
}
