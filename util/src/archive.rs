//! CSV archives
//!
//! Modules record one row per cycle (or per event) into CSV files under the session's `arch`
//! directory. The header row is taken from the field names of the first record written.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use csv::{Writer, WriterBuilder};
use log::trace;
use serde::Serialize;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Writes serialisable records to a CSV file.
///
/// A default constructed archiver is not attached to any file and drops the records passed to it.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while opening or writing an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Could not create the archive file {0:?}: {1}")]
    CreateError(PathBuf, std::io::Error),

    #[error("Could not write the record: {0}")]
    WriteError(#[from] csv::Error),

    #[error("Could not flush the archive: {0}")]
    FlushError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A struct which can write its current state to its archives.
///
/// Implementors own one or more `Archiver`s, opened during initialisation.
pub trait Archived {
    fn write(&mut self) -> Result<(), ArchiveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Open an archive at `rel_path` inside the session's archive directory, creating any missing
    /// directories on the way.
    pub fn from_path<P: AsRef<Path>>(session: &Session, rel_path: P) -> Result<Self, ArchiveError> {
        Self::from_file_path(session.arch_path(rel_path))
    }

    /// Open an archive at an explicit path. An existing file is truncated.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::CreateError(parent.to_path_buf(), e))?;
        }

        let file = File::create(path)
            .map_err(|e| ArchiveError::CreateError(path.to_path_buf(), e))?;

        Ok(Self {
            writer: Some(WriterBuilder::new().has_headers(true).from_writer(file))
        })
    }

    /// Returns true if this archiver is attached to a file.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Append a record to the archive and flush it to disk.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => {
                trace!("Archiver not opened, record dropped");
                return Ok(());
            }
        };

        writer.serialize(record)?;
        writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        cycle: u64,
        value: f64
    }

    #[test]
    fn test_unopened_archiver_drops_records() {
        let mut arch = Archiver::default();
        assert!(!arch.is_open());
        assert!(arch.serialise(Row { cycle: 0, value: 1.0 }).is_ok());
    }

    #[test]
    fn test_archiver_writes_csv() {
        let path = std::env::temp_dir()
            .join("util_archive_test")
            .join("rows.csv");

        {
            let mut arch = Archiver::from_file_path(&path).unwrap();
            assert!(arch.is_open());
            arch.serialise(Row { cycle: 0, value: 1.5 }).unwrap();
            arch.serialise(Row { cycle: 1, value: -0.25 }).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "cycle,value\n0,1.5\n1,-0.25\n");

        // Reopening truncates
        drop(Archiver::from_file_path(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        std::fs::remove_file(&path).ok();
    }
}
