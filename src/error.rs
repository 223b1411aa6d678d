// src/error.rs

//! Crate-level error taxonomy
//!
//! Aggregates the typed per-module errors behind one [`Error`] enum and a
//! [`Result`] alias. Module errors convert in with `#[from]`, so functions
//! throughout the crate propagate with `?` and match on the specific
//! variant where they need to.

use thiserror::Error;

use crate::config::ConfigProcessError;
use crate::exec::SubprocessError;
use crate::loc::LocTypeError;
use crate::scheduler::JobsNotCompletedError;

/// The crate-level result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Any error raised by the installation engine
#[derive(Debug, Error)]
pub enum Error {
    /// A setting could not be processed
    #[error(transparent)]
    ConfigProcess(#[from] ConfigProcessError),

    /// BLOB and TREE dependencies mixed under one target
    #[error(transparent)]
    LocType(#[from] LocTypeError),

    /// A location could not be resolved to a usable source
    #[error("unresolved location: {0}")]
    UnresolvedLocation(String),

    /// An external command failed
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    /// Jobs were left permanently pending after the graph drained
    #[error(transparent)]
    JobsNotCompleted(#[from] JobsNotCompletedError),

    /// An I/O operation failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The location database raised an error
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
