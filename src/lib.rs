// src/lib.rs

//! Instill: incremental file installation
//!
//! Reads `[file:*]` declarations from a configuration tree and installs
//! each target from its sources, rebuilding only what changed since the
//! previous run.
//!
//! # Architecture
//!
//! - Checksum-tracked: every installed target's sub-path checksums are
//!   recorded in a SQLite file in the install root
//! - Staleness is transitive: a target rebuilds when any source changed
//! - Pluggable sources: filesystem paths, git sub-trees, Subversion URLs,
//!   synthesized Fortran namelists, behind one handler interface
//! - Dependency-ordered builds: pulls and installs run as a job graph on
//!   a single-threaded cooperative scheduler

pub mod config;
pub mod dao;
pub mod env;
mod error;
pub mod events;
pub mod exec;
pub mod handlers;
pub mod hash;
pub mod install;
pub mod loc;
pub mod scheduler;

pub use config::{ConfigProcessError, ConfigTree};
pub use error::{Error, Result};
pub use events::{CollectingReporter, Event, Level, Reporter, TracingReporter};
pub use hash::{HashAlgorithm, checksum_of, guess_algorithm};
pub use install::{FILE_PREFIX, FileInstaller, InstallOptions};
pub use loc::{ActionKey, Loc, LocType, Mode, SubPath};
pub use scheduler::{JobManager, JobProcessor, JobProxy, JobRunner, JobsNotCompletedError};
