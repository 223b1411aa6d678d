// src/hash.rs

//! Configurable checksums for file and directory content
//!
//! Two families of "checksum" are supported:
//! - **Digest algorithms** (MD5 by default, SHA-256): content hashes,
//!   streamed in filesystem-block-sized chunks so arbitrarily large files
//!   never have to fit in memory.
//! - **mtime+size**: a cheap stand-in for a content hash, encoding the
//!   source path, modification time and size. Useful on filesystems where
//!   reading every byte is too expensive.
//!
//! [`checksum_of`] enumerates a file or directory into ordered
//! `(relative path, checksum, mode)` entries: a file yields a single entry
//! with an empty relative path, a directory yields a marker entry per
//! sub-directory (checksum and mode both `None`) plus one entry per file.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::str::FromStr;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use walkdir::WalkDir;

/// Fallback read chunk size when the filesystem block size is unknown
const FALLBACK_BLOCK_SIZE: usize = 4096;

/// Separator between the fields of an mtime+size checksum
const MTIME_AND_SIZE_SEP: char = ':';

/// Checksum algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// MD5 (128-bit digest), the historical default for install records
    #[default]
    Md5,

    /// SHA-256 (256-bit digest)
    Sha256,

    /// Not a digest at all: a `source=..:mtime=..:size=..` string.
    ///
    /// Changes to content that preserve both mtime and size go unnoticed;
    /// that is the accepted trade-off for avoiding reads.
    MtimeAndSize,
}

impl HashAlgorithm {
    /// Length of the hex digest, where one exists
    pub const fn hex_len(&self) -> Option<usize> {
        match self {
            Self::Md5 => Some(32),
            Self::Sha256 => Some(64),
            Self::MtimeAndSize => None,
        }
    }

    /// Get the algorithm name as a string
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::MtimeAndSize => "mtime+size",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "md5sum"/"sha256sum" are accepted for compatibility with
        // records written by coreutils-style tooling.
        match s.to_lowercase().trim_end_matches("sum") {
            "md5" | "md-5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "mtime+size" => Ok(Self::MtimeAndSize),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Unknown checksum algorithm name
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown checksum algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

/// A computed checksum did not match the declared one
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unmatched checksum, expected={expected}, actual={actual}")]
pub struct ChecksumMismatch {
    pub expected: String,
    pub actual: String,
}

/// Incremental digest hasher over the supported digest algorithms
pub struct Hasher {
    state: HasherState,
}

enum HasherState {
    Md5(Md5),
    Sha256(Sha256),
}

impl Hasher {
    /// Create a hasher; `MtimeAndSize` has no streaming form
    pub fn new(algorithm: HashAlgorithm) -> Option<Self> {
        let state = match algorithm {
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::MtimeAndSize => return None,
        };
        Some(Self { state })
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Md5(hasher) => hasher.update(data),
            HasherState::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the hex digest
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Md5(hasher) => format!("{:x}", hasher.finalize()),
            HasherState::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Compute the hex digest of a byte slice
///
/// `MtimeAndSize` is meaningless for in-memory bytes and falls back to MD5.
pub fn digest_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm).unwrap_or(Hasher {
        state: HasherState::Md5(Md5::new()),
    });
    hasher.update(data);
    hasher.finalize()
}

/// Compute the hex digest of a reader, streaming in `block_size` chunks
pub fn digest_reader<R: Read>(
    algorithm: HashAlgorithm,
    reader: &mut R,
    block_size: usize,
) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "mtime+size cannot digest a stream",
        )
    })?;
    let mut buffer = vec![0u8; block_size.max(1)];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

/// Compute the checksum of a single file
///
/// Digest algorithms stream the file in chunks of the filesystem's
/// preferred block size; mtime+size stats the file instead of reading it.
/// `root` is the directory the mtime+size `source=` field is made relative
/// to, where applicable.
pub fn checksum_file(
    algorithm: HashAlgorithm,
    path: &Path,
    root: Option<&Path>,
) -> io::Result<String> {
    if algorithm == HashAlgorithm::MtimeAndSize {
        return mtime_and_size(path, root);
    }
    let file = File::open(path)?;
    let block_size = match file.metadata() {
        Ok(meta) if meta.blksize() > 0 => meta.blksize() as usize,
        _ => FALLBACK_BLOCK_SIZE,
    };
    let mut file = file;
    digest_reader(algorithm, &mut file, block_size)
}

/// Produce the `source=..:mtime=..:size=..` pseudo-checksum for a path
fn mtime_and_size(path: &Path, root: Option<&Path>) -> io::Result<String> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map_err(io::Error::other)?
        .as_secs_f64();
    let source = match root {
        Some(root) => path.strip_prefix(root).unwrap_or(path),
        None => path,
    };
    Ok([
        format!("source={}", source.display()),
        format!("mtime={}", mtime),
        format!("size={}", meta.len()),
    ]
    .join(&MTIME_AND_SIZE_SEP.to_string()))
}

/// Enumerate a file or directory into `(relative path, checksum, mode)`
///
/// A file yields `[("", checksum, mode)]`. A directory yields a marker
/// entry `(dirpath, None, None)` for itself and every sub-directory, and a
/// real entry for every file beneath it. Entries are emitted in
/// directory-walk order; callers that compare sets must sort first.
///
/// Fails with a not-found error if `path` does not exist.
pub fn checksum_of(
    algorithm: HashAlgorithm,
    path: &Path,
) -> io::Result<Vec<(String, Option<String>, Option<u32>)>> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: no such file or directory", path.display()),
        ));
    }
    let mut entries = Vec::new();
    if path.is_file() {
        let checksum = checksum_file(algorithm, path, None)?;
        let mode = std::fs::metadata(path)?.mode();
        entries.push((String::new(), Some(checksum), Some(mode)));
        return Ok(entries);
    }
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        if entry.file_type().is_dir() {
            entries.push((rel, None, None));
        } else {
            let checksum = checksum_file(algorithm, entry.path(), Some(path))?;
            let mode = std::fs::metadata(entry.path())?.mode();
            entries.push((rel, Some(checksum), Some(mode)));
        }
    }
    Ok(entries)
}

/// Guess the algorithm that produced `checksum`
///
/// A `source=` prefix marks an mtime+size string; otherwise the hex length
/// selects a digest algorithm. Returns `None` when nothing matches.
pub fn guess_algorithm(checksum: &str) -> Option<HashAlgorithm> {
    if checksum.starts_with("source=") {
        return Some(HashAlgorithm::MtimeAndSize);
    }
    [HashAlgorithm::Md5, HashAlgorithm::Sha256]
        .into_iter()
        .find(|algorithm| algorithm.hex_len() == Some(checksum.len()))
}
