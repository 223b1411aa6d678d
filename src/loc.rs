// src/loc.rs

//! Location model
//!
//! A [`Loc`] is the unified in-memory representation of a named resource:
//! either a source (something a target is built from) or an install target.
//! Locations are built fresh for every processor invocation and populated
//! progressively: name, then scheme and type from the handler `parse` step,
//! then staleness from the database comparison, then sub-path checksums
//! from the build. The database is the only durable store.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sub-path name of a single-file location
pub const BLOB_PATH: &str = "";

/// Role of a location in the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKey {
    /// A resource pulled into the cache for consumption by targets
    Source,
    /// An installation target
    Install,
}

impl ActionKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Install => "install",
        }
    }
}

/// Whether a location is a single file or a directory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocType {
    Blob,
    Tree,
}

impl LocType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            _ => None,
        }
    }
}

impl fmt::Display for LocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Installation mode of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Build the target from its sources (copy/concatenate/sync)
    #[default]
    Auto,
    /// Create a directory
    Mkdir,
    /// Create a symbolic link
    Symlink,
    /// Create a symbolic link, first checking the destination exists
    SymlinkPlus,
}

impl Mode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mkdir => "mkdir",
            Self::Symlink => "symlink",
            Self::SymlinkPlus => "symlink+",
        }
    }

    pub const fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink | Self::SymlinkPlus)
    }
}

impl FromStr for Mode {
    type Err = BadModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "mkdir" => Ok(Self::Mkdir),
            "symlink" => Ok(Self::Symlink),
            "symlink+" => Ok(Self::SymlinkPlus),
            _ => Err(BadModeError(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `mode` value outside the fixed enumeration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown installation mode: {0}")]
pub struct BadModeError(pub String);

/// BLOB and TREE dependencies mixed under one target
// NOTE: a field is named `source`, which thiserror's `Error` derive would
// treat as the error source and require to implement `std::error::Error`.
// The `source` here is a location name, not an underlying error, so the
// `Display`/`Error` impls are written by hand to keep the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocTypeError {
    pub target: String,
    pub source: String,
    pub expected: LocType,
    pub got: LocType,
}

impl fmt::Display for LocTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <= {}, expected {}, got {}",
            self.target, self.source, self.expected, self.got
        )
    }
}

impl std::error::Error for LocTypeError {}

/// A sub-path within a location
///
/// Directories get a marker entry with neither checksum nor mode; files
/// carry a real checksum and the st_mode bits. Ordering is lexicographic
/// over all three fields so path lists can be canonicalized by sorting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubPath {
    pub name: String,
    pub checksum: Option<String>,
    pub access_mode: Option<u32>,
}

impl SubPath {
    pub fn new(name: impl Into<String>, checksum: Option<String>, access_mode: Option<u32>) -> Self {
        Self {
            name: name.into(),
            checksum,
            access_mode,
        }
    }
}

impl fmt::Display for SubPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A named resource: source or installation target
#[derive(Debug, Clone, Default)]
pub struct Loc {
    /// Unique identifier: a path or URI-like string
    pub name: String,
    /// For symlink targets, the link destination
    pub real_name: Option<String>,
    /// Role in the current operation
    pub action_key: Option<ActionKey>,
    /// Resolver scheme, unset until resolved
    pub scheme: Option<String>,
    /// Names of the sources this target is built from, in declared order
    pub dep_names: Vec<String>,
    /// Installation mode, targets only
    pub mode: Option<Mode>,
    /// File or tree, set after resolution
    pub loc_type: Option<LocType>,
    /// Every sub-path under this location, for identity and verification
    pub paths: Vec<SubPath>,
    /// Opaque version token (VCS revision, commit hash)
    pub key: Option<String>,
    /// Local path where pulled content is staged
    pub cache: Option<String>,
    /// Names of the targets that consume this source
    pub used_by_names: Vec<String>,
    /// Staleness, computed during planning
    pub is_out_of_date: Option<bool>,
    /// An optional source that fails to resolve is skipped, not fatal
    pub is_optional: bool,
}

impl Loc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a sub-path entry
    pub fn add_path(
        &mut self,
        name: impl Into<String>,
        checksum: Option<String>,
        access_mode: Option<u32>,
    ) {
        self.paths.push(SubPath::new(name, checksum, access_mode));
    }

    /// Sub-paths sorted into canonical order for comparison
    pub fn sorted_paths(&self) -> Vec<SubPath> {
        let mut paths = self.paths.clone();
        paths.sort();
        paths
    }

    /// Human-readable description, used for events and error listings
    pub fn describe(&self) -> String {
        let mut desc = match &self.real_name {
            Some(real_name) if *real_name != self.name => {
                format!("{} ({})", real_name, self.name)
            }
            _ => self.name.clone(),
        };
        match self.action_key {
            Some(ActionKey::Install) if self.is_out_of_date == Some(false) => {
                desc = format!("unchanged: {}", desc);
            }
            Some(key) => {
                desc = format!("{}: {}", key.as_str(), desc);
            }
            None => {}
        }
        desc
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("auto".parse::<Mode>().unwrap(), Mode::Auto);
        assert_eq!("symlink+".parse::<Mode>().unwrap(), Mode::SymlinkPlus);
        assert_eq!(
            "bogus".parse::<Mode>().unwrap_err(),
            BadModeError("bogus".to_string())
        );
    }

    #[test]
    fn test_subpath_ordering_canonicalizes() {
        let mut loc = Loc::new("target");
        loc.add_path("b", Some("2".to_string()), Some(0o644));
        loc.add_path("a", Some("1".to_string()), Some(0o644));

        let sorted = loc.sorted_paths();
        assert_eq!(sorted[0].name, "a");
        assert_eq!(sorted[1].name, "b");
        // The original order is untouched.
        assert_eq!(loc.paths[0].name, "b");
    }

    #[test]
    fn test_describe_variants() {
        let mut loc = Loc::new("etc/app.conf");
        loc.action_key = Some(ActionKey::Install);
        loc.is_out_of_date = Some(true);
        assert_eq!(loc.describe(), "install: etc/app.conf");

        loc.is_out_of_date = Some(false);
        assert_eq!(loc.describe(), "unchanged: etc/app.conf");

        let mut link = Loc::new("current");
        link.real_name = Some("releases/v2".to_string());
        link.action_key = Some(ActionKey::Install);
        link.is_out_of_date = Some(true);
        assert_eq!(link.describe(), "install: releases/v2 (current)");
    }

    #[test]
    fn test_loc_type_error_display() {
        let err = LocTypeError {
            target: "out".to_string(),
            source: "dir/".to_string(),
            expected: LocType::Blob,
            got: LocType::Tree,
        };
        assert_eq!(err.to_string(), "out <= dir/, expected blob, got tree");
    }
}
