// src/handlers/mod.rs

//! Location handlers
//!
//! Each handler resolves one family of location names: plain filesystem
//! paths, git sub-trees, Subversion URLs, and synthesized Fortran
//! namelists. The capability contract is three operations:
//!
//! - `can_pull`: can this handler take the location (scheme match, binary
//!   availability, or probing a string as a repository URL)?
//! - `parse`: determine scheme, type, identity and checksums without
//!   necessarily staging content.
//! - `pull`: stage the content into the location's cache path so target
//!   builds can consume every origin uniformly.
//!
//! Handlers live in an explicit [`LocHandlerRegistry`] built once per
//! operation from the fixed variant set; adding a scheme means adding a
//! variant here.

mod fs;
mod git;
mod namelist;
mod svn;

pub use fs::FsLocHandler;
pub use git::GitLocHandler;
pub use namelist::NamelistLocHandler;
pub use svn::SvnLocHandler;

use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

use crate::config::ConfigTree;
use crate::env::VarSubst;
use crate::error::{Error, Result};
use crate::events::Reporter;
use crate::exec::Runner;
use crate::hash::HashAlgorithm;
use crate::loc::Loc;

/// Everything a handler may need while parsing or pulling
pub struct HandlerContext<'a> {
    pub config: &'a ConfigTree,
    pub runner: &'a Runner,
    pub subst: &'a VarSubst,
    pub reporter: &'a dyn Reporter,
    pub checksum_algorithm: HashAlgorithm,
}

/// Per-scheme resolution strategy
#[async_trait(?Send)]
pub trait LocHandler {
    /// Scheme names this handler answers to
    fn schemes(&self) -> &'static [&'static str];

    /// Whether this handler can resolve and stage `loc`
    fn can_pull(&self, loc: &Loc, ctx: &HandlerContext<'_>) -> bool;

    /// Resolve scheme, type and identity; mutates `loc` in place
    fn parse(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()>;

    /// Stage content into `loc.cache`
    async fn pull(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()>;
}

/// Fixed registry of the known handlers
pub struct LocHandlerRegistry {
    handlers: Vec<Box<dyn LocHandler>>,
}

impl LocHandlerRegistry {
    /// Scheme assumed for names with no scheme of their own
    pub const DEFAULT_SCHEME: &'static str = "fs";

    /// Build the registry, probing tool availability once
    pub fn new(runner: &Runner) -> Self {
        Self {
            handlers: vec![
                Box::new(FsLocHandler::new()),
                Box::new(GitLocHandler::new(runner)),
                Box::new(SvnLocHandler::new(runner)),
                Box::new(NamelistLocHandler::new()),
            ],
        }
    }

    fn by_scheme(&self, scheme: &str) -> Option<&dyn LocHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.schemes().contains(&scheme))
            .map(|handler| handler.as_ref())
    }

    fn guess(&self, loc: &Loc, ctx: &HandlerContext<'_>) -> Option<&dyn LocHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.can_pull(loc, ctx))
            .map(|handler| handler.as_ref())
    }

    /// Select the handler for `loc`
    ///
    /// An explicit scheme must match a handler; otherwise the name's URL
    /// scheme is sniffed, falling back to probing each handler, and a name
    /// with no scheme at all is taken as a filesystem path.
    fn choose(&self, loc: &Loc, ctx: &HandlerContext<'_>) -> Result<&dyn LocHandler> {
        if let Some(scheme) = &loc.scheme {
            return self
                .by_scheme(scheme)
                .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()));
        }
        match url_scheme(&loc.name) {
            Some(scheme) => self
                .by_scheme(&scheme)
                .or_else(|| self.guess(loc, ctx))
                .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone())),
            None => self
                .by_scheme(Self::DEFAULT_SCHEME)
                .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone())),
        }
    }

    /// Resolve `loc` via its handler
    pub fn parse(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        self.choose(loc, ctx)?.parse(loc, ctx)
    }

    /// Stage `loc` into its cache, parsing first if necessary
    pub async fn pull(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        if loc.scheme.is_none() {
            self.parse(loc, ctx)?;
        }
        let scheme = loc
            .scheme
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_SCHEME.to_string());
        let handler = self
            .by_scheme(&scheme)
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        handler.pull(loc, ctx).await
    }
}

/// URL scheme of a location name, if it has one
pub(crate) fn url_scheme(name: &str) -> Option<String> {
    Url::parse(name).ok().map(|url| url.scheme().to_string())
}

/// Expand a leading `~/` to the user's home directory
pub(crate) fn expand_user(name: &str) -> PathBuf {
    if let Some(rest) = name.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if name == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingReporter;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn context<'a>(
        config: &'a ConfigTree,
        runner: &'a Runner,
        subst: &'a VarSubst,
        reporter: &'a CollectingReporter,
    ) -> HandlerContext<'a> {
        HandlerContext {
            config,
            runner,
            subst,
            reporter,
            checksum_algorithm: HashAlgorithm::Md5,
        }
    }

    #[test]
    fn test_plain_path_selects_fs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        stdfs::write(&path, b"x").unwrap();

        let config = ConfigTree::new();
        let runner = Runner::new();
        let subst = VarSubst::new();
        let reporter = CollectingReporter::new();
        let ctx = context(&config, &runner, &subst, &reporter);

        let registry = LocHandlerRegistry::new(&runner);
        let mut loc = Loc::new(path.to_string_lossy().into_owned());
        registry.parse(&mut loc, &ctx).unwrap();
        assert_eq!(loc.scheme.as_deref(), Some("fs"));
    }

    #[test]
    fn test_namelist_scheme_sniffed_from_name() {
        let config = ConfigTree::parse("[namelist:nl]\nalpha=1\n").unwrap();
        let runner = Runner::new();
        let subst = VarSubst::new();
        let reporter = CollectingReporter::new();
        let ctx = context(&config, &runner, &subst, &reporter);

        let registry = LocHandlerRegistry::new(&runner);
        let mut loc = Loc::new("namelist:nl");
        registry.parse(&mut loc, &ctx).unwrap();
        assert_eq!(loc.scheme.as_deref(), Some("namelist"));
    }

    #[test]
    fn test_unknown_explicit_scheme_is_unresolved() {
        let config = ConfigTree::new();
        let runner = Runner::new();
        let subst = VarSubst::new();
        let reporter = CollectingReporter::new();
        let ctx = context(&config, &runner, &subst, &reporter);

        let registry = LocHandlerRegistry::new(&runner);
        let mut loc = Loc::new("whatever");
        loc.scheme = Some("carrier-pigeon".to_string());
        let err = registry.parse(&mut loc, &ctx).unwrap_err();
        assert!(matches!(err, Error::UnresolvedLocation(name) if name == "whatever"));
    }

    #[test]
    fn test_missing_fs_source_is_unresolved() {
        let config = ConfigTree::new();
        let runner = Runner::new();
        let subst = VarSubst::new();
        let reporter = CollectingReporter::new();
        let ctx = context(&config, &runner, &subst, &reporter);

        let registry = LocHandlerRegistry::new(&runner);
        let mut loc = Loc::new("definitely/not/here.txt");
        let err = registry.parse(&mut loc, &ctx).unwrap_err();
        assert!(matches!(err, Error::UnresolvedLocation(_)));
    }

    #[test]
    fn test_expand_user() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_user("~/x"), home.join("x"));
            assert_eq!(expand_user("~"), home);
        }
        assert_eq!(expand_user("plain/path"), PathBuf::from("plain/path"));
    }
}
