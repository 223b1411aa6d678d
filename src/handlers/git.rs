// src/handlers/git.rs

//! Handler of Git locations
//!
//! Location names have the form `git:REMOTE::PATH::REF`, for example
//! `git:https://github.com/org/repo::etc/config/::main`. A trailing slash
//! on PATH marks a directory; the guess is verified at pull time, after
//! the checkout, when the real type is known.

use async_trait::async_trait;
use std::path::Path;

use super::{HandlerContext, LocHandler};
use crate::error::{Error, Result};
use crate::exec::Runner;
use crate::loc::{Loc, LocType};

const URI_SEPARATOR: &str = "::";

/// Least git version with usable sparse-checkout
const SPARSE_CHECKOUT_VERSION: [u32; 3] = [2, 25, 0];

/// Handler of git sub-tree locations
pub struct GitLocHandler {
    /// `None` when git is not installed; disables the handler
    git_version: Option<Vec<u32>>,
}

impl GitLocHandler {
    /// Probe the git binary once, at registry construction
    pub fn new(runner: &Runner) -> Self {
        let git_version = runner
            .which("git")
            .and_then(|_| runner.run("git", &["version"]).ok())
            .filter(|(code, _out, _err)| *code == 0)
            .map(|(_code, out, _err)| parse_version(&out));
        Self { git_version }
    }

    fn sparse_checkout_available(&self) -> bool {
        self.git_version
            .as_ref()
            .is_some_and(|v| v.as_slice() >= &SPARSE_CHECKOUT_VERSION[..])
    }

    /// Resolve a ref (branch, tag or commit hash) to a commit hash
    ///
    /// `ls-remote --exit-code` distinguishes "repository not found" from
    /// "ref not found"; a full-length hex ref is accepted as a commit hash
    /// even when the remote will not resolve it.
    fn commit_hash(&self, runner: &Runner, remote: &str, refspec: &str) -> Result<String> {
        let (code, out, err) =
            runner.run("git", &["ls-remote", "--exit-code", remote, refspec])?;
        if code != 0 && code != 2 {
            return Err(Error::UnresolvedLocation(format!(
                "ls-remote: could not locate '{}':\n{}",
                remote,
                indent(&err)
            )));
        }
        if code != 0 {
            let mut message =
                format!("ls-remote: could not find ref '{}' in '{}'", refspec, remote);
            if refspec.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
                if refspec.len() == 40 || refspec.len() == 64 {
                    // Likely a full commit hash the server will serve even
                    // though it will not advertise it.
                    return Ok(refspec.to_string());
                }
                message.push_str(": you may be using an unsupported short commit hash");
            }
            return Err(Error::UnresolvedLocation(message));
        }
        out.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::UnresolvedLocation(remote.to_string()))
    }
}

#[async_trait(?Send)]
impl LocHandler for GitLocHandler {
    fn schemes(&self) -> &'static [&'static str] {
        &["git"]
    }

    fn can_pull(&self, loc: &Loc, ctx: &HandlerContext<'_>) -> bool {
        if self.git_version.is_none() {
            return false;
        }
        let scheme = super::url_scheme(&loc.name);
        if scheme.as_deref() == Some("git") {
            return true;
        }
        if !loc.name.contains(URI_SEPARATOR) {
            return false;
        }
        // An https name is probed as a repository URL.
        let Some((remote, _path, _refspec)) = parse_name(&loc.name) else {
            return false;
        };
        scheme.as_deref() == Some("https")
            && !Path::new(&loc.name).exists()
            && ctx
                .runner
                .run("git", &["ls-remote", "--exit-code", &remote])
                .map(|(code, _out, _err)| code == 0)
                .unwrap_or(false)
    }

    fn parse(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        loc.scheme = Some("git".to_string());
        let (remote, path, refspec) = parse_name(&loc.name)
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        let commit = self.commit_hash(ctx.runner, &remote, &refspec)?;
        // Type is inferred from the trailing slash to save a clone here;
        // the pull step verifies it against the real checkout.
        loc.loc_type = Some(if path.ends_with('/') {
            LocType::Tree
        } else {
            LocType::Blob
        });
        loc.real_name = Some(format!(
            "remote:{} ref:{} commit:{} path:{}",
            remote, refspec, commit, path
        ));
        loc.key = Some(commit);
        Ok(())
    }

    async fn pull(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        if loc.real_name.is_none() {
            self.parse(loc, ctx)?;
        }
        let (remote, path, _refspec) = parse_name(&loc.name)
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        let key = loc
            .key
            .clone()
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        let cache = loc
            .cache
            .clone()
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;

        let scratch = tempfile::TempDir::new()?;
        let scratch_path = scratch.path().to_string_lossy().into_owned();
        let git_dir_opt = format!("--git-dir={}/.git", scratch_path);
        let runner = ctx.runner;

        runner.run_ok_async("git", &[&git_dir_opt, "init"]).await?;
        if self.sparse_checkout_available() && path != "./" {
            // Filtering requires uploadpack.allowFilter on the remote.
            runner
                .run_ok_async(
                    "git",
                    &[&git_dir_opt, "sparse-checkout", "set", &path, "--no-cone"],
                )
                .await?;
            runner
                .run_ok_async(
                    "git",
                    &[
                        &git_dir_opt,
                        "fetch",
                        "--depth=1",
                        "--filter=blob:none",
                        &remote,
                        &key,
                    ],
                )
                .await?;
        } else {
            runner
                .run_ok_async("git", &[&git_dir_opt, "fetch", "--depth=1", &remote, &key])
                .await?;
        }
        let work_tree_opt = format!("--work-tree={}", scratch_path);
        runner
            .run_ok_async("git", &[&git_dir_opt, &work_tree_opt, "checkout", &key])
            .await?;

        let staged = format!("{}/{}", scratch_path, path);
        let real_loc_type = if Path::new(&staged).is_dir() {
            LocType::Tree
        } else {
            LocType::Blob
        };
        if Some(real_loc_type) != loc.loc_type {
            return Err(Error::UnresolvedLocation(format!(
                "expected path '{}' to be type '{}', but it was '{}': check trailing slash",
                path,
                loc.loc_type.map(|t| t.as_str()).unwrap_or("unset"),
                real_loc_type
            )));
        }

        let mut dest = cache;
        if real_loc_type == LocType::Tree {
            dest.push('/');
        }
        let mut args: Vec<&str> = crate::exec::RSYNC_ARGS.to_vec();
        args.push(&staged);
        args.push(&dest);
        runner.run_ok_async("rsync", &args).await?;
        Ok(())
    }
}

/// Split `git:REMOTE::PATH::REF` into its parts
fn parse_name(name: &str) -> Option<(String, String, String)> {
    let rest = name.split_once(':').map(|(_, rest)| rest)?;
    let mut parts = rest.splitn(3, URI_SEPARATOR);
    let remote = parts.next()?;
    let path = parts.next()?;
    let refspec = parts.next()?;
    Some((remote.to_string(), path.to_string(), refspec.to_string()))
}

/// Prefix every non-empty line of `text` with four spaces
///
/// Mirrors the original handler's `textwrap.indent(fail, ' ' * 4)` used to
/// offset captured command output inside an error message.
fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("    {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Leading numeric components of `git version ...` output
fn parse_version(text: &str) -> Vec<u32> {
    let mut version = Vec::new();
    if let Some(last) = text.split_whitespace().last() {
        for part in last.split('.') {
            match part.parse::<u32>() {
                Ok(num) => version.push(num),
                Err(_) => break,
            }
        }
    }
    version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name() {
        let (remote, path, refspec) =
            parse_name("git:https://github.com/org/repo::etc/config/::main").unwrap();
        assert_eq!(remote, "https://github.com/org/repo");
        assert_eq!(path, "etc/config/");
        assert_eq!(refspec, "main");

        assert!(parse_name("not-a-git-name").is_none());
        assert!(parse_name("git:remote-only").is_none());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("git version 2.40.1"), vec![2, 40, 1]);
        assert_eq!(parse_version("git version 2.25.0.windows.1"), vec![2, 25, 0]);
        assert_eq!(parse_version(""), Vec::<u32>::new());
    }

    #[test]
    fn test_sparse_checkout_gate() {
        let old = GitLocHandler {
            git_version: Some(vec![2, 24, 3]),
        };
        assert!(!old.sparse_checkout_available());
        let new = GitLocHandler {
            git_version: Some(vec![2, 40, 1]),
        };
        assert!(new.sparse_checkout_available());
        let missing = GitLocHandler { git_version: None };
        assert!(!missing.sparse_checkout_available());
    }
}
