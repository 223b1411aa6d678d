// src/handlers/svn.rs

//! Handler of Subversion locations
//!
//! Identity comes from `svn info --xml`, parsed by a minimal streaming
//! collector keyed by element path (`url`, `commit:revision`, plus the
//! attributes of the `entry` element). Content is staged with
//! `svn export`. When an `fcm` wrapper is on PATH it is preferred over
//! plain `svn`.

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

use super::{HandlerContext, LocHandler};
use crate::error::{Error, Result};
use crate::exec::Runner;
use crate::loc::{Loc, LocType};

const WEB_SCHEMES: &[&str] = &["http", "https", "file"];

/// Handler of Subversion locations
pub struct SvnLocHandler {
    /// The binary to drive: `fcm` when available, else `svn`, else none
    svn: Option<String>,
}

impl SvnLocHandler {
    /// Probe for an svn-capable binary once, at registry construction
    pub fn new(runner: &Runner) -> Self {
        let svn = ["fcm", "svn"]
            .into_iter()
            .find(|cmd| runner.which(cmd).is_some())
            .map(str::to_string);
        Self { svn }
    }
}

#[async_trait(?Send)]
impl LocHandler for SvnLocHandler {
    fn schemes(&self) -> &'static [&'static str] {
        &["svn", "svn+ssh", "fcm"]
    }

    fn can_pull(&self, loc: &Loc, ctx: &HandlerContext<'_>) -> bool {
        let Some(svn) = &self.svn else {
            return false;
        };
        let Ok(url) = Url::parse(&loc.name) else {
            return false;
        };
        if self.schemes().contains(&url.scheme()) {
            return true;
        }
        WEB_SCHEMES.contains(&url.scheme())
            && !Path::new(&loc.name).exists()
            && ctx
                .runner
                .run(svn, &["info", &loc.name])
                .map(|(code, _out, _err)| code == 0)
                .unwrap_or(false)
    }

    fn parse(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        loc.scheme = Some("svn".to_string());
        let svn = self
            .svn
            .as_deref()
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        let (code, out, _err) = ctx.runner.run(svn, &["info", "--xml", &loc.name])?;
        if code != 0 {
            return Err(Error::UnresolvedLocation(loc.name.clone()));
        }
        let info = parse_svn_info(&out)
            .map_err(|_| Error::UnresolvedLocation(loc.name.clone()))?;
        let (Some(kind), Some(url), Some(revision), Some(commit_revision)) = (
            info.get("kind"),
            info.get("url"),
            info.get("revision"),
            info.get("commit:revision"),
        ) else {
            return Err(Error::UnresolvedLocation(loc.name.clone()));
        };
        loc.loc_type = Some(if kind == "dir" {
            LocType::Tree
        } else {
            LocType::Blob
        });
        loc.real_name = Some(format!("{}@{}", url, revision));
        loc.key = Some(commit_revision.clone());
        Ok(())
    }

    async fn pull(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        if loc.real_name.is_none() {
            self.parse(loc, ctx)?;
        }
        let svn = self
            .svn
            .clone()
            .unwrap_or_else(|| "svn".to_string());
        let real_name = loc
            .real_name
            .clone()
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        let cache = loc
            .cache
            .clone()
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        ctx.runner
            .run_ok_async(&svn, &["export", "-q", &real_name, &cache])
            .await?;
        Ok(())
    }
}

/// Collect a single `svn info --xml` entry into a flat map
///
/// Keys are the element path below `entry` joined with `:`
/// (`url`, `commit:revision`, `commit:author`, ...); attributes of the
/// `entry` element itself appear under their bare names (`kind`, `path`,
/// `revision`).
fn parse_svn_info(xml: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut entry: BTreeMap<String, String> = BTreeMap::new();
    let mut stack: Vec<String> = Vec::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            XmlEvent::Start(element) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                stack.push(name);
                let index = index_of(&stack);
                for attribute in element.attributes() {
                    let attribute = attribute.map_err(|e| e.to_string())?;
                    let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                    let value = attribute
                        .unescape_value()
                        .map_err(|e| e.to_string())?
                        .into_owned();
                    let full_key = if index.is_empty() {
                        key
                    } else {
                        format!("{}:{}", index, key)
                    };
                    entry.insert(full_key, value);
                }
            }
            XmlEvent::Empty(element) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                stack.push(name);
                let index = index_of(&stack);
                for attribute in element.attributes() {
                    let attribute = attribute.map_err(|e| e.to_string())?;
                    let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                    let value = attribute
                        .unescape_value()
                        .map_err(|e| e.to_string())?
                        .into_owned();
                    let full_key = if index.is_empty() {
                        key
                    } else {
                        format!("{}:{}", index, key)
                    };
                    entry.insert(full_key, value);
                }
                stack.pop();
            }
            XmlEvent::End(_) => {
                stack.pop();
            }
            XmlEvent::Text(text) => {
                let index = index_of(&stack);
                if !index.is_empty() {
                    let value = text.unescape().map_err(|e| e.to_string())?;
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        entry
                            .entry(index)
                            .or_default()
                            .push_str(trimmed);
                    }
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    Ok(entry)
}

/// Element path below the `info`/`entry` wrapper, joined with `:`
fn index_of(stack: &[String]) -> String {
    if stack.len() <= 2 {
        return String::new();
    }
    stack[2..].join(":")
}
