// src/handlers/namelist.rs

//! Handler of synthesized Fortran namelists
//!
//! A location named `namelist:GROUP` is not fetched from anywhere: its
//! content is generated from the matching `[namelist:GROUP]` configuration
//! section. A trailing `(:)` matches every section whose name starts with
//! the stem, sorted with the settings comparator so `nl(2)` precedes
//! `nl(10)`. Each section serializes as a namelist group:
//!
//! ```text
//! &GROUP
//! KEY=VALUE,
//! /
//! ```
//!
//! with environment-variable substitution applied to every value.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{HandlerContext, LocHandler};
use crate::config::{ConfigProcessError, sort_settings};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::loc::{Loc, LocType};

const SCHEME_PREFIX: &str = "namelist:";

/// Handler of namelist locations
pub struct NamelistLocHandler;

impl NamelistLocHandler {
    pub fn new() -> Self {
        Self
    }

    /// Section names matching `loc`, unsorted
    fn sections(&self, loc: &Loc, ctx: &HandlerContext<'_>) -> Result<Vec<String>> {
        let names: Vec<String> = if let Some(stem) = loc.name.strip_suffix(":)") {
            // "namelist:nl(:)" matches every section named "namelist:nl(..".
            ctx.config
                .section_names_with_prefix(stem)
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            ctx.config
                .section(&loc.name)
                .map(|_| vec![loc.name.clone()])
                .unwrap_or_default()
        };
        if names.is_empty() {
            return Err(Error::UnresolvedLocation(loc.name.clone()));
        }
        Ok(names)
    }
}

impl Default for NamelistLocHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl LocHandler for NamelistLocHandler {
    fn schemes(&self) -> &'static [&'static str] {
        &["namelist"]
    }

    fn can_pull(&self, loc: &Loc, _ctx: &HandlerContext<'_>) -> bool {
        loc.name.starts_with(SCHEME_PREFIX)
    }

    fn parse(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        loc.scheme = Some("namelist".to_string());
        loc.loc_type = Some(LocType::Blob);
        self.sections(loc, ctx)?;
        Ok(())
    }

    /// Write the namelist group(s) to the cache path
    async fn pull(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        let mut sections = self.sections(loc, ctx)?;
        if loc.name.ends_with("(:)") {
            sections.sort_by(|a, b| sort_settings(a, b));
        }
        let cache = loc
            .cache
            .clone()
            .ok_or_else(|| Error::UnresolvedLocation(loc.name.clone()))?;
        let mut handle = tokio::fs::File::create(&cache).await?;
        for section_name in &sections {
            let Some(section) = ctx.config.section(section_name) else {
                continue;
            };
            let group = group_of(section_name);
            let mut text = format!("&{}\n", group);
            for (key, node) in &section.settings {
                if node.state != crate::config::ItemState::Normal {
                    continue;
                }
                let value = ctx.subst.process(&node.value).map_err(|exc| {
                    ConfigProcessError::with_cause(
                        vec![section_name.clone(), key.clone()],
                        Some(node.value.clone()),
                        exc,
                    )
                })?;
                text.push_str(&format!("{}={},\n", key, value));
            }
            text.push_str("/\n");
            handle.write_all(text.as_bytes()).await?;
            ctx.reporter.report(&Event::NamelistGroup { text });
        }
        handle.flush().await?;
        Ok(())
    }
}

/// Group name: word characters following the `namelist:` prefix
fn group_of(section_name: &str) -> &str {
    let rest = section_name
        .strip_prefix(SCHEME_PREFIX)
        .unwrap_or(section_name);
    let end = rest
        .char_indices()
        .find(|(_i, c)| !c.is_alphanumeric() && *c != '_')
        .map(|(i, _c)| i)
        .unwrap_or(rest.len());
    &rest[..end]
}
