// src/handlers/fs.rs

//! Handler of filesystem locations

use async_trait::async_trait;
use std::io;

use super::{HandlerContext, LocHandler, expand_user};
use crate::error::{Error, Result};
use crate::hash::checksum_of;
use crate::loc::{BLOB_PATH, Loc, LocType};

/// Handler of plain file and directory paths
pub struct FsLocHandler;

impl FsLocHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FsLocHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl LocHandler for FsLocHandler {
    fn schemes(&self) -> &'static [&'static str] {
        &["fs"]
    }

    fn can_pull(&self, loc: &Loc, _ctx: &HandlerContext<'_>) -> bool {
        expand_user(&loc.name).exists()
    }

    fn parse(&self, loc: &mut Loc, ctx: &HandlerContext<'_>) -> Result<()> {
        loc.scheme = Some("fs".to_string());
        let path = expand_user(&loc.name);
        if !path.exists() {
            return Err(Error::UnresolvedLocation(loc.name.clone()));
        }
        let entries = checksum_of(ctx.checksum_algorithm, &path)?;
        let is_blob = entries.len() == 1 && entries[0].0 == BLOB_PATH;
        for (name, checksum, access_mode) in entries {
            loc.add_path(name, checksum, access_mode);
        }
        loc.loc_type = Some(if is_blob { LocType::Blob } else { LocType::Tree });
        Ok(())
    }

    /// No staging copy: the cache is the path itself
    async fn pull(&self, loc: &mut Loc, _ctx: &HandlerContext<'_>) -> Result<()> {
        let path = expand_user(&loc.name);
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: no such file or directory", path.display()),
            )
            .into());
        }
        loc.cache = Some(path.to_string_lossy().into_owned());
        Ok(())
    }
}
