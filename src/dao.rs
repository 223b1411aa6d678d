// src/dao.rs

//! SQLite-backed store of location records for incremental builds
//!
//! Three tables describe what the previous run installed: `locs` (one row
//! per named location), `paths` (sub-path checksums, stored as a
//! `checksum:mode` composite string) and `dep_names` (dependency edges in
//! declaration order). The database file lives in the install root and is
//! private incremental-build state, not a public interface.
//!
//! Mutations are buffered in `delete_locs`/`update_locs` and flushed as a
//! single transaction by [`LocDao::execute_queued_items`], so a run with
//! many locations commits once. On failure the transaction rolls back and
//! the buffers are preserved for a retry.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::loc::{Loc, LocType, Mode, SubPath};

/// Database file name, relative to the install root
pub const DB_FILE_NAME: &str = ".instill-file.db";

/// Data access object for location records
pub struct LocDao {
    file_name: PathBuf,
    conn: Option<Connection>,
    /// Locations whose rows should be removed at the next flush
    pub delete_locs: Vec<Loc>,
    /// Locations whose rows should be written at the next flush
    pub update_locs: Vec<Loc>,
}

impl LocDao {
    /// Create a DAO over the database file in `root`
    pub fn new(root: &Path) -> Self {
        Self {
            file_name: root.join(DB_FILE_NAME),
            conn: None,
            delete_locs: Vec::new(),
            update_locs: Vec::new(),
        }
    }

    /// Path of the backing database file
    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            debug!("open location database: {}", self.file_name.display());
            self.conn = Some(Connection::open(&self.file_name)?);
        }
        Ok(self
            .conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection opened above")))
    }

    /// Create the tables if they do not exist; safe to call repeatedly
    pub fn create(&mut self) -> Result<()> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS locs (
                name TEXT,
                real_name TEXT,
                scheme TEXT,
                mode TEXT,
                loc_type TEXT,
                key TEXT,
                PRIMARY KEY(name)
            );

            CREATE TABLE IF NOT EXISTS paths (
                name TEXT,
                path TEXT,
                checksum TEXT,
                UNIQUE(name, path)
            );

            CREATE TABLE IF NOT EXISTS dep_names (
                name TEXT,
                dep_name TEXT,
                UNIQUE(name, dep_name)
            );
            ",
        )?;
        Ok(())
    }

    /// Reconstruct the record for `name`, or `None` if absent
    ///
    /// The returned location carries its sub-paths and its dependency
    /// names in declaration order; dependency records can be fetched by a
    /// further `select` per name.
    pub fn select(&mut self, name: &str) -> Result<Option<Loc>> {
        let conn = self.conn()?;
        let row = conn
            .prepare("SELECT real_name, scheme, mode, loc_type, key FROM locs WHERE name = ?1")?
            .query_row([name], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .optional()?;
        let Some((real_name, scheme, mode, loc_type, key)) = row else {
            return Ok(None);
        };

        let mut loc = Loc::new(name);
        loc.real_name = real_name;
        loc.scheme = scheme;
        loc.mode = mode.as_deref().and_then(|m| m.parse::<Mode>().ok());
        loc.loc_type = loc_type.as_deref().and_then(LocType::parse);
        loc.key = key;

        let mut stmt =
            conn.prepare("SELECT path, checksum FROM paths WHERE name = ?1 ORDER BY path")?;
        let paths = stmt.query_map([name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        })?;
        for entry in paths {
            let (path, composite) = entry?;
            let (checksum, access_mode) = split_checksum(composite.as_deref());
            loc.paths.push(SubPath::new(path, checksum, access_mode));
        }

        drop(stmt);
        loc.dep_names = Self::dep_names_with(conn, name)?;
        Ok(Some(loc))
    }

    /// Dependency names recorded for `name`, in declaration order
    pub fn dep_names(&mut self, name: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        Self::dep_names_with(conn, name)
    }

    fn dep_names_with(conn: &Connection, name: &str) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT dep_name FROM dep_names WHERE name = ?1 ORDER BY ROWID")?;
        let names = stmt
            .query_map([name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Flush queued deletes and updates in a single transaction
    ///
    /// Buffers are emptied only on success; a failed flush rolls back and
    /// leaves the buffers intact for a retry.
    pub fn execute_queued_items(&mut self) -> Result<()> {
        if self.delete_locs.is_empty() && self.update_locs.is_empty() {
            return Ok(());
        }
        let delete_locs = std::mem::take(&mut self.delete_locs);
        let update_locs = std::mem::take(&mut self.update_locs);
        let conn = self.conn()?;
        let result = Self::flush(conn, &delete_locs, &update_locs);
        if result.is_err() {
            self.delete_locs = delete_locs;
            self.update_locs = update_locs;
        }
        result
    }

    fn flush(conn: &mut Connection, delete_locs: &[Loc], update_locs: &[Loc]) -> Result<()> {
        let tx = conn.transaction()?;
        for table in ["locs", "dep_names", "paths"] {
            let mut stmt = tx.prepare(&format!("DELETE FROM {table} WHERE name = ?1"))?;
            for loc in delete_locs {
                stmt.execute([&loc.name])?;
            }
        }
        {
            let mut loc_stmt = tx.prepare(
                "INSERT OR REPLACE INTO locs VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut path_stmt =
                tx.prepare("INSERT OR REPLACE INTO paths VALUES (?1, ?2, ?3)")?;
            let mut dep_stmt =
                tx.prepare("INSERT OR REPLACE INTO dep_names VALUES (?1, ?2)")?;
            for loc in update_locs {
                loc_stmt.execute(params![
                    loc.name,
                    loc.real_name,
                    loc.scheme,
                    loc.mode.map(|m| m.as_str()),
                    loc.loc_type.map(|t| t.as_str()),
                    loc.key,
                ])?;
                for path in &loc.paths {
                    path_stmt.execute(params![
                        loc.name,
                        path.name,
                        join_checksum(path),
                    ])?;
                }
                for dep_name in &loc.dep_names {
                    dep_stmt.execute(params![loc.name, dep_name])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// Encode a sub-path's checksum and mode as the stored composite string
fn join_checksum(path: &SubPath) -> Option<String> {
    match (&path.checksum, path.access_mode) {
        (Some(checksum), Some(mode)) => Some(format!("{}:{}", checksum, mode)),
        _ => None,
    }
}

/// Decode the stored composite string back into checksum and mode
fn split_checksum(composite: Option<&str>) -> (Option<String>, Option<u32>) {
    let Some(composite) = composite else {
        return (None, None);
    };
    match composite.rsplit_once(':') {
        Some((checksum, mode)) => match mode.parse::<u32>() {
            Ok(mode) => (Some(checksum.to_string()), Some(mode)),
            Err(_) => (Some(composite.to_string()), None),
        },
        None => (Some(composite.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loc::ActionKey;
    use tempfile::TempDir;

    fn sample_loc() -> Loc {
        let mut loc = Loc::new("etc/app.conf");
        loc.action_key = Some(ActionKey::Install);
        loc.scheme = Some("fs".to_string());
        loc.mode = Some(Mode::Auto);
        loc.loc_type = Some(LocType::Blob);
        loc.key = Some("r42".to_string());
        loc.add_path("", Some("abc".to_string()), Some(0o100644));
        loc.dep_names = vec!["parts/a.conf".to_string(), "parts/b.conf".to_string()];
        loc
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut dao = LocDao::new(dir.path());
        dao.create().unwrap();
        dao.create().unwrap();
        assert!(dao.file_name().exists());
    }

    #[test]
    fn test_select_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let mut dao = LocDao::new(dir.path());
        dao.create().unwrap();
        assert!(dao.select("nope").unwrap().is_none());
    }

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut dao = LocDao::new(dir.path());
        dao.create().unwrap();

        dao.update_locs.push(sample_loc());
        dao.execute_queued_items().unwrap();
        assert!(dao.update_locs.is_empty());

        let loc = dao.select("etc/app.conf").unwrap().unwrap();
        assert_eq!(loc.scheme.as_deref(), Some("fs"));
        assert_eq!(loc.mode, Some(Mode::Auto));
        assert_eq!(loc.loc_type, Some(LocType::Blob));
        assert_eq!(loc.key.as_deref(), Some("r42"));
        assert_eq!(loc.paths.len(), 1);
        assert_eq!(loc.paths[0].checksum.as_deref(), Some("abc"));
        assert_eq!(loc.paths[0].access_mode, Some(0o100644));
        assert_eq!(loc.dep_names, ["parts/a.conf", "parts/b.conf"]);
    }

    #[test]
    fn test_dep_names_keep_declaration_order() {
        let dir = TempDir::new().unwrap();
        let mut dao = LocDao::new(dir.path());
        dao.create().unwrap();

        let mut loc = sample_loc();
        loc.dep_names = vec!["z".to_string(), "a".to_string(), "m".to_string()];
        dao.update_locs.push(loc);
        dao.execute_queued_items().unwrap();

        assert_eq!(dao.dep_names("etc/app.conf").unwrap(), ["z", "a", "m"]);
    }

    #[test]
    fn test_delete_removes_all_rows() {
        let dir = TempDir::new().unwrap();
        let mut dao = LocDao::new(dir.path());
        dao.create().unwrap();

        dao.update_locs.push(sample_loc());
        dao.execute_queued_items().unwrap();

        dao.delete_locs.push(Loc::new("etc/app.conf"));
        dao.execute_queued_items().unwrap();
        assert!(dao.delete_locs.is_empty());

        assert!(dao.select("etc/app.conf").unwrap().is_none());
        assert!(dao.dep_names("etc/app.conf").unwrap().is_empty());
    }

    #[test]
    fn test_update_twice_does_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let mut dao = LocDao::new(dir.path());
        dao.create().unwrap();

        dao.update_locs.push(sample_loc());
        dao.execute_queued_items().unwrap();
        dao.update_locs.push(sample_loc());
        dao.execute_queued_items().unwrap();

        let loc = dao.select("etc/app.conf").unwrap().unwrap();
        assert_eq!(loc.paths.len(), 1);
        assert_eq!(loc.dep_names.len(), 2);
    }

    #[test]
    fn test_directory_marker_composite_is_null() {
        let dir = TempDir::new().unwrap();
        let mut dao = LocDao::new(dir.path());
        dao.create().unwrap();

        let mut loc = Loc::new("data");
        loc.loc_type = Some(LocType::Tree);
        loc.add_path("", None, None);
        loc.add_path("f.txt", Some("abc".to_string()), Some(0o100644));
        dao.update_locs.push(loc);
        dao.execute_queued_items().unwrap();

        let loc = dao.select("data").unwrap().unwrap();
        let marker = loc.paths.iter().find(|p| p.name.is_empty()).unwrap();
        assert_eq!(marker.checksum, None);
        assert_eq!(marker.access_mode, None);
    }
}
