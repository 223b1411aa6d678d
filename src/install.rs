// src/install.rs

//! The file-install processor
//!
//! Implements the `[file:TARGET]` configuration contract: each section
//! declares an installation target built from zero or more sources
//! (filesystem paths, git/svn locations, synthesized namelists), or a
//! directory (`mode=mkdir`), or a symlink (`mode=symlink`/`symlink+`).
//!
//! Processing is incremental. Source identities and target checksums from
//! the previous run are kept in a SQLite file in the install root; a
//! target is rebuilt only when it, or anything it depends on, changed.
//! Staleness propagates transitively: a target is never considered fresh
//! if any of its sources is out of date.
//!
//! Rebuilds run as a dependency graph: one pull job per distinct source,
//! one install job per stale target, executed by the cooperative scheduler
//! with concurrency bounded by the graph's fan-out. Pulled content is
//! staged in a per-run temporary cache keyed by a digest of the source
//! name, so a source shared by several targets is pulled exactly once.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::config::{ConfigProcessError, ConfigTree};
use crate::dao::LocDao;
use crate::env::VarSubst;
use crate::error::{Error as CrateError, Result};
use crate::events::{Event, Level, Reporter};
use crate::exec::{RSYNC_ARGS, Runner};
use crate::handlers::{HandlerContext, LocHandlerRegistry, expand_user};
use crate::hash::{
    ChecksumMismatch, HashAlgorithm, checksum_file, checksum_of, digest_bytes, guess_algorithm,
};
use crate::loc::{ActionKey, BLOB_PATH, Loc, LocType, LocTypeError, Mode};
use crate::scheduler::{JobContext, JobManager, JobProcessor, JobProxy, JobRunner};

/// Section-name prefix of a target declaration
pub const FILE_PREFIX: &str = "file:";

/// Environment override for the install root
pub const INSTALL_ROOT_ENV: &str = "INSTILL_ROOT";

/// Chunk size for blob concatenation
const READ_CHUNK_SIZE: usize = 4096;

/// An attempt to overwrite an existing file in no-overwrite mode
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}: file already exists (and in no-overwrite mode)")]
pub struct FileOverwriteError(pub String);

impl JobContext for Loc {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        Loc::describe(self)
    }
}

/// Options for one processor invocation
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Install root; overrides `file-install-root` and the environment
    pub root: Option<PathBuf>,
    /// Process only these targets (with or without the `file:` prefix)
    pub only: Vec<String>,
    /// Fail if a target already exists on disk
    pub no_overwrite: bool,
    /// Checksum algorithm for identity and verification
    pub checksum_algorithm: HashAlgorithm,
}

/// The `[file:*]` processor
pub struct FileInstaller<'a> {
    config: &'a ConfigTree,
    reporter: &'a dyn Reporter,
    runner: Runner,
    registry: LocHandlerRegistry,
    subst: VarSubst,
    options: InstallOptions,
}

impl<'a> FileInstaller<'a> {
    pub fn new(
        config: &'a ConfigTree,
        reporter: &'a dyn Reporter,
        options: InstallOptions,
    ) -> Self {
        let runner = Runner::new();
        let registry = LocHandlerRegistry::new(&runner);
        Self {
            config,
            reporter,
            runner,
            registry,
            subst: VarSubst::new(),
            options,
        }
    }

    fn handler_ctx(&self) -> HandlerContext<'_> {
        HandlerContext {
            config: self.config,
            runner: &self.runner,
            subst: &self.subst,
            reporter: self.reporter,
            checksum_algorithm: self.options.checksum_algorithm,
        }
    }

    /// Install files according to the `[file:*]` sections
    pub fn process(&self) -> Result<()> {
        let section_names = self.section_names()?;
        if section_names.is_empty() {
            return Ok(());
        }
        let root = self.install_root()?;
        let mut dao = LocDao::new(&root);
        dao.create()?;
        self.process_sections(&mut dao, &section_names, &root)
    }

    /// The target sections to process, honoring the `only` filter
    fn section_names(&self) -> Result<Vec<String>> {
        if self.options.only.is_empty() {
            return Ok(self
                .config
                .section_names_with_prefix(FILE_PREFIX)
                .into_iter()
                .map(str::to_string)
                .collect());
        }
        let mut names = Vec::new();
        for item in &self.options.only {
            let full = if item.starts_with(FILE_PREFIX) {
                item.clone()
            } else {
                format!("{}{}", FILE_PREFIX, item)
            };
            if self.config.section(&full).is_none() {
                return Err(ConfigProcessError::new(vec![full.clone()], Some(item.clone())).into());
            }
            names.push(full);
        }
        Ok(names)
    }

    /// Resolve the install root: option, configuration, environment, cwd
    fn install_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.options.root {
            fs::create_dir_all(root)?;
            return Ok(root.clone());
        }
        let configured = match self.config.get_top_value("file-install-root") {
            Some(value) => Some(self.subst.process(value).map_err(|exc| {
                ConfigProcessError::with_cause(
                    vec!["file-install-root".to_string()],
                    Some(value.to_string()),
                    exc,
                )
            })?),
            None => std::env::var(INSTALL_ROOT_ENV).ok(),
        };
        match configured {
            Some(dir) if !dir.is_empty() => {
                let dir = PathBuf::from(dir);
                fs::create_dir_all(&dir)?;
                Ok(dir)
            }
            _ => Ok(PathBuf::from(".")),
        }
    }

    fn process_sections(
        &self,
        dao: &mut LocDao,
        section_names: &[String],
        root: &Path,
    ) -> Result<()> {
        let mut targets: BTreeMap<String, Loc> = BTreeMap::new();
        let mut sources: BTreeMap<String, Loc> = BTreeMap::new();

        // Scan the declarations: names, modes, source lists. Bad settings
        // fail here, before any resolution work.
        for section in section_names {
            let raw_name = section.strip_prefix(FILE_PREFIX).unwrap_or(section);
            let name = self.subst.process(raw_name).map_err(|exc| {
                ConfigProcessError::with_cause(
                    vec![section.clone()],
                    Some(section.clone()),
                    exc,
                )
            })?;
            let mut target = Loc::new(&name);
            target.action_key = Some(ActionKey::Install);
            target.mode = match self.config.get_value(section, "mode") {
                Some(value) => Some(value.parse::<Mode>().map_err(|exc| {
                    ConfigProcessError::with_cause(
                        vec![section.clone(), "mode".to_string()],
                        Some(value.to_string()),
                        exc,
                    )
                })?),
                None => None,
            };

            let path = resolve_target(root, &name);
            if self.options.no_overwrite && path.exists() {
                return Err(ConfigProcessError::with_cause(
                    vec![section.clone()],
                    None,
                    FileOverwriteError(name.clone()),
                )
                .into());
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }

            // "content" is the deprecated alias of "source".
            for key in ["content", "source"] {
                let Some(raw_value) = self.config.get_value(section, key) else {
                    continue;
                };
                let value = self.subst.process(raw_value).map_err(|exc| {
                    ConfigProcessError::with_cause(
                        vec![section.clone(), key.to_string()],
                        Some(raw_value.to_string()),
                        exc,
                    )
                })?;
                for raw_source_name in expand_source_globs(&value) {
                    let (source_name, is_optional) = match strip_parens(&raw_source_name) {
                        Some(inner) => (inner.to_string(), true),
                        None => (raw_source_name.clone(), false),
                    };
                    let source_name = if source_name.starts_with('~') {
                        expand_user(&source_name).to_string_lossy().into_owned()
                    } else {
                        source_name
                    };
                    if target.mode.is_some_and(|m| m.is_symlink()) {
                        if target.real_name.is_some() {
                            // Symlink mode can only have one source.
                            return Err(ConfigProcessError::new(
                                vec![section.clone(), key.to_string()],
                                Some(value.clone()),
                            )
                            .into());
                        }
                        target.real_name = Some(source_name);
                    } else {
                        let source = sources.entry(source_name.clone()).or_insert_with(|| {
                            let mut source = Loc::new(&source_name);
                            source.action_key = Some(ActionKey::Source);
                            source.is_optional = is_optional;
                            source
                        });
                        source.used_by_names.push(name.clone());
                        target.dep_names.push(source_name);
                    }
                }
            }
            if target.real_name.is_none() && target.mode.is_some_and(|m| m.is_symlink()) {
                return Err(ConfigProcessError::new(
                    vec![section.clone(), "source".to_string()],
                    None,
                )
                .into());
            }
            targets.insert(name, target);
        }

        let config_schemes = self.config_schemes()?;

        // Resolve each source and decide whether it changed since the
        // previous run. Unresolvable optional sources are dropped from
        // their targets here, before any jobs exist.
        let source_names: Vec<String> = sources.keys().cloned().collect();
        for source_name in source_names {
            let Some(mut source) = sources.remove(&source_name) else {
                continue;
            };
            for (pattern, scheme) in &config_schemes {
                if pattern.matches(&source.name) {
                    source.scheme = Some(scheme.clone());
                    break;
                }
            }
            match self.registry.parse(&mut source, &self.handler_ctx()) {
                Ok(()) => {}
                Err(CrateError::UnresolvedLocation(_)) if source.is_optional => {
                    for user in &source.used_by_names {
                        if let Some(target) = targets.get_mut(user) {
                            target.dep_names.retain(|dep| dep != &source_name);
                        }
                        self.reporter.report(&Event::SourceSkipped {
                            target: user.clone(),
                            source: source_name.clone(),
                        });
                    }
                    continue;
                }
                Err(CrateError::UnresolvedLocation(_)) => {
                    let user = source.used_by_names.first().cloned().unwrap_or_default();
                    return Err(ConfigProcessError::new(
                        vec![format!("{}{}", FILE_PREFIX, user), "source".to_string()],
                        Some(source.name.clone()),
                    )
                    .into());
                }
                Err(other) => return Err(other),
            }
            let prev = dao.select(&source.name)?;
            source.is_out_of_date = Some(match &prev {
                None => true,
                Some(prev) => {
                    (source.key.is_none() && source.paths.is_empty())
                        || prev.scheme != source.scheme
                        || prev.loc_type != source.loc_type
                        || prev.key != source.key
                        || prev.sorted_paths() != source.sorted_paths()
                }
            });
            sources.insert(source_name, source);
        }

        // Decide target staleness; stale targets lose their recorded rows.
        let target_names: Vec<String> = targets.keys().cloned().collect();
        for name in &target_names {
            let Some(mut target) = targets.remove(name) else {
                continue;
            };
            let path = resolve_target(root, name);
            if let Some(real_name) = &target.real_name {
                let current = fs::read_link(&path).ok();
                target.is_out_of_date =
                    Some(current != Some(PathBuf::from(real_name)));
            } else if target.mode == Some(Mode::Mkdir) {
                target.is_out_of_date = Some(is_symlink(&path) || !path.is_dir());
            } else {
                if path.exists() && !is_symlink(&path) {
                    for (sub, checksum, mode) in
                        checksum_of(self.options.checksum_algorithm, &path)?
                    {
                        target.add_path(sub, checksum, mode);
                    }
                    target.paths.sort();
                }
                let prev = dao.select(name)?;
                let mut stale = is_symlink(&path) || !path.exists();
                match &prev {
                    None => stale = true,
                    Some(prev) => {
                        if prev.mode != target.mode
                            || prev.sorted_paths() != target.sorted_paths()
                        {
                            stale = true;
                        }
                    }
                }
                // A renamed or reordered source list is a rebuild even if
                // the bytes on disk happen to match.
                if !stale && dao.dep_names(name)? != target.dep_names {
                    stale = true;
                }
                // Staleness propagates from sources.
                if !stale {
                    for dep_name in &target.dep_names {
                        let dep_stale = sources
                            .get(dep_name)
                            .and_then(|source| source.is_out_of_date)
                            .unwrap_or(true);
                        if dep_stale {
                            stale = true;
                            break;
                        }
                    }
                }
                target.is_out_of_date = Some(stale);
            }
            if target.is_out_of_date == Some(true) {
                target.paths.clear();
                dao.delete_locs.push(target.clone());
            }
            targets.insert(name.clone(), target);
        }

        // Build jobs for everything out of date. Symlink and mkdir targets
        // are installed directly: they are cheap and synchronous.
        let mut jobs: BTreeMap<String, JobProxy<Loc>> = BTreeMap::new();
        for name in &target_names {
            let Some(target) = targets.get_mut(name) else {
                continue;
            };
            if target.is_out_of_date != Some(true) {
                self.reporter.report(&Event::FileUnchanged {
                    desc: target.describe(),
                });
                continue;
            }
            let path = resolve_target(root, name);
            if let Some(real_name) = target.real_name.clone() {
                if target.mode == Some(Mode::SymlinkPlus) {
                    fs::metadata(&real_name).map_err(|exc| {
                        ConfigProcessError::with_cause(
                            vec![format!("{}{}", FILE_PREFIX, name), "source".to_string()],
                            Some(real_name.clone()),
                            exc,
                        )
                    })?;
                }
                remove_existing(&path)?;
                std::os::unix::fs::symlink(&real_name, &path)?;
                debug!("symlink: {} -> {}", path.display(), real_name);
                dao.update_locs.push(target.clone());
            } else if target.mode == Some(Mode::Mkdir) {
                if is_symlink(&path) {
                    fs::remove_file(&path)?;
                }
                fs::create_dir_all(&path)?;
                target.loc_type = Some(LocType::Tree);
                target.add_path(BLOB_PATH, None, None);
                dao.update_locs.push(target.clone());
            } else if !target.dep_names.is_empty() {
                if is_symlink(&path) {
                    fs::remove_file(&path)?;
                }
                let mut proxy = JobProxy::new(target.clone());
                for dep_name in &target.dep_names {
                    if !jobs.contains_key(dep_name) {
                        let Some(source) = sources.get(dep_name) else {
                            continue;
                        };
                        jobs.insert(
                            dep_name.clone(),
                            JobProxy::new(source.clone()).with_event_level(Level::Verbose),
                        );
                    }
                    proxy.depend_on(dep_name.clone());
                }
                // Serialize installs under a shared ancestor directory.
                let mut p = Path::new(name.as_str());
                while let Some(parent) = p.parent() {
                    if parent.as_os_str().is_empty() || parent == p {
                        break;
                    }
                    let parent_name = parent.to_string_lossy();
                    if jobs.contains_key(parent_name.as_ref()) {
                        proxy.depend_on(parent_name.into_owned());
                    }
                    p = parent;
                }
                jobs.insert(name.clone(), proxy);
            } else {
                // No sources at all: an empty file.
                remove_existing(&path)?;
                fs::write(&path, b"")?;
                target.loc_type = Some(LocType::Blob);
                for (sub, checksum, mode) in
                    checksum_of(self.options.checksum_algorithm, &path)?
                {
                    target.add_path(sub, checksum, mode);
                }
                dao.update_locs.push(target.clone());
            }
        }
        dao.execute_queued_items()?;

        // Pull sources and build targets through the job graph. The DAO
        // flush after the drain runs on success and failure alike, so the
        // records reflect exactly what this run achieved.
        if !jobs.is_empty() {
            let work_dir = tempfile::tempdir()?;
            let mut manager = JobManager::new(jobs.into_values());
            let processor = InstallJobProcessor {
                installer: self,
                root,
                work_dir: work_dir.path(),
                updated: RefCell::new(Vec::new()),
                pulled: RefCell::new(BTreeMap::new()),
            };
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let run_result = runtime.block_on(JobRunner::new().run(&processor, &mut manager));
            dao.update_locs.append(&mut processor.updated.borrow_mut());
            dao.execute_queued_items()?;
            if let Err(error) = run_result {
                // A failed pull is reported against the owning target's
                // source setting.
                for (job, cause) in manager.dead_jobs() {
                    if cause.is_some()
                        && job.context.action_key == Some(ActionKey::Source)
                        && let Some(user) = job.context.used_by_names.first()
                    {
                        return Err(ConfigProcessError::new(
                            vec![format!("{}{}", FILE_PREFIX, user), "source".to_string()],
                            Some(job.context.name.clone()),
                        )
                        .into());
                    }
                }
                return Err(error);
            }
            for (name, context) in manager.into_contexts() {
                if context.action_key == Some(ActionKey::Install) {
                    targets.insert(name, context);
                }
            }
        }

        // Compare built blob checksums against declared expectations.
        for (name, target) in &targets {
            if target.real_name.is_some()
                || target.is_out_of_date != Some(true)
                || target.loc_type == Some(LocType::Tree)
            {
                continue;
            }
            let section = format!("{}{}", FILE_PREFIX, name);
            let Some(expected) = self.config.get_value(&section, "checksum") else {
                continue;
            };
            let Some(first) = target.paths.first() else {
                continue;
            };
            let recorded = first.checksum.clone().unwrap_or_default();
            if !expected.is_empty() {
                let mut checksum = recorded.clone();
                // Tolerate a record made with a different algorithm by
                // re-guessing from the expected value's length.
                if expected.len() != checksum.len()
                    && let Some(algorithm) = guess_algorithm(expected)
                {
                    checksum = checksum_file(algorithm, &resolve_target(root, name), None)?;
                }
                if expected != checksum {
                    return Err(ConfigProcessError::with_cause(
                        vec![section, "checksum".to_string()],
                        Some(expected.to_string()),
                        ChecksumMismatch {
                            expected: expected.to_string(),
                            actual: checksum,
                        },
                    )
                    .into());
                }
            }
            self.reporter.report(&Event::Checksum {
                name: name.clone(),
                checksum: recorded,
            });
        }
        Ok(())
    }

    /// The `schemes` setting: one `pattern = scheme` pair per line
    fn config_schemes(&self) -> Result<Vec<(glob::Pattern, String)>> {
        let mut schemes = Vec::new();
        let Some(text) = self.config.get_top_value("schemes") else {
            return Ok(schemes);
        };
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((pattern, scheme)) = line.split_once('=') else {
                return Err(ConfigProcessError::new(
                    vec!["schemes".to_string()],
                    Some(line.to_string()),
                )
                .into());
            };
            let pattern = glob::Pattern::new(pattern.trim()).map_err(|exc| {
                ConfigProcessError::with_cause(
                    vec!["schemes".to_string()],
                    Some(line.to_string()),
                    exc,
                )
            })?;
            schemes.push((pattern, scheme.trim().to_string()));
        }
        Ok(schemes)
    }
}

/// Job-side adapter: dispatches pulls and installs, collects results
struct InstallJobProcessor<'a> {
    installer: &'a FileInstaller<'a>,
    root: &'a Path,
    work_dir: &'a Path,
    /// Successfully processed locations, queued for the DAO after drain
    updated: RefCell<Vec<Loc>>,
    /// Pulled sources by name, read by dependent install jobs
    pulled: RefCell<BTreeMap<String, Loc>>,
}

impl InstallJobProcessor<'_> {
    /// Pull a source into its cache slot in the work directory
    async fn source_pull(&self, source: &mut Loc) -> Result<()> {
        // The slot is named by a digest of the source name: unique,
        // repeatable and filesystem-safe even for URL-ish names.
        let slot = digest_bytes(
            self.installer.options.checksum_algorithm,
            source.name.as_bytes(),
        );
        let cache = self.work_dir.join(slot);
        source.cache = Some(cache.to_string_lossy().into_owned());
        self.installer
            .registry
            .pull(source, &self.installer.handler_ctx())
            .await
    }

    /// Build a target from its pulled sources and record its checksums
    ///
    /// Blob sources concatenate in declared order; tree sources rsync over
    /// the target in declared order. The two kinds cannot mix.
    async fn target_install(&self, target: &mut Loc) -> Result<()> {
        let path = resolve_target(self.root, &target.name);
        let mut handle: Option<tokio::fs::File> = None;
        let mut mod_bits: Option<u32> = None;
        let mut is_first = true;
        for dep_name in target.dep_names.clone() {
            let source = self
                .pulled
                .borrow()
                .get(&dep_name)
                .cloned()
                .ok_or_else(|| CrateError::UnresolvedLocation(dep_name.clone()))?;
            let source_type = source
                .loc_type
                .ok_or_else(|| CrateError::UnresolvedLocation(source.name.clone()))?;
            match target.loc_type {
                None => target.loc_type = Some(source_type),
                Some(expected) if expected != source_type => {
                    return Err(LocTypeError {
                        target: target.name.clone(),
                        source: source.name.clone(),
                        expected,
                        got: source_type,
                    }
                    .into());
                }
                Some(_) => {}
            }
            let cache = source
                .cache
                .clone()
                .ok_or_else(|| CrateError::UnresolvedLocation(source.name.clone()))?;
            if target.loc_type == Some(LocType::Blob) {
                if handle.is_none() {
                    if !path.is_file() {
                        remove_existing(&path)?;
                    }
                    handle = Some(tokio::fs::File::create(&path).await?);
                }
                if let Some(out) = handle.as_mut() {
                    let mut src = tokio::fs::File::open(&cache).await?;
                    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
                    loop {
                        let n = src.read(&mut buffer).await?;
                        if n == 0 {
                            break;
                        }
                        out.write_all(&buffer[..n]).await?;
                    }
                }
                let source_mode = fs::metadata(&cache)?.permissions().mode();
                mod_bits = Some(mod_bits.unwrap_or(0) | source_mode);
            } else {
                if is_first {
                    tokio::fs::create_dir_all(&path).await?;
                }
                let src_arg = format!("{}/", cache);
                let dest_arg = path.to_string_lossy().into_owned();
                let mut args: Vec<&str> = RSYNC_ARGS.to_vec();
                args.push("--checksum");
                args.push(&src_arg);
                args.push(&dest_arg);
                self.installer.runner.run_ok_async("rsync", &args).await?;
            }
            is_first = false;
        }
        if let Some(mut out) = handle.take() {
            out.flush().await?;
        }
        if let Some(bits) = mod_bits {
            fs::set_permissions(&path, fs::Permissions::from_mode(bits & 0o7777))?;
        }

        for (sub, checksum, mode) in
            checksum_of(self.installer.options.checksum_algorithm, &path)?
        {
            target.add_path(sub, checksum, mode);
        }
        Ok(())
    }
}

impl JobProcessor for InstallJobProcessor<'_> {
    type Context = Loc;

    fn process_job<'b>(&'b self, context: &'b mut Loc) -> LocalBoxFuture<'b, Result<()>> {
        async move {
            match context.action_key {
                Some(ActionKey::Source) => self.source_pull(context).await,
                Some(ActionKey::Install) => self.target_install(context).await,
                None => Ok(()),
            }
        }
        .boxed_local()
    }

    fn post_process_job(&self, context: &Loc) {
        self.updated.borrow_mut().push(context.clone());
        if context.action_key == Some(ActionKey::Source) {
            self.pulled
                .borrow_mut()
                .insert(context.name.clone(), context.clone());
        }
    }

    fn handle_event(&self, event: Event) {
        self.installer.reporter.report(&event);
    }
}

/// Expand whitespace-separated source globs
///
/// A glob that matches nothing is kept verbatim as a literal name, which
/// tolerates sources that do not exist locally (remote locations,
/// namelists). Parenthesized names keep their parentheses so optionality
/// survives the expansion.
fn expand_source_globs(value: &str) -> Vec<String> {
    let mut names = Vec::new();
    for raw_glob in value.split_whitespace() {
        let glob_str = strip_parens(raw_glob).unwrap_or(raw_glob);
        let mut matched: Vec<String> = match glob::glob(glob_str) {
            Ok(paths) => paths
                .filter_map(|entry| entry.ok())
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        if matched.is_empty() {
            names.push(raw_glob.to_string());
        } else {
            matched.sort();
            names.extend(matched);
        }
    }
    names
}

/// The inside of a `(...)`-wrapped name, if it is wrapped
fn strip_parens(name: &str) -> Option<&str> {
    name.strip_prefix('(')?.strip_suffix(')')
}

/// Absolute names stand alone; relative names live under the root
fn resolve_target(root: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Remove whatever occupies `path`, if anything
fn remove_existing(path: &Path) -> std::io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}
