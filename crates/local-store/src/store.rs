//! The per-vendor store contract and the metadata scan every store shares.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thinkt_core::path::{clean_path, is_path_within};
use thinkt_core::{
    cancel, text, CancellationToken, Entry, Error, LineReader, Project, Result, Role, Session,
    SessionMeta, Source, Workspace, DEFAULT_MAX_LINE_BYTES,
};
use thinkt_parsers::{parser_for, BoxedInput, EntryParser, ParseContext, SessionHints};
use thinkt_runtime_config::ThinktConfig;

use crate::cache::StoreCache;

/// Tunables every store receives from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// `None` keeps listings until they are invalidated.
    pub cache_ttl: Option<Duration>,
    pub max_line_bytes: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Some(Duration::from_secs(60)),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &ThinktConfig) -> Self {
        Self {
            cache_ttl: config.cache.ttl(),
            max_line_bytes: config.reader.max_line_bytes,
        }
    }
}

/// How to reopen a session in the vendor CLI that recorded it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResumeInfo {
    /// Executable name, looked up on `PATH` when run.
    pub program: String,
    pub args: Vec<String>,
    /// Directory to run in; `None` keeps the caller's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl ResumeInfo {
    pub fn new(program: &str, args: &[&str], dir: Option<PathBuf>) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            dir,
        }
    }

    /// The command line as a user would type it.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// State shared by every store implementation: where the data lives, who produced it and
/// the listing cache.
#[derive(Debug)]
pub struct StoreCore {
    base_dir: PathBuf,
    workspace: Workspace,
    options: StoreOptions,
    cache: StoreCache,
}

impl StoreCore {
    pub fn new(base_dir: PathBuf, workspace: Workspace, options: StoreOptions) -> Self {
        let cache = StoreCache::new(options.cache_ttl);
        Self {
            base_dir,
            workspace,
            options,
            cache,
        }
    }
}

/// A vendor's session files, viewed as projects and sessions.
///
/// Implementations provide the directory walk (`scan_*`) and the mapping from a session
/// file to its ID and project. Listing, caching, lookups and loading are shared.
pub trait Store: Send + Sync {
    fn core(&self) -> &StoreCore;

    /// Walk the data directory and build every project. Uncached.
    fn scan_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>>;

    /// Full metadata for every session of `project_id`. Unknown projects yield nothing.
    fn scan_sessions(&self, cancel: &CancellationToken, project_id: &str)
        -> Result<Vec<SessionMeta>>;

    /// Session ID for a session file, or `None` if `path` is not one of ours.
    fn session_id(&self, path: &Path) -> Option<String>;

    /// Project path recorded on a session's metadata.
    fn session_project_path(&self, path: &Path, hints: &SessionHints) -> String;

    /// Locate a session file by ID.
    fn find_session_path(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Option<PathBuf>> {
        for path in thinkt_parser_discovery::find_session_files(self.source(), self.base_dir(), cancel)? {
            cancel::check(cancel)?;
            if self.session_id(&path).as_deref() == Some(session_id) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Command that resumes `meta` in its vendor CLI. Vendors without a resume flag
    /// return `None`.
    fn resume_command(&self, _meta: &SessionMeta) -> Result<Option<ResumeInfo>> {
        Ok(None)
    }

    fn source(&self) -> Source {
        self.core().workspace.source
    }

    fn workspace(&self) -> &Workspace {
        &self.core().workspace
    }

    fn base_dir(&self) -> &Path {
        &self.core().base_dir
    }

    fn options(&self) -> &StoreOptions {
        &self.core().options
    }

    fn cache(&self) -> &StoreCache {
        &self.core().cache
    }

    /// Vendor parser over `input`, stamped with this store's workspace.
    fn open_parser(
        &self,
        meta: &SessionMeta,
        input: BoxedInput,
        cancel: Option<&CancellationToken>,
    ) -> Box<dyn EntryParser> {
        let ctx = ParseContext::new(meta.id.clone(), self.source(), self.workspace().id.clone());
        let mut lines = LineReader::with_max_line_bytes(input, self.options().max_line_bytes);
        lines.set_cancel(cancel.cloned());
        parser_for(self.source(), ctx, lines)
    }

    fn list_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        self.cache().load_projects(|| self.scan_projects(cancel))
    }

    fn get_project(&self, cancel: &CancellationToken, project_id: &str) -> Result<Option<Project>> {
        Ok(self
            .list_projects(cancel)?
            .into_iter()
            .find(|project| project.id == project_id))
    }

    /// Sessions of a project, most recently modified first.
    fn list_sessions(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<SessionMeta>> {
        self.cache().load_sessions(project_id, || {
            let mut sessions = self.scan_sessions(cancel, project_id)?;
            sort_sessions(&mut sessions);
            Ok(sessions)
        })
    }

    /// Metadata by session ID, or by absolute path to the session file.
    fn get_session_meta(
        &self,
        cancel: &CancellationToken,
        id_or_path: &str,
    ) -> Result<Option<SessionMeta>> {
        let as_path = Path::new(id_or_path);
        if as_path.is_absolute() {
            return self.session_meta_at(cancel, as_path);
        }
        match self.find_session_path(cancel, id_or_path)? {
            Some(path) => self.read_session_meta(cancel, &path),
            None => Ok(None),
        }
    }

    /// Metadata for the session file at `path`. Paths outside this store's base directory,
    /// or not shaped like one of its session files, yield `None` without being read.
    fn session_meta_at(&self, cancel: &CancellationToken, path: &Path) -> Result<Option<SessionMeta>> {
        let path = clean_path(path);
        if !is_path_within(&path, &clean_path(self.base_dir()))
            || !thinkt_parser_discovery::is_session_path(self.source(), self.base_dir(), &path)
        {
            return Ok(None);
        }
        self.read_session_meta(cancel, &path)
    }

    /// Stat and scan one session file. A file that vanished yields `None`.
    fn read_session_meta(
        &self,
        cancel: &CancellationToken,
        path: &Path,
    ) -> Result<Option<SessionMeta>> {
        let Some(id) = self.session_id(path) else {
            return Ok(None);
        };
        let Some(mut meta) = stat_session(self.source(), &id, path)? else {
            return Ok(None);
        };
        meta.workspace_id = self.workspace().id.clone();
        let Some(file) = open_file(path)? else {
            return Ok(None);
        };
        let mut parser = self.open_parser(&meta, Box::new(file), Some(cancel));
        let hints = scan_session_meta(parser.as_mut(), &mut meta)?;
        meta.project_path = self.session_project_path(path, &hints);
        Ok(Some(meta))
    }

    fn load_session(&self, cancel: &CancellationToken, session_id: &str) -> Result<Option<Session>> {
        let Some(meta) = self.get_session_meta(cancel, session_id)? else {
            return Ok(None);
        };
        let Some(file) = open_file(&meta.full_path)? else {
            return Ok(None);
        };
        let mut parser = self.open_parser(&meta, Box::new(file), Some(cancel));
        let entries = thinkt_parsers::collect_entries(parser.as_mut())?;
        Ok(Some(Session { meta, entries }))
    }

    /// Stream a session's entries. Fails with [`Error::NotFound`] if the session is gone.
    fn open_session(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Box<dyn SessionReader>> {
        let meta = self
            .get_session_meta(cancel, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        let file = open_file(&meta.full_path)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        let parser = self.open_parser(&meta, Box::new(file), Some(cancel));
        Ok(Box::new(ParserReader {
            meta,
            parser: Some(parser),
        }))
    }

    fn reset_cache(&self) {
        self.cache().reset();
    }
}

/// Sequential reader over one session.
pub trait SessionReader: Send {
    /// Next entry, or `None` at the end of the session.
    fn read_next(&mut self) -> Result<Option<Entry>>;

    fn metadata(&self) -> &SessionMeta;

    /// Release the underlying file. Further reads fail with [`Error::Closed`].
    fn close(&mut self) -> Result<()>;
}

struct ParserReader {
    meta: SessionMeta,
    parser: Option<Box<dyn EntryParser>>,
}

impl SessionReader for ParserReader {
    fn read_next(&mut self) -> Result<Option<Entry>> {
        match self.parser.as_mut() {
            Some(parser) => parser.next_entry(),
            None => Err(Error::Closed),
        }
    }

    fn metadata(&self) -> &SessionMeta {
        &self.meta
    }

    fn close(&mut self) -> Result<()> {
        self.parser = None;
        Ok(())
    }
}

/// Most recently modified first; ties broken by ID so listings are stable.
pub fn sort_sessions(sessions: &mut [SessionMeta]) {
    sessions.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Open a file for reading; a missing file is `None`.
pub(crate) fn open_file(path: &Path) -> Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::io_at("open", path, err)),
    }
}

/// Size and modification time of a session file, without reading it.
pub(crate) fn stat_session(source: Source, id: &str, path: &Path) -> Result<Option<SessionMeta>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::io_at("stat", path, err)),
    };
    let mut meta = SessionMeta::new(id, path, source);
    meta.file_size = metadata.len();
    meta.modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
    Ok(Some(meta))
}

/// Drive `parser` to the end, folding every entry into `meta`.
///
/// Entries are counted and dropped as they arrive, so `entry_count` matches what a full
/// load yields. Returns the parser's final hints with `cwd` filled from the entries when
/// the vendor has no session header.
pub fn scan_session_meta(
    parser: &mut dyn EntryParser,
    meta: &mut SessionMeta,
) -> Result<SessionHints> {
    let mut first_timestamp = None;
    let mut entry_cwd = None;
    while let Some(entry) = parser.next_entry()? {
        meta.entry_count += 1;
        *meta.role_counts.entry(entry.role).or_insert(0) += 1;
        if meta.first_prompt.is_empty() && entry.role == Role::User {
            let prompt = entry.text_content();
            if !prompt.trim().is_empty() {
                meta.first_prompt = text::preview(&prompt);
            }
        }
        if meta.model.is_none() {
            meta.model = entry.model.filter(|model| !model.is_empty());
        }
        if meta.git_branch.is_none() {
            meta.git_branch = entry.git_branch.filter(|branch| !branch.is_empty());
        }
        if first_timestamp.is_none() {
            first_timestamp = entry.timestamp;
        }
        if entry_cwd.is_none() {
            entry_cwd = entry.cwd.filter(|cwd| !cwd.is_empty());
        }
    }

    let mut hints = parser.hints().clone();
    if meta.model.is_none() {
        meta.model = hints.model_label().map(str::to_string);
    }
    if meta.git_branch.is_none() {
        meta.git_branch.clone_from(&hints.git_branch);
    }
    meta.created_at = hints.started_at.or(first_timestamp);
    if hints.cwd.is_none() {
        hints.cwd = entry_cwd;
    }
    Ok(hints)
}

/// Read just far enough into a session to learn its working directory.
pub(crate) fn read_hints(
    store: &dyn Store,
    cancel: &CancellationToken,
    meta: &SessionMeta,
) -> Result<SessionHints> {
    let Some(file) = open_file(&meta.full_path)? else {
        return Ok(SessionHints::default());
    };
    let mut parser = store.open_parser(meta, Box::new(file), Some(cancel));
    let mut entry_cwd = None;
    while parser.hints().cwd.is_none() && entry_cwd.is_none() {
        match parser.next_entry()? {
            Some(entry) => entry_cwd = entry.cwd.filter(|cwd| !cwd.is_empty()),
            None => break,
        }
    }
    let mut hints = parser.hints().clone();
    if hints.cwd.is_none() {
        hints.cwd = entry_cwd;
    }
    Ok(hints)
}
