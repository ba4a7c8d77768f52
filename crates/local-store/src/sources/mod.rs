//! One [`Store`](crate::Store) per vendor, plus the directory helpers they share.

pub mod claude;
pub mod codex;
pub mod copilot;
pub mod gemini;
pub mod kimi;
pub mod qwen;

pub use claude::ClaudeStore;
pub use codex::CodexStore;
pub use copilot::CopilotStore;
pub use gemini::GeminiStore;
pub use kimi::KimiStore;
pub use qwen::QwenStore;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thinkt_core::{cancel, CancellationToken, Error, Project, Result, SessionMeta, Source, Workspace};

use crate::store::{read_hints, stat_session, Store, StoreOptions};

/// Project ID for sessions whose working directory is unknown.
pub const UNKNOWN_PROJECT: &str = "unknown";

/// Build the store for `source` rooted at `base_dir`.
pub fn create_store(source: Source, base_dir: PathBuf, options: StoreOptions) -> Arc<dyn Store> {
    match source {
        Source::Claude => Arc::new(ClaudeStore::new(base_dir, options)),
        Source::Codex => Arc::new(CodexStore::new(base_dir, options)),
        Source::Kimi => Arc::new(KimiStore::new(base_dir, options)),
        Source::Gemini => Arc::new(GeminiStore::new(base_dir, options)),
        Source::Copilot => Arc::new(CopilotStore::new(base_dir, options)),
        Source::Qwen => Arc::new(QwenStore::new(base_dir, options)),
    }
}

pub(crate) fn workspace(source: Source, id: String, name: &str, base_dir: &Path) -> Workspace {
    Workspace {
        id,
        name: name.to_string(),
        hostname: thinkt_core::hostname(),
        source,
        base_path: base_dir.to_path_buf(),
    }
}

/// Workspace ID from an install-identifier file, falling back to the host name.
pub(crate) fn id_file_or_hostname(path: &Path) -> String {
    thinkt_core::read_id_file(path).unwrap_or_else(thinkt_core::hostname)
}

/// Immediate subdirectories of `dir` as `(name, path)`, sorted by name. A missing `dir`
/// has none.
pub(crate) fn list_dirs(dir: &Path, cancel: &CancellationToken) -> Result<Vec<(String, PathBuf)>> {
    list_children(dir, cancel, |path| path.is_dir())
}

/// Files directly inside `dir` whose extension is one of `extensions`, sorted by path.
pub(crate) fn list_files(
    dir: &Path,
    extensions: &[&str],
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let files = list_children(dir, cancel, |path| {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
    })?;
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn list_children(
    dir: &Path,
    cancel: &CancellationToken,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<(String, PathBuf)>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io_at("read directory", dir, err)),
    };
    let mut children = Vec::new();
    for entry in read {
        cancel::check(cancel)?;
        let entry = entry.map_err(|err| Error::io_at("read directory", dir, err))?;
        let path = entry.path();
        if !keep(&path) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            children.push((name.to_string(), path));
        }
    }
    children.sort();
    Ok(children)
}

/// `base/name` when `name` is a single plain path component.
pub(crate) fn child_dir(base: &Path, name: &str) -> Option<PathBuf> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\']);
    plain.then(|| base.join(name))
}

/// File stem as a session ID.
pub(crate) fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// Name of the directory containing `path`, for vendors with one directory per session.
pub(crate) fn parent_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Stat-only metadata for `files`, enough to count sessions and date a project.
pub(crate) fn stat_sessions(
    store: &dyn Store,
    cancel: &CancellationToken,
    files: &[PathBuf],
) -> Result<Vec<SessionMeta>> {
    let mut metas = Vec::with_capacity(files.len());
    for path in files {
        cancel::check(cancel)?;
        let Some(id) = store.session_id(path) else {
            continue;
        };
        if let Some(meta) = stat_session(store.source(), &id, path)? {
            metas.push(meta);
        }
    }
    Ok(metas)
}

/// Full metadata for `files`. Unreadable files are logged and skipped; cancellation is not.
pub(crate) fn read_sessions(
    store: &dyn Store,
    cancel: &CancellationToken,
    files: &[PathBuf],
) -> Result<Vec<SessionMeta>> {
    let mut metas = Vec::with_capacity(files.len());
    for path in files {
        cancel::check(cancel)?;
        match store.read_session_meta(cancel, path) {
            Ok(Some(meta)) => metas.push(meta),
            Ok(None) => {}
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                tracing::warn!(
                    source = %store.source(),
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable session"
                );
            }
        }
    }
    Ok(metas)
}

/// Project for a directory-backed group of sessions, with the store's workspace stamped.
pub(crate) fn make_project(
    store: &dyn Store,
    id: impl Into<String>,
    path: impl Into<String>,
    sessions: &[SessionMeta],
) -> Project {
    let mut project = Project::fold_sessions(id, path, store.source(), sessions);
    project.workspace_id = store.workspace().id.clone();
    project.source_base_path = store.base_dir().to_path_buf();
    project
}

/// Group every session file by the working directory recorded inside it, for vendors
/// that keep sessions in a flat layout. Sessions with no recorded directory land in
/// [`UNKNOWN_PROJECT`].
pub(crate) fn group_by_cwd(
    store: &dyn Store,
    cancel: &CancellationToken,
) -> Result<BTreeMap<String, Vec<SessionMeta>>> {
    let files = thinkt_parser_discovery::find_session_files(store.source(), store.base_dir(), cancel)?;
    let mut groups: BTreeMap<String, Vec<SessionMeta>> = BTreeMap::new();
    for meta in stat_sessions(store, cancel, &files)? {
        let cwd = match read_hints(store, cancel, &meta) {
            Ok(hints) => hints.cwd,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                tracing::warn!(
                    source = %store.source(),
                    path = %meta.full_path.display(),
                    error = %err,
                    "skipping unreadable session"
                );
                continue;
            }
        };
        let key = cwd.unwrap_or_else(|| UNKNOWN_PROJECT.to_string());
        groups.entry(key).or_default().push(meta);
    }
    Ok(groups)
}

/// Projects from [`group_by_cwd`]. Paths are checked on disk; the unknown bucket always
/// counts as present.
pub(crate) fn cwd_projects(store: &dyn Store, cancel: &CancellationToken) -> Result<Vec<Project>> {
    let groups = group_by_cwd(store, cancel)?;
    Ok(groups
        .into_iter()
        .map(|(cwd, sessions)| {
            let mut project = make_project(store, cwd.clone(), cwd.clone(), &sessions);
            project.path_exists = cwd == UNKNOWN_PROJECT || Path::new(&cwd).exists();
            project
        })
        .collect())
}

/// Full metadata for the sessions [`group_by_cwd`] puts under `project_id`.
pub(crate) fn cwd_sessions(
    store: &dyn Store,
    cancel: &CancellationToken,
    project_id: &str,
) -> Result<Vec<SessionMeta>> {
    let mut groups = group_by_cwd(store, cancel)?;
    let files: Vec<PathBuf> = groups
        .remove(project_id)
        .unwrap_or_default()
        .into_iter()
        .map(|meta| meta.full_path)
        .collect();
    read_sessions(store, cancel, &files)
}

/// Recover a filesystem path from a directory name in which `/` (and `.`) were replaced
/// by `-`.
///
/// Dashes are ambiguous, so segments are resolved greedily against the filesystem: a
/// segment starts a new component only when the path built so far exists as a directory.
/// When the result does not exist, every dash is taken as a separator. An empty segment
/// (a doubled dash) marks a dot-prefixed component.
pub(crate) fn decode_dash_path(encoded: &str) -> String {
    let parts = dash_segments(encoded);
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut resolved = PathBuf::from("/");
    let mut pending = String::new();
    for part in &parts {
        if pending.is_empty() {
            pending.clone_from(part);
            continue;
        }
        let candidate = resolved.join(&pending);
        if candidate.is_dir() {
            resolved = candidate;
            pending.clone_from(part);
        } else {
            pending.push('-');
            pending.push_str(part);
        }
    }
    let greedy = resolved.join(pending);
    if greedy.exists() {
        return greedy.to_string_lossy().into_owned();
    }
    parts
        .iter()
        .fold(PathBuf::from("/"), |path, part| path.join(part))
        .to_string_lossy()
        .into_owned()
}

fn dash_segments(encoded: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut dot_next = false;
    for part in encoded.trim_start_matches('-').split('-') {
        if part.is_empty() {
            dot_next = true;
            continue;
        }
        if std::mem::take(&mut dot_next) {
            segments.push(format!(".{part}"));
        } else {
            segments.push(part.to_string());
        }
    }
    segments
}
