//! Delete and copy session files.
//!
//! These are the only writes thinkt performs on vendor data. Sessions are located through
//! the stores, so nothing outside a store's base directory is ever touched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thinkt_core::{cancel, CancellationToken, Error, Project, Result, SessionMeta, Source};

use crate::registry::StoreRegistry;
use crate::store::Store;

/// Remove every session of `project`. Returns how many sessions were removed.
pub fn delete_project(
    registry: &StoreRegistry,
    cancel: &CancellationToken,
    project: &Project,
) -> Result<usize> {
    let store = registry
        .get(project.source)
        .ok_or(Error::SourceUnavailable(project.source))?;
    store.cache().invalidate_sessions(&project.id);
    let sessions = store.list_sessions(cancel, &project.id)?;
    let removed = remove_sessions(store, cancel, &project.id, &sessions)?;
    tracing::info!(source = %project.source, project = %project.id, removed, "deleted project");
    Ok(removed)
}

/// Remove `sessions` from disk and drop the store's listings for `project_id`. The
/// listings are dropped even when a removal fails partway.
fn remove_sessions(
    store: &dyn Store,
    cancel: &CancellationToken,
    project_id: &str,
    sessions: &[SessionMeta],
) -> Result<usize> {
    let mut removed = 0;
    let mut containers = Vec::new();
    let outcome = sessions.iter().try_for_each(|meta| {
        cancel::check(cancel)?;
        let target = removal_target(store, meta);
        remove_path(&target)?;
        if let Some(parent) = target.parent() {
            containers.push(parent.to_path_buf());
        }
        removed += 1;
        Ok::<_, Error>(())
    });
    // Directory-backed projects leave an empty directory behind; drop it if nothing else
    // lives there.
    containers.sort();
    containers.dedup();
    for dir in containers {
        if dir != store.base_dir() && fs::remove_dir(&dir).is_ok() {
            tracing::debug!(dir = %dir.display(), "removed empty project directory");
        }
    }

    store.cache().invalidate_sessions(project_id);
    store.cache().invalidate_projects();
    if let Err(err) = outcome {
        tracing::warn!(
            project = project_id,
            removed,
            error = %err,
            "project delete stopped early"
        );
        return Err(err);
    }
    Ok(removed)
}

/// Remove the session file at `path`. Returns the metadata it had.
pub fn delete_session(
    registry: &StoreRegistry,
    cancel: &CancellationToken,
    path: &Path,
) -> Result<SessionMeta> {
    let (store, meta) = registry.resolve_session_by_path(cancel, path)?;
    remove_path(&removal_target(store.as_ref(), &meta))?;
    store.reset_cache();
    tracing::info!(source = %meta.source, session = %meta.id, "deleted session");
    Ok(meta)
}

/// Copy every session file of `project` into `target_dir`, in path order. Returns the
/// number of files copied; copying nothing is an error.
pub fn copy_project(
    registry: &StoreRegistry,
    cancel: &CancellationToken,
    project: &Project,
    target_dir: &Path,
) -> Result<usize> {
    let store = registry
        .get(project.source)
        .ok_or(Error::SourceUnavailable(project.source))?;
    let mut sessions = store.list_sessions(cancel, &project.id)?;
    sessions.sort_by(|a, b| a.full_path.cmp(&b.full_path));

    let mut copied = 0;
    for meta in &sessions {
        cancel::check(cancel)?;
        copy_session(meta, target_dir)?;
        copied += 1;
    }
    if copied == 0 {
        return Err(Error::not_found("sessions for project", project.id.clone()));
    }
    Ok(copied)
}

/// Copy one session file into `target_dir` as `<session id>.<ext>`, adding `_2`, `_3`, ...
/// when the name is taken. Returns the new path.
pub fn copy_session(meta: &SessionMeta, target_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(target_dir).map_err(|err| Error::io_at("create", target_dir, err))?;
    let extension = meta
        .full_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("jsonl");
    let target = unique_target(target_dir, &meta.id, extension);
    fs::copy(&meta.full_path, &target).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            Error::not_found("session", meta.full_path.display().to_string())
        } else {
            Error::io_at("copy", &meta.full_path, err)
        }
    })?;
    Ok(target)
}

/// What to delete for a session: its directory for vendors with one directory per
/// session, otherwise the file itself.
fn removal_target(store: &dyn Store, meta: &SessionMeta) -> PathBuf {
    let per_session_dir = matches!(meta.source, Source::Kimi | Source::Copilot);
    match meta.full_path.parent() {
        Some(dir) if per_session_dir && dir != store.base_dir() => dir.to_path_buf(),
        _ => meta.full_path.clone(),
    }
}

fn remove_path(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io_at("remove", path, err)),
    }
}

fn unique_target(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{extension}"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| dir.join(format!("{stem}_{n}.{extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}
