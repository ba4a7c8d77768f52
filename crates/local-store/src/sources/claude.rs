//! Claude Code: `projects/<encoded cwd>/<session id>.jsonl`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thinkt_core::{cancel, CancellationToken, Project, Result, SessionMeta, Source};
use thinkt_parsers::SessionHints;

use super::{
    child_dir, decode_dash_path, file_stem, list_dirs, list_files, make_project, read_sessions,
    stat_sessions, workspace,
};
use crate::store::{read_hints, ResumeInfo, Store, StoreCore, StoreOptions};

const INDEX_FILE: &str = "sessions-index.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionsIndex {
    #[serde(default)]
    original_path: Option<String>,
}

pub struct ClaudeStore {
    core: StoreCore,
}

impl ClaudeStore {
    pub fn new(base_dir: PathBuf, options: StoreOptions) -> Self {
        let id = stable_id(&base_dir).unwrap_or_else(thinkt_core::hostname);
        let workspace = workspace(Source::Claude, id, &thinkt_core::hostname(), &base_dir);
        Self {
            core: StoreCore::new(base_dir, workspace, options),
        }
    }

    fn projects_dir(&self) -> PathBuf {
        self.base_dir().join("projects")
    }

    /// Working directory of a project directory: the index file's `originalPath`, then the
    /// `cwd` recorded in the newest session, then the decoded directory name.
    fn project_path(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        name: &str,
        sessions: &[SessionMeta],
    ) -> Result<String> {
        if let Some(path) = original_path(dir) {
            return Ok(path);
        }
        if let Some(newest) = sessions.iter().max_by_key(|meta| meta.modified_at) {
            if let Some(cwd) = read_hints(self, cancel, newest)?.cwd {
                return Ok(cwd);
            }
        }
        Ok(decode_dash_path(name))
    }
}

/// Contents of the first `statsig/statsig.stable_id.*` file.
fn stable_id(base_dir: &Path) -> Option<String> {
    let pattern = format!(
        "{}/statsig/statsig.stable_id.*",
        glob::Pattern::escape(&base_dir.to_string_lossy())
    );
    glob::glob(&pattern)
        .ok()?
        .filter_map(std::result::Result::ok)
        .find_map(|path| thinkt_core::read_id_file(&path))
        .map(|id| id.trim_matches('"').to_string())
}

fn original_path(dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(dir.join(INDEX_FILE)).ok()?;
    match serde_json::from_str::<SessionsIndex>(&raw) {
        Ok(index) => index.original_path.filter(|path| !path.is_empty()),
        Err(err) => {
            tracing::debug!(dir = %dir.display(), error = %err, "ignoring unreadable sessions index");
            None
        }
    }
}

impl Store for ClaudeStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn scan_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for (name, dir) in list_dirs(&self.projects_dir(), cancel)? {
            cancel::check(cancel)?;
            let files = list_files(&dir, &["jsonl"], cancel)?;
            let sessions = stat_sessions(self, cancel, &files)?;
            if sessions.is_empty() {
                continue;
            }
            let path = self.project_path(cancel, &dir, &name, &sessions)?;
            let mut project = make_project(self, name, path.clone(), &sessions);
            project.path_exists = Path::new(&path).exists();
            projects.push(project);
        }
        Ok(projects)
    }

    fn scan_sessions(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<SessionMeta>> {
        let Some(dir) = child_dir(&self.projects_dir(), project_id) else {
            return Ok(Vec::new());
        };
        let files = list_files(&dir, &["jsonl"], cancel)?;
        read_sessions(self, cancel, &files)
    }

    fn session_id(&self, path: &Path) -> Option<String> {
        file_stem(path)
    }

    fn session_project_path(&self, path: &Path, hints: &SessionHints) -> String {
        if let Some(cwd) = &hints.cwd {
            return cwd.clone();
        }
        let dir = path.parent();
        dir.and_then(original_path)
            .or_else(|| {
                dir.and_then(Path::file_name)
                    .and_then(|name| name.to_str())
                    .map(decode_dash_path)
            })
            .unwrap_or_default()
    }

    fn find_session_path(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Option<PathBuf>> {
        let file_name = format!("{session_id}.jsonl");
        if child_dir(self.base_dir(), &file_name).is_none() {
            return Ok(None);
        }
        for (_, dir) in list_dirs(&self.projects_dir(), cancel)? {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// `claude --resume <id>`, run from the project directory. The index file is the
    /// ground truth there; decoded directory names are lossy for paths with dashes.
    fn resume_command(&self, meta: &SessionMeta) -> Result<Option<ResumeInfo>> {
        let dir = meta.full_path.parent();
        let project = dir
            .and_then(original_path)
            .or_else(|| Some(meta.project_path.clone()).filter(|path| !path.is_empty()))
            .or_else(|| {
                dir.and_then(Path::file_name)
                    .and_then(|name| name.to_str())
                    .map(decode_dash_path)
            })
            .filter(|path| !path.is_empty());
        Ok(Some(ResumeInfo::new(
            "claude",
            &["--resume", &meta.id],
            project.map(PathBuf::from),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thinkt_core::Role;

    const SESSION: &str = concat!(
        r#"{"type":"user","uuid":"u1","sessionId":"s1","cwd":"/nonexistent/app","timestamp":"2026-01-05T10:00:00Z","message":{"role":"user","content":"hello"}}"#,
        "\n",
        r#"{"type":"assistant","uuid":"a1","timestamp":"2026-01-05T10:00:02Z","message":{"role":"assistant","model":"claude-sonnet-4","content":[{"type":"text","text":"Hi."}]}}"#,
        "\n",
    );

    fn store(base: &Path) -> ClaudeStore {
        ClaudeStore::new(base.to_path_buf(), StoreOptions::default())
    }

    #[test]
    fn lists_projects_and_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("projects/-nonexistent-app");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("s1.jsonl"), SESSION).unwrap();
        fs::write(project.join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(dir.path().join("projects/-empty")).unwrap();

        let store = store(dir.path());
        let cancel = CancellationToken::new();
        let projects = store.list_projects(&cancel).unwrap();
        assert_eq!(projects.len(), 1);
        let project = &projects[0];
        assert_eq!(project.id, "-nonexistent-app");
        assert_eq!(project.path, "/nonexistent/app");
        assert_eq!(project.name, "app");
        assert_eq!(project.session_count, 1);
        assert!(!project.path_exists);
        assert_eq!(project.source, Source::Claude);

        let sessions = store.list_sessions(&cancel, &project.id).unwrap();
        assert_eq!(sessions.len(), 1);
        let meta = &sessions[0];
        assert_eq!(meta.id, "s1");
        assert_eq!(meta.entry_count, 2);
        assert_eq!(meta.role_count(Role::User), 1);
        assert_eq!(meta.first_prompt, "hello");
        assert_eq!(meta.project_path, "/nonexistent/app");
        assert_eq!(meta.workspace_id, store.workspace().id);

        assert!(store.list_sessions(&cancel, "../etc").unwrap().is_empty());
    }

    #[test]
    fn index_file_and_stable_id() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("projects/-srv-my-app");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("s2.jsonl"), "{\"type\":\"summary\",\"summary\":\"x\"}\n").unwrap();
        fs::write(
            project.join(INDEX_FILE),
            r#"{"version":1,"entries":[],"originalPath":"/srv/my-app"}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("statsig")).unwrap();
        fs::write(
            dir.path().join("statsig/statsig.stable_id.2656274335"),
            "\"b1c0ffee\"",
        )
        .unwrap();

        let store = store(dir.path());
        assert_eq!(store.workspace().id, "b1c0ffee");
        let projects = store.list_projects(&CancellationToken::new()).unwrap();
        assert_eq!(projects[0].path, "/srv/my-app");
        assert_eq!(projects[0].name, "my-app");
    }

    #[test]
    fn finds_and_loads_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("projects/-nonexistent-app");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("s1.jsonl"), SESSION).unwrap();

        let store = store(dir.path());
        let cancel = CancellationToken::new();
        let session = store.load_session(&cancel, "s1").unwrap().unwrap();
        assert_eq!(session.entries.len(), session.meta.entry_count);
        assert!(store.load_session(&cancel, "missing").unwrap().is_none());
        assert!(store.get_session_meta(&cancel, "../s1").unwrap().is_none());

        let by_path = store
            .get_session_meta(&cancel, &project.join("s1.jsonl").to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(by_path.id, "s1");
    }

    #[test]
    fn resume_runs_in_the_project_directory() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("projects/-nonexistent-app");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("s1.jsonl"), SESSION).unwrap();

        let store = store(dir.path());
        let cancel = CancellationToken::new();
        let meta = store.get_session_meta(&cancel, "s1").unwrap().unwrap();
        let resume = store.resume_command(&meta).unwrap().unwrap();
        assert_eq!(resume.program, "claude");
        assert_eq!(resume.args, vec!["--resume", "s1"]);
        assert_eq!(resume.dir, Some(PathBuf::from("/nonexistent/app")));
        assert_eq!(resume.command_line(), "claude --resume s1");

        fs::write(
            project.join(INDEX_FILE),
            r#"{"originalPath":"/srv/my-app-v2"}"#,
        )
        .unwrap();
        let resume = store.resume_command(&meta).unwrap().unwrap();
        assert_eq!(resume.dir, Some(PathBuf::from("/srv/my-app-v2")));
    }
}
