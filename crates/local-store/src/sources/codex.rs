//! Codex CLI: `sessions/YYYY/MM/DD/rollout-<timestamp>-<uuid>.jsonl`, grouped into projects
//! by the working directory recorded in each session header.

use std::path::{Path, PathBuf};

use thinkt_core::{cancel, CancellationToken, Project, Result, SessionMeta, Source};
use thinkt_parsers::SessionHints;

use super::{cwd_projects, cwd_sessions, file_stem, workspace, UNKNOWN_PROJECT};
use crate::store::{Store, StoreCore, StoreOptions};

pub struct CodexStore {
    core: StoreCore,
}

impl CodexStore {
    pub fn new(base_dir: PathBuf, options: StoreOptions) -> Self {
        let id = format!("codex-cli-{}", thinkt_core::hostname());
        let workspace = workspace(Source::Codex, id, "Codex CLI", &base_dir);
        Self {
            core: StoreCore::new(base_dir, workspace, options),
        }
    }
}

impl Store for CodexStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn scan_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        cwd_projects(self, cancel)
    }

    fn scan_sessions(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<SessionMeta>> {
        cwd_sessions(self, cancel, project_id)
    }

    fn session_id(&self, path: &Path) -> Option<String> {
        file_stem(path)
    }

    fn session_project_path(&self, _path: &Path, hints: &SessionHints) -> String {
        hints
            .cwd
            .clone()
            .unwrap_or_else(|| UNKNOWN_PROJECT.to_string())
    }

    /// Accepts the full file stem or the session UUID that ends it.
    fn find_session_path(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Option<PathBuf>> {
        if session_id.is_empty() {
            return Ok(None);
        }
        let suffix = format!("-{session_id}");
        for path in thinkt_parser_discovery::find_session_files(Source::Codex, self.base_dir(), cancel)? {
            cancel::check(cancel)?;
            if let Some(stem) = file_stem(&path) {
                if stem == session_id || stem.ends_with(&suffix) {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(base: &Path, rel: &str, cwd: Option<&str>, prompt: &str) {
        let path = base.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut body = String::new();
        if let Some(cwd) = cwd {
            body.push_str(&format!(
                r#"{{"timestamp":"2026-01-01T00:00:00Z","type":"session_meta","payload":{{"id":"x","cwd":"{cwd}","model_provider":"openai"}}}}"#
            ));
            body.push('\n');
        }
        body.push_str(&format!(
            r#"{{"timestamp":"2026-01-01T00:00:01Z","type":"event_msg","payload":{{"type":"user_message","message":"{prompt}"}}}}"#
        ));
        body.push('\n');
        fs::write(path, body).unwrap();
    }

    #[test]
    fn groups_sessions_by_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("work");
        fs::create_dir_all(&cwd).unwrap();
        let cwd = cwd.to_string_lossy().into_owned();
        let base = dir.path().join("codex");
        write(&base, "sessions/2026/01/01/rollout-2026-01-01T00-00-00-aaa.jsonl", Some(&cwd), "one");
        write(&base, "sessions/2026/01/02/rollout-2026-01-02T00-00-00-bbb.jsonl", Some(&cwd), "two");
        write(&base, "sessions/2026/01/03/rollout-2026-01-03T00-00-00-ccc.jsonl", None, "three");

        let store = CodexStore::new(base, StoreOptions::default());
        let cancel = CancellationToken::new();
        let projects = store.list_projects(&cancel).unwrap();
        assert_eq!(projects.len(), 2);
        let work = projects.iter().find(|p| p.id == cwd).unwrap();
        assert_eq!(work.session_count, 2);
        assert!(work.path_exists);
        let unknown = projects.iter().find(|p| p.id == UNKNOWN_PROJECT).unwrap();
        assert_eq!(unknown.session_count, 1);
        assert!(unknown.path_exists);

        let sessions = store.list_sessions(&cancel, &cwd).unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.project_path == cwd));
        assert!(sessions.iter().all(|s| s.model.as_deref() == Some("openai")));
        assert!(store.workspace().id.starts_with("codex-cli-"));
    }

    #[test]
    fn finds_sessions_by_uuid_suffix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "sessions/2026/01/01/rollout-2026-01-01T00-00-00-0199abcd.jsonl", Some("/w"), "hi");
        let store = CodexStore::new(dir.path().to_path_buf(), StoreOptions::default());
        let cancel = CancellationToken::new();
        let meta = store.get_session_meta(&cancel, "0199abcd").unwrap().unwrap();
        assert_eq!(meta.id, "rollout-2026-01-01T00-00-00-0199abcd");
        assert_eq!(meta.entry_count, 1);
        assert!(store.get_session_meta(&cancel, "nope").unwrap().is_none());
    }
}
