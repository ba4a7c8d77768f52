//! Qwen Code: `projects/<encoded cwd>/chats/<session id>.jsonl`.

use std::path::{Path, PathBuf};

use thinkt_core::{cancel, CancellationToken, Project, Result, SessionMeta, Source};
use thinkt_parsers::SessionHints;

use super::{
    child_dir, decode_dash_path, file_stem, id_file_or_hostname, list_dirs, list_files,
    make_project, read_sessions, stat_sessions, workspace,
};
use crate::store::{Store, StoreCore, StoreOptions};

pub struct QwenStore {
    core: StoreCore,
}

impl QwenStore {
    pub fn new(base_dir: PathBuf, options: StoreOptions) -> Self {
        let id = id_file_or_hostname(&base_dir.join("installation_id"));
        let workspace = workspace(Source::Qwen, id, &thinkt_core::hostname(), &base_dir);
        Self {
            core: StoreCore::new(base_dir, workspace, options),
        }
    }

    fn projects_dir(&self) -> PathBuf {
        self.base_dir().join("projects")
    }
}

/// Working directory for an encoded project directory name. Only dash-encoded paths can be
/// recovered; anything else is an opaque hash.
fn decode_project(encoded: &str) -> Option<String> {
    encoded.starts_with('-').then(|| decode_dash_path(encoded))
}

impl Store for QwenStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn scan_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for (name, dir) in list_dirs(&self.projects_dir(), cancel)? {
            cancel::check(cancel)?;
            let files = list_files(&dir.join("chats"), &["jsonl"], cancel)?;
            let sessions = stat_sessions(self, cancel, &files)?;
            if sessions.is_empty() {
                continue;
            }
            let project = match decode_project(&name) {
                Some(path) => {
                    let mut project = make_project(self, name, path.clone(), &sessions);
                    project.path_exists = Path::new(&path).exists();
                    project
                }
                None => {
                    let short: String = name.chars().take(8).collect();
                    let display = format!("qwen://{short}");
                    let mut project = make_project(self, name, display.clone(), &sessions);
                    project.name = short;
                    project
                }
            };
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
        let files = list_files(&dir.join("chats"), &["jsonl"], cancel)?;
        read_sessions(self, cancel, &files)
    }

    fn session_id(&self, path: &Path) -> Option<String> {
        file_stem(path)
    }

    fn session_project_path(&self, path: &Path, hints: &SessionHints) -> String {
        if let Some(cwd) = &hints.cwd {
            return cwd.clone();
        }
        let encoded = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        decode_project(encoded).unwrap_or_else(|| encoded.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CHAT: &str = concat!(
        r#"{"uuid":"u1","sessionId":"q1","type":"user","cwd":"/gone/api","message":{"role":"user","parts":[{"text":"read config"}]}}"#,
        "\n",
        r#"{"uuid":"a1","type":"assistant","model":"qwen3-coder-plus","message":{"role":"model","parts":[{"text":"Done."}]}}"#,
        "\n",
    );

    #[test]
    fn encoded_and_hashed_projects() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = dir.path().join("projects/-gone-api/chats");
        fs::create_dir_all(&encoded).unwrap();
        fs::write(encoded.join("q1.jsonl"), CHAT).unwrap();
        let hashed = dir.path().join("projects/a1b2c3d4e5f6/chats");
        fs::create_dir_all(&hashed).unwrap();
        fs::write(hashed.join("q2.jsonl"), CHAT).unwrap();

        let store = QwenStore::new(dir.path().to_path_buf(), StoreOptions::default());
        let cancel = CancellationToken::new();
        let projects = store.list_projects(&cancel).unwrap();
        assert_eq!(projects.len(), 2);

        let api = projects.iter().find(|p| p.id == "-gone-api").unwrap();
        assert_eq!(api.path, "/gone/api");
        assert_eq!(api.name, "api");
        assert!(!api.path_exists);

        let opaque = projects.iter().find(|p| p.id == "a1b2c3d4e5f6").unwrap();
        assert_eq!(opaque.display_path, "qwen://a1b2c3d4");
        assert_eq!(opaque.name, "a1b2c3d4");
        assert!(opaque.path_exists);

        let sessions = store.list_sessions(&cancel, "-gone-api").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "q1");
        assert_eq!(sessions[0].model.as_deref(), Some("qwen3-coder-plus"));
        assert_eq!(sessions[0].project_path, "/gone/api");
    }
}
