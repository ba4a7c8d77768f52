//! Gemini CLI: `tmp/<project hash>/chats/session-*.json`.
//!
//! Gemini records only a hash of the project directory, so projects are identified by the
//! hash and named after the first prompt in the project's `logs.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thinkt_core::{cancel, text, CancellationToken, Project, Result, SessionMeta, Source};
use thinkt_parsers::SessionHints;

use super::{
    child_dir, file_stem, id_file_or_hostname, list_dirs, list_files, make_project,
    read_sessions, stat_sessions, workspace,
};
use crate::store::{Store, StoreCore, StoreOptions};

const SESSION_EXTENSIONS: [&str; 2] = ["json", "jsonl"];
const NAME_CHARS: usize = 40;

#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

pub struct GeminiStore {
    core: StoreCore,
}

impl GeminiStore {
    pub fn new(base_dir: PathBuf, options: StoreOptions) -> Self {
        let id = id_file_or_hostname(&base_dir.join("installation_id"));
        let workspace = workspace(Source::Gemini, id, &thinkt_core::hostname(), &base_dir);
        Self {
            core: StoreCore::new(base_dir, workspace, options),
        }
    }

    fn tmp_dir(&self) -> PathBuf {
        self.base_dir().join("tmp")
    }

    fn session_files(&self, project_dir: &Path, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
        let files = list_files(&project_dir.join("chats"), &SESSION_EXTENSIONS, cancel)?;
        Ok(files
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("session-"))
            })
            .collect())
    }
}

/// First user message in `logs.json`, shortened for display.
fn project_name(project_dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(project_dir.join("logs.json")).ok()?;
    let logs: Vec<LogRecord> = serde_json::from_str(&raw).ok()?;
    logs.into_iter()
        .find(|log| log.kind == "user" && !log.message.trim().is_empty())
        .map(|log| text::truncate_chars(&text::single_line(&log.message), NAME_CHARS))
}

impl Store for GeminiStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn scan_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for (hash, dir) in list_dirs(&self.tmp_dir(), cancel)? {
            cancel::check(cancel)?;
            let files = self.session_files(&dir, cancel)?;
            let sessions = stat_sessions(self, cancel, &files)?;
            if sessions.is_empty() {
                continue;
            }
            let mut project =
                make_project(self, hash.clone(), dir.to_string_lossy(), &sessions);
            project.name = project_name(&dir).unwrap_or_else(|| hash.clone());
            project.display_path = format!("gemini://{}", hash.chars().take(8).collect::<String>());
            projects.push(project);
        }
        Ok(projects)
    }

    fn scan_sessions(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> Result<Vec<SessionMeta>> {
        let Some(dir) = child_dir(&self.tmp_dir(), project_id) else {
            return Ok(Vec::new());
        };
        let files = self.session_files(&dir, cancel)?;
        read_sessions(self, cancel, &files)
    }

    fn session_id(&self, path: &Path) -> Option<String> {
        file_stem(path)
    }

    fn session_project_path(&self, path: &Path, _hints: &SessionHints) -> String {
        path.parent()
            .and_then(Path::parent)
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
