//! GitHub Copilot CLI: `session-state/<session id>/events.jsonl`, grouped into projects by
//! the working directory in each `session.start` event.

use std::path::{Path, PathBuf};

use thinkt_core::{CancellationToken, Project, Result, SessionMeta, Source};
use thinkt_parsers::SessionHints;

use super::{cwd_projects, cwd_sessions, parent_name, workspace, UNKNOWN_PROJECT};
use crate::store::{Store, StoreCore, StoreOptions};

pub struct CopilotStore {
    core: StoreCore,
}

impl CopilotStore {
    pub fn new(base_dir: PathBuf, options: StoreOptions) -> Self {
        let id = format!("copilot-cli-{}", thinkt_core::hostname());
        let workspace = workspace(Source::Copilot, id, "Copilot CLI", &base_dir);
        Self {
            core: StoreCore::new(base_dir, workspace, options),
        }
    }
}

impl Store for CopilotStore {
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
        parent_name(path)
    }

    fn session_project_path(&self, _path: &Path, hints: &SessionHints) -> String {
        hints
            .cwd
            .clone()
            .unwrap_or_else(|| UNKNOWN_PROJECT.to_string())
    }

    fn find_session_path(
        &self,
        _cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Option<PathBuf>> {
        let state = self.base_dir().join("session-state");
        Ok(super::child_dir(&state, session_id)
            .map(|dir| dir.join("events.jsonl"))
            .filter(|path| path.is_file()))
    }
}
