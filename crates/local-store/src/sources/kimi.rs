//! Kimi Code: `sessions/<md5(work dir)>/<session id>/context.jsonl`, with work directories
//! listed in `kimi.json`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::Deserialize;
use thinkt_core::{cancel, CancellationToken, Error, Project, Result, SessionMeta, Source};
use thinkt_parsers::SessionHints;

use super::{
    child_dir, id_file_or_hostname, list_dirs, make_project, parent_name, read_sessions,
    stat_sessions, workspace,
};
use crate::store::{ResumeInfo, Store, StoreCore, StoreOptions};

const SESSION_FILE: &str = "context.jsonl";

#[derive(Debug, Default, Deserialize)]
struct KimiJson {
    #[serde(default)]
    work_dirs: Vec<WorkDir>,
}

#[derive(Debug, Deserialize)]
struct WorkDir {
    #[serde(default)]
    path: String,
}

/// Hex MD5 of a work directory path, the name of its sessions directory.
pub fn work_dir_hash(path: &str) -> String {
    format!("{:x}", Md5::digest(path.as_bytes()))
}

pub struct KimiStore {
    core: StoreCore,
}

impl KimiStore {
    pub fn new(base_dir: PathBuf, options: StoreOptions) -> Self {
        let id = id_file_or_hostname(&base_dir.join("device_id"));
        let workspace = workspace(Source::Kimi, id, &thinkt_core::hostname(), &base_dir);
        Self {
            core: StoreCore::new(base_dir, workspace, options),
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.base_dir().join("sessions")
    }

    /// Work directories from `kimi.json`, keyed by hash.
    fn work_dirs(&self) -> HashMap<String, String> {
        let path = self.base_dir().join("kimi.json");
        let Ok(raw) = fs::read_to_string(&path) else {
            return HashMap::new();
        };
        let parsed: KimiJson = serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::debug!(path = %path.display(), error = %err, "ignoring unreadable kimi.json");
            KimiJson::default()
        });
        parsed
            .work_dirs
            .into_iter()
            .filter(|dir| !dir.path.is_empty())
            .map(|dir| (work_dir_hash(&dir.path), dir.path))
            .collect()
    }

    /// Sessions directory for a project ID, which is either a work directory or a hash.
    fn project_dir(&self, project_id: &str) -> Option<PathBuf> {
        let sessions = self.sessions_dir();
        if let Some(dir) = child_dir(&sessions, project_id).filter(|dir| dir.is_dir()) {
            return Some(dir);
        }
        Some(sessions.join(work_dir_hash(project_id))).filter(|dir| dir.is_dir())
    }

    fn session_files(&self, dir: &Path, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
        Ok(list_dirs(dir, cancel)?
            .into_iter()
            .map(|(_, session)| session.join(SESSION_FILE))
            .filter(|path| path.is_file())
            .collect())
    }
}

impl Store for KimiStore {
    fn core(&self) -> &StoreCore {
        &self.core
    }

    fn scan_projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        let work_dirs = self.work_dirs();
        let mut projects = Vec::new();
        for (hash, dir) in list_dirs(&self.sessions_dir(), cancel)? {
            cancel::check(cancel)?;
            let files = self.session_files(&dir, cancel)?;
            let sessions = stat_sessions(self, cancel, &files)?;
            if sessions.is_empty() {
                continue;
            }
            let project = match work_dirs.get(&hash) {
                Some(path) => {
                    let mut project = make_project(self, path.clone(), path.clone(), &sessions);
                    project.path_exists = Path::new(path).exists();
                    project
                }
                None => {
                    let mut project = make_project(self, hash.clone(), hash.clone(), &sessions);
                    project.name = hash.chars().take(8).collect();
                    project.display_path = format!("kimi://{}", project.name);
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
        let Some(dir) = self.project_dir(project_id) else {
            return Ok(Vec::new());
        };
        let files = self.session_files(&dir, cancel)?;
        read_sessions(self, cancel, &files)
    }

    fn session_id(&self, path: &Path) -> Option<String> {
        parent_name(path)
    }

    fn session_project_path(&self, path: &Path, hints: &SessionHints) -> String {
        let hash = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        self.work_dirs()
            .remove(&hash)
            .or_else(|| hints.cwd.clone())
            .unwrap_or(hash)
    }

    fn find_session_path(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<Option<PathBuf>> {
        for (_, dir) in list_dirs(&self.sessions_dir(), cancel)? {
            if let Some(session) = child_dir(&dir, session_id) {
                let path = session.join(SESSION_FILE);
                if path.is_file() {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    /// `kimi --session <id>` from the work directory. A project still known only by its
    /// hash has no directory to run in.
    fn resume_command(&self, meta: &SessionMeta) -> Result<Option<ResumeInfo>> {
        let dir = if Path::new(&meta.project_path).is_absolute() {
            meta.project_path.clone()
        } else {
            self.work_dirs().remove(&meta.project_path).ok_or_else(|| {
                Error::not_found("kimi work directory", meta.project_path.clone())
            })?
        };
        Ok(Some(ResumeInfo::new(
            "kimi",
            &["--session", &meta.id],
            Some(PathBuf::from(dir)),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str = concat!(
        r#"{"role":"_system_prompt","content":"You are Kimi"}"#,
        "\n",
        r#"{"role":"user","content":"list files"}"#,
        "\n",
        r#"{"role":"assistant","content":"Listing."}"#,
        "\n",
    );

    fn write_session(base: &Path, hash: &str, id: &str) {
        let dir = base.join("sessions").join(hash).join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SESSION_FILE), CONTEXT).unwrap();
    }

    #[test]
    fn hash_matches_md5_hex() {
        assert_eq!(work_dir_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(work_dir_hash("/tmp").len(), 32);
    }

    #[test]
    fn projects_from_work_dirs_and_bare_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("repo");
        fs::create_dir_all(&work).unwrap();
        let work = work.to_string_lossy().into_owned();
        let mapped = work_dir_hash(&work);
        write_session(dir.path(), &mapped, "s-1");
        write_session(dir.path(), &mapped, "s-2");
        write_session(dir.path(), "0123456789abcdef0123456789abcdef", "s-3");
        fs::write(
            dir.path().join("kimi.json"),
            format!(r#"{{"work_dirs":[{{"path":"{work}","kaos":"local"}}]}}"#),
        )
        .unwrap();
        fs::write(dir.path().join("device_id"), "dev-42\n").unwrap();

        let store = KimiStore::new(dir.path().to_path_buf(), StoreOptions::default());
        assert_eq!(store.workspace().id, "dev-42");
        let cancel = CancellationToken::new();
        let projects = store.list_projects(&cancel).unwrap();
        assert_eq!(projects.len(), 2);

        let repo = projects.iter().find(|p| p.id == work).unwrap();
        assert_eq!(repo.session_count, 2);
        assert_eq!(repo.name, "repo");
        assert!(repo.path_exists);

        let bare = projects.iter().find(|p| p.id.starts_with("0123")).unwrap();
        assert_eq!(bare.name, "01234567");
        assert_eq!(bare.display_path, "kimi://01234567");

        let sessions = store.list_sessions(&cancel, &work).unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.entry_count == 2));
        assert!(sessions.iter().all(|s| s.project_path == work));

        let by_hash = store.list_sessions(&cancel, &mapped).unwrap();
        assert_eq!(by_hash.len(), 2);

        let meta = store.get_session_meta(&cancel, "s-3").unwrap().unwrap();
        assert_eq!(meta.first_prompt, "list files");
        assert!(store.get_session_meta(&cancel, "s-9").unwrap().is_none());
    }

    #[test]
    fn resume_needs_a_known_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work = "/srv/repo";
        write_session(dir.path(), &work_dir_hash(work), "s-1");
        write_session(dir.path(), "0123456789abcdef0123456789abcdef", "s-2");
        fs::write(
            dir.path().join("kimi.json"),
            format!(r#"{{"work_dirs":[{{"path":"{work}"}}]}}"#),
        )
        .unwrap();

        let store = KimiStore::new(dir.path().to_path_buf(), StoreOptions::default());
        let cancel = CancellationToken::new();
        let meta = store.get_session_meta(&cancel, "s-1").unwrap().unwrap();
        let resume = store.resume_command(&meta).unwrap().unwrap();
        assert_eq!(resume.command_line(), "kimi --session s-1");
        assert_eq!(resume.dir, Some(PathBuf::from(work)));

        let orphan = store.get_session_meta(&cancel, "s-2").unwrap().unwrap();
        assert!(store.resume_command(&orphan).unwrap_err().is_not_found());
    }
}
