//! All configured stores behind one lookup surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thinkt_core::path::{clean_path, is_path_within};
use thinkt_core::{CancellationToken, Error, Project, Result, SessionMeta, Source};
use thinkt_runtime_config::DEFAULT_INITIAL_LOAD_BYTES;

use crate::lazy::{open_lazy, LazySession};
use crate::store::Store;

/// Which projects [`StoreRegistry::list_all_projects`] returns.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    /// Keep projects whose directory no longer exists.
    pub include_deleted: bool,
    /// Restrict to these sources; empty means every registered source.
    pub sources: Vec<Source>,
}

impl ProjectFilter {
    fn wants(&self, source: Source) -> bool {
        self.sources.is_empty() || self.sources.contains(&source)
    }
}

/// Status line for one registered source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub source: Source,
    pub description: &'static str,
    pub base_path: PathBuf,
    pub available: bool,
    pub project_count: usize,
    pub workspace_id: String,
}

/// Immutable set of stores, at most one per source, in registration order.
pub struct StoreRegistry {
    stores: Vec<Arc<dyn Store>>,
    initial_load_bytes: u64,
}

#[derive(Default)]
pub struct StoreRegistryBuilder {
    stores: Vec<Arc<dyn Store>>,
    initial_load_bytes: Option<u64>,
}

impl StoreRegistryBuilder {
    /// Add a store. A store already registered for the same source is replaced.
    pub fn register(mut self, store: Arc<dyn Store>) -> Self {
        let source = store.source();
        match self.stores.iter().position(|s| s.source() == source) {
            Some(index) => self.stores[index] = store,
            None => self.stores.push(store),
        }
        self
    }

    /// Bytes preloaded by [`StoreRegistry::open_lazy_session_by_path`].
    pub fn initial_load_bytes(mut self, bytes: u64) -> Self {
        self.initial_load_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> StoreRegistry {
        StoreRegistry {
            stores: self.stores,
            initial_load_bytes: self.initial_load_bytes.unwrap_or(DEFAULT_INITIAL_LOAD_BYTES),
        }
    }
}

impl StoreRegistry {
    pub fn builder() -> StoreRegistryBuilder {
        StoreRegistryBuilder::default()
    }

    pub fn get(&self, source: Source) -> Option<&dyn Store> {
        self.get_arc(source).map(|store| store.as_ref())
    }

    pub fn get_arc(&self, source: Source) -> Option<&Arc<dyn Store>> {
        self.stores.iter().find(|store| store.source() == source)
    }

    pub fn all(&self) -> &[Arc<dyn Store>] {
        &self.stores
    }

    pub fn sources(&self) -> Vec<Source> {
        self.stores.iter().map(|store| store.source()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Projects of every selected store, concatenated in registration order.
    ///
    /// A store that fails to list is logged and skipped so one broken vendor directory does
    /// not hide the others. Cancellation aborts the whole listing.
    pub fn list_all_projects(
        &self,
        cancel: &CancellationToken,
        filter: &ProjectFilter,
    ) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for store in self.stores.iter().filter(|store| filter.wants(store.source())) {
            match store.list_projects(cancel) {
                Ok(listed) => projects.extend(
                    listed
                        .into_iter()
                        .filter(|project| filter.include_deleted || project.path_exists),
                ),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::warn!(source = %store.source(), error = %err, "failed to list projects");
                }
            }
        }
        Ok(projects)
    }

    pub fn source_status(&self, cancel: &CancellationToken) -> Result<Vec<SourceInfo>> {
        let mut infos = Vec::with_capacity(self.stores.len());
        for store in &self.stores {
            let available = store.base_dir().is_dir();
            let project_count = if available {
                match store.list_projects(cancel) {
                    Ok(projects) => projects.len(),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(err) => {
                        tracing::warn!(source = %store.source(), error = %err, "failed to count projects");
                        0
                    }
                }
            } else {
                0
            };
            infos.push(SourceInfo {
                source: store.source(),
                description: store.source().description(),
                base_path: store.base_dir().to_path_buf(),
                available,
                project_count,
                workspace_id: store.workspace().id.clone(),
            });
        }
        Ok(infos)
    }

    /// Registered sources whose data directory exists.
    pub fn available_sources(&self) -> Vec<Source> {
        self.stores
            .iter()
            .filter(|store| store.base_dir().is_dir())
            .map(|store| store.source())
            .collect()
    }

    /// Find the store owning the session file at `path` and read its metadata.
    ///
    /// Only stores whose base directory contains the path are asked.
    pub fn resolve_session_by_path(
        &self,
        cancel: &CancellationToken,
        path: &Path,
    ) -> Result<(Arc<dyn Store>, SessionMeta)> {
        let path = clean_path(path);
        for store in &self.stores {
            if !is_path_within(&path, &clean_path(store.base_dir())) {
                continue;
            }
            if let Some(meta) = store.session_meta_at(cancel, &path)? {
                return Ok((Arc::clone(store), meta));
            }
        }
        Err(Error::not_found("session", path.display().to_string()))
    }

    /// Find a project by ID, path or trailing path components, across every source.
    ///
    /// Exact ID or path matches win over suffix matches. Matches in more than one source
    /// are ambiguous; within one source the most recently active project wins.
    pub fn resolve_project(&self, cancel: &CancellationToken, query: &str) -> Result<Project> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::not_found("project", query));
        }
        let projects = self.list_all_projects(
            cancel,
            &ProjectFilter {
                include_deleted: true,
                sources: Vec::new(),
            },
        )?;

        let query_path = Path::new(query);
        let exact: Vec<&Project> = projects
            .iter()
            .filter(|project| {
                project.id == query
                    || project.path == query
                    || (query_path.is_absolute()
                        && clean_path(Path::new(&project.path)) == clean_path(query_path))
            })
            .collect();
        let candidates = if exact.is_empty() {
            let wanted = query.trim_end_matches('/');
            projects
                .iter()
                .filter(|project| !wanted.is_empty() && Path::new(&project.path).ends_with(wanted))
                .collect()
        } else {
            exact
        };

        let mut sources: Vec<Source> = candidates.iter().map(|project| project.source).collect();
        sources.sort();
        sources.dedup();
        match sources.len() {
            0 => Err(Error::not_found("project", query)),
            1 => candidates
                .into_iter()
                .max_by_key(|project| project.last_modified)
                .cloned()
                .ok_or_else(|| Error::not_found("project", query)),
            _ => Err(Error::Ambiguous {
                query: query.to_string(),
                sources,
            }),
        }
    }

    /// The project whose directory most specifically contains `path`.
    pub fn find_project_for_path(
        &self,
        cancel: &CancellationToken,
        path: &Path,
    ) -> Result<Option<Project>> {
        let path = clean_path(path);
        let projects = self.list_all_projects(cancel, &ProjectFilter::default())?;
        Ok(projects
            .into_iter()
            .filter(|project| {
                let root = Path::new(&project.path);
                root.is_absolute() && is_path_within(&path, &clean_path(root))
            })
            .max_by_key(|project| project.path.len()))
    }

    /// Open the session file at `path` for incremental reading, preloading the configured
    /// number of bytes.
    pub fn open_lazy_session_by_path(
        &self,
        cancel: &CancellationToken,
        path: &Path,
    ) -> Result<LazySession> {
        let (store, meta) = self.resolve_session_by_path(cancel, path)?;
        let mut session = open_lazy(meta, |meta, file| {
            store.open_parser(meta, Box::new(file), None)
        })?;
        if self.initial_load_bytes > 0 {
            session.load_more(i64::try_from(self.initial_load_bytes).unwrap_or(i64::MAX))?;
        }
        Ok(session)
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("sources", &self.sources())
            .field("initial_load_bytes", &self.initial_load_bytes)
            .finish()
    }
}
