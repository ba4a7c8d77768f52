//! TTL memoization for project and session listings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thinkt_core::{Project, Result, SessionMeta};

/// Per-store listing cache.
///
/// Each key has its own slot lock, held while `compute` runs, so concurrent misses on the
/// same key compute once and other keys are never blocked. Errors are not cached.
#[derive(Debug)]
pub struct StoreCache {
    ttl: Option<Duration>,
    projects: Slot<Vec<Project>>,
    sessions: Mutex<HashMap<String, Arc<Slot<Vec<SessionMeta>>>>>,
}

#[derive(Debug)]
struct Slot<T> {
    state: Mutex<Option<Cached<T>>>,
}

#[derive(Debug)]
struct Cached<T> {
    value: T,
    stored_at: Instant,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    fn load(&self, ttl: Option<Duration>, compute: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut state = lock(&self.state);
        if let Some(cached) = state.as_ref() {
            let fresh = ttl.is_none_or(|ttl| cached.stored_at.elapsed() < ttl);
            if fresh {
                return Ok(cached.value.clone());
            }
        }
        let value = compute()?;
        *state = Some(Cached {
            value: value.clone(),
            stored_at: Instant::now(),
        });
        Ok(value)
    }

    fn clear(&self) {
        *lock(&self.state) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StoreCache {
    /// `ttl == None` keeps values until they are invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            projects: Slot::new(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn load_projects(
        &self,
        compute: impl FnOnce() -> Result<Vec<Project>>,
    ) -> Result<Vec<Project>> {
        self.projects.load(self.ttl, compute)
    }

    pub fn load_sessions(
        &self,
        project_id: &str,
        compute: impl FnOnce() -> Result<Vec<SessionMeta>>,
    ) -> Result<Vec<SessionMeta>> {
        let slot = {
            let mut sessions = lock(&self.sessions);
            Arc::clone(
                sessions
                    .entry(project_id.to_string())
                    .or_insert_with(|| Arc::new(Slot::new())),
            )
        };
        slot.load(self.ttl, compute)
    }

    pub fn invalidate_projects(&self) {
        self.projects.clear();
    }

    pub fn invalidate_sessions(&self, project_id: &str) {
        lock(&self.sessions).remove(project_id);
    }

    /// Drop every cached listing.
    pub fn reset(&self) {
        self.projects.clear();
        lock(&self.sessions).clear();
    }
}

impl Default for StoreCache {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(60)))
    }
}
