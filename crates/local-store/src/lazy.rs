//! Incremental session reader.
//!
//! A [`LazySession`] holds an open file and a vendor parser positioned somewhere inside it.
//! Each `load_more` call resumes exactly where the previous one stopped: consumed bytes are
//! never re-read, and a line cut short by a failed read stays buffered in the parser's line
//! reader until the next call.

use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thinkt_core::{Entry, Error, Result, SessionMeta};
use thinkt_parsers::EntryParser;

/// File handle shared between a lazy session and its closers.
#[derive(Debug, Clone)]
pub(crate) struct SharedFile {
    file: Arc<Mutex<Option<File>>>,
    closed: Arc<AtomicBool>,
}

impl SharedFile {
    pub(crate) fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(Some(file))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Read for SharedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        match file.as_mut() {
            Some(file) => file.read(buf),
            None => Err(io::Error::other("session file closed")),
        }
    }
}

/// Closes a [`LazySession`] from any thread.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    file: SharedFile,
}

impl SessionCloser {
    /// Release the file. Safe to call repeatedly.
    pub fn close(&self) {
        self.file.close();
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_closed()
    }
}

/// A session whose entries are parsed on demand.
///
/// Loading needs `&mut self`; callers that share a session serialize access themselves.
/// Only [`SessionCloser`] is meant to cross threads.
pub struct LazySession {
    meta: SessionMeta,
    parser: Box<dyn EntryParser>,
    file: SharedFile,
    entries: Vec<Entry>,
    done: bool,
}

impl LazySession {
    pub(crate) fn new(meta: SessionMeta, parser: Box<dyn EntryParser>, file: SharedFile) -> Self {
        Self {
            meta,
            parser,
            file,
            entries: Vec::new(),
            done: false,
        }
    }

    /// Parse until at least `target_bytes` bytes of the file have been consumed, or the end
    /// of the file. Returns how many entries were added.
    ///
    /// Targets at or below what has already been consumed add nothing. A target past the
    /// end of the file loads everything.
    pub fn load_more(&mut self, target_bytes: i64) -> Result<usize> {
        if target_bytes <= 0 {
            return Ok(0);
        }
        let target = target_bytes as u64;
        if target >= self.meta.file_size {
            return self.load_all();
        }
        self.pull(Some(target))
    }

    /// Parse the rest of the file.
    pub fn load_all(&mut self) -> Result<usize> {
        self.pull(None)
    }

    fn pull(&mut self, target: Option<u64>) -> Result<usize> {
        if self.file.is_closed() {
            self.done = true;
            return Err(Error::Closed);
        }
        let before = self.entries.len();
        while !self.done {
            if target.is_some_and(|target| self.parser.bytes_consumed() >= target) {
                break;
            }
            match self.parser.next_entry() {
                Ok(Some(entry)) => self.entries.push(entry),
                Ok(None) => self.done = true,
                Err(_) if self.file.is_closed() => {
                    self.done = true;
                    return Err(Error::Closed);
                }
                Err(err) => {
                    // An oversized line can never be read; I/O errors may be retried.
                    if matches!(err, Error::LineTooLong { .. } | Error::Cancelled) {
                        self.done = true;
                    }
                    return Err(err);
                }
            }
        }
        Ok(self.entries.len() - before)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn has_more(&self) -> bool {
        !self.done && !self.file.is_closed() && !self.parser.is_exhausted()
    }

    /// Metadata from the store's scan, available before anything is loaded.
    pub fn metadata(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.parser.bytes_consumed()
    }

    /// Fraction of the file consumed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.meta.file_size == 0 {
            return 1.0;
        }
        (self.parser.bytes_consumed() as f64 / self.meta.file_size as f64).min(1.0)
    }

    pub fn close(&mut self) -> Result<()> {
        self.file.close();
        Ok(())
    }

    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            file: self.file.clone(),
        }
    }
}

impl std::fmt::Debug for LazySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazySession")
            .field("session", &self.meta.id)
            .field("entries", &self.entries.len())
            .field("bytes_consumed", &self.parser.bytes_consumed())
            .field("done", &self.done)
            .finish()
    }
}

/// Open `meta.full_path` behind a closable handle and wrap `make_parser`'s parser over it.
pub(crate) fn open_lazy(
    meta: SessionMeta,
    make_parser: impl FnOnce(&SessionMeta, SharedFile) -> Box<dyn EntryParser>,
) -> Result<LazySession> {
    let file = File::open(&meta.full_path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            Error::not_found("session", meta.full_path.display().to_string())
        } else {
            Error::io_at("open", &meta.full_path, err)
        }
    })?;
    let shared = SharedFile::new(file);
    let parser = make_parser(&meta, shared.clone());
    Ok(LazySession::new(meta, parser, shared))
}
