use crate::model::Source;
use std::io;
use std::path::Path;

/// Error taxonomy shared by parsers, stores and the registry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line} exceeds the maximum line length of {max} bytes")]
    LineTooLong { line: u64, max: usize },
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{query:?} matches projects in several sources ({}); pick one with --source", join_sources(.sources))]
    Ambiguous { query: String, sources: Vec<Source> },
    #[error("operation cancelled")]
    Cancelled,
    #[error("session reader is closed")]
    Closed,
    #[error("source not available: {0}")]
    SourceUnavailable(Source),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_sources(sources: &[Source]) -> String {
    sources
        .iter()
        .map(Source::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("{action} {}", path.display()), source)
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_lists_sources() {
        let err = Error::Ambiguous {
            query: "app".into(),
            sources: vec![Source::Claude, Source::Codex],
        };
        let message = err.to_string();
        assert!(message.contains("claude, codex"));
        assert!(message.contains("\"app\""));
    }

    #[test]
    fn missing_file_counts_as_not_found() {
        let err = Error::io_at(
            "open",
            Path::new("/nope"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("open /nope"));
        assert!(!Error::Cancelled.is_not_found());
    }
}
