//! Where each vendor keeps its data, and which files under it are sessions.

use std::path::{Path, PathBuf};
use thinkt_core::path::{clean_path, is_path_within};
use thinkt_core::{cancel, CancellationToken, Result, Source};

/// Directory layout of one vendor's data directory.
pub struct SourceLayout {
    pub source: Source,
    /// Directory name under `$HOME` when nothing overrides it.
    pub default_dir: &'static str,
    /// Vendor-native variable naming the data directory, honored after thinkt's own.
    pub native_env: Option<&'static str>,
    /// Session file patterns relative to the base directory.
    pub session_globs: &'static [&'static str],
}

const LAYOUTS: [SourceLayout; 6] = [
    SourceLayout {
        source: Source::Claude,
        default_dir: ".claude",
        native_env: None,
        session_globs: &["projects/*/*.jsonl"],
    },
    SourceLayout {
        source: Source::Codex,
        default_dir: ".codex",
        native_env: Some("CODEX_HOME"),
        session_globs: &["sessions/**/*.jsonl"],
    },
    SourceLayout {
        source: Source::Kimi,
        default_dir: ".kimi",
        native_env: None,
        session_globs: &["sessions/*/*/context.jsonl"],
    },
    SourceLayout {
        source: Source::Gemini,
        default_dir: ".gemini",
        native_env: None,
        session_globs: &["tmp/*/chats/session-*.json", "tmp/*/chats/session-*.jsonl"],
    },
    SourceLayout {
        source: Source::Copilot,
        default_dir: ".copilot",
        native_env: None,
        session_globs: &["session-state/*/events.jsonl"],
    },
    SourceLayout {
        source: Source::Qwen,
        default_dir: ".qwen",
        native_env: None,
        session_globs: &["projects/*/chats/*.jsonl"],
    },
];

pub fn layout(source: Source) -> &'static SourceLayout {
    match source {
        Source::Claude => &LAYOUTS[0],
        Source::Codex => &LAYOUTS[1],
        Source::Kimi => &LAYOUTS[2],
        Source::Gemini => &LAYOUTS[3],
        Source::Copilot => &LAYOUTS[4],
        Source::Qwen => &LAYOUTS[5],
    }
}

/// `THINKT_<VENDOR>_HOME`.
pub fn home_env_var(source: Source) -> String {
    format!("THINKT_{}_HOME", source.as_str().to_ascii_uppercase())
}

/// Base directory for `source`.
///
/// Precedence: `THINKT_<VENDOR>_HOME`, then `configured` (from `[sources.homes]`, `~`
/// expanded), then the vendor's own variable, then `~/.<vendor>`. Returns `None` only when
/// no home directory can be determined and nothing overrides it.
pub fn resolve_base_dir(source: Source, configured: Option<&str>) -> Option<PathBuf> {
    resolve_base_dir_with(source, configured, |name| std::env::var(name).ok())
}

fn resolve_base_dir_with(
    source: Source,
    configured: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    let layout = layout(source);
    let from_env = |name: &str| {
        env(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(dir) = from_env(&home_env_var(source)) {
        return Some(expand(&dir));
    }
    if let Some(dir) = configured.map(str::trim).filter(|dir| !dir.is_empty()) {
        return Some(expand(dir));
    }
    if let Some(dir) = layout.native_env.and_then(from_env) {
        return Some(expand(&dir));
    }
    thinkt_paths::home_dir()
        .ok()
        .map(|home| home.join(layout.default_dir))
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Every session file under `base_dir`, sorted by path.
///
/// `cancel` is checked for every path the walk yields.
pub fn find_session_files(
    source: Source,
    base_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in layout(source).session_globs {
        let full = format!("{}/{}", glob::Pattern::escape(&base_dir.to_string_lossy()), pattern);
        let paths = match glob::glob(&full) {
            Ok(paths) => paths,
            Err(err) => {
                tracing::debug!(pattern = %full, error = %err, "invalid session glob");
                continue;
            }
        };
        for path in paths {
            cancel::check(cancel)?;
            match path {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(err) => tracing::debug!(error = %err, "unreadable path during session walk"),
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// True when `path` lies under `base_dir` and has the shape of a `source` session file.
pub fn is_session_path(source: Source, base_dir: &Path, path: &Path) -> bool {
    let path = clean_path(path);
    let base = clean_path(base_dir);
    if !is_path_within(&path, &base) {
        return false;
    }
    let Ok(relative) = path.strip_prefix(&base) else {
        return false;
    };
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    layout(source).session_globs.iter().any(|pattern| {
        glob::Pattern::new(pattern)
            .map(|pattern| pattern.matches_path_with(relative, options))
            .unwrap_or(false)
    })
}

/// Which source's layout `path` matches among `bases`, if any.
pub fn source_for_path<'a>(
    path: &Path,
    bases: impl IntoIterator<Item = (Source, &'a Path)>,
) -> Option<Source> {
    bases
        .into_iter()
        .find(|(source, base)| is_session_path(*source, base, path))
        .map(|(source, _)| source)
}
