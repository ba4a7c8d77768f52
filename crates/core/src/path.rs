use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` segments and resolve `..` without touching the disk.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when `path` equals `base` or lies beneath it, compared component-wise after cleaning.
///
/// `/a/bc` is not within `/a/b`.
pub fn is_path_within(path: &Path, base: &Path) -> bool {
    if base.as_os_str().is_empty() {
        return false;
    }
    clean_path(path).starts_with(clean_path(base))
}

pub fn is_path_within_any<P: AsRef<Path>>(path: &Path, bases: &[P]) -> bool {
    bases.iter().any(|base| is_path_within(path, base.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_respects_component_boundaries() {
        let base = Path::new("/home/u/.codex");
        assert!(is_path_within(Path::new("/home/u/.codex/sessions/a.jsonl"), base));
        assert!(is_path_within(base, base));
        assert!(!is_path_within(Path::new("/home/u/.codex-old/a.jsonl"), base));
        assert!(!is_path_within(Path::new("/home/u/.claude/a.jsonl"), base));
    }

    #[test]
    fn traversal_is_resolved_before_comparing() {
        let base = Path::new("/home/u/.codex");
        assert!(!is_path_within(
            Path::new("/home/u/.codex/../.ssh/id_rsa"),
            base
        ));
        assert!(is_path_within(Path::new("/home/u/./.codex/x"), base));
    }

    #[test]
    fn empty_base_matches_nothing() {
        assert!(!is_path_within(Path::new("/tmp/x"), Path::new("")));
        assert!(!is_path_within_any::<&Path>(Path::new("/tmp/x"), &[]));
    }
}
