use std::sync::OnceLock;

/// Best-effort host name: `HOSTNAME`/`COMPUTERNAME`, then `/etc/hostname`, else `localhost`.
pub fn hostname() -> String {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME
        .get_or_init(|| {
            ["HOSTNAME", "COMPUTERNAME"]
                .iter()
                .filter_map(|key| std::env::var(key).ok())
                .chain(std::fs::read_to_string("/etc/hostname").ok())
                .map(|name| name.trim().to_string())
                .find(|name| !name.is_empty())
                .unwrap_or_else(|| "localhost".to_string())
        })
        .clone()
}

/// Trimmed contents of a small identifier file, if present and non-empty.
pub fn read_id_file(path: &std::path::Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|id| !id.is_empty())
}
