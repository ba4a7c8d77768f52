//! Runtime configuration shared by the store layer and the CLI.
//!
//! Everything is read from `thinkt.toml`. Every field has a serde default, so a missing
//! file, a missing section or a partially written file all load cleanly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use toml::de::Error as TomlError;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "thinkt.toml";

/// Vendor names understood in `[sources]`.
pub const KNOWN_SOURCES: &[&str] = &["claude", "codex", "kimi", "gemini", "copilot", "qwen"];

pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_INITIAL_LOAD_BYTES: u64 = 8 * 1024;

/// Top-level configuration (persisted as `thinkt.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ThinktConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub reader: ReaderSettings,
    #[serde(default)]
    pub sources: SourceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// Seconds a listing stays fresh. `0` keeps it until explicitly invalidated.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReaderSettings {
    /// Hard cap on a single JSONL line.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Bytes parsed up front when a lazy session is opened.
    #[serde(default = "default_initial_load_bytes")]
    pub initial_load_bytes: u64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            max_line_bytes: default_max_line_bytes(),
            initial_load_bytes: default_initial_load_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSettings {
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<String>,
    /// Per-vendor base directory overrides, keyed by vendor name. `~` is expanded by the
    /// consumer.
    #[serde(default)]
    pub homes: BTreeMap<String, String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            homes: BTreeMap::new(),
        }
    }
}

impl SourceSettings {
    pub fn is_enabled(&self, source: &str) -> bool {
        self.enabled
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case(source))
    }

    pub fn home(&self, source: &str) -> Option<&str> {
        self.homes
            .get(source)
            .map(String::as_str)
            .map(str::trim)
            .filter(|home| !home.is_empty())
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}
fn default_initial_load_bytes() -> u64 {
    DEFAULT_INITIAL_LOAD_BYTES
}
fn default_enabled_sources() -> Vec<String> {
    KNOWN_SOURCES.iter().map(|name| (*name).to_string()).collect()
}

/// Parse a config document. Missing fields take their defaults; a field of the wrong type
/// is an error rather than a silent reset of the whole file.
pub fn parse_config(content: &str) -> Result<ThinktConfig, TomlError> {
    let root = toml::from_str::<toml::Value>(content)?;
    let mut config = toml::from_str::<ThinktConfig>(content)?;
    apply_compat_fallbacks(&mut config, Some(&root));
    Ok(config)
}

/// Apply compatibility fallbacks after loading raw TOML.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut ThinktConfig, root: Option<&toml::Value>) -> bool {
    let mut changed = false;

    let before = config.sources.enabled.len();
    config.sources.enabled.retain(|name| {
        KNOWN_SOURCES
            .iter()
            .any(|known| known.eq_ignore_ascii_case(name.trim()))
    });
    if config.sources.enabled.len() != before {
        changed = true;
    }

    // An explicitly empty list disables everything; only a list emptied by unknown
    // names falls back to the defaults.
    let explicit_empty = root
        .and_then(|root| root.get("sources"))
        .and_then(|sources| sources.get("enabled"))
        .and_then(toml::Value::as_array)
        .is_some_and(|enabled| enabled.is_empty());
    if config.sources.enabled.is_empty() && !explicit_empty {
        config.sources.enabled = default_enabled_sources();
        changed = true;
    }

    if config.reader.max_line_bytes == 0 {
        config.reader.max_line_bytes = DEFAULT_MAX_LINE_BYTES;
        changed = true;
    }

    changed
}
