use anyhow::{Context, Result};
use std::path::Path;
use thinkt_runtime_config::ThinktConfig;

/// Load `thinkt.toml` from `explicit`, or from the platform config directory. A missing
/// file yields the defaults.
pub fn load(explicit: Option<&Path>) -> Result<ThinktConfig> {
    match explicit {
        Some(path) => thinkt_paths::load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => thinkt_paths::load_config().context("loading config"),
    }
}
