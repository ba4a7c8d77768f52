//! Filesystem locations used by thinkt: the config file and the user's home directory.

use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};
use thinkt_runtime_config::{parse_config, ThinktConfig, TomlError, CONFIG_FILE_NAME};

/// Environment variable that relocates the config directory.
pub const CONFIG_DIR_ENV: &str = "THINKT_CONFIG_DIR";

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("could not determine home directory")]
    NoHome,
    #[error("failed to read config at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: TomlError,
    },
}

/// The user's home directory.
pub fn home_dir() -> Result<PathBuf, PathError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or(PathError::NoHome)
}

/// Config directory: `THINKT_CONFIG_DIR` when set, else the platform config dir.
pub fn config_dir() -> Result<PathBuf, PathError> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("dev", "thinkt", "thinkt")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(PathError::NoHome)
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf, PathError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the config file at `path`, returning defaults when it does not exist.
pub fn load_config_from(path: &Path) -> Result<ThinktConfig, PathError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ThinktConfig::default());
        }
        Err(source) => {
            return Err(PathError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_config(&content).map_err(|source| PathError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the canonical config file.
pub fn load_config() -> Result<ThinktConfig, PathError> {
    load_config_from(&config_path()?)
}
