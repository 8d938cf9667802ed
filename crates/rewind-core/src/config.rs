//! Store configuration and database path resolution.
//!
//! The database file location is resolved through an ordered fallback
//! chain: explicit full-path override, explicit directory override, a
//! dot-directory under the working directory, and finally the same
//! dot-directory under the user's home. A candidate whose directory cannot
//! be created falls through to the next one; resolution only fails when
//! every candidate is unusable.

use crate::{Result, RewindError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Directory created under the working directory (or home) for engine state.
pub const APP_DIR_NAME: &str = ".rewind";

/// Default database file name.
pub const DB_FILE_NAME: &str = "version_store.db";

/// Options controlling where the version store lives.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreOptions {
    /// Full path override for the database file.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Directory override; the default file name is used inside it.
    #[serde(default)]
    pub db_dir: Option<PathBuf>,
}

impl StoreOptions {
    /// Load options from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options =
            toml::from_str(&content).map_err(|e| RewindError::ConfigError(e.to_string()))?;
        Ok(options)
    }

    /// Load options from `<cwd>/.rewind/config.toml` or fall back to defaults.
    pub fn load() -> Self {
        let config_path = PathBuf::from(APP_DIR_NAME).join("config.toml");
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(options) => return options,
                Err(e) => {
                    tracing::warn!(target: "rewind::config", error = %e, "ignoring unreadable config file");
                }
            }
        }
        Self::default()
    }
}

/// Ordered candidate database paths, most preferred first.
///
/// Relative overrides are anchored at `cwd` so the resolved path is always
/// absolute.
fn candidate_paths(options: &StoreOptions, cwd: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let absolutize = |path: &Path| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        }
    };

    let mut candidates = Vec::new();
    if let Some(path) = &options.db_path {
        candidates.push(absolutize(path));
    }
    if let Some(dir) = &options.db_dir {
        candidates.push(absolutize(dir).join(DB_FILE_NAME));
    }
    candidates.push(cwd.join(APP_DIR_NAME).join(DB_FILE_NAME));
    if let Some(home) = home {
        candidates.push(home.join(APP_DIR_NAME).join(DB_FILE_NAME));
    }
    candidates
}

/// Pick the first candidate whose parent directory exists or can be created.
fn prepare_db_path(candidates: &[PathBuf]) -> Result<PathBuf> {
    let mut last: Option<&PathBuf> = None;
    for candidate in candidates {
        last = Some(candidate);
        let Some(parent) = candidate.parent() else {
            return Ok(candidate.clone());
        };
        match std::fs::create_dir_all(parent) {
            Ok(()) => return Ok(candidate.clone()),
            Err(e) => {
                tracing::warn!(
                    target: "rewind::config",
                    path = %candidate.display(),
                    error = %e,
                    "database location unusable, trying fallback"
                );
            }
        }
    }
    Err(RewindError::NoUsableLocation(
        last.cloned().unwrap_or_default(),
    ))
}

/// Resolve and prepare the database file path for the given options.
pub(crate) fn resolve_db_path(options: &StoreOptions) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let home = dirs::home_dir();
    let candidates = candidate_paths(options, &cwd, home.as_deref());
    prepare_db_path(&candidates)
}
