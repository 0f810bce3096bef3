//! Configuration source resolution.
//!
//! # Precedence (first match wins)
//! 1. `--confdir` if it is an existing directory
//! 2. `HOTVISOR_LOCATION_CONFDIR` if it is an existing directory
//! 3. explicit `-c/--config` files, in command-line order
//! 4. `config.json` in the working directory
//! 5. `HOTVISOR_LOCATION_CONFIG` if it is an existing file
//! 6. standard input
//!
//! A directory that exists but yields no matching files falls through to
//! rule 3. Rule 2 is only consulted when the CLI directory does not exist.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::source::{ConfigSource, SourceEntry};

/// Env var naming the default config directory.
pub const CONFDIR_ENV: &str = "HOTVISOR_LOCATION_CONFDIR";
/// Env var naming the default single config file.
pub const CONFIG_ENV: &str = "HOTVISOR_LOCATION_CONFIG";
/// File looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

static CONFIG_FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+\.(json|jsonc)$").expect("static pattern"));

/// Error type for source resolution.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("failed to read config directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Defaults taken from the environment, captured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    pub confdir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        Self {
            confdir: env_path(CONFDIR_ENV),
            config_file: env_path(CONFIG_ENV),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Resolves the ordered set of configuration inputs.
#[derive(Debug, Clone, Default)]
pub struct ConfigLocator {
    files: Vec<PathBuf>,
    confdir: Option<PathBuf>,
    env: EnvDefaults,
    working_dir: Option<PathBuf>,
}

impl ConfigLocator {
    pub fn new(files: Vec<PathBuf>, confdir: Option<PathBuf>) -> Self {
        Self {
            files,
            confdir,
            ..Self::default()
        }
    }

    pub fn with_env(mut self, env: EnvDefaults) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Resolve the configuration source.
    ///
    /// Only reads the file system; calling it twice with the same
    /// environment yields the same result.
    pub fn resolve(&self) -> Result<ConfigSource, LocateError> {
        let from_dir = if let Some(dir) = self.confdir.as_deref().filter(|d| d.is_dir()) {
            tracing::info!(confdir = %dir.display(), "Using confdir from arg");
            scan_dir(dir)?
        } else if let Some(dir) = self.env.confdir.as_deref().filter(|d| d.is_dir()) {
            tracing::info!(confdir = %dir.display(), "Using confdir from env");
            scan_dir(dir)?
        } else {
            Vec::new()
        };

        if let Some(source) = ConfigSource::new(from_dir) {
            return Ok(source);
        }

        let explicit = self
            .files
            .iter()
            .cloned()
            .map(SourceEntry::Path)
            .collect();
        if let Some(source) = ConfigSource::new(explicit) {
            return Ok(source);
        }

        if let Some(dir) = &self.working_dir {
            let candidate = dir.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                tracing::info!(path = %candidate.display(), "Using default config");
                return Ok(ConfigSource::file(candidate));
            }
        }

        if let Some(file) = self.env.config_file.as_deref().filter(|f| f.is_file()) {
            tracing::info!(path = %file.display(), "Using config from env");
            return Ok(ConfigSource::file(file));
        }

        tracing::info!("Using config from STDIN");
        Ok(ConfigSource::stdin())
    }
}

/// Non-recursive scan for `*.json` / `*.jsonc` entries, sorted by name.
fn scan_dir(dir: &Path) -> Result<Vec<SourceEntry>, LocateError> {
    let read_err = |source| LocateError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| CONFIG_FILE_PATTERN.is_match(n)) {
            names.push(name);
        }
    }
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| SourceEntry::Path(dir.join(name)))
        .collect())
}
