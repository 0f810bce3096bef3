//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and merge the resolved configuration sources
//! - Build a fresh, not yet started server handle
//! - Map startup failures to process exit codes
//!
//! # Design Decisions
//! - The bootstrapper never touches supervisor state
//! - Starting the handle is a separate step owned by the supervisor

use std::sync::Arc;

use crate::config::loader::{ConfigError, ConfigFormat, ConfigLoader, MergedConfig};
use crate::config::locator::LocateError;
use crate::config::source::ConfigSource;
use crate::engine::{BuildError, Server, ServerBuilder, StartError};
use crate::lifecycle::supervisor::SupervisorState;

/// Exit code for configuration failures; supervisors like systemd can be
/// told not to restart on it.
pub const EXIT_CONFIG: u8 = 23;
/// Exit code for any other startup failure.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error("failed to load config files: [{sources}]: {source}")]
    Config {
        sources: String,
        #[source]
        source: ConfigError,
    },
    #[error("failed to create server: {0}")]
    Build(#[source] BuildError),
    #[error("failed to start server: {0}")]
    Start(#[source] StartError),
    #[error("supervisor already initialized (state {0})")]
    AlreadyInitialized(SupervisorState),
}

impl BootstrapError {
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::Locate(_) | BootstrapError::Config { .. } => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }
}

/// Produces server handles from one resolved configuration source.
#[derive(Clone)]
pub struct Bootstrapper {
    format: ConfigFormat,
    source: ConfigSource,
    loader: Arc<dyn ConfigLoader>,
    builder: Arc<dyn ServerBuilder>,
}

impl Bootstrapper {
    pub fn new(
        format: ConfigFormat,
        source: ConfigSource,
        loader: Arc<dyn ConfigLoader>,
        builder: Arc<dyn ServerBuilder>,
    ) -> Self {
        Self {
            format,
            source,
            loader,
            builder,
        }
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Load and merge every source.
    pub fn load(&self) -> Result<MergedConfig, BootstrapError> {
        self.loader
            .load(self.format, &self.source)
            .map_err(|source| BootstrapError::Config {
                sources: self.source.to_string(),
                source,
            })
    }

    /// Load, merge and build a new handle. The handle is not started.
    pub fn build(&self) -> Result<Box<dyn Server>, BootstrapError> {
        let merged = self.load()?;
        self.builder.build(&merged).map_err(BootstrapError::Build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::JsonConfigLoader;
    use crate::engine::HttpEngine;
    use std::fs;

    fn bootstrapper(source: ConfigSource) -> Bootstrapper {
        Bootstrapper::new(
            ConfigFormat::Auto,
            source,
            Arc::new(JsonConfigLoader),
            Arc::new(HttpEngine),
        )
    }

    #[test]
    fn test_build_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "inbounds": [{ "tag": "web", "listen": "127.0.0.1:0" }] }"#).unwrap();

        let server = bootstrapper(ConfigSource::file(path)).build().unwrap();
        assert!(server.local_addrs().is_empty());
    }

    #[test]
    fn test_error_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let err = bootstrapper(ConfigSource::file(&broken)).build().err().unwrap();
        assert!(matches!(err, BootstrapError::Config { .. }));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert!(err.to_string().contains("broken.json"));

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "{}").unwrap();
        let err = bootstrapper(ConfigSource::file(empty)).build().err().unwrap();
        assert!(matches!(err, BootstrapError::Build(_)));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }
}
