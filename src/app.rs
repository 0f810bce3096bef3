//! Command execution.
//!
//! # Responsibilities
//! - `--dump`: locate + load + merge, print, exit
//! - `--test`: locate + load + build, exit without starting
//! - `run`: initial start, watcher, reload loop, wait for termination
//!
//! # Exit codes
//! - 0: success, including `--test` and `--dump`
//! - 23: configuration could not be located, read, parsed or merged
//! - 1: the configuration could not be built or started

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{Command, RunArgs};
use crate::config::loader::{ConfigLoader, JsonConfigLoader};
use crate::config::locator::EnvDefaults;
use crate::config::watcher::ConfigWatcher;
use crate::engine::{HttpEngine, ServerBuilder};
use crate::lifecycle::reload::{restart_channel, spawn_reload_loop};
use crate::lifecycle::startup::{BootstrapError, Bootstrapper, EXIT_FAILURE};
use crate::lifecycle::supervisor::ServiceSupervisor;

pub const EXIT_OK: u8 = 0;

/// `hotvisor <version> (<os>/<arch>)`
pub fn version_line() -> String {
    format!(
        "hotvisor {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// `--dump` keeps stdout for the merged config; every other run prints the
/// version line first.
fn announces_version(args: &RunArgs) -> bool {
    !args.dump
}

/// Everything a command needs, fixed at construction.
#[derive(Clone)]
pub struct App {
    loader: Arc<dyn ConfigLoader>,
    builder: Arc<dyn ServerBuilder>,
    env: EnvDefaults,
    working_dir: Option<PathBuf>,
}

impl App {
    /// JSON loader, HTTP engine, defaults from the process environment.
    pub fn from_env() -> Self {
        Self {
            loader: Arc::new(JsonConfigLoader),
            builder: Arc::new(HttpEngine),
            env: EnvDefaults::from_env(),
            working_dir: std::env::current_dir().ok(),
        }
    }

    pub fn new(loader: Arc<dyn ConfigLoader>, builder: Arc<dyn ServerBuilder>) -> Self {
        Self {
            loader,
            builder,
            env: EnvDefaults::default(),
            working_dir: None,
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

    /// Execute a parsed command until it finishes; returns the exit code.
    pub async fn execute<F>(&self, command: Command, terminate: F) -> u8
    where
        F: Future<Output = ()>,
    {
        match command {
            Command::Version => {
                println!("{}", version_line());
                EXIT_OK
            }
            Command::Run(args) => {
                if announces_version(&args) {
                    println!("{}", version_line());
                }
                if args.dump {
                    self.dump(&args, &mut std::io::stdout().lock())
                } else if args.test {
                    self.check(&args)
                } else {
                    self.serve(&args, terminate).await
                }
            }
        }
    }

    fn bootstrapper(&self, args: &RunArgs) -> Result<Bootstrapper, BootstrapError> {
        let source = args
            .locator(self.env.clone(), self.working_dir.clone())
            .resolve()?;
        Ok(Bootstrapper::new(
            args.format(),
            source,
            self.loader.clone(),
            self.builder.clone(),
        ))
    }

    /// Print the merged configuration without building anything.
    pub fn dump(&self, args: &RunArgs, out: &mut dyn Write) -> u8 {
        let merged = match self.bootstrapper(args).and_then(|b| b.load()) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::error!(error = %e, "Failed to dump config");
                return e.exit_code();
            }
        };

        if let Err(e) = writeln!(out, "{}", merged) {
            tracing::error!(error = %e, "Failed to write merged config");
            return EXIT_FAILURE;
        }
        EXIT_OK
    }

    /// Load and build the configuration; never starts the built handle.
    pub fn check(&self, args: &RunArgs) -> u8 {
        match self.bootstrapper(args).and_then(|b| b.build()) {
            Ok(_server) => {
                tracing::info!("Configuration OK.");
                EXIT_OK
            }
            Err(e) => {
                tracing::error!(error = %e, "Configuration check failed");
                e.exit_code()
            }
        }
    }

    /// Start the service, reload it on config changes, and stop it once
    /// `terminate` completes.
    pub async fn serve<F>(&self, args: &RunArgs, terminate: F) -> u8
    where
        F: Future<Output = ()>,
    {
        let bootstrapper = match self.bootstrapper(args) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start");
                return e.exit_code();
            }
        };
        let stdin_only = bootstrapper.source().is_stdin_only();
        let watch_set = bootstrapper.source().watch_set();

        let mut supervisor = ServiceSupervisor::new(bootstrapper, args.reload_policy);
        if let Err(e) = supervisor.initialize().await {
            tracing::error!(error = %e, "Failed to start");
            return e.exit_code();
        }
        let addrs = supervisor.snapshot().local_addrs;
        let (supervisor, supervisor_task) = supervisor.spawn();

        let (restart_tx, restart_rx) = restart_channel();
        let reload_task = spawn_reload_loop(restart_rx, supervisor.clone(), None);

        let watcher = if args.no_watch {
            tracing::info!("Config watching disabled");
            drop(restart_tx);
            None
        } else if stdin_only {
            tracing::info!("Config read from stdin, automatic restart unavailable");
            drop(restart_tx);
            None
        } else {
            match ConfigWatcher::start(&watch_set, restart_tx, args.watcher_options()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to start file watcher");
                    tracing::warn!("Config file changes will not trigger automatic restart");
                    None
                }
            }
        };

        tracing::info!(addresses = ?addrs, "Service started successfully. Press Ctrl+C to stop.");
        terminate.await;

        tracing::info!("Shutting down...");
        if let Some(watcher) = watcher {
            watcher.close().await;
        }
        if let Err(e) = supervisor.shutdown().await {
            tracing::error!(error = %e, "Error closing server");
        }

        // The last restart sender is gone, so the loop ends now.
        if let Err(e) = reload_task.await {
            tracing::error!(error = %e, "Reload task failed");
        }
        drop(supervisor);
        if let Err(e) = supervisor_task.await {
            tracing::error!(error = %e, "Supervisor task failed");
        }

        tracing::info!("Shutdown complete");
        EXIT_OK
    }
}
