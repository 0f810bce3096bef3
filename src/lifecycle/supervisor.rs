//! Service supervision.
//!
//! # States
//! - Uninitialized: nothing built yet
//! - Running: exactly one active handle
//! - ReloadInProgress: a swap is executing
//! - Stopped: no active handle, no further swaps
//!
//! # State Transitions
//! ```text
//! Uninitialized → Running: initialize() built and started a handle
//! Running → ReloadInProgress: swap() begins
//! ReloadInProgress → Running: swap succeeded, or failed with the old handle kept
//! ReloadInProgress → Stopped: swap failed after the old handle was closed
//! any (not Stopped) → Stopped: shutdown()
//! ```
//!
//! # Reload ordering
//! `ReloadPolicy::StartFirst` (default) builds and starts the replacement
//! before closing the active handle, so a broken config never takes the
//! service down. `ReloadPolicy::StopFirst` closes the active handle first
//! and leaves the service down if the replacement fails.
//!
//! # Ownership
//! [`ServiceSupervisor::spawn`] moves the state machine into a single task.
//! Swap and shutdown requests are messages on one channel, so they never
//! touch the active handle concurrently. A shutdown queued behind a swap
//! waits for that swap to finish.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::engine::{CloseError, Server};
use crate::lifecycle::startup::{BootstrapError, Bootstrapper};
use crate::observability::metrics;

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Uninitialized,
    Running,
    ReloadInProgress,
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupervisorState::Uninitialized => "uninitialized",
            SupervisorState::Running => "running",
            SupervisorState::ReloadInProgress => "reload-in-progress",
            SupervisorState::Stopped => "stopped",
        })
    }
}

/// Ordering of the two halves of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReloadPolicy {
    /// Start the replacement, then close the old handle.
    #[default]
    StartFirst,
    /// Close the old handle, then build and start the replacement.
    StopFirst,
}

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("supervisor is {0}, not running")]
    NotRunning(SupervisorState),
    #[error("supervisor task is gone")]
    Unavailable,
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// Result of a successful swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    pub generation: u64,
    pub instance_id: Uuid,
    pub superseded: Option<Uuid>,
}

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSnapshot {
    pub state: SupervisorState,
    pub generation: u64,
    pub instance_id: Option<Uuid>,
    pub local_addrs: Vec<SocketAddr>,
}

/// Owns the single active server handle.
pub struct ServiceSupervisor {
    bootstrapper: Bootstrapper,
    policy: ReloadPolicy,
    state: SupervisorState,
    active: Option<Box<dyn Server>>,
    generation: u64,
}

impl ServiceSupervisor {
    pub fn new(bootstrapper: Bootstrapper, policy: ReloadPolicy) -> Self {
        Self {
            bootstrapper,
            policy,
            state: SupervisorState::Uninitialized,
            active: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            state: self.state,
            generation: self.generation,
            instance_id: self.active.as_ref().map(|s| s.instance_id()),
            local_addrs: self.active.as_ref().map(|s| s.local_addrs()).unwrap_or_default(),
        }
    }

    /// Build and start the first handle.
    ///
    /// On failure the state stays `Uninitialized`.
    pub async fn initialize(&mut self) -> Result<(), BootstrapError> {
        if self.state != SupervisorState::Uninitialized {
            return Err(BootstrapError::AlreadyInitialized(self.state));
        }

        let mut server = self.bootstrapper.build()?;
        server.start().await.map_err(BootstrapError::Start)?;

        tracing::info!(
            instance_id = %server.instance_id(),
            policy = ?self.policy,
            "Service started"
        );
        self.active = Some(server);
        self.state = SupervisorState::Running;
        metrics::record_generation(self.generation);
        Ok(())
    }

    /// Replace the active handle with one built from the current config.
    pub async fn swap(&mut self) -> Result<SwapReport, ReloadError> {
        if self.state != SupervisorState::Running {
            return Err(ReloadError::NotRunning(self.state));
        }

        self.state = SupervisorState::ReloadInProgress;
        let result = match self.policy {
            ReloadPolicy::StartFirst => self.swap_start_first().await,
            ReloadPolicy::StopFirst => self.swap_stop_first().await,
        };

        match &result {
            Ok(report) => {
                self.state = SupervisorState::Running;
                metrics::record_generation(report.generation);
            }
            Err(_) if self.active.is_some() => {
                tracing::warn!("Keeping current server running");
                self.state = SupervisorState::Running;
            }
            Err(_) => {
                tracing::error!("No server is running after failed reload");
                self.state = SupervisorState::Stopped;
            }
        }
        result
    }

    async fn swap_start_first(&mut self) -> Result<SwapReport, ReloadError> {
        let next = build_and_start(&self.bootstrapper).await?;
        let previous = self.active.replace(next);

        let superseded = match previous {
            Some(previous) => Some(close_handle(previous).await),
            None => None,
        };
        Ok(self.advance(superseded))
    }

    async fn swap_stop_first(&mut self) -> Result<SwapReport, ReloadError> {
        let superseded = match self.active.take() {
            Some(previous) => Some(close_handle(previous).await),
            None => None,
        };

        let next = build_and_start(&self.bootstrapper).await?;
        self.active = Some(next);
        Ok(self.advance(superseded))
    }

    fn advance(&mut self, superseded: Option<Uuid>) -> SwapReport {
        self.generation += 1;
        SwapReport {
            generation: self.generation,
            instance_id: self
                .active
                .as_ref()
                .map(|s| s.instance_id())
                .unwrap_or_default(),
            superseded,
        }
    }

    /// Close the active handle, if any, and stop accepting swaps.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), CloseError> {
        if self.state == SupervisorState::Stopped {
            return Ok(());
        }
        self.state = SupervisorState::Stopped;

        match self.active.take() {
            Some(mut server) => {
                let result = server.close().await;
                tracing::info!(instance_id = %server.instance_id(), "Service stopped");
                result
            }
            None => Ok(()),
        }
    }

    /// Move the supervisor into its own task.
    pub fn spawn(self) -> (SupervisorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run_actor(self, rx));
        (SupervisorHandle { tx }, task)
    }
}

async fn build_and_start(bootstrapper: &Bootstrapper) -> Result<Box<dyn Server>, BootstrapError> {
    let mut next = bootstrapper.build()?;
    next.start().await.map_err(BootstrapError::Start)?;
    Ok(next)
}

/// Close a superseded handle; a close error is logged, not propagated.
async fn close_handle(mut server: Box<dyn Server>) -> Uuid {
    let id = server.instance_id();
    if let Err(e) = server.close().await {
        tracing::error!(instance_id = %id, error = %e, "Error closing server");
    }
    id
}

enum Command {
    Swap {
        reply: oneshot::Sender<Result<SwapReport, ReloadError>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), CloseError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SupervisorSnapshot>,
    },
}

async fn run_actor(mut supervisor: ServiceSupervisor, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Swap { reply } => {
                let _ = reply.send(supervisor.swap().await);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(supervisor.shutdown().await);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(supervisor.snapshot());
            }
        }
    }

    // Every handle is gone; do not leak a running instance.
    if let Err(e) = supervisor.shutdown().await {
        tracing::error!(error = %e, "Error closing server");
    }
}

/// Cloneable handle to a spawned supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<Command>,
}

impl SupervisorHandle {
    pub async fn swap(&self) -> Result<SwapReport, ReloadError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Swap { reply })
            .await
            .map_err(|_| ReloadError::Unavailable)?;
        rx.await.map_err(|_| ReloadError::Unavailable)?
    }

    /// Request shutdown; returns once the active handle is closed.
    pub async fn shutdown(&self) -> Result<(), CloseError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).await.is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    /// `None` once the supervisor task has ended.
    pub async fn snapshot(&self) -> Option<SupervisorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Snapshot { reply }).await.ok()?;
        rx.await.ok()
    }
}
