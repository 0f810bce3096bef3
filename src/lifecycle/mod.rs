//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     ConfigSource → load + merge → build → Box<dyn Server>
//!
//! Supervision (supervisor.rs):
//!     initialize → Running ⇄ ReloadInProgress → Stopped
//!
//! Reload (reload.rs):
//!     watcher → RestartSignal (rendezvous) → supervisor swap
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → close watcher → supervisor shutdown → exit 0
//! ```
//!
//! # Design Decisions
//! - Fail fast: any initial startup error is fatal
//! - One task owns the active handle; swap and shutdown are messages to it
//! - Shutdown waits for an in-flight swap instead of cancelling it

pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use reload::{restart_channel, RestartReceiver, RestartSender, RestartSignal};
pub use shutdown::Shutdown;
pub use startup::{BootstrapError, Bootstrapper};
pub use supervisor::{ReloadError, ReloadPolicy, ServiceSupervisor, SupervisorHandle, SupervisorState};
