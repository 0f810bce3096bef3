//! hotvisor: run a service from JSON configuration and hot-reload it when
//! the configuration files change.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI flags / env ──▶ config::locator ──▶ ConfigSource
//!                                              │
//!                                              ▼
//!                        lifecycle::startup (load + merge + build)
//!                                              │
//!                                              ▼
//!   OS signal ──────────▶ lifecycle::supervisor ◀── lifecycle::reload ◀── config::watcher
//!   (shutdown)            (owns the one active       (RestartSignal,       (file events)
//!                          Box<dyn Server>)           rendezvous)
//!                                              │
//!                                              ▼
//!                                  engine (HTTP inbounds)
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod observability;

pub use app::App;
pub use cli::{Cli, Command, RunArgs};
pub use lifecycle::{ServiceSupervisor, SupervisorHandle};
