//! Service engine capabilities.
//!
//! # Data Flow
//! ```text
//! MergedConfig
//!     → ServerBuilder::build (schema + validation)
//!     → Box<dyn Server> (built, not started)
//!     → Server::start (bind, spawn serve tasks)
//!     → Server::close (graceful stop, drain)
//! ```
//!
//! The supervisor only sees these traits. `http` is the engine shipped with
//! the binary.

pub mod http;

use std::net::SocketAddr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::loader::MergedConfig;
use crate::config::validation::ValidationError;

pub use http::{HttpEngine, HttpInstance};

/// One running (or runnable) service instance.
#[async_trait]
pub trait Server: Send {
    /// Identifier distinguishing instances across reloads.
    fn instance_id(&self) -> Uuid;

    /// Addresses the instance is accepting connections on.
    fn local_addrs(&self) -> Vec<SocketAddr> {
        Vec::new()
    }

    async fn start(&mut self) -> Result<(), StartError>;

    async fn close(&mut self) -> Result<(), CloseError>;
}

/// Turns a merged configuration into a server handle.
pub trait ServerBuilder: Send + Sync {
    fn build(&self, config: &MergedConfig) -> Result<Box<dyn Server>, BuildError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Schema(#[source] serde_json::Error),
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
    #[error("{0}")]
    Other(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to bind inbound '{tag}' on {listen}: {source}")]
    Bind {
        tag: String,
        listen: String,
        #[source]
        source: std::io::Error,
    },
    #[error("instance already started")]
    AlreadyStarted,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    #[error("inbound '{tag}' did not stop within {timeout_ms}ms")]
    Timeout { tag: String, timeout_ms: u64 },
    #[error("inbound '{tag}' failed: {reason}")]
    Task { tag: String, reason: String },
    #[error("{0}")]
    Other(String),
}
