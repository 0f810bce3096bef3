//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags / env defaults / working dir
//!     → locator.rs (resolve ordered ConfigSource)
//!     → loader.rs (read, strip comments, merge in order)
//!     → MergedConfig (immutable, shared with the engine builder)
//!     → schema.rs + validation.rs (typed engine view, semantic checks)
//!
//! While running:
//!     watcher.rs detects a write/create on a WatchSet path
//!     → RestartSignal to the reload loop
//!     → supervisor rebuilds from the same ConfigSource
//! ```
//!
//! # Design Decisions
//! - The ConfigSource is resolved once; reloads re-read the same files
//! - Later sources override earlier ones during merge
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod locator;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use loader::{ConfigError, ConfigFormat, ConfigLoader, JsonConfigLoader, MergedConfig};
pub use locator::{ConfigLocator, EnvDefaults, LocateError};
pub use schema::{EngineConfig, InboundConfig};
pub use source::{ConfigSource, SourceEntry, WatchSet};
pub use watcher::{ConfigWatcher, WatchError, WatcherOptions};
