//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate listen addresses and value ranges
//! - Detect duplicate tags and listen addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before a server handle is built

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no inbounds configured")]
    NoInbounds,
    #[error("inbound #{index} has an empty tag")]
    EmptyTag { index: usize },
    #[error("duplicate inbound tag '{0}'")]
    DuplicateTag(String),
    #[error("inbound '{tag}' has invalid listen address '{listen}'")]
    InvalidListen { tag: String, listen: String },
    #[error("listen address {0} used by more than one inbound")]
    DuplicateListen(SocketAddr),
    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,
}

pub fn validate_engine_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.inbounds.is_empty() {
        errors.push(ValidationError::NoInbounds);
    }

    let mut tags = HashSet::new();
    let mut addrs = HashSet::new();
    for (index, inbound) in config.inbounds.iter().enumerate() {
        if inbound.tag.trim().is_empty() {
            errors.push(ValidationError::EmptyTag { index });
        } else if !tags.insert(inbound.tag.as_str()) {
            errors.push(ValidationError::DuplicateTag(inbound.tag.clone()));
        }

        match inbound.listen.parse::<SocketAddr>() {
            // Port 0 asks the OS for a fresh port, so it never collides.
            Ok(addr) if addr.port() != 0 && !addrs.insert(addr) => {
                errors.push(ValidationError::DuplicateListen(addr));
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidListen {
                tag: inbound.tag.clone(),
                listen: inbound.listen.clone(),
            }),
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
