//! Typed view of the merged configuration used by the HTTP engine.
//!
//! Unknown top-level keys are ignored so one merged document can carry
//! sections for other consumers.

use serde::{Deserialize, Serialize};

/// Root configuration for one service instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Inbound endpoints served by the instance.
    pub inbounds: Vec<InboundConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

/// One listening endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundConfig {
    /// Inbound identifier for logging and merging.
    pub tag: String,

    /// Bind address (e.g., "127.0.0.1:10080").
    pub listen: String,

    /// Text returned by the status route.
    #[serde(default)]
    pub message: Option<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request timeout in seconds.
    pub request_secs: u64,

    /// How long `close()` waits for inbounds to drain, in milliseconds.
    pub shutdown_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_unknown_keys() {
        let config: EngineConfig = serde_json::from_value(json!({
            "log": { "level": "debug" },
            "inbounds": [{ "tag": "web", "listen": "127.0.0.1:0" }]
        }))
        .unwrap();

        assert_eq!(config.inbounds.len(), 1);
        assert!(config.inbounds[0].message.is_none());
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.timeouts.shutdown_ms, 5_000);
    }
}
