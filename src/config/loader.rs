//! Configuration loading and merging.
//!
//! Every source is parsed into a JSON object and folded into one
//! [`MergedConfig`]:
//! - objects merge key by key, recursively
//! - arrays of objects carrying a string `tag` merge element-wise by tag,
//!   unknown tags are appended
//! - any other array is concatenated
//! - scalars are replaced by the later source

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::config::source::{ConfigSource, SourceEntry};

/// Format hint for configuration inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// JSON, comments tolerated.
    #[default]
    Auto,
    /// Strict JSON.
    Json,
    /// JSON with `//` and `/* */` comments.
    Jsonc,
}

impl ConfigFormat {
    /// Map a user supplied hint; anything unknown means `Auto`.
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "json" => ConfigFormat::Json,
            "jsonc" => ConfigFormat::Jsonc,
            _ => ConfigFormat::Auto,
        }
    }

    fn allows_comments(self) -> bool {
        !matches!(self, ConfigFormat::Json)
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigFormat::Auto => "auto",
            ConfigFormat::Json => "json",
            ConfigFormat::Jsonc => "jsonc",
        })
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read config from stdin: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{origin}: top-level value must be a JSON object")]
    NotAnObject { origin: String },
}

/// The single logical configuration produced from all sources.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedConfig {
    value: Value,
}

impl MergedConfig {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for MergedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pretty = serde_json::to_string_pretty(&self.value).map_err(|_| fmt::Error)?;
        f.write_str(&pretty)
    }
}

/// Parses and merges configuration sources.
pub trait ConfigLoader: Send + Sync {
    fn load(&self, format: ConfigFormat, source: &ConfigSource) -> Result<MergedConfig, ConfigError>;
}

/// Loader for JSON and JSONC documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConfigLoader;

impl ConfigLoader for JsonConfigLoader {
    fn load(&self, format: ConfigFormat, source: &ConfigSource) -> Result<MergedConfig, ConfigError> {
        let mut merged = Value::Object(Map::new());

        for entry in source.entries() {
            let text = read_entry(entry)?;
            let document = parse_document(&text, format, &entry.to_string())?;
            merge_values(&mut merged, document);
        }

        tracing::debug!(sources = source.entries().len(), %format, "Configuration merged");
        Ok(MergedConfig::new(merged))
    }
}

fn read_entry(entry: &SourceEntry) -> Result<String, ConfigError> {
    match entry {
        SourceEntry::Path(path) => fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        }),
        SourceEntry::Stdin => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(ConfigError::Stdin)?;
            Ok(buf)
        }
    }
}

/// Parse one document. `origin` names the input in error messages.
pub fn parse_document(text: &str, format: ConfigFormat, origin: &str) -> Result<Value, ConfigError> {
    let parsed: serde_json::Result<Value> = if format.allows_comments() {
        serde_json::from_str(&strip_comments(text))
    } else {
        serde_json::from_str(text)
    };

    let value = parsed.map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })?;

    if !value.is_object() {
        return Err(ConfigError::NotAnObject {
            origin: origin.to_string(),
        });
    }
    Ok(value)
}

/// Replace `//` and `/* */` comments outside string literals with spaces.
///
/// Newlines are kept so parser positions still match the input.
pub fn strip_comments(text: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Code,
        Str,
        StrEscape,
        Line,
        Block,
    }

    let mut out = String::with_capacity(text.len());
    let mut mode = Mode::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match mode {
            Mode::Code => match (c, chars.peek().copied()) {
                ('"', _) => {
                    mode = Mode::Str;
                    out.push(c);
                }
                ('/', Some('/')) => {
                    chars.next();
                    mode = Mode::Line;
                    out.push_str("  ");
                }
                ('/', Some('*')) => {
                    chars.next();
                    mode = Mode::Block;
                    out.push_str("  ");
                }
                _ => out.push(c),
            },
            Mode::Str => {
                match c {
                    '\\' => mode = Mode::StrEscape,
                    '"' => mode = Mode::Code,
                    _ => {}
                }
                out.push(c);
            }
            Mode::StrEscape => {
                mode = Mode::Str;
                out.push(c);
            }
            Mode::Line => {
                if c == '\n' {
                    mode = Mode::Code;
                    out.push(c);
                } else {
                    out.push(' ');
                }
            }
            Mode::Block => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    mode = Mode::Code;
                    out.push_str("  ");
                } else if c == '\n' {
                    out.push(c);
                } else {
                    out.push(' ');
                }
            }
        }
    }
    out
}

/// Fold `overlay` into `base`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(overlay)) => {
            for item in overlay {
                let existing = tag_of(&item)
                    .and_then(|tag| base.iter().position(|candidate| tag_of(candidate) == Some(tag)));
                match existing {
                    Some(index) => merge_values(&mut base[index], item),
                    None => base.push(item),
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

fn tag_of(value: &Value) -> Option<&str> {
    value.get("tag").and_then(Value::as_str)
}
