//! Layered configuration resolution shared by all connection modules
//!
//! A connector config is resolved by merging, lowest precedence first:
//! defaults, a JSON/YAML file, `<PREFIX>_<KEY>` environment variables,
//! explicit values, and overrides (null-valued override entries are dropped
//! so callers can pass through unset optional fields without clobbering
//! lower layers). Required keys are validated after the full merge.

use crate::error::{ConnectError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Replacement string for sensitive values in log-safe copies
pub const REDACTION_MASK: &str = "***";

/// Keys whose values are never logged, matched case-insensitively
const SENSITIVE_KEYS: [&str; 6] = [
    "password",
    "token",
    "secret",
    "api_key",
    "apikey",
    "authorization",
];

/// Resolved connector configuration: an ordered map of scalar values
///
/// Backed by a `BTreeMap` so iteration order (and therefore cache keys and
/// log output) is deterministic regardless of how the map was built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorConfig {
    values: BTreeMap<String, Value>,
}

impl ConnectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// String view of a value; numbers and booleans are stringified
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(value_to_string)
    }

    /// Integer view of a value; numeric strings (e.g. from env vars) parse
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.get_str(key).unwrap_or_else(|| default.to_string())
    }

    pub fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Non-empty string value, or a configuration error naming the key
    pub fn require_str(&self, key: &str) -> Result<String> {
        match self.get_str(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConnectError::configuration(format!(
                "Missing required connection config keys: {key}"
            ))),
        }
    }

    /// Normalized protocol name: trimmed, lower-cased, non-blank
    pub fn protocol(&self) -> Result<String> {
        let raw = self.get_str("protocol").unwrap_or_default();
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ConnectError::configuration(
                "Missing required 'protocol' field in connector configuration",
            ));
        }
        Ok(normalized)
    }

    /// Clone of this config without the given key
    pub fn without(&self, key: &str) -> ConnectorConfig {
        let mut values = self.values.clone();
        values.remove(key);
        Self { values }
    }

    /// Log-safe copy with sensitive values masked; `self` is not mutated
    pub fn redacted(&self) -> ConnectorConfig {
        let values = self
            .values
            .iter()
            .map(|(key, value)| {
                let lowered = key.to_lowercase();
                if SENSITIVE_KEYS.contains(&lowered.as_str()) && !value.is_null() {
                    (key.clone(), Value::String(REDACTION_MASK.to_string()))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect();
        Self { values }
    }

    /// Stable `(key, value)` string pairs for cache keys
    pub fn cache_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value_to_string(value).unwrap_or_default()))
            .collect();
        pairs.sort();
        pairs
    }
}

impl std::fmt::Display for ConnectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let object: serde_json::Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        write!(f, "{}", Value::Object(object))
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // Nested values are kept as their JSON rendering
        other => serde_json::to_string(other).ok(),
    }
}

/// Builder for resolving a connector config from its layered inputs
#[derive(Debug, Default)]
pub struct ConfigLoader {
    defaults: BTreeMap<String, Value>,
    file_path: Option<PathBuf>,
    env_prefix: Option<String>,
    explicit: BTreeMap<String, Value>,
    overrides: BTreeMap<String, Value>,
    required: Vec<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest-precedence layer
    pub fn default_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    /// JSON or YAML file layer; the file must hold an object at the root
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Environment layer: `<PREFIX>_<KEY>` variables, key lower-cased
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Explicit config layer, usually the caller-supplied map
    pub fn explicit(mut self, config: &ConnectorConfig) -> Self {
        self.explicit
            .extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Highest-precedence layer; null-valued entries are dropped
    pub fn override_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.overrides.insert(key.into(), value);
        self
    }

    /// Keys that must be present and non-empty after the merge
    pub fn required(mut self, keys: &[&str]) -> Self {
        self.required = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Merge all layers and validate required keys
    pub fn load(self) -> Result<ConnectorConfig> {
        let mut merged = self.defaults;

        if let Some(ref path) = self.file_path {
            merged.extend(read_config_file(path)?);
        }

        if let Some(ref prefix) = self.env_prefix {
            merged.extend(read_prefixed_env(prefix));
        }

        merged.extend(self.explicit);

        let dropped = self.overrides.values().filter(|v| v.is_null()).count();
        if dropped > 0 {
            debug!(dropped, "Dropped null-valued override entries");
        }
        merged.extend(self.overrides.into_iter().filter(|(_, v)| !v.is_null()));

        let config = ConnectorConfig::from_values(merged);
        ensure_required_keys(&config, &self.required)?;

        info!(config = %config.redacted(), "Connection config resolved");
        Ok(config)
    }
}

/// Read a JSON/YAML config file into a connector config map
///
/// Used directly by the CLI for `--config` files and by the loader for its
/// file layer.
pub fn load_config_file(path: &Path) -> Result<ConnectorConfig> {
    Ok(ConnectorConfig::from_values(read_config_file(path)?))
}

fn read_config_file(path: &Path) -> Result<BTreeMap<String, Value>> {
    if !path.exists() {
        return Err(ConnectError::configuration(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let root: Value = match extension.as_str() {
        "json" => serde_json::from_str(&content)?,
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => {
            return Err(ConnectError::configuration(format!(
                "Unsupported config format '{extension}'. Use JSON (.json) or YAML (.yaml/.yml)"
            )))
        }
    };

    match root {
        Value::Object(object) => {
            info!(path = %path.display(), "Loaded config file");
            Ok(object.into_iter().collect())
        }
        _ => Err(ConnectError::configuration(
            "Config file must contain an object at the root",
        )),
    }
}

fn read_prefixed_env(prefix: &str) -> BTreeMap<String, Value> {
    let token = format!("{}_", prefix.to_uppercase());
    let values: BTreeMap<String, Value> = std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&token)
                .map(|stripped| (stripped.to_lowercase(), Value::String(value)))
        })
        .collect();

    debug!(count = values.len(), prefix = %token, "Loaded config keys from environment");
    values
}

fn ensure_required_keys(config: &ConnectorConfig, required: &[String]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|key| match config.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|key| key.as_str())
        .collect();

    if !missing.is_empty() {
        return Err(ConnectError::configuration(format!(
            "Missing required connection config keys: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
