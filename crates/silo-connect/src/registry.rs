//! Protocol-driven connector registry
//!
//! An explicit registration table maps a normalized protocol name to a
//! connector constructor. New integrations register themselves against the
//! table at startup; there is no runtime scanning and no fallback guessing,
//! and registering the same protocol twice is an error.

use crate::cache::{EngineCache, SessionCache};
use crate::config::ConnectorConfig;
use crate::contract::Connector;
use crate::error::{ConnectError, Result};
use crate::sources;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Shared services injected into every connector constructor
#[derive(Clone)]
pub struct ConnectorContext {
    pub engines: Arc<EngineCache>,
    pub sessions: Arc<SessionCache>,
    /// Whether connectors may reuse cached engines/sessions
    pub reuse: bool,
}

impl ConnectorContext {
    /// Fresh caches with reuse enabled
    pub fn new() -> Self {
        Self {
            engines: Arc::new(EngineCache::new()),
            sessions: Arc::new(SessionCache::new()),
            reuse: true,
        }
    }

    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }
}

impl Default for ConnectorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector constructor: receives the config (minus `protocol`) and the
/// shared context
pub type ConnectorCtor = fn(&ConnectorConfig, &ConnectorContext) -> Result<Box<dyn Connector>>;

struct RegistryEntry {
    connector: &'static str,
    ctor: ConnectorCtor,
}

/// Registry mapping protocol names to connector constructors
pub struct ConnectorRegistry {
    context: ConnectorContext,
    entries: HashMap<String, RegistryEntry>,
}

impl ConnectorRegistry {
    /// Empty registry with the given context
    pub fn new(context: ConnectorContext) -> Self {
        Self {
            context,
            entries: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in connectors
    pub fn builtin(context: ConnectorContext) -> Self {
        let mut registry = Self::new(context);
        registry.insert_entry("http", "HttpConnector", sources::http::create);
        registry.insert_entry("postgres", "PostgresConnector", sources::postgres::create);
        registry.insert_entry("sqlite", "SqliteConnector", sources::sqlite::create);
        registry.insert_entry("ftp", "FtpConnector", sources::ftp::create);
        registry
    }

    fn insert_entry(&mut self, protocol: &str, connector: &'static str, ctor: ConnectorCtor) {
        self.entries
            .insert(protocol.to_string(), RegistryEntry { connector, ctor });
    }

    /// Register an additional protocol; duplicates are a resolution error
    pub fn register(
        &mut self,
        protocol: &str,
        connector: &'static str,
        ctor: ConnectorCtor,
    ) -> Result<()> {
        let normalized = protocol.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ConnectError::configuration(
                "Cannot register a connector under a blank protocol name",
            ));
        }
        if let Some(existing) = self.entries.get(&normalized) {
            return Err(ConnectError::configuration(format!(
                "Protocol '{normalized}' is already registered to '{}'",
                existing.connector
            )));
        }
        self.insert_entry(&normalized, connector, ctor);
        Ok(())
    }

    /// Sorted list of registered protocol names
    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn context(&self) -> &ConnectorContext {
        &self.context
    }

    /// Construct the connector for the config's protocol
    pub fn create(&self, config: &ConnectorConfig) -> Result<Box<dyn Connector>> {
        let protocol = config.protocol()?;

        let entry = self
            .entries
            .get(&protocol)
            .ok_or_else(|| ConnectError::UnsupportedProtocol {
                protocol: protocol.clone(),
                known: self.protocols().join(", "),
            })?;

        let payload = config.without("protocol");
        info!(
            protocol = %protocol,
            connector = entry.connector,
            config = %payload.redacted(),
            "Creating connector"
        );

        (entry.ctor)(&payload, &self.context).map_err(|error| match error {
            // A constructor rejecting its inputs is a parameter mismatch
            ConnectError::Configuration(message) => {
                ConnectError::invalid_parameters(&protocol, entry.connector, message)
            }
            other => other,
        })
    }
}
