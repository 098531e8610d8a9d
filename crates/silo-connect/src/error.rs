//! Error types for the connection layer
//!
//! Expected operational failures (unreachable source, bad credentials) are
//! `Connection` errors; everything else indicates a configuration or
//! programming problem and is reported as such.

use thiserror::Error;

/// Result type alias for connection-layer operations
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Error type for configuration resolution, registry dispatch, and connectors
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No connector is registered for the requested protocol
    #[error("Unsupported protocol '{protocol}'. Registered protocols: {known}")]
    UnsupportedProtocol { protocol: String, known: String },

    /// A connector rejected the parameters it was constructed with
    #[error("Invalid parameters for protocol '{protocol}' using connector '{connector}': {message}")]
    InvalidParameters {
        protocol: String,
        connector: String,
        message: String,
    },

    /// Expected operational failure while talking to an external source
    #[error("Connection failed: {0}")]
    Connection(String),

    /// File system operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// YAML parsing failed
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Client-server database operation failed (sqlx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded database operation failed (rusqlite)
    #[error("Embedded database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP request failed
    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// FTP operation failed
    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),
}

impl ConnectError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a connection (expected operational) error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an invalid-parameters error for a protocol/connector pair
    pub fn invalid_parameters(
        protocol: impl Into<String>,
        connector: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameters {
            protocol: protocol.into(),
            connector: connector.into(),
            message: message.into(),
        }
    }
}
