//! Error types for MCP operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::TransportKind;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server configuration failed structural validation.
    #[error("invalid server configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    /// Failed to spawn the MCP server process.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        /// The command that was spawned.
        command: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to communicate with the MCP server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport has not been started, or has been stopped.
    #[error("transport is not connected")]
    NotConnected,

    /// The connection closed while a request was outstanding.
    #[error("server disconnected")]
    Disconnected,

    /// An HTTP request returned a non-2xx status.
    #[error("HTTP error {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// HTTP client error.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server returned an error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// No response arrived before the request deadline.
    #[error("timed out after {timeout:?} waiting for '{method}'")]
    Timeout {
        /// The JSON-RPC method that timed out.
        method: String,
        /// The deadline that expired.
        timeout: Duration,
    },

    /// No connected server exposes the named tool.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// No connected server exposes the resource URI.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// No server with the given id is configured or connected.
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// A `resources/read` result carried no text content.
    #[error("resource '{0}' returned no text content")]
    NoTextContent(String),
}

impl McpError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for McpError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Structural problems with a [`ServerConfig`](crate::ServerConfig), found before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The server name is empty.
    #[error("server name must not be empty")]
    EmptyName,

    /// A stdio server has no command.
    #[error("a command is required for stdio servers")]
    EmptyCommand,

    /// An absolute command path does not exist.
    #[error("command '{}' does not exist", .0.display())]
    CommandNotFound(PathBuf),

    /// An absolute command path exists but cannot be executed.
    #[error("command '{}' is not an executable file", .0.display())]
    CommandNotExecutable(PathBuf),

    /// A network server has no URL.
    #[error("a URL is required for {0} servers")]
    MissingUrl(TransportKind),

    /// The URL does not parse.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it failed to parse.
        reason: String,
    },

    /// The URL scheme does not match the transport.
    #[error("URL scheme '{scheme}' does not match {transport} transport (expected {expected})")]
    SchemeMismatch {
        /// The scheme found in the URL.
        scheme: String,
        /// The configured transport.
        transport: TransportKind,
        /// The schemes the transport accepts.
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::Spawn {
            command: "mcp-fs".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("mcp-fs"));

        let err = McpError::server_error(-32600, "Invalid Request", None);
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = McpError::Timeout {
            method: "tools/call".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("tools/call"));
        assert!(!McpError::Disconnected.is_timeout());
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: McpError = ValidationError::EmptyName.into();
        assert!(matches!(
            err,
            McpError::InvalidConfig(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn test_scheme_mismatch_display() {
        let err = ValidationError::SchemeMismatch {
            scheme: "http".to_string(),
            transport: TransportKind::WebSocket,
            expected: "ws or wss",
        };
        let text = err.to_string();
        assert!(text.contains("http"));
        assert!(text.contains("websocket"));
        assert!(text.contains("ws or wss"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let mcp_err: McpError = json_err.into();
        assert!(matches!(mcp_err, McpError::Json(_)));
    }
}
