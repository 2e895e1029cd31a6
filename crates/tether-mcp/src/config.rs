//! Server configuration and structural validation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawn a child process and speak newline-delimited JSON over its stdio.
    #[default]
    #[serde(alias = "pipe")]
    Stdio,
    /// Long-lived `text/event-stream` GET for inbound, POST for outbound.
    #[serde(alias = "httpSSE", alias = "http-sse")]
    Sse,
    /// One JSON document per WebSocket frame.
    #[serde(alias = "webSocket", alias = "ws")]
    WebSocket,
}

impl TransportKind {
    /// Whether this transport reaches the server over the network.
    pub fn is_network(self) -> bool {
        !matches!(self, Self::Stdio)
    }

    /// URL schemes accepted for this transport.
    fn schemes(self) -> &'static [&'static str] {
        match self {
            Self::Stdio => &[],
            Self::Sse => &["http", "https"],
            Self::WebSocket => &["ws", "wss"],
        }
    }

    fn expected_schemes(self) -> &'static str {
        match self {
            Self::Stdio => "none",
            Self::Sse => "http or https",
            Self::WebSocket => "ws or wss",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Sse => write!(f, "sse"),
            Self::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Configuration for one MCP server.
///
/// Exactly one of `command` (stdio) or `url` (sse, websocket) is meaningful,
/// selected by `transport`. Two configs are equal when their ids are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Opaque unique identifier.
    #[serde(default = "generate_id")]
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Transport used to reach the server.
    #[serde(default)]
    pub transport: TransportKind,
    /// Command to spawn (stdio only).
    #[serde(default)]
    pub command: String,
    /// Arguments passed to the command (stdio only).
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child process (stdio only).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Server URL (sse and websocket only).
    #[serde(default)]
    pub url: Option<String>,
    /// Extra request headers (sse and websocket only).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Whether `connect_all` should connect this server.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}

impl PartialEq for ServerConfig {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServerConfig {}

impl ServerConfig {
    /// Create a config for a stdio server.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            transport: TransportKind::Stdio,
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Create a config for an HTTP server-sent-events server.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::network(name, TransportKind::Sse, url)
    }

    /// Create a config for a WebSocket server.
    pub fn websocket(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::network(name, TransportKind::WebSocket, url)
    }

    fn network(name: impl Into<String>, transport: TransportKind, url: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            transport,
            command: String::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            url: Some(url.into()),
            headers: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Set the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a request header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set enabled state.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check the config for structural problems without performing any I/O
    /// beyond inspecting an absolute command path on the local filesystem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        match self.transport {
            TransportKind::Stdio => validate_command(&self.command),
            kind => validate_url(kind, self.url.as_deref()),
        }
    }
}

fn validate_command(command: &str) -> Result<(), ValidationError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(ValidationError::EmptyCommand);
    }

    let path = Path::new(command);
    if !path.is_absolute() {
        // Resolved through PATH at spawn time.
        return Ok(());
    }

    let metadata =
        std::fs::metadata(path).map_err(|_| ValidationError::CommandNotFound(path.into()))?;
    if !metadata.is_file() || !is_executable(&metadata) {
        return Err(ValidationError::CommandNotExecutable(path.into()));
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

fn validate_url(kind: TransportKind, url: Option<&str>) -> Result<(), ValidationError> {
    let raw = match url.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(ValidationError::MissingUrl(kind)),
    };

    let parsed = url::Url::parse(raw).map_err(|e| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !kind.schemes().contains(&parsed.scheme()) {
        return Err(ValidationError::SchemeMismatch {
            scheme: parsed.scheme().to_string(),
            transport: kind,
            expected: kind.expected_schemes(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdio_config_builder() {
        let config = ServerConfig::stdio("sqlite", "mcp-server-sqlite")
            .with_id("db")
            .with_arg("--db")
            .with_arg("/path/to/db")
            .with_env_var("DEBUG", "1");

        assert_eq!(config.id, "db");
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.args, vec!["--db", "/path/to/db"]);
        assert_eq!(config.env.get("DEBUG").map(String::as_str), Some("1"));
        assert!(config.enabled);
    }

    #[test]
    fn test_equality_is_by_id() {
        let a = ServerConfig::stdio("one", "cmd-a").with_id("same");
        let b = ServerConfig::sse("two", "http://localhost/sse").with_id("same");
        let c = ServerConfig::stdio("one", "cmd-a");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ServerConfig::stdio("x", "cmd");
        let b = ServerConfig::stdio("x", "cmd");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let config = ServerConfig::stdio("  ", "cmd");
        assert_eq!(config.validate(), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_empty_command_is_invalid() {
        let config = ServerConfig::stdio("srv", "");
        assert_eq!(config.validate(), Err(ValidationError::EmptyCommand));
    }

    #[test]
    fn test_relative_command_is_not_checked() {
        let config = ServerConfig::stdio("srv", "some-command-on-path");
        assert_eq!(config.validate(), Ok(()));
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_executable_is_valid() {
        // Structural only: /bin/echo is not an MCP server, but it is executable.
        let config = ServerConfig::stdio("echo", "/bin/echo");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_missing_absolute_command_is_invalid() {
        let config = ServerConfig::stdio("srv", "/definitely/not/here/mcp-server");
        assert!(matches!(
            config.validate(),
            Err(ValidationError::CommandNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_invalid() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        let config = ServerConfig::stdio("srv", path);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::CommandNotExecutable(_))
        ));
    }

    #[test]
    fn test_directory_is_not_executable_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::stdio("srv", dir.path().to_string_lossy().to_string());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::CommandNotExecutable(_))
        ));
    }

    #[test]
    fn test_network_url_schemes() {
        assert_eq!(
            ServerConfig::sse("s", "https://mcp.example.com/sse").validate(),
            Ok(())
        );
        assert_eq!(
            ServerConfig::websocket("w", "wss://mcp.example.com/ws").validate(),
            Ok(())
        );

        assert!(matches!(
            ServerConfig::sse("s", "ws://mcp.example.com").validate(),
            Err(ValidationError::SchemeMismatch { .. })
        ));
        assert!(matches!(
            ServerConfig::websocket("w", "http://mcp.example.com").validate(),
            Err(ValidationError::SchemeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_or_malformed_url() {
        let mut config = ServerConfig::sse("s", "");
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingUrl(TransportKind::Sse))
        );

        config.url = None;
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingUrl(TransportKind::Sse))
        );

        config.url = Some("not a url".to_string());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_defaults_and_aliases() {
        let json = r#"{"name": "remote", "transport": "httpSSE", "url": "http://localhost:9000/sse"}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.transport, TransportKind::Sse);
        assert!(config.enabled);
        assert!(!config.id.is_empty());

        let json = r#"{"id": "p", "name": "local", "transport": "pipe", "command": "srv"}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.id, "p");
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(TransportKind::Stdio.to_string(), "stdio");
        assert_eq!(TransportKind::Sse.to_string(), "sse");
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
        assert!(TransportKind::Sse.is_network());
        assert!(!TransportKind::Stdio.is_network());
    }
}
