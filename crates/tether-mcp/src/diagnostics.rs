//! Human-oriented explanations for connection failures.

use std::io::ErrorKind;

use crate::config::ServerConfig;
use crate::error::McpError;

/// Explain why connecting to `config` failed with `error`, with a hint on
/// what to check.
pub fn explain(error: &McpError, config: &ServerConfig) -> String {
    match error {
        McpError::InvalidConfig(e) => format!("Configuration is invalid: {}.", e),

        McpError::Spawn { command, source } => match source.kind() {
            ErrorKind::NotFound => format!(
                "Command '{}' was not found. Check that it is installed and on PATH, or use an absolute path.",
                command
            ),
            ErrorKind::PermissionDenied => format!(
                "Command '{}' is not executable. Check its file permissions.",
                command
            ),
            _ => format!("Could not start '{}': {}.", command, source),
        },

        McpError::HttpStatus { status, body } => {
            let hint = match status {
                401 | 403 => "Authentication failed. Check the credentials in the configured headers.",
                404 => "Endpoint not found. Check the URL path.",
                500..=599 => "The server reported an internal error. Check the server's logs.",
                _ => "The server rejected the request.",
            };
            if body.trim().is_empty() {
                format!("HTTP {} from {}. {}", status, url_of(config), hint)
            } else {
                format!("HTTP {} from {}. {} Response: {}", status, url_of(config), hint, body.trim())
            }
        }

        McpError::Http(e) if e.is_connect() => format!(
            "Could not reach {}. Check that the server is running and the host and port are correct.",
            url_of(config)
        ),
        McpError::Http(e) if e.is_timeout() => format!(
            "{} did not respond in time. Check network connectivity.",
            url_of(config)
        ),
        McpError::Http(e) => format!("HTTP request to {} failed: {}.", url_of(config), e),

        McpError::WebSocket(e) => explain_websocket(e, config),

        McpError::Timeout { method, timeout } => format!(
            "No response to '{}' within {:.1}s. The server may be hung, slow to start, or not speaking MCP.",
            method,
            timeout.as_secs_f64()
        ),

        McpError::Json(_) | McpError::Protocol(_) => format!(
            "The server sent a malformed response ({}). Check that '{}' is an MCP server.",
            error,
            config.name
        ),

        McpError::Disconnected | McpError::NotConnected => {
            if config.transport.is_network() {
                format!("{} closed the connection during setup.", url_of(config))
            } else {
                format!(
                    "Process '{}' exited during setup. Run it by hand to see its output.",
                    config.command
                )
            }
        }

        McpError::ServerError { code, message, .. } => {
            format!("The server rejected the handshake (error {}): {}.", code, message)
        }

        other => other.to_string(),
    }
}

fn explain_websocket(
    error: &tokio_tungstenite::tungstenite::Error,
    config: &ServerConfig,
) -> String {
    use tokio_tungstenite::tungstenite::Error;

    match error {
        Error::Io(e) if e.kind() == ErrorKind::ConnectionRefused => format!(
            "Could not reach {}. Check that the server is running and the host and port are correct.",
            url_of(config)
        ),
        Error::Http(response) => format!(
            "WebSocket upgrade to {} was rejected with HTTP {}. Check the URL path and any authentication headers.",
            url_of(config),
            response.status().as_u16()
        ),
        Error::Url(e) => format!("WebSocket URL '{}' is unusable: {}.", url_of(config), e),
        other => format!("WebSocket connection to {} failed: {}.", url_of(config), other),
    }
}

fn url_of(config: &ServerConfig) -> &str {
    config.url.as_deref().unwrap_or("the server")
}
