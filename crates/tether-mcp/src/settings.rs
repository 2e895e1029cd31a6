//! Client-wide settings shared by every connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{ClientInfo, MCP_PROTOCOL_VERSION};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single transport write.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings applied to every connection a client opens.
///
/// ```toml
/// [client]
/// request_timeout_secs = 30
/// send_timeout_secs = 10
/// client_name = "tether"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Deadline for a JSON-RPC response, in seconds.
    pub request_timeout_secs: f64,
    /// Deadline for a single transport write, in seconds.
    pub send_timeout_secs: f64,
    /// Protocol version sent in `initialize`.
    pub protocol_version: String,
    /// Client name sent in `initialize`.
    pub client_name: String,
    /// Client version sent in `initialize`.
    pub client_version: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs_f64(),
            send_timeout_secs: DEFAULT_SEND_TIMEOUT.as_secs_f64(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            client_name: "tether".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ClientSettings {
    /// Set the request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Set the transport write deadline.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Set the identity reported to servers.
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }

    /// Deadline for a JSON-RPC response.
    pub fn request_timeout(&self) -> Duration {
        secs_or(self.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Deadline for a single transport write.
    pub fn send_timeout(&self) -> Duration {
        secs_or(self.send_timeout_secs, DEFAULT_SEND_TIMEOUT)
    }

    /// Identity reported in `initialize`.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: self.client_name.clone(),
            version: self.client_version.clone(),
        }
    }
}

fn secs_or(secs: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ClientSettings::default();
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.send_timeout(), Duration::from_secs(10));
        assert_eq!(settings.protocol_version, MCP_PROTOCOL_VERSION);
        assert_eq!(settings.client_info().name, "tether");
    }

    #[test]
    fn test_builders() {
        let settings = ClientSettings::default()
            .with_request_timeout(Duration::from_millis(250))
            .with_send_timeout(Duration::from_secs(2))
            .with_client_info("browser", "9.1");
        assert_eq!(settings.request_timeout(), Duration::from_millis(250));
        assert_eq!(settings.send_timeout(), Duration::from_secs(2));
        assert_eq!(settings.client_info().version, "9.1");
    }

    #[test]
    fn test_invalid_timeouts_fall_back() {
        let settings = ClientSettings {
            request_timeout_secs: -1.0,
            send_timeout_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(settings.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(settings.send_timeout(), DEFAULT_SEND_TIMEOUT);
    }

    #[test]
    fn test_partial_toml_like_json() {
        let settings: ClientSettings =
            serde_json::from_str(r#"{"request_timeout_secs": 5}"#).unwrap();
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.send_timeout(), DEFAULT_SEND_TIMEOUT);
    }
}
