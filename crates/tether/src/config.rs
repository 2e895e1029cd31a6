//! Loading the server list from `servers.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tether_mcp::{ClientSettings, ServerConfig};
use thiserror::Error;

/// Application directory name under the platform config dir.
const APP_NAME: &str = "tether";

/// Config file name inside the application directory.
const CONFIG_FILE: &str = "servers.toml";

/// Errors loading the CLI configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two servers share an id.
    #[error("duplicate server id '{0}'")]
    DuplicateId(String),

    /// No config path could be determined.
    #[error("no config directory found; pass --config")]
    NoConfigDir,
}

/// Contents of `servers.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Settings shared by every connection.
    pub client: ClientSettings,
    /// Configured servers, in connect order.
    pub servers: Vec<ServerConfig>,
}

impl CliConfig {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        let mut seen = std::collections::HashSet::new();
        for server in &config.servers {
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::DuplicateId(server.id.clone()));
            }
        }
        Ok(config)
    }

    /// Find a server by id, falling back to name.
    pub fn find(&self, key: &str) -> Option<&ServerConfig> {
        self.servers
            .iter()
            .find(|s| s.id == key)
            .or_else(|| self.servers.iter().find(|s| s.name == key))
    }
}

/// Default config path: `$XDG_CONFIG_HOME/tether/servers.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(CONFIG_FILE))
}

/// Load the config at `path`, or at the default path when `None`.
///
/// A missing default file yields an empty config; a missing explicit file is
/// an error.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path().ok_or(ConfigError::NoConfigDir)?, false),
    };

    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using empty config");
        return Ok(CliConfig::default());
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = CliConfig::from_toml(&contents)?;
    tracing::debug!(
        path = %path.display(),
        servers = config.servers.len(),
        "loaded config"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tether_mcp::TransportKind;

    const SAMPLE: &str = r#"
[client]
request_timeout_secs = 5

[[servers]]
id = "fs"
name = "Filesystem"
transport = "stdio"
command = "/usr/local/bin/mcp-fs"
args = ["--root", "/tmp"]

[servers.env]
LOG_LEVEL = "debug"

[[servers]]
id = "remote"
name = "Remote"
transport = "sse"
url = "https://mcp.example.com/sse"
enabled = false

[servers.headers]
Authorization = "Bearer abc"

[[servers]]
name = "Socket"
transport = "ws"
url = "ws://localhost:9000/mcp"
"#;

    #[test]
    fn test_parse_sample() {
        let config = CliConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.client.request_timeout().as_secs(), 5);
        assert_eq!(config.client.send_timeout().as_secs(), 10);
        assert_eq!(config.servers.len(), 3);

        let fs = config.find("fs").unwrap();
        assert_eq!(fs.transport, TransportKind::Stdio);
        assert_eq!(fs.args, vec!["--root", "/tmp"]);
        assert_eq!(fs.env.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        assert!(fs.enabled);

        let remote = config.find("Remote").unwrap();
        assert_eq!(remote.transport, TransportKind::Sse);
        assert!(!remote.enabled);
        assert_eq!(remote.headers.len(), 1);

        let socket = config.find("Socket").unwrap();
        assert_eq!(socket.transport, TransportKind::WebSocket);
        assert!(!socket.id.is_empty());
    }

    #[test]
    fn test_empty_config() {
        let config = CliConfig::from_toml("").unwrap();
        assert!(config.servers.is_empty());
        assert_eq!(config.client.client_name, "tether");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let toml = r#"
[[servers]]
id = "a"
name = "One"
command = "one"

[[servers]]
id = "a"
name = "Two"
command = "two"
"#;
        assert!(matches!(
            CliConfig::from_toml(toml),
            Err(ConfigError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.servers.len(), 3);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            CliConfig::from_toml("[[servers]]\nname = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
