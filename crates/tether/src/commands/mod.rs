//! CLI command handlers.

pub mod call;
pub mod list;
pub mod read;
pub mod resources;
pub mod tools;
pub mod validate;

use anyhow::{Context as _, Result};
use tether_mcp::{McpClient, ServerConfig};

use crate::config::CliConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded `servers.toml`.
    pub config: CliConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Look up a server by id or name.
    pub fn server(&self, key: &str) -> Result<&ServerConfig> {
        self.config
            .find(key)
            .with_context(|| format!("no server named '{}' in config", key))
    }

    /// Build a client holding every configured server.
    pub fn client(&self) -> McpClient {
        McpClient::with_configs(self.config.client.clone(), self.config.servers.clone())
    }

    /// Connect `server` only, or every enabled server when `None`.
    pub async fn connected_client(&self, server: Option<&str>) -> Result<McpClient> {
        let client = self.client();
        match server {
            Some(key) => {
                let id = self.server(key)?.id.clone();
                client
                    .connect_server(&id)
                    .await
                    .with_context(|| format!("failed to connect to '{}'", key))?;
            }
            None => {
                let connected = client.connect_all().await;
                if connected == 0 && self.config.servers.iter().any(|s| s.enabled) {
                    anyhow::bail!("could not connect to any enabled server");
                }
            }
        }
        Ok(client)
    }
}

/// Shorten `s` to at most `max` characters, marking the cut with "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// One-line target description: the command line or the URL.
pub fn target(server: &ServerConfig) -> String {
    if server.transport.is_network() {
        server.url.clone().unwrap_or_default()
    } else if server.args.is_empty() {
        server.command.clone()
    } else {
        format!("{} {}", server.command, server.args.join(" "))
    }
}
