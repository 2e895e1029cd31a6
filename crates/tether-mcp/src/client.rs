//! Aggregating client: owns server configs and their live connections.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::ServerConfig;
use crate::connection::McpConnection;
use crate::diagnostics;
use crate::error::{McpError, Result, ValidationError};
use crate::protocol::{CallToolResult, Resource, Tool};
use crate::settings::ClientSettings;

/// Outcome of a successful [`McpClient::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Name the server reported.
    pub server_name: String,
    /// Version the server reported.
    pub server_version: String,
    /// Number of tools listed.
    pub tool_count: usize,
    /// Number of resources listed.
    pub resource_count: usize,
}

/// Why a [`McpClient::test_connection`] failed.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct ConnectionDiagnosis {
    /// Actionable explanation.
    pub reason: String,
    /// The underlying failure.
    #[source]
    pub error: McpError,
}

/// Client for multiple MCP servers.
///
/// Connections are kept in the order they were established. When two
/// connected servers expose the same tool name or resource URI, the one
/// connected first wins; use [`call_tool_on`](Self::call_tool_on) or
/// [`read_resource_from`](Self::read_resource_from) to pick explicitly.
pub struct McpClient {
    settings: ClientSettings,
    configs: RwLock<Vec<ServerConfig>>,
    connections: RwLock<Vec<(String, Arc<McpConnection>)>>,
}

impl McpClient {
    /// Create a client with no servers.
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            configs: RwLock::new(Vec::new()),
            connections: RwLock::new(Vec::new()),
        }
    }

    /// Create a client with an initial set of server configs.
    pub fn with_configs(settings: ClientSettings, configs: Vec<ServerConfig>) -> Self {
        let client = Self::new(settings);
        for config in configs {
            client.add_server(config);
        }
        client
    }

    /// Settings applied to every connection.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a server config, replacing any config with the same id.
    pub fn add_server(&self, config: ServerConfig) {
        let mut configs = self.configs.write();
        match configs.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => *existing = config,
            None => configs.push(config),
        }
    }

    /// Replace a server config and drop its live connection, if any.
    pub async fn update_server(&self, config: ServerConfig) -> Result<()> {
        let known = self.configs.read().iter().any(|c| c.id == config.id);
        if !known {
            return Err(McpError::ServerNotFound(config.id));
        }
        self.disconnect(&config.id).await;
        self.add_server(config);
        Ok(())
    }

    /// Disconnect and forget a server. Returns false if it was unknown.
    pub async fn remove_server(&self, id: &str) -> bool {
        self.disconnect(id).await;
        let mut configs = self.configs.write();
        let before = configs.len();
        configs.retain(|c| c.id != id);
        configs.len() != before
    }

    /// All registered server configs.
    pub fn server_configs(&self) -> Vec<ServerConfig> {
        self.configs.read().clone()
    }

    /// The config registered under `id`.
    pub fn server(&self, id: &str) -> Option<ServerConfig> {
        self.configs.read().iter().find(|c| c.id == id).cloned()
    }

    /// Check a config for structural problems without any I/O.
    pub fn validate_config(config: &ServerConfig) -> std::result::Result<(), ValidationError> {
        config.validate()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate, connect, handshake and list capabilities, then register the
    /// config and the connection. Nothing is registered if any step fails.
    ///
    /// An existing connection for the same id is replaced and disconnected.
    pub async fn connect(&self, config: ServerConfig) -> Result<Arc<McpConnection>> {
        config.validate()?;

        let id = config.id.clone();
        let name = config.name.clone();
        let connection = Arc::new(McpConnection::new(config, self.settings.clone())?);
        connection.establish().await.inspect_err(|e| {
            tracing::warn!(server = %name, error = %e, "failed to connect to MCP server");
        })?;

        self.add_server(connection.config().clone());
        let displaced = {
            let mut connections = self.connections.write();
            let displaced = connections
                .iter()
                .position(|(existing, _)| *existing == id)
                .map(|index| connections.remove(index).1);
            connections.push((id.clone(), Arc::clone(&connection)));
            displaced
        };
        if let Some(old) = displaced {
            old.disconnect().await;
        }

        tracing::info!(
            server = %name,
            id = %id,
            tool_count = connection.tools().len(),
            resource_count = connection.resources().len(),
            "registered MCP server"
        );
        Ok(connection)
    }

    /// Connect the registered server `id`.
    pub async fn connect_server(&self, id: &str) -> Result<Arc<McpConnection>> {
        let config = self
            .server(id)
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;
        self.connect(config).await
    }

    /// Connect every enabled server, in registration order. Failures are
    /// logged and skipped. Returns the number connected.
    pub async fn connect_all(&self) -> usize {
        let configs: Vec<ServerConfig> = self
            .configs
            .read()
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect();

        let mut connected = 0;
        for config in configs {
            if self.connect(config).await.is_ok() {
                connected += 1;
            }
        }
        tracing::info!(connected, "connected MCP servers");
        connected
    }

    /// Disconnect and deregister `id`. A no-op if it is not connected.
    pub async fn disconnect(&self, id: &str) {
        let removed = {
            let mut connections = self.connections.write();
            connections
                .iter()
                .position(|(existing, _)| existing == id)
                .map(|index| connections.remove(index).1)
        };
        if let Some(connection) = removed {
            connection.disconnect().await;
        }
    }

    /// Disconnect every server.
    pub async fn disconnect_all(&self) {
        let drained: Vec<_> = self.connections.write().drain(..).collect();
        for (_, connection) in drained {
            connection.disconnect().await;
        }
    }

    /// Re-list tools and resources for `id`.
    pub async fn refresh(&self, id: &str) -> Result<()> {
        let connection = self
            .connection(id)
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;
        connection.refresh_capabilities().await
    }

    /// Whether `id` has a live connection.
    pub fn is_connected(&self, id: &str) -> bool {
        self.connection(id).is_some_and(|c| c.is_connected())
    }

    /// The registered connection for `id`, live or not.
    pub fn connection(&self, id: &str) -> Option<Arc<McpConnection>> {
        self.connections
            .read()
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, connection)| Arc::clone(connection))
    }

    /// Ids of live connections, in connect order.
    pub fn connected_server_ids(&self) -> Vec<String> {
        self.live()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    fn live(&self) -> Vec<(String, Arc<McpConnection>)> {
        self.connections
            .read()
            .iter()
            .filter(|(_, connection)| connection.is_connected())
            .map(|(id, connection)| (id.clone(), Arc::clone(connection)))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregate view
    // ─────────────────────────────────────────────────────────────────────────

    /// Tools of every live connection, concatenated in connect order.
    pub fn available_tools(&self) -> Vec<Tool> {
        self.live()
            .into_iter()
            .flat_map(|(_, connection)| connection.tools())
            .collect()
    }

    /// Tools of every live connection, paired with the owning server id.
    pub fn available_tools_by_server(&self) -> Vec<(String, Tool)> {
        self.live()
            .into_iter()
            .flat_map(|(id, connection)| {
                connection
                    .tools()
                    .into_iter()
                    .map(move |tool| (id.clone(), tool))
            })
            .collect()
    }

    /// Resources of every live connection, concatenated in connect order.
    pub fn available_resources(&self) -> Vec<Resource> {
        self.live()
            .into_iter()
            .flat_map(|(_, connection)| connection.resources())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Routing
    // ─────────────────────────────────────────────────────────────────────────

    /// Call `name` on the first live connection that lists it.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let connection = self
            .live()
            .into_iter()
            .map(|(_, connection)| connection)
            .find(|connection| connection.has_tool(name))
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
        connection.call_tool(name, arguments).await
    }

    /// Call `name` on server `id`.
    pub async fn call_tool_on(
        &self,
        id: &str,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult> {
        let connection = self.live_connection(id)?;
        if !connection.has_tool(name) {
            return Err(McpError::ToolNotFound(name.to_string()));
        }
        connection.call_tool(name, arguments).await
    }

    /// Read `uri` from the first live connection that lists it.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        let connection = self
            .live()
            .into_iter()
            .map(|(_, connection)| connection)
            .find(|connection| connection.has_resource(uri))
            .ok_or_else(|| McpError::ResourceNotFound(uri.to_string()))?;
        connection.read_resource(uri).await
    }

    /// Read `uri` from server `id`, whether or not it was listed.
    pub async fn read_resource_from(&self, id: &str, uri: &str) -> Result<String> {
        self.live_connection(id)?.read_resource(uri).await
    }

    fn live_connection(&self, id: &str) -> Result<Arc<McpConnection>> {
        match self.connection(id) {
            Some(connection) if connection.is_connected() => Ok(connection),
            Some(_) => Err(McpError::NotConnected),
            None => Err(McpError::ServerNotFound(id.to_string())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Diagnostics
    // ─────────────────────────────────────────────────────────────────────────

    /// Connect, list capabilities and disconnect without registering
    /// anything.
    pub async fn test_connection(
        &self,
        config: &ServerConfig,
    ) -> std::result::Result<ConnectionSummary, ConnectionDiagnosis> {
        let diagnose = |error: McpError| ConnectionDiagnosis {
            reason: diagnostics::explain(&error, config),
            error,
        };

        config.validate().map_err(|e| diagnose(e.into()))?;
        let connection =
            McpConnection::new(config.clone(), self.settings.clone()).map_err(diagnose)?;
        let info = connection.establish().await.map_err(diagnose)?;

        let summary = ConnectionSummary {
            server_name: info.name,
            server_version: info.version,
            tool_count: connection.tools().len(),
            resource_count: connection.resources().len(),
        };
        connection.disconnect().await;

        tracing::info!(
            server = %config.name,
            tool_count = summary.tool_count,
            resource_count = summary.resource_count,
            "MCP connection test succeeded"
        );
        Ok(summary)
    }
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry() {
        let client = McpClient::default();
        client.add_server(ServerConfig::stdio("one", "server-one").with_id("a"));
        client.add_server(ServerConfig::stdio("two", "server-two").with_id("b"));
        client.add_server(ServerConfig::stdio("one again", "server-one").with_id("a"));

        let configs = client.server_configs();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].name, "one again");
        assert_eq!(client.server("b").map(|c| c.name), Some("two".to_string()));
        assert!(client.server("c").is_none());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let client = McpClient::default();
        client.add_server(ServerConfig::stdio("one", "server-one").with_id("a"));

        let missing = client
            .update_server(ServerConfig::stdio("x", "x").with_id("zzz"))
            .await;
        assert!(matches!(missing, Err(McpError::ServerNotFound(id)) if id == "zzz"));

        client
            .update_server(ServerConfig::stdio("renamed", "server-one").with_id("a"))
            .await
            .unwrap();
        assert_eq!(client.server("a").unwrap().name, "renamed");

        assert!(client.remove_server("a").await);
        assert!(!client.remove_server("a").await);
        assert!(client.server_configs().is_empty());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config_without_registering() {
        let client = McpClient::default();
        let result = client.connect(ServerConfig::stdio("", "cat")).await;
        assert!(matches!(
            result,
            Err(McpError::InvalidConfig(ValidationError::EmptyName))
        ));

        let result = client
            .connect(ServerConfig::websocket("ws", "http://localhost:1"))
            .await;
        assert!(matches!(
            result,
            Err(McpError::InvalidConfig(ValidationError::SchemeMismatch { .. }))
        ));
        assert!(client.connected_server_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_connect_registers_nothing() {
        let client = McpClient::default();
        let config = ServerConfig::stdio("ghost", "nonexistent-mcp-server-12345").with_id("ghost");
        assert!(matches!(
            client.connect(config).await,
            Err(McpError::Spawn { .. })
        ));
        assert!(client.connection("ghost").is_none());
        assert!(!client.is_connected("ghost"));
    }

    #[tokio::test]
    async fn test_routing_with_nothing_connected() {
        let client = McpClient::default();
        assert!(matches!(
            client.call_tool("search", json!({})).await,
            Err(McpError::ToolNotFound(name)) if name == "search"
        ));
        assert!(matches!(
            client.read_resource("file:///x").await,
            Err(McpError::ResourceNotFound(uri)) if uri == "file:///x"
        ));
        assert!(matches!(
            client.call_tool_on("a", "search", json!({})).await,
            Err(McpError::ServerNotFound(_))
        ));
        assert!(client.available_tools().is_empty());
        assert!(client.available_resources().is_empty());

        // Disconnecting something never connected is a no-op.
        client.disconnect("a").await;
        client.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_test_connection_translates_failures() {
        let client = McpClient::default();

        let diagnosis = client
            .test_connection(&ServerConfig::stdio("ghost", "nonexistent-mcp-server-12345"))
            .await
            .unwrap_err();
        assert!(diagnosis.reason.contains("not found"));
        assert!(matches!(diagnosis.error, McpError::Spawn { .. }));

        let diagnosis = client
            .test_connection(&ServerConfig::sse("", "http://localhost:1/sse"))
            .await
            .unwrap_err();
        assert!(diagnosis.reason.contains("name must not be empty"));
    }

    #[tokio::test]
    async fn test_connect_all_skips_disabled() {
        let client = McpClient::with_configs(
            ClientSettings::default(),
            vec![
                ServerConfig::stdio("off", "nonexistent-mcp-server-12345").with_enabled(false),
                ServerConfig::stdio("broken", "nonexistent-mcp-server-12345"),
            ],
        );
        assert_eq!(client.connect_all().await, 0);
    }
}
