//! MCP (Model Context Protocol) client over stdio, HTTP-SSE and WebSocket.
//!
//! Connects to any number of MCP servers, performs the `initialize`
//! handshake, discovers their tools and resources, and routes calls to the
//! server that owns them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - Server configs and live connections, in connect order    │
//! │  - Aggregate tool/resource lists, call routing              │
//! │  - validate_config, test_connection                         │
//! └─────────────────────────────────────────────────────────────┘
//!                           │ one per server
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpConnection                                              │
//! │  - initialize handshake, capability refresh                 │
//! │  - Pending-request table keyed by JSON-RPC id               │
//! │  - Receive loop draining TransportEvents                    │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Transport                                                  │
//! │  - StdioTransport: child process, newline-delimited JSON    │
//! │  - SseTransport: text/event-stream GET, POST per message    │
//! │  - WebSocketTransport: one JSON document per frame          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tether_mcp::{ClientSettings, McpClient, ServerConfig};
//!
//! let client = McpClient::new(ClientSettings::default());
//!
//! let config = ServerConfig::stdio("sqlite", "mcp-server-sqlite")
//!     .with_arg("--db")
//!     .with_arg("/path/to/database.db");
//! client.connect(config).await?;
//!
//! for tool in client.available_tools() {
//!     println!("Tool: {} - {}", tool.name, tool.description);
//! }
//!
//! let result = client.call_tool("query", json!({"sql": "SELECT 1"})).await?;
//! println!("Result: {:?}", result.text());
//! ```
//!
//! # Protocol flow
//!
//! 1. Client sends `initialize` with its protocol version and identity
//! 2. Server responds with its info and capabilities
//! 3. Client sends `notifications/initialized`
//! 4. Client lists `tools/list` and `resources/list`
//! 5. Client can now call `tools/call` and `resources/read`

pub mod client;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod settings;
pub mod transport;

pub use client::{ConnectionDiagnosis, ConnectionSummary, McpClient};
pub use config::{ServerConfig, TransportKind};
pub use connection::{ConnectionState, McpConnection, PendingRequests};
pub use error::{McpError, Result, ValidationError};
pub use protocol::{
    CallToolResult, InputSchema, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, Resource, ResourceContents, ServerCapabilities, ServerInfo, Tool, ToolContent,
};
pub use settings::ClientSettings;
pub use transport::{
    EventSink, SseTransport, StdioTransport, Transport, TransportEvent, TransportEvents,
    WebSocketTransport,
};
