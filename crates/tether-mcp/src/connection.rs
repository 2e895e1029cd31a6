//! One protocol session with one MCP server.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──initialize──▶ Initializing
//!       ▲                                                   │
//!       │                                     refresh_capabilities
//!       │                                                   ▼
//!       └────────────── transport closed / disconnect ─── Ready
//! ```
//!
//! Requests are correlated by a per-connection increasing id. Each pending
//! request is resolved exactly once: by its response, by its timeout, or by
//! the connection closing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{ServerConfig, TransportKind};
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, IncomingMessage, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListResourcesResult, ListToolsResult, LoggingMessageParams, PaginatedParams,
    ReadResourceParams, ReadResourceResult, RequestId, Resource, ServerCapabilities, ServerInfo,
    Tool,
};
use crate::settings::ClientSettings;
use crate::transport::{self, Transport, TransportEvent, TransportEvents};

/// Upper bound on pages fetched for one list request.
const MAX_LIST_PAGES: usize = 100;

/// Lifecycle state of a [`McpConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live transport.
    Disconnected,
    /// Transport started, handshake not yet sent.
    Connecting,
    /// `initialize` in flight or answered; capabilities not yet listed.
    Initializing,
    /// Handshake and capability refresh done.
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

type Completion = oneshot::Sender<Result<Value>>;

/// Table of requests awaiting a response, keyed by request id.
///
/// Once [`fail_all`](Self::fail_all) has run the table is closed and refuses
/// new entries, so nothing registered after a disconnect can be stranded.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<PendingInner>,
}

#[derive(Default)]
struct PendingInner {
    entries: HashMap<u64, Completion>,
    closed: bool,
}

impl PendingRequests {
    /// Register `id` and return the receiver its outcome will be sent to.
    pub fn register(&self, id: u64) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(McpError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        if inner.entries.insert(id, tx).is_some() {
            return Err(McpError::protocol(format!("request id {} already pending", id)));
        }
        Ok(rx)
    }

    /// Resolve `id` with `outcome`. Returns false if `id` was not pending.
    pub fn complete(&self, id: u64, outcome: Result<Value>) -> bool {
        let Some(tx) = self.inner.lock().entries.remove(&id) else {
            return false;
        };
        // The waiter may have given up; that is not an error.
        let _ = tx.send(outcome);
        true
    }

    /// Forget `id` without resolving it.
    pub fn remove(&self, id: u64) -> bool {
        self.inner.lock().entries.remove(&id).is_some()
    }

    /// Fail every pending request with [`McpError::Disconnected`] and close
    /// the table. Returns how many were failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<Completion> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.entries.drain().map(|(_, tx)| tx).collect()
        };
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(McpError::Disconnected));
        }
        count
    }

    /// Number of requests awaiting a response.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether no requests are awaiting a response.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State shared between the connection and its receive loop.
struct Shared {
    server: String,
    transport: Arc<dyn Transport>,
    state: RwLock<ConnectionState>,
    pending: PendingRequests,
    needs_refresh: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Move `from` → `to`; false if the state was something else.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut state = self.state.write();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn mark_closed(&self) -> usize {
        self.set_state(ConnectionState::Disconnected);
        self.pending.fail_all()
    }

    fn handle_message(&self, bytes: &[u8]) {
        let message = match IncomingMessage::parse(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    server = %self.server,
                    error = %e,
                    message = %String::from_utf8_lossy(bytes),
                    "dropping malformed MCP message"
                );
                return;
            }
        };

        match message {
            IncomingMessage::Response(response) => self.handle_response(response),
            IncomingMessage::Request(request) => self.handle_request(request),
            IncomingMessage::Notification(notification) => self.handle_notification(notification),
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let id = match &response.id {
            Some(RequestId::Number(id)) => *id,
            other => {
                tracing::warn!(
                    server = %self.server,
                    id = ?other,
                    error = ?response.error,
                    "dropping response without a usable id"
                );
                return;
            }
        };

        if !self.pending.complete(id, response.into_result()) {
            // Expected when a response races its timeout.
            tracing::debug!(server = %self.server, id, "response for unknown request id");
        }
    }

    /// Answer a server-initiated request. The reply is written from its own
    /// task so a slow transport never holds up response correlation.
    fn handle_request(&self, request: JsonRpcRequest) {
        let response = match request.method.as_str() {
            "ping" => JsonRpcResponse::success(request.id, Value::Object(Default::default())),
            method => {
                tracing::debug!(server = %self.server, method, "unsupported server request");
                JsonRpcResponse::failure(request.id, JsonRpcError::method_not_found(method))
            }
        };
        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(server = %self.server, error = %e, "failed to encode reply");
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        let server = self.server.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send(&payload).await {
                tracing::warn!(server = %server, error = %e, "failed to answer server request");
            }
        });
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/tools/list_changed" | "notifications/resources/list_changed" => {
                tracing::debug!(
                    server = %self.server,
                    method = %notification.method,
                    "server capabilities changed"
                );
                self.needs_refresh.store(true, Ordering::SeqCst);
            }
            "notifications/message" => {
                let params = notification
                    .params
                    .and_then(|p| serde_json::from_value::<LoggingMessageParams>(p).ok());
                if let Some(params) = params {
                    log_server_message(&self.server, params);
                }
            }
            method => tracing::trace!(server = %self.server, method, "ignoring notification"),
        }
    }
}

fn log_server_message(server: &str, params: LoggingMessageParams) {
    let logger = params.logger.as_deref().unwrap_or("");
    let data = &params.data;
    match params.level.as_str() {
        "debug" => tracing::debug!(server, logger, %data, "server log"),
        "info" | "notice" => tracing::info!(server, logger, %data, "server log"),
        "warning" => tracing::warn!(server, logger, %data, "server log"),
        _ => tracing::error!(server, logger, level = %params.level, %data, "server log"),
    }
}

async fn receive_loop(mut events: TransportEvents, shared: Arc<Shared>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Message(bytes) => {
                tracing::trace!(
                    server = %shared.server,
                    message = %String::from_utf8_lossy(&bytes),
                    "received MCP message"
                );
                shared.handle_message(&bytes);
            }
            TransportEvent::Error(error) => {
                tracing::warn!(server = %shared.server, error = %error, "transport error");
            }
            TransportEvent::Closed => break,
        }
    }

    let failed = shared.mark_closed();
    tracing::info!(
        server = %shared.server,
        failed_requests = failed,
        "MCP server connection closed"
    );
}

/// A connection to a single MCP server.
///
/// Single-use: after it disconnects, build a new one to reconnect.
pub struct McpConnection {
    config: ServerConfig,
    settings: ClientSettings,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    used: AtomicBool,
    server_info: RwLock<Option<ServerInfo>>,
    server_capabilities: RwLock<ServerCapabilities>,
    tools: RwLock<Vec<Tool>>,
    resources: RwLock<Vec<Resource>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl McpConnection {
    /// Build a connection using the transport selected by `config`.
    pub fn new(config: ServerConfig, settings: ClientSettings) -> Result<Self> {
        let transport = transport::for_config(&config, &settings)?;
        Ok(Self::with_transport(config, settings, transport))
    }

    /// Build a connection over a caller-supplied transport.
    pub fn with_transport(
        config: ServerConfig,
        settings: ClientSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let shared = Arc::new(Shared {
            server: config.name.clone(),
            transport,
            state: RwLock::new(ConnectionState::Disconnected),
            pending: PendingRequests::default(),
            needs_refresh: AtomicBool::new(false),
        });

        Self {
            config,
            settings,
            shared,
            next_id: AtomicU64::new(1),
            used: AtomicBool::new(false),
            server_info: RwLock::new(None),
            server_capabilities: RwLock::new(ServerCapabilities::default()),
            tools: RwLock::new(Vec::new()),
            resources: RwLock::new(Vec::new()),
            receiver: Mutex::new(None),
        }
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The server id.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// The transport variant in use.
    pub fn transport_kind(&self) -> TransportKind {
        self.shared.transport.kind()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Whether the transport is live (any state but `Disconnected`).
    pub fn is_connected(&self) -> bool {
        self.state() != ConnectionState::Disconnected
    }

    /// Name and version reported by the server, after `initialize`.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().clone()
    }

    /// Capabilities reported by the server, after `initialize`.
    pub fn server_capabilities(&self) -> ServerCapabilities {
        self.server_capabilities.read().clone()
    }

    /// Tools from the last capability refresh.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.read().clone()
    }

    /// Resources from the last capability refresh.
    pub fn resources(&self) -> Vec<Resource> {
        self.resources.read().clone()
    }

    /// Whether the last refresh listed a tool called `name`.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.read().iter().any(|t| t.name == name)
    }

    /// Whether the last refresh listed a resource at `uri`.
    pub fn has_resource(&self, uri: &str) -> bool {
        self.resources.read().iter().any(|r| r.uri == uri)
    }

    /// Whether the server announced a tool or resource list change since the
    /// last refresh.
    pub fn needs_refresh(&self) -> bool {
        self.shared.needs_refresh.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Start the transport and the receive loop.
    pub async fn connect(&self) -> Result<()> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(McpError::protocol(
                "connection already used; create a new connection to reconnect",
            ));
        }
        self.shared.set_state(ConnectionState::Connecting);

        let events = match self.shared.transport.start().await {
            Ok(events) => events,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                self.shared.pending.fail_all();
                return Err(e);
            }
        };

        let handle = tokio::spawn(receive_loop(events, Arc::clone(&self.shared)));
        *self.receiver.lock() = Some(handle);

        tracing::info!(
            server = %self.config.name,
            transport = %self.transport_kind(),
            "connected to MCP server"
        );
        Ok(())
    }

    /// Perform the `initialize` handshake and send `notifications/initialized`.
    pub async fn initialize(&self) -> Result<ServerInfo> {
        if !self
            .shared
            .transition(ConnectionState::Connecting, ConnectionState::Initializing)
        {
            return Err(McpError::protocol(format!(
                "cannot initialize a connection in state '{}'",
                self.state()
            )));
        }

        let params = InitializeParams {
            protocol_version: self.settings.protocol_version.clone(),
            capabilities: ClientCapabilities::default(),
            client_info: self.settings.client_info(),
        };
        let result = self
            .send_request("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        tracing::info!(
            server = %self.config.name,
            name = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP server initialized"
        );

        *self.server_info.write() = Some(init.server_info.clone());
        *self.server_capabilities.write() = init.capabilities;

        if let Err(e) = self
            .send_notification("notifications/initialized", None)
            .await
        {
            tracing::warn!(
                server = %self.config.name,
                error = %e,
                "failed to send initialized notification"
            );
        }

        Ok(init.server_info)
    }

    /// List tools and resources, replacing the cached lists.
    ///
    /// A failure of either list is logged and leaves that list empty; the
    /// connection still becomes ready for whichever succeeded.
    pub async fn refresh_capabilities(&self) -> Result<()> {
        self.shared.needs_refresh.store(false, Ordering::SeqCst);

        let tools = match self.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(server = %self.config.name, error = %e, "failed to list tools");
                Vec::new()
            }
        };
        let resources = match self.list_resources().await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(server = %self.config.name, error = %e, "failed to list resources");
                Vec::new()
            }
        };

        tracing::debug!(
            server = %self.config.name,
            tool_count = tools.len(),
            resource_count = resources.len(),
            "refreshed MCP capabilities"
        );
        *self.tools.write() = tools;
        *self.resources.write() = resources;

        if !self
            .shared
            .transition(ConnectionState::Initializing, ConnectionState::Ready)
            && !self.is_connected()
        {
            return Err(McpError::Disconnected);
        }
        Ok(())
    }

    /// Run connect → initialize → refresh; disconnect again on any failure.
    pub async fn establish(&self) -> Result<ServerInfo> {
        let outcome = async {
            self.connect().await?;
            let info = self.initialize().await?;
            self.refresh_capabilities().await?;
            Ok::<_, McpError>(info)
        }
        .await;

        if outcome.is_err() {
            self.disconnect().await;
        }
        outcome
    }

    /// Stop the transport, then fail every outstanding request.
    pub async fn disconnect(&self) {
        self.shared.transport.stop().await;
        let failed = self.shared.mark_closed();

        let receiver = self.receiver.lock().take();
        if let Some(receiver) = receiver {
            receiver.abort();
        }

        tracing::info!(
            server = %self.config.name,
            failed_requests = failed,
            "disconnected from MCP server"
        );
    }

    /// Send a request and wait for its response or the request deadline.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = serde_json::to_vec(&JsonRpcRequest::new(id, method, params))?;
        let rx = self.shared.pending.register(id)?;

        tracing::trace!(
            server = %self.config.name,
            id,
            method,
            message = %String::from_utf8_lossy(&payload),
            "sending MCP request"
        );

        if let Err(e) = self.shared.transport.send(&payload).await {
            self.shared.pending.remove(id);
            return Err(e);
        }

        let timeout = self.settings.request_timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::Disconnected),
            Err(_) => {
                self.shared.pending.remove(id);
                tracing::warn!(
                    server = %self.config.name,
                    id,
                    method,
                    timeout_secs = timeout.as_secs_f64(),
                    "MCP request timed out"
                );
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Send a notification; no response is expected.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let payload = serde_json::to_vec(&JsonRpcNotification::new(method, params))?;
        self.shared.transport.send(&payload).await
    }

    /// Fetch every page of `tools/list`.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = serde_json::to_value(PaginatedParams { cursor })?;
            let result = self.send_request("tools/list", Some(params)).await?;
            let page: ListToolsResult = serde_json::from_value(result)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    /// Fetch every page of `resources/list`.
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = serde_json::to_value(PaginatedParams { cursor })?;
            let result = self.send_request("resources/list", Some(params)).await?;
            let page: ListResourcesResult = serde_json::from_value(result)?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(resources)
    }

    /// Call a tool on the server.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .send_request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        let call_result: CallToolResult = serde_json::from_value(result)?;

        if call_result.is_error() {
            tracing::warn!(server = %self.config.name, tool = %name, "tool call returned error");
        } else {
            tracing::debug!(server = %self.config.name, tool = %name, "tool call succeeded");
        }
        Ok(call_result)
    }

    /// Read a resource and return the text of its first content entry.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        let result = self
            .send_request("resources/read", Some(serde_json::to_value(&params)?))
            .await?;
        let read: ReadResourceResult = serde_json::from_value(result)?;

        read.contents
            .into_iter()
            .next()
            .and_then(|c| c.text)
            .ok_or_else(|| McpError::NoTextContent(uri.to_string()))
    }
}

impl fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpConnection")
            .field("id", &self.config.id)
            .field("name", &self.config.name)
            .field("transport", &self.transport_kind())
            .field("state", &self.state())
            .finish()
    }
}
