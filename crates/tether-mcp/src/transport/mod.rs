//! Transport layer for MCP communication.
//!
//! A [`Transport`] moves opaque JSON documents to and from one server. Three
//! variants exist, selected by [`TransportKind`]:
//!
//! - [`StdioTransport`]: child process, newline-delimited JSON on stdin/stdout
//! - [`SseTransport`]: `text/event-stream` GET inbound, POST outbound
//! - [`WebSocketTransport`]: one JSON document per frame
//!
//! Inbound traffic is delivered through the channel returned by
//! [`Transport::start`] rather than through callbacks.

mod framing;
mod sse;
mod stdio;
mod websocket;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{ServerConfig, TransportKind};
use crate::error::{McpError, Result};
use crate::settings::ClientSettings;

pub use framing::{LineFramer, SseEvent, SseFramer};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;

/// Something a transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete inbound message.
    Message(Vec<u8>),
    /// A diagnostic error; not fatal by itself.
    Error(String),
    /// The channel closed. Delivered at most once, and always last.
    Closed,
}

/// Receiving half of a transport's event channel.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// A byte-level channel to one MCP server.
///
/// `start` must be called at most once. `send` before `start` or after
/// `stop` fails with [`McpError::NotConnected`]. `stop` may be called any
/// number of times from any state.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The variant of this transport.
    fn kind(&self) -> TransportKind;

    /// Open the channel and begin reading.
    async fn start(&self) -> Result<TransportEvents>;

    /// Send one complete message.
    async fn send(&self, message: &[u8]) -> Result<()>;

    /// Close the channel and release its OS resources.
    async fn stop(&self);
}

/// Build the transport selected by `config.transport`.
pub fn for_config(config: &ServerConfig, settings: &ClientSettings) -> Result<Arc<dyn Transport>> {
    let send_timeout = settings.send_timeout();
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Stdio => Arc::new(StdioTransport::new(
            &config.command,
            config.args.clone(),
            config.env.clone(),
            send_timeout,
        )),
        TransportKind::Sse => Arc::new(SseTransport::new(
            network_url(config)?,
            config.headers.clone(),
            send_timeout,
        )?),
        TransportKind::WebSocket => Arc::new(WebSocketTransport::new(
            network_url(config)?,
            config.headers.clone(),
            send_timeout,
        )),
    };
    Ok(transport)
}

fn network_url(config: &ServerConfig) -> Result<String> {
    config
        .url
        .clone()
        .ok_or_else(|| McpError::transport(format!("{} transport requires a URL", config.transport)))
}

/// Sending half of a transport's event channel.
///
/// Guarantees that `Closed` is delivered once and that nothing follows it.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    /// Create a sink and its receiver.
    pub fn channel() -> (Self, TransportEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Deliver a complete message.
    pub fn message(&self, message: Vec<u8>) {
        if !self.is_closed() {
            let _ = self.tx.send(TransportEvent::Message(message));
        }
    }

    /// Deliver a diagnostic error.
    pub fn error(&self, error: impl Into<String>) {
        if !self.is_closed() {
            let _ = self.tx.send(TransportEvent::Error(error.into()));
        }
    }

    /// Deliver `Closed` if it has not been delivered yet.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(TransportEvent::Closed);
        }
    }

    /// Whether `Closed` has been delivered.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
