//! WebSocket transport: one JSON document per frame.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{EventSink, Transport, TransportEvents};
use crate::config::TransportKind;
use crate::error::{McpError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport over a single WebSocket.
///
/// Text and binary frames are both accepted inbound. Outbound messages that
/// are valid UTF-8 go out as text frames. `stop` abandons any send still in
/// flight rather than waiting for it.
pub struct WebSocketTransport {
    url: String,
    headers: BTreeMap<String, String>,
    send_timeout: Duration,
    writer: tokio::sync::Mutex<Option<SplitSink<WsStream, Message>>>,
    state: parking_lot::Mutex<WsState>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct WsState {
    started: bool,
    sink: Option<EventSink>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create a transport for `url`; nothing is opened until `start`.
    pub fn new(
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            headers,
            send_timeout,
            writer: tokio::sync::Mutex::new(None),
            state: parking_lot::Mutex::new(WsState::default()),
            shutdown: watch::Sender::new(false),
        }
    }

    fn is_open(&self) -> bool {
        self.state
            .lock()
            .sink
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn start(&self) -> Result<TransportEvents> {
        {
            let mut state = self.state.lock();
            if state.started {
                return Err(McpError::transport("WebSocket transport already started"));
            }
            state.started = true;
        }

        let mut request = self.url.as_str().into_client_request()?;
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                McpError::transport(format!("invalid header name '{}': {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                McpError::transport(format!("invalid value for header '{}': {}", key, e))
            })?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _response) = tokio::time::timeout(self.send_timeout, connect_async(request))
            .await
            .map_err(|_| {
                McpError::transport(format!(
                    "WebSocket handshake with {} did not complete within {:?}",
                    self.url, self.send_timeout
                ))
            })??;

        let (writer, reader) = stream.split();
        let (sink, events) = EventSink::channel();
        let reader = tokio::spawn(receive_loop(reader, sink.clone(), self.url.clone()));

        *self.writer.lock().await = Some(writer);
        {
            let mut state = self.state.lock();
            state.sink = Some(sink);
            state.reader = Some(reader);
        }

        tracing::info!(url = %self.url, "opened WebSocket");
        Ok(events)
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        let mut shutdown = self.shutdown.subscribe();
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(McpError::NotConnected)?;

        let frame = match std::str::from_utf8(message) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(message.to_vec().into()),
        };

        let outcome = tokio::select! {
            outcome = tokio::time::timeout(self.send_timeout, writer.send(frame)) => outcome,
            _ = shutdown.wait_for(|stopped| *stopped) => return Err(McpError::NotConnected),
        };
        match outcome {
            Ok(Ok(())) => {
                tracing::trace!(bytes = message.len(), "sent MCP WebSocket frame");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(McpError::transport(format!(
                "WebSocket send did not complete within {:?}",
                self.send_timeout
            ))),
        }
    }

    async fn stop(&self) {
        let (sink, reader) = {
            let mut state = self.state.lock();
            (state.sink.take(), state.reader.take())
        };
        self.shutdown.send_replace(true);

        if let Some(reader) = reader {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Best effort; the peer may already be gone.
            let _ = tokio::time::timeout(Duration::from_secs(1), writer.close()).await;
        }
        if let Some(sink) = sink {
            sink.close();
            tracing::debug!(url = %self.url, "closed WebSocket");
        }
    }
}

/// Receive frames until the socket fails or closes; never re-armed after that.
async fn receive_loop(mut reader: SplitStream<WsStream>, sink: EventSink, url: String) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => sink.message(text.as_bytes().to_vec()),
            Ok(Message::Binary(data)) => sink.message(data.to_vec()),
            Ok(Message::Close(frame)) => {
                tracing::debug!(url = %url, ?frame, "server closed WebSocket");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                sink.error(format!("WebSocket receive failed: {}", e));
                break;
            }
        }
    }
    sink.close();
}
