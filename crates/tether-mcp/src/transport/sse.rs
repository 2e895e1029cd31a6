//! HTTP server-sent-events transport.
//!
//! Inbound messages arrive on a long-lived `GET` with
//! `Accept: text/event-stream`; each outbound message is a separate `POST`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use super::framing::{SseEvent, SseFramer};
use super::{EventSink, Transport, TransportEvents};
use crate::config::TransportKind;
use crate::error::{McpError, Result};

/// Longest response body kept in an [`McpError::HttpStatus`].
const MAX_ERROR_BODY: usize = 512;

/// How long `start` waits for the first event, which may be `endpoint`.
const ENDPOINT_GRACE: Duration = Duration::from_millis(500);

/// Transport that reads a `text/event-stream` and POSTs outbound messages.
///
/// POSTs go to the stream URL until the server announces a different one with
/// an `endpoint` event. `start` holds off returning until the first event has
/// been dispatched (or a short grace period passes), so an endpoint sent up
/// front is in place before the first POST.
pub struct SseTransport {
    url: Url,
    headers: HeaderMap,
    client: reqwest::Client,
    send_timeout: Duration,
    endpoint: Arc<RwLock<Url>>,
    state: Mutex<SseState>,
}

#[derive(Default)]
struct SseState {
    started: bool,
    sink: Option<EventSink>,
    reader: Option<JoinHandle<()>>,
}

impl SseTransport {
    /// Create a transport for the stream at `url`.
    pub fn new(
        url: impl AsRef<str>,
        headers: BTreeMap<String, String>,
        send_timeout: Duration,
    ) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| McpError::transport(format!("invalid URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(send_timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(url = %url, "created SSE transport");

        Ok(Self {
            endpoint: Arc::new(RwLock::new(url.clone())),
            url,
            headers: header_map(&headers)?,
            client,
            send_timeout,
            state: Mutex::new(SseState::default()),
        })
    }

    /// The URL outbound messages are currently POSTed to.
    pub fn endpoint(&self) -> Url {
        self.endpoint.read().clone()
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| McpError::transport(format!("invalid header name '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| McpError::transport(format!("invalid value for header '{}': {}", key, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn start(&self) -> Result<TransportEvents> {
        {
            let mut state = self.state.lock();
            if state.started {
                return Err(McpError::transport("SSE transport already started"));
            }
            state.started = true;
        }

        let request = self
            .client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send();
        let response = tokio::time::timeout(self.send_timeout, request)
            .await
            .map_err(|_| {
                McpError::transport(format!(
                    "no response from {} within {:?}",
                    self.url, self.send_timeout
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, %status, "SSE stream request rejected");
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let (sink, events) = EventSink::channel();
        let (first_tx, first_rx) = oneshot::channel();
        let reader = tokio::spawn(read_stream(
            response,
            sink.clone(),
            Arc::clone(&self.endpoint),
            self.url.clone(),
            first_tx,
        ));
        {
            let mut state = self.state.lock();
            state.sink = Some(sink);
            state.reader = Some(reader);
        }

        if tokio::time::timeout(ENDPOINT_GRACE, first_rx).await.is_err() {
            tracing::debug!(url = %self.url, "no SSE event yet, posting to the stream URL");
        }
        tracing::info!(url = %self.url, endpoint = %self.endpoint(), "opened SSE stream");
        Ok(events)
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        let sink = self
            .state
            .lock()
            .sink
            .clone()
            .filter(|sink| !sink.is_closed())
            .ok_or(McpError::NotConnected)?;
        let endpoint = self.endpoint();

        let response = self
            .client
            .post(endpoint.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.send_timeout)
            .body(message.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }
        tracing::trace!(url = %endpoint, bytes = message.len(), "posted MCP message");

        // Some servers answer inline instead of on the stream.
        let inline_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if inline_json {
            let body = response.bytes().await?;
            if !body.iter().all(u8::is_ascii_whitespace) {
                sink.message(body.to_vec());
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        let (sink, reader) = {
            let mut state = self.state.lock();
            (state.sink.take(), state.reader.take())
        };
        if let Some(reader) = reader {
            reader.abort();
        }
        if let Some(sink) = sink {
            sink.close();
            tracing::debug!(url = %self.url, "closed SSE stream");
        }
    }
}

async fn read_stream(
    response: reqwest::Response,
    sink: EventSink,
    endpoint: Arc<RwLock<Url>>,
    base: Url,
    first_event: oneshot::Sender<()>,
) {
    let mut framer = SseFramer::new();
    let mut stream = Box::pin(response.bytes_stream());
    let mut first_event = Some(first_event);

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for event in framer.push(&bytes) {
                    apply_event(event, &sink, &endpoint, &base);
                    if let Some(tx) = first_event.take() {
                        let _ = tx.send(());
                    }
                }
            }
            Err(e) => {
                sink.error(format!("SSE stream failed: {}", e));
                break;
            }
        }
    }

    tracing::debug!(url = %base, "SSE stream ended");
    sink.close();
}

fn apply_event(event: SseEvent, sink: &EventSink, endpoint: &RwLock<Url>, base: &Url) {
    match event.event.as_deref() {
        None | Some("message") => sink.message(event.data.into_bytes()),
        Some("endpoint") => match base.join(event.data.trim()) {
            Ok(url) => {
                tracing::debug!(endpoint = %url, "SSE server announced message endpoint");
                *endpoint.write() = url;
            }
            Err(e) => sink.error(format!("invalid endpoint '{}': {}", event.data, e)),
        },
        Some(other) => tracing::trace!(event = other, "ignoring SSE event"),
    }
}
