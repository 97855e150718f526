//! One physical streaming link
//!
//! [`Connection::open`] upgrades the socket, negotiates the sub-protocol and
//! runs the `connection_init` / `connection_ack` handshake. Only then is the
//! single reader task spawned; it owns the socket and the table of active
//! subscriptions. Everyone else talks to it through [`ConnectionCommand`]s.

use super::config::ConnectionConfig;
use super::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use super::dispatch::{self, message_text, Dispatcher};
use super::watchdog::Watchdog;
use crate::graphql::request::GraphQLRequest;
use crate::protocol::frame::{ClientFrame, ServerFrame};
use crate::protocol::SubProtocol;
use crate::subscription::handle::{Subscription, SubscriptionShared};
use crate::subscription::next_operation_id;
use crate::subscription::registry::CallbackRegistry;
use crate::traits::{FrameCodec, GraphSocketError, Headers, Result};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{self, header::SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Requests handled by the reader task
pub(crate) enum ConnectionCommand {
    /// Add a subscription and send its start frame
    Register {
        subscription: Arc<SubscriptionShared>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Stop (or release) a subscription
    Stop { id: String },
    /// Close the connection
    Close,
}

struct ConnectionInner {
    id: u64,
    endpoint: String,
    protocol: SubProtocol,
    ack_payload: Option<Value>,
    commands: mpsc::UnboundedSender<ConnectionCommand>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    watchdog: Arc<Watchdog>,
    closed: watch::Receiver<bool>,
}

/// Handle to an open connection; clones share the same socket
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Connect, negotiate a sub-protocol and complete the handshake
    ///
    /// `protocols` is the offer list, most preferred first. Any failure
    /// after the upgrade closes the socket before returning.
    pub async fn open(
        endpoint: &str,
        protocols: &[SubProtocol],
        headers: &Headers,
        config: ConnectionConfig,
    ) -> Result<Self> {
        config.validate()?;
        if protocols.is_empty() {
            return Err(GraphSocketError::UnsupportedProtocol("no sub-protocol offered".into()));
        }

        let request = upgrade_request(endpoint, protocols, headers)?;

        debug!("Connecting to {} offering [{}]", endpoint, SubProtocol::header_value(protocols));
        let (mut socket, response) = tokio::time::timeout(config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                GraphSocketError::Timeout(format!("connecting to {} took longer than {:?}", endpoint, config.connect_timeout))
            })?
            .map_err(|e| GraphSocketError::WebSocket(e.to_string()))?;

        let selected = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok());
        let protocol = match SubProtocol::negotiate(protocols, selected) {
            Ok(protocol) => protocol,
            Err(e) => {
                let _ = socket.close(None).await;
                return Err(e);
            }
        };

        Self::establish(socket, endpoint, protocol, config).await
    }

    /// Run the handshake on an upgraded socket and start the reader
    pub async fn establish<S>(
        mut socket: S,
        endpoint: impl Into<String>,
        protocol: SubProtocol,
        config: ConnectionConfig,
    ) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Unpin
            + Send
            + 'static,
    {
        let endpoint = endpoint.into();
        let codec = protocol.codec();
        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Handshaking));
        let metrics = Arc::new(AtomicMetrics::new());

        let ack_payload = match handshake(&mut socket, codec, &config, &metrics).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Handshake with {} failed: {}", endpoint, e);
                let _ = socket.close().await;
                metrics.increment_socket_closes();
                state.set(ConnectionState::Closed);
                return Err(e);
            }
        };

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        info!("Connection {} to {} open ({})", id, endpoint, protocol);
        state.set(ConnectionState::Open);

        let watchdog = Arc::new(Watchdog::new(config.keep_alive_timeout));
        watchdog.touch();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let dispatcher = Dispatcher::new(
            id,
            codec,
            config,
            ack_payload.clone(),
            Arc::clone(&state),
            Arc::clone(&metrics),
            Arc::clone(&watchdog),
        );
        tokio::spawn(dispatch::run(dispatcher, socket, command_rx, closed_tx));

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                id,
                endpoint,
                protocol,
                ack_payload,
                commands: command_tx,
                state,
                metrics,
                watchdog,
                closed: closed_rx,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Negotiated sub-protocol
    pub fn protocol(&self) -> SubProtocol {
        self.inner.protocol
    }

    /// Payload of the server's `connection_ack`
    pub fn ack_payload(&self) -> Option<&Value> {
        self.inner.ack_payload.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.is_open()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Time since the reader last saw a frame
    pub fn idle_for(&self) -> std::time::Duration {
        self.inner.watchdog.time_since_last_frame()
    }

    /// Start a subscription on this connection
    pub async fn subscribe(
        &self,
        request: GraphQLRequest,
        registry: Arc<CallbackRegistry>,
        auto_close: bool,
    ) -> Result<Subscription> {
        let shared = SubscriptionShared::new(next_operation_id(), request, registry, auto_close);
        self.attach(&shared).await?;
        Ok(Subscription::new(shared))
    }

    /// Hand a subscription to the reader and wait until its start frame is written
    ///
    /// Fails with [`GraphSocketError::ConnectionClosed`] when the reader is
    /// gone before it saw the request; the subscription is then untouched.
    pub(crate) async fn attach(&self, shared: &Arc<SubscriptionShared>) -> Result<()> {
        let closed = || GraphSocketError::ConnectionClosed(format!("connection {} is closed", self.inner.id));

        let (reply_tx, reply_rx) = oneshot::channel();
        shared.attach(self.inner.commands.clone());
        self.inner
            .commands
            .send(ConnectionCommand::Register {
                subscription: Arc::clone(shared),
                reply: reply_tx,
            })
            .map_err(|_| closed())?;

        reply_rx.await.map_err(|_| closed())?
    }

    /// Close the connection; later calls return immediately
    ///
    /// Every subscription still live receives a CONNECTION_ERROR event.
    pub async fn close(&self) {
        if self.inner.commands.send(ConnectionCommand::Close).is_ok() {
            debug!("Close requested for connection {}", self.inner.id);
        }
        self.closed().await;
    }

    /// Wait until the reader has exited and the socket is closed
    pub async fn closed(&self) {
        let mut closed = self.inner.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("protocol", &self.inner.protocol)
            .field("state", &self.state())
            .finish()
    }
}

/// Build the upgrade request with headers and the protocol offer
fn upgrade_request(
    endpoint: &str,
    protocols: &[SubProtocol],
    headers: &Headers,
) -> Result<http::Request<()>> {
    let mut request = endpoint
        .into_client_request()
        .map_err(|e| GraphSocketError::Configuration(format!("invalid endpoint '{}': {}", endpoint, e)))?;

    for (key, value) in headers {
        match key.parse::<http::header::HeaderName>() {
            Ok(header_name) => match value.parse::<http::header::HeaderValue>() {
                Ok(header_value) => {
                    request.headers_mut().insert(header_name, header_value);
                }
                Err(_) => {
                    warn!("Invalid header value for key '{}': {}", key, value);
                }
            },
            Err(_) => {
                warn!("Invalid header name: {}", key);
            }
        }
    }

    let offer = SubProtocol::header_value(protocols);
    let offer = http::header::HeaderValue::from_str(&offer)
        .map_err(|e| GraphSocketError::Configuration(e.to_string()))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offer);

    Ok(request)
}

/// Send `connection_init` and wait for `connection_ack`
async fn handshake<S>(
    socket: &mut S,
    codec: &'static dyn FrameCodec,
    config: &ConnectionConfig,
    metrics: &AtomicMetrics,
) -> Result<Option<Value>>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let init = codec
        .encode(&ClientFrame::ConnectionInit {
            payload: config.init_payload.clone(),
        })?
        .ok_or_else(|| GraphSocketError::Handshake("protocol has no init frame".into()))?;

    socket
        .send(Message::Text(init))
        .await
        .map_err(|e| GraphSocketError::Handshake(format!("failed to send connection_init: {}", e)))?;
    metrics.increment_sent();

    let wait_for_ack = async {
        loop {
            let message = match socket.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(GraphSocketError::Handshake(e.to_string())),
                None => {
                    return Err(GraphSocketError::Handshake(
                        "socket closed before connection_ack".into(),
                    ))
                }
            };
            metrics.increment_received();

            if let Message::Close(frame) = &message {
                let reason = frame
                    .as_ref()
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "no reason".into());
                return Err(GraphSocketError::Handshake(format!("server closed the socket: {}", reason)));
            }

            let Some(text) = message_text(message) else {
                continue;
            };
            let text = text.map_err(GraphSocketError::Handshake)?;
            debug!("<- {}", text);

            match codec.decode(&text) {
                Ok(ServerFrame::ConnectionAck { payload }) => return Ok(payload),
                Ok(ServerFrame::KeepAlive) | Ok(ServerFrame::Pong { .. }) => continue,
                Ok(ServerFrame::Ping { payload }) => {
                    if let Some(pong) = codec.encode(&ClientFrame::Pong { payload })? {
                        socket
                            .send(Message::Text(pong))
                            .await
                            .map_err(|e| GraphSocketError::Handshake(e.to_string()))?;
                        metrics.increment_sent();
                    }
                }
                Ok(ServerFrame::ConnectionError { payload }) => {
                    let detail = payload.map(|p| p.to_string()).unwrap_or_default();
                    return Err(GraphSocketError::Handshake(format!(
                        "server rejected connection_init: {}",
                        detail
                    )));
                }
                Ok(other) => {
                    return Err(GraphSocketError::Handshake(format!(
                        "unexpected frame during handshake: {:?}",
                        other
                    )))
                }
                Err(e) => {
                    return Err(GraphSocketError::Handshake(format!(
                        "undecodable frame during handshake: {}",
                        e
                    )))
                }
            }
        }
    };

    tokio::time::timeout(config.handshake_timeout, wait_for_ack)
        .await
        .map_err(|_| {
            GraphSocketError::Handshake(format!(
                "no connection_ack within {:?}",
                config.handshake_timeout
            ))
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_request_offers_protocols() {
        let mut headers = Headers::new();
        headers.insert("Authorization".into(), "Bearer t".into());
        headers.insert("bad header".into(), "x".into());

        let request = upgrade_request(
            "ws://localhost:4000/graphql",
            &SubProtocol::DEFAULT_PREFERENCE,
            &headers,
        )
        .unwrap();

        assert_eq!(
            request.headers()[SEC_WEBSOCKET_PROTOCOL],
            "graphql-transport-ws,graphql-ws"
        );
        assert_eq!(request.headers()["authorization"], "Bearer t");
        assert!(request.headers().get("bad header").is_none());
    }

    #[test]
    fn test_upgrade_request_rejects_bad_endpoint() {
        let result = upgrade_request("not a url", &[SubProtocol::GraphqlWs], &Headers::new());
        assert!(matches!(result, Err(GraphSocketError::Configuration(_))));
    }
}
