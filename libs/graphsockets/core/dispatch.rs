//! Event dispatch loop
//!
//! One task per connection. It is the only reader of the socket, the only
//! writer to it after the handshake, and the only mutator of the table of
//! active subscriptions:
//!
//! ```text
//! commands (register/stop/close) ──┐
//! socket frames ───────────────────┼──> select! ──> state machine ──> registry
//! watchdog / stop grace / ping ────┘
//! ```
//!
//! Callbacks never block it: synchronous ones run inline, suspending ones
//! are spawned into the subscription's in-flight set.

use super::config::ConnectionConfig;
use super::connection::ConnectionCommand;
use super::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use super::heartbeat::spawn_heartbeat;
use super::watchdog::Watchdog;
use crate::protocol::frame::{ClientFrame, ServerFrame};
use crate::protocol::state::{StateInput, SubscriptionState};
use crate::subscription::event::{EventType, SubscriptionEvent};
use crate::subscription::handle::SubscriptionShared;
use crate::traits::{FrameCodec, GraphSocketError, Result};
use futures::stream::SplitSink;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the loop ended
#[derive(Debug)]
enum Exit {
    /// `close()` was called or every handle was dropped
    Requested,
    /// Last subscription removed with `close_when_idle`
    Idle,
    /// Connection-wide failure
    Failed { reason: String, payload: Option<Value> },
}

impl Exit {
    fn failed(reason: impl Into<String>) -> Self {
        Exit::Failed {
            reason: reason.into(),
            payload: None,
        }
    }
}

/// Operation frame routed to one subscription
enum Routed {
    Data(Value),
    Error(Value),
    Complete,
    Unexpected(String),
}

/// Text of a data message; `None` for control frames
pub(crate) fn message_text(message: Message) -> Option<std::result::Result<String, String>> {
    match message {
        Message::Text(text) => Some(Ok(text)),
        Message::Binary(bytes) => Some(String::from_utf8(bytes).map_err(|_| "binary frame is not UTF-8".to_string())),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

/// Loop state owned by the reader task
pub(crate) struct Dispatcher {
    connection_id: u64,
    codec: &'static dyn FrameCodec,
    config: ConnectionConfig,
    ack_payload: Option<Value>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    watchdog: Arc<Watchdog>,
    subscriptions: HashMap<String, Arc<SubscriptionShared>>,
    stop_deadlines: HashMap<String, Instant>,
}

impl Dispatcher {
    pub(crate) fn new(
        connection_id: u64,
        codec: &'static dyn FrameCodec,
        config: ConnectionConfig,
        ack_payload: Option<Value>,
        state: Arc<AtomicConnectionState>,
        metrics: Arc<AtomicMetrics>,
        watchdog: Arc<Watchdog>,
    ) -> Self {
        Self {
            connection_id,
            codec,
            config,
            ack_payload,
            state,
            metrics,
            watchdog,
            subscriptions: HashMap::new(),
            stop_deadlines: HashMap::new(),
        }
    }

    async fn send<Si>(&self, sink: &mut Si, frame: &ClientFrame) -> Result<()>
    where
        Si: Sink<Message, Error = WsError> + Unpin,
    {
        let Some(text) = self.codec.encode(frame)? else {
            return Ok(());
        };
        debug!("-> {}", text);
        sink.send(Message::Text(text))
            .await
            .map_err(|e| GraphSocketError::WebSocket(e.to_string()))?;
        self.metrics.increment_sent();
        Ok(())
    }

    async fn on_command<Si>(&mut self, sink: &mut Si, command: ConnectionCommand) -> Option<Exit>
    where
        Si: Sink<Message, Error = WsError> + Unpin,
    {
        match command {
            ConnectionCommand::Register { subscription, reply } => {
                self.on_register(sink, subscription, reply).await
            }
            ConnectionCommand::Stop { id } => self.on_stop(sink, &id).await,
            ConnectionCommand::Close => {
                info!("Connection {} closing on request", self.connection_id);
                Some(Exit::Requested)
            }
        }
    }

    async fn on_register<Si>(
        &mut self,
        sink: &mut Si,
        subscription: Arc<SubscriptionShared>,
        reply: oneshot::Sender<Result<()>>,
    ) -> Option<Exit>
    where
        Si: Sink<Message, Error = WsError> + Unpin,
    {
        let id = subscription.id.clone();
        if self.subscriptions.contains_key(&id) {
            let _ = reply.send(Err(GraphSocketError::Configuration(format!(
                "operation id {} already in use",
                id
            ))));
            return None;
        }

        if let Err(e) = subscription.apply(StateInput::SendStart) {
            let _ = reply.send(Err(e.into()));
            return None;
        }

        let ack = SubscriptionEvent::new(EventType::ConnectionAck, &id).with_payload(self.ack_payload.clone());
        subscription.dispatch(&ack);

        let start = ClientFrame::Start {
            id: id.clone(),
            payload: subscription.request.payload(),
        };
        self.subscriptions.insert(id.clone(), subscription);
        debug!("Connection {}: started operation {}", self.connection_id, id);

        match self.send(sink, &start).await {
            Ok(()) => {
                let _ = reply.send(Ok(()));
                None
            }
            Err(e) => {
                error!("Failed to send start frame for {}: {}", id, e);
                let reason = e.to_string();
                let _ = reply.send(Err(e));
                Some(Exit::failed(reason))
            }
        }
    }

    async fn on_stop<Si>(&mut self, sink: &mut Si, id: &str) -> Option<Exit>
    where
        Si: Sink<Message, Error = WsError> + Unpin,
    {
        let Some(subscription) = self.subscriptions.get(id).cloned() else {
            // Already removed (auto-closed or connection-level failure)
            return None;
        };

        if subscription.state().is_terminal() {
            let _ = subscription.apply(StateInput::Release);
            return self.remove(id);
        }

        match subscription.apply(StateInput::Unsubscribe) {
            Ok(transition) if transition.to == SubscriptionState::Stopping && transition.changed() => {
                if let Err(e) = self.send(sink, &ClientFrame::Stop { id: id.to_string() }).await {
                    error!("Failed to send stop frame for {}: {}", id, e);
                    return Some(Exit::failed(e.to_string()));
                }
                if self.codec.acknowledges_stop() {
                    self.stop_deadlines
                        .insert(id.to_string(), Instant::now() + self.config.stop_grace_timeout);
                    None
                } else {
                    let _ = subscription.apply(StateInput::StopSent);
                    self.remove(id)
                }
            }
            Ok(transition) if transition.to.is_terminal() => self.remove(id),
            _ => None,
        }
    }

    fn expire_stops(&mut self) -> Option<Exit> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .stop_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut exit = None;
        for id in expired {
            debug!("Stop of {} not acknowledged in time", id);
            if let Some(subscription) = self.subscriptions.get(&id) {
                let _ = subscription.apply(StateInput::StopTimeout);
            }
            exit = exit.or(self.remove(&id));
        }
        exit
    }

    /// Drop a subscription from the table
    fn remove(&mut self, id: &str) -> Option<Exit> {
        self.stop_deadlines.remove(id);
        if self.subscriptions.remove(id).is_some() {
            debug!("Connection {}: removed operation {}", self.connection_id, id);
        }
        if self.subscriptions.is_empty() && self.config.close_when_idle {
            info!("Connection {} idle, closing", self.connection_id);
            return Some(Exit::Idle);
        }
        None
    }

    async fn on_message<Si>(&mut self, sink: &mut Si, message: Message) -> Option<Exit>
    where
        Si: Sink<Message, Error = WsError> + Unpin,
    {
        self.metrics.increment_received();
        self.watchdog.touch();

        if let Message::Close(frame) = &message {
            let reason = frame
                .as_ref()
                .map(|f| format!("server closed the socket: {} {}", u16::from(f.code), f.reason))
                .unwrap_or_else(|| "server closed the socket".into());
            return Some(Exit::failed(reason));
        }

        let text = match message_text(message)? {
            Ok(text) => text,
            Err(e) => return Some(Exit::failed(e)),
        };
        debug!("<- {}", text);

        match self.codec.decode(&text) {
            Ok(frame) => self.on_frame(sink, frame).await,
            Err(e) => {
                error!("Connection {}: {}", self.connection_id, e);
                Some(Exit::failed(e.to_string()))
            }
        }
    }

    async fn on_frame<Si>(&mut self, sink: &mut Si, frame: ServerFrame) -> Option<Exit>
    where
        Si: Sink<Message, Error = WsError> + Unpin,
    {
        match frame {
            ServerFrame::KeepAlive => {
                for (id, subscription) in &self.subscriptions {
                    if subscription.state().accepts_frames() {
                        subscription.dispatch(&SubscriptionEvent::new(EventType::KeepAlive, id));
                    }
                }
                None
            }
            ServerFrame::Ping { payload } => match self.send(sink, &ClientFrame::Pong { payload }).await {
                Ok(()) => None,
                Err(e) => Some(Exit::failed(e.to_string())),
            },
            ServerFrame::Pong { .. } => None,
            ServerFrame::ConnectionAck { .. } => {
                warn!("Connection {}: ignoring repeated connection_ack", self.connection_id);
                None
            }
            ServerFrame::ConnectionError { payload } => Some(Exit::Failed {
                reason: "server reported connection_error".into(),
                payload,
            }),
            ServerFrame::Data { id, payload } => self.route(&id, Routed::Data(payload)),
            ServerFrame::Error { id, payload } => self.route(&id, Routed::Error(payload)),
            ServerFrame::Complete { id } => self.route(&id, Routed::Complete),
            ServerFrame::Unexpected { id: Some(id), kind, .. } => self.route(&id, Routed::Unexpected(kind)),
            ServerFrame::Unexpected { id: None, kind, .. } => {
                debug!("Ignoring '{}' frame without operation id", kind);
                None
            }
        }
    }

    /// Feed an operation frame to its subscription
    fn route(&mut self, id: &str, routed: Routed) -> Option<Exit> {
        let Some(subscription) = self.subscriptions.get(id).cloned() else {
            debug!("Discarding frame for unknown operation {}", id);
            return None;
        };

        let state = subscription.state();
        if state == SubscriptionState::Stopping {
            let input = match routed {
                Routed::Complete => StateInput::Complete,
                Routed::Error(_) => StateInput::ServerError,
                _ => {
                    debug!("Discarding frame for stopping operation {}", id);
                    return None;
                }
            };
            let _ = subscription.apply(input);
            return self.remove(id);
        }
        if !state.accepts_frames() {
            debug!("Discarding frame for operation {} in state {}", id, state);
            return None;
        }

        let (input, event) = match routed {
            Routed::Data(payload) => match SubscriptionEvent::data(id, payload) {
                Ok(event) => (StateInput::Data, event),
                Err(e) => {
                    warn!("Operation {}: undecodable data payload: {}", id, e);
                    (
                        StateInput::DecodeFailure,
                        SubscriptionEvent::local_error(id, format!("undecodable data payload: {}", e)),
                    )
                }
            },
            Routed::Error(payload) => (StateInput::ServerError, SubscriptionEvent::error(id, payload)),
            Routed::Complete => (StateInput::Complete, SubscriptionEvent::new(EventType::Complete, id)),
            Routed::Unexpected(kind) => (
                StateInput::UnexpectedFrame,
                SubscriptionEvent::local_error(id, format!("unexpected '{}' frame", kind)),
            ),
        };

        let event = match subscription.apply(input) {
            Ok(_) => event,
            Err(protocol_error) => {
                warn!("{}", protocol_error);
                let _ = subscription.apply(StateInput::DecodeFailure);
                SubscriptionEvent::local_error(id, protocol_error.to_string())
            }
        };
        subscription.dispatch(&event);

        if event.kind.is_stop_event() && subscription.auto_close {
            subscription.request_stop();
            let _ = subscription.apply(StateInput::Release);
            return self.remove(id);
        }
        None
    }

    /// Fail every live subscription and close the socket once
    async fn shutdown<Si>(&mut self, sink: &mut Si, exit: Exit)
    where
        Si: Sink<Message, Error = WsError> + Unpin,
    {
        self.state.begin_close();

        let (reason, payload, orderly) = match exit {
            Exit::Requested => ("connection closed".to_string(), None, true),
            Exit::Idle => ("connection closed when idle".to_string(), None, true),
            Exit::Failed { reason, payload } => {
                warn!("Connection {} failed: {}", self.connection_id, reason);
                (reason, payload, false)
            }
        };
        let payload = payload.unwrap_or_else(|| json!({ "message": reason }));

        for (id, subscription) in self.subscriptions.drain() {
            if subscription.state().is_terminal() {
                continue;
            }
            if subscription.apply(StateInput::ConnectionError).is_ok() {
                subscription.dispatch(&SubscriptionEvent::connection_error(&id, Some(payload.clone())));
            }
        }
        self.stop_deadlines.clear();

        if orderly {
            if let Err(e) = self.send(sink, &ClientFrame::ConnectionTerminate).await {
                debug!("Could not send terminate frame: {}", e);
            }
        }
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Err(e)) => debug!("Socket close reported: {}", e),
            Err(_) => debug!("Socket close timed out"),
            Ok(Ok(())) => {}
        }
        self.metrics.increment_socket_closes();
        self.state.set(ConnectionState::Closed);
        info!("Connection {} closed", self.connection_id);
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn recv_some(rx: &mut Option<mpsc::UnboundedReceiver<ClientFrame>>) -> Option<ClientFrame> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Reader task body
pub(crate) async fn run<S>(
    mut dispatcher: Dispatcher,
    socket: S,
    mut commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    closed_tx: watch::Sender<bool>,
) where
    S: Stream<Item = std::result::Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send,
{
    let (mut sink, mut stream): (SplitSink<S, Message>, _) = socket.split();

    let has_client_ping = matches!(dispatcher.codec.encode(&ClientFrame::Ping { payload: None }), Ok(Some(_)));
    let (heartbeat, mut heartbeat_rx) = match dispatcher.config.ping_interval {
        Some(interval) if has_client_ping => {
            let (handle, rx) = spawn_heartbeat(interval);
            (Some(handle), Some(rx))
        }
        _ => (None, None),
    };

    let exit = loop {
        let watchdog_deadline = dispatcher.watchdog.deadline();
        let stop_deadline = dispatcher.stop_deadlines.values().min().copied();

        let exit = tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(command) => dispatcher.on_command(&mut sink, command).await,
                None => Some(Exit::Requested),
            },

            message = stream.next() => match message {
                Some(Ok(message)) => dispatcher.on_message(&mut sink, message).await,
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    Some(Exit::failed(e.to_string()))
                }
                None => Some(Exit::failed("socket stream ended")),
            },

            _ = sleep_until_some(watchdog_deadline) => {
                if dispatcher.watchdog.is_expired() {
                    error!(
                        "Connection {}: no frame for {:?}",
                        dispatcher.connection_id,
                        dispatcher.watchdog.time_since_last_frame()
                    );
                    Some(Exit::failed("keep-alive timeout"))
                } else {
                    None
                }
            },

            _ = sleep_until_some(stop_deadline) => dispatcher.expire_stops(),

            frame = recv_some(&mut heartbeat_rx) => match frame {
                Some(frame) => match dispatcher.send(&mut sink, &frame).await {
                    Ok(()) => None,
                    Err(e) => Some(Exit::failed(e.to_string())),
                },
                None => None,
            },
        };

        if let Some(exit) = exit {
            break exit;
        }
    };

    commands.close();
    dispatcher.shutdown(&mut sink, exit).await;

    if let Some(handle) = heartbeat {
        handle.abort();
    }
    drop(stream);
    let _ = closed_tx.send(true);
}
