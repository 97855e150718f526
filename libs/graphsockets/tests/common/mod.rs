//! Common test utilities for GraphSockets integration tests
//!
//! A scripted GraphQL WebSocket server: each accepted socket negotiates a
//! sub-protocol from the server's supported list and is then handed to the
//! test's script as a [`ServerConn`].

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use graphsockets::SubProtocol;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Upper bound for any single wait in a test
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `future`, failing the test if it takes longer than [`TEST_TIMEOUT`]
pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}

/// One accepted socket, seen from the server
pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
    pub protocol: Option<SubProtocol>,
    log: Arc<Mutex<Vec<Value>>>,
}

impl ServerConn {
    fn start_type(&self) -> &'static str {
        match self.protocol {
            Some(SubProtocol::GraphqlTransportWs) => "subscribe",
            _ => "start",
        }
    }

    fn data_type(&self) -> &'static str {
        match self.protocol {
            Some(SubProtocol::GraphqlTransportWs) => "next",
            _ => "data",
        }
    }

    /// Next JSON frame from the client; `None` once the socket is closed
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).expect("client sent invalid JSON");
                    verbose_println!("server <- {}", value);
                    self.log.lock().push(value.clone());
                    return Some(value);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Next frame, which must have the given type
    pub async fn expect(&mut self, kind: &str) -> Value {
        let frame = self
            .recv()
            .await
            .unwrap_or_else(|| panic!("socket closed while expecting '{}'", kind));
        assert_eq!(frame["type"], kind, "unexpected frame {}", frame);
        frame
    }

    pub async fn send(&mut self, frame: Value) {
        verbose_println!("server -> {}", frame);
        let _ = self.ws.send(Message::Text(frame.to_string())).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        let _ = self.ws.send(Message::Text(text.to_string())).await;
    }

    /// Receive `connection_init` and acknowledge it
    pub async fn handshake(&mut self) -> Value {
        let init = self.expect("connection_init").await;
        self.send(json!({"type": "connection_ack"})).await;
        init
    }

    /// Receive a start/subscribe frame and return its operation id
    pub async fn expect_start(&mut self) -> String {
        let kind = self.start_type();
        let frame = self.expect(kind).await;
        frame["id"].as_str().expect("start frame without id").to_string()
    }

    pub async fn send_data(&mut self, id: &str, payload: Value) {
        let kind = self.data_type();
        self.send(json!({"type": kind, "id": id, "payload": payload})).await;
    }

    pub async fn send_error(&mut self, id: &str, payload: Value) {
        self.send(json!({"type": "error", "id": id, "payload": payload})).await;
    }

    pub async fn send_complete(&mut self, id: &str) {
        self.send(json!({"type": "complete", "id": id})).await;
    }

    pub async fn send_ka(&mut self) {
        self.send(json!({"type": "ka"})).await;
    }

    /// Read until the client closes the socket
    pub async fn drain(&mut self) {
        while self.recv().await.is_some() {}
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Scripted GraphQL WebSocket server
pub struct MockGraphQLServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    finished: watch::Receiver<usize>,
    log: Arc<Mutex<Vec<Value>>>,
    shutdown: Arc<Notify>,
}

impl MockGraphQLServer {
    /// Start a server speaking `supported`; `script` drives each socket
    pub async fn start<F, Fut>(supported: &[SubProtocol], script: F) -> Self
    where
        F: Fn(ServerConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let connections = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let (finished_tx, finished) = watch::channel(0usize);

        let supported = supported.to_vec();
        let script = Arc::new(script);
        let shutdown_clone = Arc::clone(&shutdown);
        let connections_clone = Arc::clone(&connections);
        let log_clone = Arc::clone(&log);
        let finished_tx = Arc::new(finished_tx);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        connections_clone.fetch_add(1, Ordering::SeqCst);

                        let supported = supported.clone();
                        let script = Arc::clone(&script);
                        let log = Arc::clone(&log_clone);
                        let finished_tx = Arc::clone(&finished_tx);
                        tokio::spawn(async move {
                            if let Some(conn) = Self::accept(stream, supported, log).await {
                                script(conn).await;
                            }
                            finished_tx.send_modify(|n| *n += 1);
                        });
                    }
                    _ = shutdown_clone.notified() => break,
                }
            }
        });

        Self {
            addr,
            connections,
            finished,
            log,
            shutdown,
        }
    }

    async fn accept(
        stream: TcpStream,
        supported: Vec<SubProtocol>,
        log: Arc<Mutex<Vec<Value>>>,
    ) -> Option<ServerConn> {
        let selected = Arc::new(Mutex::new(None));
        let selected_clone = Arc::clone(&selected);

        let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let offered = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let choice = offered
                .split(',')
                .map(str::trim)
                .filter_map(SubProtocol::from_name)
                .find(|p| supported.contains(p));
            if let Some(protocol) = choice {
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(protocol.as_str()));
                *selected_clone.lock() = Some(protocol);
            }
            Ok(response)
        };

        let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.ok()?;
        let protocol = *selected.lock();
        Some(ServerConn { ws, protocol, log })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/graphql", self.addr)
    }

    /// Sockets accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every frame received from clients, in order
    pub fn frames(&self) -> Vec<Value> {
        self.log.lock().clone()
    }

    pub fn frames_of_type(&self, kind: &str) -> Vec<Value> {
        self.frames().into_iter().filter(|f| f["type"] == kind).collect()
    }

    /// Wait until `n` scripts have returned
    pub async fn wait_finished(&self, n: usize) {
        let mut finished = self.finished.clone();
        within("server scripts", finished.wait_for(|done| *done >= n))
            .await
            .expect("server task dropped");
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockGraphQLServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Minimal HTTP/1.1 responder for the request/response path
///
/// Answers every request with the scripted status and JSON body and keeps
/// the raw request text for assertions.
pub struct MockHttpServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttpServer {
    pub async fn start(status: u16, body: Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = Arc::clone(&requests);
        let body = body.to_string();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let requests = Arc::clone(&requests_clone);
                let body = body.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    requests.lock().push(request);
                    let response = format!(
                        "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}/graphql", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

/// Read one request: headers plus a `content-length` body
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buffer).to_string();
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buffer.len() >= header_end + 4 + content_length {
            return Some(text);
        }
    }
}

/// Body of a captured HTTP request, parsed as JSON
pub fn request_body(request: &str) -> Value {
    let body = request.split("\r\n\r\n").nth(1).unwrap_or("");
    serde_json::from_str(body).unwrap_or(Value::Null)
}

/// Callback recording every event it sees, plus a notifier per event
pub fn event_log() -> (
    Arc<Mutex<Vec<graphsockets::SubscriptionEvent>>>,
    Arc<Notify>,
    Arc<dyn graphsockets::EventCallback>,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let notify = Arc::new(Notify::new());
    let callback = {
        let events = Arc::clone(&events);
        let notify = Arc::clone(&notify);
        graphsockets::sync_callback(move |event| {
            events.lock().push(event.clone());
            notify.notify_one();
            Ok(())
        })
    };
    (events, notify, callback)
}

/// Event kinds recorded so far
pub fn kinds(events: &Mutex<Vec<graphsockets::SubscriptionEvent>>) -> Vec<graphsockets::EventType> {
    events.lock().iter().map(|e| e.kind).collect()
}

/// Wait until `events` holds at least `n` events of `kind`
pub async fn wait_for_events(
    events: &Mutex<Vec<graphsockets::SubscriptionEvent>>,
    notify: &Notify,
    kind: graphsockets::EventType,
    n: usize,
) {
    within("events", async {
        while events.lock().iter().filter(|e| e.kind == kind).count() < n {
            notify.notified().await;
        }
    })
    .await
}
