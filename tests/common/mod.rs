//! Shared test utilities for PPE monitor integration tests.
//!
//! Provides a fake detection backend (axum WebSocket server speaking the
//! detection protocol), a still-image capture fixture, and config builders.

#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use ppe_monitor::config::MonitorConfig;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Wire keys of every PPE kind, in canonical order.
pub const PPE_KEYS: [&str; 6] = ["casco", "lentes", "guantes", "botas", "ropa", "tapabocas"];

// =============================================================================
// Fake detection backend
// =============================================================================

/// What the fake backend answers to a detection request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Every item present
    Compliant,
    /// These wire keys reported absent
    Missing(Vec<&'static str>),
    /// Nobody in frame
    NoPerson,
    /// Server error object instead of a result
    Error(&'static str),
    /// No answer at all
    Silent,
}

impl Reply {
    fn body(&self) -> Option<Value> {
        let status = |missing: &[&str]| {
            let mut map = serde_json::Map::new();
            for key in PPE_KEYS {
                map.insert(key.to_string(), Value::Bool(!missing.contains(&key)));
            }
            Value::Object(map)
        };
        match self {
            Reply::Compliant => Some(json!({
                "ppe_status": status(&[]),
                "detections": [
                    {"class": "person", "confidence": 0.95, "bbox": [10, 10, 50, 40]},
                    {"class": "casco", "confidence": 0.88, "bbox": [20, 8, 34, 16]}
                ],
                "is_compliant": true,
                "has_person": true,
                "processing_time": 12.5
            })),
            Reply::Missing(keys) => Some(json!({
                "ppe_status": status(keys),
                "detections": [
                    {"class": "person", "confidence": 0.93, "bbox": [10, 10, 50, 40]}
                ],
                "is_compliant": false,
                "has_person": true
            })),
            Reply::NoPerson => Some(json!({
                "ppe_status": status(&PPE_KEYS),
                "detections": [],
                "is_compliant": false,
                "has_person": false
            })),
            Reply::Error(message) => Some(json!({ "error": message })),
            Reply::Silent => None,
        }
    }
}

struct Shared {
    reply: Mutex<Reply>,
    delay: Duration,
    ping_on_connect: bool,
    requests: AtomicUsize,
    connections: AtomicUsize,
    client_pings: AtomicUsize,
    pongs: AtomicUsize,
    last_confidence: Mutex<Option<f64>>,
    kick: broadcast::Sender<()>,
}

/// WebSocket detection backend on an ephemeral local port.
pub struct FakeBackend {
    pub addr: SocketAddr,
    shared: Arc<Shared>,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Backend answering every request with `reply` after 20 ms.
    pub async fn start(reply: Reply) -> Self {
        Self::start_with(reply, Duration::from_millis(20), false).await
    }

    /// Backend with a custom answer delay, optionally pinging new clients.
    pub async fn start_with(reply: Reply, delay: Duration, ping_on_connect: bool) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (kick, _) = broadcast::channel(4);

        let shared = Arc::new(Shared {
            reply: Mutex::new(reply),
            delay,
            ping_on_connect,
            requests: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            client_pings: AtomicUsize::new(0),
            pongs: AtomicUsize::new(0),
            last_confidence: Mutex::new(None),
            kick,
        });

        let app = Router::new()
            .route("/api/ws/detect", get(upgrade))
            .with_state(Arc::clone(&shared));
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            shared,
            server,
        }
    }

    /// Base URL in the form the monitor config expects.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn client_pings(&self) -> usize {
        self.shared.client_pings.load(Ordering::SeqCst)
    }

    pub fn pongs(&self) -> usize {
        self.shared.pongs.load(Ordering::SeqCst)
    }

    pub fn last_confidence(&self) -> Option<f64> {
        *self.shared.last_confidence.lock().unwrap()
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.shared.reply.lock().unwrap() = reply;
    }

    /// Close every open session from the server side.
    pub fn kick(&self) {
        let _ = self.shared.kick.send(());
    }

    /// Close sessions and stop accepting connections.
    pub fn shutdown(&self) {
        self.kick();
        self.server.abort();
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(shared): State<Arc<Shared>>) -> Response {
    ws.on_upgrade(move |socket| session(socket, shared))
}

async fn session(socket: WebSocket, shared: Arc<Shared>) {
    // Subscribed before counted, so a kick after `connections()` is seen
    let mut kick = shared.kick.subscribe();
    shared.connections.fetch_add(1, Ordering::SeqCst);
    let (mut tx, mut rx) = socket.split();

    let hello = json!({"type": "connected", "message": "ready"}).to_string();
    if tx.send(Message::Text(hello)).await.is_err() {
        return;
    }
    if shared.ping_on_connect {
        let ping = json!({"type": "ping"}).to_string();
        if tx.send(Message::Text(ping)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = kick.recv() => {
                let _ = tx.send(Message::Close(None)).await;
                return;
            }
            message = rx.next() => {
                let Some(Ok(message)) = message else { return };
                let Message::Text(text) = message else { continue };
                let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };

                match value.get("type").and_then(Value::as_str) {
                    Some("ping") => {
                        shared.client_pings.fetch_add(1, Ordering::SeqCst);
                        let pong = json!({"type": "pong"}).to_string();
                        let _ = tx.send(Message::Text(pong)).await;
                        continue;
                    }
                    Some("pong") => {
                        shared.pongs.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    Some(_) => continue,
                    None => {}
                }

                let valid = value
                    .get("image")
                    .and_then(Value::as_str)
                    .is_some_and(|image| image.starts_with("data:image/jpeg;base64,"));
                if !valid {
                    continue;
                }
                shared.requests.fetch_add(1, Ordering::SeqCst);
                *shared.last_confidence.lock().unwrap() =
                    value.get("confidence").and_then(Value::as_f64);

                let processing = json!({"type": "processing"}).to_string();
                let _ = tx.send(Message::Text(processing)).await;

                let reply = shared.reply.lock().unwrap().clone();
                if let Some(body) = reply.body() {
                    tokio::time::sleep(shared.delay).await;
                    if tx.send(Message::Text(body.to_string())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Write a small solid-colour PNG to capture from.
pub fn write_test_image(dir: &Path) -> PathBuf {
    let path = dir.join("frame.png");
    image::RgbImage::from_pixel(64, 48, image::Rgb([40, 120, 200]))
        .save(&path)
        .unwrap();
    path
}

/// Monitor config pointed at `backend_url` with fast reconnects and storage
/// under `data_dir`.
pub fn test_config(backend_url: &str, data_dir: &Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.backend.url = backend_url.to_string();
    config.backend.connect_timeout_seconds = 2;
    config.backend.reconnect_delays_ms = vec![100, 200];
    config.storage.data_dir = data_dir.to_path_buf();
    config
}

/// Poll `condition` every 10 ms until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
