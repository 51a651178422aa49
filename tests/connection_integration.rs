//! Integration tests for the connection manager against a live WebSocket
//! backend.

mod common;

use common::{wait_for, FakeBackend, Reply};
use ppe_monitor::config::BackendConfig;
use ppe_monitor::connection::{
    ConnectionError, ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState,
};
use ppe_monitor::protocol::DetectionRequest;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TINY_JPEG: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

struct Running {
    handle: ConnectionHandle,
    events: UnboundedReceiver<ConnectionEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("manager did not stop")
            .unwrap();
    }
}

fn backend_config(url: &str) -> BackendConfig {
    BackendConfig {
        url: url.to_string(),
        connect_timeout_seconds: 2,
        reconnect_delays_ms: vec![100, 200],
        ..Default::default()
    }
}

fn spawn(config: BackendConfig) -> Running {
    let (manager, handle, events) = ConnectionManager::new(config).unwrap();
    let cancel = CancellationToken::new();
    let task = manager.start(cancel.clone());
    Running {
        handle,
        events,
        cancel,
        task,
    }
}

/// Next event that is not a transport error.
async fn next_event(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for connection event")
            .expect("event channel closed");
        if !matches!(event, ConnectionEvent::Error(_)) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_connect_opens_session() {
    let backend = FakeBackend::start(Reply::Compliant).await;
    let mut running = spawn(backend_config(&backend.url()));

    assert_eq!(running.handle.state(), ConnectionState::Disconnected);
    running.handle.connect().unwrap();

    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);
    assert!(running.handle.is_connected());
    assert!(wait_for(Duration::from_secs(1), || backend.connections() == 1).await);

    running.stop().await;
}

#[tokio::test]
async fn test_request_round_trip() {
    let backend = FakeBackend::start(Reply::Missing(vec!["guantes"])).await;
    let mut running = spawn(backend_config(&backend.url()));
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    let request = DetectionRequest::new(TINY_JPEG.to_string(), 0.3);
    running.handle.send(&request).unwrap();

    // "connected" and "processing" control frames never reach the pipeline
    match next_event(&mut running.events).await {
        ConnectionEvent::Message(response) => {
            let status = response.ppe_status.unwrap();
            assert!(status.helmet);
            assert!(!status.gloves);
            assert_eq!(response.is_compliant, Some(false));
        }
        other => panic!("expected detection message, got {:?}", other),
    }
    assert_eq!(backend.requests(), 1);
    let confidence = backend.last_confidence().unwrap();
    assert!((confidence - 0.3).abs() < 1e-6);

    running.stop().await;
}

#[tokio::test]
async fn test_server_error_object_forwarded() {
    let backend = FakeBackend::start(Reply::Error("model not loaded")).await;
    let mut running = spawn(backend_config(&backend.url()));
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    running
        .handle
        .send(&DetectionRequest::new(TINY_JPEG.to_string(), 0.3))
        .unwrap();

    match next_event(&mut running.events).await {
        ConnectionEvent::Message(response) => {
            assert!(response.ppe_status.is_none());
            assert_eq!(response.error.as_deref(), Some("model not loaded"));
        }
        other => panic!("expected detection message, got {:?}", other),
    }

    running.stop().await;
}

#[tokio::test]
async fn test_server_ping_answered() {
    let backend =
        FakeBackend::start_with(Reply::Compliant, Duration::from_millis(20), true).await;
    let mut running = spawn(backend_config(&backend.url()));
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    assert!(wait_for(Duration::from_secs(2), || backend.pongs() == 1).await);

    running.stop().await;
}

#[tokio::test]
async fn test_heartbeat_sent() {
    let backend = FakeBackend::start(Reply::Compliant).await;
    let mut running = spawn(BackendConfig {
        heartbeat_interval_seconds: 1,
        ..backend_config(&backend.url())
    });
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    assert!(wait_for(Duration::from_millis(2500), || backend.client_pings() >= 1).await);
    assert!(running.handle.is_connected());

    running.stop().await;
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let backend = FakeBackend::start(Reply::Compliant).await;
    let mut running = spawn(backend_config(&backend.url()));
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    backend.kick();
    assert_eq!(
        next_event(&mut running.events).await,
        ConnectionEvent::Closed { intentional: false }
    );

    // First backoff step is 100 ms
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);
    assert_eq!(backend.connections(), 2);

    running.stop().await;
}

/// Kick the live session and measure how long the manager takes to reopen.
async fn reconnect_gap(
    backend: &FakeBackend,
    events: &mut UnboundedReceiver<ConnectionEvent>,
    sessions: usize,
) -> Duration {
    assert!(wait_for(Duration::from_secs(1), || backend.connections() == sessions).await);
    backend.kick();
    assert_eq!(
        next_event(events).await,
        ConnectionEvent::Closed { intentional: false }
    );
    let closed_at = tokio::time::Instant::now();
    assert_eq!(next_event(events).await, ConnectionEvent::Opened);
    closed_at.elapsed()
}

#[tokio::test]
async fn test_reconnect_delays_follow_schedule_and_reset_when_stable() {
    let backend = FakeBackend::start(Reply::Compliant).await;
    let mut running = spawn(BackendConfig {
        reconnect_delays_ms: vec![100, 200, 400],
        stable_connection_seconds: 1,
        ..backend_config(&backend.url())
    });
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    let first = reconnect_gap(&backend, &mut running.events, 1).await;
    let second = reconnect_gap(&backend, &mut running.events, 2).await;
    let third = reconnect_gap(&backend, &mut running.events, 3).await;
    // Measured from event receipt, which trails the scheduled delay slightly
    assert!(first >= Duration::from_millis(90) && first < Duration::from_millis(190), "{first:?}");
    assert!(second >= Duration::from_millis(190) && second < Duration::from_millis(390), "{second:?}");
    assert!(third >= Duration::from_millis(390), "{third:?}");

    // A session open past the stability window starts the schedule over
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let after_stable = reconnect_gap(&backend, &mut running.events, 4).await;
    assert!(
        after_stable >= Duration::from_millis(90) && after_stable < Duration::from_millis(190),
        "{after_stable:?}"
    );

    running.stop().await;
}

#[tokio::test]
async fn test_manual_disconnect_suppresses_reconnect() {
    let backend = FakeBackend::start(Reply::Compliant).await;
    let mut running = spawn(backend_config(&backend.url()));
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    running.handle.disconnect().unwrap();
    assert_eq!(
        next_event(&mut running.events).await,
        ConnectionEvent::Closed { intentional: true }
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(backend.connections(), 1);
    assert_eq!(running.handle.state(), ConnectionState::Disconnected);

    // A second disconnect is a no-op
    running.handle.disconnect().unwrap();

    let request = DetectionRequest::new(TINY_JPEG.to_string(), 0.3);
    assert_eq!(
        running.handle.send(&request),
        Err(ConnectionError::NotConnected)
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.connections(), 1);

    running.stop().await;
}

#[tokio::test]
async fn test_unreachable_backend_retries_until_available() {
    // Reserve a port, then release it so the first attempts are refused
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut running = spawn(backend_config(&format!("http://{}", addr)));
    running.handle.connect().unwrap();
    assert_eq!(
        next_event(&mut running.events).await,
        ConnectionEvent::Closed { intentional: false }
    );
    assert!(!running.handle.is_connected());

    // Attempts continue on the backoff schedule without further input
    assert_eq!(
        next_event(&mut running.events).await,
        ConnectionEvent::Closed { intentional: false }
    );

    running.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_session() {
    let backend = FakeBackend::start(Reply::Compliant).await;
    let mut running = spawn(backend_config(&backend.url()));
    running.handle.connect().unwrap();
    assert_eq!(next_event(&mut running.events).await, ConnectionEvent::Opened);

    let handle = running.handle.clone();
    running.stop().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(handle.connect(), Err(ConnectionError::ManagerStopped));
}
